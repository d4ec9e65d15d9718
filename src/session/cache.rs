//! Cache backends for session persistence.
//!
//! The store writes sessions to a fast external cache first and falls back
//! to an in-process map when the cache is unreachable. The backend also
//! exposes a fire-and-forget pub/sub channel for cross-process observers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure talking to the cache service. Never surfaced to callers of the
/// store; it only triggers the in-process fallback.
#[derive(Debug, Error)]
#[error("cache backend error: {0}")]
pub struct CacheError(pub String);

/// Key/value cache with a pub/sub side channel.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Publish an event for cross-process observers. Best effort.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), CacheError>;
}

/// HTTP JSON key/value cache service client.
pub struct HttpCacheBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCacheBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl CacheBackend for HttpCacheBackend {
    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let url = format!("{}/kv/{}", self.base_url, key);
        let response = self
            .client
            .put(&url)
            .body(value.to_string())
            .send()
            .await
            .map_err(|e| CacheError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CacheError(format!("cache put returned {}", response.status())));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let url = format!("{}/kv/{}", self.base_url, key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CacheError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CacheError(format!("cache get returned {}", response.status())));
        }

        let body = response.text().await.map_err(|e| CacheError(e.to_string()))?;
        Ok(Some(body))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), CacheError> {
        let url = format!("{}/publish/{}", self.base_url, channel);
        self.client
            .post(&url)
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| CacheError(e.to_string()))?;
        Ok(())
    }
}

/// In-memory cache backend for tests and cache-less deployments.
#[allow(dead_code)] // Swapped in where no cache service is reachable
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .entries
            .lock()
            .expect("cache mutex poisoned")
            .get(key)
            .cloned())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), CacheError> {
        debug!("publish on {}: {} bytes", channel, payload.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let cache = MemoryCacheBackend::default();
        cache.put("session:1", "{}").await.unwrap();

        assert_eq!(cache.get("session:1").await.unwrap(), Some("{}".to_string()));
        assert_eq!(cache.get("session:2").await.unwrap(), None);
    }
}
