//! Session context store.
//!
//! Owns the active analysis session. Every mutation is a full
//! read-modify-persist-notify cycle; mutations are serialized behind one
//! async lock so concurrent tasks cannot interleave within a cycle, which
//! preserves the append-only insight order.

use crate::error::PipelineError;
use crate::models::{
    Contradiction, Document, Insight, RiskFactorMap, SessionContext, Snapshot, TaskId,
};
use crate::session::cache::CacheBackend;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Pub/sub channel used for cross-process session events.
const SESSION_CHANNEL: &str = "bankability.sessions";

/// Subscriber callback invoked synchronously after every mutation.
pub type ContextSubscriber = Box<dyn Fn(&SessionContext) + Send + Sync>;

struct StoreState {
    active: Option<SessionContext>,
    /// In-process fallback for sessions the cache could not persist.
    fallback: HashMap<String, String>,
}

/// Store for one analysis session's accumulated evidence and results.
pub struct ContextStore {
    cache: Option<Arc<dyn CacheBackend>>,
    state: Mutex<StoreState>,
    subscribers: StdMutex<Vec<ContextSubscriber>>,
    /// Cache write attempts before giving up on the cache for a mutation.
    write_attempts: usize,
}

impl ContextStore {
    pub fn new(cache: Option<Arc<dyn CacheBackend>>) -> Self {
        Self {
            cache,
            state: Mutex::new(StoreState {
                active: None,
                fallback: HashMap::new(),
            }),
            subscribers: StdMutex::new(Vec::new()),
            write_attempts: 2,
        }
    }

    /// Register a callback invoked with the updated context after every
    /// mutation (observer taps for UI/telemetry).
    pub fn subscribe<F>(&self, f: F)
    where
        F: Fn(&SessionContext) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .expect("subscriber mutex poisoned")
            .push(Box::new(f));
    }

    /// Create a fresh session for the subject and make it active.
    pub async fn create_session(&self, subject_id: &str) -> SessionContext {
        let session_id = Uuid::new_v4().to_string();
        let ctx = SessionContext::new(session_id, subject_id);

        {
            let mut state = self.state.lock().await;
            state.active = Some(ctx.clone());
            self.persist(&mut state, &ctx).await;
        }

        self.notify(&ctx, "session_created").await;
        ctx
    }

    /// Snapshot of the active session context.
    pub async fn get_context(&self) -> Result<SessionContext, PipelineError> {
        self.state
            .lock()
            .await
            .active
            .clone()
            .ok_or(PipelineError::NoActiveSession)
    }

    pub async fn add_document(&self, document: Document) -> Result<(), PipelineError> {
        self.mutate("document_added", move |ctx| ctx.documents.push(document))
            .await
    }

    /// Install an external snapshot; replaces any prior snapshot of the
    /// same kind (at most one per source).
    pub async fn set_snapshot(&self, snapshot: Snapshot) -> Result<(), PipelineError> {
        self.mutate("snapshot_set", move |ctx| match snapshot {
            Snapshot::Payments(s) => ctx.payments = Some(s),
            Snapshot::Banking(s) => ctx.banking = Some(s),
        })
        .await
    }

    /// Append an insight to the task's log. Append-only; never reorders.
    pub async fn append_insight(
        &self,
        task_id: TaskId,
        insight: Insight,
    ) -> Result<(), PipelineError> {
        self.mutate("insight_appended", move |ctx| {
            ctx.insights.entry(task_id).or_default().push(insight)
        })
        .await
    }

    pub async fn set_risk_factors(&self, factors: RiskFactorMap) -> Result<(), PipelineError> {
        self.mutate("risk_factors_set", move |ctx| {
            ctx.risk_factors = Some(factors)
        })
        .await
    }

    pub async fn add_contradiction(
        &self,
        contradiction: Contradiction,
    ) -> Result<(), PipelineError> {
        self.mutate("contradiction_added", move |ctx| {
            ctx.contradictions.push(contradiction)
        })
        .await
    }

    /// Apply one mutation as a read-modify-persist-notify cycle.
    async fn mutate<F>(&self, event: &str, apply: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut SessionContext),
    {
        let updated = {
            let mut state = self.state.lock().await;
            let ctx = state.active.as_mut().ok_or(PipelineError::NoActiveSession)?;
            apply(ctx);
            let updated = ctx.clone();
            self.persist(&mut state, &updated).await;
            updated
        };

        self.notify(&updated, event).await;
        Ok(())
    }

    /// Write the session to the cache with a bounded retry budget; on any
    /// failure, keep it in the in-process fallback so the session stays
    /// usable for this process lifetime. Never fails.
    async fn persist(&self, state: &mut StoreState, ctx: &SessionContext) {
        let serialized = match serde_json::to_string(ctx) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize session {}: {}", ctx.session_id, e);
                return;
            }
        };
        let key = format!("session:{}", ctx.session_id);

        if let Some(cache) = &self.cache {
            for attempt in 1..=self.write_attempts {
                match cache.put(&key, &serialized).await {
                    Ok(()) => {
                        debug!("Persisted session {} (attempt {})", ctx.session_id, attempt);
                        return;
                    }
                    Err(e) => {
                        warn!(
                            "Cache write for {} failed (attempt {}/{}): {}",
                            ctx.session_id, attempt, self.write_attempts, e
                        );
                    }
                }
            }
        }

        state.fallback.insert(key, serialized);
    }

    /// Invoke local subscribers synchronously and publish the event on the
    /// cache's pub/sub channel for cross-process observers.
    async fn notify(&self, ctx: &SessionContext, event: &str) {
        {
            let subscribers = self.subscribers.lock().expect("subscriber mutex poisoned");
            for subscriber in subscribers.iter() {
                subscriber(ctx);
            }
        }

        if let Some(cache) = &self.cache {
            let payload = serde_json::json!({
                "session_id": ctx.session_id,
                "event": event,
            })
            .to_string();
            if let Err(e) = cache.publish(SESSION_CHANNEL, &payload).await {
                debug!("Session event publish failed: {}", e);
            }
        }
    }

    /// Number of sessions held only by the in-process fallback.
    #[allow(dead_code)] // Inspection surface
    pub async fn fallback_len(&self) -> usize {
        self.state.lock().await.fallback.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, PaymentSnapshot};
    use crate::session::cache::{CacheError, MemoryCacheBackend};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Cache that always fails, for exercising the fallback path.
    struct BrokenCache {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl CacheBackend for BrokenCache {
        async fn put(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(CacheError("connection refused".to_string()))
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError("connection refused".to_string()))
        }

        async fn publish(&self, _channel: &str, _payload: &str) -> Result<(), CacheError> {
            Err(CacheError("connection refused".to_string()))
        }
    }

    fn test_document() -> Document {
        Document {
            doc_type: DocumentType::BalanceSheet,
            filename: "bs.pdf".to_string(),
            parsed_at: Utc::now(),
            confidence: 0.95,
            data: serde_json::json!({"2024": {"assets": 100.0}}),
            raw_text: String::new(),
            trust_score: 0.9,
        }
    }

    #[tokio::test]
    async fn test_get_context_without_session_fails() {
        let store = ContextStore::new(None);
        assert!(matches!(
            store.get_context().await,
            Err(PipelineError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn test_read_after_write() {
        let store = ContextStore::new(Some(Arc::new(MemoryCacheBackend::default())));
        store.create_session("acme").await;

        store.add_document(test_document()).await.unwrap();
        store
            .set_snapshot(Snapshot::Payments(PaymentSnapshot {
                mrr: 10_000.0,
                customer_count: 12,
                ..Default::default()
            }))
            .await
            .unwrap();

        let ctx = store.get_context().await.unwrap();
        assert_eq!(ctx.documents.len(), 1);
        assert_eq!(ctx.payments.unwrap().customer_count, 12);
    }

    #[tokio::test]
    async fn test_cache_failure_degrades_to_fallback() {
        let store = ContextStore::new(Some(Arc::new(BrokenCache {
            attempts: AtomicUsize::new(0),
        })));
        store.create_session("acme").await;

        // The mutation must succeed despite every cache write failing.
        store.add_document(test_document()).await.unwrap();
        assert_eq!(store.get_context().await.unwrap().documents.len(), 1);
        assert_eq!(store.fallback_len().await, 1);
    }

    #[tokio::test]
    async fn test_subscribers_observe_every_mutation() {
        let store = ContextStore::new(None);
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        store.subscribe(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.create_session("acme").await;
        store.add_document(test_document()).await.unwrap();
        store
            .append_insight(TaskId::Legal, Insight::insufficient_data(TaskId::Legal))
            .await
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_insight_append_preserves_order() {
        let store = ContextStore::new(None);
        store.create_session("acme").await;

        for title in ["a", "b", "c"] {
            let mut insight = Insight::insufficient_data(TaskId::Financial);
            insight.title = title.to_string();
            store
                .append_insight(TaskId::Financial, insight)
                .await
                .unwrap();
        }

        let ctx = store.get_context().await.unwrap();
        let titles: Vec<&str> = ctx.insights[&TaskId::Financial]
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }
}
