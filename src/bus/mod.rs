//! In-process task bus.
//!
//! Tasks broadcast findings and query each other through this bus. Direct
//! messages go to the named subscriber; broadcasts go to every subscriber
//! except the sender. Correlated requests resolve with the matching
//! response or time out, at which point the pending entry is removed so a
//! late response is dropped.

use crate::error::PipelineError;
use crate::models::{Message, MessageType, Recipient, TaskId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

struct BusInner {
    subscribers: HashMap<TaskId, mpsc::UnboundedSender<Message>>,
    pending: HashMap<String, oneshot::Sender<Message>>,
    /// Append-only log of every delivered message.
    log: Vec<Message>,
}

/// In-process publish/subscribe and request/response channel.
pub struct TaskBus {
    inner: Mutex<BusInner>,
}

impl TaskBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                subscribers: HashMap::new(),
                pending: HashMap::new(),
                log: Vec::new(),
            }),
        }
    }

    /// Register a listener for direct and broadcast messages. Dropping the
    /// returned subscription removes both registrations.
    pub fn subscribe(self: &Arc<Self>, task_id: TaskId) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .expect("bus mutex poisoned")
            .subscribers
            .insert(task_id, tx);
        debug!("Task {} subscribed to bus", task_id);

        Subscription {
            task_id,
            receiver: rx,
            bus: Arc::clone(self),
        }
    }

    fn unsubscribe(&self, task_id: TaskId) {
        self.inner
            .lock()
            .expect("bus mutex poisoned")
            .subscribers
            .remove(&task_id);
        debug!("Task {} unsubscribed from bus", task_id);
    }

    /// Enqueue and deliver a message. Broadcasts never echo back to the
    /// sender.
    pub fn send(&self, message: Message) {
        self.deliver(message, None);
    }

    /// Deliver to the recipient(s), optionally skipping one extra task
    /// (used when the requester is already resolved through its pending
    /// correlation entry).
    fn deliver(&self, message: Message, skip: Option<TaskId>) {
        let mut inner = self.inner.lock().expect("bus mutex poisoned");
        inner.log.push(message.clone());

        match message.to {
            Recipient::Task(to) => {
                if Some(to) != skip {
                    if let Some(tx) = inner.subscribers.get(&to) {
                        let _ = tx.send(message);
                    }
                }
            }
            Recipient::Broadcast => {
                for (id, tx) in inner.subscribers.iter() {
                    if *id == message.from || Some(*id) == skip {
                        continue;
                    }
                    let _ = tx.send(message.clone());
                }
            }
        }
    }

    /// Send a correlated message and wait for the matching response.
    ///
    /// Fails with `RequestTimeout` when the timeout elapses; the pending
    /// entry is removed so a late response becomes a no-op.
    pub async fn request(
        &self,
        from: TaskId,
        to: TaskId,
        message_type: MessageType,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<Message, PipelineError> {
        let correlation_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        let message = Message {
            id: Uuid::new_v4().to_string(),
            from,
            to: Recipient::Task(to),
            message_type,
            payload,
            timestamp: Utc::now(),
            correlation_id: Some(correlation_id.clone()),
        };

        self.inner
            .lock()
            .expect("bus mutex poisoned")
            .pending
            .insert(correlation_id.clone(), tx);
        self.deliver(message, None);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // The sender was dropped without a response: the bus was cleared.
            Ok(Err(_)) => Err(PipelineError::BusCleared),
            Err(_) => {
                self.inner
                    .lock()
                    .expect("bus mutex poisoned")
                    .pending
                    .remove(&correlation_id);
                Err(PipelineError::RequestTimeout {
                    to,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Answer a correlated message: resolve the waiting requester (if any)
    /// and emit the response as a normal message for other listeners.
    pub fn respond(
        &self,
        original: &Message,
        from: TaskId,
        payload: serde_json::Value,
    ) -> Result<(), PipelineError> {
        let correlation_id = original
            .correlation_id
            .clone()
            .ok_or_else(|| PipelineError::MissingCorrelationId {
                id: original.id.clone(),
            })?;

        let response = Message {
            id: Uuid::new_v4().to_string(),
            from,
            to: Recipient::Broadcast,
            message_type: MessageType::Response,
            payload,
            timestamp: Utc::now(),
            correlation_id: Some(correlation_id.clone()),
        };

        let resolved = {
            let mut inner = self.inner.lock().expect("bus mutex poisoned");
            match inner.pending.remove(&correlation_id) {
                Some(tx) => tx.send(response.clone()).is_ok(),
                None => false,
            }
        };

        // The requester already got the response through its correlation
        // entry; skip it on the broadcast leg.
        let skip = resolved.then_some(original.from);
        self.deliver(response, skip);
        Ok(())
    }

    /// Reject every pending request and empty the delivered-message log.
    #[allow(dead_code)] // Used between test runs
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("bus mutex poisoned");
        inner.pending.clear();
        inner.log.clear();
        debug!("Bus cleared");
    }

    /// Snapshot of every message delivered so far, in order.
    #[allow(dead_code)] // Inspection surface
    pub fn delivered_log(&self) -> Vec<Message> {
        self.inner.lock().expect("bus mutex poisoned").log.clone()
    }

    /// Number of requests still waiting for a response.
    #[allow(dead_code)] // Inspection surface
    pub fn pending_len(&self) -> usize {
        self.inner.lock().expect("bus mutex poisoned").pending.len()
    }
}

impl Default for TaskBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live bus registration. Dropping it removes the listener.
pub struct Subscription {
    task_id: TaskId,
    receiver: mpsc::UnboundedReceiver<Message>,
    bus: Arc<TaskBus>,
}

impl Subscription {
    /// Messages received so far, without waiting.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Wait for the next message, if the bus is still open.
    #[allow(dead_code)] // Used by tasks that block on peer responses
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    fn broadcast(from: TaskId, payload: serde_json::Value) -> Message {
        Message {
            id: Uuid::new_v4().to_string(),
            from,
            to: Recipient::Broadcast,
            message_type: MessageType::Finding,
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn test_broadcast_never_echoes_to_sender() {
        let bus = Arc::new(TaskBus::new());
        let mut financial = bus.subscribe(TaskId::Financial);
        let mut legal = bus.subscribe(TaskId::Legal);

        bus.send(broadcast(TaskId::Financial, json!({"note": "hi"})));

        assert!(financial.drain().is_empty());
        assert_eq!(legal.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_direct_message_reaches_only_recipient() {
        let bus = Arc::new(TaskBus::new());
        let mut legal = bus.subscribe(TaskId::Legal);
        let mut forecast = bus.subscribe(TaskId::Forecast);

        bus.send(Message {
            id: Uuid::new_v4().to_string(),
            from: TaskId::Financial,
            to: Recipient::Task(TaskId::Legal),
            message_type: MessageType::Query,
            payload: json!({}),
            timestamp: Utc::now(),
            correlation_id: None,
        });

        assert_eq!(legal.drain().len(), 1);
        assert!(forecast.drain().is_empty());
    }

    #[tokio::test]
    async fn test_request_times_out_and_removes_pending() {
        let bus = Arc::new(TaskBus::new());
        let _legal = bus.subscribe(TaskId::Legal);

        let started = Instant::now();
        let result = bus
            .request(
                TaskId::Financial,
                TaskId::Legal,
                MessageType::Query,
                json!({"question": "open litigation?"}),
                Duration::from_millis(50),
            )
            .await;

        assert!(matches!(result, Err(PipelineError::RequestTimeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(bus.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_late_respond_after_timeout_is_noop() {
        let bus = Arc::new(TaskBus::new());
        let mut legal = bus.subscribe(TaskId::Legal);

        let result = bus
            .request(
                TaskId::Financial,
                TaskId::Legal,
                MessageType::Query,
                json!({}),
                Duration::from_millis(20),
            )
            .await;
        assert!(result.is_err());

        // The query was delivered; responding now resolves nobody.
        let query = legal.drain().pop().unwrap();
        bus.respond(&query, TaskId::Legal, json!({"late": true}))
            .unwrap();
        assert_eq!(bus.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_request_response_round_trip() {
        let bus = Arc::new(TaskBus::new());
        let mut legal = bus.subscribe(TaskId::Legal);

        let responder = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                let query = legal.recv().await.unwrap();
                bus.respond(&query, TaskId::Legal, json!({"answer": 42}))
                    .unwrap();
            })
        };

        let response = bus
            .request(
                TaskId::Financial,
                TaskId::Legal,
                MessageType::Query,
                json!({"question": "?"}),
                Duration::from_millis(500),
            )
            .await
            .unwrap();

        assert_eq!(response.payload["answer"], 42);
        assert_eq!(response.message_type, MessageType::Response);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_respond_without_correlation_id_fails() {
        let bus = Arc::new(TaskBus::new());
        let message = broadcast(TaskId::Financial, json!({}));

        let result = bus.respond(&message, TaskId::Legal, json!({}));
        assert!(matches!(
            result,
            Err(PipelineError::MissingCorrelationId { .. })
        ));
    }

    #[tokio::test]
    async fn test_clear_rejects_pending_and_empties_log() {
        let bus = Arc::new(TaskBus::new());
        let _legal = bus.subscribe(TaskId::Legal);
        bus.send(broadcast(TaskId::Financial, json!({})));
        assert_eq!(bus.delivered_log().len(), 1);

        let pending = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                bus.request(
                    TaskId::Financial,
                    TaskId::Legal,
                    MessageType::Query,
                    json!({}),
                    Duration::from_secs(5),
                )
                .await
            })
        };

        // Give the request a chance to register before clearing.
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.clear();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(PipelineError::BusCleared)));
        assert!(bus.delivered_log().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_on_drop() {
        let bus = Arc::new(TaskBus::new());
        {
            let _sub = bus.subscribe(TaskId::Forecast);
            assert_eq!(bus.inner.lock().unwrap().subscribers.len(), 1);
        }
        assert!(bus.inner.lock().unwrap().subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_delivered_log_keeps_order() {
        let bus = Arc::new(TaskBus::new());
        let _legal = bus.subscribe(TaskId::Legal);

        for i in 0..3 {
            bus.send(broadcast(TaskId::Financial, json!({"seq": i})));
        }

        let log = bus.delivered_log();
        let seqs: Vec<i64> = log.iter().map(|m| m.payload["seq"].as_i64().unwrap()).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}
