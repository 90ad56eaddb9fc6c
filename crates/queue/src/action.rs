use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use ripple_core::{Event, NodeId, Value};
use tracing::debug;

use crate::error::QueueError;

/// Runs the work behind a pending action on the target node.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn on_event(&self, source: NodeId, event: Event) -> Result<(), QueueError>;

    async fn on_property(&self, source: NodeId, label: String, value: Value) -> Result<(), QueueError>;
}

/// What the action carries.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    Event(Event),
    Property { label: String, value: Value },
}

/// Hysteresis de-duplication key: the originating node plus the event kind
/// or property label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionIdentity {
    Event { source: NodeId, kind: String },
    Property { source: NodeId, label: String },
}

/// The future produced by [`PendingAction::into_task`].
pub type ActionTask = BoxFuture<'static, Result<(), QueueError>>;

/// An action waiting in a fireable node's queue.
#[derive(Clone)]
pub struct PendingAction {
    pub source: NodeId,
    pub payload: ActionPayload,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    handler: Arc<dyn ActionHandler>,
}

impl PendingAction {
    pub fn event(source: NodeId, event: Event, priority: i32, handler: Arc<dyn ActionHandler>) -> Self {
        Self {
            source,
            payload: ActionPayload::Event(event),
            priority,
            enqueued_at: Utc::now(),
            handler,
        }
    }

    pub fn property(
        source: NodeId,
        label: impl Into<String>,
        value: Value,
        priority: i32,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        Self {
            source,
            payload: ActionPayload::Property {
                label: label.into(),
                value,
            },
            priority,
            enqueued_at: Utc::now(),
            handler,
        }
    }

    pub fn identity(&self) -> ActionIdentity {
        match &self.payload {
            ActionPayload::Event(event) => ActionIdentity::Event {
                source: self.source,
                kind: event.kind.clone(),
            },
            ActionPayload::Property { label, .. } => ActionIdentity::Property {
                source: self.source,
                label: label.clone(),
            },
        }
    }

    /// Short label for logs.
    pub fn describe(&self) -> String {
        match &self.payload {
            ActionPayload::Event(event) => format!("event {} from {}", event.kind, self.source),
            ActionPayload::Property { label, .. } => format!("property {} from {}", label, self.source),
        }
    }

    /// Resolve the runnable for this action.
    pub fn into_task(self, now: DateTime<Utc>) -> ActionTask {
        let waited = now.signed_duration_since(self.enqueued_at);
        debug!(
            source = %self.source,
            priority = self.priority,
            waited_ms = waited.num_milliseconds(),
            "dequeued action"
        );
        let handler = self.handler;
        let source = self.source;
        match self.payload {
            ActionPayload::Event(event) => Box::pin(async move { handler.on_event(source, event).await }),
            ActionPayload::Property { label, value } => {
                Box::pin(async move { handler.on_property(source, label, value).await })
            }
        }
    }
}

impl fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAction")
            .field("source", &self.source)
            .field("payload", &self.payload)
            .field("priority", &self.priority)
            .field("enqueued_at", &self.enqueued_at)
            .finish()
    }
}

/// Handler backed by a synchronous closure.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(NodeId, ActionPayload) -> Result<(), QueueError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self { f })
    }
}

#[async_trait]
impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(NodeId, ActionPayload) -> Result<(), QueueError> + Send + Sync + 'static,
{
    async fn on_event(&self, source: NodeId, event: Event) -> Result<(), QueueError> {
        (self.f)(source, ActionPayload::Event(event))
    }

    async fn on_property(&self, source: NodeId, label: String, value: Value) -> Result<(), QueueError> {
        (self.f)(source, ActionPayload::Property { label, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[test]
    fn identity_ignores_value() {
        let handler = FnHandler::new(|_, _| Ok(()));
        let source = Uuid::new_v4();
        let a = PendingAction::property(source, "temp", json!(1), 5, handler.clone());
        let b = PendingAction::property(source, "temp", json!(2), 9, handler.clone());
        let c = PendingAction::property(source, "level", json!(1), 5, handler);
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn event_identity_uses_kind() {
        let handler = FnHandler::new(|_, _| Ok(()));
        let source = Uuid::new_v4();
        let a = PendingAction::event(source, Event::new("alarm", source), 5, handler.clone());
        let b = PendingAction::event(source, Event::new("alarm", source), 5, handler.clone());
        let c = PendingAction::event(source, Event::new("reset", source), 5, handler);
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[tokio::test]
    async fn task_invokes_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = FnHandler::new(move |source, payload| {
            sink.lock().unwrap().push((source, payload));
            Ok(())
        });
        let source = Uuid::new_v4();
        let action = PendingAction::property(source, "rpm", json!(1200), 5, handler);

        action.into_task(Utc::now()).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, source);
        assert_eq!(
            seen[0].1,
            ActionPayload::Property { label: "rpm".into(), value: json!(1200) }
        );
    }

    #[tokio::test]
    async fn handler_errors_surface_from_task() {
        let handler = FnHandler::new(|_, _| Err(QueueError::Handler("boom".into())));
        let source = Uuid::new_v4();
        let action = PendingAction::event(source, Event::new("x", source), 5, handler);
        let err = action.into_task(Utc::now()).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
