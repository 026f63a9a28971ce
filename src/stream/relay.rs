use super::{StreamEvent, StreamRegistry};
use crate::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Pub/sub hookup used in queue mode, so that workers running a flow out of
/// process can reach the client connected to this one.
#[async_trait]
pub trait SessionRelay: Send + Sync {
    async fn subscribe(&self, session_id: &str) -> Result<()>;

    async fn unsubscribe(&self, session_id: &str) -> Result<()>;
}

/// In-process relay. Workers call [`LocalRelay::publish`]; events for
/// subscribed sessions are forwarded to the stream registry.
pub struct LocalRelay {
    registry: Arc<StreamRegistry>,
    subscriptions: DashMap<String, usize>,
}

impl LocalRelay {
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self {
            registry,
            subscriptions: DashMap::new(),
        }
    }

    pub fn is_subscribed(&self, session_id: &str) -> bool {
        self.subscriptions.contains_key(session_id)
    }

    /// Returns whether the event reached a connected client.
    pub fn publish(&self, session_id: &str, event: StreamEvent) -> bool {
        if !self.is_subscribed(session_id) {
            debug!("Dropping {} event for unsubscribed session {}", event.name(), session_id);
            return false;
        }
        self.registry.emit(session_id, event)
    }
}

#[async_trait]
impl SessionRelay for LocalRelay {
    async fn subscribe(&self, session_id: &str) -> Result<()> {
        *self.subscriptions.entry(session_id.to_string()).or_insert(0) += 1;
        debug!("Subscribed relay channel {}", session_id);
        Ok(())
    }

    async fn unsubscribe(&self, session_id: &str) -> Result<()> {
        self.subscriptions.remove_if_mut(session_id, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
        debug!("Unsubscribed relay channel {}", session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn forwards_only_subscribed_sessions() {
        let registry = Arc::new(StreamRegistry::new());
        let relay = LocalRelay::new(registry.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = registry.register("s1", tx);

        assert!(!relay.publish("s1", StreamEvent::Token("early".into())));

        relay.subscribe("s1").await.unwrap();
        assert!(relay.publish("s1", StreamEvent::Token("hello".into())));
        assert_eq!(rx.recv().await, Some(StreamEvent::Token("hello".into())));

        relay.unsubscribe("s1").await.unwrap();
        assert!(!relay.is_subscribed("s1"));
        assert!(!relay.publish("s1", StreamEvent::Token("late".into())));
    }

    #[tokio::test]
    async fn overlapping_subscriptions_are_counted() {
        let relay = LocalRelay::new(Arc::new(StreamRegistry::new()));

        relay.subscribe("s1").await.unwrap();
        relay.subscribe("s1").await.unwrap();
        relay.unsubscribe("s1").await.unwrap();
        assert!(relay.is_subscribed("s1"));

        relay.unsubscribe("s1").await.unwrap();
        relay.unsubscribe("s1").await.unwrap();
        assert!(!relay.is_subscribed("s1"));
    }
}
