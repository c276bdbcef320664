use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionChange {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Pushed to WebSocket subscribers. Session events are addressed by
/// account id, balance events by profile id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionChanged {
        account_id: Uuid,
        change: SessionChange,
    },
    BalanceChanged {
        user_id: Uuid,
        balance: i64,
        delta: i64,
        action_type: String,
    },
}

impl ServerEvent {
    pub fn audience(&self) -> Uuid {
        match self {
            ServerEvent::SessionChanged { account_id, .. } => *account_id,
            ServerEvent::BalanceChanged { user_id, .. } => *user_id,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire-and-forget; having no subscribers is not an error.
    pub fn publish(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
