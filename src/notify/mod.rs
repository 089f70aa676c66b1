//! Real-time notification dispatch.
//!
//! Maps a user id to the set of live WebSocket sessions for that user and
//! fans status-change events out to them. Delivery is best-effort: the
//! authoritative state is the transaction record, readable on the next
//! query; a closed session is pruned silently.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    TransactionConfirmed,
    TransactionReceived,
    TransactionFailed,
    BalanceUpdated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TransactionConfirmed => "transaction-confirmed",
            EventKind::TransactionReceived => "transaction-received",
            EventKind::TransactionFailed => "transaction-failed",
            EventKind::BalanceUpdated => "balance-updated",
        }
    }
}

/// One status-change event for one user. The payload is a flat map of
/// primitive fields (ids, decimal-string amounts, hash, block number).
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub user_id: Uuid,
    pub kind: EventKind,
    pub payload: Value,
}

type SessionMap = HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<NotificationEvent>>>;

#[derive(Default)]
pub struct NotificationDispatcher {
    sessions: RwLock<SessionMap>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new delivery channel for a user. Returns the session id
    /// (for unsubscribe) and the receiving end.
    pub async fn subscribe(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();
        self.sessions
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(session_id, tx);
        (session_id, rx)
    }

    pub async fn unsubscribe(&self, user_id: Uuid, session_id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if let Some(user_sessions) = sessions.get_mut(&user_id) {
            user_sessions.remove(&session_id);
            if user_sessions.is_empty() {
                sessions.remove(&user_id);
            }
        }
    }

    /// Delivers an event to every live session of `user_id`. Sessions whose
    /// receiver has gone away are dropped from the map.
    pub async fn emit(&self, user_id: Uuid, kind: EventKind, payload: Value) {
        let dead: Vec<Uuid> = {
            let sessions = self.sessions.read().await;
            let Some(user_sessions) = sessions.get(&user_id) else {
                tracing::debug!(%user_id, kind = kind.as_str(), "no live sessions, dropping notification");
                return;
            };

            user_sessions
                .iter()
                .filter_map(|(session_id, tx)| {
                    let event = NotificationEvent {
                        user_id,
                        kind,
                        payload: payload.clone(),
                    };
                    tx.send(event).is_err().then_some(*session_id)
                })
                .collect()
        };

        if !dead.is_empty() {
            let mut sessions = self.sessions.write().await;
            if let Some(user_sessions) = sessions.get_mut(&user_id) {
                for session_id in dead {
                    user_sessions.remove(&session_id);
                }
                if user_sessions.is_empty() {
                    sessions.remove(&user_id);
                }
            }
        }
    }

    pub async fn session_count(&self, user_id: Uuid) -> usize {
        self.sessions
            .read()
            .await
            .get(&user_id)
            .map_or(0, HashMap::len)
    }
}
