use crate::pipeline::context::{ConversationContext, QueryHistory};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

/// Request/response header carrying the session id.
pub const SESSION_HEADER: &str = "x-session-id";

const MAX_SESSION_ID_LEN: usize = 64;

/// Per-browser state. Nothing in here is shared between sessions.
#[derive(Debug)]
pub struct Session {
    pub conversation: ConversationContext,
    pub history: QueryHistory,
}

impl Session {
    fn new(history_limit: usize) -> Self {
        Self {
            conversation: ConversationContext::new(),
            history: QueryHistory::new(history_limit),
        }
    }
}

struct Slot {
    session: Arc<Mutex<Session>>,
    last_seen: Instant,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Slot>>,
    idle_timeout: Duration,
    history_limit: usize,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration, history_limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
            history_limit,
        }
    }

    /// Returns the session for `requested`, creating it when unknown. Ids that
    /// are missing or malformed get a fresh UUID instead. Idle sessions are
    /// dropped on the way.
    pub async fn checkout(&self, requested: Option<&str>) -> (String, Arc<Mutex<Session>>) {
        let id = match requested.map(str::trim) {
            Some(id) if is_valid_id(id) => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        self.prune_locked(&mut sessions, now);

        let slot = sessions.entry(id.clone()).or_insert_with(|| {
            debug!("Opening session {}", id);
            Slot {
                session: Arc::new(Mutex::new(Session::new(self.history_limit))),
                last_seen: now,
            }
        });
        slot.last_seen = now;

        (id, Arc::clone(&slot.session))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn prune_locked(&self, sessions: &mut HashMap<String, Slot>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, slot| now.duration_since(slot.last_seen) <= self.idle_timeout);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!("Pruned {} idle session(s)", pruned);
        }
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::ConversationTurn;

    #[tokio::test]
    async fn missing_or_malformed_ids_are_minted() {
        let store = SessionStore::new(Duration::from_secs(60), 10);

        let (minted, _) = store.checkout(None).await;
        assert!(uuid::Uuid::parse_str(&minted).is_ok());

        let (replaced, _) = store.checkout(Some("bad id\r\n")).await;
        assert_ne!(replaced, "bad id\r\n");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn same_id_returns_same_session() {
        let store = SessionStore::new(Duration::from_secs(60), 10);

        let (id, first) = store.checkout(Some("abc-123")).await;
        first.lock().await.conversation.append(ConversationTurn::user("hi"));
        let (again, second) = store.checkout(Some(id.as_str())).await;

        assert_eq!(again, "abc-123");
        assert_eq!(second.lock().await.conversation.len(), 1);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new(Duration::from_secs(60), 10);

        let (_, a) = store.checkout(Some("a")).await;
        let (_, b) = store.checkout(Some("b")).await;
        a.lock().await.history.record("q", "SELECT 1;", 1);

        assert_eq!(a.lock().await.history.len(), 1);
        assert_eq!(b.lock().await.history.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_pruned_on_access() {
        let store = SessionStore::new(Duration::from_secs(60), 10);
        let (_, old) = store.checkout(Some("old")).await;
        old.lock().await.conversation.append(ConversationTurn::user("hi"));

        tokio::time::advance(Duration::from_secs(61)).await;
        let (_, fresh) = store.checkout(Some("old")).await;

        assert!(fresh.lock().await.conversation.is_empty());
        assert_eq!(store.len().await, 1);
    }
}
