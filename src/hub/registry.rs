use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::protocol::Envelope;

/// Opaque handle of one live connection. Handles are never reused, so a
/// stale handle can be removed without touching a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub authenticated: bool,
}

/// A registry entry as handed out by lookups: enough to write to the
/// connection after the registry lock has been released.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub id: ConnectionId,
    pub session: Session,
    pub outbound: mpsc::Sender<Envelope>,
}

struct Entry {
    session: Session,
    outbound: mpsc::Sender<Envelope>,
    closed: CancellationToken,
}

/// Table of live connections. One lock covers point operations and
/// whole-table iteration alike, so removal by a reader task can never race
/// a fan-out walk over the table.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<Mutex<BTreeMap<ConnectionId, Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection with an unauthenticated, anonymous session. The
    /// registry holds the only long-lived sender for `outbound`.
    pub async fn register(&self, outbound: mpsc::Sender<Envelope>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut entries = self.entries.lock().await;
        entries.insert(
            id,
            Entry {
                session: Session::default(),
                outbound,
                closed: CancellationToken::new(),
            },
        );
        id
    }

    /// Mark the session authenticated as `username`. Repeated calls
    /// overwrite the username. Returns false if the connection is gone.
    pub async fn authenticate(&self, id: ConnectionId, username: &str) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&id) {
            Some(entry) => {
                entry.session = Session {
                    username: username.to_string(),
                    authenticated: true,
                };
                true
            }
            None => false,
        }
    }

    /// Drop the entry and fire its close signal. Returns whether it was
    /// present.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        match self.entries.lock().await.remove(&id) {
            Some(entry) => {
                entry.closed.cancel();
                true
            }
            None => false,
        }
    }

    /// Token cancelled when `id` leaves the registry. Already cancelled if
    /// the connection is gone.
    pub async fn closed_signal(&self, id: ConnectionId) -> CancellationToken {
        match self.entries.lock().await.get(&id) {
            Some(entry) => entry.closed.clone(),
            None => {
                let token = CancellationToken::new();
                token.cancel();
                token
            }
        }
    }

    pub async fn session(&self, id: ConnectionId) -> Option<Session> {
        self.entries.lock().await.get(&id).map(|entry| entry.session.clone())
    }

    pub async fn recipient(&self, id: ConnectionId) -> Option<Recipient> {
        self.entries.lock().await.get(&id).map(|entry| Recipient {
            id,
            session: entry.session.clone(),
            outbound: entry.outbound.clone(),
        })
    }

    /// Every authenticated connection bound to `username`. Usually zero or
    /// one, but several logins under one name are allowed.
    pub async fn find(&self, username: &str) -> Vec<Recipient> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|(_, entry)| entry.session.authenticated && entry.session.username == username)
            .map(|(id, entry)| Recipient {
                id: *id,
                session: entry.session.clone(),
                outbound: entry.outbound.clone(),
            })
            .collect()
    }

    /// All connections in registration order.
    pub async fn snapshot(&self) -> Vec<Recipient> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .map(|(id, entry)| Recipient {
                id: *id,
                session: entry.session.clone(),
                outbound: entry.outbound.clone(),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>) {
        mpsc::channel(8)
    }

    #[tokio::test]
    async fn test_register_starts_unauthenticated() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;

        assert_eq!(registry.session(id).await, Some(Session::default()));
        assert!(registry.find("").await.is_empty());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_authenticate_last_write_wins() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;

        assert!(registry.authenticate(id, "alice").await);
        assert!(registry.authenticate(id, "alice2").await);

        let session = registry.session(id).await.unwrap();
        assert_eq!(session.username, "alice2");
        assert!(session.authenticated);
        assert!(registry.find("alice").await.is_empty());
        assert_eq!(registry.find("alice2").await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_immediately_visible() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;
        registry.authenticate(id, "bob").await;

        assert!(registry.remove(id).await);
        assert!(!registry.remove(id).await);
        assert!(registry.find("bob").await.is_empty());
        assert!(registry.snapshot().await.iter().all(|r| r.id != id));
        assert!(!registry.authenticate(id, "bob").await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_removing_entry_closes_outbound() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = channel();
        let id = registry.register(tx).await;

        registry.remove(id).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_remove_fires_close_signal() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;
        let closed = registry.closed_signal(id).await;
        assert!(!closed.is_cancelled());

        registry.remove(id).await;
        assert!(closed.is_cancelled());
        assert!(registry.closed_signal(id).await.is_cancelled());
    }

    #[tokio::test]
    async fn test_find_returns_every_binding() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();
        let a = registry.register(tx1).await;
        let b = registry.register(tx2).await;
        registry.authenticate(a, "carol").await;
        registry.authenticate(b, "carol").await;

        let ids: Vec<_> = registry.find("carol").await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn test_snapshot_is_in_registration_order() {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let (tx, rx) = channel();
            receivers.push(rx);
            ids.push(registry.register(tx).await);
        }
        registry.remove(ids[2]).await;
        ids.remove(2);

        let snapshot: Vec<_> = registry.snapshot().await.into_iter().map(|r| r.id).collect();
        assert_eq!(snapshot, ids);
    }

    #[tokio::test]
    async fn test_concurrent_register_and_remove() {
        let registry = ConnectionRegistry::new();
        let mut tasks = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::channel(1);
                let id = registry.register(tx).await;
                registry.authenticate(id, &format!("user{}", i)).await;
                let _ = registry.snapshot().await;
                registry.remove(id).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert!(registry.is_empty().await);
    }
}
