use std::time::Duration;

use tokio::sync::mpsc::error::SendTimeoutError;

use crate::hub::registry::{ConnectionId, ConnectionRegistry, Recipient};
use crate::protocol::Envelope;

/// Delivers envelopes to live connections. A failed or timed-out write
/// prunes that one connection and never affects the other recipients.
#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
    write_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Send to every connection authenticated as `username`. Returns the
    /// number of successful writes; zero when the user is offline.
    pub async fn deliver_to(&self, username: &str, envelope: &Envelope) -> usize {
        let recipients = self.registry.find(username).await;
        if recipients.is_empty() {
            tracing::debug!("📭 {} is not connected, dropping {}", username, envelope.kind().tag());
            return 0;
        }
        self.write_all(recipients, envelope).await
    }

    /// Send to every authenticated connection except those bound to
    /// `except_username`.
    pub async fn deliver_to_all(&self, except_username: &str, envelope: &Envelope) -> usize {
        let recipients = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|r| r.session.authenticated && r.session.username != except_username)
            .collect();
        self.write_all(recipients, envelope).await
    }

    /// Send to one specific connection, whatever its session state.
    pub async fn deliver_to_connection(&self, id: ConnectionId, envelope: &Envelope) -> bool {
        match self.registry.recipient(id).await {
            Some(recipient) => self.write(recipient, envelope.clone()).await,
            None => false,
        }
    }

    async fn write_all(&self, recipients: Vec<Recipient>, envelope: &Envelope) -> usize {
        let mut delivered = 0;
        for recipient in recipients {
            if self.write(recipient, envelope.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    async fn write(&self, recipient: Recipient, envelope: Envelope) -> bool {
        match recipient.outbound.send_timeout(envelope, self.write_timeout).await {
            Ok(()) => {
                tracing::trace!("✅ Sent to {} ({})", recipient.session.username, recipient.id);
                true
            }
            Err(err) => {
                let reason = match err {
                    SendTimeoutError::Timeout(_) => "write timed out",
                    SendTimeoutError::Closed(_) => "connection closed",
                };
                tracing::warn!(
                    "⚠️ Send error to {} ({}): {}, pruning connection",
                    recipient.session.username,
                    recipient.id,
                    reason
                );
                self.registry.remove(recipient.id).await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn connect(
        registry: &ConnectionRegistry,
        username: &str,
        capacity: usize,
    ) -> (ConnectionId, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        let id = registry.register(tx).await;
        registry.authenticate(id, username).await;
        (id, rx)
    }

    fn broadcaster(registry: &ConnectionRegistry) -> Broadcaster {
        Broadcaster::new(registry.clone(), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_deliver_to_all_skips_excluded_user() {
        let registry = ConnectionRegistry::new();
        let (_, mut alice) = connect(&registry, "alice", 4).await;
        let (_, mut bob) = connect(&registry, "bob", 4).await;
        let (_, mut carol) = connect(&registry, "carol", 4).await;

        let msg = Envelope::post("alice", "hi");
        assert_eq!(broadcaster(&registry).deliver_to_all("alice", &msg).await, 2);

        assert_eq!(bob.try_recv().unwrap(), msg);
        assert_eq!(carol.try_recv().unwrap(), msg);
        assert!(alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_to_all_skips_unauthenticated() {
        let registry = ConnectionRegistry::new();
        let (tx, mut anonymous) = mpsc::channel(4);
        registry.register(tx).await;
        let (_, mut bob) = connect(&registry, "bob", 4).await;

        let msg = Envelope::post("alice", "hi");
        assert_eq!(broadcaster(&registry).deliver_to_all("alice", &msg).await, 1);
        assert!(bob.try_recv().is_ok());
        assert!(anonymous.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_recipient_is_pruned_and_others_still_receive() {
        let registry = ConnectionRegistry::new();
        let (bob_id, bob) = connect(&registry, "bob", 4).await;
        let (carol_id, mut carol) = connect(&registry, "carol", 4).await;
        drop(bob);

        let msg = Envelope::post("alice", "hi");
        assert_eq!(broadcaster(&registry).deliver_to_all("alice", &msg).await, 1);

        assert_eq!(carol.try_recv().unwrap(), msg);
        assert!(registry.session(bob_id).await.is_none());
        assert!(registry.session(carol_id).await.is_some());
    }

    #[tokio::test]
    async fn test_slow_recipient_times_out_and_is_pruned() {
        let registry = ConnectionRegistry::new();
        // Capacity 1 and never drained: the second write has to time out.
        let (slow_id, _slow) = connect(&registry, "slow", 1).await;
        let (_, mut fast) = connect(&registry, "fast", 4).await;
        let hub = broadcaster(&registry);

        assert_eq!(hub.deliver_to_all("alice", &Envelope::post("alice", "one")).await, 2);
        assert_eq!(hub.deliver_to_all("alice", &Envelope::post("alice", "two")).await, 1);

        assert!(registry.session(slow_id).await.is_none());
        assert_eq!(fast.try_recv().unwrap(), Envelope::post("alice", "one"));
        assert_eq!(fast.try_recv().unwrap(), Envelope::post("alice", "two"));
    }

    #[tokio::test]
    async fn test_deliver_to_offline_user_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        let (_, mut bob) = connect(&registry, "bob", 4).await;

        let msg = Envelope::post("alice", "psst");
        assert_eq!(broadcaster(&registry).deliver_to("dave", &msg).await, 0);
        assert!(bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_to_reaches_every_connection_of_user() {
        let registry = ConnectionRegistry::new();
        let (_, mut phone) = connect(&registry, "bob", 4).await;
        let (laptop_id, laptop) = connect(&registry, "bob", 4).await;
        drop(laptop);

        let msg = Envelope::post("alice", "ping");
        assert_eq!(broadcaster(&registry).deliver_to("bob", &msg).await, 1);
        assert_eq!(phone.try_recv().unwrap(), msg);
        assert!(registry.session(laptop_id).await.is_none());
    }

    #[tokio::test]
    async fn test_deliver_to_connection_ignores_auth_state() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        let id = registry.register(tx).await;

        let msg = Envelope::login_response(false, "nope");
        assert!(broadcaster(&registry).deliver_to_connection(id, &msg).await);
        assert_eq!(rx.try_recv().unwrap(), msg);

        registry.remove(id).await;
        assert!(!broadcaster(&registry).deliver_to_connection(id, &msg).await);
    }
}
