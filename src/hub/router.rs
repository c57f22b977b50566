use std::sync::Arc;

use tokio::sync::mpsc;

use crate::auth::{AuthOutcome, Authenticator};
use crate::hub::dispatch::WorkItem;
use crate::hub::fanout::Broadcaster;
use crate::hub::registry::{ConnectionId, ConnectionRegistry};
use crate::protocol::{Envelope, Login, ProtocolError};

/// What the reader task should do after a frame has been routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// The connection has been deregistered; stop reading.
    Close,
}

/// Per-frame authentication gate. Unauthenticated connections may only
/// log in; anything else closes them. Authenticated requests are queued
/// for the dispatch loop.
#[derive(Clone)]
pub struct MessageRouter {
    registry: ConnectionRegistry,
    broadcaster: Broadcaster,
    authenticator: Arc<dyn Authenticator>,
    work_queue: mpsc::Sender<WorkItem>,
}

impl MessageRouter {
    pub fn new(
        broadcaster: Broadcaster,
        authenticator: Arc<dyn Authenticator>,
        work_queue: mpsc::Sender<WorkItem>,
    ) -> Self {
        Self {
            registry: broadcaster.registry().clone(),
            broadcaster,
            authenticator,
            work_queue,
        }
    }

    pub async fn route(&self, id: ConnectionId, raw: &str) -> Verdict {
        // Registry removal is authoritative: a pruned connection stops here.
        let Some(session) = self.registry.session(id).await else {
            tracing::debug!("{} is no longer registered, closing", id);
            return Verdict::Close;
        };

        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(ProtocolError::UnknownType(tag)) => {
                tracing::warn!("Unknown Type: {} from {}, dropping", tag, id);
                return Verdict::Continue;
            }
            Err(e) => {
                tracing::warn!("❌ Error decoding envelope from {}: {}", id, e);
                return Verdict::Continue;
            }
        };

        match envelope {
            Envelope::Login(login) => self.login(id, login).await,
            envelope if !session.authenticated => {
                tracing::warn!(
                    "❌ Client not authenticated, {} attempted {}; closing",
                    id,
                    envelope.kind().tag()
                );
                self.registry.remove(id).await;
                Verdict::Close
            }
            Envelope::LoginResponse(_) | Envelope::ServerResponse(_) => {
                tracing::warn!(
                    "{} sent a server-only {} envelope, dropping",
                    id,
                    envelope.kind().tag()
                );
                Verdict::Continue
            }
            envelope => {
                let item = WorkItem {
                    connection: id,
                    session,
                    envelope,
                };
                if self.work_queue.send(item).await.is_err() {
                    tracing::error!("❌ Dispatch loop is gone, closing {}", id);
                    self.registry.remove(id).await;
                    return Verdict::Close;
                }
                Verdict::Continue
            }
        }
    }

    async fn login(&self, id: ConnectionId, login: Login) -> Verdict {
        tracing::info!("🦾 Login attempt for {} on {}", login.username, id);

        let outcome = match self.authenticator.verify(&login.username, &login.password).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("❌ Authenticator failed for {}: {}", login.username, e);
                AuthOutcome::rejected()
            }
        };

        if outcome.success {
            self.registry.authenticate(id, &login.username).await;
            tracing::info!("🐝 Login Success for {}", login.username);
            self.broadcaster
                .deliver_to_connection(id, &Envelope::login_response(true, outcome.message))
                .await;
            return Verdict::Continue;
        }

        tracing::info!("❌ Login Unsuccessful for {}", login.username);
        self.broadcaster
            .deliver_to_connection(id, &Envelope::login_response(false, outcome.message))
            .await;
        self.registry.remove(id).await;
        Verdict::Close
    }

    /// Deregister after a read error or close frame. Safe to call after the
    /// connection was already removed.
    pub async fn disconnect(&self, id: ConnectionId) {
        if self.registry.remove(id).await {
            tracing::info!("❌ Disconnecting {}", id);
        }
    }
}
