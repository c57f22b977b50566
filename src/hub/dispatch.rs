use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::{FollowEdge, GraphStore, UserId, UNRESOLVED_USER_ID};
use crate::error::AppError;
use crate::hub::fanout::Broadcaster;
use crate::hub::registry::{ConnectionId, Session};
use crate::protocol::Envelope;

/// An authenticated request waiting for the dispatch loop.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub connection: ConnectionId,
    pub session: Session,
    pub envelope: Envelope,
}

/// Single consumer of the work queue. Every state-mutating request runs
/// here, one at a time, in the order the queue yields them.
pub struct Dispatcher {
    store: Arc<dyn GraphStore>,
    broadcaster: Broadcaster,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn GraphStore>, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    pub fn spawn(self, queue: mpsc::Receiver<WorkItem>) -> JoinHandle<()> {
        tokio::spawn(self.run(queue))
    }

    /// Drain the queue until every sender is gone. Neither a handler error
    /// nor a handler panic stops the loop.
    pub async fn run(self, mut queue: mpsc::Receiver<WorkItem>) {
        while let Some(item) = queue.recv().await {
            let username = item.session.username.clone();
            let kind = item.envelope.kind().tag();
            tracing::debug!("{} posted a {} request as authenticated user", username, kind);

            match AssertUnwindSafe(self.handle(item)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("❌ {} request from {} failed: {}", kind, username, e),
                Err(_) => tracing::error!("❌ {} request from {} panicked", kind, username),
            }
        }
        tracing::info!("Dispatch loop stopped");
    }

    pub async fn handle(&self, item: WorkItem) -> Result<(), AppError> {
        let WorkItem {
            connection,
            session,
            envelope,
        } = item;

        match envelope {
            Envelope::Post(post) => {
                warn_on_identity_mismatch(&session, &post.username, "post");
                self.post(&session.username, post.content).await
            }
            Envelope::FollowRequest(req) => {
                warn_on_identity_mismatch(&session, &req.requestor, "makeFollowRequest");
                self.follow_request(connection, &session.username, &req.followed).await
            }
            Envelope::FriendRequest(req) => {
                warn_on_identity_mismatch(&session, &req.requestor, "makeFriendRequest");
                self.friend_request(connection, &session.username, &req.requested).await
            }
            Envelope::ListFriendRequests(req) => {
                warn_on_identity_mismatch(&session, &req.username, "listFriendRequests");
                self.list_friend_requests(connection, &session.username).await
            }
            // TODO: add an acceptFriendRequest handler that sets friend_accepted
            // once the acceptance flow (who may accept, what gets notified) is decided.
            other => {
                tracing::warn!(
                    "Unknown Type: {} from {}, dropping",
                    other.kind().tag(),
                    session.username
                );
                Ok(())
            }
        }
    }

    /// Persist, then fan out to everyone else. The fan-out happens even when
    /// the insert fails: delivery is preferred over durability.
    async fn post(&self, sender: &str, content: String) -> Result<(), AppError> {
        if let Err(e) = self.store.insert_post(sender, &content).await {
            tracing::warn!("⚠️ DB insert error for post by {}: {}", sender, e);
        }

        let envelope = Envelope::post(sender, content);
        let delivered = self.broadcaster.deliver_to_all(sender, &envelope).await;
        tracing::debug!("✅ Post by {} delivered to {} connection(s)", sender, delivered);
        Ok(())
    }

    async fn follow_request(
        &self,
        connection: ConnectionId,
        requestor: &str,
        followed: &str,
    ) -> Result<(), AppError> {
        let requestor_id = self.resolve(requestor).await;
        let followed_id = self.resolve(followed).await;

        if let Err(e) = self
            .store
            .insert_edge(FollowEdge::follow(followed_id, requestor_id))
            .await
        {
            tracing::warn!("⚠️ DB insert error for follow {} -> {}: {}", requestor, followed, e);
        }

        let confirmation =
            Envelope::server_response(requestor, true, format!("✅ request sent to {}!", followed));
        self.broadcaster.deliver_to_connection(connection, &confirmation).await;

        tracing::debug!("⏱️ Notifying {} of follow by {}", followed, requestor);
        let notification = Envelope::post(requestor, format!("✅ {} is following you!", requestor));
        self.broadcaster.deliver_to(followed, &notification).await;
        Ok(())
    }

    async fn friend_request(
        &self,
        connection: ConnectionId,
        requestor: &str,
        requested: &str,
    ) -> Result<(), AppError> {
        let requestor_id = self.resolve(requestor).await;
        let requested_id = self.resolve(requested).await;

        if let Err(e) = self
            .store
            .insert_edge(FollowEdge::friend_request(requested_id, requestor_id))
            .await
        {
            tracing::warn!(
                "⚠️ DB insert error for friend request {} -> {}: {}",
                requestor,
                requested,
                e
            );
        }

        let confirmation = Envelope::server_response(
            requestor,
            true,
            format!("✅ friend request sent to {}!", requested),
        );
        self.broadcaster.deliver_to_connection(connection, &confirmation).await;

        tracing::debug!("⏱️ Notifying {} of friend request by {}", requested, requestor);
        let notification =
            Envelope::post(requestor, format!("✅ {} sent you a friend request!", requestor));
        self.broadcaster.deliver_to(requested, &notification).await;
        Ok(())
    }

    async fn list_friend_requests(
        &self,
        connection: ConnectionId,
        username: &str,
    ) -> Result<(), AppError> {
        let failed = Envelope::server_response(username, false, "could not list friend requests");

        // An unknown user has no incoming requests; never list the sentinel's.
        let user_id = match self.store.resolve_user_id(username).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::warn!("⚠️ No user named {}, listing no friend requests", username);
                self.broadcaster
                    .deliver_to_connection(connection, &Envelope::server_response(username, true, ""))
                    .await;
                return Ok(());
            }
            Err(e) => {
                self.broadcaster.deliver_to_connection(connection, &failed).await;
                return Err(e);
            }
        };

        let response = match self.store.list_incoming_friend_requests(user_id).await {
            Ok(usernames) => Envelope::server_response(username, true, usernames.join(",")),
            Err(e) => {
                self.broadcaster.deliver_to_connection(connection, &failed).await;
                return Err(e);
            }
        };

        self.broadcaster.deliver_to_connection(connection, &response).await;
        Ok(())
    }

    /// Unknown users and lookup failures both resolve to the sentinel id so
    /// the request still goes through.
    async fn resolve(&self, username: &str) -> UserId {
        match self.store.resolve_user_id(username).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::warn!("⚠️ No user named {}, using id {}", username, UNRESOLVED_USER_ID);
                UNRESOLVED_USER_ID
            }
            Err(e) => {
                tracing::warn!("⚠️ DB select error for {}: {}", username, e);
                UNRESOLVED_USER_ID
            }
        }
    }
}

fn warn_on_identity_mismatch(session: &Session, claimed: &str, kind: &str) {
    if claimed != session.username {
        tracing::warn!(
            "{} from {} names {} as the acting user, using the session user",
            kind,
            session.username,
            claimed
        );
    }
}
