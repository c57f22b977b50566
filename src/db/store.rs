use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use crate::db::models::{FollowEdge, UserId};
use crate::db::{FollowRepository, PostRepository, UserRepository};
use crate::error::AppError;

/// Persistence for posts and the follow/friend graph, as seen by the hub's
/// request handlers. Each call is one bounded unit of work; implementations
/// must tolerate concurrent callers.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn resolve_user_id(&self, username: &str) -> Result<Option<UserId>, AppError>;

    async fn insert_post(&self, username: &str, content: &str) -> Result<(), AppError>;

    async fn insert_edge(&self, edge: FollowEdge) -> Result<(), AppError>;

    async fn list_incoming_friend_requests(&self, user_id: UserId) -> Result<Vec<String>, AppError>;
}

#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: Pool<Sqlite>,
}

impl SqliteGraphStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn resolve_user_id(&self, username: &str) -> Result<Option<UserId>, AppError> {
        UserRepository::get_id_by_username(&self.pool, username).await
    }

    async fn insert_post(&self, username: &str, content: &str) -> Result<(), AppError> {
        PostRepository::create(&self.pool, username, content).await?;
        Ok(())
    }

    async fn insert_edge(&self, edge: FollowEdge) -> Result<(), AppError> {
        FollowRepository::insert(&self.pool, &edge).await
    }

    async fn list_incoming_friend_requests(&self, user_id: UserId) -> Result<Vec<String>, AppError> {
        FollowRepository::incoming_friend_requests(&self.pool, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{add_user, memory_pool};

    #[tokio::test]
    async fn test_resolve_user_id() {
        let pool = memory_pool().await;
        let store = SqliteGraphStore::new(pool.clone());
        let alice = add_user(&pool, "alice").await;

        assert_eq!(store.resolve_user_id("alice").await.unwrap(), Some(alice));
        assert_eq!(store.resolve_user_id("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_post() {
        let pool = memory_pool().await;
        let store = SqliteGraphStore::new(pool.clone());

        store.insert_post("alice", "hello").await.unwrap();

        let posts = PostRepository::get_recent(&pool, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].sender, "alice");
        assert_eq!(posts[0].content, "hello");
    }

    #[tokio::test]
    async fn test_follow_edge_is_not_a_friend_request() {
        let pool = memory_pool().await;
        let store = SqliteGraphStore::new(pool.clone());
        let alice = add_user(&pool, "alice").await;
        let bob = add_user(&pool, "bob").await;

        store.insert_edge(FollowEdge::follow(bob, alice)).await.unwrap();

        let edges = FollowRepository::edges_for_poster(&pool, bob).await.unwrap();
        assert_eq!(edges, vec![FollowEdge::follow(bob, alice)]);
        assert!(!edges[0].friend_requested);
        assert!(store.list_incoming_friend_requests(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_incoming_friend_requests() {
        let pool = memory_pool().await;
        let store = SqliteGraphStore::new(pool.clone());
        let carol = add_user(&pool, "carol").await;
        let dave = add_user(&pool, "dave").await;
        let erin = add_user(&pool, "erin").await;

        store.insert_edge(FollowEdge::friend_request(carol, dave)).await.unwrap();
        store.insert_edge(FollowEdge::friend_request(carol, erin)).await.unwrap();
        // Outgoing request from carol must not show up in her own list.
        store.insert_edge(FollowEdge::friend_request(dave, carol)).await.unwrap();

        let names = store.list_incoming_friend_requests(carol).await.unwrap();
        assert_eq!(names, vec!["dave".to_string(), "erin".to_string()]);
    }
}
