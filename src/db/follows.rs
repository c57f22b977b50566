use sqlx::{Pool, Sqlite};
use crate::db::models::{FollowEdge, UserId};
use crate::error::AppError;

pub struct FollowRepository;

impl FollowRepository {
    pub async fn insert(pool: &Pool<Sqlite>, edge: &FollowEdge) -> Result<(), AppError> {
        let created_at = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
INSERT INTO follow (poster_user_id, follower_user_id, friend_requested, friend_accepted, created_at)
VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(edge.poster_user_id)
        .bind(edge.follower_user_id)
        .bind(edge.friend_requested)
        .bind(edge.friend_accepted)
        .bind(created_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Usernames of everyone with a pending friend request pointing at `user_id`,
    /// in insertion order.
    pub async fn incoming_friend_requests(
        pool: &Pool<Sqlite>,
        user_id: UserId,
    ) -> Result<Vec<String>, AppError> {
        let usernames = sqlx::query_scalar::<_, String>(
            r#"
SELECT u.username
FROM users u
INNER JOIN follow f ON f.follower_user_id = u.id
WHERE f.friend_requested = TRUE
AND f.poster_user_id = ?
ORDER BY f.id ASC
            "#
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(usernames)
    }

    pub async fn edges_for_poster(
        pool: &Pool<Sqlite>,
        user_id: UserId,
    ) -> Result<Vec<FollowEdge>, AppError> {
        let edges = sqlx::query_as::<_, FollowEdge>(
            r#"
SELECT poster_user_id, follower_user_id, friend_requested, friend_accepted
FROM follow
WHERE poster_user_id = ?
ORDER BY id ASC
            "#
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(edges)
    }
}
