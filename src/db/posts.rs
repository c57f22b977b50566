use sqlx::{Pool, Sqlite};
use crate::db::models::StoredPost;
use crate::error::AppError;

pub struct PostRepository;

impl PostRepository {
    pub async fn create(
        pool: &Pool<Sqlite>,
        sender: &str,
        content: &str,
    ) -> Result<StoredPost, AppError> {
        let created_at = chrono::Utc::now().timestamp();

        let post = sqlx::query_as::<_, StoredPost>(
            r#"
INSERT INTO messages (sender, content, created_at)
VALUES (?, ?, ?)
RETURNING *
            "#,
        )
        .bind(sender)
        .bind(content)
        .bind(created_at)
        .fetch_one(pool)
        .await?;

        Ok(post)
    }

    #[cfg(test)]
    pub async fn get_recent(
        pool: &Pool<Sqlite>,
        limit: i64,
    ) -> Result<Vec<StoredPost>, AppError> {
        let posts = sqlx::query_as::<_, StoredPost>(
            r#"
SELECT id, sender, content, created_at
FROM messages
ORDER BY id DESC
LIMIT ?
            "#
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(posts)
    }
}
