use sqlx::{Pool, Sqlite};
use crate::db::models::{NewUser, User, UserId};
use crate::error::AppError;

pub struct UserRepository;

impl UserRepository {
    pub async fn create(
        pool: &Pool<Sqlite>,
        new_user: NewUser,
        password_hash: &[u8; 32],
        password_salt: &[u8; 32],
    ) -> Result<User, AppError> {
        let created_at = chrono::Utc::now().timestamp();

        let user = sqlx::query_as::<_, User>(
            r#"
INSERT INTO users (username, first_name, last_name, profile, logged_in, password_hash, password_salt, created_at)
VALUES (?, ?, ?, ?, FALSE, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(&new_user.username)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.profile)
        .bind(password_hash.as_slice())
        .bind(password_salt.as_slice())
        .bind(created_at)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn get_by_username(
        pool: &Pool<Sqlite>,
        username: &str,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE username = ?"
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn get_id_by_username(
        pool: &Pool<Sqlite>,
        username: &str,
    ) -> Result<Option<UserId>, AppError> {
        let id = sqlx::query_scalar::<_, UserId>(
            "SELECT id FROM users WHERE username = ?"
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(id)
    }
}
