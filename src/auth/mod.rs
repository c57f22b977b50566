//! Credential verification for the hub's login gate.

pub mod password;

pub use password::{generate_salt, hash_password, verify_password};

use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use crate::db::UserRepository;
use crate::error::AppError;

/// Result of a credential check. `message` is shown to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: String,
}

impl AuthOutcome {
    pub fn accepted() -> Self {
        Self {
            success: true,
            message: "✅ Login successful!".to_string(),
        }
    }

    pub fn rejected() -> Self {
        Self {
            success: false,
            message: "❌ Login unsuccessful!".to_string(),
        }
    }
}

/// Verifies a username/password pair. Implementations must not touch the
/// connection registry.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> Result<AuthOutcome, AppError>;
}

/// Checks passwords against the argon2id hashes stored in the `users` table.
#[derive(Clone)]
pub struct PasswordAuthenticator {
    db: Pool<Sqlite>,
}

impl PasswordAuthenticator {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Authenticator for PasswordAuthenticator {
    async fn verify(&self, username: &str, password: &str) -> Result<AuthOutcome, AppError> {
        let Some(user) = UserRepository::get_by_username(&self.db, username).await? else {
            // Same answer as a wrong password so usernames can't be probed.
            return Ok(AuthOutcome::rejected());
        };

        if verify_password(password, &user.password_hash, &user.password_salt)? {
            Ok(AuthOutcome::accepted())
        } else {
            Ok(AuthOutcome::rejected())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;
    use crate::db::NewUser;

    #[tokio::test]
    async fn test_password_authenticator() {
        let pool = memory_pool().await;
        let salt = generate_salt();
        let hash = hash_password("correct horse", &salt).unwrap();
        UserRepository::create(
            &pool,
            NewUser {
                username: "alice".to_string(),
                ..NewUser::default()
            },
            &hash,
            &salt,
        )
        .await
        .unwrap();

        let auth = PasswordAuthenticator::new(pool);
        assert_eq!(auth.verify("alice", "correct horse").await.unwrap(), AuthOutcome::accepted());
        assert_eq!(auth.verify("alice", "battery staple").await.unwrap(), AuthOutcome::rejected());
        assert_eq!(auth.verify("mallory", "correct horse").await.unwrap(), AuthOutcome::rejected());
    }
}
