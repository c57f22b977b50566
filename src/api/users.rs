use axum::{
    extract::State,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::auth::{generate_salt, hash_password};
use crate::db::{NewUser, UserId, UserRepository};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub profile: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
    pub username: String,
}

/// Validate and sanitize username
pub fn validate_username(username: &str) -> Result<String, AppError> {
    let trimmed = username.trim();

    if trimmed.len() < 3 || trimmed.len() > 32 {
        return Err(AppError::Validation("Username must be 3-32 characters".to_string()));
    }

    if !trimmed.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::Validation("Username must be alphanumeric, underscore, or hyphen".to_string()));
    }

    // Convert to lowercase for consistency
    Ok(trimmed.to_lowercase())
}

/// POST /api/users
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    let username = validate_username(&req.username)?;

    if req.password.len() < 8 {
        return Err(AppError::Validation("Password must be at least 8 characters".to_string()));
    }

    if UserRepository::get_by_username(&state.db, &username).await?.is_some() {
        return Err(AppError::Validation("Username already exists".to_string()));
    }

    let salt = generate_salt();
    let password_hash = hash_password(&req.password, &salt)?;

    let user = UserRepository::create(
        &state.db,
        NewUser {
            username,
            first_name: req.first_name,
            last_name: req.last_name,
            profile: req.profile,
        },
        &password_hash,
        &salt,
    ).await?;

    tracing::info!("👤 Registered user {}", user.username);

    Ok(Json(RegisterResponse {
        user_id: user.id,
        username: user.username,
    }))
}
