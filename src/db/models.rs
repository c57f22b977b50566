use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Relational id of a user. Protocol-level identity is the username.
pub type UserId = i64;

/// Stand-in id used when a username does not resolve to a stored user.
pub const UNRESOLVED_USER_ID: UserId = 0;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile: String,
    pub logged_in: bool,
    #[serde(skip_serializing)]
    pub password_hash: Vec<u8>,
    #[serde(skip_serializing)]
    pub password_salt: Vec<u8>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StoredPost {
    pub id: i64,
    pub sender: String,
    pub content: String,
    pub created_at: i64,
}

/// One row of the `follow` table. A plain follow has both flags false; a
/// pending friend request has `friend_requested` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct FollowEdge {
    /// The user being followed or asked for friendship.
    pub poster_user_id: UserId,
    /// The user who made the request.
    pub follower_user_id: UserId,
    pub friend_requested: bool,
    pub friend_accepted: bool,
}

impl FollowEdge {
    pub fn follow(followed: UserId, requestor: UserId) -> Self {
        FollowEdge {
            poster_user_id: followed,
            follower_user_id: requestor,
            friend_requested: false,
            friend_accepted: false,
        }
    }

    pub fn friend_request(requested: UserId, requestor: UserId) -> Self {
        FollowEdge {
            poster_user_id: requested,
            follower_user_id: requestor,
            friend_requested: true,
            friend_accepted: false,
        }
    }
}
