pub mod models;
pub mod users;
pub mod posts;
pub mod follows;
pub mod store;

pub use models::{FollowEdge, NewUser, StoredPost, User, UserId, UNRESOLVED_USER_ID};
pub use users::UserRepository;
pub use posts::PostRepository;
pub use follows::FollowRepository;
pub use store::{GraphStore, SqliteGraphStore};
