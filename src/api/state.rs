use std::sync::Arc;
use sqlx::{Pool, Sqlite};
use crate::config::Config;
use crate::hub::Hub;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Sqlite>,
    pub hub: Hub,
    pub config: Arc<Config>,
}
