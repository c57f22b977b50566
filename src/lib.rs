//! Real-time social messaging hub: authenticated WebSocket clients post
//! messages and manage follow/friend relations, and the hub fans results
//! out to whoever is connected.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod hub;
pub mod protocol;
