pub mod auth;
pub mod config;
pub mod error;
pub mod flash;
pub mod forms;
pub mod models;
pub mod rate_limit;
pub mod repo;
pub mod routes;
pub mod security;
pub mod views;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
