// Instance modules (sync engine + storage)
pub mod database;
pub mod hub_client;
pub mod state;
pub mod sync;

pub use database::Database;
pub use state::{AppConfig, AppState, StateError};
