// Hub modules (relay + feed functionality)
pub mod config;
pub mod feed;
pub mod http;
pub mod pending;
pub mod process;
pub mod service;
pub mod state;
pub mod storage;

pub use config::{HubConfig, HubPeer};
pub use state::HubState;
