use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use common::crypto::Keystore;
use common::peer::{PeerFile, PEER_FILENAME};

pub const APP_NAME: &str = "warren";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";
pub const EXPORT_DIR_NAME: &str = "public_sync";
pub const PENDING_PULL_DIR_NAME: &str = "pending_pull";
pub const ACTIVITY_LOG_FILE_NAME: &str = "sync_activity.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Public identifier stamped into exported records, typically the
    /// instance's canonical URL.
    pub instance_id: String,
    /// Timeout for hub status/push/pull calls, in seconds.
    #[serde(default = "default_hub_timeout_secs")]
    pub hub_timeout_secs: u64,
}

fn default_hub_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instance_id: "local-instance".to_string(),
            hub_timeout_secs: default_hub_timeout_secs(),
        }
    }
}

/// Paths and configuration for one instance's sync home (`~/.warren`).
#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the warren directory (~/.warren)
    pub home: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the warren directory path (custom or default ~/.warren)
    pub fn home_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{APP_NAME}")))
    }

    /// Initialize a new warren home directory
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let home = Self::home_dir(custom_path)?;
        if home.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&home)?;

        let config_path = home.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        // Touch the database file; migrations run on first connect.
        let db_path = home.join(DB_FILE_NAME);
        fs::write(&db_path, "")?;

        Ok(Self {
            home,
            db_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the warren home directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let home = Self::home_dir(custom_path)?;
        if !home.exists() {
            return Err(StateError::NotInitialized);
        }
        let config_path = home.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        Ok(Self {
            home: home.clone(),
            db_path: home.join(DB_FILE_NAME),
            config_path,
            config,
        })
    }

    pub fn keystore(&self) -> Keystore {
        Keystore::new(&self.home)
    }

    pub fn peer_file(&self) -> PeerFile {
        PeerFile::new(self.home.join(PEER_FILENAME))
    }

    /// Directory the export engine writes bundles into.
    pub fn export_dir(&self) -> PathBuf {
        self.home.join(EXPORT_DIR_NAME)
    }

    pub fn pending_pull_dir(&self) -> PathBuf {
        self.home.join(PENDING_PULL_DIR_NAME)
    }

    pub fn activity_log_path(&self) -> PathBuf {
        self.home.join(ACTIVITY_LOG_FILE_NAME)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("warren directory not initialized. Run 'warren init' first")]
    NotInitialized,

    #[error("warren directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_load() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("warren-home");

        let state = AppState::init(Some(home.clone()), AppConfig::default()).unwrap();
        assert!(state.config_path.exists());
        assert!(state.db_path.exists());

        let loaded = AppState::load(Some(home.clone())).unwrap();
        assert_eq!(loaded.config.instance_id, "local-instance");

        assert!(matches!(
            AppState::init(Some(home), AppConfig::default()),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }
}
