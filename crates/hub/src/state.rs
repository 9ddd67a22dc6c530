//! Shared hub state handed to every request handler.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;

use crate::config::{HubConfig, HubConfigError, FEED_DB_FILENAME};
use crate::feed::{FeedDatabase, FeedDatabaseError};
use crate::pending::PendingQueue;
use crate::storage::HubStore;

#[derive(Debug, thiserror::Error)]
pub enum HubStateError {
    #[error(transparent)]
    Config(#[from] HubConfigError),
    #[error(transparent)]
    FeedDatabase(#[from] FeedDatabaseError),
}

struct HubStateInner {
    config: RwLock<HubConfig>,
    store: HubStore,
    pending: PendingQueue,
    feed: FeedDatabase,
    feed_db_path: PathBuf,
    // One lock per peer: store+ingest for the same peer must serialize,
    // different peers may run in parallel.
    peer_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

#[derive(Clone)]
pub struct HubState(Arc<HubStateInner>);

impl HubState {
    pub async fn from_config_path(config_path: &Path) -> Result<Self, HubStateError> {
        let config = HubConfig::load(config_path)?;
        let store = HubStore::new(&config.storage_dir);
        let pending = PendingQueue::new(&config.pending_dir);
        let feed_db_path = config.storage_dir.join(FEED_DB_FILENAME);
        let feed = FeedDatabase::connect(&feed_db_path).await?;
        Ok(Self(Arc::new(HubStateInner {
            config: RwLock::new(config),
            store,
            pending,
            feed,
            feed_db_path,
            peer_locks: Mutex::new(HashMap::new()),
        })))
    }

    pub fn config(&self) -> parking_lot::RwLockReadGuard<'_, HubConfig> {
        self.0.config.read()
    }

    pub fn config_mut(&self) -> parking_lot::RwLockWriteGuard<'_, HubConfig> {
        self.0.config.write()
    }

    pub fn store(&self) -> &HubStore {
        &self.0.store
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.0.pending
    }

    pub fn feed(&self) -> &FeedDatabase {
        &self.0.feed
    }

    pub fn feed_db_path(&self) -> &Path {
        &self.0.feed_db_path
    }

    /// Lock handle serializing mutations for one peer.
    pub fn peer_lock(&self, peer_name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.0.peer_locks.lock();
        locks
            .entry(peer_name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
