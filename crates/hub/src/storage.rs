//! Per-peer bundle storage.
//!
//! Exactly one retained bundle per peer. A write replaces the previous
//! directory wholesale and drops a metadata sidecar next to the bundle
//! contents; there is no history.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use common::bundle::archive::{list_files, replace_dir};
use common::bundle::manifest::MANIFEST_FILENAME;

pub const METADATA_FILENAME: &str = "hub_metadata.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Sidecar describing the stored bundle. Overwritten on every accepted
/// upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubMetadataRecord {
    pub peer: String,
    pub manifest_digest: String,
    pub signed_at: String,
    pub stored_at: String,
}

impl HubMetadataRecord {
    pub fn new(peer: &str, manifest_digest: &str, signed_at: OffsetDateTime) -> Self {
        Self {
            peer: peer.to_string(),
            manifest_digest: manifest_digest.to_string(),
            signed_at: signed_at.format(&Rfc3339).unwrap_or_default(),
            stored_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleSummary {
    pub file_count: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct HubStore {
    root: PathBuf,
}

impl HubStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn bundle_path(&self, peer_name: &str) -> PathBuf {
        self.root.join(peer_name)
    }

    /// Atomically replace the peer's stored bundle with the tree at
    /// `bundle_root` and write the metadata sidecar.
    pub fn write_bundle(
        &self,
        peer_name: &str,
        bundle_root: &Path,
        metadata: &HubMetadataRecord,
    ) -> Result<(), StorageError> {
        let target = self.bundle_path(peer_name);
        replace_dir(bundle_root, &target)?;
        fs::write(
            target.join(METADATA_FILENAME),
            format!("{}\n", serde_json::to_string_pretty(metadata)?),
        )?;
        Ok(())
    }

    pub fn read_metadata(&self, peer_name: &str) -> Option<HubMetadataRecord> {
        let path = self.bundle_path(peer_name).join(METADATA_FILENAME);
        let text = fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn bundle_exists(&self, peer_name: &str) -> bool {
        self.bundle_path(peer_name).join(MANIFEST_FILENAME).exists()
    }

    pub fn summarize(&self, peer_name: &str) -> BundleSummary {
        let root = self.bundle_path(peer_name);
        let files = list_files(&root).unwrap_or_default();
        let total_bytes = files
            .iter()
            .filter_map(|file| file.metadata().ok())
            .map(|meta| meta.len())
            .sum();
        BundleSummary {
            file_count: files.len() as u64,
            total_bytes,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn bundle_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILENAME), b"manifest").unwrap();
        fs::create_dir_all(dir.path().join("users")).unwrap();
        fs::write(dir.path().join("users/user_1.sync.txt"), b"user").unwrap();
        dir
    }

    #[test]
    fn test_write_read_summarize() {
        let store_dir = TempDir::new().unwrap();
        let store = HubStore::new(store_dir.path().join("hub_store"));
        let bundle = bundle_tree();

        assert!(!store.bundle_exists("alpha"));
        let metadata =
            HubMetadataRecord::new("alpha", "digest123", OffsetDateTime::now_utc());
        store.write_bundle("alpha", bundle.path(), &metadata).unwrap();

        assert!(store.bundle_exists("alpha"));
        let read = store.read_metadata("alpha").unwrap();
        assert_eq!(read.manifest_digest, "digest123");

        // manifest + user file + sidecar
        let summary = store.summarize("alpha");
        assert_eq!(summary.file_count, 3);
        assert!(summary.total_bytes > 0);
    }

    #[test]
    fn test_rewrite_replaces_previous_bundle() {
        let store_dir = TempDir::new().unwrap();
        let store = HubStore::new(store_dir.path().join("hub_store"));

        let first = bundle_tree();
        fs::write(first.path().join("stale.sync.txt"), b"old").unwrap();
        let metadata = HubMetadataRecord::new("alpha", "d1", OffsetDateTime::now_utc());
        store.write_bundle("alpha", first.path(), &metadata).unwrap();
        assert!(store.bundle_path("alpha").join("stale.sync.txt").exists());

        let second = bundle_tree();
        let metadata = HubMetadataRecord::new("alpha", "d2", OffsetDateTime::now_utc());
        store.write_bundle("alpha", second.path(), &metadata).unwrap();
        assert!(!store.bundle_path("alpha").join("stale.sync.txt").exists());
        assert_eq!(store.read_metadata("alpha").unwrap().manifest_digest, "d2");
    }
}
