//! Pull-side approval queue.
//!
//! A pulled bundle that verifies but is signed with a key other than the
//! peer's pinned one is cached here instead of being imported. An admin
//! approving the entry pins the presented key and replays the cached
//! bundle through the same verify-then-import path.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use common::bundle::archive::{extract_bundle, locate_bundle_root, ArchiveError};
use common::bundle::signature::{verify_bundle, SignatureError};
use common::peer::{PeerFile, PeerFileError};

use crate::database::Database;
use crate::sync::import::{import_bundle, ImportError};

const META_FILENAME: &str = "meta.json";
const BUNDLE_FILENAME: &str = "bundle.tar.gz";

#[derive(Debug, thiserror::Error)]
pub enum PendingPullError {
    #[error("pending pull '{0}' not found")]
    NotFound(String),
    #[error("peer '{0}' not found in local registry")]
    UnknownPeer(String),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    PeerFile(#[from] PeerFileError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingPullMeta {
    pending_id: String,
    peer: String,
    presented_key: String,
    manifest_digest: Option<String>,
    signed_at: Option<String>,
    created_at: String,
}

#[derive(Debug, Clone)]
pub struct PendingPullEntry {
    pub id: String,
    pub peer_name: String,
    pub presented_key: String,
    pub manifest_digest: Option<String>,
    pub signed_at: Option<String>,
    pub created_at: String,
    pub bundle_path: PathBuf,
}

impl PendingPullEntry {
    fn directory(&self) -> &Path {
        self.bundle_path
            .parent()
            .expect("cached bundle lives inside its entry directory")
    }
}

/// Directory-backed store of pending pulls:
/// `<root>/<peer>/<id>/{bundle.tar.gz, meta.json}`.
#[derive(Debug, Clone)]
pub struct PendingPullStore {
    root: PathBuf,
}

impl PendingPullStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn new_entry_id() -> String {
        let ts = OffsetDateTime::now_utc().unix_timestamp();
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{ts}-{}", &suffix[..8])
    }

    /// Cache a bundle whose key is not yet trusted for `peer_name`.
    pub fn cache(
        &self,
        peer_name: &str,
        bundle_bytes: &[u8],
        presented_key: &str,
        manifest_digest: &str,
        signed_at: Option<&str>,
    ) -> Result<PendingPullEntry, PendingPullError> {
        let id = Self::new_entry_id();
        let entry_dir = self.root.join(peer_name).join(&id);
        fs::create_dir_all(&entry_dir)?;
        let bundle_path = entry_dir.join(BUNDLE_FILENAME);
        fs::write(&bundle_path, bundle_bytes)?;

        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let meta = PendingPullMeta {
            pending_id: id.clone(),
            peer: peer_name.to_string(),
            presented_key: presented_key.to_string(),
            manifest_digest: Some(manifest_digest.to_string()),
            signed_at: signed_at.map(str::to_string),
            created_at: created_at.clone(),
        };
        fs::write(
            entry_dir.join(META_FILENAME),
            format!(
                "{}\n",
                serde_json::to_string_pretty(&meta).unwrap_or_default()
            ),
        )?;

        Ok(PendingPullEntry {
            id,
            peer_name: peer_name.to_string(),
            presented_key: presented_key.to_string(),
            manifest_digest: meta.manifest_digest,
            signed_at: meta.signed_at,
            created_at,
            bundle_path,
        })
    }

    pub fn list(&self) -> Vec<PendingPullEntry> {
        let mut entries = Vec::new();
        let Ok(peers) = fs::read_dir(&self.root) else {
            return entries;
        };
        for peer_dir in peers.flatten() {
            if !peer_dir.path().is_dir() {
                continue;
            }
            let Ok(children) = fs::read_dir(peer_dir.path()) else {
                continue;
            };
            for entry_dir in children.flatten() {
                if let Some(entry) = self.load_entry(&entry_dir.path()) {
                    entries.push(entry);
                }
            }
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    pub fn get(&self, pending_id: &str) -> Option<PendingPullEntry> {
        self.list().into_iter().find(|entry| entry.id == pending_id)
    }

    pub fn remove(&self, entry: &PendingPullEntry) {
        let dir = entry.directory();
        if dir.exists() {
            let _ = fs::remove_dir_all(dir);
        }
        // Drop the peer directory once its last entry is gone.
        if let Some(peer_dir) = dir.parent() {
            if fs::read_dir(peer_dir)
                .map(|mut iter| iter.next().is_none())
                .unwrap_or(false)
            {
                let _ = fs::remove_dir_all(peer_dir);
            }
        }
    }

    /// Pin the presented key for the peer and replay the cached bundle
    /// through verify-then-import. Returns (peer name, records imported,
    /// whether the pinned key changed). The entry survives a failed replay
    /// so the operator can retry or discard.
    pub async fn approve(
        &self,
        db: &Database,
        peer_file: &PeerFile,
        entry: &PendingPullEntry,
    ) -> Result<(String, usize, bool), PendingPullError> {
        let peer = peer_file
            .get(&entry.peer_name)?
            .ok_or_else(|| PendingPullError::UnknownPeer(entry.peer_name.clone()))?;
        let key_updated = peer_file.set_public_key(&peer.name, &entry.presented_key)?;

        let bytes = fs::read(&entry.bundle_path)?;
        let tmp = tempfile::TempDir::new()?;
        extract_bundle(&bytes, tmp.path())?;
        let bundle_root = locate_bundle_root(tmp.path())?;
        verify_bundle(&bundle_root, Some(&entry.presented_key))?;
        let count = import_bundle(db, &bundle_root).await?;

        self.remove(entry);
        Ok((peer.name, count, key_updated))
    }

    fn load_entry(&self, entry_dir: &Path) -> Option<PendingPullEntry> {
        let meta_path = entry_dir.join(META_FILENAME);
        let bundle_path = entry_dir.join(BUNDLE_FILENAME);
        if !meta_path.exists() || !bundle_path.exists() {
            return None;
        }
        let meta: PendingPullMeta =
            serde_json::from_str(&fs::read_to_string(meta_path).ok()?).ok()?;
        Some(PendingPullEntry {
            id: meta.pending_id,
            peer_name: meta.peer,
            presented_key: meta.presented_key,
            manifest_digest: meta.manifest_digest,
            signed_at: meta.signed_at,
            created_at: meta.created_at,
            bundle_path,
        })
    }
}
