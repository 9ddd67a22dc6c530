//! Push-side approval queue.
//!
//! Created only for bundles that already passed digest and signature
//! checks but were signed with a key the peer's registry entry does not
//! trust. The cached upload bytes are replayed through the full
//! verify-store-ingest path when an admin approves.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

const METADATA_FILENAME: &str = "metadata.json";
const BUNDLE_FILENAME: &str = "bundle.tar.gz";

#[derive(Debug, thiserror::Error)]
pub enum PendingError {
    #[error("pending approval '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingMetadata {
    id: String,
    peer_name: String,
    presented_key: String,
    manifest_digest: Option<String>,
    signed_at: Option<String>,
    created_at: String,
}

#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub id: String,
    pub peer_name: String,
    pub presented_key: String,
    pub manifest_digest: Option<String>,
    pub signed_at: Option<String>,
    pub created_at: String,
    pub bundle_path: PathBuf,
}

/// Directory-backed queue: `<root>/<peer>/<id>/{bundle.tar.gz, metadata.json}`.
#[derive(Debug, Clone)]
pub struct PendingQueue {
    root: PathBuf,
}

impl PendingQueue {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn new_entry_id() -> String {
        let ts = OffsetDateTime::now_utc().unix_timestamp();
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{ts}-{}", &suffix[..8])
    }

    pub fn queue(
        &self,
        peer_name: &str,
        presented_key: &str,
        bundle_bytes: &[u8],
        manifest_digest: Option<&str>,
        signed_at: Option<&str>,
    ) -> Result<PendingApproval, PendingError> {
        let id = Self::new_entry_id();
        let entry_dir = self.root.join(peer_name).join(&id);
        fs::create_dir_all(&entry_dir)?;
        let bundle_path = entry_dir.join(BUNDLE_FILENAME);
        fs::write(&bundle_path, bundle_bytes)?;

        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let metadata = PendingMetadata {
            id: id.clone(),
            peer_name: peer_name.to_string(),
            presented_key: presented_key.to_string(),
            manifest_digest: manifest_digest.map(str::to_string),
            signed_at: signed_at.map(str::to_string),
            created_at: created_at.clone(),
        };
        fs::write(
            entry_dir.join(METADATA_FILENAME),
            format!(
                "{}\n",
                serde_json::to_string_pretty(&metadata).unwrap_or_default()
            ),
        )?;

        Ok(PendingApproval {
            id,
            peer_name: peer_name.to_string(),
            presented_key: presented_key.to_string(),
            manifest_digest: metadata.manifest_digest,
            signed_at: metadata.signed_at,
            created_at,
            bundle_path,
        })
    }

    /// All entries, newest first; optionally filtered by peer.
    pub fn list(&self, peer_name: Option<&str>) -> Vec<PendingApproval> {
        let mut entries = Vec::new();
        let peer_dirs: Vec<PathBuf> = match peer_name {
            Some(name) => vec![self.root.join(name)],
            None => fs::read_dir(&self.root)
                .map(|iter| {
                    iter.flatten()
                        .map(|entry| entry.path())
                        .filter(|path| path.is_dir())
                        .collect()
                })
                .unwrap_or_default(),
        };
        for peer_dir in peer_dirs {
            let Ok(children) = fs::read_dir(&peer_dir) else {
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

    pub fn get(&self, entry_id: &str) -> Option<PendingApproval> {
        self.list(None).into_iter().find(|entry| entry.id == entry_id)
    }

    /// Remove an entry and its cached bundle. Removing an id that is
    /// already gone is not an error.
    pub fn remove(&self, entry_id: &str) {
        let Some(entry) = self.get(entry_id) else {
            return;
        };
        if let Some(entry_dir) = entry.bundle_path.parent() {
            let _ = fs::remove_dir_all(entry_dir);
            if let Some(peer_dir) = entry_dir.parent() {
                if fs::read_dir(peer_dir)
                    .map(|mut iter| iter.next().is_none())
                    .unwrap_or(false)
                {
                    let _ = fs::remove_dir_all(peer_dir);
                }
            }
        }
    }

    fn load_entry(&self, entry_dir: &Path) -> Option<PendingApproval> {
        let metadata_path = entry_dir.join(METADATA_FILENAME);
        let bundle_path = entry_dir.join(BUNDLE_FILENAME);
        if !metadata_path.exists() || !bundle_path.exists() {
            return None;
        }
        let metadata: PendingMetadata =
            serde_json::from_str(&fs::read_to_string(metadata_path).ok()?).ok()?;
        Some(PendingApproval {
            id: metadata.id,
            peer_name: metadata.peer_name,
            presented_key: metadata.presented_key,
            manifest_digest: metadata.manifest_digest,
            signed_at: metadata.signed_at,
            created_at: metadata.created_at,
            bundle_path,
        })
    }
}
