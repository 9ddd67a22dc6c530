//! The instance-side peer registry.
//!
//! Peers live in a flat `[peer]`-sectioned key=value file under the sync
//! home. A peer is either a filesystem peer (`path`) or a hub peer
//! (`url` + `token`), and optionally pins one `public_key` that incoming
//! bundles must be signed with.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

pub const PEER_FILENAME: &str = "peers.conf";

#[derive(Debug, thiserror::Error)]
pub enum PeerFileError {
    #[error("peer entries require a name")]
    MissingName,
    #[error("peer '{0}' needs a filesystem path or a hub url")]
    MissingLocation(String),
    #[error("peer '{0}' names may contain letters, numbers, hyphens, and underscores only")]
    InvalidName(String),
    #[error("hub peer '{0}' requires a bearer token")]
    MissingToken(String),
    #[error("peer '{0}' already exists")]
    Duplicate(String),
    #[error("peer '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A configured sync peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Unique stable identifier, also used as a URL path segment.
    pub name: String,
    /// Bundle directory for filesystem peers.
    pub path: Option<PathBuf>,
    /// Base URL for hub peers.
    pub url: Option<String>,
    /// Bearer token presented to the hub.
    pub token: Option<String>,
    /// Pinned signing key (base64); bundles signed with any other key are
    /// held for approval.
    pub public_key: Option<String>,
}

impl Peer {
    pub fn is_hub(&self) -> bool {
        self.url.is_some()
    }

    pub fn validate(&self) -> Result<(), PeerFileError> {
        if self.name.is_empty() {
            return Err(PeerFileError::MissingName);
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PeerFileError::InvalidName(self.name.clone()));
        }
        if self.path.is_none() && self.url.is_none() {
            return Err(PeerFileError::MissingLocation(self.name.clone()));
        }
        if self.url.is_some() && self.token.as_deref().unwrap_or("").is_empty() {
            return Err(PeerFileError::MissingToken(self.name.clone()));
        }
        Ok(())
    }
}

/// Handle to the on-disk peer file.
///
/// Mutations are read-modify-write under a lock and persist through an
/// atomic temp-file rename, so concurrent admin actions cannot lose
/// each other's updates.
#[derive(Debug)]
pub struct PeerFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PeerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<Peer>, PeerFileError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)?;
        let mut peers = Vec::new();
        let mut current: Option<Vec<(String, String)>> = None;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                if let Some(fields) = current.take() {
                    peers.push(peer_from_fields(fields)?);
                }
                current = Some(Vec::new());
                continue;
            }
            if let (Some(fields), Some((key, value))) = (current.as_mut(), line.split_once('=')) {
                fields.push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        if let Some(fields) = current.take() {
            peers.push(peer_from_fields(fields)?);
        }
        Ok(peers)
    }

    pub fn save(&self, peers: &[Peer]) -> Result<(), PeerFileError> {
        let _guard = self.write_lock.lock();
        self.save_locked(peers)
    }

    fn save_locked(&self, peers: &[Peer]) -> Result<(), PeerFileError> {
        let mut lines: Vec<String> = Vec::new();
        for peer in peers {
            lines.push("[peer]".to_string());
            lines.push(format!("name={}", peer.name));
            if let Some(path) = &peer.path {
                lines.push(format!("path={}", path.display()));
            }
            if let Some(url) = &peer.url {
                lines.push(format!("url={url}"));
            }
            if let Some(token) = &peer.token {
                lines.push(format!("token={token}"));
            }
            if let Some(key) = &peer.public_key {
                lines.push(format!("public_key={key}"));
            }
            lines.push(String::new());
        }
        let contents = format!("{}\n", lines.join("\n").trim_end());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("conf.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Option<Peer>, PeerFileError> {
        Ok(self.load()?.into_iter().find(|peer| peer.name == name))
    }

    /// Add a new peer. Fails on duplicate names.
    pub fn add(&self, peer: Peer) -> Result<(), PeerFileError> {
        peer.validate()?;
        let _guard = self.write_lock.lock();
        let mut peers = self.load()?;
        if peers.iter().any(|existing| existing.name == peer.name) {
            return Err(PeerFileError::Duplicate(peer.name));
        }
        peers.push(peer);
        self.save_locked(&peers)
    }

    pub fn remove(&self, name: &str) -> Result<(), PeerFileError> {
        let _guard = self.write_lock.lock();
        let mut peers = self.load()?;
        let before = peers.len();
        peers.retain(|peer| peer.name != name);
        if peers.len() == before {
            return Err(PeerFileError::NotFound(name.to_string()));
        }
        self.save_locked(&peers)
    }

    /// Pin (or replace) a peer's public key. Returns true when the stored
    /// key actually changed.
    pub fn set_public_key(&self, name: &str, public_key: &str) -> Result<bool, PeerFileError> {
        let _guard = self.write_lock.lock();
        let mut peers = self.load()?;
        let peer = peers
            .iter_mut()
            .find(|peer| peer.name == name)
            .ok_or_else(|| PeerFileError::NotFound(name.to_string()))?;
        let changed = peer.public_key.as_deref() != Some(public_key);
        if changed {
            peer.public_key = Some(public_key.to_string());
            self.save_locked(&peers)?;
        }
        Ok(changed)
    }
}

fn peer_from_fields(fields: Vec<(String, String)>) -> Result<Peer, PeerFileError> {
    let mut peer = Peer {
        name: String::new(),
        path: None,
        url: None,
        token: None,
        public_key: None,
    };
    for (key, value) in fields {
        match key.as_str() {
            "name" => peer.name = value,
            "path" => peer.path = Some(PathBuf::from(value)),
            "url" => peer.url = Some(value),
            "token" => peer.token = Some(value),
            "public_key" => peer.public_key = Some(value),
            _ => {}
        }
    }
    if peer.name.is_empty() {
        return Err(PeerFileError::MissingName);
    }
    if peer.path.is_none() && peer.url.is_none() {
        return Err(PeerFileError::MissingLocation(peer.name));
    }
    Ok(peer)
}
