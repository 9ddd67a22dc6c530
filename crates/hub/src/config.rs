//! Hub configuration: storage locations, admin tokens, and the peer
//! registry with its append-only trusted key sets.
//!
//! Raw tokens are accepted in the config file for convenience but are
//! hashed on load; persisting always writes `token_hash`, never the
//! plaintext.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_STORAGE_DIR: &str = "data/hub_store";
pub const DEFAULT_PENDING_DIR: &str = "data/hub_pending";
pub const FEED_DB_FILENAME: &str = "hub_feed.sqlite";

#[derive(Debug, thiserror::Error)]
pub enum HubConfigError {
    #[error("hub config not found; a sample was created at {0}, fill it out and restart")]
    SampleCreated(PathBuf),
    #[error("peer entry missing 'name'")]
    PeerMissingName,
    #[error("peer '{0}' must define 'token' or 'token_hash'")]
    PeerMissingToken(String),
    #[error("peer '{0}' not found")]
    UnknownPeer(String),
    #[error("invalid hub config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// One registered peer as the hub sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubPeer {
    pub name: String,
    /// sha256 hex of the peer's bearer secret.
    pub token_hash: String,
    /// Trusted signing keys (base64), ordered, append-only. Keys are never
    /// removed automatically so multi-device signing keeps working.
    pub public_keys: Vec<String>,
}

impl HubPeer {
    pub fn is_trusted_key(&self, public_key_b64: &str) -> bool {
        let cleaned: String = public_key_b64.split_whitespace().collect();
        self.public_keys.iter().any(|key| {
            let existing: String = key.split_whitespace().collect();
            existing == cleaned
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawAdmin {
    name: String,
    #[serde(default, skip_serializing)]
    token: Option<String>,
    #[serde(default)]
    token_hash: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawPeer {
    name: String,
    #[serde(default, skip_serializing)]
    token: Option<String>,
    #[serde(default)]
    token_hash: Option<String>,
    /// Single-key form kept for hand-written configs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    public_keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    storage_dir: Option<PathBuf>,
    #[serde(default)]
    pending_dir: Option<PathBuf>,
    #[serde(default)]
    allow_auto_register: bool,
    #[serde(default)]
    admins: Vec<RawAdmin>,
    #[serde(default)]
    peers: Vec<RawPeer>,
}

/// Parsed hub configuration plus derived indexes.
#[derive(Debug, Clone)]
pub struct HubConfig {
    path: PathBuf,
    pub storage_dir: PathBuf,
    pub pending_dir: PathBuf,
    pub allow_auto_register: bool,
    admin_token_hashes: BTreeMap<String, String>,
    peers: BTreeMap<String, HubPeer>,
    token_index: BTreeMap<String, String>,
}

impl HubConfig {
    /// Load the config at `path`. When the file does not exist, a sample
    /// is written and an error instructs the operator to fill it out.
    pub fn load(path: &Path) -> Result<Self, HubConfigError> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let sample = RawConfig {
                storage_dir: Some(PathBuf::from(DEFAULT_STORAGE_DIR)),
                pending_dir: Some(PathBuf::from(DEFAULT_PENDING_DIR)),
                allow_auto_register: false,
                admins: vec![RawAdmin {
                    name: "admin".to_string(),
                    token: None,
                    token_hash: Some(hash_token("replace-me")),
                }],
                peers: Vec::new(),
            };
            fs::write(
                path,
                format!("{}\n", serde_json::to_string_pretty(&sample)?),
            )?;
            return Err(HubConfigError::SampleCreated(path.to_path_buf()));
        }

        let raw: RawConfig = serde_json::from_str(&fs::read_to_string(path)?)?;
        let storage_dir = raw
            .storage_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
        let pending_dir = raw
            .pending_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PENDING_DIR));

        let mut admin_token_hashes = BTreeMap::new();
        for admin in raw.admins {
            let hash = match (admin.token_hash, admin.token) {
                (Some(hash), _) => hash,
                (None, Some(token)) => hash_token(&token),
                (None, None) => continue,
            };
            admin_token_hashes.insert(hash, admin.name);
        }

        let mut peers = BTreeMap::new();
        let mut token_index = BTreeMap::new();
        for entry in raw.peers {
            if entry.name.is_empty() {
                return Err(HubConfigError::PeerMissingName);
            }
            let token_hash = match (entry.token_hash, entry.token) {
                (Some(hash), _) => hash,
                (None, Some(token)) => hash_token(&token),
                (None, None) => return Err(HubConfigError::PeerMissingToken(entry.name)),
            };
            let mut public_keys = entry.public_keys;
            if let Some(single) = entry.public_key {
                if !public_keys.contains(&single) {
                    public_keys.insert(0, single);
                }
            }
            let peer = HubPeer {
                name: entry.name.clone(),
                token_hash: token_hash.clone(),
                public_keys,
            };
            token_index.insert(token_hash, entry.name.clone());
            peers.insert(entry.name, peer);
        }

        fs::create_dir_all(&storage_dir)?;
        Ok(Self {
            path: path.to_path_buf(),
            storage_dir,
            pending_dir,
            allow_auto_register: raw.allow_auto_register,
            admin_token_hashes,
            peers,
            token_index,
        })
    }

    pub fn get_peer(&self, name: &str) -> Option<&HubPeer> {
        self.peers.get(name)
    }

    pub fn peers(&self) -> impl Iterator<Item = &HubPeer> {
        self.peers.values()
    }

    pub fn peer_for_token_hash(&self, token_hash: &str) -> Option<&HubPeer> {
        self.token_index
            .get(token_hash)
            .and_then(|name| self.peers.get(name))
    }

    pub fn admin_for_token_hash(&self, token_hash: &str) -> Option<&str> {
        self.admin_token_hashes.get(token_hash).map(String::as_str)
    }

    pub fn has_admin_tokens(&self) -> bool {
        !self.admin_token_hashes.is_empty()
    }

    /// Append a trusted key to a peer and persist. Appending a key that is
    /// already trusted is a no-op; existing keys are never removed.
    /// Returns whether the set changed.
    pub fn approve_key(&mut self, peer_name: &str, public_key_b64: &str) -> Result<bool, HubConfigError> {
        let peer = self
            .peers
            .get_mut(peer_name)
            .ok_or_else(|| HubConfigError::UnknownPeer(peer_name.to_string()))?;
        if peer.is_trusted_key(public_key_b64) {
            return Ok(false);
        }
        peer.public_keys.push(public_key_b64.to_string());
        self.persist()?;
        Ok(true)
    }

    /// Register a brand-new peer with the presented key as its sole
    /// trusted key and the presenting token pinned for future auth.
    pub fn register_peer(
        &mut self,
        name: &str,
        token_hash: &str,
        public_key_b64: &str,
    ) -> Result<(), HubConfigError> {
        let peer = HubPeer {
            name: name.to_string(),
            token_hash: token_hash.to_string(),
            public_keys: vec![public_key_b64.to_string()],
        };
        self.token_index
            .insert(token_hash.to_string(), name.to_string());
        self.peers.insert(name.to_string(), peer);
        self.persist()
    }

    /// Rewrite the config file atomically (temp file + rename).
    fn persist(&self) -> Result<(), HubConfigError> {
        let raw = RawConfig {
            storage_dir: Some(self.storage_dir.clone()),
            pending_dir: Some(self.pending_dir.clone()),
            allow_auto_register: self.allow_auto_register,
            admins: self
                .admin_token_hashes
                .iter()
                .map(|(hash, name)| RawAdmin {
                    name: name.clone(),
                    token: None,
                    token_hash: Some(hash.clone()),
                })
                .collect(),
            peers: self
                .peers
                .values()
                .map(|peer| RawPeer {
                    name: peer.name.clone(),
                    token: None,
                    token_hash: Some(peer.token_hash.clone()),
                    public_key: None,
                    public_keys: peer.public_keys.clone(),
                })
                .collect(),
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, format!("{}\n", serde_json::to_string_pretty(&raw)?))?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
