//! Shared test utilities for hub tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use time::OffsetDateTime;

use ::common::bundle::archive::pack_bundle;
use ::common::bundle::manifest::write_manifest;
use ::common::bundle::record::{
    write_sync_file, CommentBody, RequestBody, SyncHeader, SyncRecord, SyncScope, UserBody,
};
use ::common::bundle::signature::sign_bundle;
use ::common::crypto::{Keystore, SigningKey};

use warren_hub::config::hash_token;
use warren_hub::state::HubState;

pub const PEER_TOKEN: &str = "peer-secret";
pub const ADMIN_TOKEN: &str = "admin-secret";
pub const INSTANCE: &str = "https://a.example.org";

/// Write a hub config and build the state around it.
pub async fn setup_hub(
    allow_auto_register: bool,
    trusted_keys: &[&str],
) -> (HubState, PathBuf, TempDir) {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("hub_config.json");
    let storage_dir = temp.path().join("hub_store");
    let pending_dir = temp.path().join("hub_pending");

    let keys: Vec<String> = trusted_keys.iter().map(|key| key.to_string()).collect();
    let config = serde_json::json!({
        "storage_dir": storage_dir,
        "pending_dir": pending_dir,
        "allow_auto_register": allow_auto_register,
        "admins": [{"name": "op", "token_hash": hash_token(ADMIN_TOKEN)}],
        "peers": [{
            "name": "alpha",
            "token_hash": hash_token(PEER_TOKEN),
            "public_keys": keys,
        }],
    });
    fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let state = HubState::from_config_path(&config_path).await.unwrap();
    (state, config_path, temp)
}

fn ts(offset: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000 + offset).unwrap()
}

pub fn user_record(id: i64, username: &str) -> SyncRecord {
    SyncRecord::User {
        header: SyncHeader::new(id.to_string(), INSTANCE, Some(ts(0)), SyncScope::Public),
        body: UserBody {
            username: username.to_string(),
            contact_email: None,
        },
    }
}

pub fn request_record(id: i64, title: &str, comments: Vec<(i64, &str)>) -> SyncRecord {
    SyncRecord::Request {
        header: SyncHeader::new(id.to_string(), INSTANCE, Some(ts(id)), SyncScope::Public),
        body: RequestBody {
            title: title.to_string(),
            description: format!("{title} description"),
            status: "open".to_string(),
            contact_email: None,
            created_by: Some(1),
            created_by_username: Some("ada".to_string()),
            comments: comments
                .into_iter()
                .map(|(comment_id, text)| CommentBody {
                    id: comment_id,
                    user_id: Some(1),
                    username: Some("ada".to_string()),
                    body: text.to_string(),
                    created_at: Some(ts(100 + comment_id)),
                    sync_scope: SyncScope::Public,
                })
                .collect(),
        },
    }
}

/// Build, manifest, and sign a bundle from records; returns the signing
/// key and the packed tar.gz bytes.
pub fn signed_bundle_bytes(records: &[SyncRecord]) -> (SigningKey, Vec<u8>, TempDir) {
    let home = TempDir::new().unwrap();
    let key = Keystore::new(&home.path().join("keys-home"))
        .generate(false)
        .unwrap();
    let bytes = signed_bundle_bytes_with_key(records, &key, home.path());
    (key, bytes, home)
}

pub fn signed_bundle_bytes_with_key(
    records: &[SyncRecord],
    key: &SigningKey,
    scratch: &Path,
) -> Vec<u8> {
    let bundle_dir = scratch.join(format!("bundle-{}", records.len()));
    if bundle_dir.exists() {
        fs::remove_dir_all(&bundle_dir).unwrap();
    }
    fs::create_dir_all(&bundle_dir).unwrap();

    let mut files = Vec::new();
    for record in records {
        let (dir, name) = match record {
            SyncRecord::User { header, .. } => ("users", format!("user_{}.sync.txt", header.id)),
            SyncRecord::Request { header, .. } => {
                ("requests", format!("request_{}.sync.txt", header.id))
            }
            SyncRecord::Invite { header, .. } => {
                ("invites", format!("invite_{}.sync.txt", header.id))
            }
        };
        let path = bundle_dir.join(dir).join(name);
        write_sync_file(&path, record).unwrap();
        files.push(path);
    }
    write_manifest(&bundle_dir, &files).unwrap();
    sign_bundle(&bundle_dir, key).unwrap();
    pack_bundle(&bundle_dir).unwrap()
}
