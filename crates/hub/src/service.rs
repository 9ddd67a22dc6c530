//! The hub's upload/approval pipeline, independent of the HTTP layer.
//!
//! Upload state machine for a (peer, presented key) pair:
//! - unknown peer: rejected, unless auto-registration is enabled and the
//!   uploader identifies itself, in which case the peer is created with
//!   the presented key as its sole trusted key;
//! - known peer, trusted key: accepted, stored, and ingested;
//! - known peer, untrusted key: the otherwise-valid bundle is parked in
//!   the pending queue for an administrator to approve or discard.

use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use common::bundle::archive::{extract_bundle, locate_bundle_root, ArchiveError};
use common::bundle::signature::{verify_bundle, SignatureError, SignatureRecord};

use crate::config::{hash_token, HubConfigError};
use crate::feed::{ingest_bundle, IngestError};
use crate::pending::PendingError;
use crate::state::HubState;
use crate::storage::{HubMetadataRecord, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("unknown peer")]
    UnknownPeer,
    #[error("missing bearer token")]
    MissingAuth,
    #[error("invalid token")]
    InvalidToken,
    #[error("token not authorized for peer '{0}'")]
    TokenPeerMismatch(String),
    #[error("auto-registration requires the X-WB-Public-Key header")]
    AutoRegisterKeyRequired,
    #[error("presented public key header does not match the bundle signature")]
    AutoRegisterKeyMismatch,
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("bundle held for key approval")]
    KeyHeldForApproval { pending_id: String },
    #[error(transparent)]
    Pending(#[from] PendingError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Config(#[from] HubConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadAccepted {
    pub peer: String,
    pub manifest_digest: String,
    pub signed_at: String,
    pub stored_bytes: u64,
    pub stored_files: u64,
    pub auto_registered: bool,
}

/// Authenticate a bearer token for `peer_name`. The token must hash to
/// the peer's registered token hash.
pub fn authenticate_peer(
    state: &HubState,
    peer_name: &str,
    bearer: Option<&str>,
) -> Result<(), UploadError> {
    let token = bearer.ok_or(UploadError::MissingAuth)?;
    let token_hash = hash_token(token.trim());
    let config = state.config();
    let peer = config
        .peer_for_token_hash(&token_hash)
        .ok_or(UploadError::InvalidToken)?;
    if peer.name != peer_name {
        return Err(UploadError::TokenPeerMismatch(peer_name.to_string()));
    }
    Ok(())
}

/// Process a bundle upload end to end. `presented_key_header` is the
/// optional `X-WB-Public-Key` value, consulted only for auto-registration.
pub async fn accept_upload(
    state: &HubState,
    peer_name: &str,
    bearer: Option<&str>,
    presented_key_header: Option<&str>,
    body: &[u8],
) -> Result<UploadAccepted, UploadError> {
    let known_peer = state.config().get_peer(peer_name).cloned();
    let auto_register = state.config().allow_auto_register;

    // Resolve the peer and authenticate before touching the payload.
    if known_peer.is_none() && !auto_register {
        return Err(UploadError::UnknownPeer);
    }
    if known_peer.is_some() {
        authenticate_peer(state, peer_name, bearer)?;
    } else if bearer.is_none() {
        return Err(UploadError::MissingAuth);
    }

    // Integrity next: a bundle that fails digest or signature checks is
    // rejected outright, never queued.
    let tmp = tempfile::TempDir::new()?;
    extract_bundle(body, tmp.path())?;
    let bundle_root = locate_bundle_root(tmp.path())?;
    let record = verify_bundle(&bundle_root, None)?;

    match known_peer {
        Some(peer) => {
            if !peer.is_trusted_key(&record.public_key_b64) {
                let signed_at = record.signed_at.format(&Rfc3339).ok();
                let entry = state.pending().queue(
                    peer_name,
                    &record.public_key_b64,
                    body,
                    Some(&record.manifest_digest),
                    signed_at.as_deref(),
                )?;
                tracing::info!(
                    peer = peer_name,
                    pending_id = %entry.id,
                    key_id = %record.key_id,
                    "upload held for key approval"
                );
                return Err(UploadError::KeyHeldForApproval {
                    pending_id: entry.id,
                });
            }

            let accepted = store_and_ingest(state, peer_name, &bundle_root, &record, false).await?;
            Ok(accepted)
        }
        None => {
            let token = bearer.ok_or(UploadError::MissingAuth)?;
            let header_key = presented_key_header
                .map(|key| key.split_whitespace().collect::<String>())
                .filter(|key| !key.is_empty())
                .ok_or(UploadError::AutoRegisterKeyRequired)?;
            if header_key != record.public_key_b64 {
                return Err(UploadError::AutoRegisterKeyMismatch);
            }

            state.config_mut().register_peer(
                peer_name,
                &hash_token(token.trim()),
                &record.public_key_b64,
            )?;
            tracing::info!(peer = peer_name, key_id = %record.key_id, "auto-registered peer");

            let accepted = store_and_ingest(state, peer_name, &bundle_root, &record, true).await?;
            Ok(accepted)
        }
    }
}

/// Store the verified bundle and ingest it into the feed, serialized per
/// peer. Shared by direct accepts and approval replays.
pub async fn store_and_ingest(
    state: &HubState,
    peer_name: &str,
    bundle_root: &std::path::Path,
    record: &SignatureRecord,
    auto_registered: bool,
) -> Result<UploadAccepted, UploadError> {
    let lock = state.peer_lock(peer_name);
    let _guard = lock.lock().await;

    let metadata = HubMetadataRecord::new(peer_name, &record.manifest_digest, record.signed_at);
    state.store().write_bundle(peer_name, bundle_root, &metadata)?;
    ingest_bundle(
        state.feed(),
        bundle_root,
        peer_name,
        &record.manifest_digest,
        record.signed_at,
    )
    .await?;

    let summary = state.store().summarize(peer_name);
    Ok(UploadAccepted {
        peer: peer_name.to_string(),
        manifest_digest: record.manifest_digest.clone(),
        signed_at: metadata.signed_at,
        stored_bytes: summary.total_bytes,
        stored_files: summary.file_count,
        auto_registered,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("pending approval '{0}' not found")]
    PendingNotFound(String),
    #[error(transparent)]
    Config(#[from] HubConfigError),
    #[error("replay failed: {0}")]
    Replay(#[from] UploadError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalReport {
    pub pending_id: String,
    pub peer: String,
    pub key_appended: bool,
    pub manifest_digest: String,
    pub stored_files: u64,
}

/// Approve a pending upload: append the presented key to the peer's
/// trusted set, then replay the cached bundle through the same
/// verify-store-ingest path with the refreshed trust state. The entry is
/// consumed only on success; a failed replay keeps it so the operator can
/// retry or discard.
pub async fn approve_pending(state: &HubState, pending_id: &str) -> Result<ApprovalReport, AdminError> {
    let entry = state
        .pending()
        .get(pending_id)
        .ok_or_else(|| AdminError::PendingNotFound(pending_id.to_string()))?;

    let key_appended = state
        .config_mut()
        .approve_key(&entry.peer_name, &entry.presented_key)?;

    let replay: Result<UploadAccepted, UploadError> = async {
        let bytes = std::fs::read(&entry.bundle_path)?;
        let tmp = tempfile::TempDir::new()?;
        extract_bundle(&bytes, tmp.path())?;
        let bundle_root = locate_bundle_root(tmp.path())?;
        // The cached bundle must still verify against the key the admin
        // just approved; tampering since queueing surfaces here.
        let record = verify_bundle(&bundle_root, Some(&entry.presented_key))?;
        store_and_ingest(state, &entry.peer_name, &bundle_root, &record, false).await
    }
    .await;

    let accepted = replay?;
    state.pending().remove(pending_id);

    Ok(ApprovalReport {
        pending_id: pending_id.to_string(),
        peer: entry.peer_name,
        key_appended,
        manifest_digest: accepted.manifest_digest,
        stored_files: accepted.stored_files,
    })
}

/// Discard a pending upload: delete the cached bundle, change nothing else.
pub fn discard_pending(state: &HubState, pending_id: &str) -> Result<(), AdminError> {
    if state.pending().get(pending_id).is_none() {
        return Err(AdminError::PendingNotFound(pending_id.to_string()));
    }
    state.pending().remove(pending_id);
    Ok(())
}

/// Authenticate an admin bearer token; returns the admin's name.
pub fn authenticate_admin(state: &HubState, bearer: Option<&str>) -> Result<String, UploadError> {
    let token = bearer.ok_or(UploadError::MissingAuth)?;
    let token_hash = hash_token(token.trim());
    let config = state.config();
    config
        .admin_for_token_hash(&token_hash)
        .map(str::to_string)
        .ok_or(UploadError::InvalidToken)
}
