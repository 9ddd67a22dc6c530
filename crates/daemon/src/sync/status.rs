//! Per-peer status collection for the CLI and admin surfaces.
//!
//! Transport problems ("hub unreachable") are their own category so an
//! operator can tell a down peer from an untrustworthy one.

use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use common::bundle::archive::list_files;
use common::bundle::signature::{verify_bundle, SignatureError};
use common::crypto::Keystore;
use common::peer::Peer;

use crate::hub_client::{HubClient, HubClientError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerKind {
    Filesystem,
    Hub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerCondition {
    Verified,
    BundleReady,
    AwaitingBundle,
    SignatureError,
    Unreachable,
    TokenRequired,
    SigningKeyError,
    HubError,
    PathMissing,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerStatusReport {
    pub name: String,
    pub kind: PeerKind,
    pub location: String,
    pub condition: PeerCondition,
    pub detail: Option<String>,
    pub signed_at: Option<String>,
    pub manifest_digest: Option<String>,
    pub file_count: Option<u64>,
    pub total_bytes: Option<u64>,
    pub has_bundle: Option<bool>,
}

impl PeerStatusReport {
    fn bare(peer: &Peer, kind: PeerKind, location: String, condition: PeerCondition) -> Self {
        Self {
            name: peer.name.clone(),
            kind,
            location,
            condition,
            detail: None,
            signed_at: None,
            manifest_digest: None,
            file_count: None,
            total_bytes: None,
            has_bundle: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Probe every configured peer, sorted by name.
pub async fn collect_peer_statuses(
    peers: &[Peer],
    keystore: &Keystore,
    client: &HubClient,
) -> Vec<PeerStatusReport> {
    let mut reports = Vec::with_capacity(peers.len());
    for peer in peers {
        let report = if peer.is_hub() {
            hub_peer_status(peer, keystore, client).await
        } else {
            filesystem_peer_status(peer)
        };
        reports.push(report);
    }
    reports.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    reports
}

fn filesystem_peer_status(peer: &Peer) -> PeerStatusReport {
    let Some(path) = &peer.path else {
        return PeerStatusReport::bare(
            peer,
            PeerKind::Filesystem,
            "-".to_string(),
            PeerCondition::PathMissing,
        )
        .with_detail("peer entry is missing a filesystem path");
    };
    let location = path.display().to_string();
    if !path.exists() {
        return PeerStatusReport::bare(
            peer,
            PeerKind::Filesystem,
            location.clone(),
            PeerCondition::PathMissing,
        )
        .with_detail(format!("directory not found: {location}"));
    }

    match verify_bundle(path, None) {
        Ok(record) => {
            let mut report = PeerStatusReport::bare(
                peer,
                PeerKind::Filesystem,
                location,
                PeerCondition::Verified,
            )
            .with_detail(format!("signed with key {}", record.key_id));
            report.signed_at = record.signed_at.format(&Rfc3339).ok();
            report.manifest_digest = Some(record.manifest_digest);
            report.has_bundle = Some(true);
            if let Ok(files) = list_files(path) {
                report.file_count = Some(files.len() as u64);
                report.total_bytes = Some(
                    files
                        .iter()
                        .filter_map(|file| file.metadata().ok())
                        .map(|meta| meta.len())
                        .sum::<u64>(),
                );
            }
            report
        }
        Err(SignatureError::SignatureMissing(_)) | Err(SignatureError::ManifestMissing(_)) => {
            PeerStatusReport::bare(
                peer,
                PeerKind::Filesystem,
                location,
                PeerCondition::AwaitingBundle,
            )
            .with_detail("no signed bundle at peer path yet")
        }
        Err(err) => PeerStatusReport::bare(
            peer,
            PeerKind::Filesystem,
            location,
            PeerCondition::SignatureError,
        )
        .with_detail(err.to_string()),
    }
}

async fn hub_peer_status(peer: &Peer, keystore: &Keystore, client: &HubClient) -> PeerStatusReport {
    let location = peer.url.clone().unwrap_or_else(|| "-".to_string());
    if peer.token.as_deref().unwrap_or("").is_empty() {
        return PeerStatusReport::bare(
            peer,
            PeerKind::Hub,
            location,
            PeerCondition::TokenRequired,
        )
        .with_detail("add a bearer token to the peer entry to contact this hub");
    }

    // A signing key is needed so auto-registering hubs can identify us.
    if let Err(err) = keystore.ensure_local_keypair(true) {
        return PeerStatusReport::bare(
            peer,
            PeerKind::Hub,
            location,
            PeerCondition::SigningKeyError,
        )
        .with_detail(err.to_string());
    }

    match client.status(peer).await {
        Ok(status) => {
            let mut report = PeerStatusReport::bare(
                peer,
                PeerKind::Hub,
                location,
                if status.has_bundle {
                    PeerCondition::BundleReady
                } else {
                    PeerCondition::AwaitingBundle
                },
            );
            if !status.has_bundle {
                report.detail = Some("hub reports no bundle for this peer yet".to_string());
            }
            if let Some(metadata) = status.metadata {
                report.signed_at = Some(metadata.signed_at);
                report.manifest_digest = Some(metadata.manifest_digest);
            }
            report.file_count = Some(status.file_count);
            report.total_bytes = Some(status.total_bytes);
            report.has_bundle = Some(status.has_bundle);
            report
        }
        Err(HubClientError::Transport(err)) => {
            PeerStatusReport::bare(peer, PeerKind::Hub, location, PeerCondition::Unreachable)
                .with_detail(err.to_string())
        }
        Err(err) => {
            PeerStatusReport::bare(peer, PeerKind::Hub, location, PeerCondition::HubError)
                .with_detail(err.to_string())
        }
    }
}
