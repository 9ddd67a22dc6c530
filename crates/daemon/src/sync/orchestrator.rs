//! Push/pull job driver.
//!
//! Jobs are triggered by the CLI (or an admin surface) and recorded in the
//! injected [`JobTracker`] plus the append-only activity log. A job that
//! ends with data parked in an approval queue is a distinct "pending"
//! outcome, not a failure; a hub that cannot be reached is a transport
//! failure, never confused with a bad signature.

use std::time::Duration;

use time::format_description::well_known::Rfc3339;

use common::bundle::archive::{
    extract_bundle, locate_bundle_root, pack_bundle, replace_dir, ArchiveError,
};
use common::bundle::signature::{sign_bundle, verify_bundle, SignatureError};
use common::crypto::KeystoreError;
use common::peer::{Peer, PeerFileError};

use crate::database::Database;
use crate::hub_client::{HubClient, HubClientError};
use crate::state::AppState;
use crate::sync::activity_log::ActivityLog;
use crate::sync::export::{export_bundle, ExportError};
use crate::sync::import::{import_bundle, ImportError};
use crate::sync::job_tracker::{JobState, JobTracker};
use crate::sync::pending_pull::{PendingPullError, PendingPullStore};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("peer '{0}' not found")]
    UnknownPeer(String),
    #[error("no signing key available")]
    NoSigningKey,
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    #[error(transparent)]
    PeerFile(#[from] PeerFileError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Hub(#[from] HubClientError),
    #[error(transparent)]
    PendingPull(#[from] PendingPullError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How a push/pull job ended, as reported to the tracker and the log.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Success(String),
    Pending(String),
    Failed(String),
}

impl JobOutcome {
    pub fn message(&self) -> &str {
        match self {
            JobOutcome::Success(msg) | JobOutcome::Pending(msg) | JobOutcome::Failed(msg) => msg,
        }
    }

    fn job_state(&self) -> JobState {
        match self {
            JobOutcome::Success(_) => JobState::Success,
            JobOutcome::Pending(_) => JobState::Pending,
            JobOutcome::Failed(_) => JobState::Error,
        }
    }

    fn status_str(&self) -> &'static str {
        match self {
            JobOutcome::Success(_) => "success",
            JobOutcome::Pending(_) => "pending",
            JobOutcome::Failed(_) => "error",
        }
    }
}

/// Drives export/sign/transfer against a single configured peer.
pub struct SyncEngine {
    state: AppState,
    db: Database,
    jobs: JobTracker,
    activity: ActivityLog,
    client: HubClient,
    pending: PendingPullStore,
}

impl SyncEngine {
    pub fn new(state: AppState, db: Database, jobs: JobTracker) -> Result<Self, SyncError> {
        let activity = ActivityLog::new(state.activity_log_path());
        let client = HubClient::new(Duration::from_secs(state.config.hub_timeout_secs))?;
        let pending = PendingPullStore::new(state.pending_pull_dir());
        Ok(Self {
            state,
            db,
            jobs,
            activity,
            client,
            pending,
        })
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn pending_pulls(&self) -> &PendingPullStore {
        &self.pending
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn load_peer(&self, peer_name: &str) -> Result<Peer, SyncError> {
        self.state
            .peer_file()
            .get(peer_name)?
            .ok_or_else(|| SyncError::UnknownPeer(peer_name.to_string()))
    }

    /// Export, sign, and deliver the bundle to `peer_name`.
    pub async fn push(&self, peer_name: &str, triggered_by: Option<&str>) -> JobOutcome {
        self.jobs.queue(peer_name, "push", triggered_by);
        self.jobs.mark_started(peer_name, "push");
        let outcome = match self.push_inner(peer_name).await {
            Ok(message) => JobOutcome::Success(message),
            Err(SyncError::Hub(HubClientError::KeyHeldForApproval { peer, pending_id })) => {
                JobOutcome::Pending(format!(
                    "hub holds bundle for peer '{peer}' awaiting key approval (pending id {pending_id})"
                ))
            }
            Err(SyncError::Hub(HubClientError::Transport(err))) => {
                JobOutcome::Failed(format!("hub unreachable: {err}"))
            }
            Err(err) => JobOutcome::Failed(err.to_string()),
        };
        self.record(peer_name, "push", triggered_by, &outcome);
        outcome
    }

    async fn push_inner(&self, peer_name: &str) -> Result<String, SyncError> {
        let peer = self.load_peer(peer_name)?;
        let keystore = self.state.keystore();
        let (key, created) = keystore.ensure_local_keypair(true)?;
        let key = key.ok_or(SyncError::NoSigningKey)?;
        if created {
            tracing::info!(key_id = key.key_id(), "generated signing key on first push");
        }

        let export_dir = self.state.export_dir();
        let files = export_bundle(&self.db, &self.state.config.instance_id, &export_dir).await?;
        sign_bundle(&export_dir, &key)?;

        if let Some(path) = &peer.path {
            replace_dir(&export_dir, path)?;
            return Ok(format!(
                "copied {} files to {}",
                files.len() + 1,
                path.display()
            ));
        }

        let bytes = pack_bundle(&export_dir)?;
        let receipt = self
            .client
            .upload_bundle(&peer, bytes, &key.public_key_b64())
            .await?;
        Ok(format!(
            "hub stored {} files ({} bytes), digest {}",
            receipt.stored_files,
            receipt.stored_bytes,
            &receipt.manifest_digest[..16.min(receipt.manifest_digest.len())]
        ))
    }

    /// Fetch a peer's bundle, verify it, and either import it or park it
    /// for key approval.
    pub async fn pull(&self, peer_name: &str, triggered_by: Option<&str>) -> JobOutcome {
        self.jobs.queue(peer_name, "pull", triggered_by);
        self.jobs.mark_started(peer_name, "pull");
        let outcome = match self.pull_inner(peer_name).await {
            Ok(outcome) => outcome,
            Err(SyncError::Hub(HubClientError::Transport(err))) => {
                JobOutcome::Failed(format!("hub unreachable: {err}"))
            }
            Err(err) => JobOutcome::Failed(err.to_string()),
        };
        self.record(peer_name, "pull", triggered_by, &outcome);
        outcome
    }

    async fn pull_inner(&self, peer_name: &str) -> Result<JobOutcome, SyncError> {
        let peer = self.load_peer(peer_name)?;

        // The tempdir must outlive verification and import of a hub pull.
        let mut _tmp: Option<tempfile::TempDir> = None;
        let (bundle_bytes, bundle_root) = if let Some(path) = &peer.path {
            (pack_bundle(path)?, path.clone())
        } else {
            let bytes = self.client.download_bundle(&peer).await?;
            let tmp = tempfile::TempDir::new()?;
            extract_bundle(&bytes, tmp.path())?;
            let root = locate_bundle_root(tmp.path())?;
            _tmp = Some(tmp);
            (bytes, root)
        };

        // Integrity first; trust is a separate decision.
        let record = verify_bundle(&bundle_root, None)?;

        let pinned = peer
            .public_key
            .as_deref()
            .map(|key| key.split_whitespace().collect::<String>())
            .unwrap_or_default();
        if pinned == record.public_key_b64 {
            let count = import_bundle(&self.db, &bundle_root).await?;
            return Ok(JobOutcome::Success(format!(
                "imported {count} records from '{peer_name}'"
            )));
        }

        // Unknown or rotated key: cache for admin review instead of
        // importing under an untrusted identity.
        let signed_at = record.signed_at.format(&Rfc3339).ok();
        let entry = self.pending.cache(
            peer_name,
            &bundle_bytes,
            &record.public_key_b64,
            &record.manifest_digest,
            signed_at.as_deref(),
        )?;
        Ok(JobOutcome::Pending(format!(
            "bundle held for key approval (pending id {})",
            entry.id
        )))
    }

    /// Approve a cached pull: pin the presented key, replay the bundle.
    pub async fn approve_pending_pull(
        &self,
        pending_id: &str,
    ) -> Result<(String, usize, bool), SyncError> {
        let entry = self
            .pending
            .get(pending_id)
            .ok_or_else(|| PendingPullError::NotFound(pending_id.to_string()))?;
        let peer_file = self.state.peer_file();
        let result = self.pending.approve(&self.db, &peer_file, &entry).await?;
        self.activity.append(
            &result.0,
            "pull-approve",
            "success",
            None,
            Some(&format!("imported {} records", result.1)),
        );
        Ok(result)
    }

    pub fn discard_pending_pull(&self, pending_id: &str) -> Result<(), SyncError> {
        let entry = self
            .pending
            .get(pending_id)
            .ok_or_else(|| PendingPullError::NotFound(pending_id.to_string()))?;
        self.pending.remove(&entry);
        self.activity
            .append(&entry.peer_name, "pull-discard", "success", None, None);
        Ok(())
    }

    fn record(&self, peer: &str, action: &str, triggered_by: Option<&str>, outcome: &JobOutcome) {
        self.jobs
            .mark_finished(peer, action, outcome.job_state(), Some(outcome.message()));
        self.activity.append(
            peer,
            action,
            outcome.status_str(),
            triggered_by,
            Some(outcome.message()),
        );
        match outcome {
            JobOutcome::Success(msg) => tracing::info!(peer, action, "{msg}"),
            JobOutcome::Pending(msg) => tracing::info!(peer, action, "{msg}"),
            JobOutcome::Failed(msg) => tracing::warn!(peer, action, "{msg}"),
        }
    }
}
