//! In-memory push/pull job bookkeeping.
//!
//! One live entry per (peer, action). The tracker is an explicit handle
//! created by the caller and passed wherever it's needed, so tests get
//! isolated trackers instead of shared module state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Success,
    Pending,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub peer: String,
    pub action: String,
    pub state: JobState,
    pub queued_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub message: Option<String>,
    pub triggered_by: Option<String>,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    jobs: Arc<Mutex<HashMap<(String, String), JobStatus>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, peer: &str, action: &str, triggered_by: Option<&str>) {
        let mut jobs = self.jobs.lock();
        jobs.insert(
            (peer.to_string(), action.to_string()),
            JobStatus {
                peer: peer.to_string(),
                action: action.to_string(),
                state: JobState::Queued,
                queued_at: now_rfc3339(),
                started_at: None,
                finished_at: None,
                message: None,
                triggered_by: triggered_by.map(str::to_string),
            },
        );
    }

    pub fn mark_started(&self, peer: &str, action: &str) {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .entry((peer.to_string(), action.to_string()))
            .or_insert_with(|| JobStatus {
                peer: peer.to_string(),
                action: action.to_string(),
                state: JobState::Queued,
                queued_at: now_rfc3339(),
                started_at: None,
                finished_at: None,
                message: None,
                triggered_by: None,
            });
        job.started_at = Some(now_rfc3339());
        job.state = JobState::Running;
    }

    pub fn mark_finished(&self, peer: &str, action: &str, state: JobState, message: Option<&str>) {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .entry((peer.to_string(), action.to_string()))
            .or_insert_with(|| JobStatus {
                peer: peer.to_string(),
                action: action.to_string(),
                state: JobState::Queued,
                queued_at: now_rfc3339(),
                started_at: None,
                finished_at: None,
                message: None,
                triggered_by: None,
            });
        job.finished_at = Some(now_rfc3339());
        job.state = state;
        job.message = message.map(str::to_string);
    }

    pub fn snapshot(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.lock();
        let mut all: Vec<JobStatus> = jobs.values().cloned().collect();
        all.sort_by(|a, b| (&a.peer, &a.action).cmp(&(&b.peer, &b.action)));
        all
    }
}
