//! Append-only sync activity log, bounded to the most recent events.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const MAX_EVENTS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub peer: String,
    pub action: String,
    pub status: String,
    pub triggered_by: Option<String>,
    pub message: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(
        &self,
        peer: &str,
        action: &str,
        status: &str,
        triggered_by: Option<&str>,
        message: Option<&str>,
    ) {
        let mut events = self.read_all();
        events.push(ActivityEvent {
            peer: peer.to_string(),
            action: action.to_string(),
            status: status.to_string(),
            triggered_by: triggered_by.map(str::to_string),
            message: message.map(str::to_string),
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        });
        let start = events.len().saturating_sub(MAX_EVENTS);
        let bounded = &events[start..];

        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(bounded) {
            Ok(json) => {
                if let Err(err) = fs::write(&self.path, format!("{json}\n")) {
                    tracing::warn!(error = %err, "failed to write activity log");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to serialize activity log"),
        }
    }

    /// Most recent events first.
    pub fn read_events(&self, limit: usize) -> Vec<ActivityEvent> {
        let mut events = self.read_all();
        events.reverse();
        events.truncate(limit);
        events
    }

    fn read_all(&self) -> Vec<ActivityEvent> {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&text).unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read_newest_first() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path().join("sync_activity.json"));

        log.append("hub", "push", "success", Some("ada"), None);
        log.append("hub", "pull", "error", None, Some("hub unreachable"));

        let events = log.read_events(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "pull");
        assert_eq!(events[1].action, "push");
    }

    #[test]
    fn test_log_is_bounded() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path().join("sync_activity.json"));

        for i in 0..(MAX_EVENTS + 25) {
            log.append("peer", "push", "success", None, Some(&format!("run {i}")));
        }
        let events = log.read_events(MAX_EVENTS * 2);
        assert_eq!(events.len(), MAX_EVENTS);
        // newest survived
        assert_eq!(
            events[0].message.as_deref(),
            Some(format!("run {}", MAX_EVENTS + 24).as_str())
        );
    }
}
