pub mod activity_log;
pub mod export;
pub mod import;
pub mod job_tracker;
pub mod orchestrator;
pub mod pending_pull;
pub mod status;

pub use activity_log::{ActivityEvent, ActivityLog};
pub use export::export_bundle;
pub use import::import_bundle;
pub use job_tracker::{JobState, JobStatus, JobTracker};
pub use orchestrator::{JobOutcome, SyncEngine, SyncError};
pub use pending_pull::{PendingPullEntry, PendingPullStore};
pub use status::{collect_peer_statuses, PeerStatusReport};
