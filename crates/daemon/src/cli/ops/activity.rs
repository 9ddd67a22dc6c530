use warren_daemon::sync::ActivityLog;

use crate::cli::op::{Op, OpContext};

/// Show recent sync activity.
#[derive(Debug, Clone, clap::Args)]
pub struct Activity {
    /// Number of events to show
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[async_trait::async_trait]
impl Op for Activity {
    type Error = warren_daemon::state::StateError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let log = ActivityLog::new(state.activity_log_path());
        let events = log.read_events(self.limit);
        if events.is_empty() {
            return Ok("no sync activity recorded".to_string());
        }
        let lines: Vec<String> = events
            .iter()
            .map(|event| {
                format!(
                    "{}\t{}\t{}\t{}\t{}",
                    event.timestamp,
                    event.peer,
                    event.action,
                    event.status,
                    event.message.as_deref().unwrap_or("")
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
