use std::time::Duration;

use warren_daemon::hub_client::{HubClient, HubClientError};
use warren_daemon::sync::collect_peer_statuses;

use crate::cli::op::{Op, OpContext, OpSetupError};

/// Show the status of every configured peer.
#[derive(Debug, Clone, clap::Args)]
pub struct Status {
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    Setup(#[from] OpSetupError),
    #[error(transparent)]
    PeerFile(#[from] common::peer::PeerFileError),
    #[error(transparent)]
    Hub(#[from] HubClientError),
    #[error("failed to serialize status: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl Op for Status {
    type Error = StatusError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx
            .load_state()
            .map_err(OpSetupError::from)?;
        let peers = state.peer_file().load()?;
        let client = HubClient::new(Duration::from_secs(state.config.hub_timeout_secs))?;
        let reports = collect_peer_statuses(&peers, &state.keystore(), &client).await;

        if self.json {
            return Ok(serde_json::to_string_pretty(&reports)?);
        }
        if reports.is_empty() {
            return Ok("no peers configured".to_string());
        }
        let lines: Vec<String> = reports
            .iter()
            .map(|report| {
                format!(
                    "{}\t{:?}\t{}",
                    report.name,
                    report.condition,
                    report.detail.as_deref().unwrap_or("")
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
