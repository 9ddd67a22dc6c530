use crate::cli::op::{Op, OpContext, OpSetupError};

/// Review pulls held for key approval.
#[derive(Debug, Clone, clap::Args)]
pub struct Pending {
    #[command(subcommand)]
    pub command: PendingCommand,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum PendingCommand {
    /// List cached pulls awaiting a key decision
    List,
    /// Pin the presented key and import the cached bundle
    Approve { pending_id: String },
    /// Delete the cached bundle without importing
    Discard { pending_id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PendingOpError {
    #[error(transparent)]
    Setup(#[from] OpSetupError),
    #[error(transparent)]
    Sync(#[from] warren_daemon::sync::SyncError),
}

#[async_trait::async_trait]
impl Op for Pending {
    type Error = PendingOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let engine = ctx.engine().await?;
        match &self.command {
            PendingCommand::List => {
                let entries = engine.pending_pulls().list();
                if entries.is_empty() {
                    return Ok("no pending pulls".to_string());
                }
                let lines: Vec<String> = entries
                    .iter()
                    .map(|entry| {
                        format!(
                            "{}\t{}\tpresented key {}…",
                            entry.id,
                            entry.peer_name,
                            &entry.presented_key[..16.min(entry.presented_key.len())]
                        )
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            PendingCommand::Approve { pending_id } => {
                let (peer, count, key_updated) = engine.approve_pending_pull(pending_id).await?;
                Ok(format!(
                    "approved pending pull for '{peer}': imported {count} records{}",
                    if key_updated { ", pinned new key" } else { "" }
                ))
            }
            PendingCommand::Discard { pending_id } => {
                engine.discard_pending_pull(pending_id)?;
                Ok(format!("discarded pending pull '{pending_id}'"))
            }
        }
    }
}
