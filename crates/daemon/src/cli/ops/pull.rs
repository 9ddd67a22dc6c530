use warren_daemon::sync::JobOutcome;

use crate::cli::op::{Op, OpContext, OpSetupError};

/// Fetch, verify, and import a peer's bundle.
#[derive(Debug, Clone, clap::Args)]
pub struct Pull {
    /// Peer name from the registry
    pub peer: String,
}

#[async_trait::async_trait]
impl Op for Pull {
    type Error = OpSetupError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let engine = ctx.engine().await?;
        Ok(match engine.pull(&self.peer, None).await {
            JobOutcome::Success(msg) => format!("pull succeeded: {msg}"),
            JobOutcome::Pending(msg) => format!("pull pending: {msg}"),
            JobOutcome::Failed(msg) => format!("pull failed: {msg}"),
        })
    }
}
