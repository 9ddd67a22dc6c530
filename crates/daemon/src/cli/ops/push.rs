use warren_daemon::sync::JobOutcome;

use crate::cli::op::{Op, OpContext, OpSetupError};

/// Export, sign, and deliver the public bundle to a peer.
#[derive(Debug, Clone, clap::Args)]
pub struct Push {
    /// Peer name from the registry
    pub peer: String,
}

#[async_trait::async_trait]
impl Op for Push {
    type Error = OpSetupError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let engine = ctx.engine().await?;
        Ok(match engine.push(&self.peer, None).await {
            JobOutcome::Success(msg) => format!("push succeeded: {msg}"),
            JobOutcome::Pending(msg) => format!("push pending: {msg}"),
            JobOutcome::Failed(msg) => format!("push failed: {msg}"),
        })
    }
}
