use std::path::PathBuf;

use warren_daemon::sync::import::{import_bundle, ImportError};

use crate::cli::op::{Op, OpContext, OpSetupError};

/// Import sync files from a bundle directory.
///
/// Verification is the caller's concern: use `pull` for the full
/// verify-then-import path against a configured peer.
#[derive(Debug, Clone, clap::Args)]
pub struct Import {
    /// Directory containing sync files
    pub input: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportOpError {
    #[error(transparent)]
    Setup(#[from] OpSetupError),
    #[error(transparent)]
    Import(#[from] ImportError),
}

#[async_trait::async_trait]
impl Op for Import {
    type Error = ImportOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state().map_err(OpSetupError::from)?;
        let db = ctx.open_db(&state).await.map_err(OpSetupError::from)?;
        let count = import_bundle(&db, &self.input).await?;
        Ok(format!("imported {count} records from {}", self.input.display()))
    }
}
