use std::path::PathBuf;

use warren_daemon::sync::export::{export_bundle, ExportError};

use crate::cli::op::{Op, OpContext, OpSetupError};

/// Export public entities into a signed bundle directory.
#[derive(Debug, Clone, clap::Args)]
pub struct Export {
    /// Output directory (defaults to <home>/public_sync)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Skip signing the exported bundle
    #[arg(long)]
    pub unsigned: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportOpError {
    #[error(transparent)]
    Setup(#[from] OpSetupError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Keystore(#[from] common::crypto::KeystoreError),
    #[error("no signing key available")]
    NoSigningKey,
    #[error(transparent)]
    Signature(#[from] common::bundle::signature::SignatureError),
}

#[async_trait::async_trait]
impl Op for Export {
    type Error = ExportOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state().map_err(OpSetupError::from)?;
        let db = ctx.open_db(&state).await.map_err(OpSetupError::from)?;
        let output = self.output.clone().unwrap_or_else(|| state.export_dir());

        let files = export_bundle(&db, &state.config.instance_id, &output).await?;
        if !self.unsigned {
            let (key, _) = state.keystore().ensure_local_keypair(true)?;
            let key = key.ok_or(ExportOpError::NoSigningKey)?;
            common::bundle::signature::sign_bundle(&output, &key)?;
        }
        Ok(format!(
            "exported {} files to {}{}",
            files.len(),
            output.display(),
            if self.unsigned { "" } else { " (signed)" }
        ))
    }
}
