use warren_daemon::state::StateError;

use crate::cli::op::{Op, OpContext};

/// Generate the instance signing keypair.
#[derive(Debug, Clone, clap::Args)]
pub struct Keygen {
    /// Discard any existing keypair. Peers that pinned the old key must
    /// re-approve the new one.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum KeygenError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Keystore(#[from] common::crypto::KeystoreError),
}

#[async_trait::async_trait]
impl Op for Keygen {
    type Error = KeygenError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let key = state.keystore().generate(self.force)?;
        Ok(format!(
            "generated signing key {} (public key {})",
            key.key_id(),
            key.public_key_b64()
        ))
    }
}
