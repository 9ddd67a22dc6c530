use warren_daemon::state::{AppConfig, AppState, StateError};

use crate::cli::op::{Op, OpContext};

/// Initialize the warren home directory.
#[derive(Debug, Clone, clap::Args)]
pub struct Init {
    /// Public identifier for this instance, typically its canonical URL
    #[arg(long, default_value = "local-instance")]
    pub instance_id: String,
}

#[async_trait::async_trait]
impl Op for Init {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            instance_id: self.instance_id.clone(),
            ..AppConfig::default()
        };
        let state = AppState::init(ctx.home.clone(), config)?;
        Ok(format!("initialized warren home at {}", state.home.display()))
    }
}
