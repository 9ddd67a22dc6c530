use std::error::Error;
use std::path::PathBuf;

use warren_daemon::database::{Database, DatabaseSetupError};
use warren_daemon::state::{AppState, StateError};
use warren_daemon::sync::{JobTracker, SyncEngine, SyncError};

#[derive(Clone)]
pub struct OpContext {
    /// Optional custom home path (defaults to ~/.warren)
    pub home: Option<PathBuf>,
}

impl OpContext {
    pub fn new(home: Option<PathBuf>) -> Self {
        Self { home }
    }

    pub fn load_state(&self) -> Result<AppState, StateError> {
        AppState::load(self.home.clone())
    }

    pub async fn open_db(&self, state: &AppState) -> Result<Database, DatabaseSetupError> {
        Database::connect(&state.db_path).await
    }

    pub async fn engine(&self) -> Result<SyncEngine, OpSetupError> {
        let state = self.load_state()?;
        let db = self.open_db(&state).await?;
        Ok(SyncEngine::new(state, db, JobTracker::new())?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OpSetupError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Database(#[from] DatabaseSetupError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
