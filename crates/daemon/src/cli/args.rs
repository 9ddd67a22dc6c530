pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "warren")]
#[command(about = "Community instance with signed public-data sync")]
pub struct Args {
    /// Path to the warren home directory (defaults to ~/.warren)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
