// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::args::Args;
use cli::op::Op;
use cli::{Activity, Export, Import, Init, Keygen, Peers, Pending, Pull, Push, Status};

command_enum! {
    (Activity, Activity),
    (Export, Export),
    (Import, Import),
    (Init, Init),
    (Keygen, Keygen),
    (Peers, Peers),
    (Pending, Pending),
    (Pull, Pull),
    (Push, Push),
    (Status, Status),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let ctx = cli::op::OpContext::new(args.home);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{output}");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
