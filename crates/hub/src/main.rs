use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};

use warren_hub::config::hash_token;
use warren_hub::process;

#[derive(Parser, Debug)]
#[command(name = "warren-hub")]
#[command(about = "Store-and-relay hub for signed Warren bundles")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the hub HTTP server
    Serve {
        /// Path to the hub config file
        #[arg(long, default_value = ".sync/hub_config.json")]
        config: PathBuf,
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8700")]
        listen: String,
        /// Log level (error, warn, info, debug, trace)
        #[arg(long, default_value = "info")]
        log_level: String,
        /// Directory for log files (stdout only if not set)
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Hash a bearer token for pasting into the hub config
    HashToken { token: String },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    match args.command {
        Command::Serve {
            config,
            listen,
            log_level,
            log_dir,
        } => {
            let listen_addr = match SocketAddr::from_str(&listen) {
                Ok(addr) => addr,
                Err(e) => {
                    eprintln!("Error: invalid listen address '{listen}': {e}");
                    std::process::exit(1);
                }
            };
            let log_level =
                tracing::Level::from_str(&log_level).unwrap_or(tracing::Level::INFO);
            process::spawn_service(&config, listen_addr, log_level, log_dir.as_deref()).await;
        }
        Command::HashToken { token } => {
            println!("{}", hash_token(&token));
        }
    }
}
