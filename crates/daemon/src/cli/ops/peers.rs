use std::path::PathBuf;

use common::peer::{Peer, PeerFileError};
use warren_daemon::state::StateError;

use crate::cli::op::{Op, OpContext};

/// Manage the peer registry.
#[derive(Debug, Clone, clap::Args)]
pub struct Peers {
    #[command(subcommand)]
    pub command: PeersCommand,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum PeersCommand {
    /// List configured peers
    List,
    /// Add a peer (filesystem path or hub url + token)
    Add {
        name: String,
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        token: Option<String>,
        /// Pinned signing key (base64)
        #[arg(long)]
        public_key: Option<String>,
    },
    /// Remove a peer
    Remove { name: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PeersError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    PeerFile(#[from] PeerFileError),
}

#[async_trait::async_trait]
impl Op for Peers {
    type Error = PeersError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let peer_file = state.peer_file();
        match &self.command {
            PeersCommand::List => {
                let peers = peer_file.load()?;
                if peers.is_empty() {
                    return Ok("no peers configured".to_string());
                }
                let lines: Vec<String> = peers
                    .iter()
                    .map(|peer| {
                        let location = peer
                            .url
                            .clone()
                            .or_else(|| peer.path.as_ref().map(|p| p.display().to_string()))
                            .unwrap_or_else(|| "-".to_string());
                        let key = peer
                            .public_key
                            .as_deref()
                            .map(|key| {
                                let cleaned: String = key.split_whitespace().collect();
                                if cleaned.len() > 12 {
                                    format!("{}…{}", &cleaned[..6], &cleaned[cleaned.len() - 6..])
                                } else {
                                    cleaned
                                }
                            })
                            .unwrap_or_else(|| "unpinned".to_string());
                        format!("{}\t{}\t{}", peer.name, location, key)
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            PeersCommand::Add {
                name,
                path,
                url,
                token,
                public_key,
            } => {
                let peer = Peer {
                    name: name.clone(),
                    path: path.clone(),
                    url: url.clone(),
                    token: token.clone(),
                    public_key: public_key.clone(),
                };
                peer.validate()?;
                peer_file.add(peer)?;
                Ok(format!("added peer '{name}'"))
            }
            PeersCommand::Remove { name } => {
                peer_file.remove(name)?;
                Ok(format!("removed peer '{name}'"))
            }
        }
    }
}
