//! HTTP client for talking to a hub's sync API.
//!
//! Transport failures (unreachable, timeout) are a distinct error variant
//! from HTTP status errors so callers can tell "the hub is down" apart
//! from "the hub rejected our data".

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use common::peer::Peer;

#[derive(Debug, thiserror::Error)]
pub enum HubClientError {
    #[error("hub unreachable: {0}")]
    Transport(reqwest::Error),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("bundle for peer '{peer}' held for key approval (pending id {pending_id})")]
    KeyHeldForApproval { peer: String, pending_id: String },
    #[error("peer '{0}' has no hub url configured")]
    NotAHub(String),
    #[error("peer '{0}' has no bearer token configured")]
    MissingToken(String),
    #[error("hub returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for HubClientError {
    fn from(err: reqwest::Error) -> Self {
        HubClientError::Transport(err)
    }
}

/// Receipt for an accepted bundle upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    pub peer: String,
    pub manifest_digest: String,
    pub signed_at: String,
    pub stored_bytes: u64,
    pub stored_files: u64,
    #[serde(default)]
    pub auto_registered: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubMetadata {
    pub peer: String,
    pub manifest_digest: String,
    pub signed_at: String,
    pub stored_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubStatusReport {
    pub peer: String,
    pub has_bundle: bool,
    pub metadata: Option<HubMetadata>,
    pub file_count: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct UploadRejection {
    error: String,
    #[serde(default)]
    pending_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HubClient {
    client: Client,
}

impl HubClient {
    pub fn new(timeout: Duration) -> Result<Self, HubClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn endpoint(peer: &Peer, leaf: &str) -> Result<String, HubClientError> {
        let base = peer
            .url
            .as_deref()
            .ok_or_else(|| HubClientError::NotAHub(peer.name.clone()))?
            .trim_end_matches('/');
        Ok(format!("{base}/api/v1/sync/{}/{leaf}", peer.name))
    }

    fn token(peer: &Peer) -> Result<&str, HubClientError> {
        peer.token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| HubClientError::MissingToken(peer.name.clone()))
    }

    /// Upload a packed bundle. `public_key_b64` rides along in the
    /// `X-WB-Public-Key` header so a hub with auto-registration enabled
    /// can pin it on first contact.
    pub async fn upload_bundle(
        &self,
        peer: &Peer,
        bundle_bytes: Vec<u8>,
        public_key_b64: &str,
    ) -> Result<UploadReceipt, HubClientError> {
        let url = Self::endpoint(peer, "bundle")?;
        let part = reqwest::multipart::Part::bytes(bundle_bytes)
            .file_name("bundle.tar.gz")
            .mime_str("application/gzip")
            .map_err(|e| HubClientError::InvalidResponse(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("bundle", part);

        let response = self
            .client
            .post(&url)
            .bearer_auth(Self::token(peer)?)
            .header("X-WB-Public-Key", public_key_b64)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<UploadReceipt>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST {
            if let Ok(rejection) = serde_json::from_str::<UploadRejection>(&text) {
                if rejection.error == "peer_key_mismatch" {
                    return Err(HubClientError::KeyHeldForApproval {
                        peer: peer.name.clone(),
                        pending_id: rejection.pending_id.unwrap_or_default(),
                    });
                }
            }
        }
        Err(HubClientError::HttpStatus(status, text))
    }

    /// Download the hub's stored bundle for this peer as tar.gz bytes.
    pub async fn download_bundle(&self, peer: &Peer) -> Result<Vec<u8>, HubClientError> {
        let url = Self::endpoint(peer, "bundle")?;
        let response = self
            .client
            .get(&url)
            .bearer_auth(Self::token(peer)?)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HubClientError::HttpStatus(
                status,
                response.text().await.unwrap_or_default(),
            ));
        }
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn status(&self, peer: &Peer) -> Result<HubStatusReport, HubClientError> {
        let url = Self::endpoint(peer, "status")?;
        let response = self
            .client
            .get(&url)
            .bearer_auth(Self::token(peer)?)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HubClientError::HttpStatus(
                status,
                response.text().await.unwrap_or_default(),
            ));
        }
        response
            .json::<HubStatusReport>()
            .await
            .map_err(|e| HubClientError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hub_peer() -> Peer {
        Peer {
            name: "hub".into(),
            path: None,
            url: Some("https://hub.example.org/".into()),
            token: Some("tok".into()),
            public_key: None,
        }
    }

    #[test]
    fn test_endpoint_building() {
        let peer = hub_peer();
        assert_eq!(
            HubClient::endpoint(&peer, "status").unwrap(),
            "https://hub.example.org/api/v1/sync/hub/status"
        );
    }

    #[test]
    fn test_endpoint_requires_url_and_token() {
        let mut peer = hub_peer();
        peer.url = None;
        assert!(matches!(
            HubClient::endpoint(&peer, "status"),
            Err(HubClientError::NotAHub(_))
        ));

        let mut peer = hub_peer();
        peer.token = Some(String::new());
        assert!(matches!(
            HubClient::token(&peer),
            Err(HubClientError::MissingToken(_))
        ));
    }
}
