use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{header, StatusCode};
use serde_json::json;

use common::bundle::archive::{pack_bundle, ArchiveError};

use crate::http::auth::bearer_token;
use crate::service::{authenticate_peer, UploadError};
use crate::state::HubState;

/// `GET /api/v1/sync/{peer}/bundle` — stream a freshly re-tarred copy of
/// the stored bundle.
pub async fn handler(
    State(state): State<HubState>,
    Path(peer_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, DownloadError> {
    if state.config().get_peer(&peer_name).is_none() {
        return Err(DownloadError::UnknownPeer);
    }
    let bearer = bearer_token(&headers);
    authenticate_peer(&state, &peer_name, bearer.as_deref())?;

    if !state.store().bundle_exists(&peer_name) {
        return Err(DownloadError::NoBundle);
    }
    let bundle_root = state.store().bundle_path(&peer_name);
    let bytes = tokio::task::spawn_blocking(move || pack_bundle(&bundle_root))
        .await
        .map_err(|_| DownloadError::PackFailed)??;

    let filename = format!("{peer_name}_public_sync.tar.gz");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("unknown peer")]
    UnknownPeer,
    #[error("no bundle available")]
    NoBundle,
    #[error(transparent)]
    Auth(#[from] UploadError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("failed to pack stored bundle")]
    PackFailed,
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            DownloadError::UnknownPeer => {
                (StatusCode::NOT_FOUND, json!({"error": "unknown_peer"}))
            }
            DownloadError::NoBundle => (StatusCode::NOT_FOUND, json!({"error": "no_bundle"})),
            DownloadError::Auth(UploadError::MissingAuth) => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "missing_bearer_token"}),
            ),
            DownloadError::Auth(UploadError::InvalidToken) => {
                (StatusCode::UNAUTHORIZED, json!({"error": "invalid_token"}))
            }
            DownloadError::Auth(UploadError::TokenPeerMismatch(peer)) => (
                StatusCode::FORBIDDEN,
                json!({"error": "token_not_authorized", "peer": peer}),
            ),
            DownloadError::Auth(err) => {
                tracing::error!(error = %err, "unexpected auth failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "internal_error"}),
                )
            }
            DownloadError::Archive(_) | DownloadError::PackFailed => {
                tracing::error!(error = %self, "failed to pack bundle for download");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "internal_error"}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
