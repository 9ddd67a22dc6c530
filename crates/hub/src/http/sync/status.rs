use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use serde_json::json;

use crate::http::auth::bearer_token;
use crate::service::{authenticate_peer, UploadError};
use crate::state::HubState;
use crate::storage::HubMetadataRecord;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub peer: String,
    pub has_bundle: bool,
    pub metadata: Option<HubMetadataRecord>,
    pub file_count: u64,
    pub total_bytes: u64,
}

/// `GET /api/v1/sync/{peer}/status`
pub async fn handler(
    State(state): State<HubState>,
    Path(peer_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StatusError> {
    if state.config().get_peer(&peer_name).is_none() {
        return Err(StatusError::UnknownPeer);
    }
    let bearer = bearer_token(&headers);
    authenticate_peer(&state, &peer_name, bearer.as_deref())?;

    let has_bundle = state.store().bundle_exists(&peer_name);
    let metadata = state.store().read_metadata(&peer_name);
    let summary = if has_bundle {
        state.store().summarize(&peer_name)
    } else {
        crate::storage::BundleSummary {
            file_count: 0,
            total_bytes: 0,
        }
    };

    Ok((
        StatusCode::OK,
        Json(StatusResponse {
            peer: peer_name,
            has_bundle,
            metadata,
            file_count: summary.file_count,
            total_bytes: summary.total_bytes,
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("unknown peer")]
    UnknownPeer,
    #[error(transparent)]
    Auth(#[from] UploadError),
}

impl IntoResponse for StatusError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            StatusError::UnknownPeer => (StatusCode::NOT_FOUND, json!({"error": "unknown_peer"})),
            StatusError::Auth(UploadError::MissingAuth) => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "missing_bearer_token"}),
            ),
            StatusError::Auth(UploadError::InvalidToken) => {
                (StatusCode::UNAUTHORIZED, json!({"error": "invalid_token"}))
            }
            StatusError::Auth(UploadError::TokenPeerMismatch(peer)) => (
                StatusCode::FORBIDDEN,
                json!({"error": "token_not_authorized", "peer": peer}),
            ),
            StatusError::Auth(err) => {
                tracing::error!(error = %err, "unexpected auth failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "internal_error"}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
