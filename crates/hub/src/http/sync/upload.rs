use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;

use crate::http::auth::{bearer_token, presented_public_key};
use crate::service::{accept_upload, UploadAccepted, UploadError};
use crate::state::HubState;

/// `POST /api/v1/sync/{peer}/bundle` — multipart upload of a tar.gz
/// bundle in the `bundle` field.
pub async fn handler(
    State(state): State<HubState>,
    Path(peer_name): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, UploadHandlerError> {
    let mut bundle_bytes: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadHandlerError::BadMultipart(e.to_string()))?
    {
        if field.name() == Some("bundle") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| UploadHandlerError::BadMultipart(e.to_string()))?;
            bundle_bytes = Some(bytes.to_vec());
        }
    }
    let bundle_bytes = bundle_bytes.ok_or(UploadHandlerError::MissingBundleField)?;

    let bearer = bearer_token(&headers);
    let presented_key = presented_public_key(&headers);
    let accepted: UploadAccepted = accept_upload(
        &state,
        &peer_name,
        bearer.as_deref(),
        presented_key.as_deref(),
        &bundle_bytes,
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum UploadHandlerError {
    #[error("invalid multipart payload: {0}")]
    BadMultipart(String),
    #[error("multipart field 'bundle' is required")]
    MissingBundleField,
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl IntoResponse for UploadHandlerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            UploadHandlerError::BadMultipart(detail) => (
                StatusCode::BAD_REQUEST,
                json!({"error": "invalid_upload", "detail": detail}),
            ),
            UploadHandlerError::MissingBundleField => (
                StatusCode::BAD_REQUEST,
                json!({"error": "invalid_upload", "detail": "multipart field 'bundle' is required"}),
            ),
            UploadHandlerError::Upload(err) => return upload_error_response(err),
        };
        (status, Json(body)).into_response()
    }
}

/// Map pipeline errors onto the wire contract. Trust failures carry the
/// pending id; integrity failures are plain 400s; nothing here ever echoes
/// tokens or key material.
fn upload_error_response(err: &UploadError) -> Response {
    let (status, body) = match err {
        UploadError::UnknownPeer => (StatusCode::NOT_FOUND, json!({"error": "unknown_peer"})),
        UploadError::MissingAuth => (
            StatusCode::UNAUTHORIZED,
            json!({"error": "missing_bearer_token"}),
        ),
        UploadError::InvalidToken => (StatusCode::UNAUTHORIZED, json!({"error": "invalid_token"})),
        UploadError::TokenPeerMismatch(peer) => (
            StatusCode::FORBIDDEN,
            json!({"error": "token_not_authorized", "peer": peer}),
        ),
        UploadError::KeyHeldForApproval { pending_id } => (
            StatusCode::BAD_REQUEST,
            json!({"error": "peer_key_mismatch", "pending_id": pending_id}),
        ),
        UploadError::AutoRegisterKeyRequired | UploadError::AutoRegisterKeyMismatch => (
            StatusCode::BAD_REQUEST,
            json!({"error": "auto_register_key", "detail": err.to_string()}),
        ),
        UploadError::Archive(archive_err) => (
            StatusCode::BAD_REQUEST,
            json!({"error": "invalid_bundle", "detail": archive_err.to_string()}),
        ),
        UploadError::Signature(signature_err) => (
            StatusCode::BAD_REQUEST,
            json!({"error": "signature_verification_failed", "detail": signature_err.to_string()}),
        ),
        UploadError::Pending(_)
        | UploadError::Storage(_)
        | UploadError::Ingest(_)
        | UploadError::Config(_)
        | UploadError::Io(_) => {
            tracing::error!(error = %err, "upload processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "internal_error"}),
            )
        }
    };
    (status, Json(body)).into_response()
}
