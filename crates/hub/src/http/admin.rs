//! Admin API: pending-approval review plus a per-peer summary.
//!
//! Guarded by admin bearer tokens from the hub config. These endpoints
//! back whatever dashboard an operator puts in front of them.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use serde_json::json;

use crate::http::auth::bearer_token;
use crate::service::{approve_pending, authenticate_admin, discard_pending, AdminError, UploadError};
use crate::state::HubState;

pub fn router(state: HubState) -> Router {
    Router::new()
        .route("/pending", get(list_pending))
        .route("/pending/:pending_id/approve", post(approve))
        .route("/pending/:pending_id/discard", post(discard))
        .route("/summary", get(summary))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct PendingEntryDto {
    id: String,
    peer_name: String,
    presented_key: String,
    manifest_digest: Option<String>,
    signed_at: Option<String>,
    created_at: String,
}

async fn list_pending(
    State(state): State<HubState>,
    headers: HeaderMap,
) -> Result<Response, AdminHandlerError> {
    authenticate_admin(&state, bearer_token(&headers).as_deref())?;
    let entries: Vec<PendingEntryDto> = state
        .pending()
        .list(None)
        .into_iter()
        .map(|entry| PendingEntryDto {
            id: entry.id,
            peer_name: entry.peer_name,
            presented_key: entry.presented_key,
            manifest_digest: entry.manifest_digest,
            signed_at: entry.signed_at,
            created_at: entry.created_at,
        })
        .collect();
    Ok((StatusCode::OK, Json(json!({"pending": entries}))).into_response())
}

async fn approve(
    State(state): State<HubState>,
    Path(pending_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AdminHandlerError> {
    let admin = authenticate_admin(&state, bearer_token(&headers).as_deref())?;
    let report = approve_pending(&state, &pending_id).await?;
    tracing::info!(
        admin = %admin,
        pending_id = %pending_id,
        peer = %report.peer,
        "pending upload approved"
    );
    Ok((StatusCode::OK, Json(report)).into_response())
}

async fn discard(
    State(state): State<HubState>,
    Path(pending_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AdminHandlerError> {
    let admin = authenticate_admin(&state, bearer_token(&headers).as_deref())?;
    discard_pending(&state, &pending_id)?;
    tracing::info!(admin = %admin, pending_id = %pending_id, "pending upload discarded");
    Ok((
        StatusCode::OK,
        Json(json!({"discarded": pending_id})),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
struct PeerSummaryDto {
    name: String,
    has_bundle: bool,
    file_count: u64,
    total_bytes: u64,
    signed_at: Option<String>,
    manifest_digest: Option<String>,
    trusted_keys: usize,
}

/// Per-peer stats for the operator dashboard.
async fn summary(
    State(state): State<HubState>,
    headers: HeaderMap,
) -> Result<Response, AdminHandlerError> {
    authenticate_admin(&state, bearer_token(&headers).as_deref())?;

    let peers: Vec<(String, usize)> = state
        .config()
        .peers()
        .map(|peer| (peer.name.clone(), peer.public_keys.len()))
        .collect();

    let mut rows = Vec::with_capacity(peers.len());
    let mut total_files = 0u64;
    let mut total_bytes = 0u64;
    for (name, trusted_keys) in peers {
        let has_bundle = state.store().bundle_exists(&name);
        let metadata = state.store().read_metadata(&name);
        let stats = if has_bundle {
            state.store().summarize(&name)
        } else {
            crate::storage::BundleSummary {
                file_count: 0,
                total_bytes: 0,
            }
        };
        total_files += stats.file_count;
        total_bytes += stats.total_bytes;
        rows.push(PeerSummaryDto {
            name,
            has_bundle,
            file_count: stats.file_count,
            total_bytes: stats.total_bytes,
            signed_at: metadata.as_ref().map(|meta| meta.signed_at.clone()),
            manifest_digest: metadata.map(|meta| meta.manifest_digest),
            trusted_keys,
        });
    }

    let peer_count = rows.len();
    Ok((
        StatusCode::OK,
        Json(json!({
            "peers": rows,
            "peer_count": peer_count,
            "total_files": total_files,
            "total_bytes": total_bytes,
            "pending_count": state.pending().list(None).len(),
        })),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum AdminHandlerError {
    #[error(transparent)]
    Auth(#[from] UploadError),
    #[error(transparent)]
    Admin(#[from] AdminError),
}

impl IntoResponse for AdminHandlerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AdminHandlerError::Auth(UploadError::MissingAuth) => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "missing_bearer_token"}),
            ),
            AdminHandlerError::Auth(UploadError::InvalidToken) => {
                (StatusCode::UNAUTHORIZED, json!({"error": "invalid_token"}))
            }
            AdminHandlerError::Auth(err) => {
                tracing::error!(error = %err, "unexpected admin auth failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "internal_error"}),
                )
            }
            AdminHandlerError::Admin(AdminError::PendingNotFound(id)) => (
                StatusCode::NOT_FOUND,
                json!({"error": "pending_not_found", "pending_id": id}),
            ),
            AdminHandlerError::Admin(err) => {
                // Replay failures stay actionable for the operator; the
                // pending entry was retained.
                tracing::error!(error = %err, "pending approval failed");
                (
                    StatusCode::BAD_REQUEST,
                    json!({"error": "approval_failed", "detail": err.to_string()}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
