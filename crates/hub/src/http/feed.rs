use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::state::HubState;

const DEFAULT_FEED_PAGE_SIZE: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub fn router(state: HubState) -> Router {
    Router::new().route("/", get(handler)).with_state(state)
}

/// `GET /api/v1/feed` — read-only aggregated feed, newest activity first.
pub async fn handler(
    State(state): State<HubState>,
    Query(query): Query<FeedQuery>,
) -> Result<Response, FeedError> {
    let page = state
        .feed()
        .list_feed_page(
            query.limit.unwrap_or(DEFAULT_FEED_PAGE_SIZE),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok((StatusCode::OK, Json(page)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl IntoResponse for FeedError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "feed query failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "internal_error"})),
        )
            .into_response()
    }
}
