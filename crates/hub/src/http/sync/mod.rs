use axum::routing::{get, post};
use axum::Router;

pub mod download;
pub mod status;
pub mod upload;

use crate::state::HubState;

pub fn router(state: HubState) -> Router {
    Router::new()
        .route(
            "/:peer_name/bundle",
            post(upload::handler).get(download::handler),
        )
        .route("/:peer_name/status", get(status::handler))
        .with_state(state)
}
