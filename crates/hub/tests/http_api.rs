//! End-to-end test over the real HTTP router: upload with an unknown key,
//! approve through the admin API, then observe status and feed.

mod common;

use axum::body::Body;
use http::{header, Request, StatusCode};
use serde_json::Value;
use tower::util::ServiceExt;

use common::{request_record, signed_bundle_bytes, user_record, ADMIN_TOKEN, PEER_TOKEN};

const BOUNDARY: &str = "warren-test-boundary";

fn multipart_body(bundle_bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"bundle\"; \
             filename=\"bundle.tar.gz\"\r\nContent-Type: application/gzip\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bundle_bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_full_push_approve_feed_flow() {
    // Instance A's bundle: 1 user + 1 request with 2 comments, all public.
    let (_key, bundle_bytes, _scratch) = signed_bundle_bytes(&[
        user_record(1, "ada"),
        request_record(10, "Ride share", vec![(100, "I can help"), (101, "Me too")]),
    ]);

    // The hub knows peer "alpha" but trusts a different key.
    let (state, _config_path, _temp) = common::setup_hub(false, &["SOME-OTHER-KEY"]).await;
    let app = warren_hub::http::router(state.clone());

    // Status before anything: authorized, no bundle.
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/v1/sync/alpha/status")
                .header(header::AUTHORIZATION, format!("Bearer {PEER_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = response_json(response).await;
    assert_eq!(status["has_bundle"], Value::Bool(false));

    // Upload with the unknown key: held for approval.
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/v1/sync/alpha/bundle")
                .header(header::AUTHORIZATION, format!("Bearer {PEER_TOKEN}"))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(&bundle_bytes)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let rejection = response_json(response).await;
    assert_eq!(rejection["error"], "peer_key_mismatch");
    let pending_id = rejection["pending_id"].as_str().unwrap().to_string();
    assert!(!pending_id.is_empty());

    // Admin approves; the replay stores and ingests the cached bundle.
    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/api/v1/admin/pending/{pending_id}/approve"))
                .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = response_json(response).await;
    assert_eq!(report["peer"], "alpha");
    assert_eq!(report["key_appended"], Value::Bool(true));

    // Status now reports the stored bundle.
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/v1/sync/alpha/status")
                .header(header::AUTHORIZATION, format!("Bearer {PEER_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response_json(response).await;
    assert_eq!(status["has_bundle"], Value::Bool(true));
    assert!(status["file_count"].as_u64().unwrap() >= 5);
    assert_eq!(status["metadata"]["peer"], "alpha");

    // The public feed shows exactly one request with both comments.
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/v1/feed?limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let feed = response_json(response).await;
    assert_eq!(feed["total"], 1);
    assert_eq!(feed["items"][0]["comment_count"], 2);
    assert_eq!(feed["items"][0]["title"], "Ride share");

    // The stored bundle can be pulled back down as a tar.gz.
    let response = app
        .oneshot(
            Request::get("/api/v1/sync/alpha/bundle")
                .header(header::AUTHORIZATION, format!("Bearer {PEER_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/gzip"
    );
}

#[tokio::test]
async fn test_status_requires_auth_and_known_peer() {
    let (state, _config_path, _temp) = common::setup_hub(false, &["KEY"]).await;
    let app = warren_hub::http::router(state);

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/v1/sync/alpha/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/v1/sync/ghost/status")
                .header(header::AUTHORIZATION, format!("Bearer {PEER_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::get("/api/v1/admin/pending")
                .header(header::AUTHORIZATION, "Bearer not-an-admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
