//! Integration tests for export, signing, import, and the pull-side
//! approval queue.

mod common;

use std::fs;

use ::common::bundle::manifest::MANIFEST_FILENAME;
use ::common::bundle::signature::{sign_bundle, verify_bundle, SignatureError};
use ::common::peer::Peer;
use warren_daemon::sync::export::export_bundle;
use warren_daemon::sync::import::import_bundle;
use warren_daemon::sync::{JobOutcome, JobTracker, SyncEngine};

#[tokio::test]
async fn test_export_is_public_only_and_manifest_last() {
    let (state, db, _temp) = common::setup_instance("https://a.example.org").await;
    common::seed_board(&db).await;

    let out = state.export_dir();
    let files = export_bundle(&db, "https://a.example.org", &out).await.unwrap();

    // 1 user + 1 request + 1 invite + manifest
    assert_eq!(files.len(), 4);
    assert!(out.join("users/user_1.sync.txt").exists());
    assert!(out.join("requests/request_10.sync.txt").exists());
    assert!(out.join("invites/invite_tok-abc.sync.txt").exists());
    assert!(!out.join("users/user_2.sync.txt").exists());
    assert!(!out.join("requests/request_11.sync.txt").exists());

    // nested comments: only the public ones ride along
    let request_text = fs::read_to_string(out.join("requests/request_10.sync.txt")).unwrap();
    assert!(request_text.contains("I can help"));
    assert!(request_text.contains("Me too"));
    assert!(!request_text.contains("secret note"));

    // every exported file appears in the manifest
    let manifest = fs::read_to_string(out.join(MANIFEST_FILENAME)).unwrap();
    assert_eq!(manifest.lines().count(), 3);
    assert!(manifest.contains("users/user_1.sync.txt"));
}

#[tokio::test]
async fn test_second_export_drops_stale_files() {
    let (state, db, _temp) = common::setup_instance("https://a.example.org").await;
    common::seed_board(&db).await;

    let out = state.export_dir();
    export_bundle(&db, "https://a.example.org", &out).await.unwrap();

    // Entity goes private between exports; its old file must not linger.
    db.upsert_request(
        10,
        "Need a ride to the market",
        "Saturday morning, two crates",
        "open",
        None,
        Some(1),
        time::OffsetDateTime::from_unix_timestamp(1_700_000_002).unwrap(),
        time::OffsetDateTime::from_unix_timestamp(1_700_000_003).unwrap(),
        "private",
    )
    .await
    .unwrap();

    export_bundle(&db, "https://a.example.org", &out).await.unwrap();
    assert!(!out.join("requests/request_10.sync.txt").exists());
    let manifest = fs::read_to_string(out.join(MANIFEST_FILENAME)).unwrap();
    assert!(!manifest.contains("requests/request_10.sync.txt"));
}

#[tokio::test]
async fn test_signed_export_verifies_and_tamper_fails() {
    let (state, db, _temp) = common::setup_instance("https://a.example.org").await;
    common::seed_board(&db).await;

    let out = state.export_dir();
    export_bundle(&db, "https://a.example.org", &out).await.unwrap();
    let (key, created) = state.keystore().ensure_local_keypair(true).unwrap();
    let key = key.unwrap();
    assert!(created);
    sign_bundle(&out, &key).unwrap();

    let record = verify_bundle(&out, None).unwrap();
    assert_eq!(record.key_id, key.key_id());

    let manifest_path = out.join(MANIFEST_FILENAME);
    let mut bytes = fs::read(&manifest_path).unwrap();
    bytes.push(b'x');
    fs::write(&manifest_path, bytes).unwrap();
    assert!(matches!(
        verify_bundle(&out, None),
        Err(SignatureError::DigestMismatch)
    ));
}

#[tokio::test]
async fn test_import_upserts_without_deleting() {
    let (state_a, db_a, _temp_a) = common::setup_instance("https://a.example.org").await;
    common::seed_board(&db_a).await;
    let out = state_a.export_dir();
    export_bundle(&db_a, "https://a.example.org", &out).await.unwrap();

    let (_state_b, db_b, _temp_b) = common::setup_instance("https://b.example.org").await;
    // B has its own local request the bundle knows nothing about.
    db_b.upsert_request(
        500,
        "Local only",
        "stays put",
        "open",
        None,
        None,
        time::OffsetDateTime::from_unix_timestamp(1_700_000_100).unwrap(),
        time::OffsetDateTime::from_unix_timestamp(1_700_000_100).unwrap(),
        "public",
    )
    .await
    .unwrap();

    let count = import_bundle(&db_b, &out).await.unwrap();
    assert_eq!(count, 3);

    // merged rows arrived
    let merged = db_b.get_request(10).await.unwrap().unwrap();
    assert_eq!(merged.title, "Need a ride to the market");
    let comments = db_b.list_public_comments(10).await.unwrap();
    assert_eq!(comments.len(), 2);

    // absence from the bundle never deletes local rows
    assert!(db_b.get_request(500).await.unwrap().is_some());
    assert_eq!(db_b.count_requests().await.unwrap(), 2);

    // re-import is idempotent
    let again = import_bundle(&db_b, &out).await.unwrap();
    assert_eq!(again, 3);
    assert_eq!(db_b.count_requests().await.unwrap(), 2);
}

#[tokio::test]
async fn test_import_skips_malformed_file() {
    let (state_a, db_a, _temp_a) = common::setup_instance("https://a.example.org").await;
    common::seed_board(&db_a).await;
    let out = state_a.export_dir();
    export_bundle(&db_a, "https://a.example.org", &out).await.unwrap();
    fs::write(out.join("users/user_99.sync.txt"), "Entity: user\n\nnot json\n").unwrap();

    let (_state_b, db_b, _temp_b) = common::setup_instance("https://b.example.org").await;
    let count = import_bundle(&db_b, &out).await.unwrap();
    // the bad file is skipped, everything else lands
    assert_eq!(count, 3);
    assert!(db_b.get_request(10).await.unwrap().is_some());
}

#[tokio::test]
async fn test_pull_unknown_key_parks_then_approve_imports() {
    // Instance A exports + signs a bundle to a shared directory.
    let (state_a, db_a, temp_a) = common::setup_instance("https://a.example.org").await;
    common::seed_board(&db_a).await;
    let shared = temp_a.path().join("drop");
    export_bundle(&db_a, "https://a.example.org", &shared).await.unwrap();
    let (key_a, _) = state_a.keystore().ensure_local_keypair(true).unwrap();
    let key_a = key_a.unwrap();
    sign_bundle(&shared, &key_a).unwrap();

    // Instance B registers A as a filesystem peer with no pinned key.
    let (state_b, db_b, _temp_b) = common::setup_instance("https://b.example.org").await;
    state_b
        .peer_file()
        .add(Peer {
            name: "alpha".into(),
            path: Some(shared.clone()),
            url: None,
            token: None,
            public_key: None,
        })
        .unwrap();

    let engine = SyncEngine::new(state_b.clone(), db_b.clone(), JobTracker::new()).unwrap();
    let message = match engine.pull("alpha", Some("tester")).await {
        JobOutcome::Pending(message) => message,
        other => panic!("expected pending outcome, got {other:?}"),
    };
    assert!(message.contains("pending id"));

    // Nothing was imported yet.
    assert_eq!(db_b.count_requests().await.unwrap(), 0);
    let entries = engine.pending_pulls().list();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].presented_key, key_a.public_key_b64());

    // Approve: key gets pinned, bundle imports, entry is consumed.
    let (peer, count, key_updated) = engine.approve_pending_pull(&entries[0].id).await.unwrap();
    assert_eq!(peer, "alpha");
    assert_eq!(count, 3);
    assert!(key_updated);
    assert_eq!(db_b.count_requests().await.unwrap(), 1);
    assert_eq!(
        state_b
            .peer_file()
            .get("alpha")
            .unwrap()
            .unwrap()
            .public_key
            .as_deref(),
        Some(key_a.public_key_b64().as_str())
    );
    assert!(engine.pending_pulls().list().is_empty());

    // A second pull with the pinned key imports directly.
    let outcome = engine.pull("alpha", None).await;
    assert!(matches!(outcome, JobOutcome::Success(_)));
}
