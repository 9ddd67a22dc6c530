//! Integration tests for the hub's trust workflow, storage, and feed
//! reconciliation.

mod common;

use warren_hub::service::{accept_upload, approve_pending, discard_pending, AdminError, UploadError};

use common::{request_record, signed_bundle_bytes, signed_bundle_bytes_with_key, user_record, PEER_TOKEN};

#[tokio::test]
async fn test_trusted_key_upload_is_stored_and_ingested() {
    let (key, bytes, _scratch) = signed_bundle_bytes(&[
        user_record(1, "ada"),
        request_record(10, "Ride share", vec![(100, "I can help")]),
    ]);
    let (state, _config_path, _temp) = common::setup_hub(false, &[&key.public_key_b64()]).await;

    let accepted = accept_upload(&state, "alpha", Some(PEER_TOKEN), None, &bytes)
        .await
        .unwrap();
    assert_eq!(accepted.peer, "alpha");
    assert!(!accepted.auto_registered);
    assert!(accepted.stored_files >= 4);

    assert!(state.store().bundle_exists("alpha"));
    let page = state.feed().list_feed_page(20, 0).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].request.title, "Ride share");
    assert_eq!(page.items[0].request.comment_count, 1);
}

#[tokio::test]
async fn test_upload_requires_valid_token() {
    let (key, bytes, _scratch) = signed_bundle_bytes(&[user_record(1, "ada")]);
    let (state, _config_path, _temp) = common::setup_hub(false, &[&key.public_key_b64()]).await;

    let err = accept_upload(&state, "alpha", None, None, &bytes)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::MissingAuth));

    let err = accept_upload(&state, "alpha", Some("wrong"), None, &bytes)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidToken));

    let err = accept_upload(&state, "ghost", Some(PEER_TOKEN), None, &bytes)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::UnknownPeer));
}

#[tokio::test]
async fn test_untrusted_key_creates_exactly_one_pending_and_no_state() {
    // Peer exists but trusts a different key than the one signing.
    let (key, bytes, _scratch) = signed_bundle_bytes(&[
        user_record(1, "ada"),
        request_record(10, "Ride share", vec![(100, "hi")]),
    ]);
    let (state, _config_path, _temp) = common::setup_hub(false, &["SOME-OTHER-KEY"]).await;

    let pending_id = match accept_upload(&state, "alpha", Some(PEER_TOKEN), None, &bytes).await {
        Err(UploadError::KeyHeldForApproval { pending_id }) => pending_id,
        other => panic!("expected key mismatch, got {other:?}"),
    };
    assert!(!pending_id.is_empty());

    // exactly one pending entry, nothing stored, nothing ingested
    assert_eq!(state.pending().list(None).len(), 1);
    assert!(!state.store().bundle_exists("alpha"));
    assert_eq!(state.feed().list_feed_page(20, 0).await.unwrap().total, 0);

    let entry = state.pending().get(&pending_id).unwrap();
    assert_eq!(entry.peer_name, "alpha");
    assert_eq!(entry.presented_key, key.public_key_b64());
}

#[tokio::test]
async fn test_approve_replays_and_is_idempotent() {
    let (key, bytes, _scratch) = signed_bundle_bytes(&[
        user_record(1, "ada"),
        request_record(10, "Ride share", vec![(100, "one"), (101, "two")]),
    ]);
    let (state, _config_path, _temp) = common::setup_hub(false, &["SOME-OTHER-KEY"]).await;

    let err = accept_upload(&state, "alpha", Some(PEER_TOKEN), None, &bytes)
        .await
        .unwrap_err();
    let UploadError::KeyHeldForApproval { pending_id } = err else {
        panic!("expected key mismatch");
    };

    let report = approve_pending(&state, &pending_id).await.unwrap();
    assert!(report.key_appended);
    assert_eq!(report.peer, "alpha");

    // replay landed: stored + ingested, key appended (old key retained)
    assert!(state.store().bundle_exists("alpha"));
    let page = state.feed().list_feed_page(20, 0).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].request.comment_count, 2);
    {
        let config = state.config();
        let peer = config.get_peer("alpha").unwrap();
        assert_eq!(peer.public_keys.len(), 2);
        assert!(peer.is_trusted_key(&key.public_key_b64()));
        assert!(peer.is_trusted_key("SOME-OTHER-KEY"));
    }
    assert!(state.pending().get(&pending_id).is_none());

    // approving the consumed entry again: clean error, no duplicate keys
    let err = approve_pending(&state, &pending_id).await.unwrap_err();
    assert!(matches!(err, AdminError::PendingNotFound(_)));
    assert_eq!(state.config().get_peer("alpha").unwrap().public_keys.len(), 2);

    // the now-trusted key uploads directly
    let bytes2 = {
        let scratch = tempfile::TempDir::new().unwrap();
        signed_bundle_bytes_with_key(
            &[user_record(1, "ada"), request_record(10, "Ride share", vec![(100, "one")])],
            &key,
            scratch.path(),
        )
    };
    let accepted = accept_upload(&state, "alpha", Some(PEER_TOKEN), None, &bytes2)
        .await
        .unwrap();
    assert!(!accepted.auto_registered);
}

#[tokio::test]
async fn test_discard_removes_entry_only() {
    let (_key, bytes, _scratch) = signed_bundle_bytes(&[user_record(1, "ada")]);
    let (state, _config_path, _temp) = common::setup_hub(false, &["SOME-OTHER-KEY"]).await;

    let err = accept_upload(&state, "alpha", Some(PEER_TOKEN), None, &bytes)
        .await
        .unwrap_err();
    let UploadError::KeyHeldForApproval { pending_id } = err else {
        panic!("expected key mismatch");
    };

    discard_pending(&state, &pending_id).unwrap();
    assert!(state.pending().get(&pending_id).is_none());
    // no trust change, nothing stored
    assert_eq!(state.config().get_peer("alpha").unwrap().public_keys.len(), 1);
    assert!(!state.store().bundle_exists("alpha"));

    let err = discard_pending(&state, &pending_id).unwrap_err();
    assert!(matches!(err, AdminError::PendingNotFound(_)));
}

#[tokio::test]
async fn test_feed_reconciliation_drops_missing_requests_and_comments() {
    let scratch = tempfile::TempDir::new().unwrap();
    let key = ::common::crypto::Keystore::new(&scratch.path().join("keys"))
        .generate(false)
        .unwrap();
    let (state, _config_path, _temp) = common::setup_hub(false, &[&key.public_key_b64()]).await;

    // First bundle: two requests, one with two comments.
    let first = signed_bundle_bytes_with_key(
        &[
            user_record(1, "ada"),
            request_record(10, "Ride share", vec![(100, "one"), (101, "two")]),
            request_record(11, "Tool lending", vec![(110, "got a drill")]),
        ],
        &key,
        scratch.path(),
    );
    accept_upload(&state, "alpha", Some(PEER_TOKEN), None, &first)
        .await
        .unwrap();
    let page = state.feed().list_feed_page(20, 0).await.unwrap();
    assert_eq!(page.total, 2);

    // Second bundle omits request 11 and drops comment 101.
    let second = signed_bundle_bytes_with_key(
        &[
            user_record(1, "ada"),
            request_record(10, "Ride share", vec![(100, "one")]),
        ],
        &key,
        scratch.path(),
    );
    accept_upload(&state, "alpha", Some(PEER_TOKEN), None, &second)
        .await
        .unwrap();

    let page = state.feed().list_feed_page(20, 0).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].request.source_request_id, 10);
    assert_eq!(page.items[0].request.comment_count, 1);

    // no orphaned rows for the dropped request
    let gone = state
        .feed()
        .get_request_by_source(common::INSTANCE, 11)
        .await
        .unwrap();
    assert!(gone.is_none());
    let comments = state
        .feed()
        .list_comments_for_request(common::INSTANCE, 10)
        .await
        .unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].source_comment_id, 100);
}

#[tokio::test]
async fn test_traversal_archive_rejected() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let (state, _config_path, _temp) = common::setup_hub(false, &["KEY"]).await;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let payload = b"owned";
    let mut header = tar::Header::new_gnu();
    header.set_size(payload.len() as u64);
    // Write the escaping name straight into the header bytes: the tar builder's
    // `set_path`/`append_data` now rejects `..` up front, so we bypass it to
    // craft the malicious member this test needs.
    let name = b"../../etc/passwd";
    header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
    header.set_cksum();
    builder.append(&header, payload.as_slice()).unwrap();
    let bytes = builder.into_inner().unwrap().finish().unwrap();

    let err = accept_upload(&state, "alpha", Some(PEER_TOKEN), None, &bytes)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::Archive(::common::bundle::archive::ArchiveError::UnsafePath(_))
    ));
    assert!(!state.store().bundle_exists("alpha"));
}

#[tokio::test]
async fn test_auto_registration_pins_token_and_key() {
    let (key, bytes, _scratch) = signed_bundle_bytes(&[user_record(1, "ada")]);
    let (state, _config_path, _temp) = common::setup_hub(true, &["IRRELEVANT"]).await;

    // unknown peer + auto-register on, but no identity header
    let err = accept_upload(&state, "fresh", Some("fresh-token"), None, &bytes)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::AutoRegisterKeyRequired));

    // header key must match the signature
    let err = accept_upload(&state, "fresh", Some("fresh-token"), Some("QUJD"), &bytes)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::AutoRegisterKeyMismatch));

    let accepted = accept_upload(
        &state,
        "fresh",
        Some("fresh-token"),
        Some(&key.public_key_b64()),
        &bytes,
    )
    .await
    .unwrap();
    assert!(accepted.auto_registered);

    let config = state.config();
    let peer = config.get_peer("fresh").unwrap();
    assert_eq!(peer.public_keys, vec![key.public_key_b64()]);
    assert_eq!(
        peer.token_hash,
        warren_hub::config::hash_token("fresh-token")
    );
}
