//! Shared test utilities for instance sync tests
#![allow(dead_code)]

use tempfile::TempDir;
use time::OffsetDateTime;

use warren_daemon::database::Database;
use warren_daemon::state::{AppConfig, AppState};

/// Set up an instance home + database under a fresh tempdir.
pub async fn setup_instance(instance_id: &str) -> (AppState, Database, TempDir) {
    let temp = TempDir::new().unwrap();
    let home = temp.path().join("warren-home");
    let state = AppState::init(
        Some(home),
        AppConfig {
            instance_id: instance_id.to_string(),
            ..AppConfig::default()
        },
    )
    .unwrap();
    let db = Database::connect(&state.db_path).await.unwrap();
    (state, db, temp)
}

fn ts(offset: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000 + offset).unwrap()
}

/// Seed one public user, one public request with two public comments (and
/// one private comment), one private request, and one public invite.
pub async fn seed_board(db: &Database) {
    db.upsert_user(1, "ada", Some("ada@example.org"), ts(0), "public")
        .await
        .unwrap();
    db.upsert_user(2, "brin", None, ts(1), "private")
        .await
        .unwrap();

    db.upsert_request(
        10,
        "Need a ride to the market",
        "Saturday morning, two crates",
        "open",
        None,
        Some(1),
        ts(2),
        ts(3),
        "public",
    )
    .await
    .unwrap();
    db.upsert_request(
        11,
        "Private errand",
        "not for the network",
        "open",
        None,
        Some(2),
        ts(4),
        ts(5),
        "private",
    )
    .await
    .unwrap();

    db.upsert_comment(100, 10, Some(1), "I can help", ts(6), "public")
        .await
        .unwrap();
    db.upsert_comment(101, 10, Some(2), "Me too", ts(7), "public")
        .await
        .unwrap();
    db.upsert_comment(102, 10, Some(2), "secret note", ts(8), "private")
        .await
        .unwrap();

    db.upsert_invite(
        "tok-abc",
        Some(1),
        ts(9),
        None,
        5,
        1,
        true,
        Some("newcomer"),
        "public",
    )
    .await
    .unwrap();
}
