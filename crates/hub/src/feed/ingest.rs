//! Feed ingestion with full reconciliation.
//!
//! The feed is defined to mirror exactly what a peer currently publishes.
//! Comments a request no longer carries are deleted per-request; requests
//! the peer's bundle no longer contains are deleted per-peer once the
//! whole pass is over, comments first.

use std::collections::HashSet;
use std::path::Path;

use time::OffsetDateTime;

use common::bundle::archive::list_files;
use common::bundle::record::{parse_sync_file, SyncRecord};
use common::bundle::SYNC_FILE_SUFFIX;

use super::FeedDatabase;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("feed database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub requests: usize,
    pub comments: usize,
    pub purged_requests: usize,
}

/// Parse an accepted bundle into the canonical feed records for
/// `peer_name`, reconciling deletions. Parse failures in single files are
/// logged and skipped; they never abort the pass.
pub async fn ingest_bundle(
    db: &FeedDatabase,
    bundle_root: &Path,
    peer_name: &str,
    manifest_digest: &str,
    signed_at: OffsetDateTime,
) -> Result<IngestSummary, IngestError> {
    let now = OffsetDateTime::now_utc();
    let mut summary = IngestSummary::default();
    let mut seen_requests: HashSet<(String, i64)> = HashSet::new();
    let mut newest_updated_at: Option<OffsetDateTime> = None;

    upsert_manifest(db, peer_name, manifest_digest, signed_at, now).await?;

    for path in request_files(bundle_root)? {
        let record = match parse_sync_file(&path) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "failed to parse request file");
                continue;
            }
        };
        let SyncRecord::Request { header, body } = record else {
            continue;
        };
        if !header.sync_scope.is_public() {
            continue;
        }
        let Ok(source_request_id) = header.id.parse::<i64>() else {
            continue;
        };
        if header.instance.is_empty() {
            continue;
        }

        let updated_at = header.updated_at.unwrap_or(now);
        seen_requests.insert((header.instance.clone(), source_request_id));

        sqlx::query(
            "INSERT INTO feed_requests (peer_name, manifest_digest, source_instance,
                                        source_request_id, title, description, status,
                                        sync_scope, contact_email, created_by_id,
                                        created_by_username, updated_at, ingested_at,
                                        comment_count, last_comment_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, NULL)
             ON CONFLICT(source_instance, source_request_id) DO UPDATE SET
                 peer_name = excluded.peer_name,
                 manifest_digest = excluded.manifest_digest,
                 title = excluded.title,
                 description = excluded.description,
                 status = excluded.status,
                 sync_scope = excluded.sync_scope,
                 contact_email = excluded.contact_email,
                 created_by_id = excluded.created_by_id,
                 created_by_username = excluded.created_by_username,
                 updated_at = excluded.updated_at,
                 ingested_at = excluded.ingested_at",
        )
        .bind(peer_name)
        .bind(manifest_digest)
        .bind(&header.instance)
        .bind(source_request_id)
        .bind(&body.title)
        .bind(&body.description)
        .bind(&body.status)
        .bind(header.sync_scope.as_str())
        .bind(&body.contact_email)
        .bind(body.created_by)
        .bind(&body.created_by_username)
        .bind(updated_at)
        .bind(now)
        .execute(&**db)
        .await?;

        let request_row = db
            .get_request_by_source(&header.instance, source_request_id)
            .await?
            .expect("request row exists after upsert");

        // Comment reconciliation: set difference against what this pass saw.
        let public_comments: Vec<_> = body
            .comments
            .into_iter()
            .filter(|comment| comment.sync_scope.is_public())
            .collect();
        let mut seen_comment_ids: HashSet<i64> = HashSet::new();
        let mut last_comment_at: Option<OffsetDateTime> = None;

        for comment in &public_comments {
            seen_comment_ids.insert(comment.id);
            let created_at = comment.created_at.unwrap_or(updated_at);
            if last_comment_at.map(|ts| created_at > ts).unwrap_or(true) {
                last_comment_at = Some(created_at);
            }
            sqlx::query(
                "INSERT INTO feed_comments (request_id, peer_name, manifest_digest,
                                            source_instance, source_request_id,
                                            source_comment_id, username, body,
                                            sync_scope, created_at, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(source_instance, source_request_id, source_comment_id)
                 DO UPDATE SET
                     request_id = excluded.request_id,
                     peer_name = excluded.peer_name,
                     manifest_digest = excluded.manifest_digest,
                     username = excluded.username,
                     body = excluded.body,
                     sync_scope = excluded.sync_scope,
                     created_at = excluded.created_at,
                     ingested_at = excluded.ingested_at",
            )
            .bind(request_row.id)
            .bind(peer_name)
            .bind(manifest_digest)
            .bind(&header.instance)
            .bind(source_request_id)
            .bind(comment.id)
            .bind(&comment.username)
            .bind(&comment.body)
            .bind(comment.sync_scope.as_str())
            .bind(created_at)
            .bind(now)
            .execute(&**db)
            .await?;
            summary.comments += 1;
        }

        for existing in db
            .list_comments_for_request(&header.instance, source_request_id)
            .await?
        {
            if !seen_comment_ids.contains(&existing.source_comment_id) {
                sqlx::query("DELETE FROM feed_comments WHERE id = ?1")
                    .bind(existing.id)
                    .execute(&**db)
                    .await?;
            }
        }

        sqlx::query(
            "UPDATE feed_requests SET comment_count = ?1, last_comment_at = ?2 WHERE id = ?3",
        )
        .bind(public_comments.len() as i64)
        .bind(last_comment_at)
        .bind(request_row.id)
        .execute(&**db)
        .await?;

        if newest_updated_at.map(|ts| updated_at > ts).unwrap_or(true) {
            newest_updated_at = Some(updated_at);
        }
        summary.requests += 1;
    }

    summary.purged_requests = purge_missing_requests(db, peer_name, &seen_requests).await?;

    sqlx::query(
        "UPDATE feed_manifests SET bundle_updated_at = ?1 WHERE manifest_digest = ?2",
    )
    .bind(newest_updated_at.unwrap_or(now))
    .bind(manifest_digest)
    .execute(&**db)
    .await?;

    tracing::info!(
        peer = peer_name,
        requests = summary.requests,
        comments = summary.comments,
        purged = summary.purged_requests,
        "feed ingest complete"
    );
    Ok(summary)
}

fn request_files(bundle_root: &Path) -> std::io::Result<Vec<std::path::PathBuf>> {
    let dir = bundle_root.join("requests");
    let mut files: Vec<_> = list_files(&dir)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(SYNC_FILE_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

async fn upsert_manifest(
    db: &FeedDatabase,
    peer_name: &str,
    manifest_digest: &str,
    signed_at: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO feed_manifests (peer_name, manifest_digest, signed_at, ingested_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(manifest_digest) DO UPDATE SET
             peer_name = excluded.peer_name,
             signed_at = excluded.signed_at,
             ingested_at = excluded.ingested_at",
    )
    .bind(peer_name)
    .bind(manifest_digest)
    .bind(signed_at)
    .bind(now)
    .execute(&**db)
    .await?;
    Ok(())
}

/// Delete every request (and its comments) previously ingested for this
/// peer whose key was not seen in this pass.
async fn purge_missing_requests(
    db: &FeedDatabase,
    peer_name: &str,
    seen: &HashSet<(String, i64)>,
) -> Result<usize, sqlx::Error> {
    let mut purged = 0;
    for row in db.list_requests_for_peer(peer_name).await? {
        let key = (row.source_instance.clone(), row.source_request_id);
        if seen.contains(&key) {
            continue;
        }
        sqlx::query("DELETE FROM feed_comments WHERE source_instance = ?1 AND source_request_id = ?2")
            .bind(&row.source_instance)
            .bind(row.source_request_id)
            .execute(&**db)
            .await?;
        sqlx::query("DELETE FROM feed_requests WHERE id = ?1")
            .bind(row.id)
            .execute(&**db)
            .await?;
        purged += 1;
    }
    Ok(purged)
}
