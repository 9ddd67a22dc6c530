//! Merge a verified bundle directory into local storage.
//!
//! Everything is an upsert by primary key. Import never deletes rows that
//! are simply absent from the bundle: a partial or sampled bundle must not
//! be able to wipe local data. Deletion-by-absence is the hub feed's
//! policy, opted into by its own ingest engine.

use std::path::Path;

use time::OffsetDateTime;

use common::bundle::archive::list_files;
use common::bundle::manifest::MANIFEST_FILENAME;
use common::bundle::record::{parse_sync_file, SyncRecord};
use common::bundle::SYNC_FILE_SUFFIX;

use crate::database::Database;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("sync directory not found: {0}")]
    MissingDir(std::path::PathBuf),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Import every sync file under `input_dir`, returning the number of files
/// processed. A malformed file is logged and skipped so one bad record
/// cannot abort the rest of the bundle.
pub async fn import_bundle(db: &Database, input_dir: &Path) -> Result<usize, ImportError> {
    if !input_dir.exists() {
        return Err(ImportError::MissingDir(input_dir.to_path_buf()));
    }

    let mut count = 0;
    for path in list_files(input_dir)? {
        let name = path.file_name().and_then(|name| name.to_str()).unwrap_or("");
        if !name.ends_with(SYNC_FILE_SUFFIX) || name == MANIFEST_FILENAME {
            continue;
        }
        let record = match parse_sync_file(&path) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "skipping malformed sync file");
                continue;
            }
        };
        match import_record(db, record).await {
            Ok(()) => count += 1,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "failed to import sync file");
            }
        }
    }
    Ok(count)
}

async fn import_record(db: &Database, record: SyncRecord) -> Result<(), sqlx::Error> {
    let now = OffsetDateTime::now_utc();
    match record {
        SyncRecord::User { header, body } => {
            let Ok(id) = header.id.parse::<i64>() else {
                return Ok(());
            };
            db.upsert_user(
                id,
                &body.username,
                body.contact_email.as_deref(),
                header.updated_at.unwrap_or(now),
                header.sync_scope.as_str(),
            )
            .await
        }
        SyncRecord::Request { header, body } => {
            let Ok(id) = header.id.parse::<i64>() else {
                return Ok(());
            };
            let updated_at = header.updated_at.unwrap_or(now);
            db.upsert_request(
                id,
                &body.title,
                &body.description,
                &body.status,
                body.contact_email.as_deref(),
                body.created_by,
                updated_at,
                updated_at,
                header.sync_scope.as_str(),
            )
            .await?;

            // Nested comments land in the same pass as their parent.
            for comment in body.comments {
                db.upsert_comment(
                    comment.id,
                    id,
                    comment.user_id,
                    &comment.body,
                    comment.created_at.unwrap_or(updated_at),
                    comment.sync_scope.as_str(),
                )
                .await?;
            }
            Ok(())
        }
        SyncRecord::Invite { header, body } => {
            db.upsert_invite(
                &header.id,
                None,
                header.updated_at.unwrap_or(now),
                body.expires_at,
                body.max_uses,
                body.use_count,
                body.auto_approve,
                body.suggested_username.as_deref(),
                header.sync_scope.as_str(),
            )
            .await
        }
    }
}
