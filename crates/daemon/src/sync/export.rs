//! Serialize the instance's public entities into a bundle directory.

use std::fs;
use std::path::{Path, PathBuf};

use common::bundle::archive::list_files;
use common::bundle::manifest::write_manifest;
use common::bundle::record::{
    write_sync_file, CommentBody, InviteBody, RecordError, RequestBody, SyncHeader, SyncRecord,
    SyncScope, UserBody,
};
use common::bundle::SYNC_FILE_SUFFIX;

use crate::database::Database;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Manifest(#[from] common::bundle::manifest::ManifestError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Remove every previously exported sync file under `dir`.
///
/// A stale file from an earlier export would otherwise be picked up by the
/// new manifest and leak data that has since been deleted or made private.
fn clear_previous_export(dir: &Path) -> std::io::Result<()> {
    for file in list_files(dir)? {
        let name = file.file_name().and_then(|name| name.to_str()).unwrap_or("");
        if name.ends_with(SYNC_FILE_SUFFIX) {
            fs::remove_file(&file)?;
        }
    }
    Ok(())
}

/// Export all public-scope entities into `output_dir` and write the
/// manifest last. Returns the exported file paths (manifest included).
pub async fn export_bundle(
    db: &Database,
    instance_id: &str,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, ExportError> {
    clear_previous_export(output_dir)?;
    fs::create_dir_all(output_dir)?;

    let mut exported: Vec<PathBuf> = Vec::new();

    for user in db.list_public_users().await? {
        let record = SyncRecord::User {
            header: SyncHeader::new(
                user.id.to_string(),
                instance_id,
                Some(user.created_at),
                SyncScope::parse(&user.sync_scope),
            ),
            body: UserBody {
                username: user.username,
                contact_email: user.contact_email,
            },
        };
        let path = output_dir
            .join("users")
            .join(format!("user_{}{SYNC_FILE_SUFFIX}", user.id));
        write_sync_file(&path, &record)?;
        exported.push(path);
    }

    for request in db.list_public_requests().await? {
        let comments = db
            .list_public_comments(request.id)
            .await?
            .into_iter()
            .map(|comment| CommentBody {
                id: comment.id,
                user_id: comment.user_id,
                username: comment.username,
                body: comment.body,
                created_at: Some(comment.created_at),
                sync_scope: SyncScope::parse(&comment.sync_scope),
            })
            .collect();
        let record = SyncRecord::Request {
            header: SyncHeader::new(
                request.id.to_string(),
                instance_id,
                Some(request.updated_at),
                SyncScope::parse(&request.sync_scope),
            ),
            body: RequestBody {
                title: request.title,
                description: request.description,
                status: request.status,
                contact_email: request.contact_email,
                created_by: request.created_by_user_id,
                created_by_username: None,
                comments,
            },
        };
        let path = output_dir
            .join("requests")
            .join(format!("request_{}{SYNC_FILE_SUFFIX}", request.id));
        write_sync_file(&path, &record)?;
        exported.push(path);
    }

    for invite in db.list_public_invites().await? {
        let record = SyncRecord::Invite {
            header: SyncHeader::new(
                invite.token.clone(),
                instance_id,
                Some(invite.created_at),
                SyncScope::parse(&invite.sync_scope),
            ),
            body: InviteBody {
                max_uses: invite.max_uses,
                use_count: invite.use_count,
                auto_approve: invite.auto_approve,
                suggested_username: invite.suggested_username,
                expires_at: invite.expires_at,
            },
        };
        let path = output_dir
            .join("invites")
            .join(format!("invite_{}{SYNC_FILE_SUFFIX}", invite.token));
        write_sync_file(&path, &record)?;
        exported.push(path);
    }

    let manifest_path = write_manifest(output_dir, &exported)?;
    exported.push(manifest_path);

    tracing::info!(
        files = exported.len(),
        dir = %output_dir.display(),
        "exported public sync data"
    );
    Ok(exported)
}
