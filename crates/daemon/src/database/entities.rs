use sqlx::FromRow;
use time::OffsetDateTime;

use super::Database;

/// A community member account.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub contact_email: Option<String>,
    pub created_at: OffsetDateTime,
    pub sync_scope: String,
}

/// A help request posted on the board.
#[derive(Debug, Clone, FromRow)]
pub struct RequestRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub contact_email: Option<String>,
    pub created_by_user_id: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub sync_scope: String,
}

/// A comment on a request. `username` is joined in for export.
#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub request_id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub body: String,
    pub created_at: OffsetDateTime,
    pub sync_scope: String,
}

/// An invite token.
#[derive(Debug, Clone, FromRow)]
pub struct InviteRow {
    pub token: String,
    pub created_by_user_id: Option<i64>,
    pub created_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
    pub max_uses: i64,
    pub use_count: i64,
    pub auto_approve: bool,
    pub suggested_username: Option<String>,
    pub sync_scope: String,
}

impl Database {
    pub async fn list_public_users(&self) -> Result<Vec<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, contact_email, created_at, sync_scope
             FROM users WHERE sync_scope = 'public' ORDER BY id",
        )
        .fetch_all(&**self)
        .await
    }

    pub async fn list_public_requests(&self) -> Result<Vec<RequestRow>, sqlx::Error> {
        sqlx::query_as::<_, RequestRow>(
            "SELECT id, title, description, status, contact_email,
                    created_by_user_id, created_at, updated_at, sync_scope
             FROM requests WHERE sync_scope = 'public' ORDER BY id",
        )
        .fetch_all(&**self)
        .await
    }

    /// Public comments for one request, oldest first, with the author's
    /// username joined in when the author row exists.
    pub async fn list_public_comments(
        &self,
        request_id: i64,
    ) -> Result<Vec<CommentRow>, sqlx::Error> {
        sqlx::query_as::<_, CommentRow>(
            "SELECT c.id, c.request_id, c.user_id, u.username AS username,
                    c.body, c.created_at, c.sync_scope
             FROM comments c
             LEFT JOIN users u ON u.id = c.user_id
             WHERE c.request_id = ?1 AND c.sync_scope = 'public'
             ORDER BY c.created_at, c.id",
        )
        .bind(request_id)
        .fetch_all(&**self)
        .await
    }

    pub async fn list_public_invites(&self) -> Result<Vec<InviteRow>, sqlx::Error> {
        sqlx::query_as::<_, InviteRow>(
            "SELECT token, created_by_user_id, created_at, expires_at,
                    max_uses, use_count, auto_approve, suggested_username, sync_scope
             FROM invites WHERE sync_scope = 'public' ORDER BY token",
        )
        .fetch_all(&**self)
        .await
    }

    pub async fn get_request(&self, id: i64) -> Result<Option<RequestRow>, sqlx::Error> {
        sqlx::query_as::<_, RequestRow>(
            "SELECT id, title, description, status, contact_email,
                    created_by_user_id, created_at, updated_at, sync_scope
             FROM requests WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&**self)
        .await
    }

    pub async fn count_requests(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM requests")
            .fetch_one(&**self)
            .await?;
        Ok(count)
    }

    /// Insert-or-overwrite a user by primary key.
    pub async fn upsert_user(
        &self,
        id: i64,
        username: &str,
        contact_email: Option<&str>,
        created_at: OffsetDateTime,
        sync_scope: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id, username, contact_email, created_at, sync_scope)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 username = excluded.username,
                 contact_email = excluded.contact_email,
                 created_at = excluded.created_at,
                 sync_scope = excluded.sync_scope",
        )
        .bind(id)
        .bind(username)
        .bind(contact_email)
        .bind(created_at)
        .bind(sync_scope)
        .execute(&**self)
        .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_request(
        &self,
        id: i64,
        title: &str,
        description: &str,
        status: &str,
        contact_email: Option<&str>,
        created_by_user_id: Option<i64>,
        created_at: OffsetDateTime,
        updated_at: OffsetDateTime,
        sync_scope: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO requests (id, title, description, status, contact_email,
                                   created_by_user_id, created_at, updated_at, sync_scope)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 description = excluded.description,
                 status = excluded.status,
                 contact_email = excluded.contact_email,
                 created_by_user_id = excluded.created_by_user_id,
                 created_at = excluded.created_at,
                 updated_at = excluded.updated_at,
                 sync_scope = excluded.sync_scope",
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(status)
        .bind(contact_email)
        .bind(created_by_user_id)
        .bind(created_at)
        .bind(updated_at)
        .bind(sync_scope)
        .execute(&**self)
        .await?;
        Ok(())
    }

    pub async fn upsert_comment(
        &self,
        id: i64,
        request_id: i64,
        user_id: Option<i64>,
        body: &str,
        created_at: OffsetDateTime,
        sync_scope: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO comments (id, request_id, user_id, body, created_at, sync_scope)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 request_id = excluded.request_id,
                 user_id = excluded.user_id,
                 body = excluded.body,
                 created_at = excluded.created_at,
                 sync_scope = excluded.sync_scope",
        )
        .bind(id)
        .bind(request_id)
        .bind(user_id)
        .bind(body)
        .bind(created_at)
        .bind(sync_scope)
        .execute(&**self)
        .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_invite(
        &self,
        token: &str,
        created_by_user_id: Option<i64>,
        created_at: OffsetDateTime,
        expires_at: Option<OffsetDateTime>,
        max_uses: i64,
        use_count: i64,
        auto_approve: bool,
        suggested_username: Option<&str>,
        sync_scope: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO invites (token, created_by_user_id, created_at, expires_at,
                                  max_uses, use_count, auto_approve, suggested_username, sync_scope)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(token) DO UPDATE SET
                 created_by_user_id = excluded.created_by_user_id,
                 created_at = excluded.created_at,
                 expires_at = excluded.expires_at,
                 max_uses = excluded.max_uses,
                 use_count = excluded.use_count,
                 auto_approve = excluded.auto_approve,
                 suggested_username = excluded.suggested_username,
                 sync_scope = excluded.sync_scope",
        )
        .bind(token)
        .bind(created_by_user_id)
        .bind(created_at)
        .bind(expires_at)
        .bind(max_uses)
        .bind(use_count)
        .bind(auto_approve)
        .bind(suggested_username)
        .bind(sync_scope)
        .execute(&**self)
        .await?;
        Ok(())
    }
}
