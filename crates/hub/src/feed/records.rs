//! Canonical feed projections and their queries.

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

use super::FeedDatabase;

/// A request as seen by the aggregated feed, keyed by
/// (source_instance, source_request_id).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FeedRequestRow {
    pub id: i64,
    pub peer_name: String,
    pub manifest_digest: String,
    pub source_instance: String,
    pub source_request_id: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub sync_scope: String,
    pub contact_email: Option<String>,
    pub created_by_id: Option<i64>,
    pub created_by_username: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub comment_count: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_comment_at: Option<OffsetDateTime>,
}

/// A comment as seen by the aggregated feed, keyed by
/// (source_instance, source_request_id, source_comment_id).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FeedCommentRow {
    pub id: i64,
    pub request_id: Option<i64>,
    pub source_instance: String,
    pub source_request_id: i64,
    pub source_comment_id: i64,
    pub username: Option<String>,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub items: Vec<FeedRequestEntry>,
    pub total: i64,
    pub next_offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedRequestEntry {
    #[serde(flatten)]
    pub request: FeedRequestRow,
    pub comments: Vec<FeedCommentRow>,
}

const COMMENTS_PREVIEW_LIMIT: usize = 3;

impl FeedDatabase {
    pub async fn get_request_by_source(
        &self,
        source_instance: &str,
        source_request_id: i64,
    ) -> Result<Option<FeedRequestRow>, sqlx::Error> {
        sqlx::query_as::<_, FeedRequestRow>(
            "SELECT id, peer_name, manifest_digest, source_instance, source_request_id,
                    title, description, status, sync_scope, contact_email,
                    created_by_id, created_by_username, updated_at, comment_count, last_comment_at
             FROM feed_requests
             WHERE source_instance = ?1 AND source_request_id = ?2",
        )
        .bind(source_instance)
        .bind(source_request_id)
        .fetch_optional(&**self)
        .await
    }

    pub async fn list_requests_for_peer(
        &self,
        peer_name: &str,
    ) -> Result<Vec<FeedRequestRow>, sqlx::Error> {
        sqlx::query_as::<_, FeedRequestRow>(
            "SELECT id, peer_name, manifest_digest, source_instance, source_request_id,
                    title, description, status, sync_scope, contact_email,
                    created_by_id, created_by_username, updated_at, comment_count, last_comment_at
             FROM feed_requests
             WHERE peer_name = ?1",
        )
        .bind(peer_name)
        .fetch_all(&**self)
        .await
    }

    pub async fn list_comments_for_request(
        &self,
        source_instance: &str,
        source_request_id: i64,
    ) -> Result<Vec<FeedCommentRow>, sqlx::Error> {
        sqlx::query_as::<_, FeedCommentRow>(
            "SELECT id, request_id, source_instance, source_request_id, source_comment_id,
                    username, body, created_at
             FROM feed_comments
             WHERE source_instance = ?1 AND source_request_id = ?2
             ORDER BY created_at, id",
        )
        .bind(source_instance)
        .bind(source_request_id)
        .fetch_all(&**self)
        .await
    }

    /// Page of feed requests, newest activity first, each with a short
    /// comment preview.
    pub async fn list_feed_page(&self, limit: i64, offset: i64) -> Result<FeedPage, sqlx::Error> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feed_requests")
            .fetch_one(&**self)
            .await?;
        let rows = sqlx::query_as::<_, FeedRequestRow>(
            "SELECT id, peer_name, manifest_digest, source_instance, source_request_id,
                    title, description, status, sync_scope, contact_email,
                    created_by_id, created_by_username, updated_at, comment_count, last_comment_at
             FROM feed_requests
             ORDER BY updated_at DESC, id DESC
             LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&**self)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for request in rows {
            let mut comments = self
                .list_comments_for_request(&request.source_instance, request.source_request_id)
                .await?;
            comments.truncate(COMMENTS_PREVIEW_LIMIT);
            items.push(FeedRequestEntry { request, comments });
        }

        let next_offset = if offset + limit < total {
            Some(offset + limit)
        } else {
            None
        };
        Ok(FeedPage {
            items,
            total,
            next_offset,
        })
    }
}
