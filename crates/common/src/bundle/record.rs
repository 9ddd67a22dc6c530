//! Typed sync-file records.
//!
//! Each bundle file is a plain-text header block (`Key: value` lines), a
//! blank line, and a JSON body. The `Entity` header selects the variant;
//! everything entity-specific lives in the body. Comments are not a
//! top-level entity on the wire: they ride inside their parent request's
//! body so a request transfers as one coherent unit.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::SCHEMA_VERSION;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("sync file missing required header '{0}'")]
    MissingHeader(&'static str),
    #[error("unknown entity kind: {0}")]
    UnknownEntity(String),
    #[error("sync file body is not valid JSON: {0}")]
    Body(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Visibility scope carried by every syncable entity.
///
/// Only `public` rows ever leave the instance; everything else stays local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncScope {
    #[default]
    Public,
    Private,
}

impl SyncScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncScope::Public => "public",
            SyncScope::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "private" => SyncScope::Private,
            _ => SyncScope::Public,
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, SyncScope::Public)
    }
}

impl std::fmt::Display for SyncScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The header block common to every sync file.
#[derive(Debug, Clone)]
pub struct SyncHeader {
    /// Entity primary key on the originating instance (request id, user
    /// id, or invite token).
    pub id: String,
    /// Identifier of the instance that produced this record.
    pub instance: String,
    pub schema_version: String,
    pub updated_at: Option<OffsetDateTime>,
    pub sync_scope: SyncScope,
}

impl SyncHeader {
    pub fn new(
        id: impl Into<String>,
        instance: impl Into<String>,
        updated_at: Option<OffsetDateTime>,
        sync_scope: SyncScope,
    ) -> Self {
        Self {
            id: id.into(),
            instance: instance.into(),
            schema_version: SCHEMA_VERSION.to_string(),
            updated_at,
            sync_scope,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBody {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentBody {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    pub body: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub sync_scope: SyncScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBody {
    pub title: String,
    pub description: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub created_by: Option<i64>,
    #[serde(default)]
    pub created_by_username: Option<String>,
    #[serde(default)]
    pub comments: Vec<CommentBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteBody {
    pub max_uses: i64,
    pub use_count: i64,
    pub auto_approve: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_username: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

/// A fully parsed sync file: header plus typed body.
#[derive(Debug, Clone)]
pub enum SyncRecord {
    User { header: SyncHeader, body: UserBody },
    Request { header: SyncHeader, body: RequestBody },
    Invite { header: SyncHeader, body: InviteBody },
}

impl SyncRecord {
    pub fn header(&self) -> &SyncHeader {
        match self {
            SyncRecord::User { header, .. } => header,
            SyncRecord::Request { header, .. } => header,
            SyncRecord::Invite { header, .. } => header,
        }
    }

    fn entity_name(&self) -> &'static str {
        match self {
            SyncRecord::User { .. } => "user",
            SyncRecord::Request { .. } => "request",
            SyncRecord::Invite { .. } => "invite",
        }
    }

    fn body_json(&self) -> Result<String, serde_json::Error> {
        match self {
            SyncRecord::User { body, .. } => serde_json::to_string_pretty(body),
            SyncRecord::Request { body, .. } => serde_json::to_string_pretty(body),
            SyncRecord::Invite { body, .. } => serde_json::to_string_pretty(body),
        }
    }
}

/// Serialize a record into its on-disk sync-file form.
pub fn render_sync_file(record: &SyncRecord) -> Result<String, RecordError> {
    let header = record.header();
    let updated_at = header
        .updated_at
        .and_then(|ts| ts.format(&Rfc3339).ok())
        .unwrap_or_default();

    let mut out = String::new();
    out.push_str(&format!("Entity: {}\n", record.entity_name()));
    out.push_str(&format!("ID: {}\n", header.id));
    out.push_str(&format!("Instance: {}\n", header.instance));
    out.push_str(&format!("Schema-Version: {}\n", header.schema_version));
    out.push_str(&format!("Updated-At: {}\n", updated_at));
    out.push_str(&format!("Sync-Scope: {}\n", header.sync_scope));
    out.push('\n');
    out.push_str(&record.body_json()?);
    out.push('\n');
    Ok(out)
}

/// Write a record to `path`, creating parent directories as needed.
pub fn write_sync_file(path: &Path, record: &SyncRecord) -> Result<(), RecordError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_sync_file(record)?)?;
    Ok(())
}

/// Parse a sync file back into a typed record.
pub fn parse_sync_file(path: &Path) -> Result<SyncRecord, RecordError> {
    let text = fs::read_to_string(path)?;
    parse_sync_text(&text)
}

pub fn parse_sync_text(text: &str) -> Result<SyncRecord, RecordError> {
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut body_start = text.len();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n');
        offset += line.len();
        if trimmed.trim().is_empty() {
            body_start = offset;
            break;
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    let body = &text[body_start.min(text.len())..];

    let get = |name: &'static str| -> Result<&str, RecordError> {
        headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .ok_or(RecordError::MissingHeader(name))
    };

    let entity = get("Entity")?.to_string();
    let header = SyncHeader {
        id: get("ID")?.to_string(),
        instance: get("Instance")?.to_string(),
        schema_version: get("Schema-Version").unwrap_or(SCHEMA_VERSION).to_string(),
        updated_at: get("Updated-At")
            .ok()
            .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok()),
        sync_scope: get("Sync-Scope")
            .map(SyncScope::parse)
            .unwrap_or_default(),
    };

    match entity.as_str() {
        "user" => Ok(SyncRecord::User {
            header,
            body: serde_json::from_str(body)?,
        }),
        "request" => Ok(SyncRecord::Request {
            header,
            body: serde_json::from_str(body)?,
        }),
        "invite" => Ok(SyncRecord::Invite {
            header,
            body: serde_json::from_str(body)?,
        }),
        other => Err(RecordError::UnknownEntity(other.to_string())),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_request() -> SyncRecord {
        SyncRecord::Request {
            header: SyncHeader::new(
                "7",
                "https://a.example.org",
                Some(OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()),
                SyncScope::Public,
            ),
            body: RequestBody {
                title: "Need a ride to the market".into(),
                description: "Saturday morning, two crates of produce".into(),
                status: "open".into(),
                contact_email: None,
                created_by: Some(3),
                created_by_username: Some("ada".into()),
                comments: vec![CommentBody {
                    id: 11,
                    user_id: Some(4),
                    username: Some("brin".into()),
                    body: "I can take you".into(),
                    created_at: None,
                    sync_scope: SyncScope::Public,
                }],
            },
        }
    }

    #[test]
    fn test_request_round_trip() {
        let rendered = render_sync_file(&sample_request()).unwrap();
        let parsed = parse_sync_text(&rendered).unwrap();
        match parsed {
            SyncRecord::Request { header, body } => {
                assert_eq!(header.id, "7");
                assert_eq!(header.instance, "https://a.example.org");
                assert_eq!(header.sync_scope, SyncScope::Public);
                assert_eq!(body.title, "Need a ride to the market");
                assert_eq!(body.comments.len(), 1);
                assert_eq!(body.comments[0].username.as_deref(), Some("brin"));
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let text = "Entity: gadget\nID: 1\nInstance: x\nSchema-Version: 1\nUpdated-At: \nSync-Scope: public\n\n{}\n";
        assert!(matches!(
            parse_sync_text(text),
            Err(RecordError::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_missing_entity_header() {
        let text = "ID: 1\nInstance: x\n\n{}\n";
        assert!(matches!(
            parse_sync_text(text),
            Err(RecordError::MissingHeader("Entity"))
        ));
    }

    #[test]
    fn test_scope_parse_defaults_to_public() {
        assert_eq!(SyncScope::parse("private"), SyncScope::Private);
        assert_eq!(SyncScope::parse("public"), SyncScope::Public);
        assert_eq!(SyncScope::parse("weird"), SyncScope::Public);
    }

    #[test]
    fn test_body_with_multiline_text() {
        let record = SyncRecord::Request {
            header: SyncHeader::new("9", "inst", None, SyncScope::Public),
            body: RequestBody {
                title: "t".into(),
                description: "line one\n\nline two: with colon".into(),
                status: "open".into(),
                contact_email: None,
                created_by: None,
                created_by_username: None,
                comments: vec![],
            },
        };
        let rendered = render_sync_file(&record).unwrap();
        let parsed = parse_sync_text(&rendered).unwrap();
        match parsed {
            SyncRecord::Request { body, .. } => {
                assert_eq!(body.description, "line one\n\nline two: with colon");
            }
            _ => unreachable!(),
        }
    }
}
