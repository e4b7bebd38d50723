//! Entity model shared by every storage adapter.
//!
//! `Post` carries three derived fields (`author_name`, `created_at_txt`,
//! `published_at_txt`). They are recomputed on every read and never persisted
//! as the source of truth; adapters that store raw documents use
//! [`PostRecord`] instead.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Text layout of the `*_txt` fields: `YYYY-MM-DD HH:MM:SS.mmm`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Earliest timestamp that formats: 0001-01-02T00:00:00Z.
///
/// The bounds keep a four-digit year under any UTC offset. Values outside
/// them format as "" on every adapter.
pub const MIN_TIMESTAMP_MILLIS: i64 = -62_135_510_400_000;

/// Latest timestamp that formats: 9999-12-30T23:59:59.999Z.
pub const MAX_TIMESTAMP_MILLIS: i64 = 253_402_214_399_999;

/// Value of `author_name` when the post references an author that no longer exists.
pub const DANGLING_AUTHOR_NAME: &str = "";

// ============================================================================
// Author
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Author {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

impl Author {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

// ============================================================================
// Post
// ============================================================================

/// A publication.
///
/// Derived fields are accepted on input and ignored; every adapter fills them
/// in freshly when listing posts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct Post {
    pub id: i64,
    /// Ignored by delete
    #[serde(default)]
    pub author_id: i64,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub created_at_txt: String,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub published_at: i64,
    #[serde(default)]
    pub published_at_txt: String,
}

impl Post {
    pub fn new(id: i64, author_id: i64) -> Self {
        Self {
            id,
            author_id,
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn created_at(mut self, millis: i64) -> Self {
        self.created_at = millis;
        self
    }

    pub fn published_at(mut self, millis: i64) -> Self {
        self.published_at = millis;
        self
    }

    /// Recompute every derived field.
    ///
    /// `author_name` is the name of the referenced author, or `None` when the
    /// reference is dangling.
    pub fn enrich(&mut self, author_name: Option<&str>) {
        self.author_name = author_name.unwrap_or(DANGLING_AUTHOR_NAME).to_string();
        self.created_at_txt = format_millis(self.created_at);
        self.published_at_txt = format_millis(self.published_at);
    }

    /// Stored shape of this post, without derived fields.
    pub fn record(&self) -> PostRecord {
        PostRecord {
            id: self.id,
            author_id: self.author_id,
            title: self.title.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
            published_at: self.published_at,
        }
    }
}

/// Persisted form of a [`Post`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    pub author_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub published_at: i64,
}

impl From<PostRecord> for Post {
    fn from(record: PostRecord) -> Self {
        Self {
            id: record.id,
            author_id: record.author_id,
            title: record.title,
            content: record.content,
            created_at: record.created_at,
            published_at: record.published_at,
            ..Default::default()
        }
    }
}

// ============================================================================
// Timestamp formatting
// ============================================================================

/// Format epoch milliseconds in the local time zone.
pub fn format_millis(millis: i64) -> String {
    format_millis_in(millis, &Local)
}

/// IANA name of the zone [`format_millis`] formats in.
///
/// `TZ` wins when set, as it does for [`Local`]; otherwise the system zone,
/// falling back to UTC like [`Local`] does.
pub fn local_zone_name() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        if let Some(name) = zone_name_from_tz(&tz) {
            return name;
        }
    }
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// `:Asia/Tokyo`, `Asia/Tokyo` and `/usr/share/zoneinfo/Asia/Tokyo` all name the same zone
fn zone_name_from_tz(tz: &str) -> Option<String> {
    let tz = tz.trim().trim_start_matches(':');
    let name = match tz.rfind("zoneinfo/") {
        Some(at) => &tz[at + "zoneinfo/".len()..],
        None => tz,
    };
    (!name.is_empty()).then(|| name.to_string())
}

/// Format epoch milliseconds in `tz`. Values outside
/// [`MIN_TIMESTAMP_MILLIS`]..=[`MAX_TIMESTAMP_MILLIS`] format as "".
pub fn format_millis_in<Tz>(millis: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    if !(MIN_TIMESTAMP_MILLIS..=MAX_TIMESTAMP_MILLIS).contains(&millis) {
        return String::new();
    }
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(utc) => utc.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string(),
        None => String::new(),
    }
}
