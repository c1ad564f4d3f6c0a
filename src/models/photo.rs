//! Represents a photo stored in an album.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A single delivered photo.
///
/// The row stores metadata and a locator; the bytes live either on local
/// disk (locator `/uploads/...`) or on the image CDN (locator is a URL).
#[derive(Serialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: Uuid,

    pub album_id: Uuid,

    /// Original filename as uploaded.
    pub filename: String,

    /// Public path or URL of the full-resolution file.
    pub locator: String,

    pub thumbnail_locator: Option<String>,

    /// Public id on the CDN, if stored there.
    pub cdn_id: Option<String>,

    pub width: Option<i64>,

    pub height: Option<i64>,

    pub size_bytes: i64,

    /// Lowercase file format (e.g. "jpg", "nef").
    pub format: String,

    /// MD5 hex digest of the stored bytes (local storage only).
    pub checksum: Option<String>,

    pub is_preview: bool,

    /// 1-based display position, unique within the album.
    pub sort_order: i64,

    pub uploaded_at: DateTime<Utc>,
}

/// A photo row ready to insert. `sort_order` and `is_preview` are decided
/// by the upload pipeline.
#[derive(Clone, Debug)]
pub struct NewPhoto {
    pub album_id: Uuid,
    pub filename: String,
    pub locator: String,
    pub thumbnail_locator: Option<String>,
    pub cdn_id: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub size_bytes: i64,
    pub format: String,
    pub checksum: Option<String>,
    pub is_preview: bool,
    pub sort_order: i64,
}

/// A photo is a preview iff its zero-based position in the album is below
/// the album's preview count.
pub fn is_preview_slot(sort_order: i64, preview_count: i64) -> bool {
    sort_order - 1 < preview_count
}

/// Lowercase extension of a filename, if any.
pub fn file_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
