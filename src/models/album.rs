//! Represents a password-protected album delivered to a client.

use crate::models::{client::Client, photo::Photo};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_PREVIEW_COUNT: i64 = 5;
pub const DEFAULT_PRICE: f64 = 299.99;

/// A photo album owned by a photographer and delivered to one client.
///
/// The album code is the client's login name and is always stored uppercase.
/// The password is kept only as an Argon2 PHC hash and never serialized.
#[derive(Serialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: Uuid,

    /// Globally unique, uppercase album code.
    pub code: String,

    pub title: String,

    pub description: Option<String>,

    #[serde(skip_serializing)]
    pub password_hash: String,

    /// How many photos (in upload order) a client may see before paying.
    pub preview_count: i64,

    pub price: f64,

    pub is_paid: bool,

    pub client_id: Uuid,

    pub photographer_id: Uuid,

    pub created_at: DateTime<Utc>,
}

/// Input for creating an album. `password` is plaintext and gets hashed
/// before it reaches the repository.
#[derive(Clone, Debug)]
pub struct NewAlbum {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub password: String,
    pub preview_count: i64,
    pub price: f64,
    pub client_id: Uuid,
    pub photographer_id: Uuid,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Clone, Debug, Default)]
pub struct AlbumUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub password_hash: Option<String>,
    pub preview_count: Option<i64>,
    pub price: Option<f64>,
    pub is_paid: Option<bool>,
}

impl AlbumUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.password_hash.is_none()
            && self.preview_count.is_none()
            && self.price.is_none()
            && self.is_paid.is_none()
    }
}

/// An album together with its client and photos in display order.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AlbumDetail {
    #[serde(flatten)]
    pub album: Album,
    pub client: Option<Client>,
    pub photos: Vec<Photo>,
    pub photo_count: usize,
}

/// Filter for album listings.
#[derive(Clone, Debug, Default)]
pub struct AlbumFilter {
    pub photographer_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
}

/// Normalize a user-supplied album code for storage and lookup.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_code_uppercases_and_trims() {
        assert_eq!(normalize_code(" demo2024 "), "DEMO2024");
        assert_eq!(normalize_code("Family2024"), "FAMILY2024");
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(AlbumUpdate::default().is_empty());
        let update = AlbumUpdate {
            is_paid: Some(true),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
