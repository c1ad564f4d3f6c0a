//! Represents a photographer's client, the recipient of albums.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Serialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    /// Unique per photographer, compared case-insensitively.
    pub email: String,
    pub phone: Option<String>,
    pub photographer_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewClient {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub photographer_id: Uuid,
}

/// Client listing entry with the number of albums delivered to them.
#[derive(Serialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub client: Client,
    pub album_count: i64,
}
