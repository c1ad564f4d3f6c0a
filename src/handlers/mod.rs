//! HTTP handlers. Each one parses its request, calls a service on
//! [`AppState`](crate::state::AppState) and maps failures to [`AppError`].

pub mod album_handlers;
pub mod client_handlers;
pub mod delivery_handlers;
pub mod health_handlers;
pub mod upload_handlers;

use crate::errors::AppError;
use uuid::Uuid;

/// Parse a required id field from a request, naming the field on failure.
pub(crate) fn require_id(field: &str, value: Option<&str>) -> Result<Uuid, AppError> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(format!("{} is required", field)))?;
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request(format!("{} is not a valid id", field)))
}

/// Like [`require_id`] but absent values are fine.
pub(crate) fn optional_id(field: &str, value: Option<&str>) -> Result<Option<Uuid>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => require_id(field, Some(raw)).map(Some),
        None => Ok(None),
    }
}
