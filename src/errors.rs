use crate::{
    repository::RepoError,
    services::{
        catalog::CatalogError, delivery::DeliveryError, ingest::IngestError,
        password::PasswordError, photo_store::StoreError,
    },
};
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

const INTERNAL_MESSAGE: &str = "internal server error";

/// An HTTP error rendered as `{"error": ..., "status": ...}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Log the detail and answer with a generic 500.
    pub fn internal(detail: impl fmt::Display) -> Self {
        tracing::error!("{}", detail);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err)
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::DuplicateCode(_)
            | RepoError::DuplicateClientEmail(_)
            | RepoError::DuplicatePhotographerEmail(_)
            | RepoError::SortOrderTaken { .. } => AppError::conflict(err.to_string()),
            RepoError::Sqlx(err) => AppError::internal(err),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::MissingField(_) | CatalogError::InvalidField { .. } => {
                AppError::bad_request(err.to_string())
            }
            CatalogError::DuplicateCode(_)
            | CatalogError::DuplicateClientEmail(_)
            | CatalogError::DuplicatePhotographerEmail(_) => AppError::conflict(err.to_string()),
            CatalogError::AlbumNotFound
            | CatalogError::ClientNotFound
            | CatalogError::PhotographerNotFound => AppError::not_found(err.to_string()),
            CatalogError::Password(PasswordError::Empty) => AppError::bad_request(err.to_string()),
            CatalogError::Password(err) => AppError::internal(err),
            CatalogError::Repo(err) => err.into(),
        }
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::InvalidCredentials => AppError::unauthorized(err.to_string()),
            DeliveryError::MissingParameter(_) => AppError::bad_request(err.to_string()),
            DeliveryError::FileNotFound => AppError::not_found(err.to_string()),
            DeliveryError::Repo(err) => err.into(),
            DeliveryError::Io(err) => AppError::internal(err),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::NoFiles | IngestError::MissingAlbumId | IngestError::InvalidAlbumId => {
                AppError::bad_request(err.to_string())
            }
            IngestError::AlbumNotFound => AppError::not_found(err.to_string()),
            IngestError::Repo(err) => err.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::internal(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}
