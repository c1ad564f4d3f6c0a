//! Album management and the client-facing access gate.
//!
//! - `GET  /api/albums`         by `code`, or a list filtered by owner/client
//! - `POST /api/albums`         create
//! - `PUT  /api/albums`         partial update
//! - `POST /api/albums/access`  code + password -> visible photos

use crate::{
    errors::AppError,
    handlers::{optional_id, require_id},
    models::album::{AlbumFilter, DEFAULT_PREVIEW_COUNT, DEFAULT_PRICE, NewAlbum},
    services::catalog::AlbumChanges,
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumQuery {
    pub code: Option<String>,
    pub photographer_id: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlbumRequest {
    pub code: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub photographer_id: Option<String>,
    pub preview_count: Option<i64>,
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAlbumRequest {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub password: Option<String>,
    pub preview_count: Option<i64>,
    pub price: Option<f64>,
    pub is_paid: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AccessRequest {
    pub code: Option<String>,
    pub password: Option<String>,
}

/// `GET /api/albums?code=` returns one album with only the photos its
/// client may see; otherwise a filtered list.
pub async fn list_albums(
    State(state): State<AppState>,
    query: Result<Query<AlbumQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(q) = query?;

    if let Some(code) = q.code.as_deref().filter(|c| !c.trim().is_empty()) {
        let album = state.catalog.public_album_by_code(code).await?;
        return Ok(Json(album).into_response());
    }

    let filter = AlbumFilter {
        photographer_id: optional_id("photographerId", q.photographer_id.as_deref())?,
        client_id: optional_id("clientId", q.client_id.as_deref())?,
    };
    let albums = state.catalog.list_albums(&filter).await?;
    Ok(Json(albums).into_response())
}

/// `POST /api/albums`
pub async fn create_album(
    State(state): State<AppState>,
    payload: Result<Json<CreateAlbumRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;

    let new_album = NewAlbum {
        code: req.code.unwrap_or_default(),
        title: req.title.unwrap_or_default(),
        description: req.description,
        password: req.password.unwrap_or_default(),
        preview_count: req.preview_count.unwrap_or(DEFAULT_PREVIEW_COUNT),
        price: req.price.unwrap_or(DEFAULT_PRICE),
        client_id: require_id("clientId", req.client_id.as_deref())?,
        photographer_id: require_id("photographerId", req.photographer_id.as_deref())?,
    };

    let album = state.catalog.create_album(new_album).await?;
    Ok((StatusCode::CREATED, Json(album)))
}

/// `PUT /api/albums`
pub async fn update_album(
    State(state): State<AppState>,
    payload: Result<Json<UpdateAlbumRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let id = require_id("id", req.id.as_deref())?;

    let changes = AlbumChanges {
        title: req.title,
        description: req.description,
        password: req.password,
        preview_count: req.preview_count,
        price: req.price,
        is_paid: req.is_paid,
    };

    let album = state.catalog.update_album(id, changes).await?;
    Ok(Json(album))
}

/// `POST /api/albums/access`
pub async fn access_album(
    State(state): State<AppState>,
    payload: Result<Json<AccessRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let (Some(code), Some(password)) = (req.code, req.password) else {
        return Err(AppError::bad_request("code and password are required"));
    };

    let view = state.delivery.open_album(&code, &password).await?;
    Ok(Json(view))
}
