//! Clients and photographers.

use crate::{
    errors::AppError,
    handlers::require_id,
    models::{client::NewClient, photographer::NewPhotographer},
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientQuery {
    pub photographer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub photographer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePhotographerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub studio: Option<String>,
}

/// `GET /api/clients?photographerId=`
pub async fn list_clients(
    State(state): State<AppState>,
    query: Result<Query<ClientQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(q) = query?;
    let photographer_id = require_id("photographerId", q.photographer_id.as_deref())?;
    let clients = state.catalog.list_clients(photographer_id).await?;
    Ok(Json(clients))
}

/// `POST /api/clients`
pub async fn create_client(
    State(state): State<AppState>,
    payload: Result<Json<CreateClientRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let client = state
        .catalog
        .create_client(NewClient {
            name: req.name.unwrap_or_default(),
            email: req.email.unwrap_or_default(),
            phone: req.phone,
            photographer_id: require_id("photographerId", req.photographer_id.as_deref())?,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(client)))
}

/// `GET /api/photographers`
pub async fn list_photographers(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog.list_photographers().await?))
}

/// `POST /api/photographers`
pub async fn create_photographer(
    State(state): State<AppState>,
    payload: Result<Json<CreatePhotographerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let photographer = state
        .catalog
        .create_photographer(NewPhotographer {
            name: req.name.unwrap_or_default(),
            email: req.email.unwrap_or_default(),
            phone: req.phone,
            studio: req.studio,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(photographer)))
}
