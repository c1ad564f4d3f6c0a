//! Multipart photo uploads.
//!
//! Both endpoints accept repeated `photos` file fields plus an `albumId`
//! text field. File parts are streamed to staging as they arrive, so no
//! part is ever held in memory whole.

use crate::{
    errors::AppError,
    models::photo::Photo,
    services::{
        ingest::{SkippedPart, discard_all},
        photo_store::{PhotoStore, StagedFile},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use futures::TryStreamExt;
use serde::Serialize;
use std::io;

const PHOTOS_FIELD: &str = "photos";
const ALBUM_ID_FIELD: &str = "albumId";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub photos: Vec<Photo>,
    pub rejected: Vec<SkippedPart>,
    pub failed: Vec<SkippedPart>,
    pub message: String,
    pub total_size: u64,
    pub album_code: String,
}

/// `POST /api/upload`: store photos on local disk.
pub async fn upload_local(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    receive(&state, &state.local, multipart).await
}

/// `POST /api/upload-cdn`: store photos on the image CDN.
pub async fn upload_cdn(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let Some(cdn) = state.cdn.as_ref() else {
        return Err(AppError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "CDN storage is not configured",
        ));
    };
    receive(&state, cdn, multipart).await
}

async fn receive<S: PhotoStore>(
    state: &AppState,
    store: &S,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let (album_id, staged) = read_parts(state, multipart).await?;
    let report = state
        .ingest
        .ingest(store, album_id.as_deref(), staged)
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        message: report.message(),
        total_size: report.total_bytes,
        album_code: report.album.code,
        photos: report.photos,
        rejected: report.rejected,
        failed: report.failed,
    }))
}

/// Stage every `photos` part and pick up `albumId`. On error, anything
/// already staged is removed.
async fn read_parts(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<(Option<String>, Vec<StagedFile>), AppError> {
    let mut album_id = None;
    let mut staged = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                discard_all(&staged).await;
                return Err(multipart_error(err));
            }
        };

        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some(PHOTOS_FIELD) => {
                let name = field.file_name().unwrap_or("photo").to_string();
                let content_type = field.content_type().map(str::to_string);
                let stream = field.map_err(io::Error::other);
                match state.local.stage(&name, content_type, stream).await {
                    Ok(part) => staged.push(part),
                    Err(err) => {
                        discard_all(&staged).await;
                        return Err(AppError::bad_request(format!(
                            "could not receive {}: {}",
                            name, err
                        )));
                    }
                }
            }
            Some(ALBUM_ID_FIELD) => match field.text().await {
                Ok(text) => album_id = Some(text),
                Err(err) => {
                    discard_all(&staged).await;
                    return Err(multipart_error(err));
                }
            },
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok((album_id, staged))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}
