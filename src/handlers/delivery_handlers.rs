//! Downloads and placeholder images.

use crate::{errors::AppError, services::placeholder::render_svg, state::AppState};
use axum::{
    body::Body,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

const DOWNLOAD_CACHE_CONTROL: &str = "public, max-age=31536000";
const PLACEHOLDER_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub path: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceholderQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LabelQuery {
    pub text: Option<String>,
}

/// `GET /api/download?path=&name=`: stream a stored photo as an attachment.
pub async fn download(
    State(state): State<AppState>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(q) = query?;
    let download = state
        .delivery
        .open_download(q.path.as_deref(), q.name.as_deref())
        .await?;

    let body = Body::from_stream(ReaderStream::new(download.file));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(download.content_type),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(download.size_bytes),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(DOWNLOAD_CACHE_CONTROL),
    );
    match HeaderValue::from_str(&download.disposition) {
        Ok(value) => {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        Err(_) => {
            headers.insert(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=\"photo\""),
            );
        }
    }

    Ok(response)
}

/// `GET /api/placeholder?width=&height=&text=`
pub async fn placeholder(
    query: Result<Query<PlaceholderQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(q) = query?;
    Ok(svg_response(render_svg(q.width, q.height, q.text.as_deref())))
}

/// `GET /api/placeholder/{width}/{height}?text=`
pub async fn placeholder_sized(
    path: Result<Path<(u32, u32)>, PathRejection>,
    query: Result<Query<LabelQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Path((width, height)) =
        path.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let Query(q) = query?;
    Ok(svg_response(render_svg(
        Some(width),
        Some(height),
        q.text.as_deref(),
    )))
}

fn svg_response(svg: String) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/svg+xml"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(PLACEHOLDER_CACHE_CONTROL),
    );
    (StatusCode::OK, headers, svg).into_response()
}
