//! Routes for the photo delivery API.
//!
//! ## Structure
//! - **Probes**: `GET /healthz`, `GET /readyz`
//! - **Catalog**
//!   - `GET|POST     /api/photographers`
//!   - `GET|POST|PUT /api/albums`
//!   - `POST         /api/albums/access` (client login)
//!   - `GET|POST     /api/clients`
//! - **Uploads** (multipart, no body limit)
//!   - `POST /api/upload`, `POST /api/upload-cdn`
//! - **Delivery**
//!   - `GET /api/download?path=&name=`
//!   - `GET /api/placeholder`, `GET /api/placeholder/{width}/{height}`
//!   - `GET /uploads/albums/...` static files from the photo root

use crate::{
    handlers::{
        album_handlers::{access_album, create_album, list_albums, update_album},
        client_handlers::{create_client, create_photographer, list_clients, list_photographers},
        delivery_handlers::{download, placeholder, placeholder_sized},
        health_handlers::{healthz, readyz},
        upload_handlers::{upload_cdn, upload_local},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

/// API routes, without state or static files.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/photographers",
            get(list_photographers).post(create_photographer),
        )
        .route(
            "/api/albums",
            get(list_albums).post(create_album).put(update_album),
        )
        .route("/api/albums/access", post(access_album))
        .route("/api/clients", get(list_clients).post(create_client))
        .route(
            "/api/upload",
            post(upload_local).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/api/upload-cdn",
            post(upload_cdn).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/download", get(download))
        .route("/api/placeholder", get(placeholder))
        .route("/api/placeholder/{width}/{height}", get(placeholder_sized))
}

/// The full application: API routes, static photo serving and request tracing.
pub fn app(state: AppState) -> Router {
    let photos = ServeDir::new(state.local.albums_root());
    routes()
        .nest_service("/uploads/albums", photos)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
