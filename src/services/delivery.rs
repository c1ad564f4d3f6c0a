//! Client-facing delivery: the album gate and the download proxy.
//!
//! The gate checks an album code (case-insensitively) and password and
//! exposes preview photos only, or every photo once the album is paid.
//! Downloads stream a stored file with an attachment disposition and a
//! content type from a fixed extension table; there is no range support.

use crate::{
    models::{
        album::Album,
        photo::{Photo, file_extension},
    },
    repository::{AlbumRepository, RepoError},
    services::{password::verify_password, photo_store::LocalStore},
};
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::fs::File;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid album code or password")]
    InvalidCredentials,
    #[error("{0} is required")]
    MissingParameter(&'static str),
    #[error("photo not found")]
    FileNotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// What an authenticated client sees.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GalleryView {
    pub album: Album,
    pub photos: Vec<Photo>,
    pub total_photos: usize,
    /// Photos withheld until payment.
    pub locked_photos: usize,
}

/// An opened file ready to stream.
#[derive(Debug)]
pub struct Download {
    pub file: File,
    pub size_bytes: u64,
    pub content_type: &'static str,
    pub disposition: String,
}

/// Photos an album's client may see, in display order.
pub fn visible_photos(album: &Album, photos: Vec<Photo>) -> Vec<Photo> {
    if album.is_paid {
        photos
    } else {
        photos.into_iter().filter(|p| p.is_preview).collect()
    }
}

/// Content type for a file extension (case-insensitive).
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// `attachment; filename="..."`, defaulting to `photo`. Quotes and control
/// characters are dropped so the header stays well-formed; non-ASCII names
/// also carry a percent-encoded `filename*`.
pub fn attachment_disposition(name: Option<&str>) -> String {
    let cleaned: String = name
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    let cleaned = cleaned.trim();
    let name = if cleaned.is_empty() { "photo" } else { cleaned };
    if name.is_ascii() {
        return format!("attachment; filename=\"{}\"", name);
    }

    // Non-ASCII names get an ASCII fallback plus the RFC 5987 form.
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

#[derive(Clone)]
pub struct DeliveryService<R> {
    repo: R,
    store: LocalStore,
}

impl<R: AlbumRepository> DeliveryService<R> {
    pub fn new(repo: R, store: LocalStore) -> Self {
        Self { repo, store }
    }

    /// Authenticate against an album and return the client's gallery.
    ///
    /// Unknown codes and wrong passwords fail the same way and reveal no
    /// photo data.
    pub async fn open_album(&self, code: &str, password: &str) -> DeliveryResult<GalleryView> {
        let album = self
            .repo
            .find_by_code(code)
            .await?
            .ok_or(DeliveryError::InvalidCredentials)?;
        if !verify_password(password, &album.password_hash) {
            debug!("rejected password for album {}", album.code);
            return Err(DeliveryError::InvalidCredentials);
        }

        let photos = self.repo.photos(album.id).await?;
        let total_photos = photos.len();
        let photos = visible_photos(&album, photos);
        info!(
            "Album {} opened: {}/{} photos visible",
            album.code,
            photos.len(),
            total_photos
        );

        Ok(GalleryView {
            locked_photos: total_photos - photos.len(),
            total_photos,
            photos,
            album,
        })
    }

    /// Open a stored file for download.
    pub async fn open_download(&self, path: Option<&str>, name: Option<&str>) -> DeliveryResult<Download> {
        let locator = path
            .filter(|p| !p.trim().is_empty())
            .ok_or(DeliveryError::MissingParameter("path"))?;
        let full_path = self.store.resolve(locator).ok_or(DeliveryError::FileNotFound)?;

        let file = File::open(&full_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                DeliveryError::FileNotFound
            } else {
                DeliveryError::Io(err)
            }
        })?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(DeliveryError::FileNotFound);
        }

        let content_type = file_extension(locator)
            .map(|ext| content_type_for(&ext))
            .unwrap_or("application/octet-stream");

        Ok(Download {
            file,
            size_bytes: metadata.len(),
            content_type,
            disposition: attachment_disposition(name),
        })
    }
}
