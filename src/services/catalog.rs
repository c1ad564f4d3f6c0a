//! Album, client and photographer management.
//!
//! Album codes are normalized to uppercase and checked for duplicates before
//! insert; the unique index covers the race between the check and the
//! insert. Passwords are hashed here so repositories only ever see hashes.

use crate::{
    models::{
        album::{Album, AlbumDetail, AlbumFilter, AlbumUpdate, NewAlbum, normalize_code},
        client::{Client, ClientSummary, NewClient},
        photographer::{NewPhotographer, Photographer},
    },
    repository::{AlbumRepository, ClientRepository, PhotographerRepository, RepoError},
    services::{
        delivery::visible_photos,
        password::{PasswordError, hash_password},
    },
};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("an album with code `{0}` already exists")]
    DuplicateCode(String),
    #[error("a client with email `{0}` already exists")]
    DuplicateClientEmail(String),
    #[error("a photographer with email `{0}` already exists")]
    DuplicatePhotographerEmail(String),
    #[error("album not found")]
    AlbumNotFound,
    #[error("client not found")]
    ClientNotFound,
    #[error("photographer not found")]
    PhotographerNotFound,
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for CatalogError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::DuplicateCode(code) => CatalogError::DuplicateCode(code),
            RepoError::DuplicateClientEmail(email) => CatalogError::DuplicateClientEmail(email),
            RepoError::DuplicatePhotographerEmail(email) => {
                CatalogError::DuplicatePhotographerEmail(email)
            }
            other => CatalogError::Repo(other),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Changes requested by a photographer; `password` is plaintext.
#[derive(Clone, Debug, Default)]
pub struct AlbumChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub password: Option<String>,
    pub preview_count: Option<i64>,
    pub price: Option<f64>,
    pub is_paid: Option<bool>,
}

#[derive(Clone)]
pub struct CatalogService<R> {
    repo: R,
}

impl<R> CatalogService<R>
where
    R: AlbumRepository + ClientRepository + PhotographerRepository,
{
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Attach client and photos to an album.
    async fn detail(&self, album: Album) -> CatalogResult<AlbumDetail> {
        let client = self.repo.find_client(album.client_id).await?;
        let photos = self.repo.photos(album.id).await?;
        Ok(AlbumDetail {
            photo_count: photos.len(),
            album,
            client,
            photos,
        })
    }

    /// Create an album for an existing client of the photographer.
    pub async fn create_album(&self, album: NewAlbum) -> CatalogResult<AlbumDetail> {
        require("code", &album.code)?;
        require("title", &album.title)?;
        require("password", &album.password)?;
        check_preview_count(album.preview_count)?;
        check_price(album.price)?;

        let code = normalize_code(&album.code);
        if self.repo.find_by_code(&code).await?.is_some() {
            return Err(CatalogError::DuplicateCode(code));
        }

        let client = self
            .repo
            .find_client(album.client_id)
            .await?
            .ok_or(CatalogError::ClientNotFound)?;
        if client.photographer_id != album.photographer_id {
            return Err(CatalogError::InvalidField {
                field: "clientId",
                reason: "client belongs to another photographer",
            });
        }

        let password_hash = hash_password(&album.password)?;
        let created = self
            .repo
            .create(
                &NewAlbum {
                    code,
                    ..album
                },
                &password_hash,
            )
            .await?;
        info!("Created album {} for client {}", created.code, client.id);

        Ok(AlbumDetail {
            album: created,
            client: Some(client),
            photos: Vec::new(),
            photo_count: 0,
        })
    }

    /// Apply photographer edits, including payment confirmation.
    pub async fn update_album(&self, id: Uuid, changes: AlbumChanges) -> CatalogResult<AlbumDetail> {
        if let Some(title) = &changes.title {
            require("title", title)?;
        }
        if let Some(preview_count) = changes.preview_count {
            check_preview_count(preview_count)?;
        }
        if let Some(price) = changes.price {
            check_price(price)?;
        }
        let password_hash = match changes.password.as_deref() {
            Some(password) => Some(hash_password(password)?),
            None => None,
        };

        let update = AlbumUpdate {
            title: changes.title,
            description: changes.description,
            password_hash,
            preview_count: changes.preview_count,
            price: changes.price,
            is_paid: changes.is_paid,
        };
        let album = self
            .repo
            .update(id, &update)
            .await?
            .ok_or(CatalogError::AlbumNotFound)?;
        if update.is_paid == Some(true) {
            info!("Album {} marked as paid", album.code);
        }

        self.detail(album).await
    }

    /// Case-insensitive lookup by album code.
    pub async fn album_by_code(&self, code: &str) -> CatalogResult<AlbumDetail> {
        let album = self
            .repo
            .find_by_code(code)
            .await?
            .ok_or(CatalogError::AlbumNotFound)?;
        self.detail(album).await
    }

    /// Lookup by code for unauthenticated callers. Until the album is paid
    /// only preview photos are listed; `photo_count` stays the full total.
    pub async fn public_album_by_code(&self, code: &str) -> CatalogResult<AlbumDetail> {
        let mut detail = self.album_by_code(code).await?;
        detail.photos = visible_photos(&detail.album, detail.photos);
        Ok(detail)
    }

    pub async fn list_albums(&self, filter: &AlbumFilter) -> CatalogResult<Vec<AlbumDetail>> {
        let albums = self.repo.list(filter).await?;
        let mut details = Vec::with_capacity(albums.len());
        for album in albums {
            details.push(self.detail(album).await?);
        }
        Ok(details)
    }

    pub async fn list_clients(&self, photographer_id: Uuid) -> CatalogResult<Vec<ClientSummary>> {
        Ok(self.repo.list_clients(photographer_id).await?)
    }

    pub async fn create_client(&self, client: NewClient) -> CatalogResult<Client> {
        require("name", &client.name)?;
        require("email", &client.email)?;
        if !client.email.contains('@') {
            return Err(CatalogError::InvalidField {
                field: "email",
                reason: "must be an email address",
            });
        }
        self.repo
            .find_photographer(client.photographer_id)
            .await?
            .ok_or(CatalogError::PhotographerNotFound)?;

        let created = self
            .repo
            .create_client(&NewClient {
                email: client.email.trim().to_string(),
                ..client
            })
            .await?;
        info!("Created client {} ({})", created.name, created.id);
        Ok(created)
    }

    pub async fn list_photographers(&self) -> CatalogResult<Vec<Photographer>> {
        Ok(self.repo.list_photographers().await?)
    }

    pub async fn create_photographer(
        &self,
        photographer: NewPhotographer,
    ) -> CatalogResult<Photographer> {
        require("name", &photographer.name)?;
        require("email", &photographer.email)?;
        Ok(self.repo.create_photographer(&photographer).await?)
    }
}

fn require(field: &'static str, value: &str) -> CatalogResult<()> {
    if value.trim().is_empty() {
        Err(CatalogError::MissingField(field))
    } else {
        Ok(())
    }
}

fn check_preview_count(value: i64) -> CatalogResult<()> {
    if value < 0 {
        return Err(CatalogError::InvalidField {
            field: "previewCount",
            reason: "must not be negative",
        });
    }
    Ok(())
}

fn check_price(value: f64) -> CatalogResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(CatalogError::InvalidField {
            field: "price",
            reason: "must be a non-negative number",
        });
    }
    Ok(())
}
