//! Persistence contracts for albums, photos, clients and photographers.
//!
//! Services and handlers depend on these traits rather than on SQL; the
//! production implementation is [`sqlite::SqliteRepository`].

pub mod sqlite;

use crate::models::{
    album::{Album, AlbumFilter, AlbumUpdate, NewAlbum},
    client::{Client, ClientSummary, NewClient},
    photo::{NewPhoto, Photo},
    photographer::{NewPhotographer, Photographer},
};
use std::future::Future;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("album code `{0}` already exists")]
    DuplicateCode(String),
    #[error("a client with email `{0}` already exists")]
    DuplicateClientEmail(String),
    #[error("a photographer with email `{0}` already exists")]
    DuplicatePhotographerEmail(String),
    #[error("sort order {sort_order} already taken in album `{album_id}`")]
    SortOrderTaken { album_id: Uuid, sort_order: i64 },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Album and photo storage.
pub trait AlbumRepository: Send + Sync {
    /// Look up an album by code. The code is matched case-insensitively.
    fn find_by_code(&self, code: &str) -> impl Future<Output = RepoResult<Option<Album>>> + Send;

    fn find_by_id(&self, id: Uuid) -> impl Future<Output = RepoResult<Option<Album>>> + Send;

    /// Albums matching the filter, newest first.
    fn list(&self, filter: &AlbumFilter) -> impl Future<Output = RepoResult<Vec<Album>>> + Send;

    /// Insert an album; the code is stored uppercase.
    /// Returns `DuplicateCode` when the code is taken.
    fn create(
        &self,
        album: &NewAlbum,
        password_hash: &str,
    ) -> impl Future<Output = RepoResult<Album>> + Send;

    /// Apply a partial update. Returns `None` when the album does not exist.
    fn update(
        &self,
        id: Uuid,
        changes: &AlbumUpdate,
    ) -> impl Future<Output = RepoResult<Option<Album>>> + Send;

    /// Photos of an album in display order.
    fn photos(&self, album_id: Uuid) -> impl Future<Output = RepoResult<Vec<Photo>>> + Send;

    /// The sort order the next uploaded photo should take (1-based).
    fn next_sort_order(&self, album_id: Uuid) -> impl Future<Output = RepoResult<i64>> + Send;

    fn insert_photo(&self, photo: &NewPhoto) -> impl Future<Output = RepoResult<Photo>> + Send;
}

/// Client storage, scoped per photographer.
pub trait ClientRepository: Send + Sync {
    fn find_client(&self, id: Uuid) -> impl Future<Output = RepoResult<Option<Client>>> + Send;

    /// Clients of a photographer with their album counts, newest first.
    fn list_clients(
        &self,
        photographer_id: Uuid,
    ) -> impl Future<Output = RepoResult<Vec<ClientSummary>>> + Send;

    /// Returns `DuplicateClientEmail` when the photographer already has a
    /// client with that email.
    fn create_client(&self, client: &NewClient) -> impl Future<Output = RepoResult<Client>> + Send;
}

pub trait PhotographerRepository: Send + Sync {
    fn find_photographer(
        &self,
        id: Uuid,
    ) -> impl Future<Output = RepoResult<Option<Photographer>>> + Send;

    fn list_photographers(&self) -> impl Future<Output = RepoResult<Vec<Photographer>>> + Send;

    fn create_photographer(
        &self,
        photographer: &NewPhotographer,
    ) -> impl Future<Output = RepoResult<Photographer>> + Send;
}
