//! src/repository/sqlite.rs
//!
//! SQLite implementation of the repository traits. Ids are UUIDs stored as
//! blobs, timestamps are RFC 3339 text, and uniqueness (album codes, client
//! emails per photographer, photo sort order per album) is enforced by
//! indexes so concurrent inserts resolve to a typed error.

use crate::{
    models::{
        album::{Album, AlbumFilter, AlbumUpdate, NewAlbum, normalize_code},
        client::{Client, ClientSummary, NewClient},
        photo::{NewPhoto, Photo},
        photographer::{NewPhotographer, Photographer},
    },
    repository::{
        AlbumRepository, ClientRepository, PhotographerRepository, RepoError, RepoResult,
    },
};
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");

const ALBUM_COLUMNS: &str = "id, code, title, description, password_hash, preview_count, \
                             price, is_paid, client_id, photographer_id, created_at";

const PHOTO_COLUMNS: &str = "id, album_id, filename, locator, thumbnail_locator, cdn_id, \
                             width, height, size_bytes, format, checksum, is_preview, \
                             sort_order, uploaded_at";

const CLIENT_COLUMNS: &str = "id, name, email, phone, photographer_id, created_at";

const PHOTOGRAPHER_COLUMNS: &str = "id, name, email, phone, studio, created_at";

#[derive(Clone)]
pub struct SqliteRepository {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Every statement is idempotent, so this is
    /// safe to run on each start.
    pub async fn migrate(&self) -> RepoResult<usize> {
        let statements = MIGRATION_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(statements.len())
    }

    /// Single-connection in-memory database with the schema applied.
    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = Self::new(Arc::new(pool));
        repo.migrate().await.unwrap();
        repo
    }
}

impl AlbumRepository for SqliteRepository {
    async fn find_by_code(&self, code: &str) -> RepoResult<Option<Album>> {
        let sql = format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE code = ?");
        let album = sqlx::query_as::<_, Album>(&sql)
            .bind(normalize_code(code))
            .fetch_optional(&*self.db)
            .await?;
        Ok(album)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Album>> {
        let sql = format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?");
        let album = sqlx::query_as::<_, Album>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(album)
    }

    async fn list(&self, filter: &AlbumFilter) -> RepoResult<Vec<Album>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE 1 = 1"));

        if let Some(photographer_id) = filter.photographer_id {
            builder.push(" AND photographer_id = ");
            builder.push_bind(photographer_id);
        }
        if let Some(client_id) = filter.client_id {
            builder.push(" AND client_id = ");
            builder.push_bind(client_id);
        }
        builder.push(" ORDER BY created_at DESC");

        let albums = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(albums)
    }

    async fn create(&self, album: &NewAlbum, password_hash: &str) -> RepoResult<Album> {
        let code = normalize_code(&album.code);
        let sql = format!(
            "INSERT INTO albums ({ALBUM_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
             RETURNING {ALBUM_COLUMNS}"
        );

        sqlx::query_as::<_, Album>(&sql)
            .bind(Uuid::new_v4())
            .bind(&code)
            .bind(&album.title)
            .bind(&album.description)
            .bind(password_hash)
            .bind(album.preview_count)
            .bind(album.price)
            .bind(album.client_id)
            .bind(album.photographer_id)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    RepoError::DuplicateCode(code.clone())
                } else {
                    RepoError::Sqlx(err)
                }
            })
    }

    async fn update(&self, id: Uuid, changes: &AlbumUpdate) -> RepoResult<Option<Album>> {
        if changes.is_empty() {
            return self.find_by_id(id).await;
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE albums SET ");
        {
            let mut set = builder.separated(", ");
            if let Some(title) = &changes.title {
                set.push("title = ").push_bind_unseparated(title.clone());
            }
            if let Some(description) = &changes.description {
                set.push("description = ")
                    .push_bind_unseparated(description.clone());
            }
            if let Some(hash) = &changes.password_hash {
                set.push("password_hash = ").push_bind_unseparated(hash.clone());
            }
            if let Some(preview_count) = changes.preview_count {
                set.push("preview_count = ")
                    .push_bind_unseparated(preview_count);
            }
            if let Some(price) = changes.price {
                set.push("price = ").push_bind_unseparated(price);
            }
            if let Some(is_paid) = changes.is_paid {
                set.push("is_paid = ").push_bind_unseparated(is_paid);
            }
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(format!(" RETURNING {ALBUM_COLUMNS}"));

        let album = builder.build_query_as().fetch_optional(&*self.db).await?;
        Ok(album)
    }

    async fn photos(&self, album_id: Uuid) -> RepoResult<Vec<Photo>> {
        let sql =
            format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE album_id = ? ORDER BY sort_order ASC");
        let photos = sqlx::query_as::<_, Photo>(&sql)
            .bind(album_id)
            .fetch_all(&*self.db)
            .await?;
        Ok(photos)
    }

    async fn next_sort_order(&self, album_id: Uuid) -> RepoResult<i64> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sort_order) FROM photos WHERE album_id = ?")
                .bind(album_id)
                .fetch_one(&*self.db)
                .await?;
        Ok(max.unwrap_or(0) + 1)
    }

    async fn insert_photo(&self, photo: &NewPhoto) -> RepoResult<Photo> {
        let sql = format!(
            "INSERT INTO photos ({PHOTO_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {PHOTO_COLUMNS}"
        );

        sqlx::query_as::<_, Photo>(&sql)
            .bind(Uuid::new_v4())
            .bind(photo.album_id)
            .bind(&photo.filename)
            .bind(&photo.locator)
            .bind(&photo.thumbnail_locator)
            .bind(&photo.cdn_id)
            .bind(photo.width)
            .bind(photo.height)
            .bind(photo.size_bytes)
            .bind(&photo.format)
            .bind(&photo.checksum)
            .bind(photo.is_preview)
            .bind(photo.sort_order)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    RepoError::SortOrderTaken {
                        album_id: photo.album_id,
                        sort_order: photo.sort_order,
                    }
                } else {
                    RepoError::Sqlx(err)
                }
            })
    }
}

impl ClientRepository for SqliteRepository {
    async fn find_client(&self, id: Uuid) -> RepoResult<Option<Client>> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?");
        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(client)
    }

    async fn list_clients(&self, photographer_id: Uuid) -> RepoResult<Vec<ClientSummary>> {
        let clients = sqlx::query_as::<_, ClientSummary>(
            "SELECT c.id, c.name, c.email, c.phone, c.photographer_id, c.created_at,
                    COUNT(a.id) AS album_count
             FROM clients c
             LEFT JOIN albums a ON a.client_id = c.id
             WHERE c.photographer_id = ?
             GROUP BY c.id
             ORDER BY c.created_at DESC",
        )
        .bind(photographer_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(clients)
    }

    async fn create_client(&self, client: &NewClient) -> RepoResult<Client> {
        let sql = format!(
            "INSERT INTO clients ({CLIENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {CLIENT_COLUMNS}"
        );

        sqlx::query_as::<_, Client>(&sql)
            .bind(Uuid::new_v4())
            .bind(&client.name)
            .bind(&client.email)
            .bind(&client.phone)
            .bind(client.photographer_id)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    RepoError::DuplicateClientEmail(client.email.clone())
                } else {
                    RepoError::Sqlx(err)
                }
            })
    }
}

impl PhotographerRepository for SqliteRepository {
    async fn find_photographer(&self, id: Uuid) -> RepoResult<Option<Photographer>> {
        let sql = format!("SELECT {PHOTOGRAPHER_COLUMNS} FROM photographers WHERE id = ?");
        let photographer = sqlx::query_as::<_, Photographer>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(photographer)
    }

    async fn list_photographers(&self) -> RepoResult<Vec<Photographer>> {
        let sql = format!("SELECT {PHOTOGRAPHER_COLUMNS} FROM photographers ORDER BY name ASC");
        let photographers = sqlx::query_as::<_, Photographer>(&sql)
            .fetch_all(&*self.db)
            .await?;
        Ok(photographers)
    }

    async fn create_photographer(&self, photographer: &NewPhotographer) -> RepoResult<Photographer> {
        let sql = format!(
            "INSERT INTO photographers ({PHOTOGRAPHER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {PHOTOGRAPHER_COLUMNS}"
        );

        sqlx::query_as::<_, Photographer>(&sql)
            .bind(Uuid::new_v4())
            .bind(&photographer.name)
            .bind(&photographer.email)
            .bind(&photographer.phone)
            .bind(&photographer.studio)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    RepoError::DuplicatePhotographerEmail(photographer.email.clone())
                } else {
                    RepoError::Sqlx(err)
                }
            })
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
