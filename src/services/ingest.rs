//! Server side of the upload flow.
//!
//! Staged parts are screened, stored through a [`PhotoStore`] and recorded
//! as photo rows. Each accepted photo takes the next sort order in the
//! album and is flagged preview while its position is below the album's
//! preview count. A part that fails to store or record is logged and
//! skipped; the rest of the request still goes through.

use crate::{
    models::{
        album::Album,
        photo::{NewPhoto, Photo, is_preview_slot},
    },
    repository::{AlbumRepository, RepoError},
    services::{
        photo_store::{PhotoStore, StagedFile},
        upload_validator::is_supported_image,
    },
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no photos were sent")]
    NoFiles,
    #[error("albumId is required")]
    MissingAlbumId,
    #[error("albumId is not a valid id")]
    InvalidAlbumId,
    #[error("album not found")]
    AlbumNotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// A part that was not stored, and why.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedPart {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct IngestReport {
    pub album: Album,
    pub photos: Vec<Photo>,
    pub rejected: Vec<SkippedPart>,
    pub failed: Vec<SkippedPart>,
    /// Bytes received across every part, stored or not.
    pub total_bytes: u64,
}

impl IngestReport {
    /// Human-readable summary, e.g. `3 photo(s) uploaded. Total: 1.20MB`.
    pub fn message(&self) -> String {
        format!(
            "{} photo(s) uploaded. Total: {:.2}MB",
            self.photos.len(),
            self.total_bytes as f64 / BYTES_PER_MB
        )
    }
}

#[derive(Clone)]
pub struct IngestService<R> {
    repo: R,
}

impl<R: AlbumRepository> IngestService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Store staged parts into an album. Every staged file is either moved
    /// into the store or discarded by the time this returns.
    pub async fn ingest<S: PhotoStore>(
        &self,
        store: &S,
        album_id: Option<&str>,
        staged: Vec<StagedFile>,
    ) -> Result<IngestReport, IngestError> {
        let album = match self.resolve_album(album_id, !staged.is_empty()).await {
            Ok(album) => album,
            Err(err) => {
                discard_all(&staged).await;
                return Err(err);
            }
        };

        info!(
            "Starting upload of {} file(s) to album {}",
            staged.len(),
            album.code
        );

        let mut next_order = match self.repo.next_sort_order(album.id).await {
            Ok(order) => order,
            Err(err) => {
                discard_all(&staged).await;
                return Err(err.into());
            }
        };

        let count = staged.len();
        let mut report = IngestReport {
            album,
            photos: Vec::new(),
            rejected: Vec::new(),
            failed: Vec::new(),
            total_bytes: 0,
        };

        for (index, part) in staged.into_iter().enumerate() {
            info!(
                "Processing file {}/{}: {} ({:.2}MB)",
                index + 1,
                count,
                part.original_name,
                part.size_bytes as f64 / BYTES_PER_MB
            );
            report.total_bytes += part.size_bytes;

            if !is_supported_image(part.content_type.as_deref(), &part.original_name) {
                warn!("Rejected {}: not an image", part.original_name);
                report.rejected.push(SkippedPart {
                    filename: part.original_name.clone(),
                    reason: "unsupported file type".into(),
                });
                part.discard().await;
                continue;
            }

            let stored = match store.put(&report.album, &part).await {
                Ok(stored) => stored,
                Err(err) => {
                    error!("Failed to store {}: {}", part.original_name, err);
                    report.failed.push(SkippedPart {
                        filename: part.original_name.clone(),
                        reason: "storage failed".into(),
                    });
                    part.discard().await;
                    continue;
                }
            };

            let mut new_photo = NewPhoto {
                album_id: report.album.id,
                filename: part.original_name.clone(),
                locator: stored.locator.clone(),
                thumbnail_locator: stored.thumbnail_locator.clone(),
                cdn_id: stored.cdn_id.clone(),
                width: stored.width,
                height: stored.height,
                size_bytes: stored.size_bytes,
                format: stored.format.clone(),
                checksum: stored.checksum.clone(),
                is_preview: is_preview_slot(next_order, report.album.preview_count),
                sort_order: next_order,
            };
            let mut inserted = self.repo.insert_photo(&new_photo).await;

            // Another upload to the same album took the slot; re-read once.
            if let Err(RepoError::SortOrderTaken { sort_order, .. }) = &inserted {
                warn!(
                    "Sort order {} in album {} was taken, retrying",
                    sort_order, report.album.code
                );
                match self.repo.next_sort_order(report.album.id).await {
                    Ok(order) => {
                        new_photo.sort_order = order;
                        new_photo.is_preview = is_preview_slot(order, report.album.preview_count);
                        inserted = self.repo.insert_photo(&new_photo).await;
                    }
                    Err(err) => inserted = Err(err),
                }
            }

            match inserted {
                Ok(photo) => {
                    info!("Stored {} as #{}", photo.filename, photo.sort_order);
                    next_order = photo.sort_order + 1;
                    report.photos.push(photo);
                }
                Err(err) => {
                    error!("Failed to record {}: {}", part.original_name, err);
                    if let Err(err) = store.remove(&stored).await {
                        error!("Failed to remove stored {}: {}", stored.locator, err);
                    }
                    report.failed.push(SkippedPart {
                        filename: part.original_name.clone(),
                        reason: "could not record photo".into(),
                    });
                }
            }
        }

        info!(
            "Upload finished: {}/{} file(s), {:.2}MB total",
            report.photos.len(),
            count,
            report.total_bytes as f64 / BYTES_PER_MB
        );
        Ok(report)
    }

    async fn resolve_album(&self, album_id: Option<&str>, has_files: bool) -> Result<Album, IngestError> {
        if !has_files {
            return Err(IngestError::NoFiles);
        }
        let raw = album_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(IngestError::MissingAlbumId)?;
        let id = Uuid::parse_str(raw).map_err(|_| IngestError::InvalidAlbumId)?;
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(IngestError::AlbumNotFound)
    }
}

/// Best-effort cleanup of staged parts that will not be stored.
pub async fn discard_all(staged: &[StagedFile]) {
    for part in staged {
        part.discard().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        repository::sqlite::{SqliteRepository, tests::seed_owner},
        services::{
            catalog::{AlbumChanges, CatalogService, tests::new_album},
            delivery::DeliveryService,
            photo_store::{LocalStore, StoreError, StoredPhoto},
        },
    };
    use crate::{
        models::album::{AlbumFilter, AlbumUpdate, NewAlbum},
        repository::RepoResult,
    };
    use bytes::Bytes;
    use futures::stream;
    use std::{io, sync::Mutex};
    use tempfile::TempDir;

    async fn stage(store: &LocalStore, name: &str, mime: Option<&str>, body: &'static [u8]) -> StagedFile {
        store
            .stage(
                name,
                mime.map(Into::into),
                stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(body))]),
            )
            .await
            .unwrap()
    }

    /// Fails every put for names containing "broken".
    struct FlakyStore(LocalStore);

    impl PhotoStore for FlakyStore {
        async fn put(&self, album: &Album, staged: &StagedFile) -> Result<StoredPhoto, StoreError> {
            if staged.original_name.contains("broken") {
                return Err(StoreError::Io(io::Error::other("disk full")));
            }
            self.0.put(album, staged).await
        }

        async fn remove(&self, stored: &StoredPhoto) -> Result<(), StoreError> {
            self.0.remove(stored).await
        }
    }

    /// Hands out a stale sort order on its first call, as if another upload
    /// had inserted in between. Optionally fails every insert.
    struct RacingRepo {
        inner: SqliteRepository,
        stale_order: Mutex<Option<i64>>,
        fail_inserts: bool,
    }

    impl RacingRepo {
        fn new(inner: SqliteRepository, stale_order: Option<i64>, fail_inserts: bool) -> Self {
            Self {
                inner,
                stale_order: Mutex::new(stale_order),
                fail_inserts,
            }
        }
    }

    impl AlbumRepository for RacingRepo {
        async fn find_by_code(&self, code: &str) -> RepoResult<Option<Album>> {
            self.inner.find_by_code(code).await
        }

        async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Album>> {
            self.inner.find_by_id(id).await
        }

        async fn list(&self, filter: &AlbumFilter) -> RepoResult<Vec<Album>> {
            self.inner.list(filter).await
        }

        async fn create(&self, album: &NewAlbum, password_hash: &str) -> RepoResult<Album> {
            self.inner.create(album, password_hash).await
        }

        async fn update(&self, id: Uuid, changes: &AlbumUpdate) -> RepoResult<Option<Album>> {
            self.inner.update(id, changes).await
        }

        async fn photos(&self, album_id: Uuid) -> RepoResult<Vec<Photo>> {
            self.inner.photos(album_id).await
        }

        async fn next_sort_order(&self, album_id: Uuid) -> RepoResult<i64> {
            let stale = self.stale_order.lock().unwrap().take();
            match stale {
                Some(order) => Ok(order),
                None => self.inner.next_sort_order(album_id).await,
            }
        }

        async fn insert_photo(&self, photo: &NewPhoto) -> RepoResult<Photo> {
            if self.fail_inserts {
                return Err(RepoError::Sqlx(sqlx::Error::PoolClosed));
            }
            self.inner.insert_photo(photo).await
        }
    }

    fn files_under(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|entry| {
                        let path = entry.path();
                        if path.is_dir() { files_under(&path) } else { 1 }
                    })
                    .sum()
            })
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn family_album_end_to_end() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let repo = SqliteRepository::in_memory().await;
        let (_, client) = seed_owner(&repo).await;
        let catalog = CatalogService::new(repo.clone());
        let album = catalog
            .create_album(new_album("FAMILY2024", &client, 2))
            .await
            .unwrap()
            .album;

        let ingest = IngestService::new(repo.clone());
        let staged = vec![
            stage(&store, "familia_001.jpg", Some("image/jpeg"), b"one").await,
            stage(&store, "familia_002.jpg", Some("image/jpeg"), b"two").await,
            stage(&store, "familia_003.jpg", Some("image/jpeg"), b"three").await,
        ];
        let report = ingest
            .ingest(&store, Some(&album.id.to_string()), staged)
            .await
            .unwrap();

        let flags: Vec<(i64, bool)> = report
            .photos
            .iter()
            .map(|p| (p.sort_order, p.is_preview))
            .collect();
        assert_eq!(flags, vec![(1, true), (2, true), (3, false)]);
        assert_eq!(report.total_bytes, 11);
        assert!(report.message().starts_with("3 photo(s) uploaded."));

        let delivery = DeliveryService::new(repo.clone(), store.clone());
        let view = delivery.open_album("FAMILY2024", "familia123").await.unwrap();
        assert_eq!(view.photos.len(), 2);

        catalog
            .update_album(
                album.id,
                AlbumChanges {
                    is_paid: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let view = delivery.open_album("family2024", "familia123").await.unwrap();
        assert_eq!(view.photos.len(), 3);
    }

    #[tokio::test]
    async fn later_uploads_continue_the_order() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let repo = SqliteRepository::in_memory().await;
        let (_, client) = seed_owner(&repo).await;
        let album = CatalogService::new(repo.clone())
            .create_album(new_album("SPLIT", &client, 2))
            .await
            .unwrap()
            .album;
        let ingest = IngestService::new(repo.clone());
        let id = album.id.to_string();

        ingest
            .ingest(&store, Some(&id), vec![stage(&store, "a.jpg", None, b"a").await])
            .await
            .unwrap();
        let second = ingest
            .ingest(
                &store,
                Some(&id),
                vec![
                    stage(&store, "b.jpg", None, b"b").await,
                    stage(&store, "c.jpg", None, b"c").await,
                ],
            )
            .await
            .unwrap();

        let flags: Vec<(i64, bool)> = second
            .photos
            .iter()
            .map(|p| (p.sort_order, p.is_preview))
            .collect();
        assert_eq!(flags, vec![(2, true), (3, false)]);
    }

    #[tokio::test]
    async fn partial_failures_are_skipped_and_reported() {
        let dir = TempDir::new().unwrap();
        let local = LocalStore::new(dir.path());
        let repo = SqliteRepository::in_memory().await;
        let (_, client) = seed_owner(&repo).await;
        let album = CatalogService::new(repo.clone())
            .create_album(new_album("FLAKY", &client, 5))
            .await
            .unwrap()
            .album;

        let staged = vec![
            stage(&local, "good.jpg", Some("image/jpeg"), b"1").await,
            stage(&local, "broken.jpg", Some("image/jpeg"), b"2").await,
            stage(&local, "notes.txt", Some("text/plain"), b"3").await,
            stage(&local, "also-good.png", None, b"4").await,
        ];
        let paths: Vec<_> = staged.iter().map(|s| s.path.clone()).collect();

        let report = IngestService::new(repo)
            .ingest(&FlakyStore(local), Some(&album.id.to_string()), staged)
            .await
            .unwrap();

        let names: Vec<&str> = report.photos.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(names, vec!["good.jpg", "also-good.png"]);
        let orders: Vec<i64> = report.photos.iter().map(|p| p.sort_order).collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(report.failed[0].filename, "broken.jpg");
        assert_eq!(report.rejected[0].filename, "notes.txt");
        assert_eq!(report.total_bytes, 4);
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn taken_sort_order_is_reread_once() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let repo = SqliteRepository::in_memory().await;
        let (_, client) = seed_owner(&repo).await;
        let album = CatalogService::new(repo.clone())
            .create_album(new_album("RACE", &client, 2))
            .await
            .unwrap()
            .album;
        let id = album.id.to_string();

        // A concurrent upload already holds slot 1.
        IngestService::new(repo.clone())
            .ingest(&store, Some(&id), vec![stage(&store, "first.jpg", None, b"0").await])
            .await
            .unwrap();

        let racing = IngestService::new(RacingRepo::new(repo.clone(), Some(1), false));
        let report = racing
            .ingest(
                &store,
                Some(&id),
                vec![
                    stage(&store, "a.jpg", None, b"a").await,
                    stage(&store, "b.jpg", None, b"b").await,
                    stage(&store, "c.jpg", None, b"c").await,
                ],
            )
            .await
            .unwrap();

        assert!(report.failed.is_empty());
        let flags: Vec<(i64, bool)> = report
            .photos
            .iter()
            .map(|p| (p.sort_order, p.is_preview))
            .collect();
        assert_eq!(flags, vec![(2, true), (3, false), (4, false)]);
        assert_eq!(repo.photos(album.id).await.unwrap().len(), 4);
        assert_eq!(files_under(&store.albums_root()), 4);
    }

    #[tokio::test]
    async fn unrecorded_photos_are_removed_from_the_store() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let repo = SqliteRepository::in_memory().await;
        let (_, client) = seed_owner(&repo).await;
        let album = CatalogService::new(repo.clone())
            .create_album(new_album("NOROWS", &client, 2))
            .await
            .unwrap()
            .album;

        let report = IngestService::new(RacingRepo::new(repo.clone(), None, true))
            .ingest(
                &store,
                Some(&album.id.to_string()),
                vec![
                    stage(&store, "a.jpg", None, b"a").await,
                    stage(&store, "b.jpg", None, b"b").await,
                ],
            )
            .await
            .unwrap();

        assert!(report.photos.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed.iter().all(|f| f.reason == "could not record photo"));
        assert!(repo.photos(album.id).await.unwrap().is_empty());
        assert_eq!(files_under(dir.path()), 0);
    }

    #[tokio::test]
    async fn request_errors_discard_staged_files() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let repo = SqliteRepository::in_memory().await;
        let ingest = IngestService::new(repo);

        assert!(matches!(
            ingest.ingest(&store, Some("x"), Vec::new()).await,
            Err(IngestError::NoFiles)
        ));

        let staged = vec![stage(&store, "a.jpg", None, b"a").await];
        let path = staged[0].path.clone();
        assert!(matches!(
            ingest.ingest(&store, None, staged).await,
            Err(IngestError::MissingAlbumId)
        ));
        assert!(!path.exists());

        let staged = vec![stage(&store, "a.jpg", None, b"a").await];
        assert!(matches!(
            ingest
                .ingest(&store, Some(&Uuid::new_v4().to_string()), staged)
                .await,
            Err(IngestError::AlbumNotFound)
        ));

        let staged = vec![stage(&store, "a.jpg", None, b"a").await];
        assert!(matches!(
            ingest.ingest(&store, Some("not-a-uuid"), staged).await,
            Err(IngestError::InvalidAlbumId)
        ));
    }
}
