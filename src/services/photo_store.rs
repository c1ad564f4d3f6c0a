//! src/services/photo_store.rs
//!
//! Photo payload storage. Uploaded parts are first streamed into a staging
//! file on local disk (computing size and MD5 along the way), then handed to
//! a [`PhotoStore`]: either [`LocalStore`], which moves the file under
//! `{root}/albums/{album_id}/`, or [`CdnStore`], which pushes it to a
//! Cloudinary-compatible image CDN under the folder `albums/{CODE}`.

use crate::models::{album::Album, photo::file_extension};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use reqwest::{
    Body,
    multipart::{Form, Part},
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{
    future::Future,
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

/// Public URL prefix under which locally stored photos are served.
pub const LOCAL_URL_PREFIX: &str = "/uploads";

const STAGING_DIR: &str = ".staging";
const ALBUMS_DIR: &str = "albums";
const DEFAULT_EXTENSION: &str = "jpg";
const MAX_EXTENSION_LEN: usize = 8;
const DEFAULT_CDN_UPLOAD_URL: &str = "https://api.cloudinary.com/v1_1";
const DEFAULT_CDN_DELIVERY_URL: &str = "https://res.cloudinary.com";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("CDN request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("CDN rejected upload ({status}): {message}")]
    CdnRejected { status: u16, message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An uploaded part written to the staging area, not yet stored.
#[derive(Clone, Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub original_name: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    /// MD5 hex digest of the bytes.
    pub checksum: String,
}

impl StagedFile {
    /// Lowercase extension of the original name, defaulting to `jpg`.
    /// Anything but a short ASCII alphanumeric extension also yields `jpg`,
    /// since it ends up in file names and public URLs.
    pub fn extension(&self) -> String {
        file_extension(&self.original_name)
            .filter(|ext| {
                ext.len() <= MAX_EXTENSION_LEN && ext.bytes().all(|b| b.is_ascii_alphanumeric())
            })
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
    }

    /// Best-effort removal of the staging file.
    pub async fn discard(&self) {
        if let Err(err) = fs::remove_file(&self.path).await {
            if err.kind() != ErrorKind::NotFound {
                debug!("failed to remove staged file {}: {}", self.path.display(), err);
            }
        }
    }
}

/// Where a photo ended up and what is known about it.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredPhoto {
    pub locator: String,
    pub thumbnail_locator: Option<String>,
    pub cdn_id: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub size_bytes: i64,
    pub format: String,
    pub checksum: Option<String>,
}

/// Final destination for staged photos.
pub trait PhotoStore: Send + Sync {
    /// Persist a staged file for `album`. The staged file is consumed on
    /// success; on failure the caller discards it.
    fn put(
        &self,
        album: &Album,
        staged: &StagedFile,
    ) -> impl Future<Output = StoreResult<StoredPhoto>> + Send;

    /// Delete a previously stored photo, e.g. when its row could not be
    /// recorded.
    fn remove(&self, stored: &StoredPhoto) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Photos on the local filesystem, served back under [`LOCAL_URL_PREFIX`].
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds every album's photos.
    pub fn albums_root(&self) -> PathBuf {
        self.root.join(ALBUMS_DIR)
    }

    fn album_dir(&self, album_id: Uuid) -> PathBuf {
        self.albums_root().join(album_id.to_string())
    }

    /// Stream an uploaded part into a staging file.
    ///
    /// - Writes bytes incrementally to `{root}/.staging/{uuid}`.
    /// - Computes MD5 and size while streaming.
    /// - Flushes and fsyncs before returning.
    ///
    /// The staging file is removed if the stream or any write fails.
    pub async fn stage<S>(
        &self,
        original_name: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StoreResult<StagedFile>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let staging = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        let tmp_path = staging.join(Uuid::new_v4().to_string());
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: u64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as u64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        Ok(StagedFile {
            path: tmp_path,
            original_name: original_name.to_string(),
            content_type,
            size_bytes,
            checksum: format!("{:x}", digest.compute()),
        })
    }

    /// Map a public locator (`/uploads/albums/...` or a bare relative path)
    /// to a path beneath the storage root.
    ///
    /// Returns `None` for anything that could escape the root: absolute
    /// components, `..`, or an empty path.
    pub fn resolve(&self, locator: &str) -> Option<PathBuf> {
        let relative = locator
            .strip_prefix(LOCAL_URL_PREFIX)
            .unwrap_or(locator)
            .trim_start_matches('/');
        if relative.is_empty() || relative.contains('\\') || relative.contains('\0') {
            return None;
        }

        let relative = Path::new(relative);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        if relative.starts_with(STAGING_DIR) {
            return None;
        }

        Some(self.root.join(relative))
    }
}

impl PhotoStore for LocalStore {
    async fn put(&self, album: &Album, staged: &StagedFile) -> StoreResult<StoredPhoto> {
        let dir = self.album_dir(album.id);
        fs::create_dir_all(&dir).await?;

        let ext = staged.extension();
        let file_name = format!("{}.{}", Uuid::new_v4(), ext);
        let final_path = dir.join(&file_name);

        if let Err(err) = fs::rename(&staged.path, &final_path).await {
            // staging and album dirs may sit on different filesystems
            debug!("rename failed ({}), copying {}", err, staged.path.display());
            fs::copy(&staged.path, &final_path).await?;
            staged.discard().await;
        }

        let (width, height) = read_dimensions(final_path.clone()).await;

        Ok(StoredPhoto {
            locator: format!("{}/{}/{}/{}", LOCAL_URL_PREFIX, ALBUMS_DIR, album.id, file_name),
            thumbnail_locator: None,
            cdn_id: None,
            width,
            height,
            size_bytes: staged.size_bytes as i64,
            format: ext,
            checksum: Some(staged.checksum.clone()),
        })
    }

    async fn remove(&self, stored: &StoredPhoto) -> StoreResult<()> {
        let Some(path) = self.resolve(&stored.locator) else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err)),
        }
    }
}

/// Read pixel dimensions from the image header. RAW formats and anything
/// the decoder does not know yield `(None, None)`.
async fn read_dimensions(path: PathBuf) -> (Option<i64>, Option<i64>) {
    let result = tokio::task::spawn_blocking(move || {
        image::ImageReader::open(&path)
            .and_then(|reader| reader.with_guessed_format())
            .ok()
            .and_then(|reader| reader.into_dimensions().ok())
    })
    .await;

    match result {
        Ok(Some((w, h))) => (Some(i64::from(w)), Some(i64::from(h))),
        _ => (None, None),
    }
}

/// Credentials and endpoints for the image CDN.
#[derive(Clone, Debug)]
pub struct CdnConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Base upload URL; defaults to the Cloudinary API.
    pub upload_url: Option<String>,
}

/// Photos on a Cloudinary-compatible image CDN.
#[derive(Clone)]
pub struct CdnStore {
    client: reqwest::Client,
    config: CdnConfig,
}

/// Subset of the CDN's upload response we keep.
#[derive(Debug, Deserialize)]
struct CdnUploadResult {
    public_id: String,
    secure_url: String,
    width: Option<i64>,
    height: Option<i64>,
    bytes: Option<i64>,
    format: Option<String>,
}

impl CdnStore {
    pub fn new(config: CdnConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("photo-delivery/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn upload_endpoint(&self) -> String {
        self.endpoint("upload")
    }

    fn endpoint(&self, action: &str) -> String {
        let base = self
            .config
            .upload_url
            .as_deref()
            .unwrap_or(DEFAULT_CDN_UPLOAD_URL)
            .trim_end_matches('/');
        format!("{}/{}/image/{}", base, self.config.cloud_name, action)
    }

    /// 300x300 cropped thumbnail URL for a public id.
    pub fn thumbnail_url(&self, public_id: &str) -> String {
        format!(
            "{}/{}/image/upload/c_fill,h_300,w_300,q_auto,f_auto/{}",
            DEFAULT_CDN_DELIVERY_URL, self.config.cloud_name, public_id
        )
    }
}

/// CDN folder for an album: `albums/{CODE}`.
pub fn cdn_folder(album: &Album) -> String {
    format!("{}/{}", ALBUMS_DIR, album.code)
}

/// Sign upload parameters: sort by name, join as `k=v&k=v`, append the
/// secret and hash with SHA-256.
pub fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl PhotoStore for CdnStore {
    async fn put(&self, album: &Album, staged: &StagedFile) -> StoreResult<StoredPhoto> {
        let folder = cdn_folder(album);
        let public_id = format!("{}_{}", Uuid::new_v4(), staged.extension());
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[
                ("folder", folder.as_str()),
                ("public_id", public_id.as_str()),
                ("timestamp", timestamp.as_str()),
            ],
            &self.config.api_secret,
        );

        let file = File::open(&staged.path).await?;
        let body = Body::wrap_stream(ReaderStream::new(file));
        let mut part = Part::stream_with_length(body, staged.size_bytes)
            .file_name(staged.original_name.clone());
        if let Some(ct) = &staged.content_type {
            part = part.mime_str(ct)?;
        }
        let form = Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder)
            .text("public_id", public_id)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(self.upload_endpoint())
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::CdnRejected {
                status: status.as_u16(),
                message,
            });
        }
        let result: CdnUploadResult = response.json().await?;
        staged.discard().await;

        Ok(StoredPhoto {
            thumbnail_locator: Some(self.thumbnail_url(&result.public_id)),
            locator: result.secure_url,
            width: result.width,
            height: result.height,
            size_bytes: result.bytes.unwrap_or(staged.size_bytes as i64),
            format: result.format.unwrap_or_else(|| staged.extension()),
            checksum: None,
            cdn_id: Some(result.public_id),
        })
    }

    async fn remove(&self, stored: &StoredPhoto) -> StoreResult<()> {
        let Some(public_id) = stored.cdn_id.as_deref() else {
            return Ok(());
        };
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("public_id", public_id), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );
        let form = Form::new()
            .text("public_id", public_id.to_string())
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::CdnRejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Multipart, State},
        routing::post,
    };
    use futures::stream;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    fn album(code: &str) -> Album {
        Album {
            id: Uuid::new_v4(),
            code: code.into(),
            title: "t".into(),
            description: None,
            password_hash: String::new(),
            preview_count: 2,
            price: 0.0,
            is_paid: false,
            client_id: Uuid::new_v4(),
            photographer_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(
            parts
                .iter()
                .copied()
                .map(|p| Ok::<_, io::Error>(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn stage_computes_size_and_checksum() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        let staged = store
            .stage("a.jpg", Some("image/jpeg".into()), chunks(&[b"hello ", b"world"]))
            .await
            .unwrap();

        assert_eq!(staged.size_bytes, 11);
        assert_eq!(staged.checksum, format!("{:x}", md5::compute(b"hello world")));
        assert_eq!(fs::read(&staged.path).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let broken = stream::iter(vec![
            Ok(Bytes::from_static(b"part")),
            Err(io::Error::new(ErrorKind::ConnectionReset, "gone")),
        ]);

        assert!(store.stage("a.jpg", None, broken).await.is_err());
        let mut entries = fs::read_dir(dir.path().join(STAGING_DIR)).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_moves_file_under_album_directory() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let album = album("FAMILY2024");

        let staged = store
            .stage("IMG_1.NEF", None, chunks(&[b"raw bytes"]))
            .await
            .unwrap();
        let stored = store.put(&album, &staged).await.unwrap();

        assert!(!staged.path.exists());
        assert!(
            stored
                .locator
                .starts_with(&format!("/uploads/albums/{}/", album.id))
        );
        assert!(stored.locator.ends_with(".nef"));
        assert_eq!(stored.format, "nef");
        assert_eq!(stored.size_bytes, 9);
        assert_eq!((stored.width, stored.height), (None, None));

        let on_disk = store.resolve(&stored.locator).unwrap();
        assert_eq!(fs::read(on_disk).await.unwrap(), b"raw bytes");
    }

    #[tokio::test]
    async fn unsafe_extensions_fall_back_to_jpg() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let album = album("EXT");

        for (name, expected) in [
            ("a.jp?g", "jpg"),
            ("a.jpg/x", "jpg"),
            ("a.jpég", "jpg"),
            ("a.averyverylongext", "jpg"),
            ("IMG.Cr2", "cr2"),
        ] {
            let staged = store.stage(name, None, chunks(&[b"x"])).await.unwrap();
            assert_eq!(staged.extension(), expected, "{}", name);

            let stored = store.put(&album, &staged).await.unwrap();
            assert!(stored.locator.ends_with(&format!(".{}", expected)));
            assert!(store.resolve(&stored.locator).unwrap().exists());
        }
    }

    #[tokio::test]
    async fn remove_deletes_stored_file() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let staged = store.stage("a.png", None, chunks(&[b"png"])).await.unwrap();
        let stored = store.put(&album("RM"), &staged).await.unwrap();
        let path = store.resolve(&stored.locator).unwrap();
        assert!(path.exists());

        store.remove(&stored).await.unwrap();
        assert!(!path.exists());
        // already gone is fine
        store.remove(&stored).await.unwrap();
    }

    #[derive(Clone, Default)]
    struct FakeCdn {
        uploads: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
        destroyed: Arc<Mutex<Vec<String>>>,
    }

    async fn fake_upload(
        State(cdn): State<FakeCdn>,
        mut multipart: Multipart,
    ) -> Json<serde_json::Value> {
        let mut public_id = String::new();
        let mut body = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("public_id") => public_id = field.text().await.unwrap(),
                Some("file") => body = field.bytes().await.unwrap().to_vec(),
                _ => {}
            }
        }
        cdn.uploads.lock().unwrap().push((public_id.clone(), body.clone()));
        Json(json!({
            "public_id": public_id,
            "secure_url": format!("https://cdn.test/{}", public_id),
            "width": 4,
            "height": 3,
            "bytes": body.len(),
            "format": "jpg"
        }))
    }

    async fn fake_destroy(
        State(cdn): State<FakeCdn>,
        mut multipart: Multipart,
    ) -> Json<serde_json::Value> {
        while let Some(field) = multipart.next_field().await.unwrap() {
            let is_public_id = field.name() == Some("public_id");
            if is_public_id {
                let public_id = field.text().await.unwrap();
                cdn.destroyed.lock().unwrap().push(public_id);
            }
        }
        Json(json!({ "result": "ok" }))
    }

    async fn spawn_fake_cdn() -> (FakeCdn, String) {
        let cdn = FakeCdn::default();
        let app = Router::new()
            .route("/{cloud}/image/upload", post(fake_upload))
            .route("/{cloud}/image/destroy", post(fake_destroy))
            .with_state(cdn.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (cdn, format!("http://{}", addr))
    }

    #[tokio::test]
    async fn cdn_put_streams_file_and_remove_destroys_it() {
        let (cdn, base) = spawn_fake_cdn().await;
        let store = CdnStore::new(CdnConfig {
            cloud_name: "studio".into(),
            api_key: "k".into(),
            api_secret: "s".into(),
            upload_url: Some(base),
        })
        .unwrap();

        let dir = TempDir::new().unwrap();
        let local = LocalStore::new(dir.path());
        let staged = local
            .stage("IMG_9.jpg", Some("image/jpeg".into()), chunks(&[b"abc", b"def"]))
            .await
            .unwrap();

        let stored = store.put(&album("WEDDING2024"), &staged).await.unwrap();
        assert!(!staged.path.exists());
        assert_eq!(stored.size_bytes, 6);
        assert_eq!((stored.width, stored.height), (Some(4), Some(3)));
        let public_id = stored.cdn_id.clone().unwrap();
        assert!(public_id.ends_with("_jpg"));
        assert_eq!(stored.locator, format!("https://cdn.test/{}", public_id));
        {
            let uploads = cdn.uploads.lock().unwrap();
            assert_eq!(uploads.len(), 1);
            assert_eq!(uploads[0].1, b"abcdef");
        }

        store.remove(&stored).await.unwrap();
        assert_eq!(*cdn.destroyed.lock().unwrap(), vec![public_id]);
    }

    #[test]
    fn resolve_rejects_escapes() {
        let store = LocalStore::new("/srv/photos");
        assert_eq!(
            store.resolve("/uploads/albums/x/a.jpg"),
            Some(PathBuf::from("/srv/photos/albums/x/a.jpg"))
        );
        assert_eq!(
            store.resolve("albums/x/a.jpg"),
            Some(PathBuf::from("/srv/photos/albums/x/a.jpg"))
        );
        assert!(store.resolve("/uploads/../etc/passwd").is_none());
        assert!(store.resolve("albums/./a.jpg").is_some());
        assert!(store.resolve("albums/../../a.jpg").is_none());
        assert!(store.resolve("").is_none());
        assert!(store.resolve("/uploads/.staging/abc").is_none());
    }

    #[test]
    fn signature_is_order_independent() {
        let a = sign_params(&[("timestamp", "1"), ("folder", "albums/X")], "secret");
        let b = sign_params(&[("folder", "albums/X"), ("timestamp", "1")], "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut hasher = Sha256::new();
        hasher.update(b"folder=albums/X&timestamp=1secret");
        assert_eq!(a, format!("{:x}", hasher.finalize()));
    }

    #[test]
    fn cdn_paths_follow_album_code() {
        let store = CdnStore::new(CdnConfig {
            cloud_name: "demo".into(),
            api_key: "k".into(),
            api_secret: "s".into(),
            upload_url: Some("http://localhost:9000/".into()),
        })
        .unwrap();

        assert_eq!(cdn_folder(&album("WEDDING2024")), "albums/WEDDING2024");
        assert_eq!(store.upload_endpoint(), "http://localhost:9000/demo/image/upload");
        assert_eq!(
            store.thumbnail_url("albums/X/abc"),
            "https://res.cloudinary.com/demo/image/upload/c_fill,h_300,w_300,q_auto,f_auto/albums/X/abc"
        );
    }
}
