//! HTTP side of the uploader: posts multipart requests to a running
//! photo-delivery server and drives [`UploadController`] from the CLI.

use crate::services::{
    upload_dispatcher::{
        TransferMode, TransferReceipt, TransportError, UploadController, UploadStatus,
        UploadTransport,
    },
    upload_validator::{CandidateFile, FileId, validate},
};
use anyhow::{Context, Result};
use reqwest::{
    Body,
    multipart::{Form, Part},
};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

/// Uploads through `POST {server}/api/upload` (or `/api/upload-cdn`).
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    album_id: Uuid,
    batch_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct UploadedPhoto {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct SkippedPart {
    filename: String,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponseBody {
    #[serde(default)]
    photos: Vec<UploadedPhoto>,
    #[serde(default)]
    rejected: Vec<SkippedPart>,
    #[serde(default)]
    failed: Vec<SkippedPart>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpTransport {
    pub fn new(
        server: &str,
        use_cdn: bool,
        album_id: Uuid,
        batch_timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("photo-delivery/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let path = if use_cdn { "api/upload-cdn" } else { "api/upload" };
        Ok(Self {
            client,
            endpoint: format!("{}/{}", server.trim_end_matches('/'), path),
            album_id,
            batch_timeout,
        })
    }

    async fn form_for(&self, files: &[CandidateFile]) -> Result<Form, TransportError> {
        let mut form = Form::new().text("albumId", self.album_id.to_string());
        for file in files {
            let handle = tokio::fs::File::open(&file.path)
                .await
                .map_err(|source| TransportError::Read {
                    path: file.path.display().to_string(),
                    source,
                })?;
            let body = Body::wrap_stream(ReaderStream::new(handle));
            let mut part = Part::stream_with_length(body, file.size).file_name(file.name.clone());
            if let Some(mime) = &file.mime {
                part = part.mime_str(mime)?;
            }
            form = form.part("photos", part);
        }
        Ok(form)
    }
}

impl UploadTransport for HttpTransport {
    async fn send(
        &self,
        files: &[CandidateFile],
        mode: TransferMode,
    ) -> Result<TransferReceipt, TransportError> {
        let form = self.form_for(files).await?;
        let mut request = self.client.post(&self.endpoint).multipart(form);
        if mode == TransferMode::Batch {
            request = request.timeout(self.batch_timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: UploadResponseBody = response.json().await?;
        Ok(TransferReceipt {
            stored: body.photos.into_iter().map(|p| p.filename).collect(),
            rejected: body
                .rejected
                .into_iter()
                .chain(body.failed)
                .map(|s| (s.filename, s.reason))
                .collect(),
        })
    }
}

/// Options for one uploader run.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub server: String,
    pub album_id: Uuid,
    pub use_cdn: bool,
    pub batch_timeout: Duration,
    pub files: Vec<PathBuf>,
}

/// Build candidates from paths, declaring MIME types by extension.
pub fn candidates_from_paths(paths: &[PathBuf]) -> Result<Vec<CandidateFile>> {
    paths
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let metadata = std::fs::metadata(path)
                .with_context(|| format!("reading metadata of {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(CandidateFile {
                id: FileId(index),
                mime: mime_guess::from_path(path)
                    .first_raw()
                    .map(str::to_string),
                name,
                size: metadata.len(),
                path: path.clone(),
            })
        })
        .collect()
}

/// Validate, upload and report. Returns the number of failed files.
pub async fn run_upload(options: UploadOptions) -> Result<usize> {
    let candidates = candidates_from_paths(&options.files)?;
    let report = validate(candidates);

    for rejection in &report.rejected {
        warn!("Skipping {}: {}", rejection.file.name, rejection.reason);
    }
    if let Some(warning) = &report.warning {
        info!("{}", warning);
    }
    if report.accepted.is_empty() {
        anyhow::bail!("no image files to upload");
    }

    let transport = HttpTransport::new(
        &options.server,
        options.use_cdn,
        options.album_id,
        options.batch_timeout,
    )?;
    let mut controller = UploadController::new(transport);
    controller.enqueue(report.accepted);

    let summary = controller.run().await;

    for file in controller.files() {
        match controller.status(file.id) {
            Some(UploadStatus::Completed) => println!("ok      {}", file.name),
            Some(UploadStatus::Failed(reason)) => println!("failed  {}: {}", file.name, reason),
            Some(status) if !status.is_terminal() => println!("skipped {}", file.name),
            _ => {}
        }
    }
    println!(
        "{} photo(s) uploaded, {} failed",
        summary.completed, summary.failed
    );

    Ok(summary.failed + report.rejected.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, body::Bytes, routing::post};
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    /// A server that answers every upload after `delay`.
    async fn spawn_slow_server(delay: Duration) -> String {
        let app = Router::new().route(
            "/api/upload",
            post(move |_body: Bytes| async move {
                tokio::time::sleep(delay).await;
                Json::<Value>(json!({ "photos": [{ "filename": "a.jpg" }] }))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn candidates_carry_size_and_guessed_mime() {
        let dir = TempDir::new().unwrap();
        let jpg = dir.path().join("a.jpg");
        let raw = dir.path().join("b.unknownext");
        std::fs::write(&jpg, b"12345").unwrap();
        std::fs::write(&raw, b"1").unwrap();

        let files = candidates_from_paths(&[jpg, raw]).unwrap();
        assert_eq!(files[0].id, FileId(0));
        assert_eq!(files[0].name, "a.jpg");
        assert_eq!(files[0].size, 5);
        assert_eq!(files[0].mime.as_deref(), Some("image/jpeg"));
        assert_eq!(files[1].mime, None);
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = candidates_from_paths(&[PathBuf::from("/definitely/not/here.jpg")]);
        assert!(result.is_err());
    }

    #[test]
    fn endpoint_depends_on_backend() {
        let id = Uuid::new_v4();
        let local = HttpTransport::new("http://localhost:3000/", false, id, Duration::from_secs(1)).unwrap();
        let cdn = HttpTransport::new("http://localhost:3000", true, id, Duration::from_secs(1)).unwrap();
        assert_eq!(local.endpoint, "http://localhost:3000/api/upload");
        assert_eq!(cdn.endpoint, "http://localhost:3000/api/upload-cdn");
    }

    #[tokio::test]
    async fn batch_timeout_applies_to_batches_only() {
        let server = spawn_slow_server(Duration::from_millis(300)).await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"jpeg").unwrap();
        let files = candidates_from_paths(&[path]).unwrap();

        let transport =
            HttpTransport::new(&server, false, Uuid::new_v4(), Duration::from_millis(50)).unwrap();

        let batch = transport.send(&files, TransferMode::Batch).await;
        assert!(matches!(batch, Err(TransportError::Http(ref e)) if e.is_timeout()));

        let receipt = transport.send(&files, TransferMode::Individual).await.unwrap();
        assert_eq!(receipt.stored, vec!["a.jpg".to_string()]);
        assert!(receipt.rejected.is_empty());
    }
}
