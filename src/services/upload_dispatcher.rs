//! Upload orchestration with per-file status tracking.
//!
//! Accepted files are split by size: everything at or below
//! [`INDIVIDUAL_UPLOAD_THRESHOLD`] travels in one batched multipart request,
//! larger files are sent one request each. Every file moves through
//! `Pending -> Uploading(progress) -> Completed | Failed(reason)`. A failed
//! transfer is recorded and the loop moves on; nothing is retried.

use crate::services::upload_validator::{CandidateFile, FileId};
use std::{collections::HashMap, future::Future};
use thiserror::Error;
use tracing::{info, warn};

/// Files strictly larger than this are uploaded individually.
pub const INDIVIDUAL_UPLOAD_THRESHOLD: u64 = 100 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    /// In flight, with a coarse progress percentage.
    Uploading(u8),
    Completed,
    Failed(String),
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed(_))
    }
}

/// How a request was composed; batch requests carry the overall timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferMode {
    Batch,
    Individual,
}

/// What the server reported for one request.
#[derive(Clone, Debug, Default)]
pub struct TransferReceipt {
    /// Original filenames the server stored.
    pub stored: Vec<String>,
    /// Filenames the server refused, with its reason.
    pub rejected: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not read `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Sends a group of files to the upload endpoint.
pub trait UploadTransport: Send + Sync {
    fn send(
        &self,
        files: &[CandidateFile],
        mode: TransferMode,
    ) -> impl Future<Output = Result<TransferReceipt, TransportError>> + Send;
}

/// Files grouped by transfer strategy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadPlan {
    pub batch: Vec<CandidateFile>,
    pub individual: Vec<CandidateFile>,
}

/// Split files by size, preserving their relative order.
pub fn plan(files: Vec<CandidateFile>, threshold: u64) -> UploadPlan {
    let (individual, batch) = files.into_iter().partition(|f| f.size > threshold);
    UploadPlan { batch, individual }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub completed: usize,
    pub failed: usize,
}

/// Owns the upload queue and the status of every file in it.
pub struct UploadController<T> {
    transport: T,
    threshold: u64,
    files: Vec<CandidateFile>,
    statuses: HashMap<FileId, UploadStatus>,
}

impl<T: UploadTransport> UploadController<T> {
    pub fn new(transport: T) -> Self {
        Self::with_threshold(transport, INDIVIDUAL_UPLOAD_THRESHOLD)
    }

    pub fn with_threshold(transport: T, threshold: u64) -> Self {
        Self {
            transport,
            threshold,
            files: Vec::new(),
            statuses: HashMap::new(),
        }
    }

    /// Queue files as `Pending`.
    pub fn enqueue(&mut self, files: impl IntoIterator<Item = CandidateFile>) {
        for file in files {
            self.statuses.insert(file.id, UploadStatus::Pending);
            self.files.push(file);
        }
    }

    /// Drop a file that is not in flight. Returns whether it was removed.
    pub fn remove(&mut self, id: FileId) -> bool {
        match self.statuses.get(&id) {
            Some(UploadStatus::Pending) | Some(UploadStatus::Failed(_)) => {
                self.statuses.remove(&id);
                self.files.retain(|f| f.id != id);
                true
            }
            _ => false,
        }
    }

    pub fn status(&self, id: FileId) -> Option<&UploadStatus> {
        self.statuses.get(&id)
    }

    pub fn files(&self) -> &[CandidateFile] {
        &self.files
    }

    /// Completed share of all queued files, 0.0..=1.0.
    pub fn progress(&self) -> f64 {
        if self.files.is_empty() {
            return 0.0;
        }
        let completed = self
            .statuses
            .values()
            .filter(|s| **s == UploadStatus::Completed)
            .count();
        completed as f64 / self.files.len() as f64
    }

    fn set(&mut self, id: FileId, status: UploadStatus) {
        self.statuses.insert(id, status);
    }

    /// Upload every pending file: the small-file batch first, then each
    /// large file in turn.
    pub async fn run(&mut self) -> UploadSummary {
        let pending: Vec<CandidateFile> = self
            .files
            .iter()
            .filter(|f| self.statuses.get(&f.id) == Some(&UploadStatus::Pending))
            .cloned()
            .collect();
        if pending.is_empty() {
            return UploadSummary::default();
        }

        let UploadPlan { batch, individual } = plan(pending, self.threshold);
        info!(
            "Uploading {} file(s) in one batch and {} individually",
            batch.len(),
            individual.len()
        );

        let mut summary = UploadSummary::default();

        if !batch.is_empty() {
            for file in &batch {
                self.set(file.id, UploadStatus::Uploading(50));
            }
            let result = self.transport.send(&batch, TransferMode::Batch).await;
            self.apply(&batch, result, &mut summary);
        }

        for file in individual {
            self.set(file.id, UploadStatus::Uploading(10));
            let group = std::slice::from_ref(&file);
            self.set(file.id, UploadStatus::Uploading(50));
            let result = self.transport.send(group, TransferMode::Individual).await;
            self.apply(group, result, &mut summary);
            info!("Upload progress: {:.0}%", self.progress() * 100.0);
        }

        summary
    }

    /// Record the outcome of one request for the files it carried.
    fn apply(
        &mut self,
        files: &[CandidateFile],
        result: Result<TransferReceipt, TransportError>,
        summary: &mut UploadSummary,
    ) {
        match result {
            Ok(receipt) => {
                let mut stored: HashMap<&str, usize> = HashMap::new();
                for name in &receipt.stored {
                    *stored.entry(name.as_str()).or_default() += 1;
                }
                for file in files {
                    let remaining = stored.get_mut(file.name.as_str()).filter(|n| **n > 0);
                    if let Some(count) = remaining {
                        *count -= 1;
                        self.set(file.id, UploadStatus::Completed);
                        summary.completed += 1;
                    } else {
                        let reason = receipt
                            .rejected
                            .iter()
                            .find(|(name, _)| *name == file.name)
                            .map(|(_, reason)| reason.clone())
                            .unwrap_or_else(|| "not stored by server".to_string());
                        warn!("{} ({}) failed: {}", file.name, file.id, reason);
                        self.set(file.id, UploadStatus::Failed(reason));
                        summary.failed += 1;
                    }
                }
            }
            Err(err) => {
                for file in files {
                    warn!("{} ({}) failed: {}", file.name, file.id, err);
                    self.set(file.id, UploadStatus::Failed(err.to_string()));
                    summary.failed += 1;
                }
            }
        }
    }
}
