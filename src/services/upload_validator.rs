//! Client-side screening of candidate files before upload.
//!
//! Only image files are accepted. A file qualifies when its declared MIME
//! type is a supported image type, or when its filename contains the short
//! name of one (RAW formats rarely carry a useful MIME type). Large files
//! produce a warning but are never refused: there is no size ceiling.

use serde::Serialize;
use std::{fmt, path::PathBuf};

/// MIME types accepted for upload.
pub const SUPPORTED_IMAGE_TYPES: [&str; 14] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/tiff",
    "image/tif",
    "image/bmp",
    "image/raw",
    "image/x-canon-cr2",
    "image/x-canon-crw",
    "image/x-nikon-nef",
    "image/x-sony-arw",
    "image/x-adobe-dng",
];

/// Files above this size trigger the "professional files" warning.
pub const LARGE_FILE_WARNING_BYTES: u64 = 50 * 1024 * 1024;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Identifier of a file within one upload session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(pub usize);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file-{}", self.0)
    }
}

/// A file selected for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateFile {
    pub id: FileId,
    pub name: String,
    /// Declared MIME type, if the source knew one.
    pub mime: Option<String>,
    pub size: u64,
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub file: CandidateFile,
    pub reason: String,
}

/// Non-blocking notice about unusually large files.
#[derive(Clone, Debug, PartialEq)]
pub struct SizeWarning {
    pub large_files: usize,
    /// Total size of all accepted files.
    pub total_bytes: u64,
}

impl fmt::Display for SizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} RAW/high-resolution file(s) detected ({:.1}MB total)",
            self.large_files,
            self.total_bytes as f64 / BYTES_PER_MB
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    pub accepted: Vec<CandidateFile>,
    pub rejected: Vec<Rejection>,
    pub warning: Option<SizeWarning>,
}

/// Whether a file looks like a supported image, by MIME type or name.
pub fn is_supported_image(mime: Option<&str>, name: &str) -> bool {
    let lower_name = name.to_lowercase();
    SUPPORTED_IMAGE_TYPES.iter().any(|ty| {
        mime.is_some_and(|m| m.eq_ignore_ascii_case(ty))
            || name_tokens(*ty).any(|token| lower_name.contains(token))
    })
}

/// Filename tokens for a MIME type: the subtype itself and, for vendor
/// types like `x-nikon-nef`, the trailing format name.
fn name_tokens(mime: &'static str) -> impl Iterator<Item = &'static str> {
    let subtype = mime.split('/').nth(1).unwrap_or(mime);
    let short = subtype.rsplit('-').next().filter(|s| *s != subtype);
    std::iter::once(subtype).chain(short)
}

/// Partition candidates into accepted and rejected files.
pub fn validate(files: Vec<CandidateFile>) -> ValidationReport {
    let mut report = ValidationReport::default();

    for file in files {
        if is_supported_image(file.mime.as_deref(), &file.name) {
            report.accepted.push(file);
        } else {
            let reason = match &file.mime {
                Some(mime) => format!("unsupported file type `{}`", mime),
                None => "not a recognized image file".to_string(),
            };
            report.rejected.push(Rejection { file, reason });
        }
    }

    let large_files = report
        .accepted
        .iter()
        .filter(|f| f.size > LARGE_FILE_WARNING_BYTES)
        .count();
    if large_files > 0 {
        report.warning = Some(SizeWarning {
            large_files,
            total_bytes: report.accepted.iter().map(|f| f.size).sum(),
        });
    }

    report
}
