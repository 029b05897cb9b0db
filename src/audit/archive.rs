//! ZIP audit archive.
//!
//! # Layout
//!
//! ```text
//! <dest>_PHI_Secure_Data_Mapping_File_<YYYYMMDD_HHMMSS>.zip
//! ├── mapping.csv            one row per record
//! ├── mapping.json           full records, hash-chained
//! ├── images/0001_label.png  evidence images, by row
//! ├── images/0001_macro.png
//! └── manifest.json          SHA-256 of every member + chain head
//! ```
//!
//! Each JSON record carries `record_sha256 = SHA256(previous_sha256 ||
//! canonical JSON of the record)`, where `previous_sha256` is the hex digest
//! of the record before it (64 zeros for the first). Editing, dropping or
//! reordering a record breaks every digest after it.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::AuditPersistError;
use crate::slide::{AssociatedImage, ImageEncoding, ImageKind};

use super::{AuditRecord, AuditSink, BatchAuditLog, BatchSummary};

/// Inserted between the destination folder name and the timestamp.
pub const ARTIFACT_MARKER: &str = "_PHI_Secure_Data_Mapping_File_";

/// Header row of `mapping.csv`.
const CSV_HEADER: [&str; 6] = [
    "Original Filename",
    "New Filename",
    "Outcome",
    "Error",
    "Label Image",
    "Macro Image",
];

/// `previous_sha256` of the first record.
const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Give up after this many `_N` suffixes.
const MAX_NAME_ATTEMPTS: usize = 100;

const ARCHIVE_FORMAT: &str = "wsi-deid audit archive";
const ARCHIVE_VERSION: u32 = 1;

/// Artifact path for `destination` at `generated_at`, before any `_N`
/// suffix: a sibling of the destination folder.
pub fn artifact_path(destination: &Path, generated_at: DateTime<Local>) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slides".to_string());
    let file_name = format!(
        "{}{}{}.zip",
        name,
        ARTIFACT_MARKER,
        generated_at.format("%Y%m%d_%H%M%S")
    );
    match destination.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

fn suffixed(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}_{}.zip", stem, n))
}

// =============================================================================
// ArchiveAuditSink
// =============================================================================

/// [`AuditSink`] writing a ZIP archive next to the destination folder, or
/// into a fixed directory when built with [`in_directory`](Self::in_directory).
#[derive(Debug, Clone, Default)]
pub struct ArchiveAuditSink {
    directory: Option<PathBuf>,
}

impl ArchiveAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink writing its archives into `directory`, named as usual.
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
        }
    }

    fn target(&self, destination: &Path, generated_at: DateTime<Local>) -> PathBuf {
        let default = artifact_path(destination, generated_at);
        match (&self.directory, default.file_name()) {
            (Some(directory), Some(name)) => directory.join(name),
            _ => default,
        }
    }
}

#[async_trait]
impl AuditSink for ArchiveAuditSink {
    async fn persist(
        &self,
        destination: &Path,
        log: &BatchAuditLog,
        generated_at: DateTime<Local>,
    ) -> Result<PathBuf, AuditPersistError> {
        let target = self.target(destination, generated_at);
        let log = log.clone();

        tokio::task::spawn_blocking(move || write_archive(&target, &log, generated_at))
            .await
            .map_err(|e| AuditPersistError::Task(e.to_string()))?
    }
}

/// Write the archive to a temporary file beside `target`, then move it into
/// place without replacing anything already there.
fn write_archive(
    target: &Path,
    log: &BatchAuditLog,
    generated_at: DateTime<Local>,
) -> Result<PathBuf, AuditPersistError> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".audit-")
        .suffix(".zip.partial")
        .tempfile_in(&dir)
        .map_err(|e| AuditPersistError::io("create temporary archive", &dir, e))?;

    let members = ArchiveMembers::build(log, generated_at)?;
    {
        let mut zip = ZipWriter::new(temp.as_file_mut());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, contents) in &members.files {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(contents)
                .map_err(|e| AuditPersistError::io("write archive member", target, e))?;
        }
        zip.finish()?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| AuditPersistError::io("sync archive", temp.path(), e))?;

    let mut candidate = target.to_path_buf();
    for attempt in 1..=MAX_NAME_ATTEMPTS {
        match temp.persist_noclobber(&candidate) {
            Ok(_) => {
                debug!(
                    artifact = %candidate.display(),
                    members = members.files.len(),
                    "Wrote audit archive"
                );
                return Ok(candidate);
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                temp = e.file;
                candidate = suffixed(target, attempt);
            }
            Err(e) => return Err(AuditPersistError::io("persist archive", &candidate, e.error)),
        }
    }

    Err(AuditPersistError::NameExhausted(target.to_path_buf()))
}

// =============================================================================
// Archive contents
// =============================================================================

/// Evidence image as listed in `mapping.json`.
#[derive(Debug, Serialize)]
struct ImageEntry {
    /// Archive member name
    file: String,
    kind: ImageKind,
    /// Encoding as captured from the slide
    captured_encoding: ImageEncoding,
    /// Encoding of the archive member
    stored_encoding: ImageEncoding,
    width: Option<u32>,
    height: Option<u32>,
    /// Digest of the captured bytes
    captured_sha256: String,
}

/// Record fields covered by the hash chain.
#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    row: usize,
    original_filename: &'a str,
    new_filename: Option<&'a str>,
    outcome: &'static str,
    error: Option<&'a str>,
    label: Option<ImageEntry>,
    #[serde(rename = "macro")]
    macro_image: Option<ImageEntry>,
    properties: Option<&'a BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct ChainedRecord<'a> {
    #[serde(flatten)]
    body: RecordBody<'a>,
    previous_sha256: String,
    record_sha256: String,
}

#[derive(Debug, Serialize)]
struct MappingDocument<'a> {
    generated_at: String,
    records: Vec<ChainedRecord<'a>>,
    chain_head: String,
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    name: String,
    sha256: String,
    size: usize,
}

#[derive(Debug, Serialize)]
struct Manifest {
    format: &'static str,
    version: u32,
    generated_at: String,
    record_count: usize,
    summary: BatchSummary,
    chain_head: String,
    members: Vec<ManifestEntry>,
}

/// Every member of the archive, in write order.
struct ArchiveMembers {
    files: Vec<(String, Vec<u8>)>,
}

impl ArchiveMembers {
    fn build(log: &BatchAuditLog, generated_at: DateTime<Local>) -> Result<Self, AuditPersistError> {
        let generated_at = generated_at.to_rfc3339();
        let mut images: Vec<(String, Vec<u8>)> = Vec::new();
        let mut csv = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(Vec::new());
        csv.write_record(CSV_HEADER)?;

        let mut records = Vec::with_capacity(log.len());
        let mut previous = GENESIS_HASH.to_string();
        for (index, record) in log.records().iter().enumerate() {
            let row = index + 1;
            let label = store_image(row, record, ImageKind::Label, &mut images);
            let macro_image = store_image(row, record, ImageKind::Macro, &mut images);

            csv.write_record([
                record.original_filename.as_str(),
                record.new_filename.as_deref().unwrap_or(""),
                record.outcome.name(),
                record.outcome.error().unwrap_or(""),
                label.as_ref().map(|e| e.file.as_str()).unwrap_or(""),
                macro_image.as_ref().map(|e| e.file.as_str()).unwrap_or(""),
            ])?;

            let body = RecordBody {
                row,
                original_filename: &record.original_filename,
                new_filename: record.new_filename.as_deref(),
                outcome: record.outcome.name(),
                error: record.outcome.error(),
                label,
                macro_image,
                properties: record.imagery.as_ref().map(|i| &i.properties),
            };
            let record_sha256 = chain_hash(&previous, &serde_json::to_vec(&body)?);
            records.push(ChainedRecord {
                body,
                previous_sha256: std::mem::replace(&mut previous, record_sha256.clone()),
                record_sha256,
            });
        }

        let mapping = MappingDocument {
            generated_at: generated_at.clone(),
            records,
            chain_head: previous.clone(),
        };

        let csv = csv
            .into_inner()
            .map_err(|e| AuditPersistError::io("write mapping.csv", "mapping.csv", e.into_error()))?;

        let mut files = vec![
            ("mapping.csv".to_string(), csv),
            ("mapping.json".to_string(), serde_json::to_vec_pretty(&mapping)?),
        ];
        files.extend(images);

        let manifest = Manifest {
            format: ARCHIVE_FORMAT,
            version: ARCHIVE_VERSION,
            generated_at,
            record_count: log.len(),
            summary: log.summary(),
            chain_head: previous,
            members: files
                .iter()
                .map(|(name, contents)| ManifestEntry {
                    name: name.clone(),
                    sha256: sha256_hex(contents),
                    size: contents.len(),
                })
                .collect(),
        };
        files.push(("manifest.json".to_string(), serde_json::to_vec_pretty(&manifest)?));

        Ok(Self { files })
    }
}

/// Add the record's image of `kind` to `images` and describe it.
fn store_image(
    row: usize,
    record: &AuditRecord,
    kind: ImageKind,
    images: &mut Vec<(String, Vec<u8>)>,
) -> Option<ImageEntry> {
    let image = record.imagery.as_ref()?.image(kind)?;
    let (stored_encoding, contents) = evidence_bytes(image);
    let file = format!("images/{:04}_{}.{}", row, kind.name(), stored_encoding.extension());

    images.push((file.clone(), contents));
    Some(ImageEntry {
        file,
        kind,
        captured_encoding: image.encoding,
        stored_encoding,
        width: image.dimensions.map(|(w, _)| w),
        height: image.dimensions.map(|(_, h)| h),
        captured_sha256: sha256_hex(&image.data),
    })
}

/// PNG when the image decodes, the captured bytes otherwise.
fn evidence_bytes(image: &AssociatedImage) -> (ImageEncoding, Vec<u8>) {
    if image.encoding == ImageEncoding::Png {
        return (ImageEncoding::Png, image.data.to_vec());
    }

    let decoded = match image::load_from_memory(&image.data) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!(kind = image.kind.name(), error = %e, "Storing evidence image undecoded");
            return (image.encoding, image.data.to_vec());
        }
    };

    let mut png = Vec::new();
    match decoded.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png) {
        Ok(()) => (ImageEncoding::Png, png),
        Err(e) => {
            debug!(kind = image.kind.name(), error = %e, "PNG conversion failed");
            (image.encoding, image.data.to_vec())
        }
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn chain_hash(previous: &str, canonical: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(canonical);
    hex::encode(hasher.finalize())
}

// =============================================================================
// Tests
// =============================================================================
