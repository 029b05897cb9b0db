//! Batch Orchestrator driving one de-identification run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       BatchOrchestrator                         │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                   for each SlideRef                     │    │
//! │  │  1. Check cancellation   4. Stage copy (.partial)       │    │
//! │  │  2. Inspect + capture    5. Redact the copy             │    │
//! │  │  3. Assign output name   6. Record + report progress    │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │         │                  │                    │               │
//! │         ▼                  ▼                    ▼               │
//! │  ┌──────────────┐   ┌────────────┐     ┌────────────────┐       │
//! │  │SlideInspector│   │  Redactor  │     │ AuditRecorder  │       │
//! │  └──────────────┘   └────────────┘     └────────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Files are processed strictly one after another, in enumeration order.
//! A per-file failure becomes that file's [`FileOutcome`] and the batch moves
//! on; only problems with the source or destination folder abort a run.
//! Originals are opened read-only; redaction runs on the staged copy.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::audit::{
    AuditRecord, AuditRecorder, AuditSink, BatchAuditLog, BatchSummary, FileOutcome,
};
use crate::error::{AuditPersistError, BatchError, InspectError, RedactionError};
use crate::redact::Redactor;
use crate::slide::{enumerate_slides, CapturedImagery, SlideInspector, SlideRef};

use super::identity::{IdentityMapper, KeyedDigest, OutputIdentity, Sha256Digest, StemDigest};
use super::staging::stage_slide;

/// Suffix appended to the source folder name to form the destination.
pub const DESTINATION_SUFFIX: &str = "_DEID";

/// File marking a destination folder as owned by a running batch.
pub const IN_PROGRESS_MARKER: &str = ".deid-in-progress";

/// Default per-file redaction budget.
pub const DEFAULT_REDACTION_TIMEOUT: Duration = Duration::from_secs(600);

// =============================================================================
// Options / Context
// =============================================================================

/// What a run does besides copying and redacting.
#[derive(Debug, Clone)]
pub struct DeidOptions {
    /// Replace file stems with a digest
    pub pseudonymize_filenames: bool,

    /// Persist the audit artifact at the end of the run
    pub produce_audit_log: bool,

    /// Secret for keyed (HMAC) pseudonyms; plain SHA-256 when absent
    pub pseudonym_key: Option<String>,

    /// Per-file redaction budget; `None` waits indefinitely
    pub redaction_timeout: Option<Duration>,
}

impl Default for DeidOptions {
    fn default() -> Self {
        Self {
            pseudonymize_filenames: true,
            produce_audit_log: true,
            pseudonym_key: None,
            redaction_timeout: Some(DEFAULT_REDACTION_TIMEOUT),
        }
    }
}

impl DeidOptions {
    /// A fresh mapper for one batch.
    pub fn identity_mapper(&self) -> IdentityMapper {
        let digest: Box<dyn StemDigest> = match &self.pseudonym_key {
            Some(key) => Box::new(KeyedDigest::new(key.as_bytes())),
            None => Box::new(Sha256Digest),
        };
        IdentityMapper::new(self.pseudonymize_filenames, digest)
    }
}

/// Everything one run needs to know about where it reads and writes.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub options: DeidOptions,
}

impl BatchContext {
    /// Context writing to the `<source>_DEID` sibling folder.
    pub fn new(source: impl Into<PathBuf>, options: DeidOptions) -> Self {
        let source = source.into();
        let destination = destination_for(&source);
        Self {
            source,
            destination,
            options,
        }
    }

    /// Like [`new`](Self::new), with `source` resolved to its canonical
    /// absolute path first.
    pub async fn resolve(source: impl AsRef<Path>, options: DeidOptions) -> Result<Self, BatchError> {
        let source = source.as_ref();
        let canonical = tokio::fs::canonicalize(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BatchError::SourceNotFound(source.to_path_buf())
            } else {
                BatchError::Enumerate {
                    path: source.to_path_buf(),
                    source: e,
                }
            }
        })?;
        Ok(Self::new(canonical, options))
    }
}

/// `<source>_DEID`, next to the source folder.
pub fn destination_for(source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slides".to_string());
    source.with_file_name(format!("{}{}", name, DESTINATION_SUFFIX))
}

/// Planned output names, in enumeration order, without touching any file.
pub fn plan_identities(options: &DeidOptions, slides: &[SlideRef]) -> Vec<OutputIdentity> {
    let mut mapper = options.identity_mapper();
    slides.iter().map(|slide| mapper.assign(slide)).collect()
}

// =============================================================================
// Cancellation / Progress
// =============================================================================

/// Cooperative stop request, checked before each file.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One finished file, as reported to a [`ProgressObserver`].
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// 1-based position in the batch
    pub index: usize,
    pub total: usize,
    pub filename: &'a str,
    pub outcome: &'a FileOutcome,
}

/// Receives a report after every file.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: Progress<'_>);
}

// =============================================================================
// BatchReport
// =============================================================================

/// What became of the audit artifact.
#[derive(Debug)]
pub enum AuditStatus {
    /// The run was configured without an audit log
    Disabled,
    Persisted(PathBuf),
    /// Records are in [`BatchReport::log`]; nothing was written
    Failed(AuditPersistError),
}

/// Result of a run that got past its pre-flight checks.
#[derive(Debug)]
pub struct BatchReport {
    pub destination: PathBuf,
    pub summary: BatchSummary,
    /// Slides enumerated but never started
    pub not_started: usize,
    pub cancelled: bool,
    pub audit: AuditStatus,
    pub log: BatchAuditLog,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn audit_failed(&self) -> bool {
        matches!(self.audit, AuditStatus::Failed(_))
    }
}

// =============================================================================
// BatchOrchestrator
// =============================================================================

/// Runs batches with a fixed set of collaborators.
pub struct BatchOrchestrator {
    inspector: Arc<dyn SlideInspector>,
    redactor: Arc<dyn Redactor>,
    sink: Arc<dyn AuditSink>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl BatchOrchestrator {
    pub fn new(
        inspector: Arc<dyn SlideInspector>,
        redactor: Arc<dyn Redactor>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            inspector,
            redactor,
            sink,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Enumerate `ctx.source` and run over everything found.
    pub async fn run_folder(
        &self,
        ctx: &BatchContext,
        cancel: &CancellationFlag,
    ) -> Result<BatchReport, BatchError> {
        let slides = enumerate_slides(&ctx.source).await?;
        self.run(ctx, &slides, cancel).await
    }

    /// Process `slides` in order into `ctx.destination`.
    ///
    /// Returns `Err` only when the destination cannot be prepared; anything
    /// that goes wrong with a single file ends up in the report.
    pub async fn run(
        &self,
        ctx: &BatchContext,
        slides: &[SlideRef],
        cancel: &CancellationFlag,
    ) -> Result<BatchReport, BatchError> {
        let marker = claim_destination(&ctx.destination).await?;
        info!(
            source = %ctx.source.display(),
            destination = %ctx.destination.display(),
            slides = slides.len(),
            pseudonymize = ctx.options.pseudonymize_filenames,
            "Starting de-identification batch"
        );

        let mut mapper = ctx.options.identity_mapper();
        let mut recorder = AuditRecorder::new(self.sink.clone(), &ctx.destination);
        let total = slides.len();
        let mut cancelled = false;

        for (i, slide) in slides.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                info!(
                    processed = i,
                    remaining = total - i,
                    "Cancellation requested, not starting further files"
                );
                break;
            }

            let record = self.process(ctx, &mut mapper, slide).await;
            log_outcome(&record);
            if let Some(observer) = &self.observer {
                observer.on_progress(Progress {
                    index: i + 1,
                    total,
                    filename: &record.original_filename,
                    outcome: &record.outcome,
                });
            }
            recorder.capture(record);
        }

        let audit = if ctx.options.produce_audit_log {
            match recorder.flush().await {
                Ok(path) => AuditStatus::Persisted(path),
                Err(e) => {
                    error!(error = %e, "Failed to persist audit log");
                    AuditStatus::Failed(e)
                }
            }
        } else {
            AuditStatus::Disabled
        };

        release_destination(&marker).await;

        let log = recorder.into_log();
        let summary = log.summary();
        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled,
            "Batch finished"
        );

        Ok(BatchReport {
            destination: ctx.destination.clone(),
            summary,
            not_started: total - log.len(),
            cancelled,
            audit,
            log,
        })
    }

    /// Run one slide through inspect, name, copy, redact.
    async fn process(
        &self,
        ctx: &BatchContext,
        mapper: &mut IdentityMapper,
        slide: &SlideRef,
    ) -> AuditRecord {
        let record = |new_filename: Option<String>,
                      imagery: Option<CapturedImagery>,
                      outcome: FileOutcome| AuditRecord {
            original_filename: slide.file_name().to_string(),
            new_filename,
            imagery,
            outcome,
        };

        let imagery = match self.inspector.open(slide).await {
            Ok(handle) => handle.into_imagery(),
            Err(InspectError::Unsupported { reason }) => {
                return record(None, None, FileOutcome::SkippedUnsupportedFormat(reason));
            }
            Err(e) => return record(None, None, FileOutcome::FailedCapture(e.to_string())),
        };

        let identity = mapper.assign(slide);
        let staged = match stage_slide(slide, &identity, &ctx.destination).await {
            Ok(staged) => staged,
            Err(e) => {
                return record(
                    Some(identity.new_filename),
                    Some(imagery),
                    FileOutcome::FailedCopy(e.to_string()),
                )
            }
        };

        let outcome = match self.redact(&staged.path, ctx.options.redaction_timeout).await {
            Ok(()) => FileOutcome::Succeeded,
            Err(e) => {
                warn!(
                    file = slide.file_name(),
                    copy = %staged.path.display(),
                    error = %e,
                    "Redaction failed; the copy in the destination still carries identifying images"
                );
                FileOutcome::FailedRedaction(e.to_string())
            }
        };

        record(Some(identity.new_filename), Some(imagery), outcome)
    }

    async fn redact(&self, path: &Path, limit: Option<Duration>) -> Result<(), RedactionError> {
        let redaction = self.redactor.redact(path);
        match limit {
            Some(limit) => tokio::time::timeout(limit, redaction)
                .await
                .unwrap_or(Err(RedactionError::TimedOut(limit))),
            None => redaction.await,
        }
    }
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

fn log_outcome(record: &AuditRecord) {
    let new_name = record.new_filename.as_deref().unwrap_or("-");
    match &record.outcome {
        FileOutcome::Succeeded => info!(
            file = %record.original_filename,
            new_name,
            outcome = record.outcome.name(),
            "Slide de-identified"
        ),
        outcome => warn!(
            file = %record.original_filename,
            new_name,
            outcome = outcome.name(),
            error = outcome.error().unwrap_or(""),
            "Slide not de-identified"
        ),
    }
}

/// Create the destination folder and take its in-progress marker.
async fn claim_destination(destination: &Path) -> Result<PathBuf, BatchError> {
    let destination_error = |source| BatchError::Destination {
        path: destination.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(destination)
        .await
        .map_err(destination_error)?;

    let marker = destination.join(IN_PROGRESS_MARKER);
    match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker)
        .await
    {
        Ok(_) => Ok(marker),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(BatchError::DestinationBusy {
                path: destination.to_path_buf(),
                marker,
            })
        }
        Err(e) => Err(destination_error(e)),
    }
}

async fn release_destination(marker: &Path) {
    if let Err(e) = tokio::fs::remove_file(marker).await {
        warn!(marker = %marker.display(), error = %e, "Failed to remove in-progress marker");
    }
}

// =============================================================================
// Tests
// =============================================================================
