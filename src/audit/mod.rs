//! Honest-broker audit trail.
//!
//! Every slide the orchestrator touches produces exactly one [`AuditRecord`]:
//! its original name, its new name, what was captured from it before
//! redaction, and how processing ended. The [`AuditRecorder`] keeps the
//! records in enumeration order and hands the whole [`BatchAuditLog`] to an
//! [`AuditSink`] once the batch is over.

mod archive;
mod recorder;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::AuditPersistError;
use crate::slide::CapturedImagery;

pub use archive::{artifact_path, ArchiveAuditSink, ARTIFACT_MARKER};
pub use recorder::{recover_log, AuditRecorder, Recovery};

// =============================================================================
// FileOutcome
// =============================================================================

/// How processing of one slide ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Copied and redacted
    Succeeded,
    /// Not a format we de-identify; nothing copied
    SkippedUnsupportedFormat(String),
    /// The slide could not be read; nothing copied
    FailedCapture(String),
    /// The copy into the destination failed; nothing left behind
    FailedCopy(String),
    /// Copied, but the copy still carries its identifying images
    FailedRedaction(String),
}

impl FileOutcome {
    pub const fn name(&self) -> &'static str {
        match self {
            FileOutcome::Succeeded => "Succeeded",
            FileOutcome::SkippedUnsupportedFormat(_) => "SkippedUnsupportedFormat",
            FileOutcome::FailedCapture(_) => "FailedCapture",
            FileOutcome::FailedCopy(_) => "FailedCopy",
            FileOutcome::FailedRedaction(_) => "FailedRedaction",
        }
    }

    /// Error description for anything but success.
    pub fn error(&self) -> Option<&str> {
        match self {
            FileOutcome::Succeeded => None,
            FileOutcome::SkippedUnsupportedFormat(e)
            | FileOutcome::FailedCapture(e)
            | FileOutcome::FailedCopy(e)
            | FileOutcome::FailedRedaction(e) => Some(e),
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Succeeded)
    }

    pub const fn is_skipped(&self) -> bool {
        matches!(self, FileOutcome::SkippedUnsupportedFormat(_))
    }

    pub const fn is_failure(&self) -> bool {
        !self.is_success() && !self.is_skipped()
    }
}

impl std::fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.error() {
            Some(error) => write!(f, "{}: {}", self.name(), error),
            None => f.write_str(self.name()),
        }
    }
}

// =============================================================================
// AuditRecord / BatchAuditLog
// =============================================================================

/// One processed slide.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub original_filename: String,
    /// Absent when the slide was never assigned a name (skipped or unreadable)
    pub new_filename: Option<String>,
    /// Absent when capture failed
    pub imagery: Option<CapturedImagery>,
    pub outcome: FileOutcome,
}

/// Succeeded / skipped / failed counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Every record of one batch, in enumeration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchAuditLog {
    records: Vec<AuditRecord>,
}

impl BatchAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: AuditRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for record in &self.records {
            match &record.outcome {
                outcome if outcome.is_success() => summary.succeeded += 1,
                outcome if outcome.is_failure() => summary.failed += 1,
                _ => summary.skipped += 1,
            }
        }
        summary
    }
}

// =============================================================================
// AuditSink
// =============================================================================

/// Persists a finished batch log as a durable artifact.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Write the artifact for `log` next to `destination` and return its path.
    ///
    /// Must never overwrite an existing artifact.
    async fn persist(
        &self,
        destination: &Path,
        log: &BatchAuditLog,
        generated_at: DateTime<Local>,
    ) -> Result<PathBuf, AuditPersistError>;
}
