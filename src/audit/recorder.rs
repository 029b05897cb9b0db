//! Accumulating records until the batch is flushed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{info, warn};

use crate::error::AuditPersistError;

use super::{AuditRecord, AuditSink, BatchAuditLog};

/// Collects one record per processed slide and persists them once.
///
/// Records are kept in memory until [`flush`](Self::flush), captured images
/// included. Labels and macros are a few megabytes at most, so a batch of a
/// few hundred slides fits comfortably; much larger batches should be split.
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    destination: PathBuf,
    log: BatchAuditLog,
    artifact: Option<PathBuf>,
}

impl AuditRecorder {
    /// Create a recorder whose artifact will sit next to `destination`.
    pub fn new(sink: Arc<dyn AuditSink>, destination: impl Into<PathBuf>) -> Self {
        Self {
            sink,
            destination: destination.into(),
            log: BatchAuditLog::new(),
            artifact: None,
        }
    }

    /// Append a record.
    pub fn capture(&mut self, record: AuditRecord) {
        if self.artifact.is_some() {
            warn!(
                file = %record.original_filename,
                "Record captured after the audit log was flushed; it is not in the artifact"
            );
        }
        self.log.push(record);
    }

    pub fn log(&self) -> &BatchAuditLog {
        &self.log
    }

    pub fn into_log(self) -> BatchAuditLog {
        self.log
    }

    /// Path of the persisted artifact, once flushed.
    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    /// Persist the log through the sink.
    ///
    /// Calling this again after a success returns the same path without
    /// writing anything. After a failure the log is kept and the call can
    /// be retried.
    pub async fn flush(&mut self) -> Result<PathBuf, AuditPersistError> {
        if let Some(artifact) = &self.artifact {
            return Ok(artifact.clone());
        }

        let artifact = self
            .sink
            .persist(&self.destination, &self.log, Local::now())
            .await?;
        info!(
            artifact = %artifact.display(),
            records = self.log.len(),
            "Persisted audit log"
        );
        self.artifact = Some(artifact.clone());
        Ok(artifact)
    }
}

// =============================================================================
// Recovery
// =============================================================================

/// Where a log ended up after [`recover_log`].
#[derive(Debug)]
pub enum Recovery {
    /// Persisted by the primary sink on a retry
    Persisted(PathBuf),

    /// Every retry failed; written by the fallback sink instead
    Fallback {
        artifact: PathBuf,
        /// Last error from the primary sink, if it was tried at all
        error: Option<AuditPersistError>,
    },
}

/// Persist a log whose flush failed.
///
/// The primary sink is tried `retries` times, `delay` apart. If it never
/// succeeds the log goes to `fallback`. An error is returned only when the
/// fallback fails as well.
pub async fn recover_log(
    primary: &dyn AuditSink,
    fallback: &dyn AuditSink,
    destination: &Path,
    log: &BatchAuditLog,
    retries: usize,
    delay: Duration,
) -> Result<Recovery, AuditPersistError> {
    let mut last_error = None;
    for attempt in 1..=retries {
        if attempt > 1 {
            tokio::time::sleep(delay).await;
        }
        match primary.persist(destination, log, Local::now()).await {
            Ok(artifact) => {
                info!(artifact = %artifact.display(), attempt, "Persisted audit log on retry");
                return Ok(Recovery::Persisted(artifact));
            }
            Err(e) => {
                warn!(attempt, retries, error = %e, "Audit log retry failed");
                last_error = Some(e);
            }
        }
    }

    let artifact = fallback.persist(destination, log, Local::now()).await?;
    warn!(artifact = %artifact.display(), "Audit log written to the fallback location");
    Ok(Recovery::Fallback {
        artifact,
        error: last_error,
    })
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("destination", &self.destination)
            .field("records", &self.log.len())
            .field("artifact", &self.artifact)
            .finish()
    }
}
