//! # wsi-deid
//!
//! Batch de-identification of Whole Slide Images (WSI).
//!
//! A folder of slides is copied to a `<folder>_DEID` sibling, the label and
//! macro images that carry patient identifiers are removed from every copy,
//! file names are optionally replaced with digests, and an audit archive
//! records how each output maps back to its source. Originals are never
//! modified.
//!
//! ## Features
//!
//! - **Format support**: Native readers and in-place rewriters for Aperio SVS,
//!   Hamamatsu NDPI and 3DHISTECH MRXS
//! - **Pseudonymization**: SHA-256 or keyed HMAC-SHA256 file names, unique
//!   within a batch
//! - **Audit trail**: ZIP archive with a CSV/JSON mapping, the captured
//!   images and a hash-chained manifest
//! - **Safe staging**: Copies land under `.partial` names and are renamed only
//!   when complete
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`io`] - Local file access through the [`RangeReader`] trait
//! - [`mod@format`] - TIFF, SVS, NDPI and MRXS parsing and rewriting
//! - [`slide`] - Slide enumeration and inspection
//! - [`redact`] - The [`Redactor`] seam
//! - [`deid`] - Naming, staging and the batch orchestrator
//! - [`audit`] - Audit records, recorder and archive sink
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wsi_deid::{
//!     ArchiveAuditSink, BatchContext, BatchOrchestrator, CancellationFlag, DeidOptions,
//!     FormatInspector, FormatRedactor,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = BatchContext::new("/data/Cases", DeidOptions::default());
//!     let orchestrator = BatchOrchestrator::new(
//!         Arc::new(FormatInspector),
//!         Arc::new(FormatRedactor),
//!         Arc::new(ArchiveAuditSink::new()),
//!     );
//!
//!     let report = orchestrator
//!         .run_folder(&ctx, &CancellationFlag::new())
//!         .await
//!         .unwrap();
//!     println!("{} slides de-identified", report.summary.succeeded);
//! }
//! ```

pub mod audit;
pub mod config;
pub mod deid;
pub mod error;
pub mod format;
pub mod io;
pub mod redact;
pub mod slide;

// Re-export commonly used types
pub use audit::{
    ArchiveAuditSink, AuditRecord, AuditRecorder, AuditSink, BatchAuditLog, BatchSummary,
    FileOutcome,
};
pub use config::{Cli, Command, DeidConfig, InspectConfig};
pub use deid::{
    AuditStatus, BatchContext, BatchOrchestrator, BatchReport, CancellationFlag, DeidOptions,
    IdentityMapper, OutputIdentity, ProgressObserver,
};
pub use error::{
    AuditPersistError, BatchError, CopyError, FormatError, InspectError, IoError,
    RedactionError, TiffError,
};
pub use format::{detect_format, is_tiff_header, SlideFormat};
pub use io::{LocalFile, RangeReader};
pub use redact::{FormatRedactor, Redactor};
pub use slide::{
    enumerate_slides, AssociatedImage, CapturedImagery, FormatInspector, ImageEncoding,
    ImageKind, SlideHandle, SlideInspector, SlideRef,
};
