//! De-identification of a folder of slides.
//!
//! [`BatchOrchestrator`] drives a run: each slide is inspected, given an
//! output name by the [`IdentityMapper`], copied into the destination by
//! [`stage_slide`] and redacted there. Every file ends up as one audit
//! record, whatever happened to it.

mod identity;
mod orchestrator;
mod staging;

pub use identity::{IdentityMapper, KeyedDigest, OutputIdentity, Sha256Digest, StemDigest};
pub use orchestrator::{
    destination_for, plan_identities, AuditStatus, BatchContext, BatchOrchestrator, BatchReport,
    CancellationFlag, DeidOptions, Progress, ProgressObserver, DEFAULT_REDACTION_TIMEOUT,
    DESTINATION_SUFFIX, IN_PROGRESS_MARKER,
};
pub use staging::{stage_slide, StagedSlide};
