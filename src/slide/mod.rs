//! Slides and the identifying content captured from them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            BatchOrchestrator            │
//! └────────────────────┬────────────────────┘
//!                      │ SlideRef
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          SlideInspector Trait           │
//! │  (captures label, macro, properties)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┼───────────┐
//!          ▼           ▼           ▼
//!     ┌─────────┐ ┌─────────┐ ┌─────────┐
//!     │   SVS   │ │  NDPI   │ │  MRXS   │
//!     └─────────┘ └─────────┘ └─────────┘
//! ```
//!
//! [`enumerate_slides`] lists a source folder, [`FormatInspector`] opens
//! each slide and returns a [`SlideHandle`] holding its [`CapturedImagery`].
//! The capture happens before redaction so the audit trail keeps the
//! original label and macro.

mod associated;
mod inspector;
mod source;

pub use associated::{image_dimensions, AssociatedImage, ImageEncoding, ImageKind};
pub use inspector::{CapturedImagery, FormatInspector, SlideHandle, SlideInspector};
pub use source::{enumerate_slides, SlideRef};
