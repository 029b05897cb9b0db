//! Slide container formats.
//!
//! Each supported vendor format has a module exposing the same two entry
//! points: `capture(path)` reads the label, macro, and properties, and
//! `redact(path)` removes the identifying images from the file in place.
//!
//! # Format Detection
//!
//! Use [`SlideFormat::from_path`] to classify a file by extension, and
//! [`detect::detect_format`] to identify TIFF content by its vendor markers:
//!
//! - **Aperio SVS**: Identified by "Aperio" marker in ImageDescription
//! - **Hamamatsu NDPI**: Identified by tag 65420 in the first directory
//! - **3DHISTECH MRXS**: `.mrxs` stub plus a `Slidedat.ini` data directory

pub mod detect;
pub mod jpeg;
pub mod mrxs;
pub mod ndpi;
pub mod svs;
pub mod tiff;

pub use detect::{detect_format, is_tiff_header, SlideFormat, RECOGNIZED_EXTENSIONS};
