//! Format detection for Whole Slide Image files.
//!
//! Detection happens in two steps. Enumeration tags each file by extension
//! alone ([`SlideFormat::from_path`]), which costs no I/O. Opening a slide
//! then checks the content against the vendor markers:
//!
//! - **Aperio SVS**: TIFF whose first ImageDescription starts with `Aperio`
//! - **Hamamatsu NDPI**: TIFF whose first directory carries tag 65420
//! - **3DHISTECH MRXS**: `.mrxs` file with a `<stem>/Slidedat.ini` companion
//!
//! A readable file without the expected marker is unsupported; an unreadable
//! one is a capture failure. The distinction is carried by
//! [`FormatError::UnsupportedFormat`] versus every other variant.

use std::path::Path;

use serde::Serialize;

use crate::error::{FormatError, TiffError};
use crate::io::RangeReader;

use super::tiff::{ByteOrder, Ifd, TiffHeader, TiffTag, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};

// =============================================================================
// SlideFormat
// =============================================================================

/// Container format of a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SlideFormat {
    /// Aperio SVS (TIFF with label and macro directories)
    AperioSvs,

    /// Hamamatsu NDPI (TIFF-like, macro marked by SourceLens = -1)
    HamamatsuNdpi,

    /// 3DHISTECH MRXS (`.mrxs` stub plus a data directory)
    Mirax,

    /// Anything else
    Unsupported,
}

/// Extensions picked up when enumerating a folder (lowercase, no dot).
pub const RECOGNIZED_EXTENSIONS: [&str; 3] = ["svs", "ndpi", "mrxs"];

impl SlideFormat {
    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::HamamatsuNdpi => "Hamamatsu NDPI",
            SlideFormat::Mirax => "3DHISTECH MRXS",
            SlideFormat::Unsupported => "Unsupported",
        }
    }

    /// Classify a path by its extension, case-insensitively.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("svs") => SlideFormat::AperioSvs,
            Some("ndpi") => SlideFormat::HamamatsuNdpi,
            Some("mrxs") => SlideFormat::Mirax,
            _ => SlideFormat::Unsupported,
        }
    }

    /// Whether this format has an inspector and a redactor.
    pub const fn is_supported(&self) -> bool {
        !matches!(self, SlideFormat::Unsupported)
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Maximum bytes to read from ImageDescription for format detection.
const MAX_DESCRIPTION_BYTES: usize = 1024;

/// Marker prefix of Aperio ImageDescription strings.
const APERIO_MARKER: &[u8] = b"Aperio";

/// Classify TIFF content by its vendor markers.
///
/// # Returns
/// * `Ok(SlideFormat::AperioSvs)` or `Ok(SlideFormat::HamamatsuNdpi)` when
///   the first directory carries the vendor marker
/// * `Ok(SlideFormat::Unsupported)` for a valid TIFF without one
/// * `Err(FormatError::Tiff)` when the file is not a TIFF or its first
///   directory is corrupt; a `.svs`/`.ndpi` that fails here is damaged,
///   not foreign
/// * `Err(FormatError::Io)` for read errors
pub async fn detect_format<R: RangeReader>(reader: &R) -> Result<SlideFormat, FormatError> {
    if reader.size() < TIFF_HEADER_SIZE as u64 {
        return Err(TiffError::FileTooSmall {
            required: TIFF_HEADER_SIZE as u64,
            actual: reader.size(),
        }
        .into());
    }

    let header_len = (BIGTIFF_HEADER_SIZE as u64).min(reader.size()) as usize;
    let header_bytes = reader.read_exact_at(0, header_len).await?;
    let header = TiffHeader::parse(&header_bytes, reader.size())?;

    let ifd = read_first_ifd(reader, &header).await?;

    if ifd.get_entry_by_tag(TiffTag::NdpiFormatFlag).is_some() {
        return Ok(SlideFormat::HamamatsuNdpi);
    }

    if let Some(description) = read_image_description_prefix(reader, &ifd, &header).await? {
        if has_aperio_marker(&description) {
            return Ok(SlideFormat::AperioSvs);
        }
    }

    Ok(SlideFormat::Unsupported)
}

/// Verify that TIFF content matches the format its extension claims.
pub async fn verify_tiff_format<R: RangeReader>(
    reader: &R,
    claimed: SlideFormat,
) -> Result<(), FormatError> {
    let detected = detect_format(reader).await?;
    if detected == claimed {
        Ok(())
    } else {
        Err(FormatError::unsupported(format!(
            "{} does not look like {} (content: {})",
            reader.identifier(),
            claimed.name(),
            detected.name()
        )))
    }
}

async fn read_first_ifd<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
) -> Result<Ifd, FormatError> {
    let count_size = header.ifd_count_size();
    let count_bytes = reader
        .read_exact_at(header.first_ifd_offset, count_size)
        .await?;

    let entry_count = if header.is_bigtiff {
        header.byte_order.read_u64(&count_bytes)
    } else {
        header.byte_order.read_u16(&count_bytes) as u64
    };

    let ifd_size = Ifd::calculate_size(entry_count, header);
    let ifd_bytes = reader
        .read_exact_at(header.first_ifd_offset, ifd_size)
        .await?;
    Ok(Ifd::parse(&ifd_bytes, header)?)
}

/// Read at most [`MAX_DESCRIPTION_BYTES`] of the ImageDescription tag.
async fn read_image_description_prefix<R: RangeReader>(
    reader: &R,
    ifd: &Ifd,
    header: &TiffHeader,
) -> Result<Option<Vec<u8>>, FormatError> {
    let entry = match ifd.get_entry_by_tag(TiffTag::ImageDescription) {
        Some(e) => e,
        None => return Ok(None),
    };

    let read_len = (entry.count as usize).min(MAX_DESCRIPTION_BYTES);
    if read_len == 0 {
        return Ok(None);
    }

    let bytes = if entry.is_inline {
        entry.value_offset_bytes[..read_len.min(entry.value_offset_bytes.len())].to_vec()
    } else {
        let offset = entry.value_offset(header.byte_order);
        reader.read_exact_at(offset, read_len).await?.to_vec()
    };

    Ok(Some(bytes))
}

/// Check if an ImageDescription starts with the Aperio marker.
pub(crate) fn has_aperio_marker(description: &[u8]) -> bool {
    description.starts_with(APERIO_MARKER)
}

/// Check if bytes represent a valid TIFF header.
///
/// This is a quick check that can be used before attempting full parsing.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let byte_order = match &bytes[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return false,
    };

    let version = byte_order.read_u16(&bytes[2..4]);
    version == 42 || version == 43
}

// =============================================================================
// Tests
// =============================================================================
