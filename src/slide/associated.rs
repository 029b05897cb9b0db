//! Associated images (label, macro) captured from a slide.

use bytes::Bytes;
use serde::Serialize;

use crate::format::is_tiff_header;

/// Which associated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// Photo of the slide label (barcode, accession number, patient name)
    Label,
    /// Low-magnification overview of the whole glass slide, label included
    Macro,
}

impl ImageKind {
    pub const ALL: [ImageKind; 2] = [ImageKind::Label, ImageKind::Macro];

    pub const fn name(self) -> &'static str {
        match self {
            ImageKind::Label => "label",
            ImageKind::Macro => "macro",
        }
    }
}

/// Container the captured bytes are in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Jpeg,
    Png,
    Bmp,
    Tiff,
    Unknown,
}

impl ImageEncoding {
    /// Guess the encoding from magic bytes.
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(&[0xFF, 0xD8]) {
            ImageEncoding::Jpeg
        } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
            ImageEncoding::Png
        } else if data.starts_with(b"BM") {
            ImageEncoding::Bmp
        } else if is_tiff_header(data) {
            ImageEncoding::Tiff
        } else {
            ImageEncoding::Unknown
        }
    }

    /// File extension used when the bytes are stored as-is.
    pub const fn extension(self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "jpg",
            ImageEncoding::Png => "png",
            ImageEncoding::Bmp => "bmp",
            ImageEncoding::Tiff => "tif",
            ImageEncoding::Unknown => "bin",
        }
    }
}

/// Read pixel dimensions from an image header without decoding it.
///
/// Returns `None` for formats the `image` crate does not recognize.
pub fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(std::io::Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// An associated image exactly as captured, before redaction.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociatedImage {
    pub kind: ImageKind,
    /// Pixel dimensions, when the container declares them
    pub dimensions: Option<(u32, u32)>,
    pub encoding: ImageEncoding,
    pub data: Bytes,
}

impl AssociatedImage {
    pub fn new(
        kind: ImageKind,
        dimensions: Option<(u32, u32)>,
        encoding: ImageEncoding,
        data: Bytes,
    ) -> Self {
        Self {
            kind,
            dimensions,
            encoding,
            data,
        }
    }

    /// Size of the captured bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
