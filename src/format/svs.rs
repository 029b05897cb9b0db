//! Aperio SVS support.
//!
//! SVS files are TIFF files containing:
//! - **Pyramid levels**: Full resolution image and progressively smaller versions
//! - **Thumbnail**: Small preview image
//! - **Label image**: Photo of the slide label, usually LZW-compressed
//! - **Macro image**: Overview of the entire slide, usually one JPEG strip
//!
//! Every directory carries an ImageDescription. The first one starts with
//! `Aperio` and holds the slide metadata; label and macro directories are
//! recognized by the second line of theirs:
//!
//! ```text
//! Aperio Image Library v10.0.50
//! label 387x463
//! ```
//!
//! Redaction zeroes the label and macro data and unlinks both directories.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::{FormatError, RedactionError};
use crate::io::{LocalFile, RangeReader};
use crate::slide::{AssociatedImage, CapturedImagery, ImageKind};

use super::detect::{verify_tiff_format, SlideFormat};
use super::tiff::{
    capture_directory_image, erase_directory, Directory, TiffDirectoryChain, TiffHeader,
};

// =============================================================================
// SVS Metadata
// =============================================================================

/// Metadata parsed from the first ImageDescription.
#[derive(Debug, Clone, Default)]
pub struct SvsMetadata {
    /// Microns per pixel (resolution)
    pub mpp: Option<f64>,

    /// Objective magnification (e.g., 20, 40)
    pub magnification: Option<f64>,

    /// Full ImageDescription string
    pub image_description: String,

    /// `key = value` pairs after the header segment
    pub properties: BTreeMap<String, String>,
}

impl SvsMetadata {
    /// Parse metadata from an ImageDescription string.
    ///
    /// SVS ImageDescription format:
    /// ```text
    /// Aperio Image Library vXX.X.X
    /// width x height (tile size) JPEG/RGB Q=70|AppMag = 20|MPP = 0.5|...
    /// ```
    ///
    /// The segment before the first `|` is the header and is not split;
    /// every later segment is a `key = value` pair.
    pub fn parse(description: &str) -> Self {
        let mut metadata = SvsMetadata {
            image_description: description.to_string(),
            ..Default::default()
        };

        for part in description.split('|').skip(1) {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                continue;
            }

            match key {
                "MPP" => metadata.mpp = value.parse().ok(),
                "AppMag" => metadata.magnification = value.parse().ok(),
                _ => {}
            }
            metadata
                .properties
                .insert(key.to_string(), value.to_string());
        }

        metadata
    }

    /// Flatten into the `aperio.*` / `tiff.*` property namespace.
    pub fn to_properties(&self) -> BTreeMap<String, String> {
        let mut properties: BTreeMap<String, String> = self
            .properties
            .iter()
            .map(|(k, v)| (format!("aperio.{}", k), v.clone()))
            .collect();
        properties.insert(
            "tiff.ImageDescription".to_string(),
            self.image_description.clone(),
        );
        properties
    }
}

/// Which associated image a directory's description announces, if any.
fn classify_description(description: &str) -> Option<ImageKind> {
    let second_line = description.lines().nth(1)?.trim_start();
    if second_line.starts_with("label") {
        Some(ImageKind::Label)
    } else if second_line.starts_with("macro") {
        Some(ImageKind::Macro)
    } else {
        None
    }
}

// =============================================================================
// SvsSlide
// =============================================================================

/// An opened SVS file: its directory chain and where the label and macro are.
#[derive(Debug, Clone)]
pub struct SvsSlide {
    chain: TiffDirectoryChain,
    metadata: SvsMetadata,
    label: Option<usize>,
    macro_image: Option<usize>,
}

impl SvsSlide {
    /// Open an SVS file.
    ///
    /// Fails with [`FormatError::UnsupportedFormat`] if the first
    /// ImageDescription does not start with `Aperio`.
    pub async fn open<R: RangeReader>(reader: &R) -> Result<Self, FormatError> {
        verify_tiff_format(reader, SlideFormat::AperioSvs).await?;
        let chain = TiffDirectoryChain::read(reader).await?;

        let description = match chain.first() {
            Some(first) => first
                .image_description(reader, &chain.header)
                .await?
                .unwrap_or_default(),
            None => String::new(),
        };
        let metadata = SvsMetadata::parse(&description);

        let mut label = None;
        let mut macro_image = None;
        for directory in chain.directories.iter().skip(1) {
            let Some(description) = directory.image_description(reader, &chain.header).await?
            else {
                continue;
            };
            match classify_description(&description) {
                Some(ImageKind::Label) if label.is_none() => label = Some(directory.index),
                Some(ImageKind::Macro) if macro_image.is_none() => {
                    macro_image = Some(directory.index)
                }
                _ => {}
            }
        }

        Ok(Self {
            chain,
            metadata,
            label,
            macro_image,
        })
    }

    pub fn header(&self) -> &TiffHeader {
        &self.chain.header
    }

    pub fn metadata(&self) -> &SvsMetadata {
        &self.metadata
    }

    /// Number of directories still linked in the chain.
    pub fn directory_count(&self) -> usize {
        self.chain.len()
    }

    /// The directory holding an associated image.
    pub fn directory(&self, kind: ImageKind) -> Option<&Directory> {
        let index = match kind {
            ImageKind::Label => self.label,
            ImageKind::Macro => self.macro_image,
        }?;
        self.chain.get(index)
    }

    /// Read an associated image, if the slide has one.
    pub async fn read_associated<R: RangeReader>(
        &self,
        reader: &R,
        kind: ImageKind,
    ) -> Result<Option<AssociatedImage>, FormatError> {
        match self.directory(kind) {
            Some(directory) => Ok(Some(
                capture_directory_image(reader, self.header(), directory, kind).await?,
            )),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Capture / Redaction
// =============================================================================

/// Capture the label, macro, and properties of an SVS file.
pub async fn capture(path: &Path) -> Result<CapturedImagery, FormatError> {
    let file = LocalFile::open(path).await?;
    let slide = SvsSlide::open(&file).await?;

    Ok(CapturedImagery {
        label: slide.read_associated(&file, ImageKind::Label).await?,
        macro_image: slide.read_associated(&file, ImageKind::Macro).await?,
        properties: slide.metadata().to_properties(),
    })
}

/// Remove the label and macro from an SVS file in place.
///
/// Returns the images removed.
pub async fn redact(path: &Path) -> Result<Vec<ImageKind>, RedactionError> {
    let file = LocalFile::open_writable(path).await?;

    let mut removed = Vec::new();
    for kind in ImageKind::ALL {
        // Unlinking invalidates the parsed chain, so re-read it each time.
        let slide = SvsSlide::open(&file).await?;
        let Some(directory) = slide.directory(kind) else {
            continue;
        };
        let zeroed = erase_directory(&file, slide.header(), directory).await?;
        debug!(
            path = %path.display(),
            image = kind.name(),
            directory = directory.index,
            zeroed,
            "Erased SVS directory"
        );
        removed.push(kind);
    }

    if removed.is_empty() {
        return Err(RedactionError::NothingToRedact {
            what: "label or macro image",
        });
    }
    file.sync().await?;
    drop(file);

    let reopened = LocalFile::open(path).await?;
    let after = SvsSlide::open(&reopened).await?;
    if let Some(kind) = ImageKind::ALL
        .into_iter()
        .find(|kind| after.directory(*kind).is_some())
    {
        return Err(RedactionError::Verification(format!(
            "{} image is still linked in {}",
            kind.name(),
            path.display()
        )));
    }

    Ok(removed)
}

// =============================================================================
// Tests
// =============================================================================
