//! Hamamatsu NDPI support.
//!
//! NDPI files are TIFF-like: the first directory carries the private tag
//! 65420, and every directory records the objective it was scanned with in
//! SourceLens (tag 65421). The macro photo of the whole glass slide has a
//! SourceLens of `-1`. There is no separate label directory; the label is
//! part of the macro.
//!
//! NDPI files larger than 4 GiB store the high bits of their offsets out of
//! band. Those are not handled here: offsets are read as classic TIFF and
//! such a file fails to parse.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::{FormatError, RedactionError};
use crate::io::{LocalFile, RangeReader};
use crate::slide::{AssociatedImage, CapturedImagery, ImageKind};

use super::detect::{verify_tiff_format, SlideFormat};
use super::tiff::{
    capture_directory_image, erase_directory, Directory, TiffDirectoryChain, TiffHeader, TiffTag,
    ValueReader,
};

/// SourceLens value that marks the macro image.
const MACRO_SOURCE_LENS: f64 = -1.0;

/// ASCII tags of the first directory exposed as `tiff.*` properties.
const TIFF_PROPERTY_TAGS: [TiffTag; 5] = [
    TiffTag::ImageDescription,
    TiffTag::Make,
    TiffTag::Model,
    TiffTag::Software,
    TiffTag::DateTime,
];

// =============================================================================
// NdpiSlide
// =============================================================================

/// An opened NDPI file.
#[derive(Debug, Clone)]
pub struct NdpiSlide {
    chain: TiffDirectoryChain,
    /// SourceLens per directory, in chain order
    source_lens: Vec<Option<f64>>,
    macro_image: Option<usize>,
}

impl NdpiSlide {
    /// Open an NDPI file.
    ///
    /// Fails with [`FormatError::UnsupportedFormat`] if the first directory
    /// lacks the NDPI marker tag.
    pub async fn open<R: RangeReader>(reader: &R) -> Result<Self, FormatError> {
        verify_tiff_format(reader, SlideFormat::HamamatsuNdpi).await?;
        let chain = TiffDirectoryChain::read(reader).await?;
        let values = ValueReader::new(reader, &chain.header);

        let mut source_lens = Vec::with_capacity(chain.len());
        for directory in &chain.directories {
            let lens = match directory.ifd.get_entry_by_tag(TiffTag::NdpiSourceLens) {
                Some(entry) => Some(values.read_f64(entry).await?),
                None => None,
            };
            source_lens.push(lens);
        }

        let macro_image = source_lens
            .iter()
            .position(|lens| *lens == Some(MACRO_SOURCE_LENS));

        Ok(Self {
            chain,
            source_lens,
            macro_image,
        })
    }

    pub fn header(&self) -> &TiffHeader {
        &self.chain.header
    }

    pub fn directory_count(&self) -> usize {
        self.chain.len()
    }

    /// The macro directory, if present.
    pub fn macro_directory(&self) -> Option<&Directory> {
        self.chain.get(self.macro_image?)
    }

    /// Read the macro image, if present.
    pub async fn read_macro<R: RangeReader>(
        &self,
        reader: &R,
    ) -> Result<Option<AssociatedImage>, FormatError> {
        match self.macro_directory() {
            Some(directory) => Ok(Some(
                capture_directory_image(reader, self.header(), directory, ImageKind::Macro).await?,
            )),
            None => Ok(None),
        }
    }

    /// `hamamatsu.*` and `tiff.*` properties.
    pub async fn properties<R: RangeReader>(
        &self,
        reader: &R,
    ) -> Result<BTreeMap<String, String>, FormatError> {
        let mut properties = BTreeMap::new();

        if let Some(first) = self.chain.first() {
            for tag in TIFF_PROPERTY_TAGS {
                if let Some(value) = first.read_ascii(reader, self.header(), tag).await? {
                    properties.insert(format!("tiff.{}", tag.name()), value);
                }
            }
        }

        if let Some(Some(lens)) = self.source_lens.first() {
            properties.insert("hamamatsu.SourceLens".to_string(), lens.to_string());
        }
        for (index, lens) in self.source_lens.iter().enumerate() {
            if let Some(lens) = lens {
                properties.insert(
                    format!("hamamatsu.directory[{}].SourceLens", index),
                    lens.to_string(),
                );
            }
        }

        Ok(properties)
    }
}

// =============================================================================
// Capture / Redaction
// =============================================================================

/// Capture the macro and properties of an NDPI file.
pub async fn capture(path: &Path) -> Result<CapturedImagery, FormatError> {
    let file = LocalFile::open(path).await?;
    let slide = NdpiSlide::open(&file).await?;

    Ok(CapturedImagery {
        label: None,
        macro_image: slide.read_macro(&file).await?,
        properties: slide.properties(&file).await?,
    })
}

/// Remove the macro image from an NDPI file in place.
pub async fn redact(path: &Path) -> Result<Vec<ImageKind>, RedactionError> {
    let file = LocalFile::open_writable(path).await?;
    let slide = NdpiSlide::open(&file).await?;

    let directory = slide
        .macro_directory()
        .ok_or(RedactionError::NothingToRedact {
            what: "macro image",
        })?;
    let zeroed = erase_directory(&file, slide.header(), directory).await?;
    debug!(
        path = %path.display(),
        directory = directory.index,
        zeroed,
        "Erased NDPI macro directory"
    );
    file.sync().await?;
    drop(file);

    let reopened = LocalFile::open(path).await?;
    if NdpiSlide::open(&reopened).await?.macro_directory().is_some() {
        return Err(RedactionError::Verification(format!(
            "macro image is still linked in {}",
            path.display()
        )));
    }

    Ok(vec![ImageKind::Macro])
}

// =============================================================================
// Tests
// =============================================================================
