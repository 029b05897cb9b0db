//! Capturing a slide's identifying content before it is redacted.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::InspectError;
use crate::format::{mrxs, ndpi, svs, SlideFormat};

use super::associated::{AssociatedImage, ImageKind};
use super::source::SlideRef;

/// Label, macro, and properties of a slide as found on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedImagery {
    pub label: Option<AssociatedImage>,
    pub macro_image: Option<AssociatedImage>,
    /// Vendor properties, keyed `<vendor>.<name>`
    pub properties: BTreeMap<String, String>,
}

impl CapturedImagery {
    pub fn image(&self, kind: ImageKind) -> Option<&AssociatedImage> {
        match kind {
            ImageKind::Label => self.label.as_ref(),
            ImageKind::Macro => self.macro_image.as_ref(),
        }
    }

    /// The images present, label first.
    pub fn images(&self) -> impl Iterator<Item = &AssociatedImage> {
        self.label.iter().chain(self.macro_image.iter())
    }
}

/// An opened slide.
///
/// Everything is read when the handle is created, so the handle stays valid
/// after the file it came from is modified.
#[derive(Debug, Clone)]
pub struct SlideHandle {
    slide: SlideRef,
    imagery: CapturedImagery,
}

impl SlideHandle {
    pub fn new(slide: SlideRef, imagery: CapturedImagery) -> Self {
        Self { slide, imagery }
    }

    pub fn slide(&self) -> &SlideRef {
        &self.slide
    }

    pub fn format(&self) -> SlideFormat {
        self.slide.format()
    }

    pub fn associated_image(&self, kind: ImageKind) -> Option<&AssociatedImage> {
        self.imagery.image(kind)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.imagery.properties
    }

    pub fn imagery(&self) -> &CapturedImagery {
        &self.imagery
    }

    pub fn into_imagery(self) -> CapturedImagery {
        self.imagery
    }
}

/// Opens slides and captures their associated images and properties.
#[async_trait]
pub trait SlideInspector: Send + Sync {
    /// Open a slide.
    ///
    /// Returns [`InspectError::Unsupported`] when the file is not a format
    /// we de-identify, and [`InspectError::Capture`] when it claims to be
    /// one but cannot be read.
    async fn open(&self, slide: &SlideRef) -> Result<SlideHandle, InspectError>;
}

/// Inspector backed by the SVS, NDPI, and MRXS readers in [`crate::format`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatInspector;

#[async_trait]
impl SlideInspector for FormatInspector {
    async fn open(&self, slide: &SlideRef) -> Result<SlideHandle, InspectError> {
        let imagery = match slide.format() {
            SlideFormat::AperioSvs => svs::capture(slide.path()).await?,
            SlideFormat::HamamatsuNdpi => ndpi::capture(slide.path()).await?,
            SlideFormat::Mirax => mrxs::capture(slide.path()).await?,
            SlideFormat::Unsupported => {
                return Err(InspectError::Unsupported {
                    reason: format!("{} is not a recognized slide file", slide.file_name()),
                })
            }
        };
        Ok(SlideHandle::new(slide.clone(), imagery))
    }
}
