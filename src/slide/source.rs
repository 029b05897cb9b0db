//! Slides found in a source folder.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::BatchError;
use crate::format::{mrxs, SlideFormat};

/// A slide file as enumerated, before anything is read from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideRef {
    path: PathBuf,
    file_name: String,
    format: SlideFormat,
}

impl SlideRef {
    /// Describe the file at `path`, classified by extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let format = SlideFormat::from_path(&path);
        Self {
            path,
            file_name,
            format,
        }
    }

    /// Absolute path of the original file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name with extension.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn format(&self) -> SlideFormat {
        self.format
    }

    /// The MRXS data directory that travels with this file.
    pub fn companion_dir(&self) -> Option<PathBuf> {
        match self.format {
            SlideFormat::Mirax => Some(mrxs::companion_dir(&self.path)),
            _ => None,
        }
    }
}

/// List the slides directly inside `folder`, sorted by file name.
///
/// Only regular files with a recognized extension are returned.
/// Subdirectories (including MRXS data directories) are not descended into.
pub async fn enumerate_slides(folder: &Path) -> Result<Vec<SlideRef>, BatchError> {
    match tokio::fs::metadata(folder).await {
        Ok(metadata) if metadata.is_dir() => {}
        _ => return Err(BatchError::SourceNotFound(folder.to_path_buf())),
    }

    let enumerate_error = |source| BatchError::Enumerate {
        path: folder.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(folder).await.map_err(enumerate_error)?;
    let mut slides = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(enumerate_error)? {
        let path = entry.path();
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }

        let slide = SlideRef::new(path);
        if slide.format().is_supported() {
            slides.push(slide);
        } else {
            debug!(file = slide.file_name(), "Skipping unrecognized file");
        }
    }

    slides.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(slides)
}
