//! 3DHISTECH MRXS support.
//!
//! An MRXS slide is a small `.mrxs` stub next to a data directory with the
//! same stem:
//!
//! ```text
//! case.mrxs
//! case/Slidedat.ini
//! case/Index.dat
//! case/Data0000.dat ...
//! ```
//!
//! `Slidedat.ini` lists the non-hierarchical levels under `[HIERARCHICAL]`
//! (`NONHIER_<layer>_VAL_<level> = <name>`). The slide barcode photo is the
//! `ScanDataLayer_SlideBarcode` level of the `Scan data layer` layer; the
//! overview is `ScanDataLayer_SlidePreview`. Their bytes are found through
//! the `Index.dat` record table (see [`index`]).
//!
//! Redaction deletes the barcode level: its data is blanked, its index
//! record dropped, and the following levels of the layer renumbered.

mod index;
mod slidedat;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::error::{FormatError, RedactionError};
use crate::io::{LocalFile, RangeReader};
use crate::slide::{image_dimensions, AssociatedImage, CapturedImagery, ImageEncoding, ImageKind};

pub use index::{delete_record, locate_record, DataLocation, NONHIER_ROOT_OFFSET};
pub use slidedat::{Section, Slidedat};

pub const SLIDEDAT_FILE: &str = "Slidedat.ini";

const HIERARCHICAL: &str = "HIERARCHICAL";
const DATAFILE: &str = "DATAFILE";

/// Layer holding the barcode and preview levels.
pub const SCAN_DATA_LAYER: &str = "Scan data layer";
pub const BARCODE_LEVEL: &str = "ScanDataLayer_SlideBarcode";
pub const PREVIEW_LEVEL: &str = "ScanDataLayer_SlidePreview";

/// Data directory of an `.mrxs` file: the same path without the extension.
pub fn companion_dir(path: &Path) -> PathBuf {
    path.with_extension("")
}

// =============================================================================
// NonHierLevel
// =============================================================================

/// A non-hierarchical level listed in `Slidedat.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonHierLevel {
    /// Record number in `Index.dat`, counted across all layers
    pub record: usize,
    pub layer_id: usize,
    pub layer_name: String,
    pub name: String,
    /// Section holding the level's own settings
    pub section: String,
    /// `NONHIER_<layer>_VAL_<level>`
    pub key_prefix: String,
}

fn read_levels(dat: &Slidedat) -> Result<Vec<NonHierLevel>, FormatError> {
    let layer_count = dat.require_count(HIERARCHICAL, "NONHIER_COUNT")?;

    let mut levels = Vec::new();
    for layer_id in 0..layer_count {
        let layer_name = dat.require(HIERARCHICAL, &format!("NONHIER_{}_NAME", layer_id))?;
        let level_count = dat.require_count(HIERARCHICAL, &format!("NONHIER_{}_COUNT", layer_id))?;

        for level_id in 0..level_count {
            let key_prefix = format!("NONHIER_{}_VAL_{}", layer_id, level_id);
            levels.push(NonHierLevel {
                record: levels.len(),
                layer_id,
                layer_name: layer_name.to_string(),
                name: dat.require(HIERARCHICAL, &key_prefix)?.to_string(),
                section: dat
                    .require(HIERARCHICAL, &format!("{}_SECTION", key_prefix))?
                    .to_string(),
                key_prefix,
            });
        }
    }
    Ok(levels)
}

// =============================================================================
// MrxsSlide
// =============================================================================

/// An opened MRXS slide.
#[derive(Debug, Clone)]
pub struct MrxsSlide {
    slidedat_path: PathBuf,
    slidedat: Slidedat,
    index_path: PathBuf,
    data_files: Vec<PathBuf>,
    levels: Vec<NonHierLevel>,
}

impl MrxsSlide {
    /// Open the slide whose stub is at `path`.
    ///
    /// A missing `Slidedat.ini` makes the slide unsupported; a malformed one
    /// is an error.
    pub async fn open(path: &Path) -> Result<Self, FormatError> {
        let data_dir = companion_dir(path);
        let slidedat_path = data_dir.join(SLIDEDAT_FILE);

        let bytes = match tokio::fs::read(&slidedat_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FormatError::unsupported(format!(
                    "{} has no {}",
                    path.display(),
                    slidedat_path.display()
                )));
            }
            Err(e) => {
                return Err(crate::error::IoError::from_io(
                    slidedat_path.display().to_string(),
                    e,
                )
                .into())
            }
        };
        let slidedat = Slidedat::parse(&bytes)?;

        let index_path = data_dir.join(slidedat.require(HIERARCHICAL, "INDEXFILE")?);
        let file_count = slidedat.require_count(DATAFILE, "FILE_COUNT")?;
        let data_files = (0..file_count)
            .map(|i| {
                slidedat
                    .require(DATAFILE, &format!("FILE_{}", i))
                    .map(|name| data_dir.join(name))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let levels = read_levels(&slidedat)?;

        Ok(Self {
            slidedat_path,
            slidedat,
            index_path,
            data_files,
            levels,
        })
    }

    pub fn slidedat(&self) -> &Slidedat {
        &self.slidedat
    }

    pub fn levels(&self) -> &[NonHierLevel] {
        &self.levels
    }

    /// Find a level by layer and level name.
    pub fn level(&self, layer_name: &str, name: &str) -> Option<&NonHierLevel> {
        self.levels
            .iter()
            .find(|l| l.layer_name == layer_name && l.name == name)
    }

    /// The level holding an associated image.
    pub fn associated_level(&self, kind: ImageKind) -> Option<&NonHierLevel> {
        let name = match kind {
            ImageKind::Label => BARCODE_LEVEL,
            ImageKind::Macro => PREVIEW_LEVEL,
        };
        self.level(SCAN_DATA_LAYER, name)
    }

    async fn data_location(&self, level: &NonHierLevel) -> Result<(PathBuf, DataLocation), FormatError> {
        let index = LocalFile::open(&self.index_path).await?;
        let location = locate_record(&index, level.record).await?;
        let path = self
            .data_files
            .get(location.file_number)
            .ok_or_else(|| {
                FormatError::mrxs(format!(
                    "level {} points at data file {}, only {} listed",
                    level.name,
                    location.file_number,
                    self.data_files.len()
                ))
            })?
            .clone();
        Ok((path, location))
    }

    /// Read the raw bytes stored for a level.
    pub async fn read_level(&self, level: &NonHierLevel) -> Result<Bytes, FormatError> {
        let (path, location) = self.data_location(level).await?;
        let data = LocalFile::open(&path).await?;
        Ok(data
            .read_exact_at(location.position, location.size as usize)
            .await?)
    }

    /// Read an associated image, if the slide has one.
    pub async fn read_associated(
        &self,
        kind: ImageKind,
    ) -> Result<Option<AssociatedImage>, FormatError> {
        let Some(level) = self.associated_level(kind) else {
            return Ok(None);
        };
        let data = self.read_level(level).await?;
        Ok(Some(AssociatedImage::new(
            kind,
            image_dimensions(&data),
            ImageEncoding::sniff(&data),
            data,
        )))
    }

    /// Every `Slidedat.ini` value as `mirax.<SECTION>.<KEY>`.
    pub fn properties(&self) -> BTreeMap<String, String> {
        self.slidedat
            .sections()
            .iter()
            .flat_map(|section| {
                section.entries.iter().map(move |(key, value)| {
                    (format!("mirax.{}.{}", section.name, key), value.clone())
                })
            })
            .collect()
    }

    fn hier_keys_for_level(&self, level: &NonHierLevel) -> Vec<String> {
        let nested = format!("{}_", level.key_prefix);
        self.slidedat
            .keys(HIERARCHICAL)
            .into_iter()
            .filter(|k| *k == level.key_prefix || k.starts_with(&nested))
            .collect()
    }

    /// Delete a non-hierarchical level in place.
    pub async fn delete_level(&mut self, layer_name: &str, name: &str) -> Result<(), FormatError> {
        let level = self
            .level(layer_name, name)
            .cloned()
            .ok_or_else(|| FormatError::mrxs(format!("no level {} in {}", name, layer_name)))?;

        // Blank the image data, or cut it off when it ends the file.
        let (data_path, location) = self.data_location(&level).await?;
        let data = LocalFile::open_writable(&data_path).await?;
        if data.size() == location.position + location.size {
            data.truncate(location.position).await?;
        } else {
            data.zero_range(location.position, location.size).await?;
        }
        data.sync().await?;

        let index = LocalFile::open_writable(&self.index_path).await?;
        delete_record(&index, level.record).await?;
        index.sync().await?;

        for key in self.hier_keys_for_level(&level) {
            self.slidedat.remove_key(HIERARCHICAL, &key);
        }
        self.slidedat.remove_section(&level.section);

        // Later levels of the same layer move down one slot.
        let mut previous = level.clone();
        let following: Vec<NonHierLevel> = self.levels[level.record + 1..]
            .iter()
            .take_while(|l| l.layer_id == level.layer_id)
            .cloned()
            .collect();
        for current in following {
            for key in self.hier_keys_for_level(&current) {
                let renamed = key.replacen(&current.key_prefix, &previous.key_prefix, 1);
                self.slidedat.rename_key(HIERARCHICAL, &key, &renamed);
            }
            self.slidedat
                .rename_section(&current.section, &previous.section);
            self.slidedat.set(
                HIERARCHICAL,
                &format!("{}_SECTION", previous.key_prefix),
                previous.section.clone(),
            );
            previous = current;
        }

        let count_key = format!("NONHIER_{}_COUNT", level.layer_id);
        let count = self.slidedat.require_count(HIERARCHICAL, &count_key)?;
        self.slidedat
            .set(HIERARCHICAL, &count_key, count.saturating_sub(1).to_string());

        tokio::fs::write(&self.slidedat_path, self.slidedat.to_bytes())
            .await
            .map_err(|e| {
                crate::error::IoError::from_io(self.slidedat_path.display().to_string(), e)
            })?;

        self.levels = read_levels(&self.slidedat)?;
        Ok(())
    }
}

// =============================================================================
// Capture / Redaction
// =============================================================================

/// Capture the barcode, preview, and properties of an MRXS slide.
pub async fn capture(path: &Path) -> Result<CapturedImagery, FormatError> {
    let slide = MrxsSlide::open(path).await?;

    Ok(CapturedImagery {
        label: slide.read_associated(ImageKind::Label).await?,
        macro_image: slide.read_associated(ImageKind::Macro).await?,
        properties: slide.properties(),
    })
}

/// Remove the slide barcode level of an MRXS slide in place.
pub async fn redact(path: &Path) -> Result<Vec<ImageKind>, RedactionError> {
    let mut slide = MrxsSlide::open(path).await?;
    if slide.associated_level(ImageKind::Label).is_none() {
        return Err(RedactionError::NothingToRedact {
            what: "slide barcode level",
        });
    }

    slide.delete_level(SCAN_DATA_LAYER, BARCODE_LEVEL).await?;
    debug!(path = %path.display(), level = BARCODE_LEVEL, "Deleted MRXS level");

    let after = MrxsSlide::open(path).await?;
    if after.associated_level(ImageKind::Label).is_some() {
        return Err(RedactionError::Verification(format!(
            "{} is still listed in {}",
            BARCODE_LEVEL,
            path.display()
        )));
    }

    Ok(vec![ImageKind::Label])
}

// =============================================================================
// Tests
// =============================================================================
