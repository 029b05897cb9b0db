//! Removing identifying images from a staged slide.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::error::RedactionError;
use crate::format::{mrxs, ndpi, svs, SlideFormat};

/// Rewrites a slide file in place so its identifying images are gone.
///
/// Implementations must reject files they do not understand rather than
/// succeed without doing anything.
#[async_trait]
pub trait Redactor: Send + Sync {
    async fn redact(&self, path: &Path) -> Result<(), RedactionError>;
}

/// Redactor dispatching on the file extension to the SVS, NDPI, and MRXS
/// rewriters in [`crate::format`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatRedactor;

#[async_trait]
impl Redactor for FormatRedactor {
    async fn redact(&self, path: &Path) -> Result<(), RedactionError> {
        let format = SlideFormat::from_path(path);
        let removed = match format {
            SlideFormat::AperioSvs => svs::redact(path).await?,
            SlideFormat::HamamatsuNdpi => ndpi::redact(path).await?,
            SlideFormat::Mirax => mrxs::redact(path).await?,
            SlideFormat::Unsupported => {
                return Err(RedactionError::Unsupported {
                    reason: format!("{} is not a recognized slide file", path.display()),
                })
            }
        };

        let removed: Vec<&str> = removed.iter().map(|kind| kind.name()).collect();
        info!(
            path = %path.display(),
            format = format.name(),
            removed = ?removed,
            "Redacted slide"
        );
        Ok(())
    }
}
