//! Byte-for-byte copies into the destination folder.
//!
//! Copies are written under a hidden `.partial` name and renamed into place
//! once complete, so an interrupted or failed copy never leaves a file under
//! its final name. MRXS slides bring their data directory along, renamed to
//! the new stem.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::CopyError;
use crate::slide::SlideRef;

use super::identity::OutputIdentity;

/// A completed copy in the destination folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSlide {
    /// The copied slide file, under its new name
    pub path: PathBuf,
    /// The copied MRXS data directory
    pub companion_dir: Option<PathBuf>,
}

fn partial_path(destination: &Path, name: &str) -> PathBuf {
    destination.join(format!(".{}.partial", name))
}

/// Copy a slide (and its MRXS data directory) into `destination`.
pub async fn stage_slide(
    slide: &SlideRef,
    identity: &OutputIdentity,
    destination: &Path,
) -> Result<StagedSlide, CopyError> {
    let target = destination.join(&identity.new_filename);
    let partial = partial_path(destination, &identity.new_filename);

    let companion = match slide.companion_dir() {
        Some(source) => {
            let is_dir = tokio::fs::metadata(&source)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !is_dir {
                return Err(CopyError::MissingCompanion(source));
            }
            let stem = identity.new_stem();
            Some((
                source,
                partial_path(destination, stem),
                destination.join(stem),
            ))
        }
        None => None,
    };

    let result = copy_and_commit(slide.path(), &partial, &target, companion.as_ref()).await;
    if result.is_err() {
        discard(&partial).await;
        if let Some((_, partial_dir, _)) = &companion {
            discard(partial_dir).await;
        }
    }
    result?;

    debug!(
        file = slide.file_name(),
        target = %target.display(),
        "Staged copy"
    );
    Ok(StagedSlide {
        path: target,
        companion_dir: companion.map(|(_, _, target_dir)| target_dir),
    })
}

async fn copy_and_commit(
    source: &Path,
    partial: &Path,
    target: &Path,
    companion: Option<&(PathBuf, PathBuf, PathBuf)>,
) -> Result<(), CopyError> {
    tokio::fs::copy(source, partial)
        .await
        .map_err(|e| CopyError::io("copy", source, e))?;

    if let Some((source_dir, partial_dir, target_dir)) = companion {
        discard(partial_dir).await;
        let (from, to) = (source_dir.clone(), partial_dir.clone());
        tokio::task::spawn_blocking(move || copy_tree(&from, &to))
            .await
            .map_err(|e| {
                CopyError::io("copy directory", source_dir, std::io::Error::other(e.to_string()))
            })??;

        if tokio::fs::metadata(target_dir).await.is_ok() {
            tokio::fs::remove_dir_all(target_dir)
                .await
                .map_err(|e| CopyError::io("replace directory", target_dir, e))?;
        }
        tokio::fs::rename(partial_dir, target_dir)
            .await
            .map_err(|e| CopyError::io("rename", partial_dir, e))?;
    }

    if let Err(e) = tokio::fs::rename(partial, target).await {
        // The data directory is already under its final name.
        if let Some((_, _, target_dir)) = companion {
            discard(target_dir).await;
        }
        return Err(CopyError::io("rename", partial, e));
    }
    Ok(())
}

/// Recursively copy a directory. Runs on the blocking pool.
fn copy_tree(source: &Path, target: &Path) -> Result<(), CopyError> {
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.map_err(|e| CopyError::Walk {
            path: source.to_path_buf(),
            source: e,
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)
                .map_err(|e| CopyError::io("create directory", &destination, e))?;
        } else {
            std::fs::copy(entry.path(), &destination)
                .map_err(|e| CopyError::io("copy", entry.path(), e))?;
        }
    }
    Ok(())
}

/// Remove a leftover partial file or directory, if any.
async fn discard(path: &Path) {
    let result = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(_) => return,
    };
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "Failed to remove partial copy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(slide: &SlideRef, new_filename: &str) -> OutputIdentity {
        OutputIdentity {
            new_filename: new_filename.to_string(),
            pseudonymized: true,
            source: slide.clone(),
        }
    }

    async fn entries(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        let mut read = tokio::fs::read_dir(dir).await.unwrap();
        while let Some(entry) = read.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_stage_single_file() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        let path = source.path().join("Patient.svs");
        tokio::fs::write(&path, b"slide bytes").await.unwrap();

        let slide = SlideRef::new(&path);
        let staged = stage_slide(&slide, &identity(&slide, "abc.svs"), destination.path())
            .await
            .unwrap();

        assert_eq!(staged.path, destination.path().join("abc.svs"));
        assert_eq!(staged.companion_dir, None);
        assert_eq!(tokio::fs::read(&staged.path).await.unwrap(), b"slide bytes");
        assert_eq!(entries(destination.path()).await, vec!["abc.svs"]);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"slide bytes");
    }

    #[tokio::test]
    async fn test_stage_overwrites_previous_output() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        let path = source.path().join("a.ndpi");
        tokio::fs::write(&path, b"new").await.unwrap();
        tokio::fs::write(destination.path().join("a.ndpi"), b"old run")
            .await
            .unwrap();

        let slide = SlideRef::new(&path);
        let staged = stage_slide(&slide, &identity(&slide, "a.ndpi"), destination.path())
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&staged.path).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_stage_mrxs_renames_data_directory() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        let path = source.path().join("case.mrxs");
        tokio::fs::write(&path, b"stub").await.unwrap();
        let data = source.path().join("case");
        tokio::fs::create_dir_all(data.join("nested")).await.unwrap();
        tokio::fs::write(data.join("Slidedat.ini"), b"[GENERAL]").await.unwrap();
        tokio::fs::write(data.join("nested/Data0000.dat"), b"pixels").await.unwrap();

        let slide = SlideRef::new(&path);
        let staged = stage_slide(&slide, &identity(&slide, "f00d.mrxs"), destination.path())
            .await
            .unwrap();

        let copied = staged.companion_dir.unwrap();
        assert_eq!(copied, destination.path().join("f00d"));
        assert_eq!(
            tokio::fs::read(copied.join("nested/Data0000.dat")).await.unwrap(),
            b"pixels"
        );
        assert_eq!(entries(destination.path()).await, vec!["f00d", "f00d.mrxs"]);
    }

    #[tokio::test]
    async fn test_missing_companion_leaves_nothing() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        let path = source.path().join("case.mrxs");
        tokio::fs::write(&path, b"stub").await.unwrap();

        let slide = SlideRef::new(&path);
        let result = stage_slide(&slide, &identity(&slide, "x.mrxs"), destination.path()).await;

        assert!(matches!(result, Err(CopyError::MissingCompanion(_))));
        assert!(entries(destination.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_stub_commit_removes_data_directory() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        let path = source.path().join("case.mrxs");
        tokio::fs::write(&path, b"stub").await.unwrap();
        let data = source.path().join("case");
        tokio::fs::create_dir(&data).await.unwrap();
        tokio::fs::write(data.join("Data0000.dat"), b"barcode").await.unwrap();

        // A non-empty directory under the stub's name makes the final rename fail.
        let blocker = destination.path().join("x.mrxs");
        tokio::fs::create_dir(&blocker).await.unwrap();
        tokio::fs::write(blocker.join("keep"), b"").await.unwrap();

        let slide = SlideRef::new(&path);
        let result = stage_slide(&slide, &identity(&slide, "x.mrxs"), destination.path()).await;

        assert!(matches!(result, Err(CopyError::Io { operation: "rename", .. })));
        assert_eq!(entries(destination.path()).await, vec!["x.mrxs"]);
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_nothing() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();

        let slide = SlideRef::new(source.path().join("vanished.svs"));
        let result = stage_slide(&slide, &identity(&slide, "x.svs"), destination.path()).await;

        assert!(matches!(result, Err(CopyError::Io { operation: "copy", .. })));
        assert!(entries(destination.path()).await.is_empty());
    }
}
