//! In-place directory removal.
//!
//! A directory is removed by zeroing the strips or tiles it points at and
//! rewriting the pointer that links to it so the chain skips over it. The
//! file keeps its size; the orphaned directory entries stay behind but
//! describe nothing but zeros.

use crate::error::TiffError;
use crate::io::LocalFile;

use super::directory::Directory;
use super::parser::TiffHeader;

/// Overwrite a directory's image data with zeros and drop it from the chain.
///
/// Returns the number of bytes zeroed. The caller must re-read the chain
/// before removing another directory: the parsed link positions of later
/// directories are stale once this one is unlinked.
pub async fn erase_directory(
    file: &LocalFile,
    header: &TiffHeader,
    directory: &Directory,
) -> Result<u64, TiffError> {
    let segments = directory.data_segments(file, header).await?;

    let mut zeroed = 0;
    for segment in segments.iter().filter(|s| s.length > 0) {
        file.zero_range(segment.offset, segment.length).await?;
        zeroed += segment.length;
    }

    unlink_directory(file, header, directory).await?;
    Ok(zeroed)
}

/// Point the link that references `directory` at the directory after it.
pub async fn unlink_directory(
    file: &LocalFile,
    header: &TiffHeader,
    directory: &Directory,
) -> Result<(), TiffError> {
    let pointer = header.encode_offset(directory.ifd.next_ifd_offset);
    file.write_at(directory.link_position, &pointer).await?;
    Ok(())
}
