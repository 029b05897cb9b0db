//! Walking the IFD chain.
//!
//! Every directory remembers where it sits in the file and where the pointer
//! that links to it sits (the header's first-IFD field or the previous
//! directory's next-IFD field). That is what lets a redactor drop a directory
//! from the chain by rewriting a single pointer.

use std::collections::HashSet;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
use super::tags::{Compression, TiffTag};
use super::values::ValueReader;

/// Longest chain we accept before assuming the file is corrupt.
pub const MAX_DIRECTORIES: usize = 256;

// =============================================================================
// DataSegment
// =============================================================================

/// One strip or tile of image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSegment {
    pub offset: u64,
    pub length: u64,
}

// =============================================================================
// Directory
// =============================================================================

/// A directory together with its position in the chain.
#[derive(Debug, Clone)]
pub struct Directory {
    /// Position in the chain, starting at 0
    pub index: usize,

    /// File offset of the directory
    pub offset: u64,

    /// File offset of the pointer that links to this directory
    pub link_position: u64,

    /// Parsed entries
    pub ifd: Ifd,
}

impl Directory {
    /// File offset of this directory's own next-IFD field.
    pub fn next_pointer_position(&self, header: &TiffHeader) -> u64 {
        self.offset
            + header.ifd_count_size() as u64
            + self.ifd.entries.len() as u64 * header.ifd_entry_size() as u64
    }

    /// Width and height, when both are stored inline.
    pub fn dimensions(&self, byte_order: ByteOrder) -> Option<(u32, u32)> {
        Some((
            self.ifd.image_width(byte_order)?,
            self.ifd.image_height(byte_order)?,
        ))
    }

    /// Compression scheme, if declared and known.
    pub fn compression(&self, byte_order: ByteOrder) -> Option<Compression> {
        self.ifd
            .compression(byte_order)
            .and_then(Compression::from_u16)
    }

    /// Read the ImageDescription string, if present.
    pub async fn image_description<R: RangeReader>(
        &self,
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Option<String>, TiffError> {
        self.read_ascii(reader, header, TiffTag::ImageDescription)
            .await
    }

    /// Read any ASCII tag, if present.
    pub async fn read_ascii<R: RangeReader>(
        &self,
        reader: &R,
        header: &TiffHeader,
        tag: TiffTag,
    ) -> Result<Option<String>, TiffError> {
        match self.ifd.get_entry_by_tag(tag) {
            Some(entry) => {
                let values = ValueReader::new(reader, header);
                Ok(Some(values.read_string(entry).await?))
            }
            None => Ok(None),
        }
    }

    /// Locate the strips or tiles holding this directory's image data.
    pub async fn data_segments<R: RangeReader>(
        &self,
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<DataSegment>, TiffError> {
        let (offsets_tag, counts_tag) = if self.ifd.is_tiled() {
            (TiffTag::TileOffsets, TiffTag::TileByteCounts)
        } else {
            (TiffTag::StripOffsets, TiffTag::StripByteCounts)
        };

        let Some(offsets_entry) = self.ifd.get_entry_by_tag(offsets_tag) else {
            return Ok(Vec::new());
        };
        let counts_entry = self
            .ifd
            .get_entry_by_tag(counts_tag)
            .ok_or(TiffError::MissingTag(counts_tag.name()))?;

        let values = ValueReader::new(reader, header);
        let offsets = values.read_u64_array(offsets_entry).await?;
        let counts = values.read_u64_array(counts_entry).await?;

        if offsets.len() != counts.len() {
            return Err(TiffError::InvalidTagValue {
                tag: counts_tag.name(),
                message: format!(
                    "{} offsets but {} byte counts",
                    offsets.len(),
                    counts.len()
                ),
            });
        }

        Ok(offsets
            .into_iter()
            .zip(counts)
            .map(|(offset, length)| DataSegment { offset, length })
            .collect())
    }
}

// =============================================================================
// TiffDirectoryChain
// =============================================================================

/// The header and every directory reachable from it, in chain order.
#[derive(Debug, Clone)]
pub struct TiffDirectoryChain {
    pub header: TiffHeader,
    pub directories: Vec<Directory>,
}

impl TiffDirectoryChain {
    /// Parse the header and follow the next-IFD chain to its end.
    ///
    /// Fails on loops and on chains longer than [`MAX_DIRECTORIES`].
    pub async fn read<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let size = reader.size();
        if size < TIFF_HEADER_SIZE as u64 {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: size,
            });
        }

        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, size)?;

        let mut directories: Vec<Directory> = Vec::new();
        let mut visited = HashSet::new();
        let mut offset = header.first_ifd_offset;
        let mut link_position = header.first_ifd_pointer_position();

        while offset != 0 {
            if directories.len() >= MAX_DIRECTORIES {
                return Err(TiffError::TooManyDirectories(MAX_DIRECTORIES));
            }
            if !visited.insert(offset) {
                return Err(TiffError::DirectoryCycle(offset));
            }
            if offset >= size {
                return Err(TiffError::InvalidIfdOffset(offset));
            }

            let count_size = header.ifd_count_size();
            let count_bytes = reader.read_exact_at(offset, count_size).await?;
            let entry_count = if header.is_bigtiff {
                header.byte_order.read_u64(&count_bytes)
            } else {
                header.byte_order.read_u16(&count_bytes) as u64
            };

            let ifd_size = Ifd::calculate_size(entry_count, &header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
            let ifd = Ifd::parse(&ifd_bytes, &header)?;

            let directory = Directory {
                index: directories.len(),
                offset,
                link_position,
                ifd,
            };
            link_position = directory.next_pointer_position(&header);
            offset = directory.ifd.next_ifd_offset;
            directories.push(directory);
        }

        Ok(Self {
            header,
            directories,
        })
    }

    /// Number of directories in the chain.
    pub fn len(&self) -> usize {
        self.directories.len()
    }

    /// Whether the chain has no directories.
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    /// Directory at `index`.
    pub fn get(&self, index: usize) -> Option<&Directory> {
        self.directories.get(index)
    }

    /// The first directory, which carries file-level metadata.
    pub fn first(&self) -> Option<&Directory> {
        self.directories.first()
    }
}
