//! Minimal classic TIFF writer.
//!
//! Used to package an associated image that is not a self-contained JPEG
//! (an LZW label, a multi-strip macro) as a standalone TIFF, so the audit
//! artifact keeps the original pixels byte-for-byte. Only classic TIFF is
//! produced; associated images are far below the 4 GiB limit.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::parser::ByteOrder;
use super::tags::{FieldType, TiffTag};

/// A tag value queued for writing.
#[derive(Debug, Clone)]
pub enum TagValue {
    Shorts(Vec<u16>),
    Longs(Vec<u32>),
    Ascii(String),
    Float(f32),
    /// Pre-encoded bytes, already in the writer's byte order
    Raw {
        field_type: FieldType,
        count: u64,
        bytes: Bytes,
    },
}

impl TagValue {
    fn encode(&self, byte_order: ByteOrder) -> (FieldType, u64, Vec<u8>) {
        match self {
            TagValue::Shorts(values) => (
                FieldType::Short,
                values.len() as u64,
                values
                    .iter()
                    .flat_map(|v| byte_order.encode_u16(*v))
                    .collect(),
            ),
            TagValue::Longs(values) => (
                FieldType::Long,
                values.len() as u64,
                values
                    .iter()
                    .flat_map(|v| byte_order.encode_u32(*v))
                    .collect(),
            ),
            TagValue::Ascii(text) => {
                let mut bytes = text.as_bytes().to_vec();
                bytes.push(0);
                (FieldType::Ascii, bytes.len() as u64, bytes)
            }
            TagValue::Float(value) => (
                FieldType::Float,
                1,
                byte_order.encode_u32(value.to_bits()).to_vec(),
            ),
            TagValue::Raw {
                field_type,
                count,
                bytes,
            } => (*field_type, *count, bytes.to_vec()),
        }
    }
}

// =============================================================================
// DirectoryBuilder
// =============================================================================

/// One directory: tags plus the strips or tiles it points at.
#[derive(Debug, Clone, Default)]
pub struct DirectoryBuilder {
    entries: BTreeMap<u16, TagValue>,
    segments: Vec<Bytes>,
    tiled: bool,
}

impl DirectoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, tag_id: u16, value: TagValue) -> Self {
        self.entries.insert(tag_id, value);
        self
    }

    pub fn short(self, tag: TiffTag, value: u16) -> Self {
        self.value(tag.as_u16(), TagValue::Shorts(vec![value]))
    }

    pub fn long(self, tag: TiffTag, value: u32) -> Self {
        self.value(tag.as_u16(), TagValue::Longs(vec![value]))
    }

    pub fn ascii(self, tag: TiffTag, text: &str) -> Self {
        self.value(tag.as_u16(), TagValue::Ascii(text.to_string()))
    }

    pub fn float(self, tag: TiffTag, value: f32) -> Self {
        self.value(tag.as_u16(), TagValue::Float(value))
    }

    /// Image data stored as strips.
    pub fn strips(mut self, segments: Vec<Bytes>) -> Self {
        self.segments = segments;
        self.tiled = false;
        self
    }

    /// Image data stored as tiles.
    pub fn tiles(mut self, segments: Vec<Bytes>) -> Self {
        self.segments = segments;
        self.tiled = true;
        self
    }

    /// Serialize this directory placed at `base`.
    ///
    /// Returns the bytes (directory, out-of-line values, image data) and the
    /// position of the next-IFD field relative to `base`.
    fn layout(&self, byte_order: ByteOrder, base: usize) -> (Vec<u8>, usize) {
        let mut encoded: Vec<(u16, FieldType, u64, Vec<u8>)> = self
            .entries
            .iter()
            .map(|(tag, value)| {
                let (field_type, count, bytes) = value.encode(byte_order);
                (*tag, field_type, count, bytes)
            })
            .collect();

        let (offsets_tag, counts_tag) = if self.tiled {
            (TiffTag::TileOffsets, TiffTag::TileByteCounts)
        } else {
            (TiffTag::StripOffsets, TiffTag::StripByteCounts)
        };

        if !self.segments.is_empty() {
            let count = self.segments.len() as u64;
            let byte_counts = self
                .segments
                .iter()
                .flat_map(|s| byte_order.encode_u32(s.len() as u32))
                .collect();
            encoded.retain(|e| e.0 != offsets_tag.as_u16() && e.0 != counts_tag.as_u16());
            encoded.push((counts_tag.as_u16(), FieldType::Long, count, byte_counts));
            encoded.push((
                offsets_tag.as_u16(),
                FieldType::Long,
                count,
                vec![0; 4 * self.segments.len()],
            ));
        }
        encoded.sort_by_key(|e| e.0);

        let ifd_size = 2 + 12 * encoded.len() + 4;
        let mut cursor = base + ifd_size;

        let mut value_positions = Vec::with_capacity(encoded.len());
        for entry in &encoded {
            if entry.3.len() > 4 {
                cursor = align_word(cursor);
                value_positions.push(Some(cursor));
                cursor += entry.3.len();
            } else {
                value_positions.push(None);
            }
        }

        let mut segment_offsets = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            cursor = align_word(cursor);
            segment_offsets.push(cursor);
            cursor += segment.len();
        }

        if let Some(entry) = encoded.iter_mut().find(|e| e.0 == offsets_tag.as_u16()) {
            entry.3 = segment_offsets
                .iter()
                .flat_map(|o| byte_order.encode_u32(*o as u32))
                .collect();
        }

        let mut out = Vec::with_capacity(cursor - base);
        out.extend_from_slice(&byte_order.encode_u16(encoded.len() as u16));
        for (entry, position) in encoded.iter().zip(&value_positions) {
            out.extend_from_slice(&byte_order.encode_u16(entry.0));
            out.extend_from_slice(&byte_order.encode_u16(entry.1 as u16));
            out.extend_from_slice(&byte_order.encode_u32(entry.2 as u32));
            match position {
                Some(position) => out.extend_from_slice(&byte_order.encode_u32(*position as u32)),
                None => {
                    let mut inline = entry.3.clone();
                    inline.resize(4, 0);
                    out.extend_from_slice(&inline);
                }
            }
        }
        let next_pointer = out.len();
        out.extend_from_slice(&[0; 4]);

        for (entry, position) in encoded.iter().zip(&value_positions) {
            if let Some(position) = position {
                out.resize(position - base, 0);
                out.extend_from_slice(&entry.3);
            }
        }
        for (segment, offset) in self.segments.iter().zip(&segment_offsets) {
            out.resize(offset - base, 0);
            out.extend_from_slice(segment);
        }

        (out, next_pointer)
    }
}

fn align_word(position: usize) -> usize {
    position + (position & 1)
}

// =============================================================================
// TiffWriter
// =============================================================================

/// Builds a classic TIFF file from a list of directories.
#[derive(Debug, Clone)]
pub struct TiffWriter {
    byte_order: ByteOrder,
    directories: Vec<DirectoryBuilder>,
}

impl TiffWriter {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            directories: Vec::new(),
        }
    }

    /// Append a directory to the chain.
    pub fn push(&mut self, directory: DirectoryBuilder) -> &mut Self {
        self.directories.push(directory);
        self
    }

    /// Serialize the whole file.
    pub fn build(&self) -> Vec<u8> {
        let byte_order = self.byte_order;
        let mut out = Vec::new();
        out.extend_from_slice(byte_order.magic());
        out.extend_from_slice(&byte_order.encode_u16(42));
        out.extend_from_slice(&[0; 4]);

        let mut link = 4;
        for directory in &self.directories {
            out.resize(align_word(out.len()), 0);
            let base = out.len();
            out[link..link + 4].copy_from_slice(&byte_order.encode_u32(base as u32));

            let (bytes, next_pointer) = directory.layout(byte_order, base);
            out.extend_from_slice(&bytes);
            link = base + next_pointer;
        }

        out
    }
}
