//! Capturing an associated image out of a TIFF directory.
//!
//! A JPEG image stored as one strip is returned as a complete JPEG stream,
//! with the directory's JPEGTables merged in when the strip is abbreviated.
//! Anything else is repackaged as a standalone single-directory TIFF that
//! carries the original strips or tiles unchanged.

use bytes::Bytes;

use crate::error::TiffError;
use crate::format::jpeg::complete_jpeg_stream;
use crate::io::RangeReader;
use crate::slide::{AssociatedImage, ImageEncoding, ImageKind};

use super::directory::Directory;
use super::parser::TiffHeader;
use super::tags::{FieldType, TiffTag};
use super::values::ValueReader;
use super::writer::{DirectoryBuilder, TagValue, TiffWriter};

/// Largest associated image we are willing to hold in memory.
pub const MAX_ASSOCIATED_IMAGE_BYTES: u64 = 256 * 1024 * 1024;

/// Tags carried over when repackaging as a standalone TIFF.
const PRESERVED_TAGS: [TiffTag; 13] = [
    TiffTag::ImageWidth,
    TiffTag::ImageLength,
    TiffTag::BitsPerSample,
    TiffTag::Compression,
    TiffTag::PhotometricInterpretation,
    TiffTag::SamplesPerPixel,
    TiffTag::RowsPerStrip,
    TiffTag::PlanarConfiguration,
    TiffTag::Predictor,
    TiffTag::TileWidth,
    TiffTag::TileLength,
    TiffTag::JpegTables,
    TiffTag::YCbCrSubSampling,
];

/// Read the image a directory describes.
pub async fn capture_directory_image<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
    directory: &Directory,
    kind: ImageKind,
) -> Result<AssociatedImage, TiffError> {
    let byte_order = header.byte_order;
    let segments = directory.data_segments(reader, header).await?;
    if segments.is_empty() {
        return Err(TiffError::MissingTag(TiffTag::StripOffsets.name()));
    }

    let total: u64 = segments.iter().map(|s| s.length).sum();
    if total > MAX_ASSOCIATED_IMAGE_BYTES {
        return Err(TiffError::InvalidTagValue {
            tag: TiffTag::StripByteCounts.name(),
            message: format!(
                "{} image is {} bytes, limit is {}",
                kind.name(),
                total,
                MAX_ASSOCIATED_IMAGE_BYTES
            ),
        });
    }

    let mut data = Vec::with_capacity(segments.len());
    for segment in &segments {
        data.push(
            reader
                .read_exact_at(segment.offset, segment.length as usize)
                .await?,
        );
    }

    let dimensions = directory.dimensions(byte_order);
    let values = ValueReader::new(reader, header);
    let is_jpeg = directory
        .compression(byte_order)
        .is_some_and(|c| c.is_jpeg());

    if is_jpeg && data.len() == 1 && !directory.ifd.is_tiled() {
        let tables = match directory.ifd.get_entry_by_tag(TiffTag::JpegTables) {
            Some(entry) => Some(values.read_bytes(entry).await?),
            None => None,
        };
        let jpeg = complete_jpeg_stream(tables.as_deref(), &data[0]);
        return Ok(AssociatedImage::new(
            kind,
            dimensions,
            ImageEncoding::Jpeg,
            jpeg,
        ));
    }

    let mut builder = DirectoryBuilder::new();
    for tag in PRESERVED_TAGS {
        let Some(entry) = directory.ifd.get_entry_by_tag(tag) else {
            continue;
        };
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        let value = if field_type == FieldType::Long8 {
            let narrowed = values
                .read_u64_array(entry)
                .await?
                .into_iter()
                .map(u32::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| TiffError::InvalidTagValue {
                    tag: tag.name(),
                    message: "value does not fit in 32 bits".to_string(),
                })?;
            TagValue::Longs(narrowed)
        } else {
            TagValue::Raw {
                field_type,
                count: entry.count,
                bytes: values.read_bytes(entry).await?,
            }
        };
        builder = builder.value(tag.as_u16(), value);
    }
    builder = if directory.ifd.is_tiled() {
        builder.tiles(data)
    } else {
        builder.strips(data)
    };

    let mut writer = TiffWriter::new(byte_order);
    writer.push(builder);
    Ok(AssociatedImage::new(
        kind,
        dimensions,
        ImageEncoding::Tiff,
        Bytes::from(writer.build()),
    ))
}
