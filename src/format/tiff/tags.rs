//! TIFF tag and field type definitions.
//!
//! This module defines the vocabulary for TIFF parsing, including:
//! - Field types that determine how values are encoded
//! - Tag IDs that identify metadata fields, including the private tags
//!   Hamamatsu writes into NDPI files
//!
//! The definitions support both classic TIFF and BigTIFF formats.

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types that determine how values are encoded.
///
/// Each field type has a specific size in bytes, which is critical for:
/// - Determining if a value fits inline in an IFD entry
/// - Copying values byte-for-byte when rewrapping an associated image
///
/// Vendor files use the signed and floating point types too (NDPI stores
/// the objective magnification as a FLOAT), so all baseline types are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer (1 byte)
    Byte = 1,

    /// 8-bit ASCII character (1 byte)
    Ascii = 2,

    /// Unsigned 16-bit integer (2 bytes)
    Short = 3,

    /// Unsigned 32-bit integer (4 bytes)
    Long = 4,

    /// Two Longs: numerator, denominator (8 bytes)
    Rational = 5,

    /// Signed 8-bit integer (1 byte)
    SByte = 6,

    /// Undefined byte data (1 byte per element)
    Undefined = 7,

    /// Signed 16-bit integer (2 bytes)
    SShort = 8,

    /// Signed 32-bit integer (4 bytes)
    SLong = 9,

    /// Two SLongs (8 bytes)
    SRational = 10,

    /// IEEE single precision float (4 bytes)
    Float = 11,

    /// IEEE double precision float (8 bytes)
    Double = 12,

    /// Unsigned 64-bit integer (8 bytes) - BigTIFF only
    Long8 = 16,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float => 4,
            FieldType::Rational | FieldType::SRational | FieldType::Double | FieldType::Long8 => 8,
        }
    }

    /// Create a FieldType from its numeric value.
    ///
    /// Returns `None` for unknown type values.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            6 => Some(FieldType::SByte),
            7 => Some(FieldType::Undefined),
            8 => Some(FieldType::SShort),
            9 => Some(FieldType::SLong),
            10 => Some(FieldType::SRational),
            11 => Some(FieldType::Float),
            12 => Some(FieldType::Double),
            16 => Some(FieldType::Long8),
            _ => None,
        }
    }

    /// Check if a value with this type and count fits inline in an entry.
    ///
    /// Classic TIFF entries hold 4 value bytes, BigTIFF entries hold 8.
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let threshold = if is_bigtiff { 8 } else { 4 };
        (self.size_in_bytes() as u64).saturating_mul(count) <= threshold
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// TIFF tag IDs used when inspecting and redacting slides.
///
/// Tags not listed here are still parsed and can be looked up by raw ID
/// through [`Ifd::get_entry`](super::Ifd::get_entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    // -------------------------------------------------------------------------
    // Basic Image Structure
    // -------------------------------------------------------------------------
    /// Subfile kind bitfield (reduced resolution, page of multi-page, mask)
    NewSubfileType = 254,

    /// Image width in pixels
    ImageWidth = 256,

    /// Image height (length) in pixels
    ImageLength = 257,

    /// Bits per sample
    BitsPerSample = 258,

    /// Compression scheme used
    Compression = 259,

    /// Photometric interpretation (RGB, YCbCr, etc.)
    PhotometricInterpretation = 262,

    /// Description string (carries metadata and the image role in SVS files)
    ImageDescription = 270,

    /// Scanner manufacturer
    Make = 271,

    /// Scanner model
    Model = 272,

    /// Number of components per pixel (e.g., 3 for RGB)
    SamplesPerPixel = 277,

    /// Row count per strip
    RowsPerStrip = 278,

    /// Byte offsets of strips
    StripOffsets = 273,

    /// Byte counts of strips
    StripByteCounts = 279,

    /// How components are organized (chunky vs planar)
    PlanarConfiguration = 284,

    /// Acquisition software
    Software = 305,

    /// Acquisition timestamp ("YYYY:MM:DD HH:MM:SS")
    DateTime = 306,

    /// Differencing predictor for LZW/Deflate data
    Predictor = 317,

    // -------------------------------------------------------------------------
    // Tile Organization
    // -------------------------------------------------------------------------
    /// Width of each tile in pixels
    TileWidth = 322,

    /// Height (length) of each tile in pixels
    TileLength = 323,

    /// Byte offsets of each tile in the file
    TileOffsets = 324,

    /// Byte counts of each tile
    TileByteCounts = 325,

    // -------------------------------------------------------------------------
    // JPEG Handling
    // -------------------------------------------------------------------------
    /// JPEG quantization and Huffman tables for abbreviated streams
    ///
    /// SVS label and macro strips are often abbreviated; the tables must be
    /// merged back before the captured image can be viewed on its own.
    JpegTables = 347,

    /// YCbCr subsampling factors
    YCbCrSubSampling = 530,

    // -------------------------------------------------------------------------
    // Hamamatsu NDPI private tags
    // -------------------------------------------------------------------------
    /// Marks a file as NDPI
    NdpiFormatFlag = 65420,

    /// Objective magnification of the page; -1 for the macro, -2 for the map
    NdpiSourceLens = 65421,
}

impl TiffTag {
    /// Create a TiffTag from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            254 => Some(TiffTag::NewSubfileType),
            256 => Some(TiffTag::ImageWidth),
            257 => Some(TiffTag::ImageLength),
            258 => Some(TiffTag::BitsPerSample),
            259 => Some(TiffTag::Compression),
            262 => Some(TiffTag::PhotometricInterpretation),
            270 => Some(TiffTag::ImageDescription),
            271 => Some(TiffTag::Make),
            272 => Some(TiffTag::Model),
            273 => Some(TiffTag::StripOffsets),
            277 => Some(TiffTag::SamplesPerPixel),
            278 => Some(TiffTag::RowsPerStrip),
            279 => Some(TiffTag::StripByteCounts),
            284 => Some(TiffTag::PlanarConfiguration),
            305 => Some(TiffTag::Software),
            306 => Some(TiffTag::DateTime),
            317 => Some(TiffTag::Predictor),
            322 => Some(TiffTag::TileWidth),
            323 => Some(TiffTag::TileLength),
            324 => Some(TiffTag::TileOffsets),
            325 => Some(TiffTag::TileByteCounts),
            347 => Some(TiffTag::JpegTables),
            530 => Some(TiffTag::YCbCrSubSampling),
            65420 => Some(TiffTag::NdpiFormatFlag),
            65421 => Some(TiffTag::NdpiSourceLens),
            _ => None,
        }
    }

    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Name used in property keys (`tiff.Make`, `tiff.Model`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            TiffTag::NewSubfileType => "NewSubfileType",
            TiffTag::ImageWidth => "ImageWidth",
            TiffTag::ImageLength => "ImageLength",
            TiffTag::BitsPerSample => "BitsPerSample",
            TiffTag::Compression => "Compression",
            TiffTag::PhotometricInterpretation => "PhotometricInterpretation",
            TiffTag::ImageDescription => "ImageDescription",
            TiffTag::Make => "Make",
            TiffTag::Model => "Model",
            TiffTag::SamplesPerPixel => "SamplesPerPixel",
            TiffTag::RowsPerStrip => "RowsPerStrip",
            TiffTag::StripOffsets => "StripOffsets",
            TiffTag::StripByteCounts => "StripByteCounts",
            TiffTag::PlanarConfiguration => "PlanarConfiguration",
            TiffTag::Software => "Software",
            TiffTag::DateTime => "DateTime",
            TiffTag::Predictor => "Predictor",
            TiffTag::TileWidth => "TileWidth",
            TiffTag::TileLength => "TileLength",
            TiffTag::TileOffsets => "TileOffsets",
            TiffTag::TileByteCounts => "TileByteCounts",
            TiffTag::JpegTables => "JPEGTables",
            TiffTag::YCbCrSubSampling => "YCbCrSubSampling",
            TiffTag::NdpiFormatFlag => "NdpiFormatFlag",
            TiffTag::NdpiSourceLens => "NdpiSourceLens",
        }
    }
}

// =============================================================================
// Compression Values
// =============================================================================

/// TIFF compression schemes seen in slide files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    /// No compression
    None = 1,

    /// LZW (label images in SVS files)
    Lzw = 5,

    /// Pre-TIFF 6.0 JPEG
    OldJpeg = 6,

    /// JPEG (TIFF 6.0 technote 2)
    Jpeg = 7,

    /// Deflate
    Deflate = 8,

    /// Adobe Deflate
    AdobeDeflate = 32946,

    /// Aperio JPEG 2000 (YCbCr)
    Jpeg2000 = 33003,
}

impl Compression {
    /// Create a Compression from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            5 => Some(Compression::Lzw),
            6 => Some(Compression::OldJpeg),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::Deflate),
            32946 => Some(Compression::AdobeDeflate),
            33003 => Some(Compression::Jpeg2000),
            _ => None,
        }
    }

    /// Whether a single strip of this compression is a self-contained JPEG.
    #[inline]
    pub const fn is_jpeg(self) -> bool {
        matches!(self, Compression::Jpeg)
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::Jpeg2000 => "JPEG 2000",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // FieldType Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_field_type_sizes() {
        assert_eq!(FieldType::Byte.size_in_bytes(), 1);
        assert_eq!(FieldType::Short.size_in_bytes(), 2);
        assert_eq!(FieldType::Float.size_in_bytes(), 4);
        assert_eq!(FieldType::Rational.size_in_bytes(), 8);
        assert_eq!(FieldType::Long8.size_in_bytes(), 8);
    }

    #[test]
    fn test_field_type_from_u16() {
        assert_eq!(FieldType::from_u16(3), Some(FieldType::Short));
        assert_eq!(FieldType::from_u16(11), Some(FieldType::Float));
        assert_eq!(FieldType::from_u16(16), Some(FieldType::Long8));
        assert_eq!(FieldType::from_u16(0), None);
        assert_eq!(FieldType::from_u16(13), None);
    }

    #[test]
    fn test_fits_inline() {
        assert!(FieldType::Float.fits_inline(1, false));
        assert!(!FieldType::Rational.fits_inline(1, false));
        assert!(FieldType::Rational.fits_inline(1, true));
        assert!(!FieldType::Byte.fits_inline(5, false));
        assert!(!FieldType::Long8.fits_inline(u64::MAX, true));
    }

    // -------------------------------------------------------------------------
    // TiffTag Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_tag_round_trip_ids() {
        for tag in [
            TiffTag::ImageDescription,
            TiffTag::StripOffsets,
            TiffTag::JpegTables,
            TiffTag::NdpiFormatFlag,
            TiffTag::NdpiSourceLens,
        ] {
            assert_eq!(TiffTag::from_u16(tag.as_u16()), Some(tag));
        }
        assert_eq!(TiffTag::from_u16(65000), None);
    }

    #[test]
    fn test_ndpi_tag_ids() {
        assert_eq!(TiffTag::NdpiFormatFlag.as_u16(), 65420);
        assert_eq!(TiffTag::NdpiSourceLens.as_u16(), 65421);
    }

    // -------------------------------------------------------------------------
    // Compression Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_compression() {
        assert_eq!(Compression::from_u16(7), Some(Compression::Jpeg));
        assert!(Compression::Jpeg.is_jpeg());
        assert!(!Compression::Lzw.is_jpeg());
        assert_eq!(Compression::from_u16(33003).map(|c| c.name()), Some("JPEG 2000"));
        assert_eq!(Compression::from_u16(2), None);
    }
}
