//! JPEG stream handling for captured strips.
//!
//! A JPEG-compressed TIFF strip may be an "abbreviated stream": it lacks the
//! quantization (DQT) and Huffman (DHT) tables, which the directory stores
//! once in its `JPEGTables` tag. Such a strip is not a viewable JPEG on its
//! own, so before an associated image goes into the audit archive the two
//! are merged:
//!
//! 1. JPEGTables starts with SOI (FFD8) and ends with EOI (FFD9)
//! 2. The strip also starts with SOI and ends with EOI
//! 3. Strip EOI from the tables, SOI from the strip, concatenate
//!
//! Result: SOI + tables_content + strip_content + EOI

use bytes::{Bytes, BytesMut};

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

// =============================================================================
// JPEG Stream Analysis
// =============================================================================

/// Check if JPEG data is an abbreviated stream (missing tables).
///
/// An abbreviated stream starts with SOI but reaches SOS without any DQT or
/// DHT segment in between.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Skip marker segment (marker + 2-byte length + data)
        if pos + 3 < data.len() && marker[1] != 0x00 && marker[1] != 0xD8 && marker[1] != 0xD9 {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

/// Check if JPEG data carries its own quantization tables.
pub fn is_complete_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    data[2..].windows(2).any(|w| w == DQT)
}

// =============================================================================
// JPEG Tables Merging
// =============================================================================

/// Merge JPEGTables with an abbreviated strip.
pub fn merge_jpeg_tables(tables: &[u8], strip: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(strip);
    }
    if strip.is_empty() {
        return Bytes::new();
    }

    let tables_end = if tables.ends_with(&EOI) {
        tables.len() - 2
    } else {
        tables.len()
    };
    let strip_start = if strip.starts_with(&SOI) { 2 } else { 0 };

    let mut result = BytesMut::with_capacity(tables_end + strip.len() - strip_start);
    result.extend_from_slice(&tables[..tables_end]);
    result.extend_from_slice(&strip[strip_start..]);
    result.freeze()
}

/// Turn a JPEG strip into a standalone JPEG stream.
///
/// Complete streams are returned unchanged. Abbreviated ones get the tables
/// merged in when the directory has them; otherwise the strip is returned
/// as-is and will not decode on its own.
pub fn complete_jpeg_stream(tables: Option<&[u8]>, strip: &[u8]) -> Bytes {
    if is_complete_stream(strip) {
        return Bytes::copy_from_slice(strip);
    }

    match tables {
        Some(tables) if is_abbreviated_stream(strip) => merge_jpeg_tables(tables, strip),
        _ => Bytes::copy_from_slice(strip),
    }
}

// =============================================================================
// Tests
// =============================================================================
