//! Test utilities for integration tests.
//!
//! Builders for small but structurally faithful SVS, NDPI and MRXS slides,
//! plus helpers for reading back the audit archive.

use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use wsi_deid::format::tiff::{ByteOrder, Compression, DirectoryBuilder, TiffTag, TiffWriter};

// =============================================================================
// Image payloads
// =============================================================================

/// Create a test RGB JPEG image. `seed` varies the pixels so payloads differ.
pub fn create_test_jpeg(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let r = (x % 256) as u8 ^ seed;
        let g = (y % 256) as u8;
        let b = ((x + y) % 256) as u8;
        Rgb([r, g, b])
    });

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 90);
    encoder.encode_image(&img).unwrap();
    buf
}

/// Create a test PNG image.
pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, _| Rgb([(x % 256) as u8, 0, 200]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Whether `needle` occurs anywhere in `haystack`.
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

// =============================================================================
// SVS
// =============================================================================

pub const SVS_DESCRIPTION: &str = "Aperio Image Library v12.0.15\n\
    46920x33600 (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.499|Filename = 2024-S-1234";

/// An Aperio SVS with a tiled base level, a thumbnail, and optional label
/// and macro strips.
pub fn svs_slide_bytes(label: Option<&[u8]>, macro_image: Option<&[u8]>) -> Vec<u8> {
    let mut writer = TiffWriter::new(ByteOrder::LittleEndian);
    writer.push(
        DirectoryBuilder::new()
            .long(TiffTag::ImageWidth, 512)
            .long(TiffTag::ImageLength, 512)
            .long(TiffTag::TileWidth, 256)
            .long(TiffTag::TileLength, 256)
            .short(TiffTag::Compression, Compression::Jpeg as u16)
            .ascii(TiffTag::ImageDescription, SVS_DESCRIPTION)
            .tiles((0..4u8).map(|i| Bytes::from(vec![0x40 + i; 96])).collect()),
    );
    writer.push(
        DirectoryBuilder::new()
            .long(TiffTag::ImageWidth, 64)
            .long(TiffTag::ImageLength, 64)
            .short(TiffTag::Compression, Compression::Jpeg as u16)
            .ascii(TiffTag::ImageDescription, "Aperio Image Library v12.0.15\n512x512 -> 64x64")
            .strips(vec![Bytes::from(vec![0x33; 40])]),
    );
    if let Some(label) = label {
        writer.push(associated_directory("label", label));
    }
    if let Some(macro_image) = macro_image {
        writer.push(associated_directory("macro", macro_image));
    }
    writer.build()
}

fn associated_directory(kind: &str, jpeg: &[u8]) -> DirectoryBuilder {
    let (width, height) = image::load_from_memory(jpeg)
        .map(|img| (img.width(), img.height()))
        .unwrap_or((1, 1));
    DirectoryBuilder::new()
        .long(TiffTag::ImageWidth, width)
        .long(TiffTag::ImageLength, height)
        .short(TiffTag::Compression, Compression::Jpeg as u16)
        .ascii(
            TiffTag::ImageDescription,
            &format!("Aperio Image Library v12.0.15\n{} {}x{}", kind, width, height),
        )
        .strips(vec![Bytes::copy_from_slice(jpeg)])
}

/// A readable TIFF without any vendor marker.
pub fn plain_tiff_bytes() -> Vec<u8> {
    let mut writer = TiffWriter::new(ByteOrder::LittleEndian);
    writer.push(
        DirectoryBuilder::new()
            .long(TiffTag::ImageWidth, 16)
            .long(TiffTag::ImageLength, 16)
            .ascii(TiffTag::ImageDescription, "generic scanner output")
            .strips(vec![Bytes::from(vec![0u8; 16])]),
    );
    writer.build()
}

// =============================================================================
// NDPI
// =============================================================================

/// A Hamamatsu NDPI with two pyramid levels and an optional macro.
pub fn ndpi_slide_bytes(macro_image: Option<&[u8]>) -> Vec<u8> {
    let mut writer = TiffWriter::new(ByteOrder::LittleEndian);
    for (lens, fill) in [(20.0f32, 0x51u8), (5.0, 0x52)] {
        writer.push(
            DirectoryBuilder::new()
                .long(TiffTag::ImageWidth, 256)
                .long(TiffTag::ImageLength, 128)
                .short(TiffTag::Compression, Compression::Jpeg as u16)
                .ascii(TiffTag::Make, "Hamamatsu")
                .ascii(TiffTag::Model, "NanoZoomer S360")
                .long(TiffTag::NdpiFormatFlag, 1)
                .float(TiffTag::NdpiSourceLens, lens)
                .strips(vec![Bytes::from(vec![fill; 64])]),
        );
    }
    if let Some(macro_image) = macro_image {
        writer.push(
            DirectoryBuilder::new()
                .long(TiffTag::ImageWidth, 64)
                .long(TiffTag::ImageLength, 24)
                .short(TiffTag::Compression, Compression::Jpeg as u16)
                .long(TiffTag::NdpiFormatFlag, 1)
                .float(TiffTag::NdpiSourceLens, -1.0)
                .strips(vec![Bytes::copy_from_slice(macro_image)]),
        );
    }
    writer.build()
}

// =============================================================================
// MRXS
// =============================================================================

/// Write `<dir>/<stem>.mrxs` and its `<dir>/<stem>/` data directory with a
/// barcode, preview and thumbnail level. Returns the `.mrxs` path.
pub async fn write_mrxs_slide(dir: &Path, stem: &str, barcode: &[u8], preview: &[u8]) -> PathBuf {
    let thumbnail: &[u8] = b"BM-thumbnail-bytes";
    let stub = dir.join(format!("{}.mrxs", stem));
    tokio::fs::write(&stub, b"").await.unwrap();
    let data_dir = dir.join(stem);
    tokio::fs::create_dir(&data_dir).await.unwrap();

    let mut data = Vec::new();
    let mut locations = Vec::new();
    for payload in [barcode, preview, thumbnail] {
        locations.push((data.len() as i32, payload.len() as i32));
        data.extend_from_slice(payload);
    }
    tokio::fs::write(data_dir.join("Data0000.dat"), &data)
        .await
        .unwrap();

    // Table base at offset 41, then one list head and data page per record.
    let mut index = b"03.02".to_vec();
    index.resize(45, 0);
    let mut heads = Vec::new();
    for (position, size) in locations {
        let head = index.len() as i32;
        index.extend_from_slice(&0i32.to_le_bytes());
        index.extend_from_slice(&(head + 8).to_le_bytes());
        for value in [1, 0, 0, 0, position, size, 0] {
            index.extend_from_slice(&value.to_le_bytes());
        }
        heads.push(head);
    }
    let table = index.len() as i32;
    index[41..45].copy_from_slice(&table.to_le_bytes());
    for head in heads {
        index.extend_from_slice(&head.to_le_bytes());
    }
    tokio::fs::write(data_dir.join("Index.dat"), &index)
        .await
        .unwrap();

    let slidedat = format!(
        "\u{FEFF}[GENERAL]\r\nSLIDE_NAME = {}\r\nPROJECT_NAME = Jane Doe\r\n\r\n\
        [HIERARCHICAL]\r\nINDEXFILE = Index.dat\r\nNONHIER_COUNT = 1\r\n\
        NONHIER_0_NAME = Scan data layer\r\nNONHIER_0_COUNT = 3\r\n\
        NONHIER_0_VAL_0 = ScanDataLayer_SlideBarcode\r\nNONHIER_0_VAL_0_SECTION = NONHIER_0_VAL_0\r\n\
        NONHIER_0_VAL_1 = ScanDataLayer_SlidePreview\r\nNONHIER_0_VAL_1_SECTION = NONHIER_0_VAL_1\r\n\
        NONHIER_0_VAL_2 = ScanDataLayer_SlideThumbnail\r\nNONHIER_0_VAL_2_SECTION = NONHIER_0_VAL_2\r\n\r\n\
        [DATAFILE]\r\nFILE_COUNT = 1\r\nFILE_0 = Data0000.dat\r\n\r\n\
        [NONHIER_0_VAL_0]\r\nIMAGE_FORMAT = PNG\r\n\r\n\
        [NONHIER_0_VAL_1]\r\nIMAGE_FORMAT = JPEG\r\n\r\n\
        [NONHIER_0_VAL_2]\r\nIMAGE_FORMAT = BMP\r\n",
        stem
    );
    tokio::fs::write(data_dir.join("Slidedat.ini"), slidedat)
        .await
        .unwrap();

    stub
}

// =============================================================================
// Folders and archives
// =============================================================================

/// A scratch root with an empty `Cases` source folder in it.
pub async fn source_folder() -> (tempfile::TempDir, PathBuf) {
    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("Cases");
    tokio::fs::create_dir(&source).await.unwrap();
    (root, source)
}

pub async fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await.unwrap();
    path
}

/// Names of the entries of `dir`, sorted.
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Read one member of a ZIP archive.
pub fn read_archive_member(archive: &Path, name: &str) -> Vec<u8> {
    let file = std::fs::File::open(archive).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    let mut member = zip.by_name(name).unwrap();
    let mut out = Vec::new();
    member.read_to_end(&mut out).unwrap();
    out
}

/// Member names of a ZIP archive, in archive order.
pub fn archive_members(archive: &Path) -> Vec<String> {
    let file = std::fs::File::open(archive).unwrap();
    let zip = zip::ZipArchive::new(file).unwrap();
    zip.file_names().map(str::to_string).collect()
}
