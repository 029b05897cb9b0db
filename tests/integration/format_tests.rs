//! Format-specific integration tests.
//!
//! Tests verify:
//! - Content detection tells SVS, NDPI and foreign TIFFs apart
//! - Inspection captures label, macro and properties per format
//! - Redaction removes exactly the identifying images and keeps the pyramid

use wsi_deid::format::{mrxs, ndpi, svs};
use wsi_deid::{
    detect_format, FormatInspector, FormatRedactor, ImageEncoding, ImageKind, InspectError,
    LocalFile, RedactionError, Redactor, SlideFormat, SlideInspector, SlideRef,
};

use super::test_utils::{
    contains, create_test_jpeg, ndpi_slide_bytes, plain_tiff_bytes, svs_slide_bytes, write_file,
    write_mrxs_slide,
};

// =============================================================================
// Detection
// =============================================================================

#[tokio::test]
async fn test_detect_format_from_content() {
    let dir = tempfile::tempdir().unwrap();
    let cases = [
        ("a.bin", svs_slide_bytes(None, None), SlideFormat::AperioSvs),
        ("b.bin", ndpi_slide_bytes(None), SlideFormat::HamamatsuNdpi),
        ("c.bin", plain_tiff_bytes(), SlideFormat::Unsupported),
    ];

    for (name, bytes, expected) in cases {
        let path = write_file(dir.path(), name, &bytes).await;
        let file = LocalFile::open(&path).await.unwrap();
        assert_eq!(detect_format(&file).await.unwrap(), expected, "{}", name);
    }

    let path = write_file(dir.path(), "d.bin", b"plain text, not an image").await;
    let file = LocalFile::open(&path).await.unwrap();
    assert!(detect_format(&file).await.is_err());
}

// =============================================================================
// SVS
// =============================================================================

#[tokio::test]
async fn test_svs_inspect_and_redact() {
    let dir = tempfile::tempdir().unwrap();
    let label = create_test_jpeg(40, 30, 11);
    let macro_image = create_test_jpeg(120, 40, 12);
    let path = write_file(
        dir.path(),
        "case.svs",
        &svs_slide_bytes(Some(&label), Some(&macro_image)),
    )
    .await;

    let handle = FormatInspector.open(&SlideRef::new(&path)).await.unwrap();
    assert_eq!(handle.format(), SlideFormat::AperioSvs);
    let captured = handle.associated_image(ImageKind::Label).unwrap();
    assert_eq!(captured.encoding, ImageEncoding::Jpeg);
    assert_eq!(captured.dimensions, Some((40, 30)));
    assert!(image::load_from_memory(&captured.data).is_ok());
    assert_eq!(
        handle.properties().get("aperio.AppMag").map(String::as_str),
        Some("20")
    );

    let before = tokio::fs::read(&path).await.unwrap();
    FormatRedactor.redact(&path).await.unwrap();
    let after = tokio::fs::read(&path).await.unwrap();

    assert_eq!(before.len(), after.len());
    assert!(!contains(&after, &label));
    assert!(!contains(&after, &macro_image));

    let file = LocalFile::open(&path).await.unwrap();
    let slide = svs::SvsSlide::open(&file).await.unwrap();
    assert_eq!(slide.directory_count(), 2);
    assert!(slide.directory(ImageKind::Label).is_none());
    assert!(slide.directory(ImageKind::Macro).is_none());
    assert_eq!(slide.metadata().mpp, Some(0.499));

    // A second pass has nothing left to remove.
    assert!(matches!(
        svs::redact(&path).await,
        Err(RedactionError::NothingToRedact { .. })
    ));
}

// =============================================================================
// NDPI
// =============================================================================

#[tokio::test]
async fn test_ndpi_inspect_and_redact() {
    let dir = tempfile::tempdir().unwrap();
    let macro_image = create_test_jpeg(64, 24, 13);
    let path = write_file(dir.path(), "case.ndpi", &ndpi_slide_bytes(Some(&macro_image))).await;

    let imagery = ndpi::capture(&path).await.unwrap();
    assert!(imagery.label.is_none());
    assert_eq!(
        imagery.macro_image.as_ref().unwrap().data.as_ref(),
        macro_image.as_slice()
    );
    assert_eq!(
        imagery.properties.get("tiff.Model").map(String::as_str),
        Some("NanoZoomer S360")
    );

    assert_eq!(ndpi::redact(&path).await.unwrap(), vec![ImageKind::Macro]);
    let after = tokio::fs::read(&path).await.unwrap();
    assert!(!contains(&after, &macro_image));

    let file = LocalFile::open(&path).await.unwrap();
    let slide = ndpi::NdpiSlide::open(&file).await.unwrap();
    assert_eq!(slide.directory_count(), 2);
    assert!(slide.macro_directory().is_none());
}

// =============================================================================
// MRXS
// =============================================================================

#[tokio::test]
async fn test_mrxs_inspect_and_redact() {
    let dir = tempfile::tempdir().unwrap();
    let barcode = create_test_jpeg(20, 20, 14);
    let preview = create_test_jpeg(80, 30, 15);
    let stub = write_mrxs_slide(dir.path(), "case", &barcode, &preview).await;

    let handle = FormatInspector.open(&SlideRef::new(&stub)).await.unwrap();
    assert_eq!(handle.format(), SlideFormat::Mirax);
    assert_eq!(
        handle.associated_image(ImageKind::Label).unwrap().data.as_ref(),
        barcode.as_slice()
    );
    assert_eq!(
        handle.associated_image(ImageKind::Macro).unwrap().dimensions,
        Some((80, 30))
    );
    assert_eq!(
        handle
            .properties()
            .get("mirax.GENERAL.PROJECT_NAME")
            .map(String::as_str),
        Some("Jane Doe")
    );

    FormatRedactor.redact(&stub).await.unwrap();

    let slide = mrxs::MrxsSlide::open(&stub).await.unwrap();
    assert!(slide.associated_level(ImageKind::Label).is_none());
    let preview_after = slide.read_associated(ImageKind::Macro).await.unwrap().unwrap();
    assert_eq!(preview_after.data.as_ref(), preview.as_slice());

    let data = tokio::fs::read(dir.path().join("case/Data0000.dat"))
        .await
        .unwrap();
    assert!(!contains(&data, &barcode));
}

#[tokio::test]
async fn test_mrxs_without_data_directory_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let stub = write_file(dir.path(), "orphan.mrxs", b"").await;

    let result = FormatInspector.open(&SlideRef::new(&stub)).await;
    assert!(matches!(result, Err(InspectError::Unsupported { .. })));
}

#[tokio::test]
async fn test_redactor_rejects_unknown_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "scan.tiff", &plain_tiff_bytes()).await;

    assert!(matches!(
        FormatRedactor.redact(&path).await,
        Err(RedactionError::Unsupported { .. })
    ));
    assert_eq!(tokio::fs::read(&path).await.unwrap(), plain_tiff_bytes());
}
