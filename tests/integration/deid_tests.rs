//! End-to-end batch tests.
//!
//! Tests verify:
//! - A mixed folder is copied, renamed and redacted with one record per file
//! - Unreadable and foreign files are recorded but never copied
//! - Cancellation stops before the next file and still flushes the audit log
//! - A failing redactor does not stop the batch
//! - Originals are left untouched

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use wsi_deid::deid::{plan_identities, Progress, ProgressObserver, IN_PROGRESS_MARKER};
use wsi_deid::{
    enumerate_slides, ArchiveAuditSink, AuditStatus, BatchContext, BatchOrchestrator,
    CancellationFlag, DeidOptions, FileOutcome, FormatInspector, FormatRedactor, IdentityMapper,
    RedactionError, Redactor, SlideRef,
};
use wsi_deid::deid::{Sha256Digest, StemDigest};

use super::test_utils::{
    contains, create_test_jpeg, list_dir, ndpi_slide_bytes, plain_tiff_bytes,
    read_archive_member, source_folder, svs_slide_bytes, write_file, write_mrxs_slide,
};

fn real_orchestrator() -> BatchOrchestrator {
    BatchOrchestrator::new(
        Arc::new(FormatInspector),
        Arc::new(FormatRedactor),
        Arc::new(ArchiveAuditSink::new()),
    )
}

fn options(pseudonymize: bool, audit: bool) -> DeidOptions {
    DeidOptions {
        pseudonymize_filenames: pseudonymize,
        produce_audit_log: audit,
        ..Default::default()
    }
}

// =============================================================================
// Full batches
// =============================================================================

#[tokio::test]
async fn test_valid_svs_and_corrupted_ndpi() {
    let (_root, source) = source_folder().await;
    let label = create_test_jpeg(48, 32, 1);
    let macro_image = create_test_jpeg(96, 32, 2);
    let original = svs_slide_bytes(Some(&label), Some(&macro_image));
    write_file(&source, "A.svs", &original).await;
    write_file(&source, "B.ndpi", b"\x00\x13not a tiff at all").await;

    let ctx = BatchContext::new(&source, options(true, true));
    let report = real_orchestrator()
        .run_folder(&ctx, &CancellationFlag::new())
        .await
        .unwrap();

    let records = report.log.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].original_filename, "A.svs");
    assert_eq!(records[0].outcome, FileOutcome::Succeeded);
    assert_eq!(records[1].original_filename, "B.ndpi");
    assert!(matches!(records[1].outcome, FileOutcome::FailedCapture(_)));
    assert!(records[1].imagery.is_none());
    assert!(records[1].new_filename.is_none());

    // A.svs is in the destination under its digest, without label or macro.
    let expected = format!("{}.svs", Sha256Digest.digest("A"));
    assert_eq!(records[0].new_filename.as_deref(), Some(expected.as_str()));
    assert_eq!(list_dir(&ctx.destination), vec![expected.clone()]);
    let redacted = tokio::fs::read(ctx.destination.join(&expected)).await.unwrap();
    assert!(!contains(&redacted, &label));
    assert!(!contains(&redacted, &macro_image));

    // The captured images were kept for the audit trail.
    let imagery = records[0].imagery.as_ref().unwrap();
    assert_eq!(imagery.label.as_ref().unwrap().data.as_ref(), label.as_slice());
    assert_eq!(
        imagery.properties.get("aperio.Filename").map(String::as_str),
        Some("2024-S-1234")
    );

    // Source untouched.
    assert_eq!(tokio::fs::read(source.join("A.svs")).await.unwrap(), original);

    // The artifact sits next to the destination and lists both files.
    let AuditStatus::Persisted(artifact) = &report.audit else {
        panic!("audit not persisted: {:?}", report.audit);
    };
    assert_eq!(artifact.parent(), ctx.destination.parent());
    let name = artifact.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("Cases_DEID_PHI_Secure_Data_Mapping_File_"));
    assert!(name.ends_with(".zip"));

    let csv = String::from_utf8(read_archive_member(artifact, "mapping.csv")).unwrap();
    assert!(csv.contains(&format!("A.svs,{},Succeeded", expected)));
    assert!(csv.contains("B.ndpi,,FailedCapture,"));
}

#[tokio::test]
async fn test_mixed_formats_without_pseudonymization() {
    let (_root, source) = source_folder().await;
    let barcode = create_test_jpeg(24, 24, 3);
    let preview = create_test_jpeg(64, 24, 4);
    let macro_image = create_test_jpeg(64, 24, 5);
    write_mrxs_slide(&source, "case-1", &barcode, &preview).await;
    write_file(&source, "case-2.ndpi", &ndpi_slide_bytes(Some(&macro_image))).await;
    write_file(&source, "case-3.svs", &svs_slide_bytes(None, Some(&macro_image))).await;
    write_file(&source, "notes.txt", b"not a slide").await;

    let ctx = BatchContext::new(&source, options(false, false));
    let report = real_orchestrator()
        .run_folder(&ctx, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(report.log.len(), 3);
    assert_eq!(report.summary.succeeded, 3);
    assert!(matches!(report.audit, AuditStatus::Disabled));
    assert_eq!(
        list_dir(&ctx.destination),
        vec!["case-1", "case-1.mrxs", "case-2.ndpi", "case-3.svs"]
    );

    let data = tokio::fs::read(ctx.destination.join("case-1/Data0000.dat"))
        .await
        .unwrap();
    assert!(!contains(&data, &barcode));
    assert!(contains(&data, &preview));

    let ndpi = tokio::fs::read(ctx.destination.join("case-2.ndpi")).await.unwrap();
    assert!(!contains(&ndpi, &macro_image));

    // No artifact was written next to the destination.
    let siblings = list_dir(ctx.destination.parent().unwrap());
    assert_eq!(siblings, vec!["Cases", "Cases_DEID"]);
}

#[tokio::test]
async fn test_mrxs_data_directory_follows_pseudonym() {
    let (_root, source) = source_folder().await;
    write_mrxs_slide(&source, "Smith_John", b"\x89PNGbarcode", b"\xFF\xD8preview").await;

    let ctx = BatchContext::new(&source, options(true, false));
    let report = real_orchestrator()
        .run_folder(&ctx, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(report.summary.succeeded, 1);
    let stem = Sha256Digest.digest("Smith_John");
    assert_eq!(
        list_dir(&ctx.destination),
        vec![stem.clone(), format!("{}.mrxs", stem)]
    );
    assert!(ctx.destination.join(&stem).join("Slidedat.ini").exists());

    // The original data directory still has its barcode.
    let original = tokio::fs::read(source.join("Smith_John/Data0000.dat"))
        .await
        .unwrap();
    assert!(original.starts_with(b"\x89PNGbarcode"));
}

#[tokio::test]
async fn test_foreign_content_is_skipped() {
    let (_root, source) = source_folder().await;
    write_file(&source, "generic.svs", &plain_tiff_bytes()).await;
    write_file(&source, "svs-in-disguise.ndpi", &svs_slide_bytes(None, None)).await;

    let ctx = BatchContext::new(&source, options(true, true));
    let report = real_orchestrator()
        .run_folder(&ctx, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(report.summary.skipped, 2);
    for record in report.log.records() {
        assert!(matches!(record.outcome, FileOutcome::SkippedUnsupportedFormat(_)));
    }
    assert!(list_dir(&ctx.destination).is_empty());
}

#[tokio::test]
async fn test_nothing_to_redact_is_a_failed_redaction() {
    let (_root, source) = source_folder().await;
    write_file(&source, "a.svs", &svs_slide_bytes(None, None)).await;
    write_file(&source, "b.ndpi", &ndpi_slide_bytes(Some(&create_test_jpeg(16, 16, 6)))).await;

    let ctx = BatchContext::new(&source, options(false, false));
    let report = real_orchestrator()
        .run_folder(&ctx, &CancellationFlag::new())
        .await
        .unwrap();

    let records = report.log.records();
    assert!(matches!(
        &records[0].outcome,
        FileOutcome::FailedRedaction(e) if !e.is_empty()
    ));
    assert_eq!(records[1].outcome, FileOutcome::Succeeded);
    // The unredacted copy stays, flagged by its outcome.
    assert!(ctx.destination.join("a.svs").exists());
    assert!(report.has_failures());
}

// =============================================================================
// Cancellation
// =============================================================================

struct CancelAfter {
    after: usize,
    flag: CancellationFlag,
}

impl ProgressObserver for CancelAfter {
    fn on_progress(&self, progress: Progress<'_>) {
        if progress.index == self.after {
            self.flag.cancel();
        }
    }
}

#[tokio::test]
async fn test_cancel_after_four_of_ten() {
    let (_root, source) = source_folder().await;
    let macro_image = create_test_jpeg(32, 16, 7);
    for i in 0..10 {
        write_file(
            &source,
            &format!("slide-{:02}.svs", i),
            &svs_slide_bytes(None, Some(&macro_image)),
        )
        .await;
    }

    let cancel = CancellationFlag::new();
    let ctx = BatchContext::new(&source, options(false, true));
    let report = real_orchestrator()
        .with_observer(Arc::new(CancelAfter {
            after: 4,
            flag: cancel.clone(),
        }))
        .run_folder(&ctx, &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.log.len(), 4);
    assert_eq!(
        list_dir(&ctx.destination),
        vec!["slide-00.svs", "slide-01.svs", "slide-02.svs", "slide-03.svs"]
    );

    let AuditStatus::Persisted(artifact) = &report.audit else {
        panic!("audit not persisted");
    };
    let mapping: serde_json::Value =
        serde_json::from_slice(&read_archive_member(artifact, "mapping.json")).unwrap();
    let records = mapping["records"].as_array().unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(records[3]["original_filename"], "slide-03.svs");
}

// =============================================================================
// Redactor failures
// =============================================================================

/// Delegates to the real redactor except for one file name.
struct FailOn {
    name: String,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Redactor for FailOn {
    async fn redact(&self, path: &Path) -> Result<(), RedactionError> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.calls.lock().unwrap().push(name.clone());
        if name == self.name {
            return Err(RedactionError::Verification("simulated failure".to_string()));
        }
        FormatRedactor.redact(path).await
    }
}

#[tokio::test]
async fn test_redaction_failure_does_not_stop_batch() {
    let (_root, source) = source_folder().await;
    let macro_image = create_test_jpeg(32, 16, 8);
    for name in ["x.svs", "y.svs", "z.svs"] {
        write_file(&source, name, &svs_slide_bytes(None, Some(&macro_image))).await;
    }

    let redactor = Arc::new(FailOn {
        name: "x.svs".to_string(),
        calls: Mutex::new(Vec::new()),
    });
    let ctx = BatchContext::new(&source, options(false, true));
    let report = BatchOrchestrator::new(
        Arc::new(FormatInspector),
        redactor.clone(),
        Arc::new(ArchiveAuditSink::new()),
    )
    .run_folder(&ctx, &CancellationFlag::new())
    .await
    .unwrap();

    assert_eq!(*redactor.calls.lock().unwrap(), vec!["x.svs", "y.svs", "z.svs"]);
    let outcomes: Vec<&FileOutcome> = report.log.records().iter().map(|r| &r.outcome).collect();
    assert!(matches!(outcomes[0], FileOutcome::FailedRedaction(e) if e.contains("simulated")));
    assert_eq!(*outcomes[1], FileOutcome::Succeeded);
    assert_eq!(*outcomes[2], FileOutcome::Succeeded);
}

// =============================================================================
// Naming and destination
// =============================================================================

/// Digest that maps every stem to the same value.
struct ConstantDigest;

impl StemDigest for ConstantDigest {
    fn digest(&self, _stem: &str) -> String {
        "collide".to_string()
    }
}

#[test]
fn test_forced_digest_collision_stays_unique() {
    let mut mapper = IdentityMapper::new(true, Box::new(ConstantDigest));
    let names: Vec<String> = ["a.svs", "b.svs", "c.svs", "d.ndpi"]
        .iter()
        .map(|n| mapper.assign(&SlideRef::new(n)).new_filename)
        .collect();

    assert_eq!(
        names,
        vec!["collide.svs", "collide_1.svs", "collide_2.svs", "collide.ndpi"]
    );
}

#[test]
fn test_pseudonymization_off_keeps_names() {
    let mut mapper = IdentityMapper::new(false, Box::new(Sha256Digest));
    for name in ["Smith, John.svs", "2024-S-1234.ndpi", "case.mrxs"] {
        assert_eq!(mapper.assign(&SlideRef::new(name)).new_filename, name);
    }
}

#[tokio::test]
async fn test_dry_run_plan_matches_batch() {
    let (_root, source) = source_folder().await;
    let macro_image = create_test_jpeg(16, 16, 9);
    for name in ["one.svs", "two.svs"] {
        write_file(&source, name, &svs_slide_bytes(None, Some(&macro_image))).await;
    }

    let ctx = BatchContext::new(&source, options(true, false));
    let slides = enumerate_slides(&source).await.unwrap();
    let plan = plan_identities(&ctx.options, &slides);
    assert!(!ctx.destination.exists());

    let report = real_orchestrator()
        .run(&ctx, &slides, &CancellationFlag::new())
        .await
        .unwrap();
    let produced: Vec<String> = report
        .log
        .records()
        .iter()
        .map(|r| r.new_filename.clone().unwrap())
        .collect();
    let planned: Vec<String> = plan.into_iter().map(|i| i.new_filename).collect();
    assert_eq!(produced, planned);
}

#[tokio::test]
async fn test_rerun_overwrites_outputs_and_keeps_both_artifacts() {
    let (_root, source) = source_folder().await;
    write_file(
        &source,
        "a.svs",
        &svs_slide_bytes(None, Some(&create_test_jpeg(16, 16, 10))),
    )
    .await;

    let ctx = BatchContext::new(&source, options(true, true));
    let first = real_orchestrator()
        .run_folder(&ctx, &CancellationFlag::new())
        .await
        .unwrap();
    let second = real_orchestrator()
        .run_folder(&ctx, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(second.summary.succeeded, 1);
    assert_eq!(list_dir(&ctx.destination).len(), 1);
    assert!(!ctx.destination.join(IN_PROGRESS_MARKER).exists());

    match (&first.audit, &second.audit) {
        (AuditStatus::Persisted(a), AuditStatus::Persisted(b)) => {
            assert_ne!(a, b);
            assert!(a.exists() && b.exists());
        }
        other => panic!("unexpected audit status {:?}", other),
    }
}
