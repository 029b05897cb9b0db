//! Audit archive integration tests.
//!
//! Tests verify:
//! - The archive produced by a batch carries mapping, evidence and manifest
//! - Evidence images are stored as PNG and still show the original image
//! - The hash chain and manifest digests are consistent
//! - Flushing twice writes one artifact
//! - A log whose flush failed can still be persisted afterwards

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};

use wsi_deid::audit::{recover_log, Recovery};
use wsi_deid::{
    ArchiveAuditSink, AuditPersistError, AuditRecord, AuditRecorder, AuditSink, AuditStatus,
    BatchAuditLog, BatchContext, BatchOrchestrator, CancellationFlag, DeidOptions, FileOutcome,
    FormatInspector, FormatRedactor,
};

use super::test_utils::{
    archive_members, create_test_jpeg, list_dir, read_archive_member, source_folder,
    svs_slide_bytes, write_file,
};

async fn run_batch_with_label() -> (tempfile::TempDir, PathBuf) {
    let (root, source) = source_folder().await;
    write_file(
        &source,
        "Doe_Jane.svs",
        &svs_slide_bytes(
            Some(&create_test_jpeg(40, 20, 21)),
            Some(&create_test_jpeg(100, 30, 22)),
        ),
    )
    .await;
    write_file(&source, "broken.svs", b"II*\x00\xFF\xFF\xFF\x7F").await;

    let ctx = BatchContext::new(&source, DeidOptions::default());
    let report = BatchOrchestrator::new(
        Arc::new(FormatInspector),
        Arc::new(FormatRedactor),
        Arc::new(ArchiveAuditSink::new()),
    )
    .run_folder(&ctx, &CancellationFlag::new())
    .await
    .unwrap();

    match report.audit {
        AuditStatus::Persisted(path) => (root, path),
        other => panic!("audit not persisted: {:?}", other),
    }
}

#[tokio::test]
async fn test_archive_members() {
    let (_root, artifact) = run_batch_with_label().await;

    let members = archive_members(&artifact);
    for expected in [
        "mapping.csv",
        "mapping.json",
        "manifest.json",
        "images/0001_label.png",
        "images/0001_macro.png",
    ] {
        assert!(members.iter().any(|m| m == expected), "missing {}", expected);
    }
    assert!(!members.iter().any(|m| m.starts_with("images/0002")));

    let label = read_archive_member(&artifact, "images/0001_label.png");
    let decoded = image::load_from_memory(&label).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (40, 20));

    let csv = String::from_utf8(read_archive_member(&artifact, "mapping.csv")).unwrap();
    let rows: Vec<&str> = csv.lines().collect();
    assert_eq!(rows.len(), 3);
    assert!(rows[1].starts_with("Doe_Jane.svs,"));
    assert!(rows[1].ends_with(",Succeeded,,images/0001_label.png,images/0001_macro.png"));
    assert!(rows[2].starts_with("broken.svs,,FailedCapture,"));
}

#[tokio::test]
async fn test_manifest_and_hash_chain() {
    let (_root, artifact) = run_batch_with_label().await;

    let mapping_bytes = read_archive_member(&artifact, "mapping.json");
    let mapping: serde_json::Value = serde_json::from_slice(&mapping_bytes).unwrap();
    let manifest: serde_json::Value =
        serde_json::from_slice(&read_archive_member(&artifact, "manifest.json")).unwrap();

    let records = mapping["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["outcome"], "Succeeded");
    assert_eq!(records[0]["label"]["stored_encoding"], "png");
    assert_eq!(records[0]["label"]["captured_encoding"], "jpeg");
    assert_eq!(records[0]["properties"]["aperio.AppMag"], "20");
    assert_eq!(records[1]["outcome"], "FailedCapture");
    assert!(records[1]["label"].is_null());

    assert_eq!(records[1]["previous_sha256"], records[0]["record_sha256"]);
    assert_eq!(manifest["chain_head"], records[1]["record_sha256"]);
    assert_eq!(manifest["record_count"], 2);
    assert_eq!(manifest["summary"]["succeeded"], 1);
    assert_eq!(manifest["summary"]["failed"], 1);

    for member in manifest["members"].as_array().unwrap() {
        let name = member["name"].as_str().unwrap();
        let digest = hex::encode(Sha256::digest(read_archive_member(&artifact, name)));
        assert_eq!(member["sha256"], digest, "{}", name);
    }
}

#[tokio::test]
async fn test_recorder_flush_twice_writes_one_artifact() {
    let root = tempfile::tempdir().unwrap();
    let destination = root.path().join("Cases_DEID");
    tokio::fs::create_dir(&destination).await.unwrap();

    let mut recorder = AuditRecorder::new(Arc::new(ArchiveAuditSink::new()), &destination);
    recorder.capture(AuditRecord {
        original_filename: "a.svs".to_string(),
        new_filename: Some("a.svs".to_string()),
        imagery: None,
        outcome: FileOutcome::Succeeded,
    });

    let first = recorder.flush().await.unwrap();
    let second = recorder.flush().await.unwrap();

    assert_eq!(first, second);
    let artifacts: Vec<String> = list_dir(root.path())
        .into_iter()
        .filter(|n| n.ends_with(".zip"))
        .collect();
    assert_eq!(artifacts.len(), 1);
}

/// Sink that always fails, standing in for an unwritable parent folder.
struct UnwritableSink;

#[async_trait]
impl AuditSink for UnwritableSink {
    async fn persist(
        &self,
        destination: &Path,
        _log: &BatchAuditLog,
        _generated_at: DateTime<Local>,
    ) -> Result<PathBuf, AuditPersistError> {
        Err(AuditPersistError::NameExhausted(destination.to_path_buf()))
    }
}

#[tokio::test]
async fn test_failed_flush_is_recovered() {
    let (root, source) = source_folder().await;
    write_file(
        &source,
        "Doe_Jane.svs",
        &svs_slide_bytes(Some(&create_test_jpeg(40, 20, 23)), None),
    )
    .await;

    let ctx = BatchContext::new(&source, DeidOptions::default());
    let report = BatchOrchestrator::new(
        Arc::new(FormatInspector),
        Arc::new(FormatRedactor),
        Arc::new(UnwritableSink),
    )
    .run_folder(&ctx, &CancellationFlag::new())
    .await
    .unwrap();
    assert!(report.audit_failed());

    // The primary sink recovers on retry.
    let fallback_dir = tempfile::tempdir().unwrap();
    let fallback = ArchiveAuditSink::in_directory(fallback_dir.path());
    let recovery = recover_log(
        &ArchiveAuditSink::new(),
        &fallback,
        &report.destination,
        &report.log,
        3,
        Duration::ZERO,
    )
    .await
    .unwrap();
    let artifact = match recovery {
        Recovery::Persisted(path) => path,
        other => panic!("expected the primary sink, got {:?}", other),
    };
    assert_eq!(artifact.parent(), Some(root.path()));
    let csv = String::from_utf8(read_archive_member(&artifact, "mapping.csv")).unwrap();
    assert!(csv.contains("Doe_Jane.svs,"));

    // A sink that never recovers hands the log to the fallback directory.
    let recovery = recover_log(
        &UnwritableSink,
        &fallback,
        &report.destination,
        &report.log,
        2,
        Duration::ZERO,
    )
    .await
    .unwrap();
    match recovery {
        Recovery::Fallback { artifact, error } => {
            assert_eq!(artifact.parent(), Some(fallback_dir.path()));
            assert!(error.is_some());
            assert!(archive_members(&artifact).iter().any(|m| m == "mapping.json"));
        }
        other => panic!("expected the fallback sink, got {:?}", other),
    }
}
