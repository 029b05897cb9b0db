//! wsi-deid - Batch de-identification of Whole Slide Images.
//!
//! Exit codes:
//! - 0: every slide succeeded or was skipped
//! - 1: configuration error, or the batch could not start
//! - 2: the batch finished but some slides failed
//! - 3: the audit archive could not be written next to the destination
//!   (it may still have gone to the fallback directory)

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_deid::{
    audit::{recover_log, Recovery},
    config::{Cli, Command, DeidConfig, InspectConfig},
    deid::{
        plan_identities, AuditStatus, BatchContext, BatchOrchestrator, CancellationFlag,
        Progress, ProgressObserver,
    },
    slide::{enumerate_slides, FormatInspector, SlideInspector, SlideRef},
    ArchiveAuditSink, FormatRedactor, ImageKind, InspectError,
};

const EXIT_FATAL: u8 = 1;
const EXIT_FILE_FAILURES: u8 = 2;
const EXIT_AUDIT_FAILED: u8 = 3;

/// Extra attempts at the audit archive after the batch's own flush failed.
const AUDIT_RETRIES: usize = 3;
const AUDIT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Deid(config) => run_deid(config).await,
        Command::Inspect(config) => run_inspect(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_deid=debug"
    } else {
        "wsi_deid=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Deid Command
// =============================================================================

/// Prints one line per finished slide.
struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn on_progress(&self, progress: Progress<'_>) {
        println!(
            "[{}/{}] {} - {}",
            progress.index, progress.total, progress.filename, progress.outcome
        );
    }
}

async fn run_deid(config: DeidConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::from(EXIT_FATAL);
    }

    let ctx = match BatchContext::resolve(&config.folder, config.options()).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };
    let slides = match enumerate_slides(&ctx.source).await {
        Ok(slides) => slides,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    info!("Source:      {}", ctx.source.display());
    info!("Destination: {}", ctx.destination.display());
    info!("Slides:      {}", slides.len());
    if !ctx.options.pseudonymize_filenames {
        warn!("Pseudonymization DISABLED - output files keep their original names");
    }
    if !ctx.options.produce_audit_log {
        warn!("Audit log DISABLED - the mapping to original slides will not be kept");
    }

    if config.dry_run {
        for identity in plan_identities(&ctx.options, &slides) {
            println!("{} -> {}", identity.source.file_name(), identity.new_filename);
        }
        return ExitCode::SUCCESS;
    }

    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; finishing the current slide, then stopping");
                cancel.cancel();
            }
        });
    }

    let sink = Arc::new(ArchiveAuditSink::new());
    let orchestrator = BatchOrchestrator::new(
        Arc::new(FormatInspector),
        Arc::new(FormatRedactor),
        sink.clone(),
    )
    .with_observer(Arc::new(ConsoleProgress));

    let report = match orchestrator.run(&ctx, &slides, &cancel).await {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    println!();
    println!(
        "Succeeded: {}  Skipped: {}  Failed: {}",
        report.summary.succeeded, report.summary.skipped, report.summary.failed
    );
    if report.cancelled {
        println!("Cancelled: {} slide(s) not started", report.not_started);
    }

    match &report.audit {
        AuditStatus::Persisted(path) => println!("Audit archive: {}", path.display()),
        AuditStatus::Disabled => {}
        AuditStatus::Failed(e) => {
            error!("Audit archive was not written: {}", e);
            let fallback = ArchiveAuditSink::in_directory(config.audit_fallback_dir());
            match recover_log(
                sink.as_ref(),
                &fallback,
                &report.destination,
                &report.log,
                AUDIT_RETRIES,
                AUDIT_RETRY_DELAY,
            )
            .await
            {
                Ok(Recovery::Persisted(path)) => println!("Audit archive: {}", path.display()),
                Ok(Recovery::Fallback { artifact, .. }) => {
                    error!(
                        "Audit archive written to the fallback location {}; move it next to {} and keep it secure",
                        artifact.display(),
                        report.destination.display()
                    );
                    println!("Audit archive (fallback): {}", artifact.display());
                    return ExitCode::from(EXIT_AUDIT_FAILED);
                }
                Err(e) => {
                    error!("Fallback audit archive was not written either: {}", e);
                    error!("The destination holds de-identified slides with no mapping back to their sources");
                    return ExitCode::from(EXIT_AUDIT_FAILED);
                }
            }
        }
    }

    if report.has_failures() {
        ExitCode::from(EXIT_FILE_FAILURES)
    } else {
        ExitCode::SUCCESS
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::from(EXIT_FATAL);
    }

    let slide = SlideRef::new(&config.path);
    let handle = match FormatInspector.open(&slide).await {
        Ok(handle) => handle,
        Err(InspectError::Unsupported { reason }) => {
            eprintln!("Unsupported: {}", reason);
            return ExitCode::from(EXIT_FATAL);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if config.json {
        let images: serde_json::Map<String, serde_json::Value> = ImageKind::ALL
            .iter()
            .map(|kind| {
                let value = match handle.associated_image(*kind) {
                    Some(image) => serde_json::json!({
                        "encoding": image.encoding,
                        "bytes": image.len(),
                        "width": image.dimensions.map(|(w, _)| w),
                        "height": image.dimensions.map(|(_, h)| h),
                    }),
                    None => serde_json::Value::Null,
                };
                (kind.name().to_string(), value)
            })
            .collect();

        let json = serde_json::json!({
            "path": slide.path(),
            "format": handle.format().name(),
            "images": images,
            "properties": handle.properties(),
        });
        match serde_json::to_string_pretty(&json) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(EXIT_FATAL);
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("{}", slide.path().display());
    println!("═════════════════════════════════");
    println!("Format: {}", handle.format().name());
    for kind in ImageKind::ALL {
        match handle.associated_image(kind) {
            Some(image) => {
                let size = image
                    .dimensions
                    .map(|(w, h)| format!("{}x{}", w, h))
                    .unwrap_or_else(|| "unknown size".to_string());
                println!(
                    "✓ {}: {:?}, {}, {} bytes",
                    kind.name(),
                    image.encoding,
                    size,
                    image.len()
                );
            }
            None => println!("✗ {}: not present", kind.name()),
        }
    }

    println!();
    println!("Properties:");
    println!("─────────────────");
    if handle.properties().is_empty() {
        println!("  (none)");
    }
    for (key, value) in handle.properties() {
        println!("  {} = {}", key, value);
    }

    ExitCode::SUCCESS
}
