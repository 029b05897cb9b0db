//! Command-line configuration for wsi-deid.
//!
//! Options come from command-line arguments, with `WSI_DEID_` environment
//! variables as fallback where that makes sense:
//!
//! - `WSI_DEID_NO_PSEUDONYMIZE` - Keep original file names
//! - `WSI_DEID_NO_AUDIT_LOG` - Skip the audit archive
//! - `WSI_DEID_PSEUDONYM_KEY` - Secret for keyed pseudonyms
//! - `WSI_DEID_REDACTION_TIMEOUT` - Per-file redaction budget in seconds (default: 600, 0 disables)
//! - `WSI_DEID_AUDIT_FALLBACK_DIR` - Where the audit archive goes if it cannot be written next to the destination
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use wsi_deid::config::{Cli, Command};
//!
//! match Cli::parse().command {
//!     Command::Deid(config) => println!("De-identifying {}", config.folder.display()),
//!     Command::Inspect(config) => println!("Inspecting {}", config.path.display()),
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::deid::{DeidOptions, DEFAULT_REDACTION_TIMEOUT};

// =============================================================================
// Default Values
// =============================================================================

/// Default per-file redaction timeout in seconds.
pub const DEFAULT_REDACTION_TIMEOUT_SECS: u64 = DEFAULT_REDACTION_TIMEOUT.as_secs();

/// Shortest pseudonym key accepted.
pub const MIN_PSEUDONYM_KEY_LEN: usize = 16;

// =============================================================================
// CLI Arguments
// =============================================================================

/// wsi-deid - Batch de-identification of Whole Slide Images.
///
/// Copies a folder of SVS, NDPI and MRXS slides to `<folder>_DEID`, removes
/// their label and macro images, and writes an audit archive mapping old
/// names to new ones.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-deid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// De-identify every slide in a folder
    Deid(DeidConfig),

    /// Show the format, associated images and properties of one slide
    Inspect(InspectConfig),
}

/// Options of the `deid` command.
#[derive(Args, Debug, Clone)]
pub struct DeidConfig {
    /// Folder containing the slides. Output goes to `<FOLDER>_DEID`.
    pub folder: PathBuf,

    // =========================================================================
    // Naming
    // =========================================================================
    /// Keep original file names instead of replacing them with digests.
    #[arg(long, default_value_t = false, env = "WSI_DEID_NO_PSEUDONYMIZE")]
    pub no_pseudonymize: bool,

    /// Secret for keyed (HMAC-SHA256) pseudonyms.
    ///
    /// Without a key, names are plain SHA-256 digests of the original stem.
    #[arg(long, env = "WSI_DEID_PSEUDONYM_KEY", hide_env_values = true)]
    pub pseudonym_key: Option<String>,

    // =========================================================================
    // Audit
    // =========================================================================
    /// Do not write the audit archive.
    ///
    /// WARNING: without the archive the mapping back to original slides is lost.
    #[arg(long, default_value_t = false, env = "WSI_DEID_NO_AUDIT_LOG")]
    pub no_audit_log: bool,

    /// Directory for the audit archive when it cannot be written next to the
    /// destination folder (default: the system temporary directory).
    #[arg(long, env = "WSI_DEID_AUDIT_FALLBACK_DIR")]
    pub audit_fallback_dir: Option<PathBuf>,

    // =========================================================================
    // Processing
    // =========================================================================
    /// Per-file redaction timeout in seconds (0 disables).
    #[arg(long, default_value_t = DEFAULT_REDACTION_TIMEOUT_SECS, env = "WSI_DEID_REDACTION_TIMEOUT")]
    pub redaction_timeout: u64,

    /// List the planned name mapping without copying anything.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl DeidConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.folder.as_os_str().is_empty() {
            return Err("A slide folder is required".to_string());
        }

        if self.folder.file_name().is_none() {
            return Err(format!(
                "{} has no folder name to derive the destination from",
                self.folder.display()
            ));
        }

        if let Some(key) = &self.pseudonym_key {
            if self.no_pseudonymize {
                return Err(
                    "--pseudonym-key has no effect with --no-pseudonymize; drop one of them"
                        .to_string(),
                );
            }
            if key.len() < MIN_PSEUDONYM_KEY_LEN {
                return Err(format!(
                    "pseudonym key must be at least {} bytes",
                    MIN_PSEUDONYM_KEY_LEN
                ));
            }
        }

        Ok(())
    }

    /// Directory for a fallback audit archive.
    pub fn audit_fallback_dir(&self) -> PathBuf {
        self.audit_fallback_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Redaction budget, `None` when disabled.
    pub fn redaction_timeout(&self) -> Option<Duration> {
        match self.redaction_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Options for the orchestrator.
    pub fn options(&self) -> DeidOptions {
        DeidOptions {
            pseudonymize_filenames: !self.no_pseudonymize,
            produce_audit_log: !self.no_audit_log,
            pseudonym_key: self.pseudonym_key.clone(),
            redaction_timeout: self.redaction_timeout(),
        }
    }
}

/// Options of the `inspect` command.
#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Slide file to inspect.
    pub path: PathBuf,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InspectConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("A slide path is required".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DeidConfig {
        DeidConfig {
            folder: PathBuf::from("/data/Cases"),
            no_pseudonymize: false,
            pseudonym_key: None,
            no_audit_log: false,
            audit_fallback_dir: None,
            redaction_timeout: DEFAULT_REDACTION_TIMEOUT_SECS,
            dry_run: false,
            verbose: false,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_short_key() {
        let mut config = test_config();
        config.pseudonym_key = Some("short".to_string());

        let result = config.validate();
        assert!(result.unwrap_err().contains("at least"));
    }

    #[test]
    fn test_key_without_pseudonymization() {
        let mut config = test_config();
        config.pseudonym_key = Some("0123456789abcdef0123".to_string());
        assert!(config.validate().is_ok());

        config.no_pseudonymize = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_root_folder_rejected() {
        let mut config = test_config();
        config.folder = PathBuf::from("/");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_options() {
        let mut config = test_config();
        let options = config.options();
        assert!(options.pseudonymize_filenames);
        assert!(options.produce_audit_log);
        assert_eq!(options.redaction_timeout, Some(Duration::from_secs(600)));

        config.no_pseudonymize = true;
        config.no_audit_log = true;
        config.redaction_timeout = 0;
        let options = config.options();
        assert!(!options.pseudonymize_filenames);
        assert!(!options.produce_audit_log);
        assert_eq!(options.redaction_timeout, None);
    }

    #[test]
    fn test_audit_fallback_dir() {
        let mut config = test_config();
        assert_eq!(config.audit_fallback_dir(), std::env::temp_dir());

        config.audit_fallback_dir = Some(PathBuf::from("/secure/audit"));
        assert_eq!(config.audit_fallback_dir(), PathBuf::from("/secure/audit"));
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from([
            "wsi-deid",
            "deid",
            "/data/Cases",
            "--no-audit-log",
            "--redaction-timeout",
            "30",
        ])
        .unwrap();
        match cli.command {
            Command::Deid(config) => {
                assert!(config.no_audit_log);
                assert_eq!(config.redaction_timeout(), Some(Duration::from_secs(30)));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["wsi-deid", "inspect", "a.svs", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Inspect(InspectConfig { json: true, .. })));
    }
}
