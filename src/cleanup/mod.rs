use std::fmt;
use std::path::{Path, PathBuf};

use crate::utils::format_file_size;

/// What the guard did, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed { export_size: u64 },
    MissingExport,
    ExportTooSmall { size: u64, threshold: u64 },
    RemovalFailed { reason: String },
}

impl fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupOutcome::Removed { export_size } => {
                write!(f, "removed transient files (export verified: {})", format_file_size(*export_size))
            }
            CleanupOutcome::MissingExport => write!(f, "skipped, export file not found"),
            CleanupOutcome::ExportTooSmall { size, threshold } => write!(
                f,
                "skipped, export is only {} bytes (< {} bytes)",
                size, threshold
            ),
            CleanupOutcome::RemovalFailed { reason } => write!(f, "removal failed: {}", reason),
        }
    }
}

/// Deletes the transient directory only behind a verified export
pub struct CleanupGuard {
    export_path: PathBuf,
    transient_dir: PathBuf,
    min_export_bytes: u64,
}

impl CleanupGuard {
    pub fn new(export_path: impl Into<PathBuf>, transient_dir: impl Into<PathBuf>, min_export_bytes: u64) -> Self {
        Self {
            export_path: export_path.into(),
            transient_dir: transient_dir.into(),
            min_export_bytes,
        }
    }

    /// Never fails; the outcome is logged and returned
    pub fn run(&self) -> CleanupOutcome {
        let outcome = self.evaluate();
        match &outcome {
            CleanupOutcome::Removed { .. } => {
                tracing::info!("Cleanup: {} ({})", outcome, self.transient_dir.display())
            }
            _ => tracing::warn!("Cleanup: {}", outcome),
        }
        outcome
    }

    fn evaluate(&self) -> CleanupOutcome {
        let size = match fs_err::metadata(&self.export_path) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return CleanupOutcome::MissingExport,
        };

        if size < self.min_export_bytes {
            return CleanupOutcome::ExportTooSmall {
                size,
                threshold: self.min_export_bytes,
            };
        }

        match remove_dir_if_present(&self.transient_dir) {
            Ok(()) => CleanupOutcome::Removed { export_size: size },
            Err(e) => CleanupOutcome::RemovalFailed {
                reason: e.to_string(),
            },
        }
    }
}

pub(crate) fn remove_dir_if_present(dir: &Path) -> std::io::Result<()> {
    match fs_err::remove_dir_all(dir) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
