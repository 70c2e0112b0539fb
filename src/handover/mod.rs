//! Append-only, human-readable lifecycle log (`HANDOVER.md`).

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub struct HandoverLog {
    path: PathBuf,
}

impl HandoverLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_rejection(&self, video_name: &str, at: DateTime<Local>) -> Result<()> {
        self.append(&format!(
            "## Rejection Log\n\n- **{}**: User rejected video `{}`\n",
            at.format(TIMESTAMP_FORMAT),
            video_name
        ))?;
        tracing::info!("Rejection recorded in {}", self.path.display());
        Ok(())
    }

    pub fn record_completion(&self, archived: &Path, at: DateTime<Local>) -> Result<()> {
        self.append(&format!(
            "---\n\n\
             ## Project Lifecycle: Completed\n\n\
             - **Completed at**: {}\n\
             - **Archived video**: `{}`\n\
             - **Status**: Distribution complete. Temp files cleaned.\n",
            at.format(TIMESTAMP_FORMAT),
            archived.display()
        ))?;
        tracing::info!("Completion recorded in {}", self.path.display());
        Ok(())
    }

    /// Never rewrites existing content
    fn append(&self, section: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let mut file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open handover log")?;
        write!(file, "\n{}", section).context("Failed to append to handover log")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn appends_without_touching_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("HANDOVER.md");
        std::fs::write(&path, "# Handover\n\nExisting notes.\n").unwrap();

        let log = HandoverLog::new(&path);
        log.record_rejection("word_of_the_day.mp4", at()).unwrap();
        log.record_completion(Path::new("permanent_archive/2026-03-14/word_of_the_day.mp4"), at())
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Handover\n\nExisting notes.\n"));
        assert!(content.contains(
            "## Rejection Log\n\n- **2026-03-14T09:26:53.000**: User rejected video `word_of_the_day.mp4`"
        ));
        assert!(content.contains("## Project Lifecycle: Completed"));
        assert!(content.contains("`permanent_archive/2026-03-14/word_of_the_day.mp4`"));
        assert!(content.find("Rejection Log").unwrap() < content.find("Lifecycle").unwrap());
    }

    #[test]
    fn creates_missing_log() {
        let dir = TempDir::new().unwrap();
        let log = HandoverLog::new(dir.path().join("HANDOVER.md"));
        log.record_rejection("a.mp4", at()).unwrap();
        assert!(log.path().exists());
    }
}
