use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// One completed run in permanent storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub date: NaiveDate,
    pub path: PathBuf,
}

/// Moves distributed videos into `<root>/YYYY-MM-DD/`
pub struct Archiver {
    root: PathBuf,
}

impl Archiver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn archive(&self, video: &Path, date: NaiveDate) -> Result<ArchiveRecord> {
        let file_name = video
            .file_name()
            .with_context(|| format!("Not a file path: {}", video.display()))?;

        let dest_dir = self.root.join(date.format("%Y-%m-%d").to_string());
        fs_err::create_dir_all(&dest_dir)?;
        let dest = unique_destination(&dest_dir, Path::new(file_name));

        move_file(video, &dest)?;
        tracing::info!("Archived {} -> {}", video.display(), dest.display());

        Ok(ArchiveRecord { date, path: dest })
    }
}

/// `dir/name`, or `dir/<stem>-N.<ext>` with the lowest free N when earlier runs archived the
/// same name on the same date
fn unique_destination(dir: &Path, file_name: &Path) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_name.extension().map(|e| e.to_string_lossy().into_owned());

    (2u32..)
        .map(|n| match &extension {
            Some(ext) => dir.join(format!("{}-{}.{}", stem, n, ext)),
            None => dir.join(format!("{}-{}", stem, n)),
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// Rename, or copy then remove when the rename crosses filesystems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Err(e) = std::fs::rename(from, to) {
        tracing::debug!("Rename failed ({}), copying instead", e);
        fs_err::copy(from, to).context("Failed to copy video into archive")?;
        fs_err::remove_file(from).context("Failed to remove archived video from exports")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn moves_into_dated_directory() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("exports").join("word_of_the_day.mp4");
        std::fs::create_dir_all(video.parent().unwrap()).unwrap();
        std::fs::write(&video, "video").unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let record = Archiver::new(dir.path().join("permanent_archive"))
            .archive(&video, date)
            .unwrap();

        assert_eq!(
            record.path,
            dir.path().join("permanent_archive/2026-03-14/word_of_the_day.mp4")
        );
        assert_eq!(record.date, date);
        assert!(!video.exists());
        assert_eq!(std::fs::read_to_string(&record.path).unwrap(), "video");
    }

    #[test]
    fn same_day_runs_keep_every_archived_video() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("exports").join("word_of_the_day.mp4");
        std::fs::create_dir_all(video.parent().unwrap()).unwrap();
        let archiver = Archiver::new(dir.path().join("permanent_archive"));
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();

        std::fs::write(&video, "first run").unwrap();
        let first = archiver.archive(&video, date).unwrap();
        std::fs::write(&video, "second run").unwrap();
        let second = archiver.archive(&video, date).unwrap();
        std::fs::write(&video, "third run").unwrap();
        let third = archiver.archive(&video, date).unwrap();

        let day = dir.path().join("permanent_archive/2026-10-18");
        assert_eq!(first.path, day.join("word_of_the_day.mp4"));
        assert_eq!(second.path, day.join("word_of_the_day-2.mp4"));
        assert_eq!(third.path, day.join("word_of_the_day-3.mp4"));
        assert_eq!(std::fs::read_to_string(&first.path).unwrap(), "first run");
        assert_eq!(std::fs::read_to_string(&second.path).unwrap(), "second run");
        assert_eq!(std::fs::read_to_string(&third.path).unwrap(), "third run");
    }

    #[test]
    fn missing_video_is_an_error() {
        let dir = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert!(Archiver::new(dir.path())
            .archive(&dir.path().join("absent.mp4"), date)
            .is_err());
    }
}
