//! Human approval gate in front of distribution.

use anyhow::{Context, Result};
use chrono::Local;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::SystemTime;

use crate::handover::HandoverLog;
use crate::PipelineError;

const PROMPT: &str = "Approve this video for upload? (y/n): ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approved(PathBuf),
    Rejected(PathBuf),
}

pub struct ApprovalGate<'a> {
    exports_dir: PathBuf,
    viewer: Vec<String>,
    handover: &'a HandoverLog,
}

impl<'a> ApprovalGate<'a> {
    pub fn new(exports_dir: impl Into<PathBuf>, viewer: Vec<String>, handover: &'a HandoverLog) -> Self {
        Self {
            exports_dir: exports_dir.into(),
            viewer,
            handover,
        }
    }

    /// Show the newest export and block until the reviewer answers yes or no.
    /// A rejection is recorded in the handover log.
    pub fn review<R: BufRead, W: Write>(&self, input: R, output: W) -> Result<Decision> {
        let video = find_latest_video(&self.exports_dir)?;
        tracing::info!("Found video: {}", video.display());

        open_viewer(&self.viewer, &video);

        if prompt_decision(input, output)? {
            tracing::info!("Video approved: {}", video.display());
            return Ok(Decision::Approved(video));
        }

        let name = video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| video.display().to_string());
        self.handover.record_rejection(&name, Local::now())?;
        tracing::info!("Video rejected: {}", video.display());
        Ok(Decision::Rejected(video))
    }
}

/// Most recently modified `.mp4` in `dir`
pub fn find_latest_video(dir: &Path) -> Result<PathBuf> {
    let entries = match fs_err::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Err(PipelineError::NoExportedVideo(dir.display().to_string()).into()),
    };

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let path = entry?.path();
        let is_mp4 = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("mp4"))
            .unwrap_or(false);
        if !is_mp4 || !path.is_file() {
            continue;
        }

        let modified = fs_err::metadata(&path)?.modified()?;
        if latest.as_ref().map_or(true, |(best, _)| modified > *best) {
            latest = Some((modified, path));
        }
    }

    latest
        .map(|(_, path)| path)
        .ok_or_else(|| PipelineError::NoExportedVideo(dir.display().to_string()).into())
}

/// Launch the viewer without blocking the prompt. A watcher thread reaps the child when it exits;
/// its handle is returned so callers may join it. Launch failure only costs the preview.
pub fn open_viewer(viewer: &[String], video: &Path) -> Option<JoinHandle<Option<ExitStatus>>> {
    let Some((program, args)) = viewer.split_first() else {
        tracing::warn!("No viewer configured; review {} manually", video.display());
        return None;
    };

    let mut child = match Command::new(program).args(args).arg(video).stdin(Stdio::null()).spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(
                "Could not open viewer '{}': {}. Review {} manually.",
                program,
                e,
                video.display()
            );
            return None;
        }
    };
    tracing::debug!("Opened {} with {}", video.display(), program);

    let program = program.clone();
    Some(std::thread::spawn(move || match child.wait() {
        Ok(status) => {
            if !status.success() {
                tracing::debug!("Viewer '{}' exited with {}", program, status);
            }
            Some(status)
        }
        Err(e) => {
            tracing::debug!("Could not wait for viewer '{}': {}", program, e);
            None
        }
    }))
}

/// `y`/`yes` is true, `n`/`no` is false, anything else re-prompts. End of input is an error.
pub fn prompt_decision<R: BufRead, W: Write>(mut input: R, mut output: W) -> Result<bool> {
    loop {
        write!(output, "\n{}", PROMPT)?;
        output.flush()?;

        let mut line = String::new();
        let read = input.read_line(&mut line).context("Failed to read approval answer")?;
        if read == 0 {
            anyhow::bail!("Input closed before an approval decision was made");
        }

        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(output, "Please enter 'y' or 'n'.")?,
        }
    }
}
