use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{staging_path, VisualArtifact};
use crate::config::Config;
use crate::output;
use crate::process::ExternalJob;

/// Headless renderer invoked as an external process; reads the checkpoint, writes PNG frames
pub struct LocalRenderer {
    command: Vec<String>,
    working_dir: PathBuf,
    output_dir: PathBuf,
    frames_dir: PathBuf,
    checkpoint: PathBuf,
    timeout: Duration,
    quiet: bool,
}

impl LocalRenderer {
    pub fn from_config(config: &Config, quiet: bool) -> Self {
        let render = &config.visual.render;
        Self {
            command: render.command.clone(),
            working_dir: config.paths.resolve(&render.working_dir),
            output_dir: config.paths.resolve(&render.output_dir),
            frames_dir: config.paths.frames_dir(),
            checkpoint: config.paths.checkpoint_path(),
            timeout: config.timeouts.render(),
            quiet,
        }
    }

    pub async fn render(&self) -> Result<VisualArtifact> {
        let job = ExternalJob::from_argv(&self.command, self.timeout)
            .context("Render command is empty")?
            .current_dir(&self.working_dir)
            .env("WOTD_CHECKPOINT", absolute(&self.checkpoint).to_string_lossy())
            .env("WOTD_RENDER_OUTPUT", absolute(&self.output_dir).to_string_lossy());

        tracing::info!("Starting headless render: {}", job.describe());
        let progress = output::spinner("Rendering frames...", self.quiet);
        let result = job.run().await;
        progress.finish_and_clear();

        let finished = result.context("Renderer failed")?;
        if !finished.stdout.trim().is_empty() {
            tracing::debug!("Renderer output:\n{}", finished.stdout.trim());
        }

        let frames = collect_frames(&self.output_dir)?;
        if frames.is_empty() {
            anyhow::bail!("No PNG frames found in render output {}", self.output_dir.display());
        }

        install_frames(&frames, &self.frames_dir)?;
        tracing::info!(
            "Copied {} frames to {} in {:.1}s",
            frames.len(),
            self.frames_dir.display(),
            finished.elapsed.as_secs_f64()
        );

        Ok(VisualArtifact::Frames(self.frames_dir.clone()))
    }
}

/// Every `.png` under `root`, sorted by path
pub fn collect_frames(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("Render output directory not found: {}", root.display());
    }

    let mut frames = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs_err::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_png(&path) {
                frames.push(path);
            }
        }
    }

    frames.sort();
    Ok(frames)
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}

/// Copy `frames` into a staging dir as `frame%06d.png`, then swap it in for `frames_dir`
fn install_frames(frames: &[PathBuf], frames_dir: &Path) -> Result<()> {
    let staging = staging_path(frames_dir);
    if staging.exists() {
        fs_err::remove_dir_all(&staging)?;
    }
    fs_err::create_dir_all(&staging)?;

    for (i, source) in frames.iter().enumerate() {
        fs_err::copy(source, staging.join(format!("frame{:06}.png", i)))?;
    }

    if frames_dir.exists() {
        fs_err::remove_dir_all(frames_dir)?;
    }
    fs_err::rename(&staging, frames_dir)?;
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
