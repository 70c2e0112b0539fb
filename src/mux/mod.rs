//! Final encode: audio plus frames or a looped clip, trimmed to the shorter track.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::MuxConfig;
use crate::output;
use crate::process::ExternalJob;
use crate::utils::{format_duration, format_file_size};
use crate::visual::VisualArtifact;

const FRAME_PATTERN: &str = "frame%06d.png";

#[derive(Debug, Clone)]
pub struct MuxReport {
    pub path: PathBuf,
    pub size: u64,
    /// Reported by ffprobe; `None` when probing was unavailable
    pub duration: Option<f64>,
}

pub struct Muxer<'a> {
    config: &'a MuxConfig,
    encode_timeout: Duration,
    probe_timeout: Duration,
    quiet: bool,
}

impl<'a> Muxer<'a> {
    pub fn new(config: &'a MuxConfig, encode_timeout: Duration, probe_timeout: Duration, quiet: bool) -> Self {
        Self {
            config,
            encode_timeout,
            probe_timeout,
            quiet,
        }
    }

    pub async fn mux(&self, visual: &VisualArtifact, audio: &Path, output_path: &Path) -> Result<MuxReport> {
        if !audio.is_file() {
            anyhow::bail!("Audio artifact not found: {}", audio.display());
        }
        if let Some(parent) = output_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let job = ExternalJob::new(&self.config.ffmpeg, self.encode_timeout)
            .args(build_args(visual, audio, output_path, self.config));
        tracing::info!("Encoding: {}", job.describe());

        let progress = output::spinner("Encoding video...", self.quiet);
        let result = job.run().await;
        progress.finish_and_clear();
        result.context("Encoder failed")?;

        let size = fs_err::metadata(output_path)
            .context("Encoder reported success but wrote no output")?
            .len();

        let duration = match probe_duration(&self.config.ffprobe, output_path, self.probe_timeout).await {
            Ok(duration) => duration,
            Err(e) => {
                tracing::warn!("Could not probe output duration: {:#}", e);
                None
            }
        };

        tracing::info!(
            "Output: {} ({}, {})",
            output_path.display(),
            format_file_size(size),
            duration.map(format_duration).unwrap_or_else(|| "unknown duration".to_string())
        );

        Ok(MuxReport {
            path: output_path.to_path_buf(),
            size,
            duration,
        })
    }
}

/// ffmpeg argv (program excluded)
pub fn build_args(visual: &VisualArtifact, audio: &Path, output_path: &Path, config: &MuxConfig) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into()];

    match visual {
        VisualArtifact::Frames(dir) => {
            args.extend([
                "-framerate".into(),
                config.frame_rate.to_string(),
                "-i".into(),
                dir.join(FRAME_PATTERN).to_string_lossy().into_owned(),
            ]);
        }
        VisualArtifact::Clip(clip) => {
            // Loop forever; -shortest below ends the output with the narration.
            args.extend([
                "-stream_loop".into(),
                "-1".into(),
                "-i".into(),
                clip.to_string_lossy().into_owned(),
            ]);
        }
    }

    args.extend([
        "-i".into(),
        audio.to_string_lossy().into_owned(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        config.video_codec.clone(),
        "-b:v".into(),
        config.video_bitrate.clone(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        config.audio_bitrate.clone(),
        "-shortest".into(),
        "-movflags".into(),
        "+faststart".into(),
        output_path.to_string_lossy().into_owned(),
    ]);

    args
}

/// Container duration in seconds via ffprobe
pub async fn probe_duration(ffprobe: &str, path: &Path, timeout: Duration) -> Result<Option<f64>> {
    let output = ExternalJob::new(ffprobe, timeout)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path.to_string_lossy())
        .run()
        .await?;

    let info: serde_json::Value =
        serde_json::from_str(&output.stdout).context("ffprobe output is not JSON")?;

    Ok(info["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_tool(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn frame_sequence_args() {
        let config = MuxConfig::default();
        let args = build_args(
            &VisualArtifact::Frames(PathBuf::from("temp/frames")),
            Path::new("temp/audio.mp3"),
            Path::new("exports/out.mp4"),
            &config,
        );

        let fr = position(&args, "-framerate");
        assert_eq!(args[fr + 1], "30");
        assert_eq!(args[fr + 3], "temp/frames/frame%06d.png");
        assert!(!args.contains(&"-stream_loop".to_string()));
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(args[position(&args, "-c:v") + 1], "libx264");
        assert_eq!(args[position(&args, "-pix_fmt") + 1], "yuv420p");
        assert_eq!(args.last().unwrap(), "exports/out.mp4");
    }

    #[test]
    fn clip_is_looped_and_trimmed_to_audio() {
        let config = MuxConfig {
            video_codec: "h264_videotoolbox".to_string(),
            ..MuxConfig::default()
        };
        let args = build_args(
            &VisualArtifact::Clip(PathBuf::from("temp/clip.mp4")),
            Path::new("temp/audio.mp3"),
            Path::new("exports/out.mp4"),
            &config,
        );

        let lp = position(&args, "-stream_loop");
        assert_eq!(args[lp + 1], "-1");
        assert_eq!(args[lp + 3], "temp/clip.mp4");
        // The looped input must come before the audio so -shortest ends on the narration.
        assert!(lp < position(&args, "temp/audio.mp3"));
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(args[position(&args, "-movflags") + 1], "+faststart");
        assert_eq!(args[position(&args, "-c:v") + 1], "h264_videotoolbox");
        assert!(!args.contains(&"-framerate".to_string()));
    }

    #[tokio::test]
    async fn encoder_failure_is_fatal_with_diagnostics() {
        let dir = TempDir::new().unwrap();
        let audio = dir.path().join("audio.mp3");
        std::fs::write(&audio, "mp3").unwrap();
        let config = MuxConfig {
            ffmpeg: fake_tool(&dir, "ffmpeg", "echo 'Unknown encoder' >&2; exit 1"),
            ..MuxConfig::default()
        };

        let muxer = Muxer::new(&config, Duration::from_secs(5), Duration::from_secs(5), true);
        let err = muxer
            .mux(
                &VisualArtifact::Frames(dir.path().join("frames")),
                &audio,
                &dir.path().join("exports").join("out.mp4"),
            )
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Unknown encoder"));
    }

    #[tokio::test]
    async fn reports_size_and_probed_duration() {
        let dir = TempDir::new().unwrap();
        let audio = dir.path().join("audio.mp3");
        std::fs::write(&audio, "mp3").unwrap();
        let config = MuxConfig {
            // The output path is ffmpeg's last argument.
            ffmpeg: fake_tool(&dir, "ffmpeg", "for last; do :; done\nprintf 'video-bytes' > \"$last\""),
            ffprobe: fake_tool(&dir, "ffprobe", r#"echo '{"format": {"duration": "14.016000"}}'"#),
            ..MuxConfig::default()
        };

        let out = dir.path().join("exports").join("out.mp4");
        let report = Muxer::new(&config, Duration::from_secs(5), Duration::from_secs(5), true)
            .mux(&VisualArtifact::Clip(dir.path().join("clip.mp4")), &audio, &out)
            .await
            .unwrap();

        assert_eq!(report.size, 11);
        assert_eq!(report.duration, Some(14.016));
    }

    #[tokio::test]
    async fn missing_ffprobe_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let audio = dir.path().join("audio.mp3");
        std::fs::write(&audio, "mp3").unwrap();
        let config = MuxConfig {
            ffmpeg: fake_tool(&dir, "ffmpeg", "for last; do :; done\nprintf 'x' > \"$last\""),
            ffprobe: "definitely-not-ffprobe-wotd".to_string(),
            ..MuxConfig::default()
        };

        let report = Muxer::new(&config, Duration::from_secs(5), Duration::from_secs(5), true)
            .mux(
                &VisualArtifact::Frames(dir.path().join("frames")),
                &audio,
                &dir.path().join("out.mp4"),
            )
            .await
            .unwrap();
        assert_eq!(report.duration, None);
    }

    async fn ffmpeg(args: &[&str]) {
        ExternalJob::new("ffmpeg", Duration::from_secs(60))
            .args(["-y", "-loglevel", "error"])
            .args(args.iter().copied())
            .run()
            .await
            .unwrap();
    }

    /// Needs real ffmpeg and ffprobe on PATH: `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn short_clip_loops_to_narration_length() {
        let dir = TempDir::new().unwrap();
        let clip = dir.path().join("clip.mp4");
        let audio = dir.path().join("audio.m4a");
        let clip_arg = clip.to_string_lossy().into_owned();
        let audio_arg = audio.to_string_lossy().into_owned();

        ffmpeg(&["-f", "lavfi", "-i", "testsrc=size=320x240:rate=30", "-t", "3", "-c:v", "mpeg4", &clip_arg]).await;
        ffmpeg(&["-f", "lavfi", "-i", "sine=frequency=440:sample_rate=44100", "-t", "14", "-c:a", "aac", &audio_arg])
            .await;

        // mpeg4 ships with every ffmpeg build; the duration property does not depend on the codec.
        let config = MuxConfig {
            video_codec: "mpeg4".to_string(),
            video_bitrate: "500k".to_string(),
            ..MuxConfig::default()
        };
        let out = dir.path().join("exports").join("word_of_the_day.mp4");
        let report = Muxer::new(&config, Duration::from_secs(120), Duration::from_secs(10), true)
            .mux(&VisualArtifact::Clip(clip), &audio, &out)
            .await
            .unwrap();

        let duration = report.duration.unwrap();
        assert!((duration - 14.0).abs() < 0.5, "output lasted {}s", duration);
    }

    #[tokio::test]
    async fn missing_audio_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = MuxConfig::default();
        let muxer = Muxer::new(&config, Duration::from_secs(1), Duration::from_secs(1), true);
        assert!(muxer
            .mux(
                &VisualArtifact::Frames(dir.path().join("frames")),
                &dir.path().join("audio.mp3"),
                &dir.path().join("out.mp4"),
            )
            .await
            .is_err());
    }
}
