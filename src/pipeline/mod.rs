//! Stage sequencing.
//!
//! [`GenerationPipeline`] runs acquisition through cleanup; [`ReleasePipeline`] runs approval
//! through archiving. The checkpoint file hands off from the first to the second, and every stage
//! blocks until its writes are on disk before the next one starts.

use anyhow::{Context, Result};
use chrono::Local;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::approval::{ApprovalGate, Decision};
use crate::archive::{ArchiveRecord, Archiver};
use crate::audio::SpeechSynthesizer;
use crate::checkpoint::{CheckpointStore, ScriptDocument};
use crate::cleanup::{remove_dir_if_present, CleanupGuard, CleanupOutcome};
use crate::config::Config;
use crate::distribute::{build_caption, DistributionReport, Distributor};
use crate::handover::HandoverLog;
use crate::mux::{MuxReport, Muxer};
use crate::notify;
use crate::output;
use crate::script::{backend_from_config, ScriptSynthesizer};
use crate::source::{Origin, SourceAcquirer};
use crate::visual::VisualStrategy;
use crate::PipelineError;

const GENERATION_STEPS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Acquire, synthesize and narrate from scratch
    Normal,
    /// Reuse the existing checkpoint and narration; no acquisition, text or speech calls
    Replay,
}

#[derive(Debug)]
pub struct GenerationReport {
    pub document: ScriptDocument,
    /// `None` in replay mode
    pub origin: Option<Origin>,
    pub export: MuxReport,
    pub cleanup: CleanupOutcome,
}

pub struct GenerationPipeline<'a> {
    config: &'a Config,
    mode: RunMode,
    quiet: bool,
}

impl<'a> GenerationPipeline<'a> {
    pub fn new(config: &'a Config, mode: RunMode, quiet: bool) -> Self {
        Self { config, mode, quiet }
    }

    pub async fn run(&self) -> Result<GenerationReport> {
        let paths = &self.config.paths;
        let store = CheckpointStore::new(paths.checkpoint_path());
        let audio_path = paths.audio_path();

        let (document, origin) = match self.mode {
            RunMode::Replay => {
                self.require_replay_artifacts(&store)?;
                output::print_step(1, GENERATION_STEPS, "Skipping fetch, using cached checkpoint");
                output::print_step(2, GENERATION_STEPS, "Skipping script synthesis, using cached checkpoint");
                (store.require()?, None)
            }
            RunMode::Normal => {
                output::print_step(1, GENERATION_STEPS, "Fetching Word of the Day...");
                let notifier = notify::from_credentials(
                    self.config.credentials.email.as_ref(),
                    &self.config.alerts.smtp_host,
                    self.config.timeouts.alert(),
                );
                let acquisition = SourceAcquirer::new(
                    &self.config.source,
                    paths.fallback_dataset(),
                    notifier.as_ref(),
                    self.config.timeouts.scrape(),
                )?
                .acquire()
                .await?;

                output::print_step(2, GENERATION_STEPS, "Generating script...");
                let backend = backend_from_config(self.config)?;
                let document = ScriptSynthesizer::new(backend.as_ref())
                    .synthesize(&acquisition.record)
                    .await?;
                store.save(&document)?;
                (document, Some(acquisition.origin))
            }
        };
        output::print_script(&document);

        if self.mode == RunMode::Replay {
            output::print_step(3, GENERATION_STEPS, "Skipping TTS, using cached audio");
        } else {
            output::print_step(3, GENERATION_STEPS, "Generating narration audio...");
            SpeechSynthesizer::new(
                &self.config.audio,
                self.config.credentials.elevenlabs_api_key.as_deref(),
                self.config.timeouts.tts(),
            )?
            .synthesize(&document.narration, &audio_path)
            .await?;
        }

        let strategy = VisualStrategy::from_config(self.config, self.quiet)?;
        output::print_step(4, GENERATION_STEPS, &format!("Producing visuals ({})...", strategy.name()));
        let visual = strategy.produce(&document).await?;

        output::print_step(5, GENERATION_STEPS, "Muxing audio and visuals...");
        let export = Muxer::new(
            &self.config.mux,
            self.config.timeouts.encode(),
            self.config.timeouts.probe(),
            self.quiet,
        )
        .mux(&visual, &audio_path, &paths.export_path())
        .await?;

        let cleanup = CleanupGuard::new(
            paths.export_path(),
            paths.temp_dir(),
            self.config.cleanup.min_export_bytes,
        )
        .run();

        Ok(GenerationReport {
            document,
            origin,
            export,
            cleanup,
        })
    }

    /// Replay never falls through to a network call
    fn require_replay_artifacts(&self, store: &CheckpointStore) -> Result<()> {
        if !store.exists() {
            return Err(PipelineError::MissingReplayArtifact {
                what: "checkpoint",
                path: store.path().display().to_string(),
            }
            .into());
        }

        let audio = self.config.paths.audio_path();
        if !audio.is_file() {
            return Err(PipelineError::MissingReplayArtifact {
                what: "audio artifact",
                path: audio.display().to_string(),
            }
            .into());
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ReleaseOutcome {
    /// Expected terminal state; the video stays in the exports directory
    Rejected(PathBuf),
    Distributed {
        archive: ArchiveRecord,
        report: DistributionReport,
    },
}

pub struct ReleasePipeline<'a> {
    config: &'a Config,
    distributor: Distributor,
}

impl<'a> ReleasePipeline<'a> {
    pub fn new(config: &'a Config, distributor: Distributor) -> Self {
        Self { config, distributor }
    }

    pub fn from_config(config: &'a Config) -> Result<Self> {
        Ok(Self::new(config, Distributor::from_config(config)?))
    }

    /// Approval, distribution, then archiving. Archiving runs only after at least one platform
    /// accepted the upload.
    pub async fn run<R: BufRead, W: Write>(&self, input: R, prompt_output: W) -> Result<ReleaseOutcome> {
        let paths = &self.config.paths;
        let handover = HandoverLog::new(paths.handover_log());

        let gate = ApprovalGate::new(
            paths.exports_dir(),
            self.config.approval.viewer_command(),
            &handover,
        );
        let video = match gate.review(input, prompt_output)? {
            Decision::Approved(video) => video,
            Decision::Rejected(video) => return Ok(ReleaseOutcome::Rejected(video)),
        };

        let document = match CheckpointStore::new(paths.checkpoint_path()).load() {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Checkpoint unusable for the caption: {:#}", e);
                None
            }
        };
        let caption = build_caption(document.as_ref(), &video, &self.config.distribution.hashtags);
        tracing::info!("Caption: {}", caption);

        let report = self.distributor.distribute(&video, &caption).await;
        output::print_distribution(&report);
        if !report.any_succeeded() {
            return Err(PipelineError::DistributionFailed(video.display().to_string()).into());
        }

        let archive = Archiver::new(paths.archive_dir())
            .archive(&video, Local::now().date_naive())
            .context("Distribution succeeded but archiving failed")?;

        let temp = paths.temp_dir();
        match remove_dir_if_present(&temp) {
            Ok(()) => tracing::info!("Removed {}", temp.display()),
            Err(e) => tracing::warn!("Could not remove {}: {}", temp.display(), e),
        }

        let archived = archive
            .path
            .strip_prefix(&paths.root)
            .unwrap_or(&archive.path);
        handover.record_completion(archived, Local::now())?;

        Ok(ReleaseOutcome::Distributed { archive, report })
    }
}
