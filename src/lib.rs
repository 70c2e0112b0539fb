//! Word of the Day pipeline - turns a daily dictionary entry into a narrated short video
//!
//! The library is split into two invocable halves. [`pipeline::GenerationPipeline`] acquires the
//! word, writes the script checkpoint, synthesizes narration, produces visuals and muxes the final
//! video. [`pipeline::ReleasePipeline`] gates that video behind human approval, distributes it to
//! the configured social platforms and archives it.

pub mod approval;
pub mod archive;
pub mod audio;
pub mod checkpoint;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod distribute;
pub mod handover;
pub mod mux;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod script;
pub mod source;
pub mod utils;
pub mod visual;

pub use checkpoint::{CheckpointStore, ScriptDocument};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use pipeline::{GenerationPipeline, ReleaseOutcome, ReleasePipeline, RunMode};
pub use source::WorkRecord;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the pipeline's control flow
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Replay mode requires an existing {what} at {path}")]
    MissingReplayArtifact { what: &'static str, path: String },

    #[error("No exported video found in {0}")]
    NoExportedVideo(String),

    #[error("No platform accepted the upload; video left at {0} for a manual retry")]
    DistributionFailed(String),

    #[error("Local fallback dataset unavailable: {0}")]
    FallbackUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}
