//! Visual generation: either a locally rendered frame sequence or a remotely generated clip.
//!
//! Both strategies are single-attempt and blocking, and both stage their output next to the
//! previous run's artifact, replacing it only once the new one is confirmed present.

use anyhow::Result;
use std::path::{Path, PathBuf};

pub mod generate;
pub mod render;

pub use generate::{GenerationError, JobState, RemoteGenerator};
pub use render::LocalRenderer;

use crate::checkpoint::ScriptDocument;
use crate::config::{Config, VisualStrategyKind};

/// What the muxer receives as its video input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisualArtifact {
    /// Directory of `frame%06d.png`, played at the configured frame rate
    Frames(PathBuf),
    /// Short clip, looped under the narration
    Clip(PathBuf),
}

impl VisualArtifact {
    pub fn path(&self) -> &Path {
        match self {
            VisualArtifact::Frames(dir) => dir,
            VisualArtifact::Clip(path) => path,
        }
    }
}

pub enum VisualStrategy {
    LocalRender(LocalRenderer),
    RemoteGeneration(RemoteGenerator),
}

impl VisualStrategy {
    pub fn from_config(config: &Config, quiet: bool) -> Result<Self> {
        Ok(match config.visual.strategy {
            VisualStrategyKind::LocalRender => {
                VisualStrategy::LocalRender(LocalRenderer::from_config(config, quiet))
            }
            VisualStrategyKind::RemoteGeneration => {
                VisualStrategy::RemoteGeneration(RemoteGenerator::from_config(config, quiet)?)
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            VisualStrategy::LocalRender(_) => "local render",
            VisualStrategy::RemoteGeneration(_) => "remote generation",
        }
    }

    pub async fn produce(&self, document: &ScriptDocument) -> Result<VisualArtifact> {
        match self {
            VisualStrategy::LocalRender(renderer) => renderer.render().await,
            VisualStrategy::RemoteGeneration(generator) => generator.generate(document).await,
        }
    }
}

/// Sibling path used while a new artifact is being assembled
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".staging");
    path.with_file_name(name)
}
