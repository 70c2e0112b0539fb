//! Local seed dataset used when the source page cannot be scraped.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::path::Path;

use super::{PaddingPolicy, WorkRecord};
use crate::PipelineError;

#[derive(Debug, Clone, Deserialize)]
pub struct FallbackEntry {
    pub word: String,
    #[serde(default)]
    pub phonetic: String,
    pub definitions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FallbackDataset {
    entries: Vec<FallbackEntry>,
}

impl FallbackDataset {
    /// Load the dataset; unreadable, malformed or empty data is fatal
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .map_err(|e| PipelineError::FallbackUnavailable(e.to_string()))?;
        let entries: Vec<FallbackEntry> = serde_json::from_str(&content)
            .map_err(|e| PipelineError::FallbackUnavailable(format!("{}: {}", path.display(), e)))?;

        if entries.is_empty() {
            return Err(PipelineError::FallbackUnavailable(format!(
                "{} contains no entries",
                path.display()
            ))
            .into());
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pick one usable entry uniformly at random and bring it to three definitions.
    ///
    /// Seed entries are always padded: `Strict` governs scraped pages only, so a strict policy
    /// pads with the default filler here. Entries without a term or any non-blank definition
    /// are never chosen.
    pub fn choose<R: Rng + ?Sized>(&self, padding: &PaddingPolicy, rng: &mut R) -> Result<WorkRecord> {
        let usable: Vec<&FallbackEntry> = self.entries.iter().filter(|e| e.is_usable()).collect();
        let entry = usable.choose(rng).ok_or_else(|| {
            PipelineError::FallbackUnavailable("no entry has both a word and a definition".to_string())
        })?;

        let padding = match padding {
            PaddingPolicy::Filler { .. } => padding.clone(),
            PaddingPolicy::Strict => PaddingPolicy::default(),
        };

        WorkRecord::new(
            entry.word.to_lowercase(),
            entry.phonetic.clone(),
            entry.definitions.clone(),
            &padding,
        )
        .with_context(|| format!("Fallback entry '{}' is unusable", entry.word))
    }
}

impl FallbackEntry {
    fn is_usable(&self) -> bool {
        !self.word.trim().is_empty() && self.definitions.iter().any(|d| !d.trim().is_empty())
    }
}
