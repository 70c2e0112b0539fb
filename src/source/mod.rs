use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod fallback;
pub mod page;

use crate::checkpoint::DEFINITION_COUNT;
use crate::config::SourceConfig;
use crate::notify::{notify_best_effort, Notifier};
use page::ExtractionStrategy;

/// Raw acquisition result: the day's term, its phonetic spelling and exactly three definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkRecord {
    term: String,
    phonetic: String,
    definitions: Vec<String>,
}

impl WorkRecord {
    /// Build a record, bringing `definitions` to exactly three entries under `padding`
    pub fn new(
        term: impl Into<String>,
        phonetic: impl Into<String>,
        definitions: Vec<String>,
        padding: &PaddingPolicy,
    ) -> Result<Self> {
        let term = term.into().trim().to_string();
        if term.is_empty() {
            anyhow::bail!("Extracted term is empty");
        }

        let definitions = padding.apply(&term, definitions)?;

        Ok(Self {
            term,
            phonetic: phonetic.into().trim().to_string(),
            definitions,
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn phonetic(&self) -> &str {
        &self.phonetic
    }

    pub fn definitions(&self) -> &[String] {
        &self.definitions
    }
}

/// How a short definition list is brought up to three entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PaddingPolicy {
    /// Append `template` (with `{term}` substituted) until there are three
    Filler { template: String },
    /// Fewer than three definitions is an extraction failure
    Strict,
}

impl Default for PaddingPolicy {
    fn default() -> Self {
        PaddingPolicy::Filler {
            template: "Used in context: The word '{term}' enriches any sentence.".to_string(),
        }
    }
}

impl PaddingPolicy {
    pub fn apply(&self, term: &str, definitions: Vec<String>) -> Result<Vec<String>> {
        let mut definitions: Vec<String> = definitions
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        if definitions.is_empty() {
            anyhow::bail!("No definitions extracted for '{}'", term);
        }

        match self {
            PaddingPolicy::Filler { template } => {
                while definitions.len() < DEFINITION_COUNT {
                    definitions.push(template.replace("{term}", term));
                }
            }
            PaddingPolicy::Strict if definitions.len() < DEFINITION_COUNT => {
                anyhow::bail!(
                    "Only {} definition(s) extracted for '{}' and padding is disabled",
                    definitions.len(),
                    term
                );
            }
            PaddingPolicy::Strict => {}
        }

        definitions.truncate(DEFINITION_COUNT);
        Ok(definitions)
    }
}

/// Where the returned record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Scraped(ExtractionStrategy),
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Acquisition {
    pub record: WorkRecord,
    pub origin: Origin,
}

/// Obtains the day's record from the source page, failing over to the local dataset
pub struct SourceAcquirer<'a> {
    config: &'a SourceConfig,
    fallback_dataset: PathBuf,
    notifier: &'a dyn Notifier,
    client: reqwest::Client,
}

impl<'a> SourceAcquirer<'a> {
    pub fn new(
        config: &'a SourceConfig,
        fallback_dataset: impl AsRef<Path>,
        notifier: &'a dyn Notifier,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            fallback_dataset: fallback_dataset.as_ref().to_path_buf(),
            notifier,
            client,
        })
    }

    /// Scrape the source page; on any failure alert once and draw from the fallback dataset.
    /// Only an unusable fallback dataset is an error.
    pub async fn acquire(&self) -> Result<Acquisition> {
        match self.scrape().await {
            Ok((record, strategy)) => {
                tracing::info!(
                    "Scraped ({}): {} {}, {} definitions",
                    strategy,
                    record.term(),
                    record.phonetic(),
                    record.definitions().len()
                );
                Ok(Acquisition {
                    record,
                    origin: Origin::Scraped(strategy),
                })
            }
            Err(e) => {
                tracing::warn!("Scraping failed: {:#}", e);
                notify_best_effort(
                    self.notifier,
                    "WOTD scraper failed",
                    &format!(
                        "The word-of-the-day scraper failed:\n\n{:#}\n\nFalling back to local data.",
                        e
                    ),
                )
                .await;

                let dataset = fallback::FallbackDataset::load(&self.fallback_dataset)?;
                let record = dataset.choose(&self.config.padding, &mut rand::thread_rng())?;
                tracing::info!("Using local fallback word: {}", record.term());
                Ok(Acquisition {
                    record,
                    origin: Origin::Fallback,
                })
            }
        }
    }

    async fn scrape(&self) -> Result<(WorkRecord, ExtractionStrategy)> {
        tracing::debug!("Fetching source page: {}", self.config.url);

        let html = self
            .client
            .get(&self.config.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        page::extract(&html, &self.config.padding)
    }
}
