//! Independent per-platform uploads, aggregated under the any-of success rule.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub mod instagram;
pub mod tiktok;

pub use instagram::InstagramPlatform;
pub use tiktok::TikTokPlatform;

use crate::checkpoint::ScriptDocument;
use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOutcome {
    Published { id: String },
    /// Credentials absent or placeholders; not an attempt
    Skipped { reason: String },
    /// The platform rejected the credential itself
    AuthExpired { hint: String },
    Failed { reason: String },
}

impl PlatformOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, PlatformOutcome::Published { .. })
    }
}

impl fmt::Display for PlatformOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformOutcome::Published { id } => write!(f, "published ({})", id),
            PlatformOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            PlatformOutcome::AuthExpired { hint } => write!(f, "credential expired: {}", hint),
            PlatformOutcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// A social platform adapter
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether usable credentials are configured
    fn is_configured(&self) -> bool;

    /// Upload `video`. Transport errors may be returned as `Err`; the distributor records them
    /// as [`PlatformOutcome::Failed`].
    async fn publish(&self, video: &Path, caption: &str) -> Result<PlatformOutcome>;
}

/// Per-platform outcomes of one distribution attempt
#[derive(Debug, Clone, Default)]
pub struct DistributionReport {
    outcomes: BTreeMap<String, PlatformOutcome>,
}

impl DistributionReport {
    pub fn insert(&mut self, platform: impl Into<String>, outcome: PlatformOutcome) {
        self.outcomes.insert(platform.into(), outcome);
    }

    pub fn get(&self, platform: &str) -> Option<&PlatformOutcome> {
        self.outcomes.get(platform)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PlatformOutcome)> {
        self.outcomes.iter()
    }

    pub fn any_succeeded(&self) -> bool {
        self.outcomes.values().any(PlatformOutcome::succeeded)
    }
}

pub struct Distributor {
    platforms: Vec<Box<dyn Platform>>,
}

impl Distributor {
    pub fn new(platforms: Vec<Box<dyn Platform>>) -> Self {
        Self { platforms }
    }

    /// Every enabled platform in the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut platforms: Vec<Box<dyn Platform>> = Vec::new();
        let distribution = &config.distribution;
        let timeout = config.timeouts.upload();

        if distribution.tiktok.enabled {
            platforms.push(Box::new(TikTokPlatform::new(
                &distribution.tiktok,
                config.credentials.tiktok_access_token.clone(),
                timeout,
            )?));
        }
        if distribution.instagram.enabled {
            platforms.push(Box::new(InstagramPlatform::new(
                &distribution.instagram,
                config.credentials.instagram_user_id.clone(),
                config.credentials.instagram_access_token.clone(),
                timeout,
            )?));
        }

        Ok(Self::new(platforms))
    }

    pub fn platforms(&self) -> impl Iterator<Item = &dyn Platform> {
        self.platforms.iter().map(|p| p.as_ref())
    }

    /// Attempt every platform concurrently; one failing never cancels another
    pub async fn distribute(&self, video: &Path, caption: &str) -> DistributionReport {
        let attempts = self.platforms.iter().map(|platform| async move {
            let outcome = match platform.publish(video, caption).await {
                Ok(outcome) => outcome,
                Err(e) => PlatformOutcome::Failed {
                    reason: format!("{:#}", e),
                },
            };
            (platform.name(), outcome)
        });

        let mut report = DistributionReport::default();
        for (name, outcome) in join_all(attempts).await {
            match &outcome {
                PlatformOutcome::Published { .. } => tracing::info!("[{}] {}", name, outcome),
                PlatformOutcome::Skipped { .. } => tracing::warn!("[{}] {}", name, outcome),
                PlatformOutcome::AuthExpired { .. } | PlatformOutcome::Failed { .. } => {
                    tracing::error!("[{}] {}", name, outcome)
                }
            }
            report.insert(name, outcome);
        }

        if !report.any_succeeded() {
            tracing::warn!("No uploads succeeded. Check your platform credentials.");
        }
        report
    }
}

/// `"<Word> — <hook>\n\n<hashtags>"`; the file stem stands in when no checkpoint is available
pub fn build_caption(document: Option<&ScriptDocument>, video: &Path, hashtags: &[String]) -> String {
    let (word, hook) = match document {
        Some(doc) => (
            doc.word.clone(),
            doc.on_screen_text.first().cloned().unwrap_or_default(),
        ),
        None => (
            video
                .file_stem()
                .map(|s| s.to_string_lossy().replace('_', " "))
                .unwrap_or_else(|| "word".to_string()),
            String::new(),
        ),
    };

    let mut caption = capitalize(&word);
    if !hook.is_empty() {
        caption.push_str(" — ");
        caption.push_str(&hook);
    }
    if !hashtags.is_empty() {
        caption.push_str("\n\n");
        caption.push_str(&hashtags.join(" "));
    }
    caption
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
