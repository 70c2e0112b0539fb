//! Narration audio via the ElevenLabs text-to-speech API.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::AudioConfig;
use crate::utils::format_file_size;

#[derive(Debug, Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

pub struct SpeechSynthesizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    voice_id: String,
    model_id: String,
}

impl SpeechSynthesizer {
    /// Fails when the API key is absent; audio is a mandatory stage
    pub fn new(config: &AudioConfig, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        let api_key = api_key
            .context("ELEVENLABS_API_KEY is not set")?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
        })
    }

    /// Synthesize `narration` into `output_path`; single attempt, empty audio is an error
    pub async fn synthesize(&self, narration: &str, output_path: &Path) -> Result<u64> {
        tracing::info!(
            "Narration ({} chars): {}",
            narration.chars().count(),
            narration.chars().take(80).collect::<String>()
        );

        let url = format!("{}/text-to-speech/{}", self.base_url, self.voice_id);
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&TextToSpeechRequest {
                text: narration,
                model_id: &self.model_id,
            })
            .send()
            .await
            .context("TTS request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("TTS API error ({}): {}", status, error_text);
        }

        let audio = response.bytes().await.context("Failed to read TTS audio")?;
        if audio.is_empty() {
            anyhow::bail!("TTS API returned zero bytes of audio");
        }

        write_replacing(output_path, &audio)?;

        let size = audio.len() as u64;
        tracing::info!("Audio saved to {} ({})", output_path.display(), format_file_size(size));
        Ok(size)
    }
}

/// Write next to `path`, then rename over it so a failed write never leaves a truncated file
fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent)?;
    }
    let staged = part_path(path);
    fs_err::write(&staged, bytes)?;
    fs_err::rename(&staged, path)?;
    Ok(())
}

pub(crate) fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
