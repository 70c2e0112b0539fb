use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{Platform, PlatformOutcome};
use crate::config::TikTokConfig;

const MAX_TITLE_CHARS: usize = 150;
const REAUTH_HINT: &str = "Re-authenticate at https://developers.tiktok.com/apps/";

#[derive(Debug, Serialize)]
struct InitRequest<'a> {
    post_info: PostInfo<'a>,
    source_info: SourceInfo,
}

#[derive(Debug, Serialize)]
struct PostInfo<'a> {
    title: String,
    privacy_level: &'a str,
    disable_duet: bool,
    disable_comment: bool,
    disable_stitch: bool,
}

#[derive(Debug, Serialize)]
struct SourceInfo {
    source: &'static str,
    video_size: u64,
    chunk_size: u64,
    total_chunk_count: u32,
}

#[derive(Debug, Default, Deserialize)]
struct InitResponse {
    data: Option<InitData>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct InitData {
    upload_url: String,
    publish_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

/// Content Posting API, direct post with a single-chunk upload
pub struct TikTokPlatform {
    client: reqwest::Client,
    api_url: String,
    privacy_level: String,
    access_token: Option<String>,
}

impl TikTokPlatform {
    pub fn new(config: &TikTokConfig, access_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            privacy_level: config.privacy_level.clone(),
            access_token,
        })
    }
}

#[async_trait]
impl Platform for TikTokPlatform {
    fn name(&self) -> &'static str {
        "tiktok"
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }

    async fn publish(&self, video: &Path, caption: &str) -> Result<PlatformOutcome> {
        let Some(token) = &self.access_token else {
            return Ok(PlatformOutcome::Skipped {
                reason: "TIKTOK_ACCESS_TOKEN not configured".to_string(),
            });
        };

        let bytes = fs_err::read(video).context("Failed to read video")?;
        let size = bytes.len() as u64;

        let request = InitRequest {
            post_info: PostInfo {
                title: caption.chars().take(MAX_TITLE_CHARS).collect(),
                privacy_level: &self.privacy_level,
                disable_duet: false,
                disable_comment: false,
                disable_stitch: false,
            },
            source_info: SourceInfo {
                source: "FILE_UPLOAD",
                video_size: size,
                chunk_size: size,
                total_chunk_count: 1,
            },
        };

        let response = self
            .client
            .post(format!("{}/v2/post/publish/video/init/", self.api_url))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .context("Upload init request failed")?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body: InitResponse = serde_json::from_str(&text).unwrap_or_default();

        let token_rejected = body
            .error
            .as_ref()
            .map_or(false, |e| e.code == "access_token_invalid");
        if status == StatusCode::UNAUTHORIZED || token_rejected {
            return Ok(PlatformOutcome::AuthExpired {
                hint: REAUTH_HINT.to_string(),
            });
        }

        if status != StatusCode::OK {
            return Ok(PlatformOutcome::Failed {
                reason: format!("init failed ({}): {}", status, text),
            });
        }

        let Some(data) = body.data else {
            let detail = body
                .error
                .map(|e| format!("{}: {}", e.code, e.message))
                .unwrap_or(text);
            return Ok(PlatformOutcome::Failed {
                reason: format!("init response has no upload target: {}", detail),
            });
        };

        tracing::debug!("TikTok upload initialized, publish id {}", data.publish_id);

        let upload = self
            .client
            .put(&data.upload_url)
            .header("Content-Type", "video/mp4")
            .header("Content-Range", format!("bytes 0-{}/{}", size.saturating_sub(1), size))
            .body(bytes)
            .send()
            .await
            .context("Video upload request failed")?;

        let upload_status = upload.status();
        if upload_status != StatusCode::OK && upload_status != StatusCode::CREATED {
            let text = upload.text().await.unwrap_or_default();
            return Ok(PlatformOutcome::Failed {
                reason: format!("upload failed ({}): {}", upload_status, text),
            });
        }

        Ok(PlatformOutcome::Published { id: data.publish_id })
    }
}
