use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use super::{Platform, PlatformOutcome};
use crate::config::InstagramConfig;

/// Graph API error code for an expired or revoked token
const OAUTH_EXCEPTION: i64 = 190;
const REAUTH_HINT: &str = "Generate a new long-lived access token and update INSTAGRAM_ACCESS_TOKEN";

#[derive(Debug, Deserialize)]
struct ContainerResponse {
    id: String,
    uri: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status_code: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Either the parsed body or the outcome a failed call maps to
enum GraphReply<T> {
    Parsed(T),
    Outcome(PlatformOutcome),
}

/// Graph API Reels publishing with a resumable upload
pub struct InstagramPlatform {
    client: reqwest::Client,
    graph_url: String,
    user_id: Option<String>,
    access_token: Option<String>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl InstagramPlatform {
    pub fn new(
        config: &InstagramConfig,
        user_id: Option<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            graph_url: config.graph_url.trim_end_matches('/').to_string(),
            user_id,
            access_token,
            poll_interval: Duration::from_secs(config.status_poll_secs),
            max_wait: Duration::from_secs(config.status_max_wait_secs),
        })
    }

    pub fn with_polling(mut self, interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = interval;
        self.max_wait = max_wait;
        self
    }

    async fn read<T: DeserializeOwned>(&self, response: reqwest::Response, step: &str) -> Result<GraphReply<T>> {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            let parsed = serde_json::from_str(&text)
                .with_context(|| format!("Unexpected {} response: {}", step, text))?;
            return Ok(GraphReply::Parsed(parsed));
        }

        let graph_error = serde_json::from_str::<GraphErrorBody>(&text).ok().map(|b| b.error);
        let expired = status == StatusCode::UNAUTHORIZED
            || graph_error.as_ref().map_or(false, |e| e.code == OAUTH_EXCEPTION);
        if expired {
            return Ok(GraphReply::Outcome(PlatformOutcome::AuthExpired {
                hint: REAUTH_HINT.to_string(),
            }));
        }

        let detail = graph_error
            .map(|e| format!("code {}: {}", e.code, e.message))
            .unwrap_or(text);
        Ok(GraphReply::Outcome(PlatformOutcome::Failed {
            reason: format!("{} failed ({}): {}", step, status, detail),
        }))
    }

    async fn wait_until_finished(&self, container_id: &str, token: &str) -> Result<Option<PlatformOutcome>> {
        let started = Instant::now();
        loop {
            let response = self
                .client
                .get(format!("{}/{}", self.graph_url, container_id))
                .query(&[("fields", "status_code,status"), ("access_token", token)])
                .send()
                .await
                .context("Container status request failed")?;

            let status: StatusResponse = match self.read(response, "status check").await? {
                GraphReply::Parsed(status) => status,
                GraphReply::Outcome(outcome) => return Ok(Some(outcome)),
            };

            match status.status_code.as_str() {
                "FINISHED" => return Ok(None),
                "ERROR" | "EXPIRED" => {
                    return Ok(Some(PlatformOutcome::Failed {
                        reason: format!(
                            "container {}: {}",
                            status.status_code,
                            status.status.unwrap_or_default()
                        ),
                    }))
                }
                _ => {}
            }

            if started.elapsed() + self.poll_interval > self.max_wait {
                return Ok(Some(PlatformOutcome::Failed {
                    reason: format!(
                        "container still {} after {}s",
                        status.status_code,
                        started.elapsed().as_secs()
                    ),
                }));
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl Platform for InstagramPlatform {
    fn name(&self) -> &'static str {
        "instagram"
    }

    fn is_configured(&self) -> bool {
        self.user_id.is_some() && self.access_token.is_some()
    }

    async fn publish(&self, video: &Path, caption: &str) -> Result<PlatformOutcome> {
        let (Some(user_id), Some(token)) = (&self.user_id, &self.access_token) else {
            return Ok(PlatformOutcome::Skipped {
                reason: "INSTAGRAM_USER_ID/INSTAGRAM_ACCESS_TOKEN not configured".to_string(),
            });
        };

        let bytes = fs_err::read(video).context("Failed to read video")?;
        let size = bytes.len();

        let response = self
            .client
            .post(format!("{}/{}/media", self.graph_url, user_id))
            .form(&[
                ("media_type", "REELS"),
                ("upload_type", "resumable"),
                ("caption", caption),
                ("access_token", token.as_str()),
            ])
            .send()
            .await
            .context("Container creation request failed")?;
        let container: ContainerResponse = match self.read(response, "container creation").await? {
            GraphReply::Parsed(container) => container,
            GraphReply::Outcome(outcome) => return Ok(outcome),
        };
        tracing::debug!("Instagram container {} created", container.id);

        let response = self
            .client
            .post(&container.uri)
            .header("Authorization", format!("OAuth {}", token))
            .header("offset", "0")
            .header("file_size", size.to_string())
            .body(bytes)
            .send()
            .await
            .context("Video upload request failed")?;
        if let GraphReply::Outcome(outcome) = self.read::<serde_json::Value>(response, "upload").await? {
            return Ok(outcome);
        }

        if let Some(outcome) = self.wait_until_finished(&container.id, token).await? {
            return Ok(outcome);
        }

        let response = self
            .client
            .post(format!("{}/{}/media_publish", self.graph_url, user_id))
            .form(&[("creation_id", container.id.as_str()), ("access_token", token.as_str())])
            .send()
            .await
            .context("Publish request failed")?;
        match self.read::<IdResponse>(response, "publish").await? {
            GraphReply::Parsed(media) => Ok(PlatformOutcome::Published { id: media.id }),
            GraphReply::Outcome(outcome) => Ok(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn platform(server: &MockServer) -> InstagramPlatform {
        let config = InstagramConfig {
            graph_url: format!("{}/v21.0", server.uri()),
            ..InstagramConfig::default()
        };
        InstagramPlatform::new(
            &config,
            Some("1789".to_string()),
            Some("ig-token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_polling(Duration::from_millis(10), Duration::from_millis(300))
    }

    fn video(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("word_of_the_day.mp4");
        std::fs::write(&path, vec![3u8; 512]).unwrap();
        path
    }

    async fn mount_container(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v21.0/1789/media"))
            .and(body_string_contains("upload_type=resumable"))
            .and(body_string_contains("media_type=REELS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "c-42",
                "uri": format!("{}/ig-api-upload/v21.0/c-42", server.uri())
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ig-api-upload/v21.0/c-42"))
            .and(header("authorization", "OAuth ig-token"))
            .and(header("file_size", "512"))
            .and(header("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn resumable_reel_flow() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_container(&server).await;
        Mock::given(method("GET"))
            .and(path("/v21.0/c-42"))
            .and(query_param("access_token", "ig-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status_code": "IN_PROGRESS"})))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v21.0/c-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status_code": "FINISHED"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v21.0/1789/media_publish"))
            .and(body_string_contains("creation_id=c-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "media-9"})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = platform(&server).publish(&video(&dir), "Petrichor").await.unwrap();
        assert_eq!(outcome, PlatformOutcome::Published { id: "media-9".into() });
    }

    #[tokio::test]
    async fn oauth_exception_is_reported_as_expired() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "Error validating access token", "type": "OAuthException", "code": 190}
            })))
            .mount(&server)
            .await;

        let outcome = platform(&server).publish(&video(&dir), "c").await.unwrap();
        assert!(matches!(outcome, PlatformOutcome::AuthExpired { .. }));
    }

    #[tokio::test]
    async fn container_error_is_a_failure_without_publishing() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_container(&server).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": "ERROR", "status": "Unsupported codec"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v21.0/1789/media_publish"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        match platform(&server).publish(&video(&dir), "c").await.unwrap() {
            PlatformOutcome::Failed { reason } => assert!(reason.contains("Unsupported codec")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn processing_that_never_finishes_is_bounded() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_container(&server).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status_code": "IN_PROGRESS"})))
            .mount(&server)
            .await;

        let outcome = platform(&server)
            .with_polling(Duration::from_millis(10), Duration::from_millis(50))
            .publish(&video(&dir), "c")
            .await
            .unwrap();
        assert!(matches!(outcome, PlatformOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn missing_credentials_skip() {
        let config = InstagramConfig::default();
        let p = InstagramPlatform::new(&config, None, Some("t".into()), Duration::from_secs(1)).unwrap();
        assert!(!p.is_configured());
        assert!(matches!(
            p.publish(Path::new("unused.mp4"), "c").await.unwrap(),
            PlatformOutcome::Skipped { .. }
        ));
    }
}
