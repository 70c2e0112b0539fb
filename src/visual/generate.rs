use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use url::Url;

use super::VisualArtifact;
use crate::checkpoint::ScriptDocument;
use crate::config::Config;
use crate::output;
use crate::utils::format_file_size;

const PROMPT_PLACEHOLDER: &str = "{{prompt}}";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Generation job {job_id} still unfinished after {}s", .waited.as_secs())]
    WaitExceeded { job_id: String, waited: Duration },

    #[error("Unexpected response from generation backend: {0}")]
    Protocol(String),
}

/// Lifecycle of one generation job as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Done { output_url: String },
    Error { message: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done { .. } | JobState::Error { .. })
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    output_url: Option<String>,
    error: Option<String>,
}

impl TryFrom<StatusResponse> for JobState {
    type Error = GenerationError;

    fn try_from(response: StatusResponse) -> Result<Self, GenerationError> {
        match response.status.as_str() {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "done" => response
                .output_url
                .map(|output_url| JobState::Done { output_url })
                .ok_or_else(|| GenerationError::Protocol("done without output_url".to_string())),
            "error" => Ok(JobState::Error {
                message: response.error.unwrap_or_else(|| "no error message".to_string()),
            }),
            other => Err(GenerationError::Protocol(format!("unknown job status '{}'", other))),
        }
    }
}

/// Queue-based clip generation backend
pub struct RemoteGenerator {
    client: reqwest::Client,
    endpoint: Url,
    job_template: PathBuf,
    api_key: Option<String>,
    poll_interval: Duration,
    max_wait: Duration,
    clip_path: PathBuf,
    quiet: bool,
}

impl RemoteGenerator {
    pub fn from_config(config: &Config, quiet: bool) -> Result<Self> {
        let remote = &config.visual.remote;
        // Trailing slash so `jobs` joins below any base path instead of replacing it
        let endpoint = Url::parse(&format!("{}/", remote.endpoint.trim_end_matches('/')))
            .with_context(|| format!("Invalid generation endpoint: {}", remote.endpoint))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeouts.render())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            job_template: config.paths.resolve(&remote.job_template),
            api_key: config.credentials.generation_api_key.clone(),
            poll_interval: Duration::from_secs(remote.poll_interval_secs),
            max_wait: Duration::from_secs(remote.max_wait_secs),
            clip_path: config.paths.clip_path(),
            quiet,
        })
    }

    /// Override the polling cadence
    pub fn with_polling(mut self, interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = interval;
        self.max_wait = max_wait;
        self
    }

    pub async fn generate(&self, document: &ScriptDocument) -> Result<VisualArtifact> {
        let prompt = build_prompt(document);
        tracing::info!("Generation prompt: {}", prompt);

        let template = fs_err::read_to_string(&self.job_template)
            .context("Failed to read generation job template")?;
        let mut job: serde_json::Value = serde_json::from_str(&template)
            .with_context(|| format!("Job template {} is not JSON", self.job_template.display()))?;
        substitute_prompt(&mut job, &prompt);

        let job_id = self.submit(&job).await?;
        tracing::info!("Submitted generation job {}", job_id);

        let output_url = self.wait_for_output(&job_id).await?;
        let size = self.download(&output_url).await?;
        tracing::info!(
            "Generated clip saved to {} ({})",
            self.clip_path.display(),
            format_file_size(size)
        );

        Ok(VisualArtifact::Clip(self.clip_path.clone()))
    }

    async fn submit(&self, job: &serde_json::Value) -> Result<String> {
        let url = self.endpoint.join("jobs").context("Invalid jobs URL")?;
        let response = self
            .authorized(self.client.post(url))
            .json(job)
            .send()
            .await
            .context("Failed to submit generation job")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Generation backend rejected job ({}): {}", status, body);
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Protocol(format!("submit response: {}", e)))?;
        Ok(submitted.id)
    }

    /// Poll at a fixed interval until the job is done, errors, or the wait budget runs out
    async fn wait_for_output(&self, job_id: &str) -> Result<String> {
        let progress = output::spinner("Waiting for generation job...", self.quiet);
        let started = Instant::now();
        let mut state = JobState::Queued;

        let result = loop {
            let next = match self.fetch_state(job_id).await {
                Ok(next) => next,
                Err(e) => break Err(e),
            };

            if next != state {
                tracing::debug!("Generation job {}: {:?} -> {:?}", job_id, state, next);
            }
            state = next;

            match &state {
                JobState::Done { output_url } => break Ok(output_url.clone()),
                JobState::Error { message } => {
                    break Err(GenerationError::JobFailed {
                        job_id: job_id.to_string(),
                        message: message.clone(),
                    }
                    .into())
                }
                JobState::Queued | JobState::Running => {
                    let waited = started.elapsed();
                    if waited + self.poll_interval > self.max_wait {
                        break Err(GenerationError::WaitExceeded {
                            job_id: job_id.to_string(),
                            waited,
                        }
                        .into());
                    }
                    progress.set_message(format!(
                        "Generation job {:?} ({}s elapsed)",
                        state,
                        waited.as_secs()
                    ));
                    sleep(self.poll_interval).await;
                }
            }
        };

        progress.finish_and_clear();
        result
    }

    async fn fetch_state(&self, job_id: &str) -> Result<JobState> {
        let url = self
            .endpoint
            .join(&format!("jobs/{}", job_id))
            .context("Invalid job status URL")?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .context("Failed to fetch generation job status")?
            .error_for_status()
            .context("Generation job status request failed")?;

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Protocol(format!("status response: {}", e)))?;
        Ok(JobState::try_from(body)?)
    }

    /// Download into a `.part` sibling and rename over the previous clip only when complete
    async fn download(&self, output_url: &str) -> Result<u64> {
        let url = self
            .endpoint
            .join(output_url)
            .with_context(|| format!("Invalid output URL: {}", output_url))?;

        let bytes = self
            .authorized(self.client.get(url))
            .send()
            .await
            .context("Failed to download generated clip")?
            .error_for_status()
            .context("Generated clip download failed")?
            .bytes()
            .await
            .context("Failed to read generated clip")?;

        if bytes.is_empty() {
            return Err(GenerationError::Protocol("generated clip is empty".to_string()).into());
        }

        if let Some(parent) = self.clip_path.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let part = crate::audio::part_path(&self.clip_path);
        fs_err::write(&part, &bytes)?;
        fs_err::rename(&part, &self.clip_path)?;

        Ok(bytes.len() as u64)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

/// Natural-language prompt from the word, its pronunciation and first definition
pub fn build_prompt(document: &ScriptDocument) -> String {
    let mut prompt = format!("Cinematic abstract visual for the word \"{}\"", document.word);
    if let Some(phonetic) = document.phonetic.as_deref().filter(|p| !p.is_empty()) {
        prompt.push_str(&format!(" {}", phonetic));
    }
    if let Some(definition) = document.definitions.first() {
        prompt.push_str(&format!(", meaning {}", definition));
    }
    prompt.push_str(&format!(
        ". Dark moody palette around {}, slow camera motion, no text.",
        document.background_color
    ));
    prompt
}

/// Replace `{{prompt}}` in every string value of the template
pub fn substitute_prompt(value: &mut serde_json::Value, prompt: &str) {
    match value {
        serde_json::Value::String(s) if s.contains(PROMPT_PLACEHOLDER) => {
            *s = s.replace(PROMPT_PLACEHOLDER, prompt);
        }
        serde_json::Value::Array(items) => {
            items.iter_mut().for_each(|item| substitute_prompt(item, prompt));
        }
        serde_json::Value::Object(map) => {
            map.values_mut().for_each(|item| substitute_prompt(item, prompt));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::tests::sample_document;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer, dir: &TempDir) -> RemoteGenerator {
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::write(
            dir.path().join("templates").join("generation_job.json"),
            r#"{"prompt": "{{prompt}}", "frames": 48, "extra": ["style: {{prompt}}"]}"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.paths.root = dir.path().to_path_buf();
        config.visual.remote.endpoint = format!("{}/", server.uri());
        config.credentials.generation_api_key = Some("gen-key".to_string());
        RemoteGenerator::from_config(&config, true)
            .unwrap()
            .with_polling(Duration::from_millis(10), Duration::from_millis(500))
    }

    async fn mount_submit(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/jobs"))
            .and(header("authorization", "Bearer gen-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-7"})))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_status(server: &MockServer, body: serde_json::Value, times: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path("/jobs/job-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body));
        match times {
            Some(n) => mock.up_to_n_times(n).mount(server).await,
            None => mock.mount(server).await,
        }
    }

    #[tokio::test]
    async fn polls_until_done_then_downloads() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_submit(&server).await;
        mount_status(&server, json!({"status": "queued"}), Some(1)).await;
        mount_status(&server, json!({"status": "running"}), Some(2)).await;
        mount_status(&server, json!({"status": "done", "output_url": "/outputs/clip.mp4"}), None)
            .await;
        Mock::given(method("GET"))
            .and(path("/outputs/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 4096]))
            .expect(1)
            .mount(&server)
            .await;

        let artifact = generator(&server, &dir).generate(&sample_document()).await.unwrap();

        let clip = dir.path().join("temp").join("clip.mp4");
        assert_eq!(artifact, VisualArtifact::Clip(clip.clone()));
        assert_eq!(std::fs::read(&clip).unwrap().len(), 4096);

        let requests = server.received_requests().await.unwrap();
        let submitted: serde_json::Value = requests
            .iter()
            .find(|r| r.method.as_str() == "POST")
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .unwrap();
        assert!(submitted["prompt"].as_str().unwrap().contains("\"petrichor\""));
        assert!(submitted["extra"][0].as_str().unwrap().starts_with("style: Cinematic"));
        assert_eq!(submitted["frames"], 48);
    }

    #[tokio::test]
    async fn reported_job_error_is_fatal() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_submit(&server).await;
        mount_status(&server, json!({"status": "error", "error": "CUDA out of memory"}), None).await;

        let err = generator(&server, &dir).generate(&sample_document()).await.unwrap_err();
        match err.downcast_ref::<GenerationError>() {
            Some(GenerationError::JobFailed { job_id, message }) => {
                assert_eq!(job_id, "job-7");
                assert_eq!(message, "CUDA out of memory");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exceeding_max_wait_is_fatal_and_keeps_previous_clip() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let clip = dir.path().join("temp").join("clip.mp4");
        std::fs::create_dir_all(clip.parent().unwrap()).unwrap();
        std::fs::write(&clip, "previous").unwrap();

        mount_submit(&server).await;
        mount_status(&server, json!({"status": "running"}), None).await;

        let err = generator(&server, &dir)
            .with_polling(Duration::from_millis(10), Duration::from_millis(60))
            .generate(&sample_document())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<GenerationError>(),
            Some(GenerationError::WaitExceeded { .. })
        ));
        assert_eq!(std::fs::read_to_string(&clip).unwrap(), "previous");
    }

    #[tokio::test]
    async fn unknown_status_is_a_protocol_error() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_submit(&server).await;
        mount_status(&server, json!({"status": "paused"}), None).await;

        let err = generator(&server, &dir).generate(&sample_document()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerationError>(),
            Some(GenerationError::Protocol(_))
        ));
    }

    #[test]
    fn done_requires_an_output_url() {
        let response = StatusResponse {
            status: "done".to_string(),
            output_url: None,
            error: None,
        };
        assert!(JobState::try_from(response).is_err());
        assert!(JobState::Error { message: String::new() }.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn prompt_uses_word_phonetic_and_first_definition() {
        let prompt = build_prompt(&sample_document());
        assert!(prompt.contains("\"petrichor\" [pet-ri-kawr]"));
        assert!(prompt.contains("meaning (noun) the smell of rain on dry earth"));
        assert!(prompt.contains("#1a1a2e"));
    }
}
