use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::TextBackend;
use crate::config::ScriptConfig;
use crate::process::ExternalJob;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `claude -p` subprocess with the prompt on stdin
pub struct CliTextBackend {
    program: String,
    model: String,
    timeout: Duration,
}

impl CliTextBackend {
    pub fn new(program: String, model: String, timeout: Duration) -> Self {
        Self {
            program,
            model,
            timeout,
        }
    }

    fn job(&self, prompt: &str) -> ExternalJob {
        ExternalJob::new(&self.program, self.timeout)
            .args(["-p", "--model", self.model.as_str()])
            .stdin(prompt)
            // A nested session must not pick up the parent's session variables.
            .scrub_env_prefix("CLAUDE")
            .scrub_env_prefix("ANTHROPIC")
    }
}

#[async_trait]
impl TextBackend for CliTextBackend {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let output = self.job(prompt).run().await?;
        Ok(output.stdout)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Messages HTTP API
pub struct ApiTextBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ApiTextBackend {
    pub fn new(config: &ScriptConfig, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl TextBackend for ApiTextBackend {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .context("Messages API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            anyhow::bail!("Messages API returned {}: {}", status, message);
        }

        let body: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Messages API response")?;

        body.content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .context("Messages API response has no text block")
    }
}
