//! Script synthesis: prompt the generative text backend, then parse and validate its answer.
//!
//! A malformed answer is fatal. Nothing is retried or patched up here, because narration length
//! drives audio duration and with it the pacing of the whole video.

use anyhow::{Context, Result};
use async_trait::async_trait;

pub mod backend;

pub use backend::{ApiTextBackend, CliTextBackend};

use crate::checkpoint::{
    SchemaViolation, ScriptDocument, DEFINITION_COUNT, MAX_NARRATION_CHARS, ON_SCREEN_TEXT_COUNT,
};
use crate::config::{Config, TextBackendKind};
use crate::source::WorkRecord;

const PERSONA: &str = "You are a witty scientific communicator. \
Use the provided word and 3 definitions to write a 15-second script. \
Tone: Fast-paced, high-intelligence, slightly snarky.";

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Backend returned an empty response")]
    Empty,

    #[error("Backend response is not a script document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] SchemaViolation),
}

/// A generative text service answering one prompt with raw text
#[async_trait]
pub trait TextBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Choose the configured backend
pub fn backend_from_config(config: &Config) -> Result<Box<dyn TextBackend>> {
    let timeout = config.timeouts.script();
    Ok(match config.script.backend {
        TextBackendKind::Cli => Box::new(CliTextBackend::new(
            config.script.cli_program.clone(),
            config.script.model.clone(),
            timeout,
        )),
        TextBackendKind::Api => {
            let api_key = config
                .credentials
                .anthropic_api_key
                .clone()
                .context("ANTHROPIC_API_KEY is required for the api script backend")?;
            Box::new(ApiTextBackend::new(&config.script, api_key, timeout)?)
        }
    })
}

pub struct ScriptSynthesizer<'a> {
    backend: &'a dyn TextBackend,
}

impl<'a> ScriptSynthesizer<'a> {
    pub fn new(backend: &'a dyn TextBackend) -> Self {
        Self { backend }
    }

    /// One backend call, no retry; any malformed answer aborts the run
    pub async fn synthesize(&self, record: &WorkRecord) -> Result<ScriptDocument> {
        let prompt = build_prompt(record);
        tracing::debug!("Prompt for {} ({} chars)", self.backend.name(), prompt.len());

        let raw = self
            .backend
            .complete(&prompt)
            .await
            .with_context(|| format!("{} backend failed", self.backend.name()))?;

        let document = parse_script(&raw, record)
            .with_context(|| format!("Rejected script from {} backend", self.backend.name()))?;

        tracing::info!(
            "Script ready: {} chars of narration, background {}",
            document.narration.chars().count(),
            document.background_color
        );
        Ok(document)
    }
}

pub fn build_prompt(record: &WorkRecord) -> String {
    let definitions = record
        .definitions()
        .iter()
        .enumerate()
        .map(|(i, d)| format!("  {}. {}", i + 1, d))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{persona}\n\n\
         Word: {word}\n\
         Phonetic: {phonetic}\n\
         Definitions:\n{definitions}\n\n\
         Return ONLY valid JSON with these exact keys:\n\
         {{\n\
         \x20 \"word\": \"string - the word of the day\",\n\
         \x20 \"definitions\": \"list of {defs} definition strings\",\n\
         \x20 \"narration\": \"string - max {max} characters, the spoken script\",\n\
         \x20 \"on_screen_text\": \"list of exactly {lines} short punchy phrases\",\n\
         \x20 \"background_hex\": \"a dark, cinematic hex color code (e.g. #1a1a2e)\"\n\
         }}\n\n\
         Constraints:\n\
         - narration must be <= {max} characters\n\
         - on_screen_text must have exactly {lines} items\n\
         - background_hex must be a dark color (value < #444444)\n\
         - No markdown fences, no commentary - raw JSON only.",
        persona = PERSONA,
        word = record.term(),
        phonetic = record.phonetic(),
        definitions = definitions,
        defs = DEFINITION_COUNT,
        max = MAX_NARRATION_CHARS,
        lines = ON_SCREEN_TEXT_COUNT,
    )
}

/// Remove a surrounding ``` fence (with optional language tag) if present
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let body = match trimmed.split_once('\n') {
        Some((_, rest)) => rest,
        None => return trimmed.trim_start_matches('`').trim(),
    };

    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parse the backend's answer and validate every field
pub fn parse_script(raw: &str, record: &WorkRecord) -> Result<ScriptDocument, ScriptError> {
    let json = strip_fences(raw);
    if json.is_empty() {
        return Err(ScriptError::Empty);
    }

    let mut document: ScriptDocument = serde_json::from_str(json)?;
    if document.phonetic.is_none() && !record.phonetic().is_empty() {
        document.phonetic = Some(record.phonetic().to_string());
    }

    document.validate()?;
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PaddingPolicy;

    pub(crate) fn record() -> WorkRecord {
        WorkRecord::new(
            "petrichor",
            "[pet-ri-kawr]",
            vec!["(noun) the smell of rain".to_string()],
            &PaddingPolicy::default(),
        )
        .unwrap()
    }

    const VALID: &str = r##"{
        "word": "petrichor",
        "definitions": ["one", "two", "three"],
        "narration": "Rain has a smell. It is called petrichor.",
        "on_screen_text": ["Rain smells", "Petrichor"],
        "background_hex": "#101820"
    }"##;

    struct StaticBackend(&'static str);

    #[async_trait]
    impl TextBackend for StaticBackend {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn prompt_embeds_record_and_constraints() {
        let prompt = build_prompt(&record());
        assert!(prompt.contains("Word: petrichor"));
        assert!(prompt.contains("Phonetic: [pet-ri-kawr]"));
        assert!(prompt.contains("  1. (noun) the smell of rain"));
        assert!(prompt.contains("  3. Used in context"));
        assert!(prompt.contains("narration must be <= 240 characters"));
        assert!(prompt.contains("\"background_hex\""));
    }

    #[test]
    fn strips_optional_fences() {
        assert_eq!(strip_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_fences("```\n{\"a\": 1}\n```\n"), "{\"a\": 1}");
        assert_eq!(strip_fences("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(strip_fences("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn parses_and_carries_phonetic() {
        let doc = parse_script(VALID, &record()).unwrap();
        assert_eq!(doc.word, "petrichor");
        assert_eq!(doc.phonetic.as_deref(), Some("[pet-ri-kawr]"));

        let fenced = format!("```json\n{}\n```", VALID);
        assert_eq!(parse_script(&fenced, &record()).unwrap(), doc);
    }

    #[test]
    fn rejects_malformed_answers() {
        assert!(matches!(parse_script("", &record()), Err(ScriptError::Empty)));
        assert!(matches!(
            parse_script("Sure! Here's your script.", &record()),
            Err(ScriptError::Parse(_))
        ));
        assert!(matches!(
            parse_script(r#"{"word": 3}"#, &record()),
            Err(ScriptError::Parse(_))
        ));

        let bright = VALID.replace("#101820", "#ff8800");
        match parse_script(&bright, &record()) {
            Err(ScriptError::Invalid(v)) => assert_eq!(v.field, "background_hex"),
            other => panic!("unexpected: {other:?}"),
        }

        let too_many = VALID.replace(r#"["Rain smells", "Petrichor"]"#, r#"["a", "b", "c"]"#);
        assert!(matches!(parse_script(&too_many, &record()), Err(ScriptError::Invalid(_))));
    }

    #[tokio::test]
    async fn synthesizer_returns_validated_document() {
        let backend = StaticBackend(VALID);
        let doc = ScriptSynthesizer::new(&backend).synthesize(&record()).await.unwrap();
        assert_eq!(doc.on_screen_text.len(), 2);
    }

    #[tokio::test]
    async fn synthesizer_fails_on_invalid_document() {
        let long = VALID.replace(
            "Rain has a smell. It is called petrichor.",
            &"x".repeat(MAX_NARRATION_CHARS + 1),
        );
        let backend = StaticBackend(Box::leak(long.into_boxed_str()));
        let err = ScriptSynthesizer::new(&backend).synthesize(&record()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("narration"));
    }
}
