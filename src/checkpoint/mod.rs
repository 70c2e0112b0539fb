//! The persisted script document that hands work from generation to rendering.
//!
//! A checkpoint on disk is either absent or fully valid: [`CheckpointStore::save`] validates
//! before writing and replaces the file atomically, [`CheckpointStore::load`] re-validates.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Longest narration accepted, in characters
pub const MAX_NARRATION_CHARS: usize = 240;

/// Number of definitions carried through the pipeline
pub const DEFINITION_COUNT: usize = 3;

/// Number of on-screen text lines
pub const ON_SCREEN_TEXT_COUNT: usize = 2;

/// Every colour channel must stay below this value (`#444444`)
pub const DARKNESS_THRESHOLD: u8 = 0x44;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDocument {
    pub word: String,

    pub definitions: Vec<String>,

    /// Spoken script; its length drives audio duration and video pacing
    pub narration: String,

    pub on_screen_text: Vec<String>,

    #[serde(rename = "background_hex", alias = "background_color")]
    pub background_color: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phonetic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid `{field}`: {reason}")]
pub struct SchemaViolation {
    pub field: &'static str,
    pub reason: String,
}

impl SchemaViolation {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl ScriptDocument {
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        if self.word.trim().is_empty() {
            return Err(SchemaViolation::new("word", "must not be empty"));
        }

        if self.definitions.len() != DEFINITION_COUNT {
            return Err(SchemaViolation::new(
                "definitions",
                format!("expected {} entries, got {}", DEFINITION_COUNT, self.definitions.len()),
            ));
        }

        let narration_chars = self.narration.chars().count();
        if narration_chars == 0 {
            return Err(SchemaViolation::new("narration", "must not be empty"));
        }
        if narration_chars > MAX_NARRATION_CHARS {
            return Err(SchemaViolation::new(
                "narration",
                format!("{} characters exceeds the {} limit", narration_chars, MAX_NARRATION_CHARS),
            ));
        }

        if self.on_screen_text.len() != ON_SCREEN_TEXT_COUNT {
            return Err(SchemaViolation::new(
                "on_screen_text",
                format!(
                    "expected {} entries, got {}",
                    ON_SCREEN_TEXT_COUNT,
                    self.on_screen_text.len()
                ),
            ));
        }

        if !self.background_color.starts_with('#') {
            return Err(SchemaViolation::new("background_hex", "must start with '#'"));
        }
        match parse_hex_color(&self.background_color) {
            None => {
                return Err(SchemaViolation::new(
                    "background_hex",
                    format!("`{}` is not a hex colour", self.background_color),
                ))
            }
            Some(rgb) if !is_dark(rgb) => {
                return Err(SchemaViolation::new(
                    "background_hex",
                    format!(
                        "`{}` is too bright (every channel must be below #{:02x})",
                        self.background_color, DARKNESS_THRESHOLD
                    ),
                ))
            }
            Some(_) => {}
        }

        Ok(())
    }
}

/// Parse `#RGB` or `#RRGGBB`
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let nibble = c.to_digit(16)? as u8;
                rgb[i] = nibble * 16 + nibble;
            }
            Some(rgb)
        }
        6 => Some([channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?]),
        _ => None,
    }
}

pub fn is_dark(rgb: [u8; 3]) -> bool {
    rgb.iter().all(|&c| c < DARKNESS_THRESHOLD)
}

/// Full-document JSON checkpoint on disk
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and re-validate the checkpoint; `None` when the pipeline has not produced one yet
    pub fn load(&self) -> Result<Option<ScriptDocument>> {
        if !self.exists() {
            return Ok(None);
        }

        let content = fs_err::read_to_string(&self.path).context("Failed to read checkpoint")?;
        let document: ScriptDocument = serde_json::from_str(&content)
            .with_context(|| format!("Checkpoint {} is not a script document", self.path.display()))?;
        document
            .validate()
            .with_context(|| format!("Checkpoint {} fails validation", self.path.display()))?;

        Ok(Some(document))
    }

    /// Like [`load`](Self::load) but a missing checkpoint is an error
    pub fn require(&self) -> Result<ScriptDocument> {
        self.load()?
            .with_context(|| format!("No checkpoint at {}", self.path.display()))
    }

    /// Validate, then replace the checkpoint in one rename
    pub fn save(&self, document: &ScriptDocument) -> Result<()> {
        document.validate().context("Refusing to persist an invalid script document")?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs_err::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(document)?;
        let mut staged = tempfile::NamedTempFile::new_in(&dir)
            .context("Failed to stage checkpoint file")?;
        staged.write_all(json.as_bytes())?;
        staged.write_all(b"\n")?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .with_context(|| format!("Failed to write checkpoint {}", self.path.display()))?;

        tracing::info!("Checkpoint saved to {}", self.path.display());
        Ok(())
    }
}
