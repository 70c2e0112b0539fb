//! Extraction strategies for the source page, tried in order.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::fmt;
use std::sync::OnceLock;

use super::{PaddingPolicy, WorkRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Embedded `script#json-current-wotd` payload
    StructuredData,
    /// Visible entry markup
    Layout,
}

impl ExtractionStrategy {
    pub const ORDERED: [ExtractionStrategy; 2] =
        [ExtractionStrategy::StructuredData, ExtractionStrategy::Layout];

    pub fn extract(&self, document: &Html, padding: &PaddingPolicy) -> Result<WorkRecord> {
        match self {
            ExtractionStrategy::StructuredData => extract_structured(document, padding),
            ExtractionStrategy::Layout => extract_layout(document, padding),
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStrategy::StructuredData => write!(f, "structured data"),
            ExtractionStrategy::Layout => write!(f, "layout"),
        }
    }
}

/// Run the strategies in order; the first one producing a term and a definition wins
pub fn extract(html: &str, padding: &PaddingPolicy) -> Result<(WorkRecord, ExtractionStrategy)> {
    let document = Html::parse_document(html);
    let mut failures = Vec::new();

    for strategy in ExtractionStrategy::ORDERED {
        match strategy.extract(&document, padding) {
            Ok(record) => return Ok((record, strategy)),
            Err(e) => {
                tracing::debug!("{} extraction failed: {:#}", strategy, e);
                failures.push(format!("{}: {:#}", strategy, e));
            }
        }
    }

    Err(anyhow!("No extraction strategy succeeded ({})", failures.join("; ")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WotdPayload {
    headword: String,
    pronunciation: Option<Pronunciation>,
    definition: Option<String>,
    part_of_speech: Option<String>,
    example_sentence: Option<String>,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Pronunciation {
    phonetic: Option<Phonetic>,
}

#[derive(Debug, Deserialize)]
struct Phonetic {
    html: Option<String>,
}

fn extract_structured(document: &Html, padding: &PaddingPolicy) -> Result<WorkRecord> {
    let script = select_first(document, "script#json-current-wotd")?
        .ok_or_else(|| anyhow!("No embedded word-of-the-day payload"))?;

    let raw: String = script.text().collect();
    let payload: WotdPayload =
        serde_json::from_str(raw.trim()).context("Malformed embedded payload")?;

    let term = payload.headword.trim().to_lowercase();

    let phonetic = payload
        .pronunciation
        .and_then(|p| p.phonetic)
        .and_then(|p| p.html)
        .map(|html| strip_tags(&html))
        .filter(|p| !p.is_empty())
        .map(|p| format!("[{}]", p))
        .unwrap_or_default();

    let mut definitions = Vec::new();
    let definition = payload.definition.map(|d| strip_tags(&d)).unwrap_or_default();
    if !definition.is_empty() {
        definitions.push(with_part_of_speech(
            payload.part_of_speech.as_deref().unwrap_or(""),
            &definition,
        ));
    }
    if let Some(example) = payload.example_sentence.map(|e| strip_tags(&e)).filter(|e| !e.is_empty()) {
        definitions.push(format!("Example: {}", example));
    }
    if let Some(body) = payload.body.map(|b| strip_tags(&b)).filter(|b| !b.is_empty()) {
        definitions.push(body);
    }

    WorkRecord::new(term, phonetic, definitions, padding)
}

fn extract_layout(document: &Html, padding: &PaddingPolicy) -> Result<WorkRecord> {
    let term = select_text(document, "a.wotd-entry-headword")?
        .ok_or_else(|| anyhow!("Could not locate the headword element"))?
        .to_lowercase();

    let phonetic = select_text(document, "p.wotd-entry-phonetics")?.unwrap_or_default();

    let mut definitions = Vec::new();
    if let Some(definition) = select_text(document, "p.wotd-entry-definition")? {
        let pos = select_text(document, "div.wotd-entry-pos")?.unwrap_or_default();
        definitions.push(with_part_of_speech(&pos, &definition));
    }
    if let Some(example) = select_text(document, "p.wotd-entry-example")? {
        definitions.push(format!("Example: {}", example));
    }
    if let Some(explanation) = select_text(document, "div.wotd-entry-explanation-section p")? {
        definitions.push(explanation);
    }

    WorkRecord::new(term, phonetic, definitions, padding)
}

fn with_part_of_speech(pos: &str, definition: &str) -> String {
    let pos = pos.trim();
    if pos.is_empty() {
        definition.to_string()
    } else {
        format!("({}) {}", pos, definition)
    }
}

fn select_first<'a>(document: &'a Html, css: &str) -> Result<Option<ElementRef<'a>>> {
    let selector = Selector::parse(css).map_err(|e| anyhow!("Invalid selector `{}`: {:?}", css, e))?;
    Ok(document.select(&selector).next())
}

fn select_text(document: &Html, css: &str) -> Result<Option<String>> {
    Ok(select_first(document, css)?
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty()))
}

/// Visible text of an HTML fragment, entities decoded
pub fn strip_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"));
    re.replace_all(text.trim(), " ").into_owned()
}
