//! Structured-output extraction from model responses
//!
//! A response is expected to carry one JSON object plus free-form
//! narrative. Extraction tries a fixed chain of strategies; decoding gets
//! one repair pass before it gives up.

use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("No JSON object found in model response")]
    Extraction { raw: String },

    #[error("Could not parse recommendation: {message}")]
    Recommendation { message: String, raw: String },
}

impl ParseError {
    /// The model response that failed to parse
    pub fn raw(&self) -> &str {
        match self {
            ParseError::Extraction { raw } | ParseError::Recommendation { raw, .. } => raw,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Extraction strategies, tried in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// A ```json fenced block; everything outside it is narrative
    FencedBlock,
    /// First `{` to last `}`, balanced outside string literals; narrative
    /// follows it
    BraceSpan,
    /// A `JSON:` / `JSON Object:` / `JSON Response:` marker before the object
    MarkerPrefixed,
    /// The part before the first blank line, if it is a whole object
    BlankLineSplit,
}

impl ParseStrategy {
    pub const ORDER: [ParseStrategy; 4] = [
        ParseStrategy::FencedBlock,
        ParseStrategy::BraceSpan,
        ParseStrategy::MarkerPrefixed,
        ParseStrategy::BlankLineSplit,
    ];

    /// `(json, narrative)` if this strategy recognizes the text
    pub fn apply(self, text: &str) -> Option<(String, String)> {
        match self {
            ParseStrategy::FencedBlock => fenced_block(text),
            ParseStrategy::BraceSpan => brace_span(text),
            ParseStrategy::MarkerPrefixed => marker_prefixed(text),
            ParseStrategy::BlankLineSplit => blank_line_split(text),
        }
    }
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```json[ \t]*\r?\n?(.*?)```").expect("valid fence regex"))
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)JSON(?: Object| Response)?:\s*(\{.*\})").expect("valid marker regex")
    })
}

fn blank_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\r?\n").expect("valid blank line regex"))
}

fn single_quote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([\{\[,:]\s*)'((?:[^'\\]|\\.)*)'").expect("valid quote regex")
    })
}

fn bare_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([\{,]\s*)([A-Za-z_][A-Za-z0-9_\-]*)\s*:").expect("valid key regex")
    })
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([\}\]])").expect("valid comma regex"))
}

fn fenced_block(text: &str) -> Option<(String, String)> {
    let caps = fence_re().captures(text)?;
    let whole = caps.get(0)?;
    let json = caps.get(1)?.as_str().trim();
    if json.is_empty() {
        return None;
    }

    let narrative = [&text[..whole.start()], &text[whole.end()..]]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    Some((json.to_string(), narrative))
}

fn brace_span(text: &str) -> Option<(String, String)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    let span = &text[start..=end];
    if !braces_balanced(span) {
        return None;
    }

    let narrative = strip_closing_fence(&text[end + 1..]);
    Some((span.to_string(), narrative.trim().to_string()))
}

/// Whether every `{` outside a JSON string literal has a matching `}`
fn braces_balanced(span: &str) -> bool {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for c in span.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }

    depth == 0 && !in_string
}

/// Drop the line closing an untagged ``` fence that wrapped the object
fn strip_closing_fence(rest: &str) -> &str {
    match rest.trim_start().strip_prefix("```") {
        Some(fence_line) => fence_line.split_once('\n').map_or("", |(_, after)| after),
        None => rest,
    }
}

fn marker_prefixed(text: &str) -> Option<(String, String)> {
    let caps = marker_re().captures(text)?;
    let object = caps.get(1)?;

    Some((
        object.as_str().to_string(),
        text[object.end()..].trim().to_string(),
    ))
}

fn blank_line_split(text: &str) -> Option<(String, String)> {
    let split = blank_line_re().find(text)?;
    let head = text[..split.start()].trim();

    if head.starts_with('{') && head.ends_with('}') {
        Some((head.to_string(), text[split.end()..].trim().to_string()))
    } else {
        None
    }
}

/// Split a model response into its JSON payload and narrative
pub fn extract_json_and_markdown(text: &str) -> Result<(String, String)> {
    for strategy in ParseStrategy::ORDER {
        if let Some(found) = strategy.apply(text) {
            debug!(?strategy, "extracted JSON from response");
            return Ok(found);
        }
    }

    Err(ParseError::Extraction {
        raw: text.to_string(),
    })
}

/// Best-effort repair of near-JSON: single-quoted literals become double
/// quoted, bare object keys get quoted and trailing commas are dropped.
///
/// Heuristic; the output is not guaranteed to parse.
pub fn fix_json_format(json: &str) -> String {
    let quoted = single_quote_re().replace_all(json, |caps: &Captures| {
        let inner = caps[2].replace("\\'", "'").replace('"', "\\\"");
        format!("{}\"{}\"", &caps[1], inner)
    });
    let keyed = bare_key_re().replace_all(&quoted, "$1\"$2\":");
    trailing_comma_re().replace_all(&keyed, "$1").into_owned()
}

/// Extract and decode the JSON payload of `response` as `T`, returning
/// it with the narrative. Decoding is retried once on the repaired text.
pub fn parse_structured<T: DeserializeOwned>(response: &str) -> Result<(T, String)> {
    let (json, narrative) = extract_json_and_markdown(response)?;

    match serde_json::from_str::<T>(&json) {
        Ok(value) => Ok((value, narrative)),
        Err(first) => {
            warn!(error = %first, "model JSON did not parse, attempting repair");
            serde_json::from_str::<T>(&fix_json_format(&json))
                .map(|value| (value, narrative))
                .map_err(|second| ParseError::Recommendation {
                    message: second.to_string(),
                    raw: response.to_string(),
                })
        }
    }
}
