//! Turns free-form model replies into verdicts.
//!
//! Models are asked for bare JSON but often wrap it in a code fence or add
//! commentary. Parsing is two-tier: a strict JSON pass over the first object
//! found, then a marker search over the raw text. Neither tier can fail; an
//! unreadable reply resolves to the documented default for its mode.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::verdict::{FreeModeVerdict, JudgeVerdict, Outcome, Side, SimilarityResult, UNKNOWN_REASON};

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("invalid fence regex"));

static RESULT_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)result["']?\s*:\s*["']([a-z]+)"#).expect("invalid result marker regex")
});

static WINNER_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)winner["']?\s*:\s*["']([ab])["']"#).expect("invalid winner marker regex")
});

const REASON_KEYS: [&str; 3] = ["reason", "Reason", "REASON"];
const RESULT_KEYS: [&str; 3] = ["result", "Result", "RESULT"];
const WINNER_KEYS: [&str; 3] = ["winner", "Winner", "WINNER"];

/// How a reply was understood.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    /// A JSON object was found and read field by field.
    Strict(T),
    /// No usable JSON, but a verdict marker was found in the text.
    Salvaged(T),
    Unparseable,
}

/// A verdict shape the extractor can produce.
pub trait Extract: Sized {
    /// How much raw text a salvaged reason keeps.
    const SALVAGE_REASON_CHARS: usize;

    fn from_object(object: &Value) -> Self;

    fn from_marker(raw: &str, reason: String) -> Option<Self>;

    /// Deterministic result when nothing could be read.
    fn fallback() -> Self;
}

impl<T: Extract> ParseOutcome<T> {
    pub fn parse(raw: &str) -> Self {
        if let Some(object) = strict_object(raw) {
            return ParseOutcome::Strict(T::from_object(&object));
        }
        let reason = salvage_reason(raw, T::SALVAGE_REASON_CHARS);
        match T::from_marker(raw, reason) {
            Some(verdict) => {
                warn!("AI reply was not valid JSON, salvaged verdict from markers");
                ParseOutcome::Salvaged(verdict)
            }
            None => {
                warn!("AI reply could not be understood, using default verdict");
                ParseOutcome::Unparseable
            }
        }
    }

    pub fn into_verdict(self) -> T {
        match self {
            ParseOutcome::Strict(v) | ParseOutcome::Salvaged(v) => v,
            ParseOutcome::Unparseable => T::fallback(),
        }
    }
}

impl Extract for JudgeVerdict {
    const SALVAGE_REASON_CHARS: usize = 50;

    fn from_object(object: &Value) -> Self {
        let result = if field_text(object, &RESULT_KEYS).to_lowercase() == "win" {
            Outcome::Win
        } else {
            Outcome::Lose
        };
        JudgeVerdict::new(result, reason_or_unknown(field_text(object, &REASON_KEYS)))
    }

    fn from_marker(raw: &str, reason: String) -> Option<Self> {
        let caps = RESULT_MARKER_RE.captures(raw)?;
        let result = if caps[1].eq_ignore_ascii_case("win") {
            Outcome::Win
        } else {
            Outcome::Lose
        };
        Some(JudgeVerdict::new(result, reason))
    }

    fn fallback() -> Self {
        JudgeVerdict::new(Outcome::Lose, UNKNOWN_REASON)
    }
}

impl Extract for FreeModeVerdict {
    const SALVAGE_REASON_CHARS: usize = 30;

    fn from_object(object: &Value) -> Self {
        let winner = if field_text(object, &WINNER_KEYS).to_uppercase() == "A" {
            Side::A
        } else {
            Side::B
        };
        FreeModeVerdict {
            winner,
            reason: reason_or_unknown(field_text(object, &REASON_KEYS)),
        }
    }

    fn from_marker(raw: &str, reason: String) -> Option<Self> {
        let caps = WINNER_MARKER_RE.captures(raw)?;
        let winner = if caps[1].eq_ignore_ascii_case("a") {
            Side::A
        } else {
            Side::B
        };
        Some(FreeModeVerdict { winner, reason })
    }

    fn fallback() -> Self {
        FreeModeVerdict {
            winner: Side::B,
            reason: UNKNOWN_REASON.to_string(),
        }
    }
}

pub fn parse_judge_verdict(raw: &str) -> JudgeVerdict {
    ParseOutcome::<JudgeVerdict>::parse(raw).into_verdict()
}

pub fn parse_free_verdict(raw: &str) -> FreeModeVerdict {
    ParseOutcome::<FreeModeVerdict>::parse(raw).into_verdict()
}

/// Reads a same-entity check reply. Anything unreadable means "not similar".
///
/// The object is taken greedily, from the first `{` to the last `}`, so a
/// reply carrying more than one object reads as not similar.
pub fn parse_similarity(raw: &str) -> SimilarityResult {
    let object = greedy_json_slice(raw)
        .and_then(|slice| serde_json::from_str::<Value>(slice).ok())
        .filter(Value::is_object);
    let Some(object) = object else {
        return SimilarityResult::distinct();
    };
    let is_similar = match object.get("isSimilar") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    };
    let text = |key: &str| {
        object
            .get(key)
            .map(value_to_compact_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    SimilarityResult {
        is_similar,
        similar_to: text("similarTo"),
        reason: text("reason"),
    }
}

/// Inner text of the first fenced block, or the whole reply.
fn search_text(raw: &str) -> &str {
    FENCE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str())
}

fn strict_object(raw: &str) -> Option<Value> {
    let slice = extract_json_slice(search_text(raw))?;
    match serde_json::from_str::<Value>(slice) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// First balanced `{...}` span, skipping braces inside string literals.
fn extract_json_slice(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut start_idx: Option<usize> = None;
    for (idx, &byte) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            if byte == b'\\' {
                escaped = true;
                continue;
            }
            if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' if start_idx.is_some() => in_string = true,
            b'{' => {
                if depth == 0 {
                    start_idx = Some(idx);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = start_idx {
                        return Some(&text[start..=idx]);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn greedy_json_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn value_to_compact_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Array(arr) => {
            let parts: Vec<String> = arr.iter().map(value_to_compact_string).collect();
            parts.join(" | ")
        }
        Value::Object(_) => serde_json::to_string(v).unwrap_or_default(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn pick_field<'a>(root: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| root.get(*name))
}

fn field_text(root: &Value, names: &[&str]) -> String {
    pick_field(root, names)
        .map(value_to_compact_string)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn reason_or_unknown(reason: String) -> String {
    if reason.is_empty() {
        UNKNOWN_REASON.to_string()
    } else {
        reason
    }
}

/// Leading `max_chars` of the reply with braces and quotes removed.
fn salvage_reason(raw: &str, max_chars: usize) -> String {
    let prefix: String = raw
        .chars()
        .take(max_chars)
        .filter(|c| !matches!(c, '{' | '}' | '"'))
        .collect();
    reason_or_unknown(prefix.trim().to_string())
}
