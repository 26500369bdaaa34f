use std::fmt;

use serde::{Deserialize, Serialize};

pub const UNKNOWN_REASON: &str = "unknown reason";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Lose,
    Draw,
    Duplicate,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Win => "win",
            Outcome::Lose => "lose",
            Outcome::Draw => "draw",
            Outcome::Duplicate => "duplicate",
        };
        f.write_str(s)
    }
}

/// The judge's ruling on one challenge.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct JudgeVerdict {
    pub result: Outcome,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl JudgeVerdict {
    pub fn new(result: Outcome, reason: impl Into<String>) -> Self {
        Self {
            result,
            reason: reason.into(),
            confidence: None,
        }
    }

    pub fn duplicate(reason: impl Into<String>) -> Self {
        Self::new(Outcome::Duplicate, reason)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::A => "A",
            Side::B => "B",
        })
    }
}

/// Free-mode ruling: which of two items wins, with no challenger role.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FreeModeVerdict {
    pub winner: Side,
    pub reason: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityResult {
    pub is_similar: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similar_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SimilarityResult {
    pub fn distinct() -> Self {
        Self::default()
    }
}
