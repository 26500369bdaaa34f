use thiserror::Error;

use crate::game::GameStatus;

/// Failures talking to the chat-completion endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("AI request failed: {status} - {body}")]
    Status { status: u16, body: String },
    #[error("AI returned empty content")]
    EmptyContent,
    #[error("could not decode AI response: {0}")]
    Decode(String),
}

/// Errors surfaced to the caller of a judging or game operation.
///
/// Parse failures never show up here: model output always resolves to a
/// best-effort verdict. Storage failures are logged and swallowed.
#[derive(Error, Debug)]
pub enum BattleError {
    #[error("AI is not configured: {detail}")]
    Configuration { detail: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid game state: expected {expected}, found {actual}")]
    InvalidState {
        expected: GameStatus,
        actual: GameStatus,
    },
    #[error("invalid item: {detail}")]
    InvalidItem { detail: String },
}

impl BattleError {
    pub fn not_configured() -> Self {
        Self::Configuration {
            detail: "set an API key, base URL and model before playing".to_string(),
        }
    }
}

/// Durable storage write or read failure.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}
