//! Power Battle: keep naming things that beat the current defender while a
//! chat-completion model referees.

pub mod cache;
pub mod chat;
pub mod config;
pub mod emoji;
pub mod error;
pub mod extract;
pub mod game;
pub mod judge;
pub mod prompts;
pub mod scores;
pub mod storage;
pub mod transport;
pub mod verdict;

pub use cache::BattleCache;
pub use config::{AiConfig, AiConfigUpdate, ConfigStore, Settings};
pub use emoji::EmojiLookup;
pub use error::{BattleError, StorageError, TransportError};
pub use game::{ChainItem, GameSession, GameSnapshot, GameState, GameStatus, SessionHooks};
pub use judge::{BattleJudge, Judge};
pub use scores::ScoreBoard;
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use transport::{HttpTransport, ReqwestTransport, RetryPolicy};
pub use verdict::{FreeModeVerdict, JudgeVerdict, Outcome, Side, SimilarityResult};
