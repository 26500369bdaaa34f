//! One playthrough: the defender on the throne, the chain of fallen
//! defenders, and the status that gates every move.
//!
//! ```text
//! idle ──start──▶ playing ──challenge──▶ judging ──win/duplicate──▶ playing
//!                    ▲                      │
//!                    └──────start───────────┴──lose──▶ ended
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::error::BattleError;
use crate::judge::{find_exact_duplicate, BattleJudge};
use crate::storage::{self, KeyValueStore};
use crate::verdict::{JudgeVerdict, Outcome};

pub const DEFAULT_ITEM: &str = "石头";
pub const SAVE_KEY: &str = "game_autosave";
pub const SAVE_VERSION: &str = "1.0.0";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    #[default]
    Idle,
    Playing,
    Judging,
    Ended,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GameStatus::Idle => "idle",
            GameStatus::Playing => "playing",
            GameStatus::Judging => "judging",
            GameStatus::Ended => "ended",
        })
    }
}

/// A defender that fell, who beat it, and why.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChainItem {
    pub item: String,
    pub defeated_by: String,
    pub reason: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GameState {
    pub current_item: String,
    pub score: u32,
    pub chain: Vec<ChainItem>,
    pub status: GameStatus,
    pub last_result: Option<JudgeVerdict>,
    pub used_items: Vec<String>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            current_item: DEFAULT_ITEM.to_string(),
            score: 0,
            chain: Vec::new(),
            status: GameStatus::Idle,
            last_result: None,
            used_items: Vec::new(),
        }
    }
}

/// Persisted form of a game in progress.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    #[serde(default)]
    pub current_item: String,
    pub score: u32,
    #[serde(default)]
    pub chain: Vec<ChainItem>,
    #[serde(default)]
    pub used_items: Vec<String>,
    #[serde(default)]
    pub saved_at: i64,
    #[serde(default)]
    pub version: String,
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Side effects a front end may attach to a session (sound, emoji prefetch).
/// Judging never depends on them.
pub trait SessionHooks: Send + Sync {
    fn on_verdict(&self, _challenger: &str, _verdict: &JudgeVerdict) {}

    fn on_game_over(&self, _state: &GameState) {}
}

/// The autosave slot in the shared store.
#[derive(Clone)]
pub struct SaveSlot {
    store: Arc<dyn KeyValueStore>,
}

impl SaveSlot {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn write(&self, snapshot: &GameSnapshot) -> bool {
        storage::save(self.store.as_ref(), SAVE_KEY, snapshot)
    }

    pub fn read(&self) -> Option<GameSnapshot> {
        storage::load(self.store.as_ref(), SAVE_KEY)
    }

    pub fn clear(&self) {
        storage::discard(self.store.as_ref(), SAVE_KEY);
    }

    /// A save exists and names a defender.
    pub fn exists(&self) -> bool {
        self.read().is_some_and(|s| !s.current_item.is_empty())
    }
}

pub struct GameSession<J> {
    state: GameState,
    judge: J,
    saves: SaveSlot,
    hooks: Option<Arc<dyn SessionHooks>>,
}

impl<J: BattleJudge> GameSession<J> {
    pub fn new(judge: J, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            state: GameState::default(),
            judge,
            saves: SaveSlot::new(store),
            hooks: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn judge(&self) -> &J {
        &self.judge
    }

    pub fn is_playing(&self) -> bool {
        self.state.status == GameStatus::Playing
    }

    pub fn is_ended(&self) -> bool {
        self.state.status == GameStatus::Ended
    }

    pub fn chain_length(&self) -> usize {
        self.state.chain.len()
    }

    pub fn has_saved_game(&self) -> bool {
        self.saves.exists()
    }

    /// Fresh game from the default defender. Drops any autosave.
    pub fn start_game(&mut self) {
        self.state = GameState {
            status: GameStatus::Playing,
            used_items: vec![DEFAULT_ITEM.to_string()],
            ..GameState::default()
        };
        self.clear_auto_save();
        info!("new game started");
    }

    pub fn restart(&mut self) {
        self.start_game();
    }

    /// Throws `item` at the current defender.
    ///
    /// Only allowed while playing. A win makes `item` the new defender, a
    /// loss ends the game, and a duplicate changes nothing but `last_result`.
    /// If judging fails the game goes back to playing and the error is
    /// returned.
    pub async fn challenge(&mut self, item: &str) -> Result<JudgeVerdict, BattleError> {
        if self.state.status != GameStatus::Playing {
            return Err(BattleError::InvalidState {
                expected: GameStatus::Playing,
                actual: self.state.status,
            });
        }
        let item = item.trim();
        if item.is_empty() {
            return Err(BattleError::InvalidItem {
                detail: "item name is empty".to_string(),
            });
        }

        if find_exact_duplicate(item, &self.state.used_items).is_some() {
            let verdict =
                JudgeVerdict::duplicate(format!("\"{item}\" has already been used, try something else"));
            self.state.last_result = Some(verdict.clone());
            self.notify_verdict(item, &verdict);
            return Ok(verdict);
        }

        self.state.status = GameStatus::Judging;
        self.auto_save();

        let judged = self
            .judge
            .judge_challenge(item, &self.state.current_item, &self.state.used_items)
            .await;
        let verdict = match judged {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(item, error = %err, "challenge could not be judged");
                self.state.status = GameStatus::Playing;
                self.auto_save();
                return Err(err);
            }
        };

        self.state.last_result = Some(verdict.clone());
        match verdict.result {
            Outcome::Win => {
                let defeated = std::mem::replace(&mut self.state.current_item, item.to_string());
                self.state.chain.push(ChainItem {
                    item: defeated,
                    defeated_by: item.to_string(),
                    reason: verdict.reason.clone(),
                    timestamp: now_millis(),
                });
                self.state.score += 1;
                self.state.used_items.push(item.to_string());
                self.state.status = GameStatus::Playing;
                info!(item, score = self.state.score, "challenger takes the throne");
                self.auto_save();
            }
            Outcome::Duplicate => {
                self.state.status = GameStatus::Playing;
                self.auto_save();
            }
            Outcome::Lose | Outcome::Draw => {
                self.state.status = GameStatus::Ended;
                info!(item, score = self.state.score, "game over");
                self.clear_auto_save();
            }
        }

        self.notify_verdict(item, &verdict);
        if self.state.status == GameStatus::Ended {
            if let Some(hooks) = &self.hooks {
                hooks.on_game_over(&self.state);
            }
        }
        Ok(verdict)
    }

    fn notify_verdict(&self, item: &str, verdict: &JudgeVerdict) {
        if let Some(hooks) = &self.hooks {
            hooks.on_verdict(item, verdict);
        }
    }

    /// Writes a snapshot while a game is live; a no-op otherwise.
    pub fn auto_save(&self) {
        if !matches!(self.state.status, GameStatus::Playing | GameStatus::Judging) {
            return;
        }
        if !self.saves.write(&self.export_save_data()) {
            error!("autosave failed, continuing in memory");
        }
    }

    pub fn clear_auto_save(&self) {
        self.saves.clear();
    }

    pub fn load_auto_save(&mut self) -> bool {
        match self.saves.read() {
            Some(snapshot) => self.import_save_data(snapshot),
            None => false,
        }
    }

    pub fn export_save_data(&self) -> GameSnapshot {
        GameSnapshot {
            current_item: self.state.current_item.clone(),
            score: self.state.score,
            chain: self.state.chain.clone(),
            used_items: self.state.used_items.clone(),
            saved_at: now_millis(),
            version: SAVE_VERSION.to_string(),
        }
    }

    /// Replaces the game with `snapshot`. A snapshot without a defender is
    /// rejected and the current game is left alone.
    pub fn import_save_data(&mut self, snapshot: GameSnapshot) -> bool {
        let current_item = snapshot.current_item.trim().to_string();
        if current_item.is_empty() {
            warn!("rejecting save without a current item");
            return false;
        }

        let mut used_items = snapshot.used_items;
        if find_exact_duplicate(&current_item, &used_items).is_none() {
            used_items.push(current_item.clone());
        }
        self.state = GameState {
            current_item,
            score: snapshot.score,
            chain: snapshot.chain,
            status: GameStatus::Playing,
            last_result: None,
            used_items,
        };
        info!(score = self.state.score, "game restored");
        true
    }

    pub fn export_to_json(&self) -> String {
        serde_json::to_string_pretty(&self.export_save_data()).unwrap_or_default()
    }

    pub fn import_from_json(&mut self, json: &str) -> bool {
        match serde_json::from_str::<GameSnapshot>(json) {
            Ok(snapshot) => self.import_save_data(snapshot),
            Err(err) => {
                warn!(error = %err, "save data is not valid JSON");
                false
            }
        }
    }
}
