//! Local best-score table: top five runs, highest first.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

use crate::storage::{self, KeyValueStore};

pub const SCORES_KEY: &str = "pb_best_scores";
pub const MAX_SCORES: usize = 5;
pub const MAX_CHAIN_ITEMS: usize = 10;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ScoreRecord {
    pub score: u32,
    /// `YYYY-MM-DD HH:mm`
    pub date: String,
    /// Item names of the run, at most the first ten.
    pub chain: Vec<String>,
}

fn now_stamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct ScoreBoard {
    store: Arc<dyn KeyValueStore>,
}

impl ScoreBoard {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn best_scores(&self) -> Vec<ScoreRecord> {
        let mut scores: Vec<ScoreRecord> =
            storage::load(self.store.as_ref(), SCORES_KEY).unwrap_or_default();
        scores.sort_by(|a, b| b.score.cmp(&a.score));
        scores.truncate(MAX_SCORES);
        scores
    }

    pub fn can_enter_top5(&self, score: u32) -> bool {
        if score == 0 {
            return false;
        }
        let scores = self.best_scores();
        match scores.last() {
            Some(lowest) if scores.len() >= MAX_SCORES => score > lowest.score,
            _ => true,
        }
    }

    /// Records the run if it makes the table. Returns whether it was kept.
    pub fn save_score(&self, score: u32, chain: &[String]) -> bool {
        if !self.can_enter_top5(score) {
            return false;
        }
        let mut scores = self.best_scores();
        scores.push(ScoreRecord {
            score,
            date: now_stamp(),
            chain: chain.iter().take(MAX_CHAIN_ITEMS).cloned().collect(),
        });
        scores.sort_by(|a, b| b.score.cmp(&a.score));
        scores.truncate(MAX_SCORES);

        let saved = storage::save(self.store.as_ref(), SCORES_KEY, &scores);
        if saved {
            info!(score, "best score recorded");
        }
        saved
    }

    pub fn highest_score(&self) -> u32 {
        self.best_scores().first().map_or(0, |r| r.score)
    }

    pub fn is_new_high_score(&self, score: u32) -> bool {
        score > 0 && score > self.highest_score()
    }

    pub fn clear(&self) {
        storage::discard(self.store.as_ref(), SCORES_KEY);
    }
}
