//! One representative emoji per item, asked of the model and cached.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::chat::ChatClient;
use crate::config::ConfigStore;
use crate::prompts;
use crate::storage::{self, KeyValueStore};
use crate::transport::{HttpTransport, RetryPolicy};

pub const EMOJI_CACHE_KEY: &str = "ai_emoji_cache";
pub const PLACEHOLDER_EMOJI: &str = "❓";

/// Short and not plain ASCII words.
pub fn is_plausible_emoji(candidate: &str) -> bool {
    let count = candidate.chars().count();
    if count == 0 || count > 4 {
        return false;
    }
    !candidate
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
}

#[derive(Clone)]
pub struct EmojiLookup {
    chat: ChatClient,
    config: ConfigStore,
    store: Arc<dyn KeyValueStore>,
}

impl EmojiLookup {
    pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            chat: ChatClient::new(transport, RetryPolicy::none()),
            config: ConfigStore::new(store.clone()),
            store,
        }
    }

    pub fn with_config(mut self, config: ConfigStore) -> Self {
        self.config = config;
        self
    }

    fn entries(&self) -> BTreeMap<String, String> {
        storage::load(self.store.as_ref(), EMOJI_CACHE_KEY).unwrap_or_default()
    }

    pub fn cached(&self, item: &str) -> Option<String> {
        self.entries().remove(item)
    }

    /// Cached glyph, or a fresh one from the model. Never fails; anything
    /// unusable becomes the placeholder and is not cached.
    pub async fn lookup(&self, item: &str) -> String {
        if let Some(emoji) = self.cached(item) {
            return emoji;
        }
        let config = self.config.ai_config();
        if !config.is_complete() {
            return PLACEHOLDER_EMOJI.to_string();
        }

        let request = ChatClient::request(
            &config,
            prompts::EMOJI_SYSTEM_PROMPT,
            item,
            Some(prompts::EMOJI_TEMPERATURE),
            Some(prompts::EMOJI_MAX_TOKENS),
        );
        let emoji = match self.chat.complete(&config, &request).await {
            Ok(content) => content.trim().to_string(),
            Err(err) => {
                warn!(item, error = %err, "emoji lookup failed");
                return PLACEHOLDER_EMOJI.to_string();
            }
        };
        if !is_plausible_emoji(&emoji) {
            debug!(item, reply = %emoji, "emoji reply rejected");
            return PLACEHOLDER_EMOJI.to_string();
        }

        storage::modify(
            self.store.as_ref(),
            EMOJI_CACHE_KEY,
            |entries: &mut BTreeMap<String, String>| {
                entries.insert(item.to_string(), emoji.clone());
            },
        );
        debug!(item, emoji = %emoji, "emoji cached");
        emoji
    }

    /// Fills the cache for `item` in the background. The result is only
    /// observable later through `cached`.
    pub fn prefetch(&self, item: &str) -> tokio::task::JoinHandle<()> {
        let lookup = self.clone();
        let item = item.to_string();
        tokio::spawn(async move {
            lookup.lookup(&item).await;
        })
    }

    pub fn clear(&self) {
        storage::discard(self.store.as_ref(), EMOJI_CACHE_KEY);
    }
}
