//! Battle judging: duplicate and similarity screening, cache consult,
//! model call and verdict shaping.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use crate::cache::{normalize_name, BattleCache};
use crate::chat::{first_choice_content, ChatClient, ChatMessage, ChatRequest};
use crate::config::{normalize_base_url, AiConfig, ConfigStore};
use crate::error::BattleError;
use crate::extract::{parse_free_verdict, parse_judge_verdict, parse_similarity};
use crate::prompts;
use crate::storage::KeyValueStore;
use crate::transport::{HttpTransport, RetryPolicy};
use crate::verdict::{FreeModeVerdict, JudgeVerdict, Outcome, Side, SimilarityResult};

/// The seam the game session judges through.
#[async_trait]
pub trait BattleJudge: Send + Sync {
    async fn judge_challenge(
        &self,
        challenger: &str,
        defender: &str,
        used_items: &[String],
    ) -> Result<JudgeVerdict, BattleError>;
}

/// Case-insensitive, whitespace-insensitive membership in `used_items`.
pub fn find_exact_duplicate<'a>(item: &str, used_items: &'a [String]) -> Option<&'a String> {
    let needle = normalize_name(item);
    used_items.iter().find(|used| normalize_name(used) == needle)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub owned_by: Option<String>,
}

#[derive(Deserialize)]
struct RawModel {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    owned_by: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelListing {
    Wrapped { data: Vec<RawModel> },
    Bare(Vec<RawModel>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub success: bool,
    pub message: String,
}

impl ConnectionReport {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Judges battles against the configured chat-completion model.
#[derive(Clone)]
pub struct Judge {
    chat: ChatClient,
    config: ConfigStore,
    cache: BattleCache,
}

impl Judge {
    pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_policy(transport, store, RetryPolicy::default())
    }

    pub fn with_policy(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn KeyValueStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            chat: ChatClient::new(transport, policy),
            config: ConfigStore::new(store.clone()),
            cache: BattleCache::new(store),
        }
    }

    /// Swaps the config source, e.g. to pin the fallback endpoint.
    pub fn with_config(mut self, config: ConfigStore) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn cache(&self) -> &BattleCache {
        &self.cache
    }

    pub fn chat(&self) -> &ChatClient {
        &self.chat
    }

    fn require_config(&self) -> Result<AiConfig, BattleError> {
        let config = self.config.ai_config();
        if !config.is_complete() {
            return Err(BattleError::not_configured());
        }
        Ok(config)
    }

    /// Challenge mode: does `challenger` defeat `defender`?
    ///
    /// A challenger already in `used_items`, or judged to be the same thing
    /// as one of them, comes back as `Duplicate` without a battle.
    #[instrument(skip(self, used_items))]
    pub async fn challenge(
        &self,
        challenger: &str,
        defender: &str,
        used_items: &[String],
    ) -> Result<JudgeVerdict, BattleError> {
        let config = self.require_config()?;

        if let Some(used) = find_exact_duplicate(challenger, used_items) {
            info!(used = %used, "challenger already used");
            return Ok(JudgeVerdict::duplicate(format!(
                "\"{challenger}\" has already been used, try something else"
            )));
        }

        let similarity = self.check_similarity(challenger, used_items).await;
        if similarity.is_similar {
            let similar_to = similarity.similar_to.unwrap_or_default();
            let reason = similarity
                .reason
                .unwrap_or_else(|| "same kind of item".to_string());
            info!(similar_to = %similar_to, "challenger is too similar to a used item");
            return Ok(JudgeVerdict::duplicate(format!(
                "\"{challenger}\" is the same as the used \"{similar_to}\": {reason}"
            )));
        }

        let skip_cache = self.config.auto_clear_cache();
        if !skip_cache {
            if let Some(cached_winner) = self.cache.get(challenger, defender) {
                let result = if cached_winner == normalize_name(challenger) {
                    Outcome::Win
                } else {
                    Outcome::Lose
                };
                info!(%result, "using cached outcome, asking the model for a reason only");
                let fresh = self.call_judge(&config, challenger, defender).await?;
                return Ok(JudgeVerdict::new(result, fresh.reason));
            }
        }

        let verdict = self.call_judge(&config, challenger, defender).await?;
        if !skip_cache {
            let winner = if verdict.result == Outcome::Win {
                challenger
            } else {
                defender
            };
            self.cache.put(challenger, defender, winner);
        }
        Ok(verdict)
    }

    /// Free mode: which of two items wins, no challenger role.
    #[instrument(skip(self))]
    pub async fn free_mode(&self, item_a: &str, item_b: &str) -> Result<FreeModeVerdict, BattleError> {
        let config = self.require_config()?;

        let skip_cache = self.config.auto_clear_cache();
        if !skip_cache {
            if let Some(cached_winner) = self.cache.get(item_a, item_b) {
                let winner = if cached_winner == normalize_name(item_a) {
                    Side::A
                } else {
                    Side::B
                };
                info!(%winner, "using cached outcome, asking the model for a reason only");
                let fresh = self.call_free_mode(&config, item_a, item_b).await?;
                return Ok(FreeModeVerdict {
                    winner,
                    reason: fresh.reason,
                });
            }
        }

        let verdict = self.call_free_mode(&config, item_a, item_b).await?;
        if !skip_cache {
            let winner = match verdict.winner {
                Side::A => item_a,
                Side::B => item_b,
            };
            self.cache.put(item_a, item_b, winner);
        }
        Ok(verdict)
    }

    /// Is `new_item` the same entity as something already used?
    ///
    /// Never fails: with no config, or on any request or parse problem, the
    /// item is treated as new.
    pub async fn check_similarity(&self, new_item: &str, used_items: &[String]) -> SimilarityResult {
        if used_items.is_empty() {
            return SimilarityResult::distinct();
        }
        if let Some(used) = find_exact_duplicate(new_item, used_items) {
            return SimilarityResult {
                is_similar: true,
                similar_to: Some(used.clone()),
                reason: Some("identical item".to_string()),
            };
        }

        let config = self.config.ai_config();
        if !config.is_complete() {
            return SimilarityResult::distinct();
        }

        let request = ChatClient::request(
            &config,
            prompts::SIMILARITY_SYSTEM_PROMPT,
            &prompts::make_similarity_prompt(new_item, used_items),
            Some(prompts::SIMILARITY_TEMPERATURE),
            Some(prompts::SIMILARITY_MAX_TOKENS),
        );
        match self.chat.complete(&config, &request).await {
            Ok(content) => parse_similarity(&content),
            Err(err) => {
                warn!(error = %err, "similarity check failed, treating item as new");
                SimilarityResult::distinct()
            }
        }
    }

    async fn call_judge(
        &self,
        config: &AiConfig,
        challenger: &str,
        defender: &str,
    ) -> Result<JudgeVerdict, BattleError> {
        info!(challenger, defender, "asking the judge");
        let request = ChatClient::request(
            config,
            prompts::CHALLENGE_SYSTEM_PROMPT,
            &prompts::make_challenge_prompt(challenger, defender),
            Some(prompts::JUDGE_TEMPERATURE),
            Some(prompts::JUDGE_MAX_TOKENS),
        );
        let content = self.chat.complete(config, &request).await?;
        let verdict = parse_judge_verdict(&content);
        info!(result = %verdict.result, reason = %verdict.reason, "judge ruled");
        Ok(verdict)
    }

    async fn call_free_mode(
        &self,
        config: &AiConfig,
        item_a: &str,
        item_b: &str,
    ) -> Result<FreeModeVerdict, BattleError> {
        info!(item_a, item_b, "asking the judge (free mode)");
        let request = ChatClient::request(
            config,
            prompts::FREE_MODE_SYSTEM_PROMPT,
            &prompts::make_free_mode_prompt(item_a, item_b),
            Some(prompts::JUDGE_TEMPERATURE),
            Some(prompts::JUDGE_MAX_TOKENS),
        );
        let content = self.chat.complete(config, &request).await?;
        let verdict = parse_free_verdict(&content);
        info!(winner = %verdict.winner, reason = %verdict.reason, "judge ruled");
        Ok(verdict)
    }

    /// Models offered by `base_url`. Empty on any failure.
    pub async fn list_models(&self, base_url: &str, api_key: &str) -> Vec<ModelInfo> {
        let base_url = normalize_base_url(base_url);
        let api_key = api_key.trim();
        if base_url.is_empty() || api_key.is_empty() {
            return Vec::new();
        }

        let response = match self
            .chat
            .transport()
            .get(&format!("{base_url}/models"), api_key)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "model listing request failed");
                return Vec::new();
            }
        };
        if !response.is_success() {
            error!(status = response.status, "model listing returned an error status");
            return Vec::new();
        }

        match serde_json::from_str::<ModelListing>(&response.body) {
            Ok(ModelListing::Wrapped { data }) => {
                let mut models: Vec<ModelInfo> = data
                    .into_iter()
                    .filter_map(|raw| {
                        let id = raw.id?;
                        Some(ModelInfo {
                            name: id.clone(),
                            id,
                            owned_by: raw.owned_by,
                        })
                    })
                    .collect();
                models.sort_by(|a, b| a.id.cmp(&b.id));
                models
            }
            Ok(ModelListing::Bare(items)) => items
                .into_iter()
                .filter_map(|raw| {
                    let id = raw.id.clone().or_else(|| raw.name.clone())?;
                    let name = raw.name.unwrap_or_else(|| id.clone());
                    Some(ModelInfo {
                        id,
                        name,
                        owned_by: raw.owned_by,
                    })
                })
                .collect(),
            Err(err) => {
                error!(error = %err, "model listing has an unknown shape");
                Vec::new()
            }
        }
    }

    /// One unretried request to check that the configured endpoint answers.
    pub async fn test_connection(&self) -> ConnectionReport {
        let config = self.config.ai_config();
        if !config.is_complete() {
            return ConnectionReport::failed("fill in the API key, base URL and model first");
        }
        info!(?config, "testing AI connection");

        let request = ChatRequest {
            model: config.model.clone(),
            messages: vec![ChatMessage::user(prompts::CONNECTION_TEST_PROMPT)],
            temperature: None,
            max_tokens: None,
        };
        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(err) => return ConnectionReport::failed(format!("connection error: {err}")),
        };
        let response = match self
            .chat
            .transport()
            .post_json(&config.chat_url(), &config.api_key, &body)
            .await
        {
            Ok(response) => response,
            Err(err) => return ConnectionReport::failed(format!("connection error: {err}")),
        };

        if !response.is_success() {
            error!(status = response.status, body = %response.body, "AI connection test failed");
            return ConnectionReport::failed(match response.status {
                401 => "authentication failed (401): the API key is invalid or expired. Check that it was copied without spaces, is activated, and may access this model".to_string(),
                403 => "permission denied (403): this API key has no access".to_string(),
                404 => "endpoint not found (404): check the base URL".to_string(),
                status => format!("connection failed: {status} - {}", response.body),
            });
        }

        match first_choice_content(&response.body) {
            Some(_) => ConnectionReport {
                success: true,
                message: "API connection succeeded".to_string(),
            },
            None => ConnectionReport::failed("unexpected response shape"),
        }
    }
}

#[async_trait]
impl BattleJudge for Judge {
    async fn judge_challenge(
        &self,
        challenger: &str,
        defender: &str,
        used_items: &[String],
    ) -> Result<JudgeVerdict, BattleError> {
        self.challenge(challenger, defender, used_items).await
    }
}
