//! AI endpoint configuration and player settings.
//!
//! Stored values take precedence. When no complete AI config has been saved,
//! a built-in default is used: the public SiliconFlow endpoint with a small
//! Qwen model, authenticated by `POWER_BATTLE_API_KEY` from the environment.
//! That default is a convenience for local play, not a secret; anyone with
//! the binary and the environment can read it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::storage::{self, KeyValueStore};

pub const AI_CONFIG_KEY: &str = "ai_config";
pub const SETTINGS_KEY: &str = "game_settings";

pub const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";
pub const DEFAULT_MODEL: &str = "Qwen/Qwen3-8B";
pub const API_KEY_ENV: &str = "POWER_BATTLE_API_KEY";

#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
}

impl AiConfig {
    pub fn builtin() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).unwrap_or_default().trim().to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.base_url.is_empty() && !self.model.is_empty()
    }

    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

// Keeps the key out of logs and panics.
impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// First eight and last four characters, the rest elided.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}***{tail}")
}

/// Partial update applied on top of whatever is stored.
#[derive(Debug, Clone, Default)]
pub struct AiConfigUpdate {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Skin {
    #[default]
    Default,
    Starry,
    Neon,
    Forest,
    Flame,
    Ocean,
}

impl Skin {
    pub const ALL: [Skin; 6] = [
        Skin::Default,
        Skin::Starry,
        Skin::Neon,
        Skin::Forest,
        Skin::Flame,
        Skin::Ocean,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Skin::Default => "default",
            Skin::Starry => "starry",
            Skin::Neon => "neon",
            Skin::Forest => "forest",
            Skin::Flame => "flame",
            Skin::Ocean => "ocean",
        }
    }

    pub fn parse(raw: &str) -> Option<Skin> {
        let raw = raw.trim();
        Skin::ALL
            .into_iter()
            .find(|skin| skin.name().eq_ignore_ascii_case(raw))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub music_enabled: bool,
    pub music_volume: u8,
    pub sfx_enabled: bool,
    pub sfx_volume: u8,
    /// Disables the battle cache so every battle is judged fresh.
    pub auto_clear_cache: bool,
    pub skin: Skin,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            music_enabled: true,
            music_volume: 50,
            sfx_enabled: true,
            sfx_volume: 70,
            auto_clear_cache: false,
            skin: Skin::Default,
        }
    }
}

impl Settings {
    pub fn clamped(mut self) -> Self {
        self.music_volume = self.music_volume.min(100);
        self.sfx_volume = self.sfx_volume.min(100);
        self
    }

    /// Reads stored settings field by field. A field that is missing or of
    /// the wrong type keeps its default without affecting the others;
    /// volumes saturate into 0..=100 and unknown skins read as `default`.
    pub fn from_stored(raw: &Value) -> Self {
        let mut settings = Settings::default();
        let Some(fields) = raw.as_object() else {
            warn!("stored settings are not an object, using defaults");
            return settings;
        };
        let flag = |key: &str, current: bool| fields.get(key).and_then(Value::as_bool).unwrap_or(current);
        let volume = |key: &str, current: u8| {
            fields
                .get(key)
                .and_then(Value::as_f64)
                .map_or(current, |v| v.round().clamp(0.0, 100.0) as u8)
        };

        settings.music_enabled = flag("musicEnabled", settings.music_enabled);
        settings.music_volume = volume("musicVolume", settings.music_volume);
        settings.sfx_enabled = flag("sfxEnabled", settings.sfx_enabled);
        settings.sfx_volume = volume("sfxVolume", settings.sfx_volume);
        settings.auto_clear_cache = flag("autoClearCache", settings.auto_clear_cache);
        settings.skin = fields
            .get("skin")
            .and_then(Value::as_str)
            .and_then(Skin::parse)
            .unwrap_or_default();
        settings
    }
}

/// Known OpenAI-compatible providers offered when configuring the judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AiPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
}

pub const AI_PRESETS: [AiPreset; 6] = [
    AiPreset {
        id: "default",
        name: "Default",
        base_url: DEFAULT_BASE_URL,
    },
    AiPreset {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com/v1",
    },
    AiPreset {
        id: "anthropic",
        name: "Anthropic (Claude)",
        base_url: "https://api.anthropic.com/v1",
    },
    AiPreset {
        id: "gemini",
        name: "Google Gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
    },
    AiPreset {
        id: "deepseek",
        name: "DeepSeek",
        base_url: "https://api.deepseek.com/v1",
    },
    AiPreset {
        id: "custom",
        name: "Custom",
        base_url: "",
    },
];

pub fn preset(id: &str) -> Option<&'static AiPreset> {
    AI_PRESETS.iter().find(|p| p.id.eq_ignore_ascii_case(id.trim()))
}

/// Reads and writes configuration in the shared store.
///
/// Values are re-read on every call, so a settings change made elsewhere
/// applies to the very next battle.
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn KeyValueStore>,
    fallback: AiConfig,
}

impl ConfigStore {
    /// Falls back to [`AiConfig::builtin`], read from the environment now.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_default(store, AiConfig::builtin())
    }

    /// Uses `fallback` whenever no complete config is stored.
    pub fn with_default(store: Arc<dyn KeyValueStore>, fallback: AiConfig) -> Self {
        Self { store, fallback }
    }

    /// Stored config when complete, the fallback otherwise.
    pub fn ai_config(&self) -> AiConfig {
        match storage::load::<AiConfig>(self.store.as_ref(), AI_CONFIG_KEY) {
            Some(config) if config.is_complete() => config,
            _ => self.fallback.clone(),
        }
    }

    pub fn is_ai_configured(&self) -> bool {
        self.ai_config().is_complete()
    }

    pub fn is_using_default(&self) -> bool {
        self.store.get(AI_CONFIG_KEY).is_none()
    }

    pub fn set_ai_config(&self, update: AiConfigUpdate) -> AiConfig {
        let mut current =
            storage::load::<AiConfig>(self.store.as_ref(), AI_CONFIG_KEY).unwrap_or_default();
        if let Some(api_key) = update.api_key {
            current.api_key = api_key.trim().to_string();
        }
        if let Some(base_url) = update.base_url {
            current.base_url = normalize_base_url(&base_url);
        }
        if let Some(model) = update.model {
            current.model = model.trim().to_string();
        }
        storage::save(self.store.as_ref(), AI_CONFIG_KEY, &current);
        info!(config = ?current, "AI config updated");
        current
    }

    /// Drops the stored config; the built-in default applies again.
    pub fn reset_ai_config(&self) {
        storage::discard(self.store.as_ref(), AI_CONFIG_KEY);
    }

    pub fn settings(&self) -> Settings {
        self.store
            .get(SETTINGS_KEY)
            .map_or_else(Settings::default, |raw| Settings::from_stored(&raw))
    }

    pub fn save_settings(&self, settings: &Settings) -> bool {
        storage::save(self.store.as_ref(), SETTINGS_KEY, &settings.clone().clamped())
    }

    pub fn auto_clear_cache(&self) -> bool {
        self.settings().auto_clear_cache
    }
}
