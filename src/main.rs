use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::warn;

use power_battle::config::{mask_api_key, preset, Skin, AI_PRESETS};
use power_battle::emoji::PLACEHOLDER_EMOJI;
use power_battle::{
    AiConfigUpdate, BattleError, EmojiLookup, GameSession, GameState, HttpTransport, Judge,
    JsonFileStore, JudgeVerdict, KeyValueStore, Outcome, ReqwestTransport, ScoreBoard,
    SessionHooks, Side,
};

const STATE_FILE: &str = "power_battle_state.json";
const DATA_ENV: &str = "POWER_BATTLE_DATA";

#[derive(Parser)]
#[command(name = "power-battle")]
#[command(about = "Name something stronger than the defender; an AI referee decides")]
struct Args {
    /// State file holding config, cache, scores and the autosave
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play challenge mode interactively
    Play {
        /// Continue the autosaved game if there is one
        #[arg(long)]
        resume: bool,
    },
    /// Judge a single free-mode battle between two items
    Free { item_a: String, item_b: String },
    /// Show or change the AI endpoint
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show or change player settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// List models offered by the endpoint
    Models {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Send one request to check the endpoint answers
    TestConnection,
    /// Show the best scores
    Scores {
        #[arg(long)]
        clear: bool,
    },
    /// Inspect or clear remembered battle results
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Write the autosaved game to a file
    Export { path: PathBuf },
    /// Replace the autosaved game with one from a file
    Import { path: PathBuf },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Take the base URL from a known provider (openai, deepseek, ...)
        #[arg(long, conflicts_with = "base_url")]
        preset: Option<String>,
    },
    Reset,
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        auto_clear_cache: Option<bool>,
        #[arg(long)]
        music_enabled: Option<bool>,
        #[arg(long)]
        music_volume: Option<u8>,
        #[arg(long)]
        sfx_enabled: Option<bool>,
        #[arg(long)]
        sfx_volume: Option<u8>,
        #[arg(long)]
        skin: Option<String>,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    Count,
    Clear,
}

/// Prefetches an emoji for every new defender.
struct CliHooks {
    emoji: EmojiLookup,
}

impl SessionHooks for CliHooks {
    fn on_verdict(&self, challenger: &str, verdict: &JudgeVerdict) {
        if verdict.result == Outcome::Win {
            self.emoji.prefetch(challenger);
        }
    }
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}

fn print_chain(state: &GameState) {
    if state.chain.is_empty() {
        return;
    }
    println!("\nChain:");
    for (idx, link) in state.chain.iter().enumerate() {
        println!(
            "  {n}. {defeated_by} beat {item}: {reason}",
            n = idx + 1,
            defeated_by = link.defeated_by,
            item = link.item,
            reason = link.reason
        );
    }
}

async fn play(
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn HttpTransport>,
    resume: bool,
) -> Result<()> {
    let judge = Judge::new(transport.clone(), store.clone());
    if !judge.config().is_ai_configured() {
        bail!("The AI judge is not configured. Set POWER_BATTLE_API_KEY or run `power-battle config set`");
    }
    let emoji = EmojiLookup::new(transport, store.clone());
    let scores = ScoreBoard::new(store.clone());
    let mut session = GameSession::new(judge, store)
        .with_hooks(Arc::new(CliHooks { emoji: emoji.clone() }));

    if resume && session.load_auto_save() {
        println!("Resumed saved game (score {}).", session.state().score);
    } else {
        if resume {
            println!("No saved game found, starting a new one.");
        }
        session.start_game();
    }

    loop {
        let defender = session.state().current_item.clone();
        let glyph = emoji
            .cached(&defender)
            .unwrap_or_else(|| PLACEHOLDER_EMOJI.to_string());
        println!(
            "\nDefender: {glyph} {defender}   Score: {score}",
            score = session.state().score
        );
        let item = prompt_line("Your challenger (empty to quit): ")?;
        if item.is_empty() || item.eq_ignore_ascii_case("quit") || item.eq_ignore_ascii_case("exit") {
            println!("Game saved. Resume with `power-battle play --resume`.");
            return Ok(());
        }

        match session.challenge(&item).await {
            Ok(verdict) => match verdict.result {
                Outcome::Win => println!("WIN! {}", verdict.reason),
                Outcome::Duplicate => println!("Not allowed: {}", verdict.reason),
                Outcome::Lose | Outcome::Draw => println!("LOSE. {}", verdict.reason),
            },
            Err(BattleError::Transport(err)) => {
                eprintln!("Warning: the judge could not be reached: {err}");
                continue;
            }
            Err(err) => return Err(err).context("Challenge failed"),
        }

        if session.is_ended() {
            let state = session.state();
            println!("\n===== Game over =====");
            println!("Final score: {}", state.score);
            print_chain(state);

            let names: Vec<String> = state.chain.iter().map(|c| c.item.clone()).collect();
            let new_high = scores.is_new_high_score(state.score);
            if scores.save_score(state.score, &names) {
                if new_high {
                    println!("New high score!");
                } else {
                    println!("Made the top {}!", power_battle::scores::MAX_SCORES);
                }
            }

            let again = prompt_line("Play again? [y/N] ")?;
            if again.eq_ignore_ascii_case("y") {
                session.restart();
            } else {
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let data_path = args
        .data
        .or_else(|| std::env::var(DATA_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(STATE_FILE));
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&data_path));
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
    let judge = Judge::new(transport.clone(), store.clone());

    match args.command {
        Command::Play { resume } => play(store, transport, resume).await?,
        Command::Free { item_a, item_b } => {
            let verdict = judge
                .free_mode(&item_a, &item_b)
                .await
                .context("Free-mode battle failed")?;
            let winner = match verdict.winner {
                Side::A => &item_a,
                Side::B => &item_b,
            };
            println!("Winner: {winner} ({side})", side = verdict.winner);
            println!("{}", verdict.reason);
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                let config = judge.config().ai_config();
                println!("Base URL: {}", config.base_url);
                println!("Model:    {}", config.model);
                println!("API key:  {}", mask_api_key(&config.api_key));
                if judge.config().is_using_default() {
                    println!("(built-in default; API key from POWER_BATTLE_API_KEY)");
                }
                println!("\nPresets:");
                for p in AI_PRESETS {
                    println!("  {:<10} {:<20} {}", p.id, p.name, p.base_url);
                }
            }
            ConfigAction::Set {
                api_key,
                base_url,
                model,
                preset: preset_id,
            } => {
                let base_url = match preset_id {
                    Some(id) => {
                        let found = preset(&id).with_context(|| format!("Unknown preset '{id}'"))?;
                        Some(found.base_url.to_string())
                    }
                    None => base_url,
                };
                let saved = judge.config().set_ai_config(AiConfigUpdate {
                    api_key,
                    base_url,
                    model,
                });
                if !saved.is_complete() {
                    warn!("stored AI config is incomplete; the built-in default stays active");
                }
                println!("Saved: {saved:?}");
            }
            ConfigAction::Reset => {
                judge.config().reset_ai_config();
                println!("AI config reset to the built-in default.");
            }
        },
        Command::Settings { action } => match action {
            SettingsAction::Show => {
                let settings = judge.config().settings();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&settings).context("Failed to render settings")?
                );
            }
            SettingsAction::Set {
                auto_clear_cache,
                music_enabled,
                music_volume,
                sfx_enabled,
                sfx_volume,
                skin,
            } => {
                let mut settings = judge.config().settings();
                if let Some(v) = auto_clear_cache {
                    settings.auto_clear_cache = v;
                }
                if let Some(v) = music_enabled {
                    settings.music_enabled = v;
                }
                if let Some(v) = music_volume {
                    settings.music_volume = v;
                }
                if let Some(v) = sfx_enabled {
                    settings.sfx_enabled = v;
                }
                if let Some(v) = sfx_volume {
                    settings.sfx_volume = v;
                }
                if let Some(raw) = skin {
                    settings.skin = Skin::parse(&raw).with_context(|| format!("Unknown skin '{raw}'"))?;
                }
                if !judge.config().save_settings(&settings) {
                    bail!("Could not write settings to {}", data_path.display());
                }
                println!("Settings saved.");
            }
        },
        Command::Models { base_url, api_key } => {
            let config = judge.config().ai_config();
            let base_url = base_url.unwrap_or(config.base_url);
            let api_key = api_key.unwrap_or(config.api_key);
            let models = judge.list_models(&base_url, &api_key).await;
            if models.is_empty() {
                println!("No models found.");
            }
            for model in models {
                match model.owned_by {
                    Some(owner) => println!("{} ({owner})", model.id),
                    None => println!("{}", model.name),
                }
            }
        }
        Command::TestConnection => {
            let report = judge.test_connection().await;
            println!("{}", report.message);
            if !report.success {
                std::process::exit(1);
            }
        }
        Command::Scores { clear } => {
            let board = ScoreBoard::new(store);
            if clear {
                board.clear();
                println!("Scores cleared.");
            } else {
                let scores = board.best_scores();
                if scores.is_empty() {
                    println!("No scores yet.");
                }
                for (idx, record) in scores.iter().enumerate() {
                    println!(
                        "{rank}. {score:>3}  {date}  {chain}",
                        rank = idx + 1,
                        score = record.score,
                        date = record.date,
                        chain = record.chain.join(" > ")
                    );
                }
            }
        }
        Command::Cache { action } => match action {
            CacheAction::Count => println!("{} remembered battles", judge.cache().count()),
            CacheAction::Clear => {
                judge.cache().clear();
                println!("Battle cache cleared.");
            }
        },
        Command::Export { path } => {
            let mut session = GameSession::new(judge, store);
            if !session.load_auto_save() {
                bail!("There is no saved game to export");
            }
            fs::write(&path, session.export_to_json())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Saved game written to {}", path.display());
        }
        Command::Import { path } => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let mut session = GameSession::new(judge, store);
            if !session.import_from_json(&text) {
                bail!("{} is not a valid save file", path.display());
            }
            session.auto_save();
            println!(
                "Imported game at score {}. Continue with `power-battle play --resume`.",
                session.state().score
            );
        }
    }

    Ok(())
}
