mod common;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use common::{chat_reply, configured_store, not_similar, ScriptedTransport};
use power_battle::game::{DEFAULT_ITEM, SAVE_KEY, SAVE_VERSION};
use power_battle::{
    BattleError, BattleJudge, GameSession, GameSnapshot, GameState, GameStatus, JsonFileStore,
    Judge, JudgeVerdict, KeyValueStore, MemoryStore, Outcome, RetryPolicy, SessionHooks,
    TransportError,
};

/// Hands out queued verdicts and counts how often it was asked.
#[derive(Default)]
struct StubJudge {
    verdicts: Mutex<VecDeque<Result<JudgeVerdict, BattleError>>>,
    calls: AtomicUsize,
}

impl StubJudge {
    fn with(verdicts: impl IntoIterator<Item = Result<JudgeVerdict, BattleError>>) -> Self {
        let judge = Self::default();
        judge.verdicts.lock().extend(verdicts);
        judge
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BattleJudge for StubJudge {
    async fn judge_challenge(
        &self,
        _challenger: &str,
        _defender: &str,
        _used_items: &[String],
    ) -> Result<JudgeVerdict, BattleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdicts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no verdict queued".into()).into()))
    }
}

fn win(reason: &str) -> Result<JudgeVerdict, BattleError> {
    Ok(JudgeVerdict::new(Outcome::Win, reason))
}

fn lose(reason: &str) -> Result<JudgeVerdict, BattleError> {
    Ok(JudgeVerdict::new(Outcome::Lose, reason))
}

fn session(
    verdicts: impl IntoIterator<Item = Result<JudgeVerdict, BattleError>>,
) -> (GameSession<StubJudge>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (GameSession::new(StubJudge::with(verdicts), store.clone()), store)
}

#[tokio::test]
async fn challenge_requires_a_running_game() {
    let (mut game, _) = session([win("never used")]);

    let err = game.challenge("剪刀").await.unwrap_err();
    assert!(matches!(
        err,
        BattleError::InvalidState {
            expected: GameStatus::Playing,
            actual: GameStatus::Idle
        }
    ));
    assert_eq!(game.judge().calls(), 0);
}

#[tokio::test]
async fn start_game_resets_to_the_default_defender() {
    let (mut game, _) = session([]);
    game.start_game();

    let state = game.state();
    assert_eq!(state.current_item, DEFAULT_ITEM);
    assert_eq!(state.score, 0);
    assert!(state.chain.is_empty());
    assert_eq!(state.status, GameStatus::Playing);
    assert_eq!(state.used_items, vec![DEFAULT_ITEM.to_string()]);
    assert!(state.last_result.is_none());
}

#[tokio::test]
async fn win_then_lose_ends_the_game() {
    let (mut game, _) = session([win("剪刀砸碎石头"), lose("布包住剪刀")]);
    game.start_game();

    let first = game.challenge("剪刀").await.unwrap();
    assert_eq!(first.result, Outcome::Win);
    assert!(game.is_playing());
    let state = game.state();
    assert_eq!(state.current_item, "剪刀");
    assert_eq!(state.score, 1);
    assert_eq!(game.chain_length(), 1);
    assert_eq!(state.chain[0].item, DEFAULT_ITEM);
    assert_eq!(state.chain[0].defeated_by, "剪刀");
    assert_eq!(state.chain[0].reason, "剪刀砸碎石头");
    assert!(state.chain[0].timestamp > 0);
    assert_eq!(state.used_items, vec![DEFAULT_ITEM.to_string(), "剪刀".to_string()]);

    let second = game.challenge("布").await.unwrap();
    assert_eq!(second.result, Outcome::Lose);
    assert!(game.is_ended());
    assert_eq!(game.state().score, 1);
    assert_eq!(game.chain_length(), 1);
    assert_eq!(game.state().current_item, "剪刀");
    assert_eq!(game.state().last_result.as_ref(), Some(&second));

    let err = game.challenge("火").await.unwrap_err();
    assert!(matches!(err, BattleError::InvalidState { actual: GameStatus::Ended, .. }));
}

#[tokio::test]
async fn draw_counts_as_a_loss() {
    let (mut game, _) = session([Ok(JudgeVerdict::new(Outcome::Draw, "势均力敌"))]);
    game.start_game();

    game.challenge("纸").await.unwrap();
    assert!(game.is_ended());
    assert_eq!(game.state().score, 0);
}

#[tokio::test]
async fn exact_duplicate_never_reaches_the_judge() {
    let (mut game, _) = session([win("unused")]);
    game.start_game();
    let before = game.state().clone();

    let verdict = game.challenge("  石头 ").await.unwrap();

    assert_eq!(verdict.result, Outcome::Duplicate);
    assert_eq!(game.judge().calls(), 0);
    let after = game.state();
    assert_eq!(after.status, GameStatus::Playing);
    assert_eq!(after.score, before.score);
    assert_eq!(after.used_items, before.used_items);
    assert_eq!(after.last_result.as_ref(), Some(&verdict));
}

#[tokio::test]
async fn exact_duplicate_with_real_judge_makes_no_requests() {
    let transport = ScriptedTransport::new();
    let store = configured_store();
    let judge = Judge::with_policy(transport.clone(), store.clone(), RetryPolicy::none());
    let mut game = GameSession::new(judge, store);
    game.start_game();

    let verdict = game.challenge("石头").await.unwrap();
    assert_eq!(verdict.result, Outcome::Duplicate);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn similar_duplicate_keeps_the_game_going() {
    let (mut game, _) = session([Ok(JudgeVerdict::duplicate("\"岩石\" is the same as the used \"石头\""))]);
    game.start_game();

    let verdict = game.challenge("岩石").await.unwrap();

    assert_eq!(verdict.result, Outcome::Duplicate);
    assert!(game.is_playing());
    assert_eq!(game.state().used_items, vec![DEFAULT_ITEM.to_string()]);
    assert_eq!(game.state().score, 0);
}

#[tokio::test]
async fn judge_failure_returns_to_playing() {
    let (mut game, store) = session([Err(BattleError::from(TransportError::Network("offline".into())))]);
    game.start_game();

    let err = game.challenge("剪刀").await.unwrap_err();

    assert!(matches!(err, BattleError::Transport(TransportError::Network(_))));
    assert!(game.is_playing());
    assert_eq!(game.state().current_item, DEFAULT_ITEM);
    assert!(store.get(SAVE_KEY).is_some());
}

#[tokio::test]
async fn empty_item_is_rejected() {
    let (mut game, _) = session([]);
    game.start_game();

    let err = game.challenge("   ").await.unwrap_err();
    assert!(matches!(err, BattleError::InvalidItem { .. }));
    assert_eq!(game.judge().calls(), 0);
}

#[tokio::test]
async fn autosave_follows_the_game() {
    let (mut game, store) = session([win("a"), lose("b")]);
    game.start_game();
    assert!(!game.has_saved_game());

    game.challenge("剪刀").await.unwrap();
    let saved = store.get(SAVE_KEY).unwrap();
    assert_eq!(saved["currentItem"], json!("剪刀"));
    assert_eq!(saved["score"], json!(1));
    assert_eq!(saved["version"], json!(SAVE_VERSION));
    assert!(game.has_saved_game());

    game.challenge("布").await.unwrap();
    assert!(store.get(SAVE_KEY).is_none());
    assert!(!game.has_saved_game());
}

#[tokio::test]
async fn restart_drops_the_previous_autosave() {
    let (mut game, _) = session([win("a")]);
    game.start_game();
    game.challenge("剪刀").await.unwrap();
    assert!(game.has_saved_game());

    game.restart();
    assert!(!game.has_saved_game());
    assert_eq!(game.state().current_item, DEFAULT_ITEM);
}

#[tokio::test]
async fn saved_game_resumes_in_a_new_session() {
    let store = Arc::new(MemoryStore::new());
    let mut first = GameSession::new(StubJudge::with([win("a"), win("b")]), store.clone());
    first.start_game();
    first.challenge("剪刀").await.unwrap();
    first.challenge("锤子").await.unwrap();

    let mut second = GameSession::new(StubJudge::default(), store.clone());
    assert!(second.has_saved_game());
    assert!(second.load_auto_save());

    let state = second.state();
    assert_eq!(state.status, GameStatus::Playing);
    assert_eq!(state.current_item, "锤子");
    assert_eq!(state.score, 2);
    assert_eq!(state.chain, first.state().chain);
    assert_eq!(state.used_items, first.state().used_items);
    assert!(state.last_result.is_none());
}

#[tokio::test]
async fn load_without_save_is_a_no_op() {
    let (mut game, _) = session([]);
    assert!(!game.load_auto_save());
    assert_eq!(game.state(), &GameState::default());
}

#[tokio::test]
async fn json_export_round_trips() {
    let (mut game, _) = session([win("剪刀更锋利")]);
    game.start_game();
    game.challenge("剪刀").await.unwrap();
    let exported = game.export_to_json();

    let (mut other, _) = session([]);
    assert!(other.import_from_json(&exported));
    assert_eq!(other.state().current_item, "剪刀");
    assert_eq!(other.state().score, 1);
    assert_eq!(other.state().chain, game.state().chain);
    assert_eq!(other.state().used_items, game.state().used_items);
}

#[tokio::test]
async fn invalid_imports_leave_the_game_alone() {
    let (mut game, _) = session([win("a")]);
    game.start_game();
    game.challenge("剪刀").await.unwrap();
    let before = game.state().clone();

    assert!(!game.import_from_json("not json"));
    assert!(!game.import_from_json(r#"{"currentItem": "火", "score": "many"}"#));
    assert!(!game.import_from_json(r#"{"currentItem": "  ", "score": 3}"#));
    assert!(!game.import_from_json(r#"{"score": 3}"#));

    assert_eq!(game.state(), &before);
}

#[tokio::test]
async fn import_fills_in_missing_used_items() {
    let (mut game, _) = session([]);

    assert!(game.import_from_json(r#"{"currentItem": "火", "score": 4}"#));
    assert_eq!(game.state().used_items, vec!["火".to_string()]);
    assert!(game.state().chain.is_empty());

    let snapshot = GameSnapshot {
        current_item: "水".to_string(),
        score: 2,
        chain: Vec::new(),
        used_items: vec!["石头".to_string()],
        saved_at: 0,
        version: SAVE_VERSION.to_string(),
    };
    assert!(game.import_save_data(snapshot));
    assert_eq!(
        game.state().used_items,
        vec!["石头".to_string(), "水".to_string()]
    );
}

#[tokio::test]
async fn storage_failures_do_not_stop_play() {
    let store = Arc::new(MemoryStore::rejecting_writes());
    let mut game = GameSession::new(StubJudge::with([win("a")]), store.clone());
    game.start_game();

    game.challenge("剪刀").await.unwrap();

    assert_eq!(game.state().score, 1);
    assert!(store.is_empty());
    assert!(!game.has_saved_game());
}

#[tokio::test]
async fn unwritable_save_file_reports_no_saved_game() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::create_dir(&path).unwrap();
    let store = Arc::new(JsonFileStore::open(&path));
    let mut game = GameSession::new(StubJudge::with([win("a")]), store.clone());
    game.start_game();

    game.challenge("剪刀").await.unwrap();

    assert_eq!(game.state().score, 1);
    assert!(!game.has_saved_game());
    assert!(store.get(SAVE_KEY).is_none());
}

#[derive(Default)]
struct RecordingHooks {
    verdicts: Mutex<Vec<(String, Outcome)>>,
    final_scores: Mutex<Vec<u32>>,
}

impl SessionHooks for RecordingHooks {
    fn on_verdict(&self, challenger: &str, verdict: &JudgeVerdict) {
        self.verdicts.lock().push((challenger.to_string(), verdict.result));
    }

    fn on_game_over(&self, state: &GameState) {
        self.final_scores.lock().push(state.score);
    }
}

#[tokio::test]
async fn hooks_see_every_verdict_and_the_game_over() {
    let hooks = Arc::new(RecordingHooks::default());
    let (game, _) = session([win("a"), lose("b")]);
    let mut game = game.with_hooks(hooks.clone());
    game.start_game();

    game.challenge("剪刀").await.unwrap();
    game.challenge("石头").await.unwrap();
    game.challenge("布").await.unwrap();

    assert_eq!(
        *hooks.verdicts.lock(),
        vec![
            ("剪刀".to_string(), Outcome::Win),
            ("石头".to_string(), Outcome::Duplicate),
            ("布".to_string(), Outcome::Lose),
        ]
    );
    assert_eq!(*hooks.final_scores.lock(), vec![1]);
}

#[tokio::test]
async fn full_round_through_the_model_judge() {
    let transport = ScriptedTransport::with_replies([
        not_similar(),
        chat_reply(r#"{"reason":"挑战者是：剪刀，成功的理由是：剪刀更锋利","result":"win"}"#),
        not_similar(),
        chat_reply("result: \"lose\" 布包住了剪刀"),
    ]);
    let store = configured_store();
    let judge = Judge::with_policy(transport.clone(), store.clone(), RetryPolicy::none());
    let mut game = GameSession::new(judge, store.clone());
    game.start_game();

    game.challenge("剪刀").await.unwrap();
    let verdict = game.challenge("布").await.unwrap();

    assert_eq!(verdict.result, Outcome::Lose);
    assert!(game.is_ended());
    assert_eq!(game.state().score, 1);
    assert_eq!(transport.call_count(), 4);
    assert_eq!(game.judge().cache().count(), 2);
    assert!(store.get(SAVE_KEY).is_none());
}
