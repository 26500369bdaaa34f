//! Prompt text sent to the judge model.

pub const JUDGE_TEMPERATURE: f64 = 0.5;
pub const JUDGE_MAX_TOKENS: u32 = 200;
pub const SIMILARITY_TEMPERATURE: f64 = 0.1;
pub const SIMILARITY_MAX_TOKENS: u32 = 120;
pub const EMOJI_TEMPERATURE: f64 = 0.1;
pub const EMOJI_MAX_TOKENS: u32 = 10;

pub const CHALLENGE_SYSTEM_PROMPT: &str = r#"You are the referee of "Power Battle". No ties allowed.

Use your broad knowledge to decide who wins. You may imagine how the challenger could win, but it must be logical and under ordinary circumstances. When one thing clearly outranks the other, the stronger one must win.

IMPORTANT:
- "win" = Challenger defeats Defender
- "lose" = Challenger is defeated by Defender

The reason must be written in Chinese in exactly this form:
"挑战者是：[challenger]，[成功/失败]的理由是：[concrete reason]"

Output JSON only:
{"reason":"挑战者是：XXX，成功/失败的理由是：...","result":"win or lose"}"#;

pub const FREE_MODE_SYSTEM_PROMPT: &str = r#"You are the judge of "Power Battle". No ties allowed.
Pick the winner using any angle: combat, power, utility, science, culture.

Output JSON only:
{"reason":"20-30 Chinese characters describing the fight and its outcome","winner":"A or B"}"#;

pub const SIMILARITY_SYSTEM_PROMPT: &str = r#"# TASK
Check if [New Item] is ESSENTIALLY THE SAME THING as any item in [Used List].

# KEY PRINCIPLE
Similar means "SAME THING with a different name or form", NOT "related" or "associated".

# SIMILAR = TRUE (same essence):
- "剑" = "宝剑" = "长剑" (all are swords)
- "火" = "烈火" = "火焰" (all are fire itself)
- "水" = "清水" = "一滴水" (all are water)
- "钢铁侠" = "Tony Stark" (same person)
- "孙悟空" = "齐天大圣" (same character)

# SIMILAR = FALSE (different things, even if related):
- "火" vs "灭火器" (fire vs fire extinguisher)
- "水" vs "水杯" (water vs cup: the container is not the content)
- "剑" vs "剑鞘" (sword vs scabbard)
- "太阳" vs "太阳能" (sun vs solar energy)
- "灰太狼" vs "红太狼" (different characters)
- "苹果" vs "苹果树" (fruit vs tree)

# RULE
Ask: "Do these two words refer to THE EXACT SAME OBJECT OR ENTITY?"
- YES: similar
- NO, even if related: not similar

# OUTPUT FORMAT
{"isSimilar": true, "similarTo": "matching used item", "reason": "why, in Chinese"}
or
{"isSimilar": false}"#;

pub const EMOJI_SYSTEM_PROMPT: &str = "You are an emoji expert. The user gives you the name of a thing; reply with the single emoji that best represents it. Reply with the emoji only, no other text.";

pub const CONNECTION_TEST_PROMPT: &str = "Hello, please reply \"OK\"";

pub fn make_challenge_prompt(challenger: &str, defender: &str) -> String {
    format!(
        "⚔️ BATTLE ⚔️\nChallenger (挑战者): \"{challenger}\"\nDefender (守擂者): \"{defender}\"\n\nJudge this battle. Output JSON only."
    )
}

pub fn make_free_mode_prompt(item_a: &str, item_b: &str) -> String {
    format!("⚔️ BATTLE ⚔️\nA: \"{item_a}\"\nB: \"{item_b}\"\n\nJudge this battle. Output JSON only.")
}

pub fn make_similarity_prompt(new_item: &str, used_items: &[String]) -> String {
    format!(
        "Check: \"{new_item}\"\nUsed: [{used}]\nOutput JSON. Reason in Chinese if similar.",
        used = used_items.join(", ")
    )
}
