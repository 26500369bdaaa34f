//! Battle result cache.
//!
//! Only the winner's name is remembered, keyed by the unordered pair of
//! item names. Entries never expire; `clear` is the only way out.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::storage::{self, KeyValueStore};

pub const BATTLE_CACHE_KEY: &str = "battle_results_cache";

type CacheMap = BTreeMap<String, String>;

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Order-independent key: `key(a, b) == key(b, a)`.
pub fn cache_key(a: &str, b: &str) -> String {
    let mut pair = [normalize_name(a), normalize_name(b)];
    pair.sort();
    format!("{}|{}", pair[0], pair[1])
}

#[derive(Clone)]
pub struct BattleCache {
    store: Arc<dyn KeyValueStore>,
}

impl BattleCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn entries(&self) -> CacheMap {
        storage::load(self.store.as_ref(), BATTLE_CACHE_KEY).unwrap_or_default()
    }

    /// Records `winner` for the pair, replacing any earlier result.
    pub fn put(&self, a: &str, b: &str, winner: &str) {
        let winner = normalize_name(winner);
        info!(a, b, winner = %winner, "caching battle result");
        storage::modify(self.store.as_ref(), BATTLE_CACHE_KEY, |entries: &mut CacheMap| {
            entries.insert(cache_key(a, b), winner);
        });
    }

    /// Normalized winner of an earlier battle between the two items.
    pub fn get(&self, a: &str, b: &str) -> Option<String> {
        let winner = self.entries().remove(&cache_key(a, b))?;
        info!(a, b, winner = %winner, "battle cache hit");
        Some(winner)
    }

    pub fn clear(&self) {
        storage::discard(self.store.as_ref(), BATTLE_CACHE_KEY);
        info!("battle cache cleared");
    }

    pub fn count(&self) -> usize {
        self.entries().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use proptest::prelude::*;

    fn cache() -> BattleCache {
        BattleCache::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn key_sorts_and_normalizes() {
        assert_eq!(cache_key(" Water ", "fire"), "fire|water");
        assert_eq!(cache_key("fire", "WATER"), "fire|water");
    }

    #[test]
    fn lookup_is_symmetric_and_stores_normalized_winner() {
        let cache = cache();
        cache.put("Paper", "Rock", "  Paper ");
        assert_eq!(cache.get("rock", "PAPER").as_deref(), Some("paper"));
        assert_eq!(cache.get("Paper", "Rock").as_deref(), Some("paper"));
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn put_overwrites_and_clear_forgets() {
        let cache = cache();
        cache.put("a", "b", "a");
        cache.put("b", "a", "b");
        assert_eq!(cache.get("a", "b").as_deref(), Some("b"));
        cache.put("c", "d", "d");
        assert_eq!(cache.count(), 2);

        cache.clear();
        assert_eq!(cache.get("a", "b"), None);
        assert_eq!(cache.get("c", "d"), None);
        assert_eq!(cache.count(), 0);
    }

    proptest! {
        #[test]
        fn prop_key_is_order_independent(a in "\\PC{0,12}", b in "\\PC{0,12}") {
            prop_assert_eq!(cache_key(&a, &b), cache_key(&b, &a));
        }

        #[test]
        fn prop_key_ignores_ascii_case_and_padding(a in "[a-zA-Z ]{1,10}", b in "[a-zA-Z ]{1,10}") {
            let padded_upper_a = format!("  {}\t", a.to_uppercase());
            let padded_b = format!("\n{} ", b);
            prop_assert_eq!(cache_key(&a, &b), cache_key(&padded_upper_a, &padded_b));
        }

        #[test]
        fn prop_round_trip_returns_normalized_winner(a in "[a-z]{1,8}", b in "[a-z]{1,8}", upper in any::<bool>()) {
            let cache = cache();
            let winner = if upper { a.to_uppercase() } else { a.clone() };
            cache.put(&a, &b, &winner);
            prop_assert_eq!(cache.get(&b, &a), Some(normalize_name(&winner)));
        }
    }
}
