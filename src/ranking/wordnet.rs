//! WordNet-equivalent synonym/hypernym source.
//!
//! No crate in this corpus wraps a real WordNet database, so this
//! module defines the lookup as a trait (`WordNetSource`) with one
//! implementation backed by a small bundled JSON table of common
//! English words — enough to drive expansion-based recall tests
//! (`SPEC_FULL.md` §8 scenario 2) without a network dependency or a
//! multi-hundred-megabyte database file. A deployment that needs full
//! WordNet coverage can implement the same trait against a real
//! database without touching the ranking engine.

use std::collections::HashMap;

use serde::Deserialize;

/// One entry in the bundled table.
#[derive(Debug, Clone, Deserialize)]
struct WordEntry {
    synonyms: Vec<String>,
    #[serde(default)]
    hypernyms: Vec<String>,
}

pub trait WordNetSource: Send + Sync {
    /// Up to `n` synonyms for `word`, or empty if not a recognised
    /// common word.
    fn synonyms(&self, word: &str, n: usize) -> Vec<String>;

    /// Up to `n` hypernyms (broader terms) for `word`.
    fn hypernyms(&self, word: &str, n: usize) -> Vec<String>;

    /// Whether `word` is present in the source at all — callers use
    /// this to decide whether a term is "a common English word"
    /// before spending expansion budget on it (`SPEC_FULL.md` §4.4
    /// step 2).
    fn contains(&self, word: &str) -> bool;
}

/// Static bundled synonym/hypernym table, loaded once from embedded
/// JSON (`assets/wordnet_table.json`).
pub struct BundledWordNet {
    table: HashMap<String, WordEntry>,
}

const BUNDLED_TABLE_JSON: &str = include_str!("../../assets/wordnet_table.json");

impl BundledWordNet {
    pub fn load() -> Self {
        let table: HashMap<String, WordEntry> =
            serde_json::from_str(BUNDLED_TABLE_JSON).unwrap_or_default();
        Self { table }
    }
}

impl Default for BundledWordNet {
    fn default() -> Self {
        Self::load()
    }
}

impl WordNetSource for BundledWordNet {
    fn synonyms(&self, word: &str, n: usize) -> Vec<String> {
        self.table
            .get(&word.to_lowercase())
            .map(|entry| entry.synonyms.iter().take(n).cloned().collect())
            .unwrap_or_default()
    }

    fn hypernyms(&self, word: &str, n: usize) -> Vec<String> {
        self.table
            .get(&word.to_lowercase())
            .map(|entry| entry.hypernyms.iter().take(n).cloned().collect())
            .unwrap_or_default()
    }

    fn contains(&self, word: &str) -> bool {
        self.table.contains_key(&word.to_lowercase())
    }
}

/// A source with no entries, used when `--with-wordnet` is not
/// passed.
pub struct DisabledWordNet;

impl WordNetSource for DisabledWordNet {
    fn synonyms(&self, _word: &str, _n: usize) -> Vec<String> {
        Vec::new()
    }
    fn hypernyms(&self, _word: &str, _n: usize) -> Vec<String> {
        Vec::new()
    }
    fn contains(&self, _word: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutex_has_synonyms_and_hypernym() {
        let wn = BundledWordNet::load();
        assert!(wn.contains("mutex"));
        let syns = wn.synonyms("mutex", 3);
        assert!(syns.iter().any(|s| s == "lock" || s == "semaphore"));
        let hyps = wn.hypernyms("mutex", 2);
        assert!(!hyps.is_empty());
    }

    #[test]
    fn unknown_word_is_absent() {
        let wn = BundledWordNet::load();
        assert!(!wn.contains("zzznotaword"));
        assert!(wn.synonyms("zzznotaword", 3).is_empty());
    }

    #[test]
    fn disabled_source_never_expands() {
        let wn = DisabledWordNet;
        assert!(!wn.contains("mutex"));
        assert!(wn.synonyms("mutex", 3).is_empty());
    }

    #[test]
    fn respects_n_cap() {
        let wn = BundledWordNet::load();
        assert!(wn.synonyms("thread", 1).len() <= 1);
    }

    #[test]
    fn synchronization_expands_toward_mutex_and_semaphore() {
        // `SPEC_FULL.md` §8 scenario 2: a query for "thread synchronization"
        // must be able to recall a document that only mentions
        // "mutex"/"semaphore", via this table's expansion of
        // "synchronization" — not just the easier inverse direction.
        let wn = BundledWordNet::load();
        let syns = wn.synonyms("synchronization", 4);
        assert!(syns.iter().any(|s| s == "mutex"));
        assert!(syns.iter().any(|s| s == "semaphore"));
    }
}
