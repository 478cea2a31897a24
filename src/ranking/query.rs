//! Query normalization and expansion (`SPEC_FULL.md` §4.4 steps 1-2).

use std::collections::HashSet;

use crate::config::RankingConfig;
use crate::models::{ExpandedTerm, ExpansionSource};
use crate::ranking::wordnet::WordNetSource;
use crate::store::concept::ConceptCollection;
use crate::store::Collection;

/// A standard English stop-list. Not exhaustive — broad enough that a
/// stop-words-only query (boundary case in `SPEC_FULL.md` §8) reliably
/// expands to nothing.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "has", "had", "was", "were",
    "with", "this", "that", "from", "they", "will", "would", "could", "should", "what", "when",
    "where", "which", "who", "why", "how", "about", "into", "over", "than", "then", "them",
    "their", "there", "these", "those", "some", "such", "its", "his", "her", "our", "your", "who",
    "does", "did", "doing", "have", "having", "been", "being", "both", "each", "more", "most",
    "other", "own", "same", "through", "too", "very", "just", "also", "off", "out", "any",
];

/// Lowercase, split on non-alphanumeric runs, drop tokens of length
/// ≤2 and stop-words. Order preserved (original encounter order) for
/// logging/debug output.
pub fn normalize_and_tokenize(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut seen = HashSet::new();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .filter(|t| t.len() > 2)
        .filter(|t| !STOP_WORDS.contains(t))
        .filter(|t| seen.insert(t.to_string()))
        .map(|t| t.to_string())
        .collect()
}

/// Build the weighted expansion set `E` from the original query terms.
pub async fn expand_terms(
    original_terms: &[String],
    concepts: &ConceptCollection,
    wordnet: &dyn WordNetSource,
    config: &RankingConfig,
) -> Vec<ExpandedTerm> {
    let mut expanded: Vec<ExpandedTerm> = Vec::new();
    let mut present: HashSet<String> = HashSet::new();

    for term in original_terms {
        expanded.push(ExpandedTerm {
            term: term.clone(),
            weight: 1.0,
            source: ExpansionSource::Original,
        });
        present.insert(term.clone());
    }

    for term in original_terms {
        if let Ok(Some(concept)) = concepts.get_by_name(term).await {
            for related in concept.related_concepts.iter().take(config.n_corpus) {
                let key = related.to_lowercase();
                if present.insert(key) {
                    expanded.push(ExpandedTerm {
                        term: related.clone(),
                        weight: 0.8,
                        source: ExpansionSource::ConceptCorpus,
                    });
                }
            }
        }
    }

    for term in original_terms {
        if !wordnet.contains(term) {
            continue;
        }
        for syn in wordnet.synonyms(term, config.n_wn_synonyms) {
            let key = syn.to_lowercase();
            if present.insert(key) {
                expanded.push(ExpandedTerm {
                    term: syn,
                    weight: 0.6,
                    source: ExpansionSource::WordNetSynonym,
                });
            }
        }
        for hyp in wordnet.hypernyms(term, config.n_wn_hypernyms) {
            let key = hyp.to_lowercase();
            if present.insert(key) {
                expanded.push(ExpandedTerm {
                    term: hyp,
                    weight: 0.4,
                    source: ExpansionSource::WordNetHypernym,
                });
            }
        }
    }

    if expanded.len() > config.max_expanded_terms {
        expanded.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        expanded.truncate(config.max_expanded_terms);
    }

    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::wordnet::{BundledWordNet, DisabledWordNet};

    #[test]
    fn drops_short_tokens_and_stopwords() {
        let terms = normalize_and_tokenize("The mutex and a lock");
        assert_eq!(terms, vec!["mutex", "lock"]);
    }

    #[test]
    fn stop_words_only_query_yields_empty_terms() {
        let terms = normalize_and_tokenize("the and for");
        assert!(terms.is_empty());
    }

    #[test]
    fn dedupes_repeated_terms_preserving_first_order() {
        let terms = normalize_and_tokenize("mutex lock mutex");
        assert_eq!(terms, vec!["mutex", "lock"]);
    }

    #[tokio::test]
    async fn disabled_wordnet_yields_only_original_terms_without_concepts() {
        // Without a concept collection available in this unit test, only
        // wordnet expansion is exercised directly through the trait; full
        // concept-corpus expansion is covered by store-backed integration
        // tests.
        let wn = DisabledWordNet;
        assert!(wn.synonyms("mutex", 3).is_empty());
        let _ = BundledWordNet::load();
    }

    #[tokio::test]
    async fn thread_synchronization_query_expands_to_mutex_and_semaphore() {
        // `SPEC_FULL.md` §8 scenario 2: the literal query "thread
        // synchronization" must expand to include "mutex"/"semaphore" so
        // it can recall a document that never mentions "thread" or
        // "synchronization" at all.
        let wn = BundledWordNet::load();
        let config = RankingConfig::default();
        let terms = normalize_and_tokenize("thread synchronization");
        let wn_terms: Vec<String> = terms
            .iter()
            .flat_map(|t| {
                let mut v = wn.synonyms(t, config.n_wn_synonyms);
                v.extend(wn.hypernyms(t, config.n_wn_hypernyms));
                v
            })
            .collect();
        assert!(wn_terms.iter().any(|t| t == "mutex"));
        assert!(wn_terms.iter().any(|t| t == "semaphore"));
    }
}
