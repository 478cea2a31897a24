//! Per-signal scoring and weighted fusion (`SPEC_FULL.md` §4.4 steps
//! 3-5). The storage layer returns raw rows; everything here is pure
//! computation over `(query, expanded terms, candidate)` — no I/O.

use crate::config::RankingConfig;
use crate::models::{ComponentScores, ExpandedTerm, ExpansionSource};

const BM25_K1: f32 = 1.5;
const BM25_B: f32 = 0.75;

fn word_count(text: &str, term: &str) -> usize {
    let lower = text.to_lowercase();
    let needle = term.to_lowercase();
    if needle.is_empty() {
        return 0;
    }
    lower.matches(needle.as_str()).count()
}

fn contains_word_boundary(text: &str, term: &str) -> bool {
    let lower = text.to_lowercase();
    let needle = term.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = lower[start..].find(needle.as_str()) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !lower.as_bytes()[abs - 1].is_ascii_alphanumeric();
        let after = abs + needle.len();
        let after_ok = after >= lower.len() || !lower.as_bytes()[after].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        start = abs + 1;
    }
    false
}

/// Standard BM25 over `candidate_texts`, scored for `text` against the
/// expansion-weighted term set, normalized by `tanh(raw / b)`.
pub fn bm25_score(
    text: &str,
    candidate_texts: &[&str],
    expanded: &[ExpandedTerm],
    b_normalizer: f32,
) -> f32 {
    if candidate_texts.is_empty() || expanded.is_empty() {
        return 0.0;
    }

    let n = candidate_texts.len() as f32;
    let avg_doc_len: f32 = candidate_texts
        .iter()
        .map(|t| t.split_whitespace().count() as f32)
        .sum::<f32>()
        / n;
    let doc_len = text.split_whitespace().count() as f32;

    let mut raw = 0.0f32;
    for expanded_term in expanded {
        let df = candidate_texts
            .iter()
            .filter(|t| word_count(t, &expanded_term.term) > 0)
            .count() as f32;
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln().max(0.0);
        let tf = word_count(text, &expanded_term.term) as f32;
        if tf == 0.0 {
            continue;
        }
        let denom = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_doc_len.max(1.0));
        raw += expanded_term.weight * idf * (tf * (BM25_K1 + 1.0)) / denom.max(1e-6);
    }

    (raw / b_normalizer.max(1e-6)).tanh().clamp(0.0, 1.0)
}

/// Fraction of original query terms appearing (word-boundary aware,
/// case-insensitive) in `title_or_source`, +0.25 bonus if all are
/// present, clamped to `[0,1]`.
pub fn title_score(title_or_source: &str, original_terms: &[String]) -> f32 {
    if original_terms.is_empty() {
        return 0.0;
    }
    let matched = original_terms
        .iter()
        .filter(|t| contains_word_boundary(title_or_source, t))
        .count();
    let fraction = matched as f32 / original_terms.len() as f32;
    let bonus = if matched == original_terms.len() {
        0.25
    } else {
        0.0
    };
    (fraction + bonus).clamp(0.0, 1.0)
}

/// `|expanded_terms ∩ row.concepts| / max(1, |original_terms|)`,
/// clamped to `[0,1]`.
pub fn concept_score(
    row_concepts: &[String],
    expanded: &[ExpandedTerm],
    original_terms: &[String],
) -> f32 {
    let row_lower: Vec<String> = row_concepts.iter().map(|c| c.to_lowercase()).collect();
    let matched = expanded
        .iter()
        .filter(|e| row_lower.iter().any(|c| c == &e.term.to_lowercase()))
        .count();
    let denom = original_terms.len().max(1) as f32;
    (matched as f32 / denom).clamp(0.0, 1.0)
}

/// Fraction of WordNet-added terms (synonym or hypernym weight) that
/// appear in the row's text.
pub fn wordnet_score(text: &str, expanded: &[ExpandedTerm]) -> f32 {
    let wordnet_terms: Vec<&ExpandedTerm> = expanded
        .iter()
        .filter(|e| {
            matches!(
                e.source,
                ExpansionSource::WordNetSynonym | ExpansionSource::WordNetHypernym
            )
        })
        .collect();

    if wordnet_terms.is_empty() {
        return 0.0;
    }

    let matched = wordnet_terms
        .iter()
        .filter(|e| contains_word_boundary(text, &e.term))
        .count();

    (matched as f32 / wordnet_terms.len() as f32).clamp(0.0, 1.0)
}

/// Fused hybrid score per the fixed (default) weight vector, or
/// whatever weights the caller's config carries.
pub fn fuse(scores: ComponentScores, config: &RankingConfig) -> f32 {
    (config.weight_vector * scores.vector_score
        + config.weight_bm25 * scores.bm25_score
        + config.weight_title * scores.title_score
        + config.weight_concept * scores.concept_score
        + config.weight_wordnet * scores.wordnet_score)
        .clamp(0.0, 1.0)
}

/// Tie-break comparator: higher hybrid wins; ties by higher
/// concept_score, then higher vector_score, then lexicographic id.
pub fn tie_break_cmp(
    a: (f32, &ComponentScores, u64),
    b: (f32, &ComponentScores, u64),
) -> std::cmp::Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| b.1.concept_score.total_cmp(&a.1.concept_score))
        .then_with(|| b.1.vector_score.total_cmp(&a.1.vector_score))
        .then_with(|| a.2.cmp(&b.2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(t: &str, w: f32, s: ExpansionSource) -> ExpandedTerm {
        ExpandedTerm {
            term: t.to_string(),
            weight: w,
            source: s,
        }
    }

    #[test]
    fn title_score_full_match_gets_bonus() {
        let score = title_score("Mutex and Semaphore Basics", &["mutex".into(), "semaphore".into()]);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn title_score_partial_match() {
        let score = title_score("Mutex Basics", &["mutex".into(), "semaphore".into()]);
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn title_score_no_match_is_zero() {
        let score = title_score("Unrelated Topic", &["mutex".into()]);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn word_boundary_rejects_partial_word() {
        assert!(!contains_word_boundary("semaphoreX", "semaphore"));
        assert!(contains_word_boundary("a semaphore here", "semaphore"));
    }

    #[test]
    fn concept_score_counts_overlap_against_original_terms() {
        let expanded = vec![
            term("mutex", 1.0, ExpansionSource::Original),
            term("lock", 0.6, ExpansionSource::WordNetSynonym),
        ];
        let score = concept_score(
            &["mutex".to_string(), "semaphore".to_string()],
            &expanded,
            &["mutex".to_string()],
        );
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn wordnet_score_only_counts_wordnet_sourced_terms() {
        let expanded = vec![
            term("mutex", 1.0, ExpansionSource::Original),
            term("lock", 0.6, ExpansionSource::WordNetSynonym),
            term("latch", 0.4, ExpansionSource::WordNetHypernym),
        ];
        let score = wordnet_score("uses a lock internally", &expanded);
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn bm25_prefers_document_with_more_term_occurrences() {
        let expanded = vec![term("mutex", 1.0, ExpansionSource::Original)];
        let candidates = vec!["mutex mutex mutex lock", "unrelated text about cats"];
        let high = bm25_score(candidates[0], &candidates, &expanded, 10.0);
        let low = bm25_score(candidates[1], &candidates, &expanded, 10.0);
        assert!(high > low);
    }

    #[test]
    fn fuse_matches_default_weight_vector() {
        let config = RankingConfig::default();
        let scores = ComponentScores {
            vector_score: 1.0,
            bm25_score: 1.0,
            title_score: 1.0,
            concept_score: 1.0,
            wordnet_score: 1.0,
        };
        assert!((fuse(scores, &config) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn tie_break_prefers_higher_concept_score_on_equal_hybrid() {
        let a = ComponentScores {
            concept_score: 0.9,
            vector_score: 0.1,
            ..Default::default()
        };
        let b = ComponentScores {
            concept_score: 0.1,
            vector_score: 0.9,
            ..Default::default()
        };
        let ordering = tie_break_cmp((0.5, &a, 2), (0.5, &b, 1));
        assert_eq!(ordering, std::cmp::Ordering::Less);
    }
}
