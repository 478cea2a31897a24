//! Four-tier chunk-concept matcher (`SPEC_FULL.md` §4.5): each
//! candidate concept name is tested against chunk text with
//! increasingly lenient rules until one matches, or all four fail.
//! Tier 1 and tier 3 both require word-boundary safety (a bare
//! substring check would false-positive on partial words, e.g.
//! "semaphore" inside "semaphoreX") — tier 1 requires the whole term
//! to match as one bounded phrase, tier 3 settles for just one of its
//! constituent words when tier 2's "all words present" already failed.

use strsim::normalized_levenshtein;

const FUZZY_MIN_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    ExactSubstring,
    AllWordsPresent,
    WordBoundary,
    Fuzzy,
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
        let before_ok = abs == 0 || !lower.as_bytes()[abs - 1].is_ascii_alphanumeric();
        let after = abs + needle.len();
        let after_ok = after >= lower.len() || !lower.as_bytes()[after].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        start = abs + 1;
    }
    false
}

/// Tier 3 fallback: at least one constituent word of `term` matches at
/// a word boundary, even if not all of them do (distinct from tier 2,
/// which requires every word).
fn any_word_boundary_match(text: &str, term: &str) -> bool {
    term.split_whitespace().any(|word| contains_word_boundary(text, word))
}

fn all_words_present(text: &str, term: &str) -> bool {
    let lower_text = text.to_lowercase();
    let words: Vec<&str> = term.split_whitespace().collect();
    if words.len() < 2 {
        return false;
    }
    words
        .iter()
        .all(|w| lower_text.contains(&w.to_lowercase()))
}

fn fuzzy_match(text: &str, term: &str, min_ratio: f64) -> bool {
    if term.len() < FUZZY_MIN_LEN {
        return false;
    }
    let needle = term.to_lowercase();
    text.split_whitespace().any(|word| {
        let candidate = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        candidate.len() >= FUZZY_MIN_LEN
            && normalized_levenshtein(&candidate, &needle) >= min_ratio
    })
}

/// Tier at which `term` matches `text`, trying cheapest/strictest first.
pub fn match_tier(text: &str, term: &str, fuzzy_min_ratio: f64) -> Option<MatchTier> {
    let lower_term = term.to_lowercase();

    if !lower_term.is_empty() && contains_word_boundary(text, term) {
        return Some(MatchTier::ExactSubstring);
    }
    if all_words_present(text, term) {
        return Some(MatchTier::AllWordsPresent);
    }
    if any_word_boundary_match(text, term) {
        return Some(MatchTier::WordBoundary);
    }
    if fuzzy_match(text, term, fuzzy_min_ratio) {
        return Some(MatchTier::Fuzzy);
    }
    None
}

/// Concepts from `candidates` that match `text` at any tier, plus the
/// resulting `concept_density = matched / candidates_considered`.
pub fn match_concepts(text: &str, candidates: &[String], fuzzy_min_ratio: f64) -> (Vec<String>, f32) {
    if candidates.is_empty() {
        return (Vec::new(), 0.0);
    }
    let matched: Vec<String> = candidates
        .iter()
        .filter(|c| match_tier(text, c, fuzzy_min_ratio).is_some())
        .cloned()
        .collect();
    let density = matched.len() as f32 / candidates.len() as f32;
    (matched, density)
}
