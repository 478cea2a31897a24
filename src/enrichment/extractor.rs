//! Concept extraction: the LLM call that turns document text into the
//! `{primary_concepts, technical_terms, acronyms, categories,
//! related_concepts}` contract (`SPEC_FULL.md` §4.5), with the
//! malformed-JSON sanitize-and-retry-once rule and token-threshold
//! chunked extraction for long documents.
//!
//! Each call makes one HTTP attempt and classifies the outcome into a
//! [`CoreError`], the same convention as `crate::embedding`'s OpenAI
//! backend, generalized from an embeddings endpoint to a
//! chat-completion endpoint. [`extract_concepts`] runs that attempt
//! through the resilience layer's `LLM_API` profile, which supplies
//! the retry/backoff, circuit breaking, and bulkheading.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::EnrichmentConfig;
use crate::error::CoreError;
use crate::resilience::{Profile, ResilientExecutor};

/// Ideas the document is *about* (methodologies, processes, phenomena)
/// vs. things it merely *references* (proper nouns, artifacts,
/// notation) — the extraction taxonomy rule `SPEC_FULL.md` §4.5.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub primary_concepts: Vec<String>,
    #[serde(default)]
    pub technical_terms: Vec<String>,
    #[serde(default)]
    pub acronyms: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub related_concepts: Vec<String>,
}

const SYSTEM_PROMPT: &str = "You extract structured concepts from technical documents. \
Respond with a single JSON object with keys: primary_concepts (ideas, methodologies, \
processes, or phenomena the document is about, 80-150 entries), technical_terms \
(proper nouns, artifacts, titles, notation, or named roles the document references), \
acronyms (abbreviations used), categories (3-7 coarse domain labels), and \
related_concepts (20-40 concepts related to but not necessarily present in this \
document). Respond with JSON only, no prose, no markdown fences.";

/// Approximate token count using a whitespace-word proxy — good enough
/// to decide whether a document needs chunked extraction, not intended
/// as an exact tokenizer match for any particular model.
fn approx_token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split `text` into paragraph-aligned segments each under
/// `token_threshold` (approximate) tokens.
fn split_for_extraction(text: &str, token_threshold: usize) -> Vec<String> {
    if approx_token_count(text) <= token_threshold {
        return vec![text.to_string()];
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    for paragraph in text.split("\n\n") {
        let paragraph_tokens = approx_token_count(paragraph);
        if current_tokens + paragraph_tokens > token_threshold && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
        current_tokens += paragraph_tokens;
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.strip_suffix("```").unwrap_or(s))
        .unwrap_or(trimmed)
        .trim()
}

fn unescape_quotes(raw: &str) -> String {
    raw.replace("\\\"", "\"")
}

fn strip_trailing_commas(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn truncate_to_last_balanced_brace(raw: &str) -> String {
    let Some(start) = raw.find('{') else {
        return raw.to_string();
    };
    let mut depth = 0i32;
    let mut last_balanced_end = None;
    for (i, c) in raw[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    last_balanced_end = Some(start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    match last_balanced_end {
        Some(end) => raw[start..end].to_string(),
        None => raw[start..].to_string(),
    }
}

/// Best-effort repair of a malformed LLM JSON response, applied only
/// on the single permitted retry (`SPEC_FULL.md` §4.5).
fn sanitize_json(raw: &str) -> String {
    let stripped = strip_code_fences(raw);
    let unescaped = unescape_quotes(stripped);
    let no_trailing_commas = strip_trailing_commas(&unescaped);
    truncate_to_last_balanced_brace(&no_trailing_commas)
}

fn parse_extraction(raw: &str) -> Result<ExtractionResult> {
    let first_try = serde_json::from_str(strip_code_fences(raw));
    match first_try {
        Ok(result) => Ok(result),
        Err(_) => {
            let sanitized = sanitize_json(raw);
            serde_json::from_str(&sanitized).context("malformed extraction JSON after sanitize")
        }
    }
}

/// Case-insensitive union merge of multiple chunk-level extractions.
/// Category frequency is preserved (a category appearing in more
/// chunks keeps more weight downstream via `categories` repeating).
fn merge_extractions(results: &[ExtractionResult]) -> ExtractionResult {
    fn union_case_insensitive(lists: impl Iterator<Item = Vec<String>>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();
        for list in lists {
            for item in list {
                if seen.insert(item.to_lowercase()) {
                    merged.push(item);
                }
            }
        }
        merged
    }

    let mut category_counts: HashMap<String, u32> = HashMap::new();
    for result in results {
        for category in &result.categories {
            *category_counts.entry(category.clone()).or_insert(0) += 1;
        }
    }
    let mut categories: Vec<(String, u32)> = category_counts.into_iter().collect();
    categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ExtractionResult {
        primary_concepts: union_case_insensitive(
            results.iter().map(|r| r.primary_concepts.clone()),
        ),
        technical_terms: union_case_insensitive(
            results.iter().map(|r| r.technical_terms.clone()),
        ),
        acronyms: union_case_insensitive(results.iter().map(|r| r.acronyms.clone())),
        categories: categories.into_iter().map(|(name, _)| name).collect(),
        related_concepts: union_case_insensitive(
            results.iter().map(|r| r.related_concepts.clone()),
        ),
    }
}

/// One chat-completion request, no retry — the caller's
/// `ResilientExecutor` owns retry/backoff. A malformed response body
/// is `Fatal`, not retried: the sanitize-and-retry-once rule already
/// gave the JSON a second chance inside [`parse_extraction`].
async fn call_llm(config: &EnrichmentConfig, text: &str) -> Result<ExtractionResult, CoreError> {
    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let endpoint = config
        .llm_endpoint
        .clone()
        .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| CoreError::fatal(e.to_string()))?;

    let body = serde_json::json!({
        "model": config.llm_model,
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": text},
        ],
        "response_format": {"type": "json_object"},
    });

    let mut request = client.post(&endpoint).json(&body);
    if !api_key.is_empty() {
        request = request.header("Authorization", format!("Bearer {api_key}"));
    }

    let response = request
        .send()
        .await
        .map_err(|e| CoreError::transient("extract_concepts", e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::fatal(format!("malformed LLM response body: {e}")))?;
        let content = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| CoreError::fatal("missing content in LLM response"))?;
        return parse_extraction(content).map_err(|e| CoreError::fatal(e.to_string()));
    }
    if status.as_u16() == 429 {
        return Err(CoreError::RateLimited {
            operation: "extract_concepts".to_string(),
        });
    }
    if status.is_server_error() {
        return Err(CoreError::transient("extract_concepts", format!("status {status}")));
    }
    let body_text = response.text().await.unwrap_or_default();
    Err(CoreError::fatal(format!("LLM API error {status}: {body_text}")))
}

/// Extract concepts from `text`, splitting and merging if it exceeds
/// `config.token_threshold`. Errors here are caller's to isolate
/// per-document (`SPEC_FULL.md` §4.5 worker pool contract).
pub async fn extract_concepts(
    resilience: &ResilientExecutor,
    config: &EnrichmentConfig,
    text: &str,
) -> Result<ExtractionResult> {
    let segments = split_for_extraction(text, config.token_threshold);
    if segments.len() == 1 {
        return Ok(resilience
            .execute(Profile::LlmApi, "extract_concepts", || {
                call_llm(config, &segments[0])
            })
            .await?);
    }

    let mut results = Vec::with_capacity(segments.len());
    for segment in &segments {
        let result = resilience
            .execute(Profile::LlmApi, "extract_concepts", || {
                call_llm(config, segment)
            })
            .await?;
        results.push(result);
    }
    Ok(merge_extractions(&results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_short_text_as_one_segment() {
        let segments = split_for_extraction("short document", 100_000);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn split_breaks_long_text_on_paragraph_boundaries() {
        let paragraph = "word ".repeat(50);
        let text = vec![paragraph.clone(); 10].join("\n\n");
        let segments = split_for_extraction(&text, 100);
        assert!(segments.len() > 1);
        for segment in &segments {
            assert!(approx_token_count(segment) <= 150);
        }
    }

    #[test]
    fn sanitize_strips_code_fences_and_trailing_commas() {
        let raw = "```json\n{\"primary_concepts\": [\"a\", \"b\",], \"categories\": [],}\n```";
        let sanitized = sanitize_json(raw);
        let parsed: Result<ExtractionResult, _> = serde_json::from_str(&sanitized);
        assert!(parsed.is_ok());
    }

    #[test]
    fn truncate_to_last_balanced_brace_recovers_cut_off_json() {
        let raw = r#"{"primary_concepts": ["a", "b"], "categories": ["x"]} trailing garbage"#;
        let truncated = truncate_to_last_balanced_brace(raw);
        let parsed: Result<ExtractionResult, _> = serde_json::from_str(&truncated);
        assert!(parsed.is_ok());
    }

    #[test]
    fn parse_extraction_recovers_from_trailing_comma() {
        let raw = r#"{"primary_concepts": ["mutex",], "categories": ["concurrency"]}"#;
        let result = parse_extraction(raw).unwrap();
        assert_eq!(result.primary_concepts, vec!["mutex".to_string()]);
    }

    #[test]
    fn merge_preserves_category_frequency_order() {
        let a = ExtractionResult {
            categories: vec!["concurrency".to_string(), "storage".to_string()],
            ..Default::default()
        };
        let b = ExtractionResult {
            categories: vec!["concurrency".to_string()],
            ..Default::default()
        };
        let merged = merge_extractions(&[a, b]);
        assert_eq!(merged.categories[0], "concurrency");
    }

    #[test]
    fn merge_dedupes_case_insensitively() {
        let a = ExtractionResult {
            primary_concepts: vec!["Mutex".to_string()],
            ..Default::default()
        };
        let b = ExtractionResult {
            primary_concepts: vec!["mutex".to_string(), "Semaphore".to_string()],
            ..Default::default()
        };
        let merged = merge_extractions(&[a, b]);
        assert_eq!(merged.primary_concepts, vec!["Mutex".to_string(), "Semaphore".to_string()]);
    }
}
