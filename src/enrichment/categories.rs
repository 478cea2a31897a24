//! Incremental category summaries (`SPEC_FULL.md` §4.5): only
//! categories missing from the cached `name → summary` map get a fresh
//! LLM call, avoiding the ~90% of calls a full resummarize would cost
//! on an incremental enrichment run.

use std::collections::HashMap;

use anyhow::Result;

use crate::config::EnrichmentConfig;
use crate::error::CoreError;
use crate::resilience::{Profile, ResilientExecutor};

/// One LLM call per category name not already in `cache`. The caller
/// persists the merged map back to the category summary cache file.
pub async fn summarize_new_categories<F, Fut>(
    category_names: &[String],
    cache: &HashMap<String, String>,
    summarize_one: F,
) -> Result<HashMap<String, String>>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let mut merged = cache.clone();

    for name in category_names {
        if merged.contains_key(name) {
            continue;
        }
        let summary = summarize_one(name.clone()).await?;
        merged.insert(name.clone(), summary);
    }

    Ok(merged)
}

/// Default LLM-backed summarizer, used when the caller doesn't supply
/// a stub for testing. Mirrors the extraction pipeline's chat-style
/// call but with a one-line prompt and no JSON contract. Runs the
/// single HTTP attempt through the resilience layer's `LLM_API`
/// profile, the same convention as `extractor::extract_concepts`.
pub async fn llm_summarize_category(
    resilience: &ResilientExecutor,
    config: &EnrichmentConfig,
    name: &str,
) -> Result<String> {
    Ok(resilience
        .execute(Profile::LlmApi, "summarize_category", || {
            call_llm_summarize(config, name)
        })
        .await?)
}

async fn call_llm_summarize(
    config: &EnrichmentConfig,
    name: &str,
) -> Result<String, CoreError> {
    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let endpoint = config
        .llm_endpoint
        .clone()
        .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| CoreError::fatal(e.to_string()))?;

    let body = serde_json::json!({
        "model": config.llm_model,
        "messages": [
            {"role": "system", "content": "Write a single-sentence summary of the given technical domain category."},
            {"role": "user", "content": name},
        ],
    });

    let mut request = client.post(&endpoint).json(&body);
    if !api_key.is_empty() {
        request = request.header("Authorization", format!("Bearer {api_key}"));
    }

    let response = request
        .send()
        .await
        .map_err(|e| CoreError::transient("summarize_category", e.to_string()))?;

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
            .unwrap_or_default()
            .trim()
            .to_string();
        return Ok(content);
    }
    if status.as_u16() == 429 {
        return Err(CoreError::RateLimited {
            operation: "summarize_category".to_string(),
        });
    }
    if status.is_server_error() {
        return Err(CoreError::transient(
            "summarize_category",
            format!("status {status}"),
        ));
    }
    let body_text = response.text().await.unwrap_or_default();
    Err(CoreError::fatal(format!(
        "LLM API error {status}: {body_text}"
    )))
}
