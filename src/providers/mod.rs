//! Provider adapters.
//!
//! Each adapter owns one HTTP call and one normalization strategy and always
//! returns a [`ProviderResult`]; every failure is folded into the result.

pub mod claude;
pub mod gemini;
pub mod openai;
pub mod perplexity;

pub use claude::{ClaudeAdapter, ClaudeResponse};
pub use gemini::{GeminiAdapter, GeminiResponse};
pub use openai::{OpenAiAdapter, OpenAiResponse};
pub use perplexity::{PerplexityAdapter, PerplexityResponse};

use crate::config::{ProviderSettings, ProvidersConfig};
use crate::error::ProviderError;
use crate::models::{ProviderId, ProviderResult, Query, TextSpan, UnifiedCitation};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    fn model_name(&self) -> &str;

    /// Never fails: transport, status and parse errors come back as a
    /// `success: false` result.
    async fn call(&self, query: &Query) -> ProviderResult;
}

/// Normalized body of a successful provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAnswer {
    pub model_name: Option<String>,
    pub answer_text: String,
    pub citations: Vec<UnifiedCitation>,
}

/// One citation before ids and positions are assigned.
#[derive(Debug, Clone, Default)]
pub(crate) struct CitationDraft {
    pub url: String,
    pub clean_url: String,
    pub domain: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub published_date: Option<String>,
    pub mention_count: usize,
    pub confidence_scores: Vec<f64>,
    pub text_spans: Vec<TextSpan>,
}

/// Assigns ids and 1-based positions in first-seen order.
pub(crate) fn finish_citations(
    provider: ProviderId,
    drafts: Vec<CitationDraft>,
) -> Vec<UnifiedCitation> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(idx, draft)| {
            let average_confidence = if draft.confidence_scores.is_empty() {
                None
            } else {
                Some(
                    draft.confidence_scores.iter().sum::<f64>()
                        / draft.confidence_scores.len() as f64,
                )
            };
            UnifiedCitation {
                id: Uuid::new_v4().to_string(),
                source_provider: provider,
                position: idx + 1,
                url: draft.url,
                clean_url: draft.clean_url,
                domain: draft.domain,
                title: draft.title,
                snippet: draft.snippet,
                published_date: draft.published_date,
                mention_count: draft.mention_count.max(1),
                average_confidence,
                confidence_scores: draft.confidence_scores,
                text_spans: draft.text_spans,
            }
        })
        .collect()
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Run one provider call and fold its outcome into a [`ProviderResult`].
pub(crate) async fn into_result<F>(provider: ProviderId, model: &str, call: F) -> ProviderResult
where
    F: Future<Output = Result<ProviderAnswer, ProviderError>>,
{
    let start = Instant::now();
    let outcome = call.await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(answer) => {
            debug!(
                provider = %provider,
                citations = answer.citations.len(),
                elapsed_ms,
                "Provider call succeeded"
            );
            ProviderResult {
                success: true,
                provider_id: provider,
                model_name: answer.model_name.unwrap_or_else(|| model.to_string()),
                answer_text: answer.answer_text,
                citations: answer.citations,
                response_time_ms: elapsed_ms,
                error: None,
                error_kind: None,
            }
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, elapsed_ms, "Provider call failed");
            ProviderResult::failed(provider, model, e.kind(), e.to_string(), elapsed_ms)
        }
    }
}

/// Send a request and decode a 2xx JSON body. Non-2xx is a transport error,
/// an undecodable body a parse error.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: ProviderId,
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Transport(format!("{provider} request failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Transport(format!("{provider} body read failed: {e}")))?;

    if !status.is_success() {
        return Err(ProviderError::Transport(format!(
            "{provider} returned {status}: {}",
            error_excerpt(&body)
        )));
    }

    serde_json::from_str(&body)
        .map_err(|e| ProviderError::Parse(format!("{provider} response: {e}")))
}

const ERROR_BODY_LIMIT: usize = 300;

/// Upstream error body flattened onto one line and cut to `ERROR_BODY_LIMIT` chars.
fn error_excerpt(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

/// Build one adapter per provider that has a credential.
pub fn build_adapters(
    config: &ProvidersConfig,
    client: reqwest::Client,
) -> Vec<Arc<dyn ProviderAdapter>> {
    let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

    if let Some(settings) = configured(&config.perplexity) {
        adapters.push(Arc::new(PerplexityAdapter::new(settings, client.clone())));
    }
    if let Some(settings) = configured(&config.openai) {
        adapters.push(Arc::new(OpenAiAdapter::new(settings, client.clone())));
    }
    if let Some(settings) = configured(&config.gemini) {
        adapters.push(Arc::new(GeminiAdapter::new(settings, client.clone())));
    }
    if let Some(settings) = configured(&config.claude) {
        adapters.push(Arc::new(ClaudeAdapter::new(settings, client)));
    }

    adapters
}

fn configured(settings: &Option<ProviderSettings>) -> Option<ProviderSettings> {
    settings
        .as_ref()
        .filter(|s| !s.api_key.trim().is_empty())
        .cloned()
}
