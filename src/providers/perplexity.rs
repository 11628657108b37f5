use super::{finish_citations, into_result, non_empty, send_json, CitationDraft, ProviderAdapter, ProviderAnswer};
use crate::canonical::{clean_url, extract_domain, marker_spans};
use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::models::{ProviderId, ProviderResult, Query};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Characters kept on each side of a `[n]` marker.
const MARKER_WINDOW: usize = 100;

#[derive(Debug, Serialize)]
struct PerplexityRequest<'a> {
    model: &'a str,
    messages: Vec<PerplexityMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct PerplexityMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerplexityResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<PerplexityChoice>,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub search_results: Vec<PerplexitySearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerplexityChoice {
    pub message: PerplexityReply,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerplexityReply {
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerplexitySearchResult {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Marker-referenced citation list: `citations[n]` is referenced as `[n+1]`
/// in the answer text.
pub struct PerplexityAdapter {
    client: reqwest::Client,
    settings: ProviderSettings,
}

impl PerplexityAdapter {
    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self { client, settings }
    }

    async fn request(&self, query: &Query) -> Result<ProviderAnswer, ProviderError> {
        let body = PerplexityRequest {
            model: &self.settings.model,
            messages: vec![PerplexityMessage {
                role: "user",
                content: query.text(),
            }],
        };

        let request = self
            .client
            .post(format!("{}/chat/completions", self.settings.base_url))
            .bearer_auth(&self.settings.api_key)
            .json(&body);

        let response: PerplexityResponse = send_json(ProviderId::Perplexity, request).await?;
        normalize(&response)
    }
}

#[async_trait]
impl ProviderAdapter for PerplexityAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Perplexity
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn call(&self, query: &Query) -> ProviderResult {
        into_result(self.id(), self.model_name(), self.request(query)).await
    }
}

pub fn normalize(response: &PerplexityResponse) -> Result<ProviderAnswer, ProviderError> {
    let answer_text = response
        .choices
        .first()
        .map(|c| c.message.content.clone())
        .ok_or_else(|| ProviderError::Parse("perplexity response has no choices".into()))?;

    // Newer responses may carry only `search_results`.
    let urls: Vec<String> = if response.citations.is_empty() {
        response.search_results.iter().map(|r| r.url.clone()).collect()
    } else {
        response.citations.clone()
    };

    let metadata: HashMap<String, &PerplexitySearchResult> = response
        .search_results
        .iter()
        .map(|r| (clean_url(&r.url), r))
        .collect();

    let mut drafts: Vec<CitationDraft> = Vec::new();
    let mut by_clean_url: HashMap<String, usize> = HashMap::new();

    for (idx, url) in urls.iter().enumerate() {
        let domain = extract_domain(url);
        let clean = clean_url(url);
        if domain.is_empty() || clean.is_empty() {
            continue;
        }

        let marker = format!("[{}]", idx + 1);
        let spans = marker_spans(&answer_text, &marker, MARKER_WINDOW);
        let occurrences = spans.len();

        if let Some(&existing) = by_clean_url.get(&clean) {
            let draft = &mut drafts[existing];
            draft.mention_count += occurrences;
            draft.text_spans.extend(spans);
            continue;
        }

        let meta = metadata.get(&clean);
        by_clean_url.insert(clean.clone(), drafts.len());
        drafts.push(CitationDraft {
            url: url.clone(),
            clean_url: clean,
            domain,
            title: non_empty(meta.and_then(|m| m.title.clone())),
            snippet: non_empty(meta.and_then(|m| m.snippet.clone())),
            published_date: non_empty(meta.and_then(|m| m.date.clone())),
            mention_count: occurrences,
            confidence_scores: Vec::new(),
            text_spans: spans,
        });
    }

    Ok(ProviderAnswer {
        model_name: response.model.clone(),
        answer_text,
        citations: finish_citations(ProviderId::Perplexity, drafts),
    })
}
