use super::{finish_citations, into_result, non_empty, send_json, CitationDraft, ProviderAdapter, ProviderAnswer};
use crate::canonical::{clean_url, count_case_insensitive, extract_domain};
use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::models::{ProviderId, ProviderResult, Query};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;
const MAX_SEARCHES: u32 = 5;

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ClaudeMessage<'a>>,
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(default)]
        citations: Option<Vec<TextCitation>>,
    },
    WebSearchToolResult {
        content: ToolResultContent,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextCitation {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub cited_text: Option<String>,
}

/// Either the result list or an error object such as
/// `{"type": "web_search_tool_result_error", "error_code": "max_uses_exceeded"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Results(Vec<WebSearchResult>),
    Error(serde_json::Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchResult {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub page_age: Option<String>,
}

/// Web search tool results; usage is found by literal URL matching.
pub struct ClaudeAdapter {
    client: reqwest::Client,
    settings: ProviderSettings,
}

impl ClaudeAdapter {
    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self { client, settings }
    }

    async fn request(&self, query: &Query) -> Result<ProviderAnswer, ProviderError> {
        let body = ClaudeRequest {
            model: &self.settings.model,
            max_tokens: MAX_TOKENS,
            messages: vec![ClaudeMessage {
                role: "user",
                content: query.text(),
            }],
            tools: vec![json!({
                "type": "web_search_20250305",
                "name": "web_search",
                "max_uses": MAX_SEARCHES,
            })],
        };

        let request = self
            .client
            .post(format!("{}/messages", self.settings.base_url))
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response: ClaudeResponse = send_json(ProviderId::Claude, request).await?;
        normalize(&response)
    }
}

#[async_trait]
impl ProviderAdapter for ClaudeAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Claude
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn call(&self, query: &Query) -> ProviderResult {
        into_result(self.id(), self.model_name(), self.request(query)).await
    }
}

pub fn normalize(response: &ClaudeResponse) -> Result<ProviderAnswer, ProviderError> {
    let mut answer_text = String::new();
    let mut has_text = false;
    let mut cited_text: HashMap<String, String> = HashMap::new();
    let mut results: Vec<&WebSearchResult> = Vec::new();

    for block in &response.content {
        match block {
            ContentBlock::Text { text, citations } => {
                has_text = true;
                answer_text.push_str(text);
                for citation in citations.iter().flatten() {
                    if let (Some(url), Some(quote)) = (&citation.url, &citation.cited_text) {
                        cited_text
                            .entry(clean_url(url))
                            .or_insert_with(|| quote.clone());
                    }
                }
            }
            ContentBlock::WebSearchToolResult {
                content: ToolResultContent::Results(items),
            } => results.extend(items),
            _ => {}
        }
    }

    if !has_text {
        return Err(ProviderError::Parse("claude response has no text block".into()));
    }

    let mut drafts: Vec<CitationDraft> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for result in results {
        let domain = extract_domain(&result.url);
        let clean = clean_url(&result.url);
        if domain.is_empty() || clean.is_empty() || seen.contains_key(&clean) {
            continue;
        }
        seen.insert(clean.clone(), drafts.len());

        drafts.push(CitationDraft {
            url: result.url.clone(),
            snippet: non_empty(cited_text.get(&clean).cloned()),
            clean_url: clean,
            domain,
            title: non_empty(result.title.clone()),
            published_date: non_empty(result.page_age.clone()),
            // Listed results count as used even when the URL is not quoted.
            mention_count: count_case_insensitive(&answer_text, &result.url),
            confidence_scores: Vec::new(),
            text_spans: Vec::new(),
        });
    }

    Ok(ProviderAnswer {
        model_name: response.model.clone(),
        answer_text,
        citations: finish_citations(ProviderId::Claude, drafts),
    })
}
