use super::{finish_citations, into_result, non_empty, send_json, CitationDraft, ProviderAdapter, ProviderAnswer};
use crate::canonical::{char_slice, clean_url, extract_domain};
use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::models::{ProviderId, ProviderResult, Query, TextSpan};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a str,
    tools: Vec<OpenAiTool>,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Annotation>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    UrlCitation {
        start_index: usize,
        end_index: usize,
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Offset-annotated citations from the Responses API web search tool.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    settings: ProviderSettings,
}

impl OpenAiAdapter {
    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self { client, settings }
    }

    async fn request(&self, query: &Query) -> Result<ProviderAnswer, ProviderError> {
        let body = OpenAiRequest {
            model: &self.settings.model,
            input: query.text(),
            tools: vec![OpenAiTool {
                kind: "web_search_preview",
            }],
        };

        let request = self
            .client
            .post(format!("{}/responses", self.settings.base_url))
            .bearer_auth(&self.settings.api_key)
            .json(&body);

        let response: OpenAiResponse = send_json(ProviderId::OpenAi, request).await?;
        normalize(&response)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn call(&self, query: &Query) -> ProviderResult {
        into_result(self.id(), self.model_name(), self.request(query)).await
    }
}

pub fn normalize(response: &OpenAiResponse) -> Result<ProviderAnswer, ProviderError> {
    let parts: Vec<(&String, &Vec<Annotation>)> = response
        .output
        .iter()
        .filter_map(|item| match item {
            OutputItem::Message { content } => Some(content),
            OutputItem::Other => None,
        })
        .flatten()
        .filter_map(|part| match part {
            ContentPart::OutputText { text, annotations } => Some((text, annotations)),
            ContentPart::Other => None,
        })
        .collect();

    if parts.is_empty() {
        return Err(ProviderError::Parse(
            "openai response has no output_text message".into(),
        ));
    }

    let mut answer_text = String::new();
    let mut drafts: Vec<CitationDraft> = Vec::new();
    let mut by_clean_url: HashMap<String, usize> = HashMap::new();

    for (text, annotations) in parts {
        // Annotation offsets are relative to their own text part.
        let base = answer_text.chars().count();
        answer_text.push_str(text);

        for annotation in annotations {
            let Annotation::UrlCitation {
                start_index,
                end_index,
                url,
                title,
            } = annotation
            else {
                continue;
            };

            let domain = extract_domain(url);
            let clean = clean_url(url);
            if domain.is_empty() || clean.is_empty() {
                continue;
            }

            // Offsets outside the part are clamped to it.
            let part_len = text.chars().count();
            let start = (*start_index).min(part_len);
            let end = (*end_index).clamp(start, part_len);
            let span = TextSpan {
                start: base + start,
                end: base + end,
                text: char_slice(text, start, end),
                confidence: None,
            };

            match by_clean_url.get(&clean) {
                Some(&existing) => {
                    let draft = &mut drafts[existing];
                    draft.mention_count += 1;
                    draft.text_spans.push(span);
                    if draft.title.is_none() {
                        draft.title = non_empty(title.clone());
                    }
                }
                None => {
                    by_clean_url.insert(clean.clone(), drafts.len());
                    drafts.push(CitationDraft {
                        url: url.clone(),
                        clean_url: clean,
                        domain,
                        title: non_empty(title.clone()),
                        snippet: None,
                        published_date: None,
                        mention_count: 1,
                        confidence_scores: Vec::new(),
                        text_spans: vec![span],
                    });
                }
            }
        }
    }

    Ok(ProviderAnswer {
        model_name: response.model.clone(),
        answer_text,
        citations: finish_citations(ProviderId::OpenAi, drafts),
    })
}
