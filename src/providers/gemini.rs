use super::{finish_citations, into_result, non_empty, send_json, CitationDraft, ProviderAdapter, ProviderAnswer};
use crate::canonical::{
    canonical_host, clean_url, extract_domain, find_domain_in_text, host_on_list,
    looks_like_domain,
};
use crate::config::ProviderSettings;
use crate::error::{CitationUnresolvableError, ProviderError};
use crate::models::{ProviderId, ProviderResult, Query, TextSpan};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

/// Query parameters that may carry the real destination of a redirect URL.
const REDIRECT_PARAMS: &[&str] = &["url", "q", "u", "target", "dest"];

/// Search and CDN backends that are never content sources.
const INFRASTRUCTURE_HOSTS: &[&str] = &[
    "vertexaisearch.cloud.google.com",
    "google.com",
    "googleapis.com",
    "gstatic.com",
    "googleusercontent.com",
    "goo.gl",
    "g.co",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContentIn<'a>>,
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct GeminiContentIn<'a> {
    role: &'a str,
    parts: Vec<GeminiPartIn<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPartIn<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidatePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
    #[serde(default)]
    pub grounding_supports: Vec<GroundingSupport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundingChunk {
    #[serde(default)]
    pub web: Option<WebChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebChunk {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingSupport {
    #[serde(default)]
    pub segment: Option<Segment>,
    #[serde(default)]
    pub grounding_chunk_indices: Vec<usize>,
    #[serde(default)]
    pub confidence_scores: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    #[serde(default)]
    pub start_index: usize,
    #[serde(default)]
    pub end_index: usize,
    #[serde(default)]
    pub text: Option<String>,
}

/// Grounding chunks behind provider-controlled redirect URLs, linked to the
/// answer through confidence-scored support records.
pub struct GeminiAdapter {
    client: reqwest::Client,
    settings: ProviderSettings,
}

impl GeminiAdapter {
    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self { client, settings }
    }

    async fn request(&self, query: &Query) -> Result<ProviderAnswer, ProviderError> {
        let body = GeminiRequest {
            contents: vec![GeminiContentIn {
                role: "user",
                parts: vec![GeminiPartIn { text: query.text() }],
            }],
            tools: vec![json!({ "google_search": {} })],
        };

        let request = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.settings.base_url, self.settings.model
            ))
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&body);

        let response: GeminiResponse = send_json(ProviderId::Gemini, request).await?;
        normalize(&response)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn call(&self, query: &Query) -> ProviderResult {
        into_result(self.id(), self.model_name(), self.request(query)).await
    }
}

/// Where a grounding chunk actually points.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub domain: String,
    /// Destination URL when one was embedded in the redirect.
    pub url: Option<String>,
}

/// Resolve the destination domain of a chunk, trying in order: a title that
/// is itself a domain, a destination embedded in a redirect parameter, the
/// URL's own host unless it is infrastructure, a domain inside the title.
pub fn resolve_source(
    index: usize,
    uri: &str,
    title: Option<&str>,
) -> Result<ResolvedSource, CitationUnresolvableError> {
    if let Some(title) = title.filter(|t| looks_like_domain(t)) {
        return accept(index, uri, canonical_host(title), None);
    }

    if let Ok(parsed) = Url::parse(uri) {
        let embedded = parsed.query_pairs().find_map(|(name, value)| {
            let name: &str = &name;
            if !REDIRECT_PARAMS.contains(&name) {
                return None;
            }
            let domain = extract_domain(&value);
            (!domain.is_empty()).then(|| (domain, value.into_owned()))
        });
        if let Some((domain, destination)) = embedded {
            return accept(index, uri, domain, Some(destination));
        }
    }

    let host = extract_domain(uri);
    if !host.is_empty() && !host_on_list(&host, INFRASTRUCTURE_HOSTS) {
        return accept(index, uri, host, None);
    }

    if let Some(domain) = title.and_then(find_domain_in_text) {
        return accept(index, uri, domain, None);
    }

    Err(unresolvable(index, uri))
}

fn accept(
    index: usize,
    uri: &str,
    domain: String,
    url: Option<String>,
) -> Result<ResolvedSource, CitationUnresolvableError> {
    if domain.is_empty() || host_on_list(&domain, INFRASTRUCTURE_HOSTS) {
        return Err(unresolvable(index, uri));
    }
    Ok(ResolvedSource { domain, url })
}

fn unresolvable(index: usize, uri: &str) -> CitationUnresolvableError {
    CitationUnresolvableError {
        index,
        uri: uri.to_string(),
    }
}

pub fn normalize(response: &GeminiResponse) -> Result<ProviderAnswer, ProviderError> {
    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| ProviderError::Parse("gemini response has no candidates".into()))?;

    let answer_text: String = candidate
        .content
        .as_ref()
        .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
        .unwrap_or_default();

    let metadata = candidate.grounding_metadata.clone().unwrap_or_default();
    let mut drafts: Vec<CitationDraft> = Vec::new();

    for (index, chunk) in metadata.grounding_chunks.iter().enumerate() {
        let Some(web) = chunk.web.as_ref() else {
            continue;
        };
        let uri = web.uri.clone().unwrap_or_default();
        let title = non_empty(web.title.clone());

        let resolved = match resolve_source(index, &uri, title.as_deref()) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(error = %e, "Dropping grounding chunk");
                continue;
            }
        };

        let mut confidence_scores = Vec::new();
        let mut text_spans = Vec::new();
        let mut supports = 0;

        for support in &metadata.grounding_supports {
            let Some(slot) = support
                .grounding_chunk_indices
                .iter()
                .position(|&i| i == index)
            else {
                continue;
            };
            supports += 1;

            let confidence = support.confidence_scores.get(slot).copied();
            if let Some(score) = confidence {
                confidence_scores.push(score);
            }
            if let Some(segment) = &support.segment {
                // Segment indices are UTF-8 byte offsets into the answer.
                let text = segment.text.clone().unwrap_or_else(|| {
                    answer_text
                        .get(segment.start_index..segment.end_index)
                        .unwrap_or_default()
                        .to_string()
                });
                text_spans.push(TextSpan {
                    start: segment.start_index,
                    end: segment.end_index,
                    text,
                    confidence,
                });
            }
        }

        let url = resolved.url.unwrap_or(uri);
        let clean = match clean_url(&url) {
            cleaned if cleaned.is_empty() => url.clone(),
            cleaned => cleaned,
        };

        drafts.push(CitationDraft {
            url,
            clean_url: clean,
            domain: resolved.domain,
            title,
            snippet: None,
            published_date: None,
            mention_count: supports,
            confidence_scores,
            text_spans,
        });
    }

    Ok(ProviderAnswer {
        model_name: response.model_version.clone(),
        answer_text,
        citations: finish_citations(ProviderId::Gemini, drafts),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDIRECT: &str = "https://vertexaisearch.cloud.google.com/grounding-api-redirect/AbF9wXG1";

    fn parse(value: serde_json::Value) -> GeminiResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn title_domain_wins_over_redirect_host() {
        let resolved = resolve_source(0, REDIRECT, Some("example.com")).unwrap();
        assert_eq!(resolved.domain, "example.com");
        assert_eq!(resolved.url, None);
    }

    #[test]
    fn embedded_destination_is_used() {
        let uri = "https://vertexaisearch.cloud.google.com/redirect?url=https%3A%2F%2Fwww.acme.com%2Fpricing";
        let resolved = resolve_source(0, uri, Some("Acme pricing")).unwrap();
        assert_eq!(resolved.domain, "acme.com");
        assert_eq!(resolved.url.as_deref(), Some("https://www.acme.com/pricing"));
    }

    #[test]
    fn plain_host_is_used_when_not_infrastructure() {
        let resolved = resolve_source(0, "https://docs.rs/tokio", Some("tokio docs")).unwrap();
        assert_eq!(resolved.domain, "docs.rs");
    }

    #[test]
    fn domain_found_inside_title() {
        let resolved = resolve_source(0, REDIRECT, Some("Top CRM picks | techradar.com")).unwrap();
        assert_eq!(resolved.domain, "techradar.com");
    }

    #[test]
    fn unresolvable_chunk_is_an_error() {
        let err = resolve_source(3, REDIRECT, Some("Some article")).unwrap_err();
        assert_eq!(err.index, 3);
        assert!(resolve_source(0, REDIRECT, None).is_err());
        assert!(resolve_source(0, REDIRECT, Some("google.com")).is_err());
    }

    #[test]
    fn supports_drive_mentions_confidence_and_spans() {
        let response = parse(serde_json::json!({
            "modelVersion": "gemini-2.0-flash",
            "candidates": [{
                "content": {"parts": [{"text": "Acme is the leader. Globex is second."}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": REDIRECT, "title": "example.com"}},
                        {"web": {"uri": REDIRECT, "title": "Untitled"}},
                        {"web": {"uri": "https://vertexaisearch.cloud.google.com/grounding-api-redirect/Zz", "title": "globex.io"}}
                    ],
                    "groundingSupports": [
                        {"segment": {"startIndex": 0, "endIndex": 19, "text": "Acme is the leader."},
                         "groundingChunkIndices": [0, 2], "confidenceScores": [0.9, 0.5]},
                        {"segment": {"startIndex": 20, "endIndex": 37, "text": "Globex is second."},
                         "groundingChunkIndices": [0], "confidenceScores": [0.7]}
                    ]
                }
            }]
        }));

        let answer = normalize(&response).unwrap();
        assert_eq!(answer.model_name.as_deref(), Some("gemini-2.0-flash"));
        assert_eq!(answer.citations.len(), 2);

        let first = &answer.citations[0];
        assert_eq!(first.domain, "example.com");
        assert_eq!(first.position, 1);
        assert_eq!(first.mention_count, 2);
        assert_eq!(first.confidence_scores, vec![0.9, 0.7]);
        assert!((first.average_confidence.unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(first.text_spans.len(), 2);
        assert_eq!(first.text_spans[1].confidence, Some(0.7));

        let second = &answer.citations[1];
        assert_eq!(second.domain, "globex.io");
        assert_eq!(second.position, 2);
        assert_eq!(second.mention_count, 1);
        assert_eq!(second.confidence_scores, vec![0.5]);
    }

    #[test]
    fn chunk_without_supports_counts_once() {
        let response = parse(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "Answer."}]},
                "groundingMetadata": {"groundingChunks": [{"web": {"uri": REDIRECT, "title": "site.org"}}]}
            }]
        }));
        let answer = normalize(&response).unwrap();
        assert_eq!(answer.citations[0].mention_count, 1);
        assert_eq!(answer.citations[0].average_confidence, None);
        assert!(answer.citations[0].text_spans.is_empty());
    }

    #[test]
    fn missing_segment_text_is_sliced_by_bytes() {
        let response = parse(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "Café Acme wins. Next."}]},
                "groundingMetadata": {
                    "groundingChunks": [{"web": {"uri": REDIRECT, "title": "acme.com"}}],
                    "groundingSupports": [
                        {"segment": {"startIndex": 6, "endIndex": 16}, "groundingChunkIndices": [0]},
                        {"segment": {"startIndex": 4, "endIndex": 400}, "groundingChunkIndices": [0]}
                    ]
                }
            }]
        }));
        let answer = normalize(&response).unwrap();
        let spans = &answer.citations[0].text_spans;
        assert_eq!(spans[0].text, "Acme wins.");
        // Out of range, or not on a char boundary.
        assert_eq!(spans[1].text, "");
    }

    #[test]
    fn normalization_is_repeatable() {
        let response = parse(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "Acme leads."}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": REDIRECT, "title": "acme.com"}},
                        {"web": {"uri": REDIRECT, "title": "acme.com"}}
                    ],
                    "groundingSupports": [
                        {"segment": {"startIndex": 0, "endIndex": 11, "text": "Acme leads."},
                         "groundingChunkIndices": [0, 1], "confidenceScores": [0.8, 0.6]}
                    ]
                }
            }]
        }));
        let first = normalize(&response).unwrap();
        let second = normalize(&response).unwrap();
        assert_eq!(first.citations.len(), 2);
        assert_eq!(first.citations.len(), second.citations.len());
        for (a, b) in first.citations.iter().zip(&second.citations) {
            assert_ne!(a.id, b.id);
            assert_eq!(a.domain, b.domain);
            assert_eq!(a.mention_count, b.mention_count);
            assert_eq!(a.confidence_scores, b.confidence_scores);
            assert_eq!(a.text_spans, b.text_spans);
        }
    }

    #[test]
    fn no_candidates_is_a_parse_error() {
        let response = parse(serde_json::json!({"candidates": []}));
        assert!(matches!(normalize(&response), Err(ProviderError::Parse(_))));
    }
}
