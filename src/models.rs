use crate::error::{ProviderErrorKind, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Perplexity,
    OpenAi,
    Gemini,
    Claude,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Perplexity,
        ProviderId::OpenAi,
        ProviderId::Gemini,
        ProviderId::Claude,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Perplexity => "perplexity",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Claude => "claude",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated analysis request. Construct with [`Query::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    text: String,
    target_domain: Option<String>,
    target_brand: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Result<Self, ValidationError> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        Ok(Self {
            text,
            target_domain: None,
            target_brand: None,
        })
    }

    pub fn with_target_domain(mut self, domain: Option<String>) -> Self {
        self.target_domain = non_blank(domain);
        self
    }

    pub fn with_target_brand(mut self, brand: Option<String>) -> Self {
        self.target_brand = non_blank(brand);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn target_domain(&self) -> Option<&str> {
        self.target_domain.as_deref()
    }

    pub fn target_brand(&self) -> Option<&str> {
        self.target_brand.as_deref()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedCitation {
    pub id: String,
    pub source_provider: ProviderId,
    /// 1-based, first-seen order within one provider's result.
    pub position: usize,
    pub url: String,
    pub clean_url: String,
    pub domain: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub published_date: Option<String>,
    pub mention_count: usize,
    pub average_confidence: Option<f64>,
    pub confidence_scores: Vec<f64>,
    pub text_spans: Vec<TextSpan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub success: bool,
    pub provider_id: ProviderId,
    pub model_name: String,
    pub answer_text: String,
    pub citations: Vec<UnifiedCitation>,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ProviderErrorKind>,
}

impl ProviderResult {
    pub fn failed(
        provider_id: ProviderId,
        model_name: impl Into<String>,
        kind: ProviderErrorKind,
        error: impl Into<String>,
        response_time_ms: u64,
    ) -> Self {
        Self {
            success: false,
            provider_id,
            model_name: model_name.into(),
            answer_text: String::new(),
            citations: Vec::new(),
            response_time_ms,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }

    pub fn timed_out(provider_id: ProviderId, model_name: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::failed(
            provider_id,
            model_name,
            ProviderErrorKind::Timeout,
            "timeout",
            elapsed_ms,
        )
    }
}

/// Per-provider outcome of one dispatch. A provider that was not configured
/// has no entry; a configured provider that failed has a `success: false` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult {
    results: BTreeMap<ProviderId, ProviderResult>,
}

impl AnalysisResult {
    pub fn get(&self, provider: ProviderId) -> Option<&ProviderResult> {
        self.results.get(&provider)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProviderId, &ProviderResult)> {
        self.results.iter()
    }

    pub fn successful(&self) -> impl Iterator<Item = &ProviderResult> {
        self.results.values().filter(|r| r.success)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl FromIterator<ProviderResult> for AnalysisResult {
    fn from_iter<I: IntoIterator<Item = ProviderResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().map(|r| (r.provider_id, r)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub total_citations: usize,
    pub unique_domains: usize,
    pub my_domain_cited: bool,
    pub my_domain_citation_count: usize,
    pub brand_mentioned: bool,
    pub brand_mention_count: usize,
    pub avg_response_time_ms: u64,
    pub success_rate: f64,
    #[serde(rename = "successfulLLMs")]
    pub successful_llms: Vec<ProviderId>,
    #[serde(rename = "failedLLMs")]
    pub failed_llms: Vec<ProviderId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorScore {
    pub domain: String,
    pub citation_count: usize,
    pub llm_diversity: usize,
    pub average_position: f64,
    pub composite_score: f64,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainAggregate {
    pub domain: String,
    pub citation_count: usize,
    pub mention_count: usize,
    pub providers: Vec<ProviderId>,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub query: String,
    pub target_domain: Option<String>,
    pub target_brand: Option<String>,
    pub max_competitors: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub id: String,
    pub query: Query,
    pub analyzed_at: chrono::DateTime<chrono::Utc>,
    pub results: AnalysisResult,
    pub summary: AnalysisSummary,
    pub competitors: Vec<CompetitorScore>,
    pub domains: Vec<DomainAggregate>,
    pub total_time_ms: u64,
}
