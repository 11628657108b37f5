use crate::canonical::{count_case_insensitive, domain_matches};
use crate::models::{AnalysisResult, AnalysisSummary};
use regex::RegexBuilder;
use std::collections::HashSet;

/// Totals and flags derived from one dispatch. Pure; calling it again on the
/// same result yields the same summary.
pub fn summarize(
    result: &AnalysisResult,
    target_domain: Option<&str>,
    target_brand: Option<&str>,
) -> AnalysisSummary {
    let citations = || result.successful().flat_map(|r| r.citations.iter());

    let total_citations = citations().count();
    let unique_domains = citations()
        .map(|c| c.domain.as_str())
        .filter(|d| !d.is_empty())
        .collect::<HashSet<_>>()
        .len();

    let my_domain_citation_count = target_domain
        .map(|target| citations().filter(|c| domain_matches(&c.domain, target)).count())
        .unwrap_or(0);

    let answers = result
        .iter()
        .map(|(_, r)| r.answer_text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let brand_mention_count = target_brand
        .map(|brand| count_brand(&answers, brand))
        .unwrap_or(0);

    let configured = result.len();
    let avg_response_time_ms = if configured == 0 {
        0
    } else {
        let total: u64 = result.iter().map(|(_, r)| r.response_time_ms).sum();
        (total as f64 / configured as f64).round() as u64
    };

    let (successful, failed): (Vec<_>, Vec<_>) = result.iter().partition(|(_, r)| r.success);
    let successful_llms: Vec<_> = successful.into_iter().map(|(id, _)| *id).collect();
    let failed_llms: Vec<_> = failed.into_iter().map(|(id, _)| *id).collect();

    let success_rate = if configured == 0 {
        0.0
    } else {
        successful_llms.len() as f64 / configured as f64 * 100.0
    };

    AnalysisSummary {
        total_citations,
        unique_domains,
        my_domain_cited: my_domain_citation_count > 0,
        my_domain_citation_count,
        brand_mentioned: brand_mention_count > 0,
        brand_mention_count,
        avg_response_time_ms,
        success_rate,
        successful_llms,
        failed_llms,
    }
}

/// Case-insensitive literal occurrences of the brand.
fn count_brand(text: &str, brand: &str) -> usize {
    let brand = brand.trim();
    if brand.is_empty() {
        return 0;
    }
    RegexBuilder::new(&regex::escape(brand))
        .case_insensitive(true)
        .build()
        .map(|re| re.find_iter(text).count())
        .unwrap_or_else(|_| count_case_insensitive(text, brand))
}
