use crate::canonical::{host_on_list, same_site};
use crate::models::{AnalysisResult, CompetitorScore, ProviderId};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Generic or infrastructure domains that never count as competitors.
const EXCLUDED_DOMAINS: &[&str] = &[
    "wikipedia.org",
    "youtube.com",
    "reddit.com",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "tiktok.com",
    "google.com",
    "vertexaisearch.cloud.google.com",
    "googleapis.com",
    "bing.com",
];

const COMMON_TLDS: &[&str] = &[".net", ".org", ".io"];

#[derive(Default)]
struct DomainStats {
    count: usize,
    providers: BTreeSet<ProviderId>,
    positions: Vec<usize>,
}

/// Rank cited domains by a 0-100 composite of citation frequency (40),
/// provider diversity (30), average position (20) and authority (10).
pub fn score_competitors(
    result: &AnalysisResult,
    my_domain: Option<&str>,
    max_results: usize,
) -> Vec<CompetitorScore> {
    let mut stats: HashMap<&str, DomainStats> = HashMap::new();

    for provider in result.successful() {
        for citation in &provider.citations {
            let domain = citation.domain.as_str();
            if domain.is_empty() || host_on_list(domain, EXCLUDED_DOMAINS) {
                continue;
            }
            if my_domain.is_some_and(|mine| same_site(domain, mine)) {
                continue;
            }
            let entry = stats.entry(domain).or_default();
            entry.count += 1;
            entry.providers.insert(provider.provider_id);
            entry.positions.push(citation.position);
        }
    }

    let total_providers = result.len().max(1) as f64;

    let mut scores: Vec<CompetitorScore> = stats
        .into_iter()
        .map(|(domain, s)| {
            let average_position =
                s.positions.iter().sum::<usize>() as f64 / s.positions.len() as f64;

            let citation_score = (s.count as f64 / 10.0 * 40.0).min(40.0);
            let diversity_score = s.providers.len() as f64 / total_providers * 30.0;
            let position_score = (20.0 - average_position * 2.0).max(0.0);
            let composite_score =
                citation_score + diversity_score + position_score + authority_score(domain);

            CompetitorScore {
                domain: domain.to_string(),
                citation_count: s.count,
                llm_diversity: s.providers.len(),
                average_position,
                composite_score,
                confidence_score: (composite_score / 100.0).min(1.0),
            }
        })
        .collect();

    scores.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.citation_count.cmp(&a.citation_count))
            .then_with(|| a.domain.cmp(&b.domain))
    });
    scores.truncate(max_results);
    scores
}

/// 0-10 heuristic from the TLD and the length of the leftmost label.
pub fn authority_score(domain: &str) -> f64 {
    let domain = domain.to_lowercase();
    let mut score: f64 = 5.0;

    if domain.ends_with(".com") {
        score += 3.0;
    } else if domain.ends_with(".co.kr") {
        score += 2.0;
    } else if domain.ends_with(".kr") {
        score += 1.0;
    } else if COMMON_TLDS.iter().any(|tld| domain.ends_with(tld)) {
        score += 1.0;
    }

    let label_len = domain.split('.').next().map(|l| l.chars().count()).unwrap_or(0);
    if label_len <= 10 {
        score += 2.0;
    } else if label_len <= 15 {
        score += 1.0;
    }

    score.min(10.0)
}
