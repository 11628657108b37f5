use crate::models::{AnalysisResult, DomainAggregate, ProviderId};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
struct Accumulator {
    citation_count: usize,
    mention_count: usize,
    providers: BTreeSet<ProviderId>,
    urls: BTreeSet<String>,
}

/// Cross-provider view of the normalized citations, one row per domain.
/// Reads the per-provider lists without changing them.
pub fn aggregate_domains(result: &AnalysisResult) -> Vec<DomainAggregate> {
    let mut by_domain: BTreeMap<&str, Accumulator> = BTreeMap::new();

    for provider in result.successful() {
        for citation in provider.citations.iter().filter(|c| !c.domain.is_empty()) {
            let acc = by_domain.entry(citation.domain.as_str()).or_default();
            acc.citation_count += 1;
            acc.mention_count += citation.mention_count;
            acc.providers.insert(citation.source_provider);
            acc.urls.insert(citation.clean_url.clone());
        }
    }

    let mut rows: Vec<DomainAggregate> = by_domain
        .into_iter()
        .map(|(domain, acc)| DomainAggregate {
            domain: domain.to_string(),
            citation_count: acc.citation_count,
            mention_count: acc.mention_count,
            providers: acc.providers.into_iter().collect(),
            urls: acc.urls.into_iter().collect(),
        })
        .collect();

    // Stable sort keeps the alphabetical order among equal counts.
    rows.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
    rows
}
