//! Federation orchestrator and quality-assurance loop.
//!
//! Fans a query out to every enabled source in parallel, merges and
//! deduplicates the returns, pre-ranks cheaply to limit LLM spend, then
//! validates candidates in rounds until enough papers clear the relevance
//! threshold or the budget runs out.

use crate::dedup::deduplicate;
use crate::paper::{Paper, SearchFilters};
use crate::sources::Source;
use crate::validator::RelevanceValidator;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

/// Per-source fan-out timeout.
const SOURCE_TIMEOUT: Duration = Duration::from_secs(45);

/// Extra papers requested from each source beyond its fair share.
const OVER_FETCH: usize = 3;

/// Minimum relevance for a paper to count as high quality.
const RELEVANCE_THRESHOLD: f64 = 0.5;

/// Maximum quality-assurance rounds per search.
const MAX_VALIDATION_ROUNDS: usize = 3;

/// Per-source outcome counters for one federation round.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStats {
    pub attempted: usize,
    pub successful: usize,
    pub failed: usize,
    pub failed_sources: Vec<String>,
}

/// Result of one federated search: validated, ranked papers plus stats.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub papers: Vec<Paper>,
    pub stats: SourceStats,
}

pub struct SearchOrchestrator {
    sources: Vec<Box<dyn Source>>,
    validator: RelevanceValidator,
}

impl SearchOrchestrator {
    pub fn new(sources: Vec<Box<dyn Source>>, validator: RelevanceValidator) -> Self {
        Self { sources, validator }
    }

    /// Run the full federation + QA pipeline for one query.
    ///
    /// Returns at most `max_results` validated papers sorted by
    /// (relevance, confidence, citations) descending. A source that errors
    /// or times out is dropped from the round; if every source fails the
    /// outcome is empty.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        max_results: usize,
        selected_sources: Option<&[String]>,
    ) -> SearchOutcome {
        if query.trim().is_empty() || max_results == 0 {
            return SearchOutcome::default();
        }

        let (merged, stats) = self
            .fan_out(query, filters, max_results, selected_sources)
            .await;
        if merged.is_empty() {
            if stats.failed == stats.attempted && stats.attempted > 0 {
                warn!("All sources failed, returning empty result");
            }
            return SearchOutcome { papers: Vec::new(), stats };
        }

        let filtered: Vec<Paper> = merged.into_iter().filter(|p| filters.matches(p)).collect();
        let unique = deduplicate(filtered);
        info!(count = unique.len(), "Papers after merge and dedup");

        let mut candidates = pre_rank(unique, query);
        candidates.truncate(max_results);

        let validated = self.quality_rounds(candidates, query, max_results).await;
        let papers = final_selection(validated, max_results);

        info!(
            count = papers.len(),
            high_quality = papers
                .iter()
                .filter(|p| p.relevance_score >= RELEVANCE_THRESHOLD)
                .count(),
            "Search complete"
        );
        SearchOutcome { papers, stats }
    }

    /// Parallel fan-out with an independent timeout per source.
    async fn fan_out(
        &self,
        query: &str,
        filters: &SearchFilters,
        max_results: usize,
        selected_sources: Option<&[String]>,
    ) -> (Vec<Paper>, SourceStats) {
        let enabled: Vec<&dyn Source> = self
            .sources
            .iter()
            .filter(|s| {
                selected_sources
                    .map(|names| names.iter().any(|n| n == s.name()))
                    .unwrap_or(true)
            })
            .filter(|s| filters.include_preprints || s.name() != "arxiv")
            .map(|s| s.as_ref())
            .collect();

        if enabled.is_empty() {
            return (Vec::new(), SourceStats::default());
        }

        let papers_per_source = (max_results / enabled.len()).max(1) + OVER_FETCH;

        let tasks = enabled.iter().map(|source| async move {
            let outcome =
                tokio::time::timeout(SOURCE_TIMEOUT, source.search(query, filters, papers_per_source))
                    .await;
            (source.name(), outcome)
        });
        let results = futures::future::join_all(tasks).await;

        let mut stats = SourceStats::default();
        let mut merged = Vec::new();
        for (name, outcome) in results {
            stats.attempted += 1;
            match outcome {
                Ok(Ok(papers)) => {
                    info!(source = name, count = papers.len(), "Source returned");
                    stats.successful += 1;
                    merged.extend(papers);
                }
                Ok(Err(e)) => {
                    warn!(source = name, error = %e, "Source failed");
                    stats.failed += 1;
                    stats.failed_sources.push(format!("{name} (error)"));
                }
                Err(_) => {
                    warn!(
                        source = name,
                        timeout_secs = SOURCE_TIMEOUT.as_secs(),
                        "Source timed out"
                    );
                    stats.failed += 1;
                    stats.failed_sources.push(format!("{name} (timeout)"));
                }
            }
        }
        (merged, stats)
    }

    /// Validate candidates in rounds until enough clear the threshold.
    async fn quality_rounds(
        &self,
        candidates: Vec<Paper>,
        query: &str,
        target: usize,
    ) -> Vec<Paper> {
        let mut validated: Vec<Paper> = Vec::new();
        let mut processed: HashSet<String> = HashSet::new();

        for round in 1..=MAX_VALIDATION_ROUNDS {
            let high = count_high(&validated);
            if high >= target || processed.len() >= candidates.len() {
                break;
            }

            let needed = target - high;
            // Over-sample in the first round to absorb low-relevance hits
            let batch_budget = if round == 1 { needed * 2 } else { needed + 5 };

            let batch: Vec<Paper> = candidates
                .iter()
                .filter(|p| !processed.contains(&p.paper_id))
                .take(batch_budget)
                .cloned()
                .collect();
            if batch.is_empty() {
                break;
            }
            for paper in &batch {
                processed.insert(paper.paper_id.clone());
            }

            info!(round = round, count = batch.len(), "Quality assurance round");
            let scores = self.validator.validate_batch(&batch, query).await;

            for (mut paper, score) in batch.into_iter().zip(scores) {
                paper.apply_score(&score);
                validated.push(paper);
            }

            info!(
                round = round,
                high_quality = count_high(&validated),
                threshold = RELEVANCE_THRESHOLD,
                "Round complete"
            );
        }

        validated
    }
}

fn count_high(papers: &[Paper]) -> usize {
    papers
        .iter()
        .filter(|p| p.relevance_score >= RELEVANCE_THRESHOLD)
        .count()
}

/// Cheap pre-ranking priority: citations, title overlap with the query,
/// and a recency bonus. Used to pick the validation candidate set without
/// spending LLM calls.
pub fn priority_score(paper: &Paper, query: &str) -> f64 {
    let citation_weight = (paper.citation_count as f64 / 1000.0).min(1.0) * 0.3;

    let query_words: HashSet<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect();
    let title_words: HashSet<String> = paper
        .title
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect();
    let title_overlap =
        query_words.intersection(&title_words).count() as f64 / query_words.len().max(1) as f64;

    let recency_bonus = match paper.year() {
        Some(year) if year >= 2020 => 0.2,
        _ => 0.0,
    };

    citation_weight + title_overlap * 0.5 + recency_bonus
}

/// Sort papers by priority score descending, stable for ties.
pub fn pre_rank(mut papers: Vec<Paper>, query: &str) -> Vec<Paper> {
    papers.sort_by(|a, b| {
        priority_score(b, query).total_cmp(&priority_score(a, query))
    });
    papers
}

/// Final selection: all high-relevance papers, topped up from the rest by
/// relevance, capped at `target`, sorted by (relevance, confidence,
/// citations) descending with stable order for equal keys.
fn final_selection(validated: Vec<Paper>, target: usize) -> Vec<Paper> {
    let (mut selected, mut rest): (Vec<Paper>, Vec<Paper>) = validated
        .into_iter()
        .partition(|p| p.relevance_score >= RELEVANCE_THRESHOLD);

    if selected.len() < target {
        rest.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        let remaining = target - selected.len();
        selected.extend(rest.into_iter().take(remaining));
    }

    selected.truncate(target);
    selected.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then(b.confidence_score.total_cmp(&a.confidence_score))
            .then(b.citation_count.cmp(&a.citation_count))
    });
    selected
}
