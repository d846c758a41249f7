//! LLM-based relevance validation for academic papers.
//!
//! Each candidate gets one minimal scoring prompt; the model is asked for a
//! bare number in [0.0, 1.0]. Parsing failures, transport failures and
//! timeouts all land in the deterministic fallback scorer, so `validate`
//! never returns an error.
//!
//! Rate contract: a semaphore of [`MAX_CONCURRENT_VALIDATIONS`] permits plus
//! a fixed [`VALIDATION_DELAY`] sleep before every call keeps the request
//! rate under ~10/minute on the provider free tier.

use crate::gemini::TextModel;
use crate::paper::{Paper, RelevanceScore};
use crate::prompts::relevance::build_scoring_prompt;
use futures::stream::{self, StreamExt};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Maximum concurrent LLM scoring requests
pub const MAX_CONCURRENT_VALIDATIONS: usize = 3;

/// Pre-call pacing delay per worker (free tier: 10 requests/minute)
pub const VALIDATION_DELAY: Duration = Duration::from_secs(7);

/// ML-context vocabulary for the fallback scorer boost.
const ML_CONTEXT_TERMS: &[&str] = &[
    "transformer",
    "transformers",
    "attention",
    "bert",
    "gpt",
    "neural",
    "network",
    "deep",
    "learning",
    "machine",
    "artificial",
    "intelligence",
    "nlp",
    "language",
    "model",
    "training",
    "fine-tuning",
    "pre-training",
    "embedding",
    "encoder",
    "decoder",
    "self-attention",
    "multi-head",
];

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]*\.?[0-9]+)").expect("number regex"))
}

/// Relevance validator with an LLM path and a deterministic fallback.
pub struct RelevanceValidator {
    model: Arc<dyn TextModel>,
    semaphore: Arc<Semaphore>,
}

impl RelevanceValidator {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self {
            model,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_VALIDATIONS)),
        }
    }

    /// Score one paper against the query. Infallible: every failure path
    /// ends in the fallback scorer.
    pub async fn validate(&self, paper: &Paper, query: &str) -> RelevanceScore {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return fallback_score(paper, query),
        };

        // Pacing sleep happens inside the permit so concurrent slots cannot
        // burst past the provider rate limit.
        tokio::time::sleep(VALIDATION_DELAY).await;

        let prompt = build_scoring_prompt(query, &paper.title, &paper.abstract_text);

        match self.model.complete(&prompt).await {
            Ok(content) => match parse_score(&content) {
                Some(score) => {
                    debug!(title = %truncate(&paper.title), score = score, "Parsed model score");
                    score_to_assessment(score, query)
                }
                None => {
                    warn!(
                        title = %truncate(&paper.title),
                        content = %truncate(&content),
                        "Unparseable model output, using fallback scorer"
                    );
                    fallback_score(paper, query)
                }
            },
            Err(e) => {
                warn!(title = %truncate(&paper.title), error = %e, "Model call failed, using fallback scorer");
                fallback_score(paper, query)
            }
        }
    }

    /// Score a batch, preserving input order.
    pub async fn validate_batch(&self, papers: &[Paper], query: &str) -> Vec<RelevanceScore> {
        let futures: Vec<_> = papers.iter().map(|paper| self.validate(paper, query)).collect();
        stream::iter(futures)
            .buffered(MAX_CONCURRENT_VALIDATIONS)
            .collect()
            .await
    }
}

/// Extract a score from model output: direct float parse of the trimmed
/// content, else the first decimal number in it. A value outside [0, 1]
/// on either path counts as a parsing failure, not a score.
pub fn parse_score(content: &str) -> Option<f64> {
    let trimmed = content.trim();
    if let Ok(score) = trimmed.parse::<f64>() {
        if (0.0..=1.0).contains(&score) {
            return Some(score);
        }
    }
    number_re()
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|score| (0.0..=1.0).contains(score))
}

/// Wrap a parsed model score in the structured assessment.
fn score_to_assessment(score: f64, query: &str) -> RelevanceScore {
    let concerns = if score > 0.5 {
        Vec::new()
    } else {
        vec!["Lower confidence due to limited matches".to_string()]
    };
    RelevanceScore::new(
        score,
        if score > 0.3 { 0.8 } else { 0.5 },
        format!("AI analysis: relevance score {:.2}", score),
        vec![query.to_lowercase()],
        concerns,
    )
}

/// Deterministic fallback scorer: a pure function of (paper, query).
///
/// Weighted token overlap between the query and title/abstract/keywords,
/// boosted by ML-context vocabulary hits and citation count, with a rescue
/// floor for weak-but-plausible matches.
pub fn fallback_score(paper: &Paper, query: &str) -> RelevanceScore {
    let query_words = word_set(query);
    let title_words = word_set(&paper.title);
    let abstract_words: BTreeSet<String> = paper
        .abstract_text
        .to_lowercase()
        .split_whitespace()
        .take(100)
        .map(|w| w.to_string())
        .collect();
    let keyword_words = word_set(&paper.keywords.join(" "));

    let title_overlap = overlap(&query_words, &title_words);
    let abstract_overlap = overlap(&query_words, &abstract_words);
    let keyword_overlap = overlap(&query_words, &keyword_words);

    let base_score = title_overlap * 0.5 + abstract_overlap * 0.3 + keyword_overlap * 0.2;

    let content_text = format!(
        "{} {} {}",
        paper.title,
        paper.abstract_text,
        paper.keywords.join(" ")
    )
    .to_lowercase();
    let ml_hits = ML_CONTEXT_TERMS
        .iter()
        .filter(|term| content_text.contains(*term))
        .count();
    let ml_boost = (0.1 * ml_hits as f64).min(0.3);

    let citation_boost = (paper.citation_count as f64 / 1000.0).min(0.1);

    let mut final_score = (base_score + ml_boost + citation_boost).clamp(0.0, 1.0);
    if final_score > 0.1 {
        // Rescue weak but plausible matches
        final_score = final_score.max(0.4);
    }

    let matched_terms: Vec<String> = query_words
        .iter()
        .filter(|w| title_words.contains(*w) || keyword_words.contains(*w))
        .take(5)
        .cloned()
        .collect();
    let confidence = if matched_terms.is_empty() { 0.4 } else { 0.7 };

    let concerns = if final_score > 0.5 {
        Vec::new()
    } else {
        vec!["Lower confidence due to limited direct matches".to_string()]
    };

    RelevanceScore::new(
        final_score,
        confidence,
        format!(
            "Relevance analysis. Base text matching: {:.2}, ML context boost: {:.2}, final score: {:.2}",
            base_score, ml_boost, final_score
        ),
        matched_terms,
        concerns,
    )
}

fn word_set(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect()
}

fn overlap(query: &BTreeSet<String>, other: &BTreeSet<String>) -> f64 {
    let intersection = query.intersection(other).count();
    intersection as f64 / query.len().max(1) as f64
}

fn truncate(text: &str) -> String {
    text.chars().take(50).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{DiscoveryError, Result};
    use crate::paper::{Paper, PaperSource};
    use async_trait::async_trait;

    /// Test model returning a fixed response (or failing) for every prompt.
    pub(crate) struct StubModel {
        pub response: Option<String>,
    }

    #[async_trait]
    impl TextModel for StubModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            match &self.response {
                Some(text) => Ok(text.clone()),
                None => Err(DiscoveryError::Parse("stub failure".to_string())),
            }
        }
    }

    fn sample_paper() -> Paper {
        let mut paper = Paper::new(
            "Transformer neural networks for translation",
            PaperSource::Crossref,
        );
        paper.abstract_text = "We study attention mechanisms in deep learning".to_string();
        paper.keywords = vec!["attention".to_string(), "translation".to_string()];
        paper.citation_count = 500;
        paper
    }

    #[test]
    fn test_parse_score_direct() {
        assert_eq!(parse_score("0.8"), Some(0.8));
        assert_eq!(parse_score("  0.35\n"), Some(0.35));
    }

    #[test]
    fn test_parse_score_regex_extraction() {
        assert_eq!(parse_score("Score: 0.75 based on the match"), Some(0.75));
        assert_eq!(parse_score("I'd rate this 1"), Some(1.0));
    }

    #[test]
    fn test_parse_score_rejects_out_of_range() {
        assert_eq!(parse_score("1.5"), None);
        assert_eq!(parse_score("Score: 7.5"), None);
    }

    #[test]
    fn test_parse_score_rejects_garbage() {
        assert_eq!(parse_score("not a number"), None);
        assert_eq!(parse_score(""), None);
    }

    #[test]
    fn test_fallback_score_in_range_and_pure() {
        let paper = sample_paper();
        let first = fallback_score(&paper, "transformer neural networks");
        let second = fallback_score(&paper, "transformer neural networks");
        assert!(first.relevance_score >= 0.0 && first.relevance_score <= 1.0);
        assert_eq!(first.relevance_score, second.relevance_score);
        assert_eq!(first.key_matches, second.key_matches);
        assert_eq!(first.confidence_score, 0.7);
        assert!(first.key_matches.len() <= 5);
    }

    #[test]
    fn test_fallback_score_rescues_weak_matches() {
        let mut paper = Paper::new("Neural ideas", PaperSource::Arxiv);
        paper.abstract_text = "deep learning".to_string();
        let score = fallback_score(&paper, "quantum chemistry");
        // ML boost alone lifts it past 0.1, so the rescue floor applies.
        assert!(score.relevance_score >= 0.4);
    }

    #[test]
    fn test_fallback_score_concerns_track_threshold() {
        let paper = Paper::new("Medieval pottery shards", PaperSource::Crossref);
        let low = fallback_score(&paper, "quantum computing");
        assert!(low.relevance_score <= 0.5);
        assert!(!low.concerns.is_empty());

        let strong = fallback_score(&sample_paper(), "transformer attention translation");
        if strong.relevance_score > 0.5 {
            assert!(strong.concerns.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_uses_model_score() {
        let validator = RelevanceValidator::new(Arc::new(StubModel {
            response: Some("0.8".to_string()),
        }));
        let score = validator.validate(&sample_paper(), "transformers").await;
        assert_eq!(score.relevance_score, 0.8);
        assert_eq!(score.confidence_score, 0.8);
        assert!(score.concerns.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_falls_back_on_garbage() {
        let validator = RelevanceValidator::new(Arc::new(StubModel {
            response: Some("not a number".to_string()),
        }));
        let paper = sample_paper();
        let score = validator.validate(&paper, "transformer neural networks").await;
        let expected = fallback_score(&paper, "transformer neural networks");
        assert_eq!(score.relevance_score, expected.relevance_score);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_falls_back_on_transport_error() {
        let validator = RelevanceValidator::new(Arc::new(StubModel { response: None }));
        let paper = sample_paper();
        let score = validator.validate(&paper, "transformers").await;
        assert!(score.relevance_score >= 0.0 && score.relevance_score <= 1.0);
        assert!(!score.reasoning.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_batch_preserves_order() {
        let validator = RelevanceValidator::new(Arc::new(StubModel {
            response: Some("0.6".to_string()),
        }));
        let papers = vec![sample_paper(), sample_paper(), sample_paper(), sample_paper()];
        let scores = validator.validate_batch(&papers, "transformers").await;
        assert_eq!(scores.len(), 4);
        assert!(scores.iter().all(|s| s.relevance_score == 0.6));
    }
}
