//! Query augmentation for the secondary search round.
//!
//! Selected papers feed an LLM prompt that produces a sharper query; when
//! the model is unavailable or returns something unusable, a frequency
//! based keyword extractor supplies the refinement instead.

use crate::gemini::TextModel;
use crate::paper::Paper;
use crate::prompts::refine::build_refine_prompt;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Papers considered when building the refinement prompt.
const MAX_PROMPT_PAPERS: usize = 5;

/// Abstract prefix length forwarded to the model.
const PROMPT_ABSTRACT_CHARS: usize = 300;

/// Abstract prefix length mined by the fallback extractor.
const FALLBACK_ABSTRACT_CHARS: usize = 200;

/// Refined queries longer than this many tokens are rejected.
const MAX_QUERY_TOKENS: usize = 20;

/// Terms the fallback extractor never promotes into a query.
const FALLBACK_STOP_WORDS: &[&str] = &[
    "abstract", "paper", "study", "research", "using", "method", "approach", "based", "results",
    "data", "model", "analysis",
];

fn term_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-zA-Z]{4,}\b").expect("term regex"))
}

pub struct QueryAugmenter {
    model: Arc<dyn TextModel>,
}

impl QueryAugmenter {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Build a refined query from the user's selected papers.
    ///
    /// Never fails: any model problem falls back to deterministic keyword
    /// extraction, and the worst case returns the original query unchanged.
    pub async fn augment(&self, original_query: &str, selected: &[Paper]) -> String {
        let summaries: Vec<String> = selected
            .iter()
            .take(MAX_PROMPT_PAPERS)
            .enumerate()
            .filter(|(_, paper)| !paper.title.is_empty())
            .map(|(i, paper)| {
                let mut summary = format!("Paper {}: {}", i + 1, paper.title);
                if !paper.abstract_text.is_empty() {
                    let prefix: String =
                        paper.abstract_text.chars().take(PROMPT_ABSTRACT_CHARS).collect();
                    summary.push_str(&format!("\nAbstract: {}", prefix));
                }
                summary
            })
            .collect();

        if summaries.is_empty() {
            warn!("No paper content available for augmentation");
            return original_query.to_string();
        }

        let prompt = build_refine_prompt(original_query, &summaries);
        match self.model.complete(&prompt).await {
            Ok(response) => {
                let refined = response.trim().trim_matches(['"', '\'']).to_string();
                if refined.is_empty() || refined.split_whitespace().count() > MAX_QUERY_TOKENS {
                    warn!("AI-refined query invalid, using keyword fallback");
                    fallback_keyword_query(original_query, selected)
                } else {
                    info!(query = %refined, "AI-refined query");
                    refined
                }
            }
            Err(e) => {
                warn!(error = %e, "Query refinement failed, using keyword fallback");
                fallback_keyword_query(original_query, selected)
            }
        }
    }
}

/// Deterministic fallback: append the top 3 repeated content terms from the
/// selected papers' titles and abstract prefixes to the original query.
pub fn fallback_keyword_query(original_query: &str, selected: &[Paper]) -> String {
    let mut text_parts: Vec<String> = Vec::new();
    for paper in selected {
        if !paper.title.is_empty() {
            text_parts.push(paper.title.clone());
        }
        if !paper.abstract_text.is_empty() {
            text_parts.push(paper.abstract_text.chars().take(FALLBACK_ABSTRACT_CHARS).collect());
        }
    }
    let all_text = text_parts.join(" ").to_lowercase();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for m in term_re().find_iter(&all_text) {
        let word = m.as_str();
        if FALLBACK_STOP_WORDS.contains(&word) {
            continue;
        }
        let entry = counts.entry(word).or_insert(0);
        if *entry == 0 {
            order.push(word);
        }
        *entry += 1;
    }

    let mut ranked = order;
    ranked.sort_by(|a, b| counts[b].cmp(&counts[a]));

    let key_terms: Vec<&str> = ranked
        .into_iter()
        .filter(|term| counts[term] > 1)
        .take(3)
        .collect();

    if key_terms.is_empty() {
        original_query.to_string()
    } else {
        format!("{} {}", original_query, key_terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::PaperSource;
    use crate::validator::tests::StubModel;

    fn selected_papers() -> Vec<Paper> {
        let mut a = Paper::new("Attention mechanism advances", PaperSource::Crossref);
        a.abstract_text = "attention mechanism improves attention mechanism models".to_string();
        let mut b = Paper::new("BERT attention mechanism variants", PaperSource::Openalex);
        b.abstract_text = "bert variants refine attention".to_string();
        vec![a, b]
    }

    #[tokio::test]
    async fn test_augment_accepts_model_query() {
        let augmenter = QueryAugmenter::new(Arc::new(StubModel {
            response: Some("\"sparse attention transformer architectures\"".to_string()),
        }));
        let refined = augmenter
            .augment("transformer neural networks", &selected_papers())
            .await;
        assert_eq!(refined, "sparse attention transformer architectures");
    }

    #[tokio::test]
    async fn test_augment_rejects_overlong_query() {
        let long = "word ".repeat(25);
        let augmenter = QueryAugmenter::new(Arc::new(StubModel {
            response: Some(long),
        }));
        let refined = augmenter
            .augment("transformer neural networks", &selected_papers())
            .await;
        assert!(refined.starts_with("transformer neural networks"));
        assert_ne!(refined, "transformer neural networks");
    }

    #[tokio::test]
    async fn test_augment_falls_back_on_model_failure() {
        let augmenter = QueryAugmenter::new(Arc::new(StubModel { response: None }));
        let refined = augmenter
            .augment("transformer neural networks", &selected_papers())
            .await;
        // Fallback keeps the original query and appends repeated terms.
        assert!(refined.starts_with("transformer neural networks "));
        assert!(refined.contains("attention"));
    }

    #[tokio::test]
    async fn test_augment_without_selected_papers_keeps_query() {
        let augmenter = QueryAugmenter::new(Arc::new(StubModel {
            response: Some("anything".to_string()),
        }));
        let refined = augmenter.augment("graph neural networks", &[]).await;
        assert_eq!(refined, "graph neural networks");
    }

    #[test]
    fn test_fallback_keyword_query_top_terms() {
        let refined = fallback_keyword_query("transformer neural networks", &selected_papers());
        let appended: Vec<&str> = refined
            .strip_prefix("transformer neural networks ")
            .expect("prefix kept")
            .split(' ')
            .collect();
        assert!(appended.len() <= 3);
        assert_eq!(appended[0], "attention");
        assert!(appended.contains(&"mechanism"));
    }

    #[test]
    fn test_fallback_keyword_query_no_repeats_returns_original() {
        let mut paper = Paper::new("Entirely unique wording here", PaperSource::Arxiv);
        paper.abstract_text = "every token appears once only".to_string();
        let refined = fallback_keyword_query("base query", &[paper]);
        assert_eq!(refined, "base query");
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let papers = selected_papers();
        assert_eq!(
            fallback_keyword_query("q", &papers),
            fallback_keyword_query("q", &papers)
        );
    }
}
