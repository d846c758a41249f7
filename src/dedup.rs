//! Cross-source deduplication.
//!
//! Identity signals in priority order: DOI equality, URL equality,
//! normalized-title Jaccard similarity. When a duplicate pair is found the
//! winner keeps its own fields; the loser is dropped.

use crate::paper::{Paper, PaperSource};
use std::collections::HashSet;

/// Jaccard similarity threshold for normalized titles.
const TITLE_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Collapse duplicates across sources, preserving first-seen order.
pub fn deduplicate(papers: Vec<Paper>) -> Vec<Paper> {
    let mut unique: Vec<Paper> = Vec::new();

    'incoming: for paper in papers {
        for existing in unique.iter_mut() {
            if is_duplicate(existing, &paper) {
                if challenger_wins(existing, &paper) {
                    *existing = paper;
                }
                continue 'incoming;
            }
        }
        unique.push(paper);
    }

    unique
}

fn is_duplicate(a: &Paper, b: &Paper) -> bool {
    if !a.doi.is_empty() && !b.doi.is_empty() && a.doi.eq_ignore_ascii_case(&b.doi) {
        return true;
    }
    if !a.url.is_empty() && !b.url.is_empty() && a.url.eq_ignore_ascii_case(&b.url) {
        return true;
    }
    titles_are_similar(&a.title, &b.title)
}

/// Winner selection: higher citation count, then non-arXiv venue, then the
/// earlier-seen paper.
fn challenger_wins(existing: &Paper, challenger: &Paper) -> bool {
    if challenger.citation_count != existing.citation_count {
        return challenger.citation_count > existing.citation_count;
    }
    existing.source == PaperSource::Arxiv && challenger.source != PaperSource::Arxiv
}

/// Lowercase, strip non-alphanumeric, collapse whitespace runs.
pub fn normalize_title(title: &str) -> String {
    let stripped: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn titles_are_similar(title_a: &str, title_b: &str) -> bool {
    let norm_a = normalize_title(title_a);
    let norm_b = normalize_title(title_b);
    let tokens_a: HashSet<&str> = norm_a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = norm_b.split_whitespace().collect();
    jaccard(&tokens_a, &tokens_b) >= TITLE_SIMILARITY_THRESHOLD
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(title: &str, doi: &str, citations: u32, source: PaperSource) -> Paper {
        let mut p = Paper::new(title, source);
        p.doi = doi.to_string();
        p.citation_count = citations;
        p
    }

    #[test]
    fn test_doi_duplicate_higher_citations_wins() {
        let papers = vec![
            paper("Attention Is All You Need", "10.1/abc", 10, PaperSource::Crossref),
            paper("Attention is all you need.", "10.1/ABC", 500, PaperSource::Openalex),
        ];
        let unique = deduplicate(papers);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].citation_count, 500);
        assert_eq!(unique[0].source, PaperSource::Openalex);
    }

    #[test]
    fn test_url_duplicate_detected() {
        let mut a = paper("Paper One", "", 3, PaperSource::Crossref);
        a.url = "https://example.org/p1".to_string();
        let mut b = paper("Completely Different Title Entirely", "", 1, PaperSource::Openalex);
        b.url = "HTTPS://EXAMPLE.ORG/P1".to_string();
        let unique = deduplicate(vec![a, b]);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].citation_count, 3);
    }

    #[test]
    fn test_similar_titles_collapse() {
        let papers = vec![
            paper("BERT: Pre-training of Deep Bidirectional Transformers", "", 7, PaperSource::Arxiv),
            paper("BERT Pre-training of Deep Bidirectional Transformers!", "", 7, PaperSource::Crossref),
        ];
        let unique = deduplicate(papers);
        assert_eq!(unique.len(), 1);
        // Citation tie: non-arXiv wins.
        assert_eq!(unique[0].source, PaperSource::Crossref);
    }

    #[test]
    fn test_tie_keeps_earlier_seen() {
        let papers = vec![
            paper("Graph neural networks at scale", "10.2/x", 4, PaperSource::Crossref),
            paper("Graph neural networks at scale", "10.2/x", 4, PaperSource::Openalex),
        ];
        let unique = deduplicate(papers);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].source, PaperSource::Crossref);
    }

    #[test]
    fn test_distinct_papers_survive() {
        let papers = vec![
            paper("Diffusion models for image synthesis", "10.3/a", 1, PaperSource::Crossref),
            paper("Reinforcement learning from human feedback", "10.3/b", 2, PaperSource::Crossref),
        ];
        assert_eq!(deduplicate(papers).len(), 2);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let papers = vec![
            paper("Attention Is All You Need", "10.1/abc", 10, PaperSource::Crossref),
            paper("Attention is all you need", "10.1/abc", 500, PaperSource::Openalex),
            paper("Unrelated work on compilers", "", 0, PaperSource::Arxiv),
        ];
        let once = deduplicate(papers);
        let twice = deduplicate(once.clone());
        assert_eq!(once.len(), twice.len());
        let ids_once: Vec<&str> = once.iter().map(|p| p.paper_id.as_str()).collect();
        let ids_twice: Vec<&str> = twice.iter().map(|p| p.paper_id.as_str()).collect();
        assert_eq!(ids_once, ids_twice);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("  BERT: Pre-training,   of Deep!  "),
            "bert pre training of deep"
        );
    }
}
