//! Canonical paper record and search filters.
//!
//! Every adapter normalizes its API response into [`Paper`]; every consumer
//! downstream (dedup, validation, ranking, storage) reads these fields
//! directly. Empty/unknown fields use sentinels (`""`, `"Unknown"`, empty
//! vec), never options that consumers have to unwrap.

use crate::error::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for an unknown publication year.
pub const UNKNOWN_DATE: &str = "Unknown";

/// Where a paper record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperSource {
    GoogleScholarSerpapi,
    Crossref,
    Openalex,
    Arxiv,
    UserUpload,
}

impl PaperSource {
    /// Wire/database tag for this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperSource::GoogleScholarSerpapi => "google_scholar_serpapi",
            PaperSource::Crossref => "crossref",
            PaperSource::Openalex => "openalex",
            PaperSource::Arxiv => "arxiv",
            PaperSource::UserUpload => "user_upload",
        }
    }

    /// Parse a source tag; unknown tags are rejected.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "google_scholar_serpapi" => Ok(PaperSource::GoogleScholarSerpapi),
            "crossref" => Ok(PaperSource::Crossref),
            "openalex" => Ok(PaperSource::Openalex),
            "arxiv" => Ok(PaperSource::Arxiv),
            "user_upload" => Ok(PaperSource::UserUpload),
            other => Err(DiscoveryError::Validation(format!(
                "unknown paper source: {other}"
            ))),
        }
    }
}

impl fmt::Display for PaperSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-way publication type plus the unclassified default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperType {
    Review,
    Conference,
    Journal,
    Unknown,
}

impl PaperType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperType::Review => "review",
            PaperType::Conference => "conference",
            PaperType::Journal => "journal",
            PaperType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "review" => Ok(PaperType::Review),
            "conference" => Ok(PaperType::Conference),
            "journal" => Ok(PaperType::Journal),
            "unknown" => Ok(PaperType::Unknown),
            other => Err(DiscoveryError::Validation(format!(
                "unknown paper type: {other}"
            ))),
        }
    }
}

impl fmt::Display for PaperType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical normalized paper record used everywhere inside the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    /// Stable 8-char id, unique within a pipeline session.
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    /// Publication year as 4-digit string, or `"Unknown"`.
    pub publication_date: String,
    pub journal: String,
    pub citation_count: u32,
    pub url: String,
    /// Bare DOI, no `https://doi.org/` prefix. Empty when unknown.
    pub doi: String,
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
    pub source: PaperSource,
    pub relevance_score: f64,
    pub confidence_score: f64,
    pub similarity_score: f64,
    pub paper_type: PaperType,
    pub reasoning: String,
    pub key_matches: Vec<String>,
    pub concerns: Vec<String>,
}

impl Paper {
    /// Create a paper with a fresh 8-char id and sentinel defaults.
    pub fn new(title: impl Into<String>, source: PaperSource) -> Self {
        Self {
            paper_id: short_id(),
            title: title.into(),
            authors: Vec::new(),
            abstract_text: String::new(),
            publication_date: UNKNOWN_DATE.to_string(),
            journal: String::new(),
            citation_count: 0,
            url: String::new(),
            doi: String::new(),
            keywords: Vec::new(),
            categories: Vec::new(),
            source,
            relevance_score: 0.0,
            confidence_score: 0.0,
            similarity_score: 0.0,
            paper_type: PaperType::Unknown,
            reasoning: String::new(),
            key_matches: Vec::new(),
            concerns: Vec::new(),
        }
    }

    /// Publication year, if the date field holds a parseable year.
    pub fn year(&self) -> Option<i32> {
        self.publication_date.parse().ok()
    }

    /// Apply a validated relevance assessment, clamping scores to [0, 1].
    pub fn apply_score(&mut self, score: &RelevanceScore) {
        self.relevance_score = score.relevance_score.clamp(0.0, 1.0);
        self.confidence_score = score.confidence_score.clamp(0.0, 1.0);
        self.reasoning = score.reasoning.clone();
        self.key_matches = score.key_matches.clone();
        self.concerns = score.concerns.clone();
    }
}

/// Generate an 8-char id (UUID v4 prefix).
pub fn short_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}

/// Structured relevance assessment from the validator.
///
/// Produced by both the LLM path and the deterministic fallback; all fields
/// are always populated and scores are always in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub relevance_score: f64,
    pub confidence_score: f64,
    pub reasoning: String,
    pub key_matches: Vec<String>,
    pub concerns: Vec<String>,
}

impl RelevanceScore {
    pub fn new(
        relevance_score: f64,
        confidence_score: f64,
        reasoning: String,
        key_matches: Vec<String>,
        concerns: Vec<String>,
    ) -> Self {
        Self {
            relevance_score: relevance_score.clamp(0.0, 1.0),
            confidence_score: confidence_score.clamp(0.0, 1.0),
            reasoning,
            key_matches,
            concerns,
        }
    }

    /// Conservative assessment used when every scoring path failed.
    pub fn emergency_fallback() -> Self {
        Self::new(
            0.6,
            0.3,
            "Emergency fallback with conservative relevance estimate".to_string(),
            Vec::new(),
            vec!["Multiple evaluation errors occurred".to_string()],
        )
    }
}

/// Immutable, validated search filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub year_start: Option<i32>,
    pub year_end: Option<i32>,
    #[serde(default)]
    pub min_citations: u32,
    pub max_citations: Option<u32>,
    #[serde(default = "default_true")]
    pub include_preprints: bool,
    pub keyword_requirements: Option<Vec<String>>,
    pub exclude_keywords: Option<Vec<String>>,
    pub journal_filter: Option<Vec<String>>,
    pub author_filter: Option<Vec<String>>,
    pub paper_type_filter: Option<PaperType>,
}

fn default_true() -> bool {
    true
}

impl SearchFilters {
    /// Validate ranges and normalize degenerate values.
    ///
    /// `max_citations = 0` is treated as "no upper bound" (UIs send 0 for
    /// unlimited). Rejects year bounds outside [1900, 2030], inverted year
    /// ranges, and `paper_type_filter = unknown`.
    pub fn validated(mut self) -> Result<Self> {
        for year in [self.year_start, self.year_end].into_iter().flatten() {
            if !(1900..=2030).contains(&year) {
                return Err(DiscoveryError::Validation(format!(
                    "year {year} outside supported range 1900-2030"
                )));
            }
        }
        if let (Some(start), Some(end)) = (self.year_start, self.year_end) {
            if end < start {
                return Err(DiscoveryError::Validation(format!(
                    "year_end {end} < year_start {start}"
                )));
            }
        }
        if self.max_citations == Some(0) {
            self.max_citations = None;
        }
        if self.paper_type_filter == Some(PaperType::Unknown) {
            return Err(DiscoveryError::Validation(
                "paper_type_filter must be review, conference or journal".to_string(),
            ));
        }
        Ok(self)
    }

    /// Cheap in-adapter check: year range and citation bounds.
    pub fn passes_year_and_citations(&self, paper: &Paper) -> bool {
        if let Some(year) = paper.year() {
            if self.year_start.is_some_and(|start| year < start) {
                return false;
            }
            if self.year_end.is_some_and(|end| year > end) {
                return false;
            }
        }
        if paper.citation_count < self.min_citations {
            return false;
        }
        if self
            .max_citations
            .is_some_and(|max| paper.citation_count > max)
        {
            return false;
        }
        true
    }

    /// Cheap in-adapter check over title+abstract: every required keyword
    /// must appear, no excluded keyword may appear (case-insensitive).
    pub fn passes_keywords(&self, title: &str, abstract_text: &str) -> bool {
        let text = format!("{} {}", title, abstract_text).to_lowercase();
        if let Some(ref required) = self.keyword_requirements {
            if !required.iter().all(|kw| text.contains(&kw.to_lowercase())) {
                return false;
            }
        }
        if let Some(ref excluded) = self.exclude_keywords {
            if excluded.iter().any(|kw| text.contains(&kw.to_lowercase())) {
                return false;
            }
        }
        true
    }

    /// Full filter check applied by the orchestrator after merge.
    pub fn matches(&self, paper: &Paper) -> bool {
        if !self.passes_year_and_citations(paper) {
            return false;
        }
        if !self.passes_keywords(&paper.title, &paper.abstract_text) {
            return false;
        }
        if !self.include_preprints && paper.source == PaperSource::Arxiv {
            return false;
        }
        if let Some(ref journals) = self.journal_filter {
            let venue = paper.journal.to_lowercase();
            if !journals.iter().any(|j| venue.contains(&j.to_lowercase())) {
                return false;
            }
        }
        if let Some(ref authors) = self.author_filter {
            let joined = paper.authors.join(" ").to_lowercase();
            if !authors.iter().any(|a| joined.contains(&a.to_lowercase())) {
                return false;
            }
        }
        if let Some(wanted) = self.paper_type_filter {
            if paper.paper_type != wanted {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper_with(citations: u32, year: &str) -> Paper {
        let mut paper = Paper::new("Test Paper", PaperSource::Crossref);
        paper.citation_count = citations;
        paper.publication_date = year.to_string();
        paper
    }

    #[test]
    fn test_short_id_length() {
        assert_eq!(short_id().len(), 8);
        assert_ne!(short_id(), short_id());
    }

    #[test]
    fn test_inverted_year_range_rejected() {
        let filters = SearchFilters {
            year_start: Some(2024),
            year_end: Some(2020),
            ..Default::default()
        };
        assert!(filters.validated().is_err());
    }

    #[test]
    fn test_year_out_of_range_rejected() {
        let filters = SearchFilters {
            year_start: Some(1850),
            ..Default::default()
        };
        assert!(filters.validated().is_err());
    }

    #[test]
    fn test_max_citations_zero_means_unlimited() {
        let filters = SearchFilters {
            max_citations: Some(0),
            ..Default::default()
        };
        let validated = filters.validated().expect("valid filters");
        assert_eq!(validated.max_citations, None);
        assert!(validated.passes_year_and_citations(&paper_with(5000, "2021")));
    }

    #[test]
    fn test_unknown_paper_type_filter_rejected() {
        let filters = SearchFilters {
            paper_type_filter: Some(PaperType::Unknown),
            ..Default::default()
        };
        assert!(filters.validated().is_err());
    }

    #[test]
    fn test_year_and_citation_bounds() {
        let filters = SearchFilters {
            year_start: Some(2020),
            year_end: Some(2024),
            min_citations: 10,
            max_citations: Some(100),
            ..Default::default()
        };
        assert!(filters.passes_year_and_citations(&paper_with(50, "2022")));
        assert!(!filters.passes_year_and_citations(&paper_with(5, "2022")));
        assert!(!filters.passes_year_and_citations(&paper_with(500, "2022")));
        assert!(!filters.passes_year_and_citations(&paper_with(50, "2019")));
        // Unknown year is not excluded by the year range.
        assert!(filters.passes_year_and_citations(&paper_with(50, UNKNOWN_DATE)));
    }

    #[test]
    fn test_keyword_requirements_all_must_appear() {
        let filters = SearchFilters {
            keyword_requirements: Some(vec!["attention".to_string(), "BERT".to_string()]),
            ..Default::default()
        };
        assert!(filters.passes_keywords("Attention is all you need", "bert variants"));
        assert!(!filters.passes_keywords("Attention is all you need", "no match here"));
    }

    #[test]
    fn test_exclude_keywords() {
        let filters = SearchFilters {
            exclude_keywords: Some(vec!["survey".to_string()]),
            ..Default::default()
        };
        assert!(!filters.passes_keywords("A Survey of Transformers", ""));
        assert!(filters.passes_keywords("Transformers in vision", ""));
    }

    #[test]
    fn test_preprint_exclusion() {
        let filters = SearchFilters {
            include_preprints: false,
            ..Default::default()
        };
        let arxiv = Paper::new("Preprint", PaperSource::Arxiv);
        let journal = Paper::new("Published", PaperSource::Crossref);
        assert!(!filters.matches(&arxiv));
        assert!(filters.matches(&journal));
    }

    #[test]
    fn test_apply_score_clamps() {
        let mut paper = Paper::new("Test", PaperSource::Openalex);
        let score = RelevanceScore {
            relevance_score: 1.7,
            confidence_score: -0.2,
            reasoning: "r".to_string(),
            key_matches: vec![],
            concerns: vec![],
        };
        paper.apply_score(&score);
        assert_eq!(paper.relevance_score, 1.0);
        assert_eq!(paper.confidence_score, 0.0);
    }

    #[test]
    fn test_source_roundtrip() {
        for source in [
            PaperSource::GoogleScholarSerpapi,
            PaperSource::Crossref,
            PaperSource::Openalex,
            PaperSource::Arxiv,
            PaperSource::UserUpload,
        ] {
            assert_eq!(PaperSource::parse(source.as_str()).ok(), Some(source));
        }
        assert!(PaperSource::parse("bing").is_err());
    }
}
