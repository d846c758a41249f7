//! OpenAlex API adapter.
//!
//! OpenAlex ships abstracts as an inverted index for licensing reasons;
//! this adapter reconstructs the plaintext before normalizing. The
//! `mailto` parameter keeps us in the polite pool.

use crate::config::AppConfig;
use crate::error::Result;
use crate::keywords::extract_keywords;
use crate::paper::{Paper, PaperSource, SearchFilters, UNKNOWN_DATE};
use crate::sources::{build_http_client, send_with_retry, Source};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// OpenAlex API base URL
const OPENALEX_API_URL: &str = "https://api.openalex.org/works";

/// Reconstructed abstracts are capped at this many characters.
const ABSTRACT_LIMIT: usize = 1000;

/// Concepts below this score are ignored for category tagging.
const CONCEPT_SCORE_FLOOR: f64 = 0.3;

pub struct OpenAlexSource {
    client: reqwest::Client,
    mailto: String,
}

impl OpenAlexSource {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            mailto: config.research_email.clone(),
        })
    }
}

#[async_trait]
impl Source for OpenAlexSource {
    fn name(&self) -> &'static str {
        PaperSource::Openalex.as_str()
    }

    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        max_results: usize,
    ) -> Result<Vec<Paper>> {
        if query.trim().is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        let per_page = (max_results * 2).min(100).to_string();
        let mut params = vec![
            ("search".to_string(), query.to_string()),
            ("per_page".to_string(), per_page),
            ("sort".to_string(), "cited_by_count:desc".to_string()),
            ("mailto".to_string(), self.mailto.clone()),
        ];

        if filters.year_start.is_some() || filters.year_end.is_some() {
            let start = filters.year_start.unwrap_or(2000);
            let end = filters.year_end.unwrap_or(2030);
            params.push(("filter".to_string(), format!("publication_year:{start}-{end}")));
        }

        debug!(query = query, "Searching OpenAlex");

        let request = self.client.get(OPENALEX_API_URL).query(&params);
        let response = send_with_retry(request).await?;
        let data: OpenAlexResponse = response.json().await?;

        // Records are decoded one by one so a single malformed work cannot
        // poison the batch.
        let mut papers = Vec::new();
        for value in data.results {
            let work: OpenAlexWork = match serde_json::from_value(value) {
                Ok(work) => work,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed OpenAlex record");
                    continue;
                }
            };
            if let Some(paper) = parse_work(work, filters) {
                papers.push(paper);
                if papers.len() >= max_results {
                    break;
                }
            }
        }

        info!(count = papers.len(), "OpenAlex search complete");
        Ok(papers)
    }
}

// === OpenAlex API response types ===

#[derive(Debug, Deserialize)]
struct OpenAlexResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    id: Option<String>,
    title: Option<String>,
    publication_year: Option<i32>,
    doi: Option<String>,
    cited_by_count: Option<u32>,
    #[serde(rename = "abstract_inverted_index")]
    abstract_index: Option<HashMap<String, Vec<usize>>>,
    #[serde(default)]
    authorships: Vec<OpenAlexAuthorship>,
    primary_location: Option<OpenAlexLocation>,
    #[serde(default)]
    concepts: Vec<OpenAlexConcept>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthorship {
    author: Option<OpenAlexAuthor>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexLocation {
    source: Option<OpenAlexVenue>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexVenue {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexConcept {
    display_name: Option<String>,
    #[serde(default)]
    score: f64,
}

/// Normalize one OpenAlex work; `None` when it fails a filter or has no title.
fn parse_work(work: OpenAlexWork, filters: &SearchFilters) -> Option<Paper> {
    let title = work.title.filter(|t| !t.trim().is_empty())?;

    let abstract_text = work
        .abstract_index
        .map(|index| reconstruct_abstract(&index))
        .unwrap_or_default();

    let authors: Vec<String> = work
        .authorships
        .into_iter()
        .filter_map(|a| a.author.and_then(|author| author.display_name))
        .collect();

    let venue = work
        .primary_location
        .and_then(|loc| loc.source)
        .and_then(|s| s.display_name)
        .unwrap_or_default();

    // Clean DOI format without the resolver prefix
    let doi = work
        .doi
        .map(|d| d.replace("https://doi.org/", ""))
        .unwrap_or_default();

    let categories: Vec<String> = {
        let picked: Vec<String> = work
            .concepts
            .into_iter()
            .filter(|c| c.score > CONCEPT_SCORE_FLOOR)
            .filter_map(|c| c.display_name)
            .take(5)
            .collect();
        if picked.is_empty() {
            vec!["Academic".to_string()]
        } else {
            picked
        }
    };

    let mut paper = Paper::new(title, PaperSource::Openalex);
    paper.abstract_text = abstract_text;
    paper.authors = authors;
    paper.publication_date = work
        .publication_year
        .map(|y| y.to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string());
    paper.citation_count = work.cited_by_count.unwrap_or(0);
    paper.journal = venue;
    paper.doi = doi;
    paper.url = work.id.unwrap_or_default();
    paper.keywords = extract_keywords(&format!("{} {}", paper.title, paper.abstract_text));
    paper.categories = categories;
    paper.paper_type =
        crate::classifier::classify_paper(&paper.title, &paper.journal, &paper.abstract_text);

    if !filters.passes_year_and_citations(&paper)
        || !filters.passes_keywords(&paper.title, &paper.abstract_text)
    {
        return None;
    }

    Some(paper)
}

/// Reconstruct abstract text from the OpenAlex inverted index format.
///
/// Words are placed at their listed positions, joined with spaces, and
/// truncated to [`ABSTRACT_LIMIT`] characters. Any inconsistency yields an
/// empty string rather than an error.
fn reconstruct_abstract(inverted_index: &HashMap<String, Vec<usize>>) -> String {
    let Some(max_position) = inverted_index.values().flatten().copied().max() else {
        return String::new();
    };

    let mut words: Vec<&str> = vec![""; max_position + 1];
    for (word, positions) in inverted_index {
        for &pos in positions {
            if pos < words.len() {
                words[pos] = word;
            }
        }
    }

    let abstract_text = words
        .into_iter()
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if abstract_text.chars().count() > ABSTRACT_LIMIT {
        let mut head: String = abstract_text.chars().take(ABSTRACT_LIMIT).collect();
        head.push_str("...");
        head
    } else {
        abstract_text
    }
}
