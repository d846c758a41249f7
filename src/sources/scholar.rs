//! Google Scholar adapter backed by SerpAPI.
//!
//! Scholar has no official API; SerpAPI's structured results stand in for
//! scraping. Records rarely carry a DOI, so dedup relies on URL and title
//! signals for this source. When no SerpAPI key is configured the adapter
//! degrades to an empty result instead of an error, preserving partial
//! federation capability.

use crate::config::AppConfig;
use crate::error::Result;
use crate::keywords::{classify_categories, extract_keywords};
use crate::paper::{Paper, PaperSource, SearchFilters, UNKNOWN_DATE};
use crate::sources::{build_http_client, send_with_retry, truncate_abstract, Source};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// SerpAPI search endpoint
const SERPAPI_URL: &str = "https://serpapi.com/search";

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").expect("year regex"))
}

fn cited_by_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Cited by (\d+)").expect("cited-by regex"))
}

pub struct ScholarSource {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl ScholarSource {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            api_key: config.serpapi_key.clone(),
        })
    }
}

#[async_trait]
impl Source for ScholarSource {
    fn name(&self) -> &'static str {
        PaperSource::GoogleScholarSerpapi.as_str()
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

        let Some(ref api_key) = self.api_key else {
            warn!("SERPAPI_KEY not configured, Scholar adapter returning empty");
            return Ok(Vec::new());
        };

        let num = (max_results * 2).min(20).to_string();
        let mut params = vec![
            ("engine".to_string(), "google_scholar".to_string()),
            ("q".to_string(), query.to_string()),
            ("num".to_string(), num),
            ("start".to_string(), "0".to_string()),
            ("hl".to_string(), "en".to_string()),
            ("as_sdt".to_string(), "0,5".to_string()),
            ("api_key".to_string(), api_key.clone()),
        ];

        if filters.year_start.is_some() || filters.year_end.is_some() {
            params.push(("as_ylo".to_string(), filters.year_start.unwrap_or(1900).to_string()));
            params.push(("as_yhi".to_string(), filters.year_end.unwrap_or(2030).to_string()));
        }

        debug!(query = query, "Searching Google Scholar via SerpAPI");

        let request = self.client.get(SERPAPI_URL).query(&params);
        let response = send_with_retry(request).await?;
        let data: SerpApiResponse = response.json().await?;

        if let Some(error) = data.error {
            warn!(error = %error, "SerpAPI reported an error");
            return Ok(Vec::new());
        }

        // Records are decoded one by one so a single malformed result cannot
        // poison the batch.
        let mut papers = Vec::new();
        for value in data.organic_results {
            let result: OrganicResult = match serde_json::from_value(value) {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed Scholar record");
                    continue;
                }
            };
            if let Some(paper) = parse_result(result, filters) {
                papers.push(paper);
                if papers.len() >= max_results {
                    break;
                }
            }
        }

        info!(count = papers.len(), "Google Scholar search complete");
        Ok(papers)
    }
}

// === SerpAPI response types ===

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    error: Option<String>,
    #[serde(default)]
    organic_results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    title: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
    publication_info: Option<PublicationInfo>,
    inline_links: Option<InlineLinks>,
}

#[derive(Debug, Deserialize)]
struct PublicationInfo {
    summary: Option<String>,
    #[serde(default)]
    authors: Vec<ScholarAuthor>,
}

#[derive(Debug, Deserialize)]
struct ScholarAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InlineLinks {
    cited_by: Option<CitedBy>,
}

#[derive(Debug, Deserialize)]
struct CitedBy {
    total: Option<u32>,
    link: Option<String>,
}

/// Normalize one organic result; `None` when it fails a filter or has no title.
fn parse_result(result: OrganicResult, filters: &SearchFilters) -> Option<Paper> {
    let title = result.title.filter(|t| !t.trim().is_empty())?;
    let abstract_text = truncate_abstract(&result.snippet.unwrap_or_default());

    let summary = result
        .publication_info
        .as_ref()
        .and_then(|info| info.summary.clone())
        .unwrap_or_default();

    let authors: Vec<String> = result
        .publication_info
        .map(|info| info.authors.into_iter().filter_map(|a| a.name).collect())
        .unwrap_or_default();

    let year = year_re()
        .find(&summary)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string());

    // Venue sits after the last " - " of the publication summary; with no
    // separator the whole summary stands in for the venue
    let venue = summary.rsplit(" - ").next().unwrap_or_default().to_string();

    let citation_count = parse_citations(result.inline_links.as_ref());

    let mut paper = Paper::new(title, PaperSource::GoogleScholarSerpapi);
    paper.abstract_text = abstract_text;
    paper.authors = authors;
    paper.publication_date = year;
    paper.journal = venue;
    paper.citation_count = citation_count;
    paper.url = result.link.unwrap_or_default();
    paper.keywords = extract_keywords(&format!("{} {}", paper.title, paper.abstract_text));
    paper.categories = classify_categories(&paper.title, &paper.abstract_text, &paper.journal);
    paper.paper_type =
        crate::classifier::classify_paper(&paper.title, &paper.journal, &paper.abstract_text);

    if !filters.passes_year_and_citations(&paper)
        || !filters.passes_keywords(&paper.title, &paper.abstract_text)
    {
        return None;
    }

    Some(paper)
}

/// Citation count from `cited_by.total`, with a regex fallback over the
/// cited-by link text.
fn parse_citations(inline_links: Option<&InlineLinks>) -> u32 {
    let Some(cited_by) = inline_links.and_then(|links| links.cited_by.as_ref()) else {
        return 0;
    };
    if let Some(total) = cited_by.total {
        return total;
    }
    cited_by
        .link
        .as_deref()
        .and_then(|link| cited_by_re().captures(link))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}
