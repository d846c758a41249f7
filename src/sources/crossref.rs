//! Crossref API adapter.
//!
//! Queries the Crossref works endpoint with a bibliographic query and
//! normalizes items into [`Paper`] records. DOIs are always present here,
//! which makes Crossref the anchor source for cross-source deduplication.

use crate::config::AppConfig;
use crate::error::Result;
use crate::keywords::extract_keywords;
use crate::paper::{Paper, PaperSource, SearchFilters, UNKNOWN_DATE};
use crate::sources::{build_http_client, send_with_retry, truncate_abstract, Source};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Crossref API base URL
const CROSSREF_API_URL: &str = "https://api.crossref.org/works";

/// Fields requested from the works endpoint.
const SELECT_FIELDS: &str =
    "title,author,abstract,published,container-title,DOI,URL,is-referenced-by-count,subject,type";

pub struct CrossrefSource {
    client: reqwest::Client,
    mailto: String,
}

impl CrossrefSource {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            mailto: config.research_email.clone(),
        })
    }
}

#[async_trait]
impl Source for CrossrefSource {
    fn name(&self) -> &'static str {
        PaperSource::Crossref.as_str()
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

        let rows = (max_results * 2).min(100).to_string();
        let mut params = vec![
            ("query.bibliographic".to_string(), query.to_string()),
            ("rows".to_string(), rows),
            ("sort".to_string(), "relevance".to_string()),
            ("select".to_string(), SELECT_FIELDS.to_string()),
            ("mailto".to_string(), self.mailto.clone()),
        ];

        let mut date_filters = Vec::new();
        if let Some(start) = filters.year_start {
            date_filters.push(format!("from-pub-date:{start}"));
        }
        if let Some(end) = filters.year_end {
            date_filters.push(format!("until-pub-date:{end}"));
        }
        if !date_filters.is_empty() {
            params.push(("filter".to_string(), date_filters.join(",")));
        }

        debug!(query = query, "Searching Crossref");

        let request = self.client.get(CROSSREF_API_URL).query(&params);
        let response = send_with_retry(request).await?;
        let data: CrossrefResponse = response.json().await?;

        // Records are decoded one by one so a single malformed item cannot
        // poison the batch.
        let mut papers = Vec::new();
        for value in data.message.items {
            let item: CrossrefItem = match serde_json::from_value(value) {
                Ok(item) => item,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed Crossref record");
                    continue;
                }
            };
            if let Some(paper) = parse_work(item, filters) {
                papers.push(paper);
                if papers.len() >= max_results {
                    break;
                }
            }
        }

        info!(count = papers.len(), "Crossref search complete");
        Ok(papers)
    }
}

// === Crossref API response types ===

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefMessage,
}

#[derive(Debug, Deserialize)]
struct CrossrefMessage {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CrossrefItem {
    #[serde(rename = "DOI", default)]
    doi: String,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<CrossrefAuthor>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(default)]
    published: Option<CrossrefPublished>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(rename = "is-referenced-by-count", default)]
    citation_count: u32,
    #[serde(rename = "URL", default)]
    url: String,
    #[serde(default)]
    subject: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefAuthor {
    #[serde(default)]
    given: String,
    #[serde(default)]
    family: String,
}

#[derive(Debug, Deserialize)]
struct CrossrefPublished {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<i32>>,
}

/// Normalize one Crossref item; `None` when it fails a filter or has no title.
fn parse_work(item: CrossrefItem, filters: &SearchFilters) -> Option<Paper> {
    let title = item.title.into_iter().next().filter(|t| !t.trim().is_empty())?;

    let abstract_text = item
        .abstract_text
        .map(|raw| truncate_abstract(&strip_xml_tags(&raw)))
        .unwrap_or_default();

    let authors: Vec<String> = item
        .author
        .iter()
        .map(|a| format!("{} {}", a.given, a.family).trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    let year = item
        .published
        .and_then(|p| p.date_parts.into_iter().next())
        .and_then(|parts| parts.into_iter().next());

    let venue = item.container_title.into_iter().next().unwrap_or_default();

    let mut paper = Paper::new(title, PaperSource::Crossref);
    paper.abstract_text = abstract_text;
    paper.authors = authors;
    paper.publication_date = year
        .map(|y| y.to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string());
    paper.citation_count = item.citation_count;
    paper.journal = venue;
    paper.doi = item.doi;
    paper.url = item.url;
    paper.keywords = extract_keywords(&format!("{} {}", paper.title, paper.abstract_text));
    paper.categories = if item.subject.is_empty() {
        vec!["Academic".to_string()]
    } else {
        item.subject
    };
    paper.paper_type =
        crate::classifier::classify_paper(&paper.title, &paper.journal, &paper.abstract_text);

    if !filters.passes_year_and_citations(&paper)
        || !filters.passes_keywords(&paper.title, &paper.abstract_text)
    {
        return None;
    }

    Some(paper)
}

/// Strip JATS/HTML markup from Crossref abstracts.
fn strip_xml_tags(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag regex"));
    re.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_xml_tags() {
        assert_eq!(
            strip_xml_tags("<jats:p>Hello <jats:italic>world</jats:italic></jats:p>"),
            "Hello world"
        );
        assert_eq!(strip_xml_tags("No tags"), "No tags");
    }

    #[test]
    fn test_parse_work_basic() {
        let item = CrossrefItem {
            doi: "10.1234/test".to_string(),
            title: vec!["Transformer Survey".to_string()],
            author: vec![CrossrefAuthor {
                given: "John".to_string(),
                family: "Doe".to_string(),
            }],
            container_title: vec!["Nature".to_string()],
            published: Some(CrossrefPublished {
                date_parts: vec![vec![2023, 6, 15]],
            }),
            abstract_text: Some("<jats:p>About transformers</jats:p>".to_string()),
            citation_count: 42,
            url: "https://doi.org/10.1234/test".to_string(),
            subject: vec![],
        };

        let paper = parse_work(item, &SearchFilters::default()).expect("kept");
        assert_eq!(paper.title, "Transformer Survey");
        assert_eq!(paper.authors, vec!["John Doe".to_string()]);
        assert_eq!(paper.publication_date, "2023");
        assert_eq!(paper.citation_count, 42);
        assert_eq!(paper.abstract_text, "About transformers");
        assert_eq!(paper.categories, vec!["Academic".to_string()]);
        assert_eq!(paper.source, PaperSource::Crossref);
    }

    #[test]
    fn test_parse_work_missing_title_skipped() {
        let item = CrossrefItem {
            doi: "10.1/x".to_string(),
            title: vec![],
            author: vec![],
            container_title: vec![],
            published: None,
            abstract_text: None,
            citation_count: 0,
            url: String::new(),
            subject: vec![],
        };
        assert!(parse_work(item, &SearchFilters::default()).is_none());
    }

    #[test]
    fn test_parse_work_applies_citation_filter() {
        let item = CrossrefItem {
            doi: "10.1/y".to_string(),
            title: vec!["Low impact paper".to_string()],
            author: vec![],
            container_title: vec![],
            published: Some(CrossrefPublished {
                date_parts: vec![vec![2022]],
            }),
            abstract_text: None,
            citation_count: 2,
            url: String::new(),
            subject: vec![],
        };
        let filters = SearchFilters {
            min_citations: 10,
            ..Default::default()
        };
        assert!(parse_work(item, &filters).is_none());
    }
}
