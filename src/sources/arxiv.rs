//! arXiv API adapter.
//!
//! The export API answers with an Atom feed. Namespace prefixes are
//! stripped up front so the quick-xml serde derive stays simple. arXiv
//! reports no citation data, so every record carries a zero count and the
//! citation filter effectively disables this source when `min_citations`
//! is positive.

use crate::config::AppConfig;
use crate::error::{DiscoveryError, Result};
use crate::keywords::extract_keywords;
use crate::paper::{Paper, PaperSource, SearchFilters, UNKNOWN_DATE};
use crate::sources::{build_http_client, send_with_retry, truncate_abstract, Source};
use async_trait::async_trait;
use quick_xml::de::from_str as xml_from_str;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, info};

/// arXiv export API endpoint
const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

pub struct ArxivSource {
    client: reqwest::Client,
}

impl ArxivSource {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }
}

#[async_trait]
impl Source for ArxivSource {
    fn name(&self) -> &'static str {
        PaperSource::Arxiv.as_str()
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

        let mut search_query = format!("all:{}", query);
        if filters.year_start.is_some() {
            let start = filters.year_start.unwrap_or(1900);
            let end = filters.year_end.unwrap_or(2030);
            search_query.push_str(&format!(" AND submittedDate:[{start}0101 TO {end}1231]"));
        }

        let url = format!(
            "{}?search_query={}&start=0&max_results={}&sortBy=relevance&sortOrder=descending",
            ARXIV_API_URL,
            urlencoding::encode(&search_query),
            (max_results * 2).min(50)
        );

        debug!(url = %url, "Searching arXiv");

        let response = send_with_retry(self.client.get(&url)).await?;
        let xml = response.text().await?;

        let papers = parse_feed(&xml, filters, max_results)?;
        info!(count = papers.len(), "arXiv search complete");
        Ok(papers)
    }
}

// === Atom feed types (after namespace stripping) ===

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    published: Option<String>,
    #[serde(default)]
    author: Vec<EntryAuthor>,
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntryAuthor {
    name: Option<String>,
}

/// Strip XML namespace declarations and prefixes so serde field names match.
fn strip_namespaces(xml: &str) -> String {
    static XMLNS_RE: OnceLock<Regex> = OnceLock::new();
    static PREFIX_RE: OnceLock<Regex> = OnceLock::new();
    let xmlns_re = XMLNS_RE
        .get_or_init(|| Regex::new(r#"\s+xmlns(:[a-zA-Z0-9_-]+)?="[^"]*""#).expect("xmlns regex"));
    let prefix_re = PREFIX_RE
        .get_or_init(|| Regex::new(r"<(/?)([a-zA-Z0-9_-]+):([a-zA-Z0-9_-]+)").expect("prefix regex"));

    let without_decls = xmlns_re.replace_all(xml, "");
    prefix_re.replace_all(&without_decls, "<$1$3").to_string()
}

fn parse_feed(xml: &str, filters: &SearchFilters, max_results: usize) -> Result<Vec<Paper>> {
    let cleaned = strip_namespaces(xml);
    let feed: Feed = xml_from_str(&cleaned)
        .map_err(|e| DiscoveryError::Parse(format!("Failed to parse arXiv feed: {}", e)))?;

    let mut papers = Vec::new();
    for entry in feed.entry {
        if let Some(paper) = parse_entry(entry, filters) {
            papers.push(paper);
            if papers.len() >= max_results {
                break;
            }
        }
    }
    Ok(papers)
}

/// Normalize one feed entry; `None` when it fails a filter or has no title.
fn parse_entry(entry: Entry, filters: &SearchFilters) -> Option<Paper> {
    let title = entry
        .title
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())?;

    let abstract_text = truncate_abstract(
        &entry
            .summary
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default(),
    );

    let year = entry
        .published
        .as_deref()
        .and_then(|p| p.get(0..4))
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
        .map(|y| y.to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string());

    let authors: Vec<String> = entry.author.into_iter().filter_map(|a| a.name).collect();

    let mut paper = Paper::new(title, PaperSource::Arxiv);
    paper.abstract_text = abstract_text;
    paper.authors = authors;
    paper.publication_date = year;
    paper.journal = "arXiv".to_string();
    paper.citation_count = 0;
    paper.url = entry.id.unwrap_or_default();
    paper.doi = entry.doi.unwrap_or_default();
    paper.keywords = extract_keywords(&format!("{} {}", paper.title, paper.abstract_text));
    paper.categories = vec!["Computer Science".to_string()];
    paper.paper_type =
        crate::classifier::classify_paper(&paper.title, &paper.journal, &paper.abstract_text);

    if !filters.passes_year_and_citations(&paper)
        || !filters.passes_keywords(&paper.title, &paper.abstract_text)
    {
        return None;
    }

    Some(paper)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <title>Attention Is All You
      Need</title>
    <summary>The dominant sequence transduction models are based on complex
      recurrent networks.</summary>
    <published>2017-06-12T17:57:34Z</published>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <arxiv:doi>10.48550/arXiv.1706.03762</arxiv:doi>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2005.14165v4</id>
    <title>Language Models are Few-Shot Learners</title>
    <summary>We show that scaling up language models improves task-agnostic
      performance.</summary>
    <published>2020-05-28T17:29:03Z</published>
    <author><name>Tom Brown</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_entries() {
        let papers =
            parse_feed(SAMPLE_FEED, &SearchFilters::default(), 10).expect("feed parses");
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.title, "Attention Is All You Need");
        assert_eq!(first.publication_date, "2017");
        assert_eq!(first.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(first.doi, "10.48550/arXiv.1706.03762");
        assert_eq!(first.url, "http://arxiv.org/abs/1706.03762v7");
        assert_eq!(first.journal, "arXiv");
        assert_eq!(first.citation_count, 0);
        assert_eq!(first.source, PaperSource::Arxiv);
    }

    #[test]
    fn test_parse_feed_respects_max_results() {
        let papers = parse_feed(SAMPLE_FEED, &SearchFilters::default(), 1).expect("feed parses");
        assert_eq!(papers.len(), 1);
    }

    #[test]
    fn test_parse_feed_year_filter() {
        let filters = SearchFilters {
            year_start: Some(2019),
            ..Default::default()
        };
        let papers = parse_feed(SAMPLE_FEED, &filters, 10).expect("feed parses");
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].publication_date, "2020");
    }

    #[test]
    fn test_min_citations_disables_arxiv() {
        let filters = SearchFilters {
            min_citations: 1,
            ..Default::default()
        };
        let papers = parse_feed(SAMPLE_FEED, &filters, 10).expect("feed parses");
        assert!(papers.is_empty());
    }

    #[test]
    fn test_strip_namespaces() {
        let stripped = strip_namespaces(r#"<feed xmlns="http://a"><arxiv:doi>x</arxiv:doi></feed>"#);
        assert_eq!(stripped, "<feed><doi>x</doi></feed>");
    }
}
