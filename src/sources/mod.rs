//! Source adapter layer.
//!
//! Each scholarly API gets one adapter that translates a uniform query into
//! a source-specific call and normalizes the response into [`Paper`]
//! records. The orchestrator only ever sees the [`Source`] trait.

use crate::config::AppConfig;
use crate::error::{DiscoveryError, Result};
use crate::paper::{Paper, SearchFilters};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

pub mod arxiv;
pub mod crossref;
pub mod openalex;
pub mod scholar;

use arxiv::ArxivSource;
use crossref::CrossrefSource;
use openalex::OpenAlexSource;
use scholar::ScholarSource;

/// Maximum request attempts for transient failures.
const MAX_ATTEMPTS: u32 = 3;

/// Initial retry backoff; doubles up to [`MAX_BACKOFF`].
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Pause before the single retry after a 429.
const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(10);

/// Per-request HTTP timeout for source APIs.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Abstracts are capped at this many characters by every adapter.
const ABSTRACT_LIMIT: usize = 1000;

/// A federated scholarly search source.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable source tag, matching [`crate::paper::PaperSource::as_str`].
    fn name(&self) -> &'static str;

    /// Query the source and normalize results.
    ///
    /// Adapters apply the cheap filters (year range, citation bounds,
    /// keyword requirements/exclusions) before returning, cap their output
    /// near `max_results`, and return whatever they have on per-record
    /// parse errors. An empty query yields an empty result without any
    /// network call.
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        max_results: usize,
    ) -> Result<Vec<Paper>>;
}

/// Build the enabled adapter set.
///
/// `selected` restricts to the named sources; unknown names are skipped
/// with a warning so a stale UI toggle cannot break the whole search.
pub fn build_sources(config: &AppConfig, selected: Option<&[String]>) -> Result<Vec<Box<dyn Source>>> {
    let wanted = |name: &str| -> bool {
        selected
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(true)
    };

    let mut sources: Vec<Box<dyn Source>> = Vec::new();
    if wanted("google_scholar_serpapi") {
        sources.push(Box::new(ScholarSource::new(config)?));
    }
    if wanted("crossref") {
        sources.push(Box::new(CrossrefSource::new(config)?));
    }
    if wanted("openalex") {
        sources.push(Box::new(OpenAlexSource::new(config)?));
    }
    if wanted("arxiv") {
        sources.push(Box::new(ArxivSource::new(config)?));
    }

    if let Some(names) = selected {
        let known = ["google_scholar_serpapi", "crossref", "openalex", "arxiv"];
        for name in names {
            if !known.contains(&name.as_str()) {
                warn!(source = %name, "Unknown source name, skipping");
            }
        }
    }

    Ok(sources)
}

/// Build a reqwest client with the standard timeout and polite User-Agent.
pub(crate) fn build_http_client(config: &AppConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(config.user_agent())
        .build()
        .map_err(|e| DiscoveryError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Send a request with retry on transient failures.
///
/// Network errors and 5xx responses retry up to [`MAX_ATTEMPTS`] times with
/// exponential backoff (2s doubling to 8s, plus jitter). A 429 sleeps at
/// least [`RATE_LIMIT_PAUSE`] and retries exactly once.
pub(crate) async fn send_with_retry(request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let mut backoff = INITIAL_BACKOFF;
    let mut rate_limit_retried = false;
    let mut attempt = 0;

    loop {
        let req = request
            .try_clone()
            .ok_or_else(|| DiscoveryError::Config("Request body is not cloneable".to_string()))?;

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    if rate_limit_retried {
                        return Err(DiscoveryError::RateLimited(RATE_LIMIT_PAUSE.as_secs()));
                    }
                    rate_limit_retried = true;
                    warn!(pause_secs = RATE_LIMIT_PAUSE.as_secs(), "Rate limited, backing off");
                    tokio::time::sleep(RATE_LIMIT_PAUSE + jitter()).await;
                    continue;
                }
                if status.is_server_error() && attempt + 1 < MAX_ATTEMPTS {
                    attempt += 1;
                    tokio::time::sleep(backoff + jitter()).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
                return Err(DiscoveryError::Api {
                    code: status.as_u16() as i32,
                    message: format!("HTTP error: {}", status),
                });
            }
            Err(e) if is_transient(&e) && attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                warn!(attempt = attempt, error = %e, "Transient request failure, retrying");
                tokio::time::sleep(backoff + jitter()).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Small random delay so concurrent retries do not re-align.
fn jitter() -> Duration {
    Duration::from_millis(rand::random::<u64>() % 250)
}

/// Cap an abstract at [`ABSTRACT_LIMIT`] characters with an ellipsis.
pub(crate) fn truncate_abstract(text: &str) -> String {
    if text.chars().count() > ABSTRACT_LIMIT {
        let mut head: String = text.chars().take(ABSTRACT_LIMIT).collect();
        head.push_str("...");
        head
    } else {
        text.to_string()
    }
}
