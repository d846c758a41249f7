//! litscout - Iterative Academic Literature Discovery Engine
//!
//! Federates scholarly searches across SerpAPI Google Scholar, Crossref,
//! OpenAlex and arXiv, scores candidates with Gemini under strict rate
//! limits, and supports a selected-papers feedback loop.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! litscout search "transformer neural networks" --year-start 2020 --max-results 10
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! litscout serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use clap::{Parser, Subcommand};
use litscout::config::AppConfig;
use litscout::paper::{PaperType, SearchFilters};
use litscout::pipeline::{Pipeline, SearchReport, SessionStatistics};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Iterative Academic Literature Discovery Engine - Rust Microservice
#[derive(Parser)]
#[command(name = "litscout")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Federated literature search with LLM relevance validation
    Search {
        /// Search query
        query: String,

        /// Maximum validated papers to return
        #[arg(long, default_value = "10")]
        max_results: usize,

        /// Earliest publication year
        #[arg(long)]
        year_start: Option<i32>,

        /// Latest publication year
        #[arg(long)]
        year_end: Option<i32>,

        /// Minimum citation count
        #[arg(long, default_value = "0")]
        min_citations: u32,

        /// Maximum citation count (0 = unlimited)
        #[arg(long)]
        max_citations: Option<u32>,

        /// Exclude preprint sources
        #[arg(long)]
        no_preprints: bool,

        /// Comma-separated source names
        /// (google_scholar_serpapi, crossref, openalex, arxiv)
        #[arg(long)]
        sources: Option<String>,

        /// Save all returned papers into the vector store
        #[arg(long)]
        save: bool,
    },

    /// Similarity search over previously saved papers
    Similar {
        /// Query text
        query: String,

        /// Number of neighbors to return
        #[arg(short, long, default_value = "10")]
        k: usize,

        /// Restrict to a paper type (review, conference, journal)
        #[arg(long)]
        paper_type: Option<String>,
    },

    /// Show session and vector store statistics
    Stats,

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let config = AppConfig::from_env().context("Configuration error")?;

    match cli.command {
        Commands::Search {
            query,
            max_results,
            year_start,
            year_end,
            min_citations,
            max_citations,
            no_preprints,
            sources,
            save,
        } => {
            let filters = SearchFilters {
                year_start,
                year_end,
                min_citations,
                max_citations,
                include_preprints: !no_preprints,
                ..Default::default()
            };
            let selected_sources: Option<Vec<String>> =
                sources.map(|s| s.split(',').map(|n| n.trim().to_string()).collect());
            run_search(&config, &query, filters, max_results, selected_sources, save).await
        }
        Commands::Similar { query, k, paper_type } => {
            run_similar(&config, &query, k, paper_type).await
        }
        Commands::Stats => run_stats(&config),
        Commands::Serve { port, host } => run_server(&config, host, port).await,
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

async fn run_search(
    config: &AppConfig,
    query: &str,
    filters: SearchFilters,
    max_results: usize,
    selected_sources: Option<Vec<String>>,
    save: bool,
) -> Result<()> {
    let mut pipeline = Pipeline::new(config)?;

    println!("Searching for: \"{}\"", query);
    let report = pipeline
        .initial_search(query, filters, max_results, selected_sources.as_deref())
        .await?;

    if report.top_papers.is_empty() {
        println!("No papers found.");
        if !report.source_stats.failed_sources.is_empty() {
            println!("Failed sources: {}", report.source_stats.failed_sources.join(", "));
        }
        return Ok(());
    }

    println!(
        "\nFound {} papers ({}/{} sources succeeded):\n",
        report.papers_found, report.source_stats.successful, report.source_stats.attempted
    );
    for (i, paper) in report.top_papers.iter().enumerate() {
        println!(
            "{:2}. [{:.2}] {} ({}, {} citations, {})",
            i + 1,
            paper.relevance_score,
            paper.title,
            paper.publication_date,
            paper.citation_count,
            paper.source
        );
        if !paper.journal.is_empty() {
            println!("      {}", paper.journal);
        }
    }

    if save {
        let indices: Vec<usize> = (0..report.papers_found).collect();
        let saved = pipeline.save_papers(&indices).await?;
        println!("\nSaved {} papers to the vector store.", saved);
    }

    Ok(())
}

async fn run_similar(
    config: &AppConfig,
    query: &str,
    k: usize,
    paper_type: Option<String>,
) -> Result<()> {
    let paper_type_filter = paper_type
        .map(|p| PaperType::parse(&p))
        .transpose()
        .context("Invalid --paper-type")?;

    let pipeline = Pipeline::new(config)?;
    let results = pipeline.search_saved(query, k, paper_type_filter).await?;

    if results.is_empty() {
        println!("No similar papers in the store.");
        return Ok(());
    }

    for (i, entry) in results.iter().enumerate() {
        println!(
            "{:2}. [{:.3}] {} ({})",
            i + 1,
            entry.paper.similarity_score,
            entry.paper.title,
            entry.paper.paper_type
        );
    }
    Ok(())
}

fn run_stats(config: &AppConfig) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let stats = pipeline.statistics();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

struct AppState {
    pipeline: Mutex<Pipeline>,
}

async fn run_server(config: &AppConfig, host: String, port: u16) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let state = Arc::new(AppState {
        pipeline: Mutex::new(Pipeline::new(config)?),
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/search", post(search_handler))
        .route("/refine", post(refine_handler))
        .route("/save", post(save_handler))
        .route("/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    filters: SearchFilters,
    #[serde(default = "default_max_results")]
    max_results: usize,
    sources: Option<Vec<String>>,
}

fn default_max_results() -> usize {
    10
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchReport>, (StatusCode, String)> {
    info!(query = %req.query, max_results = req.max_results, "Search request");

    let mut pipeline = state.pipeline.lock().await;
    pipeline
        .initial_search(&req.query, req.filters, req.max_results, req.sources.as_deref())
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "Search failed");
            (StatusCode::BAD_REQUEST, e.to_string())
        })
}

#[derive(Debug, Deserialize)]
struct RefineRequest {
    selected_indices: Vec<usize>,
    original_query: String,
}

async fn refine_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefineRequest>,
) -> Result<Json<SearchReport>, (StatusCode, String)> {
    info!(selected = req.selected_indices.len(), "Secondary search request");

    let mut pipeline = state.pipeline.lock().await;
    pipeline
        .secondary_search(&req.selected_indices, &req.original_query)
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "Secondary search failed");
            (StatusCode::BAD_REQUEST, e.to_string())
        })
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    indices: Vec<usize>,
}

#[derive(Debug, serde::Serialize)]
struct SaveResponse {
    saved: usize,
}

async fn save_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveRequest>,
) -> Result<Json<SaveResponse>, (StatusCode, String)> {
    let mut pipeline = state.pipeline.lock().await;
    pipeline
        .save_papers(&req.indices)
        .await
        .map(|saved| Json(SaveResponse { saved }))
        .map_err(|e| {
            error!(error = %e, "Save failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<SessionStatistics> {
    let pipeline = state.pipeline.lock().await;
    Json(pipeline.statistics())
}
