//! # litscout
//!
//! Iterative Academic Literature Discovery Engine - Rust Microservice
//!
//! ## Modules
//!
//! - [`sources`] - Per-source adapters (Scholar via SerpAPI, Crossref, OpenAlex, arXiv)
//! - [`dedup`] - Multi-signal cross-source deduplication
//! - [`validator`] - Rate-limited LLM relevance scoring with deterministic fallback
//! - [`orchestrator`] - Parallel federation + quality-assurance loop
//! - [`augment`] - Selected-paper driven query refinement
//! - [`store`] - Persistent vector index + metadata sidecar
//! - [`pipeline`] - Session controller tying the pieces together
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use litscout::config::AppConfig;
//! use litscout::paper::SearchFilters;
//! use litscout::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let mut pipeline = Pipeline::new(&config)?;
//!     let report = pipeline
//!         .initial_search("transformer neural networks", SearchFilters::default(), 10, None)
//!         .await?;
//!     println!("Found {} papers", report.papers_found);
//!     Ok(())
//! }
//! ```

pub mod augment;
pub mod classifier;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod gemini;
pub mod keywords;
pub mod orchestrator;
pub mod paper;
pub mod pipeline;
pub mod prompts;
pub mod sources;
pub mod store;
pub mod validator;

pub use error::{DiscoveryError, Result};
