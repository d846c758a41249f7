//! Process-wide configuration loaded from the environment.
//!
//! All API keys and tunables are resolved once at startup and carried in an
//! immutable [`AppConfig`] that constructors receive explicitly.

use crate::error::{DiscoveryError, Result};
use std::path::PathBuf;

/// Default contact email for polite-pool headers (Crossref, OpenAlex).
const DEFAULT_RESEARCH_EMAIL: &str = "research@example.com";

/// Default directory for persisted artifacts (vector store, sqlite db).
const DEFAULT_DATA_DIR: &str = "data";

/// Gemini model used for relevance scoring and query refinement.
pub const GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Gemini model used for embedding generation.
pub const EMBEDDING_MODEL: &str = "text-embedding-004";

/// Dimension of the embedding model output.
pub const EMBEDDING_DIMENSION: usize = 768;

/// Immutable process-wide configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Gemini API key (LLM scoring + embeddings). Required.
    pub gemini_api_key: String,
    /// SerpAPI key for the Google Scholar adapter. Absent means the
    /// Scholar adapter silently returns empty results.
    pub serpapi_key: Option<String>,
    /// Optional OpenAI key, carried for deployments that swap providers.
    pub openai_api_key: Option<String>,
    /// Contact email sent in politeness headers.
    pub research_email: String,
    /// Developer override flag.
    pub admin_mode: bool,
    /// Directory for the vector store and sqlite database.
    pub data_dir: PathBuf,
}

impl AppConfig {
    /// Load configuration from the environment (and `.env` if present).
    ///
    /// # Errors
    ///
    /// Returns a config error when `GEMINI_API_KEY` is missing.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| DiscoveryError::Config("GEMINI_API_KEY not set".to_string()))?;

        Ok(Self {
            gemini_api_key,
            serpapi_key: env_opt("SERPAPI_KEY"),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            research_email: env_opt("RESEARCH_EMAIL")
                .unwrap_or_else(|| DEFAULT_RESEARCH_EMAIL.to_string()),
            admin_mode: env_flag("ADMIN_MODE"),
            data_dir: env_opt("LITSCOUT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        })
    }

    /// User-Agent string including the contact email for polite pools.
    pub fn user_agent(&self) -> String {
        format!("litscout/1.0 (mailto:{})", self.research_email)
    }

    /// Path prefix for the vector store pair (`<prefix>.index` / `<prefix>.meta.json`).
    pub fn vector_store_prefix(&self) -> PathBuf {
        self.data_dir.join("paper_embeddings")
    }

    /// Path of the sqlite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("litscout.db")
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(name: &str) -> bool {
    env_opt(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
