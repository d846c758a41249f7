//! Persistent vector store for saved papers.
//!
//! Two co-located artifacts share a path prefix: `<prefix>.index` holds the
//! embedding matrix (bincode), `<prefix>.meta.json` holds the metadata map
//! plus the `paper_ids` sequence whose order mirrors the index rows. Both
//! files are rewritten through a temp-file rename after every successful
//! batch insert, so a crash can never leave a half-updated pair behind.

use crate::classifier::classify_paper;
use crate::config::EMBEDDING_DIMENSION;
use crate::error::Result;
use crate::gemini::Embedder;
use crate::paper::{Paper, PaperType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A stored paper: the canonical record plus provenance of its save.
/// The embedding itself lives in the index row sharing this entry's
/// position in `paper_ids`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedPaper {
    #[serde(flatten)]
    pub paper: Paper,
    pub search_query: String,
    pub session_id: String,
    pub timestamp: String,
}

/// Aggregate statistics over the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_papers: usize,
    pub papers_by_type: HashMap<String, usize>,
    pub avg_relevance_score: f64,
    pub avg_confidence_score: f64,
    pub total_sessions: usize,
    pub vector_index_size: usize,
}

#[derive(Serialize, Deserialize, Default)]
struct MetadataFile {
    metadata: HashMap<String, EmbeddedPaper>,
    paper_ids: Vec<String>,
}

pub struct VectorStore {
    prefix: PathBuf,
    embedder: Arc<dyn Embedder>,
    index: Vec<Vec<f32>>,
    metadata: HashMap<String, EmbeddedPaper>,
    paper_ids: Vec<String>,
}

impl VectorStore {
    /// Open (or create) the store at the given path prefix.
    ///
    /// Missing files yield an empty store; corrupt or inconsistent files
    /// reset to empty with a warning rather than failing the process.
    pub fn open(prefix: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let prefix = prefix.into();
        if let Some(dir) = prefix.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let mut store = Self {
            prefix,
            embedder,
            index: Vec::new(),
            metadata: HashMap::new(),
            paper_ids: Vec::new(),
        };
        store.load();
        Ok(store)
    }

    fn index_path(&self) -> PathBuf {
        self.prefix.with_extension("index")
    }

    fn metadata_path(&self) -> PathBuf {
        self.prefix.with_extension("meta.json")
    }

    fn load(&mut self) {
        let index_path = self.index_path();
        let metadata_path = self.metadata_path();
        if !index_path.exists() || !metadata_path.exists() {
            return;
        }

        let loaded = || -> Result<(Vec<Vec<f32>>, MetadataFile)> {
            let index_bytes = std::fs::read(&index_path)?;
            let index: Vec<Vec<f32>> = bincode::deserialize(&index_bytes)
                .map_err(|e| crate::error::DiscoveryError::Parse(e.to_string()))?;
            let meta_bytes = std::fs::read(&metadata_path)?;
            let meta: MetadataFile = serde_json::from_slice(&meta_bytes)?;
            Ok((index, meta))
        }();

        match loaded {
            Ok((index, meta)) if index.len() == meta.paper_ids.len()
                && meta.paper_ids.len() == meta.metadata.len() =>
            {
                info!(papers = meta.paper_ids.len(), "Loaded vector store");
                self.index = index;
                self.metadata = meta.metadata;
                self.paper_ids = meta.paper_ids;
            }
            Ok((index, meta)) => {
                warn!(
                    index_rows = index.len(),
                    paper_ids = meta.paper_ids.len(),
                    metadata = meta.metadata.len(),
                    "Vector store files inconsistent, starting empty"
                );
            }
            Err(e) => {
                warn!(error = %e, "Could not load vector store, starting empty");
            }
        }
    }

    /// Persist both artifacts via temp-file + rename.
    fn save(&self) -> Result<()> {
        let index_bytes = bincode::serialize(&self.index)
            .map_err(|e| crate::error::DiscoveryError::Parse(e.to_string()))?;
        let meta = MetadataFile {
            metadata: self.metadata.clone(),
            paper_ids: self.paper_ids.clone(),
        };
        let meta_bytes = serde_json::to_vec(&meta)?;

        write_atomic(&self.index_path(), &index_bytes)?;
        write_atomic(&self.metadata_path(), &meta_bytes)?;
        info!(papers = self.paper_ids.len(), "Saved vector store");
        Ok(())
    }

    /// Embed and store a batch of papers, skipping DOIs already present.
    ///
    /// Returns the papers actually stored. Embedding failures degrade to a
    /// zero vector (the paper is still stored; it just never ranks in
    /// similarity search).
    pub async fn insert_batch(
        &mut self,
        papers: &[Paper],
        search_query: &str,
        session_id: &str,
    ) -> Result<Vec<EmbeddedPaper>> {
        let existing_dois = self.stored_dois();
        let mut inserted = Vec::new();
        let mut new_rows = Vec::new();

        for paper in papers {
            if !paper.doi.is_empty() && existing_dois.contains(&paper.doi) {
                info!(doi = %paper.doi, "Skipping duplicate DOI");
                continue;
            }

            let embedding = self.embed_document(&embedding_text(paper)).await;

            let mut paper = paper.clone();
            paper.paper_type = classify_paper(&paper.title, &paper.journal, &paper.abstract_text);

            let entry = EmbeddedPaper {
                paper,
                search_query: search_query.to_string(),
                session_id: session_id.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            };

            self.metadata
                .insert(entry.paper.paper_id.clone(), entry.clone());
            self.paper_ids.push(entry.paper.paper_id.clone());
            new_rows.push(embedding);
            inserted.push(entry);
        }

        if !inserted.is_empty() {
            self.index.extend(new_rows);
            self.save()?;
            info!(count = inserted.len(), "Added papers to vector store");
        }

        Ok(inserted)
    }

    /// Top-k similarity search over the stored papers.
    ///
    /// When a type filter is set, three times as many neighbors are pulled
    /// from the index and non-matching entries are skipped in order.
    pub async fn search_similar(
        &self,
        query: &str,
        k: usize,
        paper_type_filter: Option<PaperType>,
    ) -> Result<Vec<EmbeddedPaper>> {
        if self.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embed_document(query).await;

        let search_k = if paper_type_filter.is_some() { k * 3 } else { k };
        let mut scored: Vec<(f64, usize)> = self
            .index
            .iter()
            .enumerate()
            .map(|(i, row)| (dot(&query_embedding, row), i))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(search_k.min(self.index.len()));

        let mut results = Vec::new();
        for (score, idx) in scored {
            let Some(paper_id) = self.paper_ids.get(idx) else {
                continue;
            };
            let Some(entry) = self.metadata.get(paper_id) else {
                continue;
            };
            if let Some(wanted) = paper_type_filter {
                if entry.paper.paper_type != wanted {
                    continue;
                }
            }
            let mut entry = entry.clone();
            entry.paper.similarity_score = score;
            results.push(entry);
            if results.len() >= k {
                break;
            }
        }

        info!(count = results.len(), filter = ?paper_type_filter, "Similarity search complete");
        Ok(results)
    }

    /// Aggregate statistics over the stored papers.
    pub fn stats(&self) -> StoreStats {
        let mut papers_by_type: HashMap<String, usize> = HashMap::new();
        let mut relevance = Vec::new();
        let mut confidence = Vec::new();
        let mut sessions = HashSet::new();

        for entry in self.metadata.values() {
            *papers_by_type
                .entry(entry.paper.paper_type.as_str().to_string())
                .or_insert(0) += 1;
            if entry.paper.relevance_score.is_finite() {
                relevance.push(entry.paper.relevance_score);
            }
            if entry.paper.confidence_score.is_finite() {
                confidence.push(entry.paper.confidence_score);
            }
            if !entry.session_id.is_empty() {
                sessions.insert(entry.session_id.clone());
            }
        }

        StoreStats {
            total_papers: self.metadata.len(),
            papers_by_type,
            avg_relevance_score: mean(&relevance),
            avg_confidence_score: mean(&confidence),
            total_sessions: sessions.len(),
            vector_index_size: self.index.len(),
        }
    }

    /// All DOIs currently stored.
    pub fn stored_dois(&self) -> HashSet<String> {
        self.metadata
            .values()
            .filter(|entry| !entry.paper.doi.is_empty())
            .map(|entry| entry.paper.doi.clone())
            .collect()
    }

    /// Embed a document, L2-normalized; zero vector on any API failure.
    async fn embed_document(&self, text: &str) -> Vec<f32> {
        match self.embedder.embed(text).await {
            Ok(mut vector) => {
                normalize(&mut vector);
                vector
            }
            Err(e) => {
                warn!(error = %e, "Embedding failed, storing zero vector");
                let dim = self
                    .index
                    .first()
                    .map(|row| row.len())
                    .unwrap_or(EMBEDDING_DIMENSION);
                vec![0.0; dim]
            }
        }
    }
}

/// Text fed to the embedding model for one paper.
fn embedding_text(paper: &Paper) -> String {
    format!(
        "Title: {}\nAbstract: {}\nKeywords: {}\nCategories: {}\nJournal: {}",
        paper.title,
        paper.abstract_text,
        paper.keywords.join(", "),
        paper.categories.join(", "),
        paper.journal
    )
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x * y) as f64).sum()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::DiscoveryError;
    use crate::paper::PaperSource;
    use async_trait::async_trait;

    /// Deterministic embedder: a fixed vector per keyword bucket.
    pub(crate) struct StubEmbedder {
        pub fail: bool,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail {
                return Err(DiscoveryError::Parse("stub embedding failure".to_string()));
            }
            // Crude but deterministic: bucket by topic keywords.
            let lower = text.to_lowercase();
            Ok(vec![
                if lower.contains("transformer") { 1.0 } else { 0.0 },
                if lower.contains("biology") { 1.0 } else { 0.0 },
                if lower.contains("survey") { 1.0 } else { 0.0 },
                1.0,
            ])
        }
    }

    fn paper(title: &str, doi: &str) -> Paper {
        let mut p = Paper::new(title, PaperSource::Crossref);
        p.doi = doi.to_string();
        p.journal = "Nature".to_string();
        p
    }

    fn temp_store(fail: bool) -> (tempfile::TempDir, VectorStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = VectorStore::open(
            dir.path().join("embeddings"),
            Arc::new(StubEmbedder { fail }),
        )
        .expect("store opens");
        (dir, store)
    }

    #[tokio::test]
    async fn test_insert_and_stats() {
        let (_dir, mut store) = temp_store(false);
        let papers = vec![
            paper("Transformer models", "10.1/a"),
            paper("Biology of cells", "10.1/b"),
        ];
        let inserted = store
            .insert_batch(&papers, "transformers", "session-1")
            .await
            .expect("insert");
        assert_eq!(inserted.len(), 2);

        let stats = store.stats();
        assert_eq!(stats.total_papers, 2);
        assert_eq!(stats.vector_index_size, 2);
        assert_eq!(stats.total_sessions, 1);
    }

    #[tokio::test]
    async fn test_duplicate_doi_skipped_across_batches() {
        let (_dir, mut store) = temp_store(false);
        let papers = vec![paper("Transformer models", "10.1/abc")];

        store
            .insert_batch(&papers, "q", "s1")
            .await
            .expect("first insert");
        let before = store.stats().total_papers;

        let second = store
            .insert_batch(&papers, "q", "s2")
            .await
            .expect("second insert");
        assert!(second.is_empty());
        assert_eq!(store.stats().total_papers, before);
        assert_eq!(store.stats().vector_index_size, before);
    }

    #[tokio::test]
    async fn test_search_similar_ranks_by_inner_product() {
        let (_dir, mut store) = temp_store(false);
        let papers = vec![
            paper("Transformer models", "10.1/a"),
            paper("Biology of cells", "10.1/b"),
        ];
        store.insert_batch(&papers, "q", "s").await.expect("insert");

        let results = store
            .search_similar("transformer attention", 1, None)
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].paper.title, "Transformer models");
        assert!(results[0].paper.similarity_score > 0.0);
    }

    #[tokio::test]
    async fn test_search_with_type_filter() {
        let (_dir, mut store) = temp_store(false);
        let papers = vec![
            paper("A survey of transformers", "10.1/a"),
            paper("Transformer models", "10.1/b"),
        ];
        store.insert_batch(&papers, "q", "s").await.expect("insert");

        let reviews = store
            .search_similar("transformer", 5, Some(PaperType::Review))
            .await
            .expect("search");
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].paper.paper_type, PaperType::Review);
    }

    #[tokio::test]
    async fn test_embedding_failure_stores_zero_vector() {
        let (_dir, mut store) = temp_store(true);
        let inserted = store
            .insert_batch(&[paper("Transformer models", "10.1/a")], "q", "s")
            .await
            .expect("insert");
        assert_eq!(inserted.len(), 1);
        assert_eq!(store.stats().vector_index_size, 1);
    }

    #[tokio::test]
    async fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prefix = dir.path().join("embeddings");

        {
            let mut store = VectorStore::open(&prefix, Arc::new(StubEmbedder { fail: false }))
                .expect("store opens");
            store
                .insert_batch(&[paper("Transformer models", "10.1/a")], "q", "s")
                .await
                .expect("insert");
        }

        let reopened = VectorStore::open(&prefix, Arc::new(StubEmbedder { fail: false }))
            .expect("store reopens");
        assert_eq!(reopened.stats().total_papers, 1);
        assert_eq!(reopened.stats().vector_index_size, 1);
        assert!(reopened.stored_dois().contains("10.1/a"));
    }
}
