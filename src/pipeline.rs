//! Pipeline controller: session lifecycle and the operations the outer UI
//! depends on (initial search, secondary search, save, find-similar).
//!
//! All session state is owned here and mutated only on the controller's
//! call path; workers return values instead of reaching for shared state.

use crate::augment::QueryAugmenter;
use crate::config::{AppConfig, GEMINI_MODEL};
use crate::db::Database;
use crate::dedup::{deduplicate, normalize_title};
use crate::error::{DiscoveryError, Result};
use crate::gemini::{Embedder, GeminiClient, TextModel};
use crate::orchestrator::{pre_rank, SearchOrchestrator, SourceStats};
use crate::paper::{short_id, Paper, PaperType, SearchFilters};
use crate::sources::{build_sources, Source};
use crate::store::{StoreStats, VectorStore};
use crate::validator::RelevanceValidator;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Papers shown to the user after the initial search.
const TOP_DISPLAY_RESULTS: usize = 10;

/// Papers shown after a secondary search (users want the wider view there).
const SECONDARY_DISPLAY_RESULTS: usize = 20;

/// Total papers requested per secondary search round.
const SECONDARY_MAX_RESULTS: usize = 12;

/// Probe queries issued by find-similar.
const MAX_SIMILARITY_QUERIES: usize = 3;

/// One user query thread, across initial and secondary rounds.
pub struct Session {
    pub session_id: String,
    pub query: String,
    pub filters: SearchFilters,
    pub start_time: Instant,
    pub current_session_papers: Vec<Paper>,
    pub all_found_papers: Vec<Paper>,
    pub stored_dois: HashSet<String>,
    pub stored_titles: HashSet<String>,
}

/// Search result surface returned to the UI layer.
#[derive(Debug, Default, Serialize)]
pub struct SearchReport {
    pub session_id: String,
    pub papers_found: usize,
    pub top_papers: Vec<Paper>,
    pub total_session_papers: usize,
    pub augmented_query: Option<String>,
    pub source_stats: SourceStats,
    pub duration_secs: f64,
}

/// Session-level statistics for the UI.
#[derive(Debug, Default, Serialize)]
pub struct SessionStatistics {
    pub session_id: String,
    pub query: String,
    pub total_papers: usize,
    pub avg_relevance: f64,
    pub store: StoreStats,
}

pub struct Pipeline {
    orchestrator: SearchOrchestrator,
    augmenter: QueryAugmenter,
    store: VectorStore,
    db: Database,
    session: Option<Session>,
}

impl Pipeline {
    /// Build the full pipeline from process configuration.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let gemini = Arc::new(GeminiClient::new(config)?);
        let sources = build_sources(config, None)?;
        Self::with_components(
            sources,
            gemini.clone(),
            gemini,
            config.vector_store_prefix(),
            Database::open(config.database_path())?,
        )
    }

    /// Dependency-injected constructor; tests hand in stub backends.
    pub fn with_components(
        sources: Vec<Box<dyn Source>>,
        model: Arc<dyn TextModel>,
        embedder: Arc<dyn Embedder>,
        store_prefix: PathBuf,
        db: Database,
    ) -> Result<Self> {
        Ok(Self {
            orchestrator: SearchOrchestrator::new(sources, RelevanceValidator::new(model.clone())),
            augmenter: QueryAugmenter::new(model),
            store: VectorStore::open(store_prefix, embedder)?,
            db,
            session: None,
        })
    }

    /// Start a new session for a query, replacing any previous one.
    pub fn start_session(&mut self, query: &str, filters: SearchFilters) -> Result<String> {
        let filters = filters.validated()?;
        let session_id = short_id();
        self.db.create_session(
            &session_id,
            query,
            &serde_json::to_string(&filters)?,
            GEMINI_MODEL,
        )?;

        info!(session_id = %session_id, query = query, "Session started");
        self.session = Some(Session {
            session_id: session_id.clone(),
            query: query.to_string(),
            filters,
            start_time: Instant::now(),
            current_session_papers: Vec::new(),
            all_found_papers: Vec::new(),
            stored_dois: HashSet::new(),
            stored_titles: HashSet::new(),
        });
        Ok(session_id)
    }

    /// Federated initial search; accumulates results in the session and
    /// returns the top papers for display.
    pub async fn initial_search(
        &mut self,
        query: &str,
        filters: SearchFilters,
        max_results: usize,
        selected_sources: Option<&[String]>,
    ) -> Result<SearchReport> {
        let filters = filters.validated()?;
        if self.session.is_none() {
            self.start_session(query, filters.clone())?;
        }
        let started = Instant::now();

        let outcome = self
            .orchestrator
            .search(query, &filters, max_results, selected_sources)
            .await;

        let session = self.session.as_mut().ok_or_else(|| {
            DiscoveryError::Validation("no active session".to_string())
        })?;

        for paper in &outcome.papers {
            self.db.save_paper(paper, &session.session_id, false)?;
        }

        session.current_session_papers = outcome.papers.clone();
        accumulate(session, &outcome.papers);

        let avg_relevance = mean_relevance(&outcome.papers);
        self.db.update_session_stats(
            &session.session_id,
            session.all_found_papers.len(),
            0,
            avg_relevance,
            session.start_time.elapsed().as_secs_f64(),
        )?;

        Ok(SearchReport {
            session_id: session.session_id.clone(),
            papers_found: outcome.papers.len(),
            top_papers: outcome.papers.iter().take(TOP_DISPLAY_RESULTS).cloned().collect(),
            total_session_papers: session.current_session_papers.len(),
            augmented_query: None,
            source_stats: outcome.stats,
            duration_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Secondary search driven by the user's selected papers.
    ///
    /// The augmenter refines the query from the selections, a fresh
    /// federation round runs with the refined query, and the combined set
    /// is re-ranked against the *original* query before display.
    pub async fn secondary_search(
        &mut self,
        selected_indices: &[usize],
        original_query: &str,
    ) -> Result<SearchReport> {
        let started = Instant::now();
        let (selected, filters) = {
            let session = self.active_session()?;
            let selected: Vec<Paper> = selected_indices
                .iter()
                .filter_map(|&i| session.current_session_papers.get(i).cloned())
                .collect();
            (selected, session.filters.clone())
        };

        if selected.is_empty() {
            return Err(DiscoveryError::Validation(
                "no valid selected papers for secondary search".to_string(),
            ));
        }

        let augmented_query = self.augmenter.augment(original_query, &selected).await;
        info!(query = %augmented_query, "Running secondary search");

        let outcome = self
            .orchestrator
            .search(&augmented_query, &filters, SECONDARY_MAX_RESULTS, None)
            .await;

        let session_id = self.active_session()?.session_id.clone();
        for paper in &outcome.papers {
            self.db.save_paper(paper, &session_id, false)?;
        }
        let session = self.active_session_mut()?;
        session.current_session_papers.extend(outcome.papers.clone());
        accumulate(session, &outcome.papers);

        // Selected papers from the first round lead; new papers join them,
        // then everything is re-ranked against the original query.
        let mut combined = selected;
        combined.extend(outcome.papers);
        let combined = deduplicate(combined);
        let mut ranked = pre_rank(combined, original_query);
        ranked.truncate(SECONDARY_DISPLAY_RESULTS);

        Ok(SearchReport {
            session_id,
            papers_found: ranked.len(),
            top_papers: ranked,
            total_session_papers: self.active_session()?.current_session_papers.len(),
            augmented_query: Some(augmented_query),
            source_stats: outcome.stats,
            duration_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Persist the selected papers into the vector store.
    pub async fn save_papers(&mut self, selected_indices: &[usize]) -> Result<usize> {
        let (selected, session_id, query) = {
            let session = self.active_session()?;
            let selected: Vec<Paper> = selected_indices
                .iter()
                .filter_map(|&i| session.current_session_papers.get(i).cloned())
                .collect();
            (selected, session.session_id.clone(), session.query.clone())
        };

        if selected.is_empty() {
            return Ok(0);
        }

        let inserted = self.store.insert_batch(&selected, &query, &session_id).await?;
        let ids: Vec<String> = selected.iter().map(|p| p.paper_id.clone()).collect();
        self.db.mark_selected(&ids)?;

        info!(saved = inserted.len(), "Saved papers to vector store");
        Ok(inserted.len())
    }

    /// Find papers similar to the given selections via probe queries built
    /// from their dominant keywords, categories and authors.
    pub async fn find_similar(
        &self,
        selected: &[Paper],
        max_results: usize,
    ) -> Result<Vec<Paper>> {
        if selected.is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        let filters = self
            .session
            .as_ref()
            .map(|s| s.filters.clone())
            .unwrap_or_default();

        let mut probe_queries: Vec<String> = Vec::new();

        let top_keywords = top_by_frequency(selected.iter().flat_map(|p| p.keywords.iter()), 8);
        if !top_keywords.is_empty() {
            probe_queries.push(top_keywords[..top_keywords.len().min(5)].join(" "));
        }

        let top_categories = top_by_frequency(selected.iter().flat_map(|p| p.categories.iter()), 3);
        if !top_categories.is_empty() {
            probe_queries.push(top_categories.join(" "));
        }

        let top_authors = top_by_frequency(selected.iter().flat_map(|p| p.authors.iter()), 2);
        for author in top_authors {
            probe_queries.push(format!("author:\"{author}\""));
        }
        probe_queries.truncate(MAX_SIMILARITY_QUERIES);

        let share = max_results / probe_queries.len().max(1) + 2;
        let mut found: Vec<Paper> = Vec::new();
        for query in &probe_queries {
            let outcome = self.orchestrator.search(query, &filters, share, None).await;
            if outcome.papers.is_empty() {
                warn!(query = %query, "Similarity probe returned nothing");
            }
            found.extend(outcome.papers);
        }

        let unique = deduplicate(found);
        let selected_ids: HashSet<&str> = selected.iter().map(|p| p.paper_id.as_str()).collect();
        let mut fresh: Vec<Paper> = unique
            .into_iter()
            .filter(|p| !selected_ids.contains(p.paper_id.as_str()))
            .collect();

        fresh.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then(b.confidence_score.total_cmp(&a.confidence_score))
        });
        fresh.truncate(max_results);
        Ok(fresh)
    }

    /// Similarity search over the persistent vector store.
    pub async fn search_saved(
        &self,
        query: &str,
        k: usize,
        paper_type_filter: Option<PaperType>,
    ) -> Result<Vec<crate::store::EmbeddedPaper>> {
        self.store.search_similar(query, k, paper_type_filter).await
    }

    /// Session and store statistics for the UI.
    pub fn statistics(&self) -> SessionStatistics {
        let store = self.store.stats();
        match &self.session {
            Some(session) => SessionStatistics {
                session_id: session.session_id.clone(),
                query: session.query.clone(),
                total_papers: session.all_found_papers.len(),
                avg_relevance: mean_relevance(&session.all_found_papers),
                store,
            },
            None => SessionStatistics {
                store,
                ..Default::default()
            },
        }
    }

    /// Papers accumulated in the current session.
    pub fn session_papers(&self) -> &[Paper] {
        self.session
            .as_ref()
            .map(|s| s.current_session_papers.as_slice())
            .unwrap_or(&[])
    }

    fn active_session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| DiscoveryError::Validation("no active session".to_string()))
    }

    fn active_session_mut(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| DiscoveryError::Validation("no active session".to_string()))
    }
}

/// Fold new papers into the session accumulator, skipping DOIs and
/// normalized titles already seen in this session.
fn accumulate(session: &mut Session, papers: &[Paper]) {
    for paper in papers {
        let title_key = normalize_title(&paper.title);
        if !paper.doi.is_empty() && session.stored_dois.contains(&paper.doi) {
            continue;
        }
        if session.stored_titles.contains(&title_key) {
            continue;
        }
        if !paper.doi.is_empty() {
            session.stored_dois.insert(paper.doi.clone());
        }
        session.stored_titles.insert(title_key);
        session.all_found_papers.push(paper.clone());
    }
}

fn mean_relevance(papers: &[Paper]) -> f64 {
    if papers.is_empty() {
        return 0.0;
    }
    papers.iter().map(|p| p.relevance_score).sum::<f64>() / papers.len() as f64
}

/// Most frequent items first (stable on first appearance for ties).
fn top_by_frequency<'a, I>(items: I, n: usize) -> Vec<String>
where
    I: Iterator<Item = &'a String>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for item in items {
        let entry = counts.entry(item.as_str()).or_insert(0);
        if *entry == 0 {
            order.push(item.as_str());
        }
        *entry += 1;
    }
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.into_iter().take(n).map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as DiscoveryResult;
    use crate::paper::PaperSource;
    use crate::sources::Source;
    use crate::store::tests::StubEmbedder;
    use crate::validator::tests::StubModel;
    use async_trait::async_trait;

    struct StubSource {
        name: &'static str,
        papers: Vec<Paper>,
    }

    #[async_trait]
    impl Source for StubSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(
            &self,
            _query: &str,
            _filters: &SearchFilters,
            max_results: usize,
        ) -> DiscoveryResult<Vec<Paper>> {
            Ok(self.papers.iter().take(max_results).cloned().collect())
        }
    }

    fn paper(title: &str, doi: &str, citations: u32) -> Paper {
        let mut p = Paper::new(title, PaperSource::Crossref);
        p.doi = doi.to_string();
        p.citation_count = citations;
        p.publication_date = "2022".to_string();
        p.abstract_text = "attention mechanism transformer attention mechanism".to_string();
        p.keywords = vec!["attention".to_string(), "transformer".to_string()];
        p.authors = vec!["Grace Hopper".to_string()];
        p
    }

    fn test_pipeline(model_response: Option<&str>) -> (tempfile::TempDir, Pipeline) {
        let dir = tempfile::tempdir().expect("tempdir");
        let sources: Vec<Box<dyn Source>> = vec![
            Box::new(StubSource {
                name: "crossref",
                papers: vec![
                    paper("Attention mechanism advances", "10.1/a", 400),
                    paper("BERT attention variants", "10.1/b", 250),
                ],
            }),
            Box::new(StubSource {
                name: "openalex",
                papers: vec![paper("Transformer scaling laws", "10.1/c", 100)],
            }),
        ];
        let model: Arc<dyn TextModel> = Arc::new(StubModel {
            response: model_response.map(|s| s.to_string()),
        });
        let pipeline = Pipeline::with_components(
            sources,
            model,
            Arc::new(StubEmbedder { fail: false }),
            dir.path().join("embeddings"),
            Database::open_in_memory().expect("db"),
        )
        .expect("pipeline");
        (dir, pipeline)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_search_accumulates_session() {
        let (_dir, mut pipeline) = test_pipeline(Some("0.8"));
        let report = pipeline
            .initial_search("transformer attention", SearchFilters::default(), 3, None)
            .await
            .expect("search");

        assert_eq!(report.papers_found, 3);
        assert!(report.top_papers.len() <= TOP_DISPLAY_RESULTS);
        assert_eq!(pipeline.session_papers().len(), 3);
        let stats = pipeline.statistics();
        assert_eq!(stats.total_papers, 3);
        assert!((stats.avg_relevance - 0.8).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_search_persists_papers() {
        let (_dir, mut pipeline) = test_pipeline(Some("0.8"));
        pipeline
            .initial_search("transformer attention", SearchFilters::default(), 3, None)
            .await
            .expect("search");
        assert_eq!(pipeline.db.paper_count().expect("count"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_secondary_search_uses_fallback_augmentation() {
        let (_dir, mut pipeline) = test_pipeline(None);
        pipeline
            .initial_search("transformer neural networks", SearchFilters::default(), 3, None)
            .await
            .expect("initial");

        let report = pipeline
            .secondary_search(&[0, 1], "transformer neural networks")
            .await
            .expect("secondary");

        let augmented = report.augmented_query.expect("augmented query recorded");
        assert!(augmented.starts_with("transformer neural networks "));
        assert!(augmented.contains("attention"));
        assert!(report.top_papers.len() <= SECONDARY_DISPLAY_RESULTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_secondary_search_without_selection_rejected() {
        let (_dir, mut pipeline) = test_pipeline(Some("0.8"));
        pipeline
            .initial_search("transformers", SearchFilters::default(), 2, None)
            .await
            .expect("initial");
        assert!(pipeline.secondary_search(&[99], "transformers").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_papers_counts_store_inserts() {
        let (_dir, mut pipeline) = test_pipeline(Some("0.8"));
        pipeline
            .initial_search("transformer attention", SearchFilters::default(), 3, None)
            .await
            .expect("search");

        let saved = pipeline.save_papers(&[0, 1]).await.expect("save");
        assert_eq!(saved, 2);
        assert_eq!(pipeline.store.stats().total_papers, 2);

        // Saving the same selection again inserts nothing new.
        let again = pipeline.save_papers(&[0, 1]).await.expect("save again");
        assert_eq!(again, 0);
        assert_eq!(pipeline.store.stats().total_papers, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_similar_excludes_selected() {
        let (_dir, mut pipeline) = test_pipeline(Some("0.8"));
        pipeline
            .initial_search("transformer attention", SearchFilters::default(), 3, None)
            .await
            .expect("search");

        let selected: Vec<Paper> = pipeline.session_papers()[..1].to_vec();
        let similar = pipeline.find_similar(&selected, 5).await.expect("similar");

        assert!(similar.len() <= 5);
        assert!(similar.iter().all(|p| p.paper_id != selected[0].paper_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_filters_rejected_before_search() {
        let (_dir, mut pipeline) = test_pipeline(Some("0.8"));
        let filters = SearchFilters {
            year_start: Some(2024),
            year_end: Some(2020),
            ..Default::default()
        };
        assert!(pipeline
            .initial_search("transformers", filters, 3, None)
            .await
            .is_err());
    }

    #[test]
    fn test_top_by_frequency_stable() {
        let items = vec![
            "b".to_string(),
            "a".to_string(),
            "a".to_string(),
            "c".to_string(),
            "b".to_string(),
        ];
        let top = top_by_frequency(items.iter(), 2);
        assert_eq!(top, vec!["b".to_string(), "a".to_string()]);
    }
}
