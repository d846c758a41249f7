//! Relational store for sessions and validated papers.
//!
//! Single-writer sqlite database owned by the pipeline controller. List
//! fields are stored as JSON text columns; queries the outer UI runs most
//! (by relevance, by session, by selection, by source) get indexes.

use crate::error::Result;
use crate::paper::{Paper, PaperSource, PaperType};
use rusqlite::{params, Connection};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS papers (
    paper_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    authors TEXT NOT NULL DEFAULT '[]',
    abstract TEXT NOT NULL DEFAULT '',
    publication_date TEXT NOT NULL DEFAULT 'Unknown',
    journal TEXT NOT NULL DEFAULT '',
    citation_count INTEGER NOT NULL DEFAULT 0,
    url TEXT NOT NULL DEFAULT '',
    doi TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL DEFAULT '[]',
    categories TEXT NOT NULL DEFAULT '[]',
    source TEXT NOT NULL,
    relevance_score REAL NOT NULL DEFAULT 0.0,
    confidence_score REAL NOT NULL DEFAULT 0.0,
    similarity_score REAL NOT NULL DEFAULT 0.0,
    paper_type TEXT NOT NULL DEFAULT 'unknown',
    reasoning TEXT NOT NULL DEFAULT '',
    key_matches TEXT NOT NULL DEFAULT '[]',
    concerns TEXT NOT NULL DEFAULT '[]',
    session_id TEXT NOT NULL,
    selected INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_papers_relevance ON papers(relevance_score DESC);
CREATE INDEX IF NOT EXISTS idx_papers_session ON papers(session_id);
CREATE INDEX IF NOT EXISTS idx_papers_selected ON papers(selected);
CREATE INDEX IF NOT EXISTS idx_papers_source ON papers(source);

CREATE TABLE IF NOT EXISTS search_sessions (
    session_id TEXT PRIMARY KEY,
    query TEXT NOT NULL,
    filters TEXT NOT NULL DEFAULT '{}',
    model TEXT NOT NULL DEFAULT '',
    start_time TEXT NOT NULL,
    total_papers INTEGER NOT NULL DEFAULT 0,
    selected_papers INTEGER NOT NULL DEFAULT 0,
    avg_relevance REAL NOT NULL DEFAULT 0.0,
    duration_secs REAL NOT NULL DEFAULT 0.0
);
";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Record a new search session.
    pub fn create_session(
        &self,
        session_id: &str,
        query: &str,
        filters_json: &str,
        model: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO search_sessions (session_id, query, filters, model, start_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                query,
                filters_json,
                model,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Upsert a validated paper under its session.
    pub fn save_paper(&self, paper: &Paper, session_id: &str, selected: bool) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO papers (
                paper_id, title, authors, abstract, publication_date, journal,
                citation_count, url, doi, keywords, categories, source,
                relevance_score, confidence_score, similarity_score, paper_type,
                reasoning, key_matches, concerns, session_id, selected, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                       ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            params![
                paper.paper_id,
                paper.title,
                serde_json::to_string(&paper.authors)?,
                paper.abstract_text,
                paper.publication_date,
                paper.journal,
                paper.citation_count,
                paper.url,
                paper.doi,
                serde_json::to_string(&paper.keywords)?,
                serde_json::to_string(&paper.categories)?,
                paper.source.as_str(),
                paper.relevance_score,
                paper.confidence_score,
                paper.similarity_score,
                paper.paper_type.as_str(),
                paper.reasoning,
                serde_json::to_string(&paper.key_matches)?,
                serde_json::to_string(&paper.concerns)?,
                session_id,
                selected as i64,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Mark papers as selected by the user.
    pub fn mark_selected(&self, paper_ids: &[String]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("UPDATE papers SET selected = 1 WHERE paper_id = ?1")?;
        for paper_id in paper_ids {
            stmt.execute(params![paper_id])?;
        }
        Ok(())
    }

    /// Refresh the aggregate counters on a session row.
    pub fn update_session_stats(
        &self,
        session_id: &str,
        total_papers: usize,
        selected_papers: usize,
        avg_relevance: f64,
        duration_secs: f64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE search_sessions
             SET total_papers = ?2, selected_papers = ?3, avg_relevance = ?4, duration_secs = ?5
             WHERE session_id = ?1",
            params![
                session_id,
                total_papers as i64,
                selected_papers as i64,
                avg_relevance,
                duration_secs
            ],
        )?;
        Ok(())
    }

    /// Papers recorded for a session, best relevance first.
    pub fn session_papers(&self, session_id: &str, selected_only: bool) -> Result<Vec<Paper>> {
        let sql = if selected_only {
            "SELECT * FROM papers WHERE session_id = ?1 AND selected = 1 ORDER BY relevance_score DESC"
        } else {
            "SELECT * FROM papers WHERE session_id = ?1 ORDER BY relevance_score DESC"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![session_id], row_to_paper)?;
        let mut papers = Vec::new();
        for row in rows {
            papers.push(row?);
        }
        Ok(papers)
    }

    /// Paper count across all sessions.
    pub fn paper_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_paper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Paper> {
    let source: String = row.get("source")?;
    let paper_type: String = row.get("paper_type")?;
    let authors: String = row.get("authors")?;
    let keywords: String = row.get("keywords")?;
    let categories: String = row.get("categories")?;
    let key_matches: String = row.get("key_matches")?;
    let concerns: String = row.get("concerns")?;

    Ok(Paper {
        paper_id: row.get("paper_id")?,
        title: row.get("title")?,
        authors: serde_json::from_str(&authors).unwrap_or_default(),
        abstract_text: row.get("abstract")?,
        publication_date: row.get("publication_date")?,
        journal: row.get("journal")?,
        citation_count: row.get::<_, i64>("citation_count")?.max(0) as u32,
        url: row.get("url")?,
        doi: row.get("doi")?,
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        categories: serde_json::from_str(&categories).unwrap_or_default(),
        source: PaperSource::parse(&source).unwrap_or(PaperSource::UserUpload),
        relevance_score: row.get("relevance_score")?,
        confidence_score: row.get("confidence_score")?,
        similarity_score: row.get("similarity_score")?,
        paper_type: PaperType::parse(&paper_type).unwrap_or(PaperType::Unknown),
        reasoning: row.get("reasoning")?,
        key_matches: serde_json::from_str(&key_matches).unwrap_or_default(),
        concerns: serde_json::from_str(&concerns).unwrap_or_default(),
    })
}
