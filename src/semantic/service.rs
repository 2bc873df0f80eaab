//! Tenant-scoped semantic search over persisted file vectors.

use std::sync::Arc;

use serde::Serialize;

use crate::config::SearchConfig;
use crate::files::{FileManager, FileRecord};
use crate::genai::{Embedder, GenAiError};
use crate::semantic::index::IndexError;
use crate::semantic::store::VectorStore;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] GenAiError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error(transparent)]
    Records(#[from] anyhow::Error),
}

/// A search candidate joined back to its record; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub file: FileRecord,
    /// Relevance score from the index (higher = more relevant)
    pub score: f32,
    /// Ephemeral retrieval path for the raw bytes
    pub url: String,
}

pub struct SearchService {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    files: Arc<dyn FileManager>,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        files: Arc<dyn FileManager>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            files,
            config,
        }
    }

    /// Find the most relevant files of one org for a free-text query.
    ///
    /// Embeds the query, searches the index scoped to `org_id` (the
    /// tenant filter is applied inside the scan, never as a post-filter),
    /// keeps candidates above the score floor, and joins the survivors to
    /// their records. Candidates whose record has vanished or sits in the
    /// trash are dropped silently; the index catches up on its own.
    pub fn search(&self, org_id: &str, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let query_embedding = self.embedder.embed(query)?;

        let scored = self.store.search(
            &query_embedding,
            org_id,
            self.config.score_floor,
            self.config.result_limit,
        )?;

        let mut hits = Vec::with_capacity(scored.len());
        for candidate in scored {
            let Some(record) = self.files.get(candidate.id)? else {
                log::debug!("dropping dangling search candidate {}", candidate.id);
                continue;
            };
            if record.should_delete {
                continue;
            }

            hits.push(SearchHit {
                url: blob_url(&record.blob_id),
                score: candidate.score,
                file: record,
            });
        }

        Ok(hits)
    }
}

/// Retrieval path served by the daemon's blob route.
pub fn blob_url(blob_id: &str) -> String {
    format!("/api/blob/{blob_id}")
}
