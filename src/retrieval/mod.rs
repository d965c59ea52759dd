// MindHarbor - Retrieval core
//
// Tokenizer → chunker → TF-IDF index → cosine retriever, plus the shared
// `KnowledgeBase` handle request handlers read from. A rebuild produces a new
// `Index` off to the side and swaps the `Arc` in one step; readers holding the
// old snapshot keep using it untouched.

pub mod chunker;
pub mod index;
pub mod retriever;
pub mod tokenizer;

pub use chunker::{Chunk, Chunker};
pub use index::{Index, IndexError, SparseVector, Vocabulary};
pub use retriever::{cosine_similarity, retrieve, retrieve_with_floor, SearchHit};
pub use tokenizer::tokenize;

use crate::ingest::Document;
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lifecycle of the shared index.
#[derive(Debug, Clone, Default)]
pub enum IndexState {
    /// No build has finished yet.
    #[default]
    Uninitialized,
    /// The last build saw no chunks; chat runs fallback-only.
    Empty,
    Ready(Arc<Index>),
}

/// What `status` endpoints report about the knowledge base.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStatus {
    pub state: &'static str,
    pub chunks: usize,
    pub vocabulary: usize,
}

/// Shared, swappable handle on the current index.
pub struct KnowledgeBase {
    state: RwLock<IndexState>,
    chunker: Chunker,
}

impl KnowledgeBase {
    pub fn new(chunker: Chunker) -> Self {
        Self {
            state: RwLock::new(IndexState::Uninitialized),
            chunker,
        }
    }

    /// The ready index, or `None` when chat must stay fallback-only.
    pub async fn snapshot(&self) -> Option<Arc<Index>> {
        match &*self.state.read().await {
            IndexState::Ready(index) => Some(index.clone()),
            IndexState::Uninitialized | IndexState::Empty => None,
        }
    }

    pub async fn state(&self) -> IndexState {
        self.state.read().await.clone()
    }

    pub async fn status(&self) -> KnowledgeStatus {
        match &*self.state.read().await {
            IndexState::Uninitialized => KnowledgeStatus {
                state: "uninitialized",
                chunks: 0,
                vocabulary: 0,
            },
            IndexState::Empty => KnowledgeStatus {
                state: "empty",
                chunks: 0,
                vocabulary: 0,
            },
            IndexState::Ready(index) => KnowledgeStatus {
                state: "ready",
                chunks: index.len(),
                vocabulary: index.vocabulary().len(),
            },
        }
    }

    /// Swap in an index built elsewhere (e.g. loaded from disk).
    pub async fn install(&self, index: Index) {
        *self.state.write().await = IndexState::Ready(Arc::new(index));
    }

    /// Chunk `documents`, build a fresh index on the blocking pool and swap it
    /// in. An empty corpus switches the knowledge base to `Empty`; a
    /// cancelled build leaves the previous state in place.
    pub async fn rebuild(
        &self,
        documents: Vec<Document>,
        cancel: Arc<AtomicBool>,
    ) -> Result<KnowledgeStatus, IndexError> {
        let chunker = self.chunker.clone();
        let built = tokio::task::spawn_blocking(move || {
            let chunks = chunker.chunk_all(&documents);
            tracing::info!(
                documents = documents.len(),
                chunks = chunks.len(),
                "Chunked corpus"
            );
            Index::build_with_cancel(chunks, &cancel)
        })
        .await
        .map_err(|e| IndexError::Persist(format!("index build task failed: {e}")))?;

        match built {
            Ok(index) => {
                *self.state.write().await = IndexState::Ready(Arc::new(index));
            }
            Err(IndexError::EmptyCorpus) => {
                tracing::warn!("No chunks to index; chat will use fallback responses only");
                *self.state.write().await = IndexState::Empty;
            }
            Err(e) => return Err(e),
        }

        Ok(self.status().await)
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new(Chunker::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ingest, DocumentKind, RawDocument, StaticSource};
    use std::sync::atomic::Ordering;

    fn documents(texts: &[&str]) -> Vec<Document> {
        let raws = texts
            .iter()
            .enumerate()
            .map(|(i, t)| RawDocument::new(*t, format!("doc{i}.txt"), DocumentKind::PlainText))
            .collect();
        ingest(&StaticSource::new(raws)).documents
    }

    #[tokio::test]
    async fn test_starts_uninitialized() {
        let kb = KnowledgeBase::default();
        assert!(kb.snapshot().await.is_none());
        assert_eq!(kb.status().await.state, "uninitialized");
    }

    #[tokio::test]
    async fn test_rebuild_ready() {
        let kb = KnowledgeBase::default();
        let status = kb
            .rebuild(
                documents(&["Slow breathing calms anxiety.", "Sleep hygiene matters."]),
                Arc::new(AtomicBool::new(false)),
            )
            .await
            .unwrap();
        assert_eq!(status.state, "ready");
        assert_eq!(status.chunks, 2);
        assert!(kb.snapshot().await.is_some());
    }

    #[tokio::test]
    async fn test_rebuild_empty_corpus_switches_to_empty() {
        let kb = KnowledgeBase::default();
        let status = kb
            .rebuild(Vec::new(), Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        assert_eq!(status.state, "empty");
        assert!(kb.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_rebuild_swaps_without_touching_old_snapshot() {
        let kb = KnowledgeBase::default();
        let cancel = Arc::new(AtomicBool::new(false));
        kb.rebuild(documents(&["Gratitude lists help."]), cancel.clone())
            .await
            .unwrap();
        let old = kb.snapshot().await.unwrap();

        kb.rebuild(
            documents(&["Grounding uses the five senses.", "Walks reduce stress."]),
            cancel,
        )
        .await
        .unwrap();
        let new = kb.snapshot().await.unwrap();

        assert_eq!(old.len(), 1);
        assert!(old.vocabulary().position("gratitude").is_some());
        assert_eq!(new.len(), 2);
        assert!(new.vocabulary().position("gratitude").is_none());
    }

    #[tokio::test]
    async fn test_cancelled_rebuild_keeps_previous_index() {
        let kb = KnowledgeBase::default();
        kb.rebuild(documents(&["Journaling helps."]), Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        let cancel = Arc::new(AtomicBool::new(false));
        cancel.store(true, Ordering::Relaxed);
        let result = kb.rebuild(documents(&["Other text entirely."]), cancel).await;
        assert!(matches!(result, Err(IndexError::Cancelled)));
        let index = kb.snapshot().await.unwrap();
        assert!(index.vocabulary().position("journaling").is_some());
    }
}
