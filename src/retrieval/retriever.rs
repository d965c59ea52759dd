// MindHarbor - Similarity retriever
//
// Ranks every indexed chunk against a query by cosine similarity, keeps the
// best `k` and drops anything at or below the relevance floor.

use super::chunker::Chunk;
use super::index::{Index, SparseVector};

/// Hits scoring at or below this are noise, not grounding.
pub const MIN_RELEVANCE: f64 = 0.1;

/// Default number of chunks fed into a prompt.
pub const DEFAULT_TOP_K: usize = 3;

/// A ranked chunk borrowed from the index it came from.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub chunk: &'a Chunk,
    pub score: f64,
}

/// Cosine similarity, defined as 0 when either vector has zero norm.
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> f64 {
    let denom = a.norm() * b.norm();
    if denom == 0.0 {
        0.0
    } else {
        a.dot(b) / denom
    }
}

/// Top-`k` chunks for `query` using the fixed relevance floor.
pub fn retrieve<'a>(index: &'a Index, query: &str, k: usize) -> Vec<SearchHit<'a>> {
    retrieve_with_floor(index, query, k, MIN_RELEVANCE)
}

/// Top-`k` chunks for `query`, sorted by score descending, keeping only
/// scores strictly above `min_score`. Truncation to `k` happens before the
/// floor is applied, so fewer than `k` hits (or none) is normal.
pub fn retrieve_with_floor<'a>(
    index: &'a Index,
    query: &str,
    k: usize,
    min_score: f64,
) -> Vec<SearchHit<'a>> {
    let query_vector = index.vectorize_query(query);

    let mut scored: Vec<SearchHit<'a>> = index
        .entries()
        .iter()
        .map(|entry| SearchHit {
            chunk: &entry.chunk,
            score: cosine_similarity(&query_vector, &entry.vector),
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let hits: Vec<SearchHit<'a>> = scored
        .into_iter()
        .take(k)
        .filter(|hit| hit.score > min_score)
        .collect();

    tracing::debug!(
        query_terms = query_vector.entries().len(),
        hits = hits.len(),
        best = hits.first().map(|h| h.score).unwrap_or(0.0),
        "Retrieved chunks"
    );

    hits
}
