// MindHarbor - TF-IDF vector space index
//
// Built once from a chunk corpus and never patched: a corpus change means a
// fresh build. Vectors are stored sparsely as (term position, weight) pairs
// sorted by position; `to_dense` recovers the full |vocabulary|-length layout.

use super::chunker::Chunk;
use super::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("cannot build an index from an empty corpus")]
    EmptyCorpus,
    #[error("index build cancelled")]
    Cancelled,
    #[error("failed to persist index: {0}")]
    Persist(String),
}

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Term → dense position, assigned in first-seen order across the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    terms: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Vocabulary {
    fn new() -> Self {
        Self {
            terms: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Position of `term`, inserting it at the end if unseen.
    fn intern(&mut self, term: &str) -> usize {
        if let Some(&pos) = self.positions.get(term) {
            return pos;
        }
        let pos = self.terms.len();
        self.terms.push(term.to_string());
        self.positions.insert(term.to_string(), pos);
        pos
    }

    pub fn position(&self, term: &str) -> Option<usize> {
        self.positions.get(term).copied()
    }

    pub fn term(&self, position: usize) -> Option<&str> {
        self.terms.get(position).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

impl From<Vec<String>> for Vocabulary {
    fn from(terms: Vec<String>) -> Self {
        let mut vocab = Vocabulary::new();
        for term in &terms {
            vocab.intern(term);
        }
        vocab
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.terms
    }
}

// ---------------------------------------------------------------------------
// Vectors
// ---------------------------------------------------------------------------

/// A TF-IDF vector over a fixed vocabulary, zero entries omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(usize, f64)>,
    norm: f64,
}

impl SparseVector {
    /// Build from unordered (position, weight) pairs; zero weights are dropped.
    pub fn from_entries(mut entries: Vec<(usize, f64)>) -> Self {
        entries.retain(|&(_, w)| w != 0.0);
        entries.sort_by_key(|&(pos, _)| pos);
        let norm = entries.iter().map(|&(_, w)| w * w).sum::<f64>().sqrt();
        Self { entries, norm }
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn norm(&self) -> f64 {
        self.norm
    }

    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> f64 {
        self.entries
            .binary_search_by_key(&position, |&(pos, _)| pos)
            .map(|i| self.entries[i].1)
            .unwrap_or(0.0)
    }

    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (pa, wa) = self.entries[i];
            let (pb, wb) = other.entries[j];
            match pa.cmp(&pb) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wa * wb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Expand to the full `dim`-length layout.
    pub fn to_dense(&self, dim: usize) -> Vec<f64> {
        let mut dense = vec![0.0; dim];
        for &(pos, w) in &self.entries {
            if pos < dim {
                dense[pos] = w;
            }
        }
        dense
    }
}

/// (count / total) * idf for every counted position.
fn weigh(counts: &HashMap<usize, usize>, total_terms: usize, idf: &[f64]) -> SparseVector {
    if total_terms == 0 {
        return SparseVector::from_entries(Vec::new());
    }
    let entries = counts
        .iter()
        .map(|(&pos, &count)| (pos, (count as f64 / total_terms as f64) * idf[pos]))
        .collect();
    SparseVector::from_entries(entries)
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: SparseVector,
}

/// Vocabulary, IDF table and per-chunk vectors, built together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    vocabulary: Vocabulary,
    idf: Vec<f64>,
    entries: Vec<IndexedChunk>,
}

impl Index {
    /// Build an index over `chunks` in the order given.
    pub fn build(chunks: Vec<Chunk>) -> Result<Self, IndexError> {
        Self::build_with_cancel(chunks, &AtomicBool::new(false))
    }

    /// Like [`Index::build`], checking `cancel` between chunks.
    pub fn build_with_cancel(chunks: Vec<Chunk>, cancel: &AtomicBool) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }
        let total_chunks = chunks.len();

        // 1-2. Tokenize and assign vocabulary positions in first-seen order
        let mut vocabulary = Vocabulary::new();
        let mut chunk_terms: Vec<Vec<usize>> = Vec::with_capacity(total_chunks);
        for chunk in &chunks {
            if cancel.load(Ordering::Relaxed) {
                return Err(IndexError::Cancelled);
            }
            let positions = tokenize(&chunk.text)
                .iter()
                .map(|t| vocabulary.intern(t))
                .collect();
            chunk_terms.push(positions);
        }

        // 3. Chunk frequency per term; `seen_in` marks the last chunk counted
        let mut chunk_freq = vec![0usize; vocabulary.len()];
        let mut seen_in = vec![usize::MAX; vocabulary.len()];
        for (i, terms) in chunk_terms.iter().enumerate() {
            for &pos in terms {
                if seen_in[pos] != i {
                    seen_in[pos] = i;
                    chunk_freq[pos] += 1;
                }
            }
        }
        let idf: Vec<f64> = chunk_freq
            .iter()
            .map(|&df| (total_chunks as f64 / df as f64).ln())
            .collect();

        // 4. One TF-IDF vector per chunk
        let mut entries = Vec::with_capacity(total_chunks);
        for (chunk, terms) in chunks.into_iter().zip(chunk_terms) {
            if cancel.load(Ordering::Relaxed) {
                return Err(IndexError::Cancelled);
            }
            let mut counts: HashMap<usize, usize> = HashMap::new();
            for &pos in &terms {
                *counts.entry(pos).or_insert(0) += 1;
            }
            let vector = weigh(&counts, terms.len(), &idf);
            entries.push(IndexedChunk { chunk, vector });
        }

        tracing::info!(
            chunks = total_chunks,
            vocabulary = vocabulary.len(),
            "Built TF-IDF index"
        );

        Ok(Self {
            vocabulary,
            idf,
            entries,
        })
    }

    /// Vectorize a query against the existing vocabulary. Unknown terms are
    /// dropped but still count toward the query length.
    pub fn vectorize_query(&self, query: &str) -> SparseVector {
        let tokens = tokenize(query);
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for token in &tokens {
            if let Some(pos) = self.vocabulary.position(token) {
                *counts.entry(pos).or_insert(0) += 1;
            }
        }
        weigh(&counts, tokens.len(), &self.idf)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// IDF of a term, if it is in the vocabulary.
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.vocabulary.position(term).map(|pos| self.idf[pos])
    }

    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a built index.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Save the index to a JSON file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load an index from a JSON file, rejecting an empty or inconsistent one.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let index: Self = serde_json::from_str(&json)?;
        if index.entries.is_empty() {
            return Err(IndexError::EmptyCorpus.into());
        }
        if index.idf.len() != index.vocabulary.len() {
            return Err(IndexError::Persist(format!(
                "idf table has {} entries for {} terms",
                index.idf.len(),
                index.vocabulary.len()
            ))
            .into());
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, ordinal: usize) -> Chunk {
        Chunk {
            document_id: "doc".into(),
            source_label: "doc.txt".into(),
            text: text.into(),
            ordinal,
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("breathing helps anxiety and breathing helps sleep", 0),
            chunk("journaling helps mood", 1),
            chunk("sleep routines help everyone", 2),
        ]
    }

    #[test]
    fn test_empty_corpus_rejected() {
        assert!(matches!(Index::build(Vec::new()), Err(IndexError::EmptyCorpus)));
    }

    #[test]
    fn test_vocabulary_first_seen_order() {
        let index = Index::build(corpus()).unwrap();
        let terms = index.vocabulary().terms();
        assert_eq!(
            &terms[..6],
            &["breathing", "helps", "anxiety", "and", "sleep", "journaling"]
        );
        assert_eq!(index.vocabulary().position("everyone"), Some(terms.len() - 1));
    }

    #[test]
    fn test_idf_values() {
        let index = Index::build(corpus()).unwrap();
        // helps: 2 of 3 chunks; anxiety: 1 of 3
        assert!((index.idf("helps").unwrap() - (3.0f64 / 2.0).ln()).abs() < 1e-12);
        assert!((index.idf("anxiety").unwrap() - 3.0f64.ln()).abs() < 1e-12);
        assert!(index.idf("missing").is_none());
    }

    #[test]
    fn test_term_in_every_chunk_has_zero_idf() {
        let chunks = vec![chunk("calm breath", 0), chunk("calm mind", 1)];
        let index = Index::build(chunks).unwrap();
        assert_eq!(index.idf("calm"), Some(0.0));
    }

    #[test]
    fn test_idf_monotonic_in_chunk_frequency() {
        let index = Index::build(corpus()).unwrap();
        // anxiety (1 chunk) > helps (2 chunks)
        assert!(index.idf("anxiety").unwrap() > index.idf("helps").unwrap());
    }

    #[test]
    fn test_tf_idf_weights() {
        let index = Index::build(corpus()).unwrap();
        let first = &index.entries()[0].vector;
        // "breathing" appears twice among 7 tokens of chunk 0
        let pos = index.vocabulary().position("breathing").unwrap();
        let expected = (2.0 / 7.0) * 3.0f64.ln();
        assert!((first.get(pos) - expected).abs() < 1e-12);
        // a term from another chunk contributes zero here
        let other = index.vocabulary().position("journaling").unwrap();
        assert_eq!(first.get(other), 0.0);
        assert_eq!(first.to_dense(index.vocabulary().len()).len(), index.vocabulary().len());
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = Index::build(corpus()).unwrap();
        let b = Index::build(corpus()).unwrap();
        assert_eq!(a.vocabulary(), b.vocabulary());
        for (x, y) in a.entries().iter().zip(b.entries()) {
            assert_eq!(x.vector, y.vector);
        }
    }

    #[test]
    fn test_chunk_without_terms_has_zero_vector() {
        let index = Index::build(vec![chunk("ok", 0), chunk("meditation practice", 1)]).unwrap();
        assert!(index.entries()[0].vector.is_zero());
        assert_eq!(index.entries()[0].vector.norm(), 0.0);
    }

    #[test]
    fn test_query_vector_drops_unknown_terms() {
        let index = Index::build(corpus()).unwrap();
        let q = index.vectorize_query("anxiety unicorns");
        assert_eq!(q.entries().len(), 1);
        let pos = index.vocabulary().position("anxiety").unwrap();
        // tf uses all query tokens, known or not
        assert!((q.get(pos) - 0.5 * 3.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_cancelled_build() {
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            Index::build_with_cancel(corpus(), &cancel),
            Err(IndexError::Cancelled)
        ));
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index").join("tfidf.json");
        let index = Index::build(corpus()).unwrap();
        index.save(&path).unwrap();

        let loaded = Index::load(&path).unwrap();
        assert_eq!(loaded.vocabulary(), index.vocabulary());
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.vocabulary().position("sleep"), index.vocabulary().position("sleep"));
    }

    #[test]
    fn test_sparse_dot() {
        let a = SparseVector::from_entries(vec![(3, 2.0), (0, 1.0)]);
        let b = SparseVector::from_entries(vec![(0, 4.0), (2, 5.0), (3, 1.0)]);
        assert_eq!(a.dot(&b), 6.0);
        assert_eq!(a.entries(), &[(0, 1.0), (3, 2.0)]);
    }
}
