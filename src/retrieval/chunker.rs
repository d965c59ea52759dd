// MindHarbor - Corpus chunker
//
// Splits document text into bounded, overlapping windows. Paragraph breaks
// are tried first, then line breaks, sentence ends and spaces; only text with
// none of those falls back to hard character windows. Sizes are counted in
// characters, not bytes.

use crate::ingest::Document;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Boundaries tried in order, coarsest first.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// A bounded slice of a document's text; the unit the index vectorizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    /// Citation metadata only; never vectorized.
    pub source_label: String,
    pub text: String,
    pub ordinal: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl Chunker {
    /// `overlap` is clamped below `chunk_size` so windows always advance.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split one document into ordered chunks. Empty text yields none.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(document.text())
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| Chunk {
                document_id: document.id().to_string(),
                source_label: document.source_label().to_string(),
                text,
                ordinal,
            })
            .collect()
    }

    /// Chunk a whole corpus, preserving document order.
    pub fn chunk_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|doc| self.chunk(doc)).collect()
    }

    /// Split raw text into window strings of at most `chunk_size` characters.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let Some(pos) = separators.iter().position(|sep| text.contains(sep)) else {
            return self.window_split(text);
        };
        let separator = separators[pos];
        let finer = &separators[pos + 1..];

        let mut out = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in text.split(separator).filter(|p| !p.is_empty()) {
            if char_len(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge_splits(&fitting, separator));
                fitting.clear();
            }
            out.extend(self.split_recursive(piece, finer));
        }

        if !fitting.is_empty() {
            out.extend(self.merge_splits(&fitting, separator));
        }

        out
    }

    /// Greedily pack pieces into windows, carrying up to `overlap` characters
    /// of trailing pieces into the next window.
    fn merge_splits(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut out = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joined_len = |current: &VecDeque<&str>, total: usize| {
                total + len + if current.is_empty() { 0 } else { sep_len }
            };

            if joined_len(&current, total) > self.chunk_size && !current.is_empty() {
                push_window(&mut out, &current, separator);

                while total > self.overlap
                    || (joined_len(&current, total) > self.chunk_size && total > 0)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if current.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + if current.is_empty() { 0 } else { sep_len };
            current.push_back(piece);
        }

        push_window(&mut out, &current, separator);
        out
    }

    /// Fixed-size character windows for text without any usable boundary.
    fn window_split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.overlap;
        let mut out = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            let window = window.trim();
            if !window.is_empty() {
                out.push(window.to_string());
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }

        out
    }
}

fn push_window(out: &mut Vec<String>, pieces: &VecDeque<&str>, separator: &str) {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ingest, DocumentKind, RawDocument, StaticSource};

    fn doc(text: &str) -> Document {
        let source = StaticSource::new(vec![RawDocument::new(text, "test.txt", DocumentKind::PlainText)]);
        ingest(&source).documents.remove(0)
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk(&doc("Breathing exercises help reduce anxiety."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].text, "Breathing exercises help reduce anxiety.");
        assert_eq!(chunks[0].source_label, "test.txt");
    }

    #[test]
    fn test_empty_text_no_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.split_text("").is_empty());
        assert!(chunker.split_text(" \n\n ").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let chunker = Chunker::new(100, 20);
        let text = "Grounding techniques bring attention back to the present moment. "
            .repeat(30);
        let chunks = chunker.split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(char_len(c) <= 100, "chunk too long: {}", char_len(c));
        }
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let chunker = Chunker::new(60, 10);
        let text = "First paragraph about sleep.\n\nSecond paragraph about stress.\n\nThird one on mood.";
        let chunks = chunker.split_text(text);
        assert_eq!(
            chunks,
            vec![
                "First paragraph about sleep.\n\nSecond paragraph about stress.",
                "Third one on mood."
            ]
        );
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let chunker = Chunker::new(50, 20);
        let words: Vec<String> = (0..40).map(|i| format!("w{:02}", i)).collect();
        let text = words.join(" ");
        let chunks = chunker.split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(
                pair[1].contains(last_word),
                "{:?} does not overlap {:?}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn test_unbroken_text_uses_character_windows() {
        let chunker = Chunker::new(10, 4);
        let chunks = chunker.split_text("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "ghijklmnop");
        assert_eq!(chunks.last().unwrap(), "stuvwxyz");
        for c in &chunks {
            assert!(char_len(c) <= 10);
        }
    }

    #[test]
    fn test_multibyte_text_counted_in_chars() {
        let chunker = Chunker::new(5, 1);
        let chunks = chunker.split_text("ééééééééé");
        assert!(chunks.iter().all(|c| char_len(c) <= 5));
        assert_eq!(chunks[0], "ééééé");
    }

    #[test]
    fn test_ordinals_contiguous() {
        let chunker = Chunker::new(40, 5);
        let text = "Sleep matters. ".repeat(20);
        let chunks = chunker.chunk(&doc(&text));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i);
        }
    }

    #[test]
    fn test_overlap_clamped() {
        let chunker = Chunker::new(10, 50);
        assert_eq!(chunker.overlap(), 9);
    }
}
