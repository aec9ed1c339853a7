//! Embedding-based scorer
//!
//! The engine asks the backend once per run whether it is available. An
//! unavailable backend means every pair is scored lexically and tagged
//! `string-fallback`; it is never an error.

use crate::errors::{DocGraphError, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

/// Capability-checked embedding strategy
pub trait EmbeddingBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Whether embeddings can be produced at all
    fn is_available(&self) -> bool;

    /// Length of every vector returned by [`EmbeddingBackend::embed`]
    fn dimensions(&self) -> usize;

    /// Observe the corpus before embedding (IDF statistics and the like)
    fn fit(&mut self, _corpus: &[&str]) -> Result<()> {
        Ok(())
    }

    /// Embed normalized document text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Backend used when no embedding model is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmbeddingBackend;

impl EmbeddingBackend for NoopEmbeddingBackend {
    fn name(&self) -> &str {
        "noop"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(DocGraphError::embedding("no embedding backend configured"))
    }
}

/// Feature-hashed TF-IDF vectors.
///
/// Each token lands in a SHA-256-derived bucket with a derived sign, weighted
/// by `(1 + ln tf) · idf`, where `idf = ln((N + 1) / (df + 1)) + 1` is taken
/// from the fitted corpus. Vectors are L2-normalized.
#[derive(Debug, Clone)]
pub struct HashedTfIdfEmbedder {
    dimensions: usize,
    documents: usize,
    df: HashMap<String, usize>,
}

impl HashedTfIdfEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            documents: 0,
            df: HashMap::new(),
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let df = self.df.get(term).copied().unwrap_or(0);
        ((self.documents as f64 + 1.0) / (df as f64 + 1.0)).ln() + 1.0
    }

    fn bucket(&self, term: &str) -> (usize, f64) {
        let digest = Sha256::digest(term.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(bytes);
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        ((hash % self.dimensions as u64) as usize, sign)
    }
}

impl Default for HashedTfIdfEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EmbeddingBackend for HashedTfIdfEmbedder {
    fn name(&self) -> &str {
        "hashed-tfidf"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn fit(&mut self, corpus: &[&str]) -> Result<()> {
        self.documents = corpus.len();
        self.df.clear();
        for text in corpus {
            let unique: BTreeSet<String> = tokenize(text).into_iter().collect();
            for term in unique {
                *self.df.entry(term).or_insert(0) += 1;
            }
        }
        tracing::debug!(
            documents = self.documents,
            vocabulary = self.df.len(),
            "Fitted hashed TF-IDF embedder"
        );
        Ok(())
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut tf: HashMap<String, usize> = HashMap::new();
        for token in tokenize(text) {
            *tf.entry(token).or_insert(0) += 1;
        }

        let mut vector = vec![0.0f64; self.dimensions];
        for (term, count) in &tf {
            let (idx, sign) = self.bucket(term);
            vector[idx] += sign * (1.0 + (*count as f64).ln()) * self.idf(term);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector.into_iter().map(|x| x as f32).collect())
    }
}

/// Cosine similarity clamped to `[0, 1]`; mismatched or zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| s.len() >= 2)
        .filter(|s| !is_stop_word(s))
        .map(str::to_string)
        .collect()
}

fn is_stop_word(word: &str) -> bool {
    const STOP_WORDS: &[&str] = &[
        "the", "be", "to", "of", "and", "in", "that", "have", "it", "for", "not", "on", "with",
        "as", "you", "do", "at", "this", "but", "by", "from", "they", "we", "or", "an", "will",
        "all", "would", "there", "their", "what", "so", "if", "about", "which", "when", "can",
        "no", "just", "into", "your", "some", "could", "them", "other", "than", "then", "now",
        "only", "its", "also", "after", "how", "our", "any", "these", "most", "us", "is", "was",
        "are", "been", "being", "were", "am", "should", "must", "may",
    ];

    STOP_WORDS.contains(&word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stop_words_and_short_tokens() {
        assert_eq!(
            tokenize("Run the tests, then a CI build."),
            vec!["run".to_string(), "tests".to_string(), "ci".to_string(), "build".to_string()]
        );
    }

    #[test]
    fn test_noop_backend_is_unavailable() {
        let backend = NoopEmbeddingBackend;
        assert!(!backend.is_available());
        assert!(backend.embed("anything").is_err());
    }

    #[test]
    fn test_embeddings_are_normalized_and_deterministic() {
        let mut embedder = HashedTfIdfEmbedder::new(64);
        embedder
            .fit(&["deploy the release pipeline", "write unit tests"])
            .unwrap();
        let a = embedder.embed("deploy the release pipeline").unwrap();
        let b = embedder.embed("deploy the release pipeline").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_orders_related_text_higher() {
        let mut embedder = HashedTfIdfEmbedder::new(256);
        let corpus = [
            "configure the release pipeline workflow",
            "release pipeline workflow configuration steps",
            "architecture overview of storage modules",
        ];
        embedder.fit(&corpus).unwrap();
        let vectors: Vec<Vec<f32>> = corpus.iter().map(|t| embedder.embed(t).unwrap()).collect();
        let related = cosine_similarity(&vectors[0], &vectors[1]);
        let unrelated = cosine_similarity(&vectors[0], &vectors[2]);
        assert!(related > unrelated, "{related} <= {unrelated}");
        assert!((0.0..=1.0).contains(&related));
        assert!((cosine_similarity(&vectors[2], &vectors[2]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }
}
