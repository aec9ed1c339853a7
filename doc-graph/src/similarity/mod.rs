//! Document similarity: lexical and semantic scoring, matrix clustering
//!
//! Both scorers honour one contract: `score(a, b)` lies in `[0, 1]`, is
//! symmetric, and is exactly 1 for identical normalized text.

pub mod matrix;
pub mod semantic;
pub mod string;

pub use matrix::{Cluster, ScoreMatrix};
pub use semantic::{EmbeddingBackend, HashedTfIdfEmbedder, NoopEmbeddingBackend, cosine_similarity};
pub use string::{StringScorer, fuzzy_ratio};

use crate::config::{AnalysisConfig, MatrixNormalization, SimilarityMethod};
use crate::document::ParsedDocument;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;

/// Which scorer produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreMethod {
    String,
    Semantic,
    /// Semantic scoring was requested but unavailable
    StringFallback,
}

impl ScoreMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Semantic => "semantic",
            Self::StringFallback => "string-fallback",
        }
    }
}

/// Similarity of one document pair; `a < b` lexicographically
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub a: String,
    pub b: String,
    pub score: f64,
    pub method: ScoreMethod,
    /// `(block in a, block in b)` pairs from best-block scoring
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched_blocks: Vec<(usize, usize)>,
}

impl SimilarityResult {
    /// Orders the pair (and the matched block pairs with it)
    pub fn new(
        first: &str,
        second: &str,
        score: f64,
        method: ScoreMethod,
        matched_blocks: Vec<(usize, usize)>,
    ) -> Self {
        let score = score.clamp(0.0, 1.0);
        if first <= second {
            Self {
                a: first.to_string(),
                b: second.to_string(),
                score,
                method,
                matched_blocks,
            }
        } else {
            Self {
                a: second.to_string(),
                b: first.to_string(),
                score,
                method,
                matched_blocks: matched_blocks.into_iter().map(|(x, y)| (y, x)).collect(),
            }
        }
    }
}

/// Scoring input: normalized text, whole and per block
#[derive(Debug, Clone, PartialEq)]
pub struct ComparableDocument {
    pub path: String,
    pub text: String,
    /// `(block index, normalized text)` for non-empty blocks
    pub blocks: Vec<(usize, String)>,
}

impl ComparableDocument {
    pub fn new(path: impl Into<String>, blocks: Vec<(usize, String)>) -> Self {
        let blocks: Vec<(usize, String)> =
            blocks.into_iter().filter(|(_, t)| !t.trim().is_empty()).collect();
        let text = blocks
            .iter()
            .map(|(_, t)| t.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            path: path.into(),
            text,
            blocks,
        }
    }

    pub fn from_parsed(doc: &ParsedDocument) -> Self {
        Self::new(
            doc.path.clone(),
            doc.blocks
                .iter()
                .enumerate()
                .map(|(i, b)| (i, b.normalized.clone()))
                .collect(),
        )
    }
}

/// Everything one similarity run produces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityOutcome {
    pub results: Vec<SimilarityResult>,
    /// Matrix used for clustering (after normalization)
    pub matrix: ScoreMatrix,
    pub clusters: Vec<Cluster>,
    /// Semantic scoring was requested but the backend was unavailable
    pub semantic_fallback: bool,
}

/// Pairwise scoring and clustering over a fixed document set
pub struct SimilarityEngine {
    method: SimilarityMethod,
    threshold: f64,
    clustering_enabled: bool,
    normalization: MatrixNormalization,
    string: StringScorer,
    backend: Box<dyn EmbeddingBackend>,
}

impl std::fmt::Debug for SimilarityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityEngine")
            .field("method", &self.method)
            .field("threshold", &self.threshold)
            .field("clustering_enabled", &self.clustering_enabled)
            .field("normalization", &self.normalization)
            .field("string", &self.string)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl SimilarityEngine {
    /// Engine configured from `config`; semantic methods get the bundled
    /// hashed TF-IDF embedder
    pub fn new(config: &AnalysisConfig) -> Self {
        let backend: Box<dyn EmbeddingBackend> = if config.wants_semantic() {
            Box::new(HashedTfIdfEmbedder::new(config.embedding_dimensions))
        } else {
            Box::new(NoopEmbeddingBackend)
        };
        Self {
            method: config.similarity_method,
            threshold: config.similarity_threshold,
            clustering_enabled: config.clustering_enabled,
            normalization: config.normalization,
            string: StringScorer::new(config.string_mode),
            backend,
        }
    }

    /// Swap in another embedding backend
    pub fn with_backend(mut self, backend: Box<dyn EmbeddingBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether a semantic method was requested and the backend can serve it
    pub fn semantic_available(&self) -> bool {
        !matches!(self.method, SimilarityMethod::String) && self.backend.is_available()
    }

    /// Score every pair, build the matrix and derive clusters
    pub fn analyze(&mut self, documents: &[ComparableDocument]) -> SimilarityOutcome {
        let paths: Vec<String> = documents.iter().map(|d| d.path.clone()).collect();
        let wants_semantic = !matches!(self.method, SimilarityMethod::String);
        let semantic_fallback = wants_semantic && !self.backend.is_available();
        if semantic_fallback {
            tracing::warn!(
                backend = self.backend.name(),
                "Embedding backend unavailable; falling back to string similarity"
            );
        }

        let embeddings = if wants_semantic && !semantic_fallback {
            self.embed_all(documents)
        } else {
            Vec::new()
        };

        let pairs: Vec<(usize, usize)> = (0..documents.len())
            .flat_map(|i| ((i + 1)..documents.len()).map(move |j| (i, j)))
            .collect();

        let scored: Vec<Vec<SimilarityResult>> = pairs
            .par_iter()
            .map(|&(i, j)| self.score_pair(documents, &embeddings, i, j, semantic_fallback))
            .collect();

        let mut matrix = ScoreMatrix::new(paths);
        for (&(i, j), results) in pairs.iter().zip(&scored) {
            let best = results.iter().map(|r| r.score).fold(0.0, f64::max);
            matrix.set(i, j, best);
        }
        let matrix = matrix.normalized(self.normalization);

        let clusters = if self.clustering_enabled {
            matrix.clusters(self.threshold)
        } else {
            Vec::new()
        };
        let chained = clusters.iter().filter(|c| c.chained).count();
        if chained > 0 {
            tracing::info!(
                chained,
                threshold = self.threshold,
                "Some clusters were joined transitively; members may fall below the threshold pairwise"
            );
        }

        let results: Vec<SimilarityResult> = scored.into_iter().flatten().collect();
        tracing::info!(
            documents = documents.len(),
            pairs = pairs.len(),
            clusters = clusters.len(),
            semantic_fallback,
            "Similarity analysis complete"
        );

        SimilarityOutcome {
            results,
            matrix,
            clusters,
            semantic_fallback,
        }
    }

    /// Results at or above the threshold, highest score first
    pub fn duplicate_pairs(&self, results: &[SimilarityResult]) -> Vec<SimilarityResult> {
        let mut pairs: Vec<SimilarityResult> = results
            .iter()
            .filter(|r| r.score >= self.threshold)
            .cloned()
            .collect();
        pairs.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| (&x.a, &x.b).cmp(&(&y.a, &y.b)))
                .then_with(|| x.method.as_str().cmp(y.method.as_str()))
        });
        pairs
    }

    /// `None` entries mark documents whose embedding failed
    fn embed_all(&mut self, documents: &[ComparableDocument]) -> Vec<Option<Vec<f32>>> {
        let corpus: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        if let Err(e) = self.backend.fit(&corpus) {
            tracing::warn!(
                error = %e,
                category = e.category().as_str(),
                "Embedding backend failed to fit; scoring pairs lexically"
            );
            return vec![None; documents.len()];
        }
        let backend = &self.backend;
        documents
            .par_iter()
            .map(|doc| match backend.embed(&doc.text) {
                Ok(vector) => Some(vector),
                Err(e) => {
                    tracing::warn!(path = %doc.path, error = %e, "Embedding failed; scoring lexically");
                    None
                }
            })
            .collect()
    }

    fn score_pair(
        &self,
        documents: &[ComparableDocument],
        embeddings: &[Option<Vec<f32>>],
        i: usize,
        j: usize,
        semantic_fallback: bool,
    ) -> Vec<SimilarityResult> {
        let (a, b) = (&documents[i], &documents[j]);
        // Keep orientation canonical so matched block pairs line up with (a, b)
        let (a, b) = if a.path <= b.path { (a, b) } else { (b, a) };
        let lexical = || self.string.compare(a, b);
        let semantic = || -> Option<f64> {
            if a.text == b.text {
                return Some(1.0);
            }
            let va = embeddings.get(i)?.as_ref()?;
            let vb = embeddings.get(j)?.as_ref()?;
            Some(cosine_similarity(va, vb))
        };

        match self.method {
            SimilarityMethod::String => {
                let (score, matched) = lexical();
                vec![SimilarityResult::new(&a.path, &b.path, score, ScoreMethod::String, matched)]
            }
            SimilarityMethod::Semantic => match semantic().filter(|_| !semantic_fallback) {
                Some(score) => vec![SimilarityResult::new(
                    &a.path,
                    &b.path,
                    score,
                    ScoreMethod::Semantic,
                    Vec::new(),
                )],
                None => {
                    let (score, matched) = lexical();
                    vec![SimilarityResult::new(
                        &a.path,
                        &b.path,
                        score,
                        ScoreMethod::StringFallback,
                        matched,
                    )]
                }
            },
            SimilarityMethod::Both => {
                let (score, matched) = lexical();
                let mut out = vec![SimilarityResult::new(
                    &a.path,
                    &b.path,
                    score,
                    ScoreMethod::String,
                    matched,
                )];
                match semantic().filter(|_| !semantic_fallback) {
                    Some(score) => out.push(SimilarityResult::new(
                        &a.path,
                        &b.path,
                        score,
                        ScoreMethod::Semantic,
                        Vec::new(),
                    )),
                    None => {
                        if let Some(first) = out.first_mut() {
                            first.method = ScoreMethod::StringFallback;
                        }
                    }
                }
                out
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
