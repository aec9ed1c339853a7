//! Analysis configuration
//!
//! Parsed from TOML by the caller-facing layer (the CLI owns file discovery).
//! Invalid values are fatal: `validate()` runs before any document is read.

use crate::errors::{DocGraphError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use wildmatch::WildMatch;

/// Which scorer(s) the similarity engine runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    #[default]
    String,
    Semantic,
    Both,
}

/// How the string scorer aggregates block scores into a document score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringMode {
    /// One ratio over the concatenated normalized text
    #[default]
    WholeDocument,
    /// Mean of each block's best match, averaged over both directions
    BestBlockAverage,
}

/// Normalization applied to the score matrix before thresholding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixNormalization {
    #[default]
    None,
    MinMax,
    ZScore,
}

/// Historical directory move: references under `from` now live under `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathAlias {
    pub from: String,
    pub to: String,
}

/// Root configuration for a documentation analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Scorer selection for the similarity engine
    #[serde(default)]
    pub similarity_method: SimilarityMethod,

    /// Minimum score for a pair to count as a duplicate / cluster edge
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Whether clusters are derived from the thresholded matrix
    #[serde(default = "default_clustering_enabled")]
    pub clustering_enabled: bool,

    /// Documents larger than this are skipped with a warning
    #[serde(default = "default_max_document_size_mb")]
    pub max_document_size_mb: f64,

    /// Glob patterns (relative to the root) excluded from the corpus
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Aggregation used by the string scorer
    #[serde(default)]
    pub string_mode: StringMode,

    /// Score matrix normalization
    #[serde(default)]
    pub normalization: MatrixNormalization,

    /// Prefix rewrites for directories that moved
    #[serde(default)]
    pub path_aliases: Vec<PathAlias>,

    /// Prefixes that documents commonly prepend to repo paths (e.g. `codex-rs/`)
    #[serde(default)]
    pub strip_prefixes: Vec<String>,

    /// Vector size for the bundled hashed TF-IDF embedder
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
}

fn default_similarity_threshold() -> f64 {
    0.85
}

fn default_clustering_enabled() -> bool {
    true
}

fn default_max_document_size_mb() -> f64 {
    2.0
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "target/*".to_string(),
        "node_modules/*".to_string(),
        ".git/*".to_string(),
    ]
}

fn default_embedding_dimensions() -> usize {
    256
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            similarity_method: SimilarityMethod::default(),
            similarity_threshold: default_similarity_threshold(),
            clustering_enabled: default_clustering_enabled(),
            max_document_size_mb: default_max_document_size_mb(),
            exclude_patterns: default_exclude_patterns(),
            string_mode: StringMode::default(),
            normalization: MatrixNormalization::default(),
            path_aliases: Vec::new(),
            strip_prefixes: Vec::new(),
            embedding_dimensions: default_embedding_dimensions(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DocGraphError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: AnalysisConfig = toml::from_str(contents)
            .map_err(|e| DocGraphError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let threshold = self.similarity_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(DocGraphError::config(format!(
                "similarity_threshold must be within 0..=1, got {threshold}"
            )));
        }

        let size = self.max_document_size_mb;
        if !size.is_finite() || size <= 0.0 {
            return Err(DocGraphError::config(format!(
                "max_document_size_mb must be positive, got {size}"
            )));
        }

        if let Some(pattern) = self.exclude_patterns.iter().find(|p| p.trim().is_empty()) {
            return Err(DocGraphError::config(format!(
                "exclude_patterns contains an empty pattern: {pattern:?}"
            )));
        }

        if self.embedding_dimensions == 0 {
            return Err(DocGraphError::config("embedding_dimensions must be at least 1"));
        }

        for alias in &self.path_aliases {
            if alias.from.trim().is_empty() {
                return Err(DocGraphError::config(
                    "path_aliases entries need a non-empty `from` prefix",
                ));
            }
        }

        if self.clustering_enabled && threshold < 0.5 {
            tracing::warn!(
                threshold,
                "Low similarity threshold with transitive clustering; unrelated documents may chain into one cluster"
            );
        }

        Ok(())
    }

    /// Size cap in bytes
    pub fn max_document_bytes(&self) -> u64 {
        (self.max_document_size_mb * 1024.0 * 1024.0) as u64
    }

    /// Compiled exclusion globs
    pub fn exclude_matchers(&self) -> Vec<WildMatch> {
        self.exclude_patterns
            .iter()
            .map(|p| WildMatch::new(p.trim()))
            .collect()
    }

    /// Whether semantic scoring was requested at all
    pub fn wants_semantic(&self) -> bool {
        matches!(
            self.similarity_method,
            SimilarityMethod::Semantic | SimilarityMethod::Both
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.similarity_method, SimilarityMethod::String);
        assert_eq!(cfg.similarity_threshold, 0.85);
        assert!(cfg.clustering_enabled);
        assert_eq!(cfg.max_document_bytes(), 2 * 1024 * 1024);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            similarity_threshold = 0.9
        "#;

        let cfg = AnalysisConfig::parse(toml).expect("should parse");
        assert_eq!(cfg.similarity_threshold, 0.9);
        // Defaults should be applied
        assert_eq!(cfg.embedding_dimensions, 256);
        assert_eq!(cfg.string_mode, StringMode::WholeDocument);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            similarity_method = "both"
            similarity_threshold = 0.75
            clustering_enabled = false
            max_document_size_mb = 0.5
            exclude_patterns = ["archive/*", "*.draft.md"]
            string_mode = "best_block_average"
            normalization = "z_score"
            strip_prefixes = ["codex-rs/"]
            embedding_dimensions = 64

            [[path_aliases]]
            from = "docs/old"
            to = "docs/new"
        "#;

        let cfg = AnalysisConfig::parse(toml).expect("should parse");
        assert_eq!(cfg.similarity_method, SimilarityMethod::Both);
        assert!(cfg.wants_semantic());
        assert!(!cfg.clustering_enabled);
        assert_eq!(cfg.string_mode, StringMode::BestBlockAverage);
        assert_eq!(cfg.normalization, MatrixNormalization::ZScore);
        assert_eq!(cfg.path_aliases.len(), 1);
        assert_eq!(cfg.path_aliases[0].to, "docs/new");
        assert_eq!(cfg.exclude_matchers().len(), 2);
    }

    #[test]
    fn test_threshold_out_of_range_is_fatal() {
        let err = AnalysisConfig::parse("similarity_threshold = 1.5").unwrap_err();
        assert!(err.category().is_fatal());
        assert!(err.to_string().contains("similarity_threshold"));

        let err = AnalysisConfig::parse("similarity_threshold = -0.1").unwrap_err();
        assert!(err.category().is_fatal());
    }

    #[test]
    fn test_non_positive_size_cap_is_fatal() {
        let err = AnalysisConfig::parse("max_document_size_mb = 0.0").unwrap_err();
        assert!(err.to_string().contains("max_document_size_mb"));
    }

    #[test]
    fn test_empty_exclude_pattern_is_fatal() {
        let err = AnalysisConfig::parse(r#"exclude_patterns = ["  "]"#).unwrap_err();
        assert!(err.to_string().contains("exclude_patterns"));
    }

    #[test]
    fn test_unknown_method_is_fatal() {
        let err = AnalysisConfig::parse(r#"similarity_method = "telepathy""#).unwrap_err();
        assert!(err.category().is_fatal());
    }
}
