//! Doc-graph error types
//!
//! Only configuration problems are fatal. Anomalies about individual
//! documents (malformed blocks, broken references, oversized files) are
//! recorded as report data and never surface through this type.

use std::path::Path;
use thiserror::Error;

/// Error category for structured logging and behavior mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid analysis options, vocabularies, manifest, or root path
    ConfigError,
    /// Filesystem failures while discovering or reading the corpus
    IoError,
    /// Embedding backend failures
    EmbeddingError,
    /// Unexpected logic bugs
    InternalError,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::EmbeddingError => "EMBEDDING_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether the run must stop before any document is processed
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigError)
    }
}

/// Doc-graph error with category and context
#[derive(Debug, Error)]
pub enum DocGraphError {
    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("io error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DocGraphError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::ConfigError,
            Self::Io { .. } => ErrorCategory::IoError,
            Self::Embedding { .. } => ErrorCategory::EmbeddingError,
            Self::Internal { .. } => ErrorCategory::InternalError,
        }
    }

    /// Whether the run must stop before any document is processed
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error for a path
    pub fn io_with_source(
        path: &Path,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io {
            message: format!("failed to access {}", path.display()),
            source: Some(Box::new(source)),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }
}

impl Clone for DocGraphError {
    fn clone(&self) -> Self {
        match self {
            Self::Config { message, .. } => Self::Config {
                message: message.clone(),
                source: None,
            },
            Self::Io { message, .. } => Self::Io {
                message: message.clone(),
                source: None,
            },
            Self::Embedding { message, .. } => Self::Embedding {
                message: message.clone(),
                source: None,
            },
            Self::Internal { message, .. } => Self::Internal {
                message: message.clone(),
                source: None,
            },
        }
    }
}

/// Result type for doc-graph operations
pub type Result<T> = std::result::Result<T, DocGraphError>;
