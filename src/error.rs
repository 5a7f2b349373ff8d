//! Error taxonomy for resolution and configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Per-record resolution errors. None of these abort a batch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("no pipe matched: {0}")]
    NoMatch(String),

    #[error("ambiguous match for '{query}': {candidates:?}")]
    Ambiguous {
        query: String,
        candidates: Vec<String>,
    },

    #[error("invalid coordinates: {0}")]
    InvalidCoordinate(String),

    #[error("insufficient locality context: {0}")]
    SparseData(String),

    #[error("gazetteer unavailable ({store}): {message}")]
    GazetteerUnavailable { store: String, message: String },

    #[error("cache entry '{key}' failed validation: {reason}")]
    CacheInconsistency { key: String, reason: String },

    /// Input a pipe recognized but cannot attempt.
    #[error("malformed locality: {0}")]
    Malformed(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl ResolveError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NoMatch(_) => FailureKind::NoMatch,
            Self::Ambiguous { .. } => FailureKind::Ambiguous,
            Self::InvalidCoordinate(_) => FailureKind::InvalidCoordinate,
            Self::SparseData(_) => FailureKind::SparseData,
            Self::GazetteerUnavailable { .. } => FailureKind::GazetteerUnavailable,
            Self::CacheInconsistency { .. } => FailureKind::CacheInconsistency,
            Self::Malformed(_) => FailureKind::Malformed,
            Self::InvalidGeometry(_) => FailureKind::InvalidGeometry,
        }
    }

    pub fn unavailable(store: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::GazetteerUnavailable {
            store: store.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoMatch,
    Ambiguous,
    InvalidCoordinate,
    SparseData,
    GazetteerUnavailable,
    CacheInconsistency,
    Malformed,
    InvalidGeometry,
}

/// Serializable failure recorded on a job entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureCause {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ResolveError> for FailureCause {
    fn from(err: &ResolveError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Batch-fatal configuration and startup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("ordered_field_list: {0}")]
    FieldList(String),

    #[error("store {store} unreachable at startup: {message}")]
    StoreUnreachable { store: String, message: String },

    #[error("invalid option: {0}")]
    Invalid(String),
}
