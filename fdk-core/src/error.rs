//! Error types with clear, actionable messages
//!
//! Three layers:
//! - [`SourceError`]: what a remote source reports for a single request
//! - [`StorageError`]: failures of the persistence substrate
//! - [`CatalogError`]: what callers of the cache coordinator, search engine
//!   and service facade see

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by a [`crate::source::RemoteSource`] for a single request
///
/// Cloneable so one in-flight fetch result can be handed to every
/// de-duplicated waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The upstream catalog does not know this object
    #[error("Object '{id}' does not exist in the remote catalog")]
    NotFound { id: String },

    /// The upstream catalog could not be reached or answered with a server error
    #[error("Remote catalog unavailable: {message}")]
    Unavailable { message: String },

    /// The request did not complete in time
    #[error("Remote catalog request timed out: {message}")]
    Timeout { message: String },

    /// The upstream answered with something we cannot use
    #[error("Invalid response from remote catalog: {message}")]
    InvalidResponse { message: String },
}

impl SourceError {
    /// Whether retrying the same request may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SourceError::Unavailable { .. } | SourceError::Timeout { .. }
        )
    }
}

/// Failures of the persistence substrate
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to write cache record to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove cache record {path}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read cache directory {path}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize cache record '{key}'")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Refusing to store invalid record: {reason}")]
    InvalidRecord { reason: String },
}

/// Errors surfaced by the cache coordinator and the operations built on it
///
/// Cloneable for the same reason as [`SourceError`]: one de-duplicated fetch
/// resolves every waiter with the same outcome.
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    /// The object exists neither in the local store nor upstream
    #[error("Catalog object '{id}' not found")]
    NotFound { id: String },

    /// Fetching a single object failed after exhausting retries
    #[error("Failed to fetch catalog object '{id}' after {attempts} attempt(s): {source}")]
    Fetch {
        id: String,
        attempts: u32,
        #[source]
        source: SourceError,
    },

    /// Fetching the summary listing failed after exhausting retries
    #[error("Failed to refresh catalog listing after {attempts} attempt(s): {source}")]
    Refresh {
        attempts: u32,
        #[source]
        source: SourceError,
    },

    /// Local persistence failed; not retried
    #[error(transparent)]
    Storage(Arc<StorageError>),

    /// Malformed request parameters, rejected before any I/O
    #[error("Invalid request: {0}")]
    Validation(String),
}

impl From<StorageError> for CatalogError {
    fn from(err: StorageError) -> Self {
        CatalogError::Storage(Arc::new(err))
    }
}

impl CatalogError {
    pub fn validation(message: impl Into<String>) -> Self {
        CatalogError::Validation(message.into())
    }

    /// Whether the caller may retry the same operation later
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Fetch { source, .. } | CatalogError::Refresh { source, .. } => {
                source.is_retriable()
            }
            _ => false,
        }
    }

    /// Build the error for a single-object fetch that gave up
    pub(crate) fn from_fetch(id: &str, attempts: u32, source: SourceError) -> Self {
        match source {
            SourceError::NotFound { .. } => CatalogError::NotFound { id: id.to_string() },
            other => CatalogError::Fetch {
                id: id.to_string(),
                attempts,
                source: other,
            },
        }
    }
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;
