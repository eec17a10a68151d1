use std::path::PathBuf;
use thiserror::Error;

/// Backend-layer error type.
///
/// Adapters return this for connectivity or query failures only. A missing
/// user or an empty rule set is a normal negative answer, not an error.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Stored password hash could not be parsed.
    #[error("malformed password hash: {0}")]
    MalformedHash(String),
    /// A backend failed while answering a check.
    #[error("backend {backend} unavailable: {source}")]
    BackendUnavailable {
        backend: String,
        #[source]
        source: BackendError,
    },
    /// Invalid ACL rule input.
    #[error("invalid acl rule: {0}")]
    InvalidRule(String),
    /// File could not be read during backend construction.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn missing_option(key: &str) -> Self {
        Self::Config(format!("missing mandatory option `{key}`"))
    }
}
