use crate::acl::rules_permit;
use crate::error::BackendError;
use crate::hash::PasswordVerifier;
use crate::store::CredentialStore;
use crate::types::{AclRequest, Credential};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::debug;

/// Storage technology behind a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BackendKind {
    Postgres,
    Mysql,
    Redis,
    Http,
    Jwt,
    Files,
    Memory,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Redis => "redis",
            Self::Http => "http",
            Self::Jwt => "jwt",
            Self::Files => "files",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform contract every credential backend exposes.
///
/// `Ok(false)` is a normal negative answer (unknown user, no matching rule).
/// `Err` means the backend could not answer; the orchestrator treats it as
/// an abstention.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name used in logs and decision provenance.
    fn name(&self) -> &str;

    /// Storage technology.
    fn kind(&self) -> BackendKind;

    /// Checks a username/password pair.
    async fn authenticate(&self, credential: &Credential)
    -> std::result::Result<bool, BackendError>;

    /// Returns whether a user bypasses ACL checks.
    async fn is_superuser(&self, username: &str) -> std::result::Result<bool, BackendError>;

    /// Checks a topic access request.
    async fn check_acl(&self, request: &AclRequest) -> std::result::Result<bool, BackendError>;

    /// Releases resources. Must be idempotent.
    async fn close(&self);
}

/// Returned by a backend used after [`Backend::close`].
#[derive(Debug, Error)]
#[error("backend {0} is closed")]
pub struct BackendClosed(pub String);

/// Backend built from a [`CredentialStore`].
///
/// The store only fetches rows; hash verification and topic matching happen
/// here so every store shares the same semantics.
#[derive(Debug)]
pub struct StoreBackend<S> {
    name: String,
    kind: BackendKind,
    store: S,
    verifier: PasswordVerifier,
    closed: AtomicBool,
}

impl<S> StoreBackend<S> {
    /// Wraps a store.
    pub fn new(name: impl Into<String>, kind: BackendKind, store: S) -> Self {
        Self {
            name: name.into(),
            kind,
            store,
            verifier: PasswordVerifier::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Sets the password verifier.
    pub fn with_verifier(mut self, verifier: PasswordVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// Returns the wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn ensure_open(&self) -> std::result::Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Box::new(BackendClosed(self.name.clone())));
        }
        Ok(())
    }
}

#[async_trait]
impl<S> Backend for StoreBackend<S>
where
    S: CredentialStore,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> std::result::Result<bool, BackendError> {
        self.ensure_open()?;
        let Some(stored) = self.store.password_hash(credential.identity()).await? else {
            debug!(backend = %self.name, username = credential.identity(), "user not found");
            return Ok(false);
        };
        Ok(self.verifier.verify(credential.secret(), &stored))
    }

    async fn is_superuser(&self, username: &str) -> std::result::Result<bool, BackendError> {
        self.ensure_open()?;
        self.store.is_superuser(username).await
    }

    async fn check_acl(&self, request: &AclRequest) -> std::result::Result<bool, BackendError> {
        self.ensure_open()?;
        let rules = self
            .store
            .acl_rules(&request.username, request.access)
            .await?;
        Ok(rules_permit(&rules, request))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(backend = %self.name, "backend closed");
        }
    }
}
