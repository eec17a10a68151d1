use crate::backend::Backend;
use crate::cache::{Cache, CacheKey, NoCache};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::types::{AclRequest, Credential};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

/// Authorization decision with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    allowed: bool,
    backend: Option<String>,
}

impl Decision {
    /// Grant, optionally naming the backend that granted it.
    pub fn allow(backend: Option<String>) -> Self {
        Self {
            allowed: true,
            backend,
        }
    }

    /// Denial, optionally naming the backend that denied it.
    pub fn deny(backend: Option<String>) -> Self {
        Self {
            allowed: false,
            backend,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Backend that decided, if a single backend did.
    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }
}

impl From<Decision> for bool {
    fn from(decision: Decision) -> Self {
        decision.allowed
    }
}

/// How answers from several backends combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Policy {
    /// First backend to allow wins; failures are skipped.
    #[default]
    Any,
    /// Every backend must allow; a failure denies.
    All,
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            other => Err(Error::Config(format!(
                "unknown policy `{other}`, expected `any` or `all`"
            ))),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Any => "any",
            Self::All => "all",
        })
    }
}

enum Check<'a> {
    Auth(&'a Credential),
    Superuser(&'a str),
    Acl(&'a AclRequest),
}

impl Check<'_> {
    fn label(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Superuser(_) => "superuser",
            Self::Acl(_) => "acl",
        }
    }

    fn username(&self) -> &str {
        match self {
            Self::Auth(credential) => credential.identity(),
            Self::Superuser(username) => *username,
            Self::Acl(request) => &request.username,
        }
    }
}

struct Outcome {
    decision: Decision,
    abstained: bool,
}

/// Multi-backend orchestrator with pluggable decision cache.
pub struct Orchestrator<C = NoCache> {
    backends: Vec<Arc<dyn Backend>>,
    cache: C,
    auth_policy: Policy,
    superuser_policy: Policy,
    acl_policy: Policy,
    check_superuser: bool,
    closed: AtomicBool,
}

impl<C: fmt::Debug> fmt::Debug for Orchestrator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.backends.iter().map(|backend| backend.name()).collect();
        f.debug_struct("Orchestrator")
            .field("backends", &names)
            .field("cache", &self.cache)
            .field("auth_policy", &self.auth_policy)
            .field("superuser_policy", &self.superuser_policy)
            .field("acl_policy", &self.acl_policy)
            .field("check_superuser", &self.check_superuser)
            .finish()
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder<C = NoCache> {
    backends: Vec<Arc<dyn Backend>>,
    cache: C,
    auth_policy: Policy,
    superuser_policy: Policy,
    acl_policy: Policy,
    check_superuser: bool,
}

impl OrchestratorBuilder<NoCache> {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            cache: NoCache,
            auth_policy: Policy::Any,
            superuser_policy: Policy::Any,
            acl_policy: Policy::Any,
            check_superuser: true,
        }
    }
}

impl Default for OrchestratorBuilder<NoCache> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> OrchestratorBuilder<C> {
    /// Appends a backend. Backends are consulted in the order added.
    pub fn backend<B: Backend + 'static>(self, backend: B) -> Self {
        self.shared_backend(Arc::new(backend))
    }

    /// Appends an already shared backend.
    pub fn shared_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Sets the policy for all three checks.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.auth_policy = policy;
        self.superuser_policy = policy;
        self.acl_policy = policy;
        self
    }

    pub fn auth_policy(mut self, policy: Policy) -> Self {
        self.auth_policy = policy;
        self
    }

    pub fn superuser_policy(mut self, policy: Policy) -> Self {
        self.superuser_policy = policy;
        self
    }

    pub fn acl_policy(mut self, policy: Policy) -> Self {
        self.acl_policy = policy;
        self
    }

    /// Enables or disables the superuser bypass for ACL checks.
    pub fn check_superuser(mut self, on: bool) -> Self {
        self.check_superuser = on;
        self
    }

    /// Applies `policy`, `auth_policy`, `superuser_policy`, `acl_policy` and
    /// `check_superuser` from options.
    pub fn apply_options(mut self, opts: &Options) -> Result<Self> {
        if let Some(policy) = opts.get("policy") {
            self = self.policy(policy.parse()?);
        }
        self.auth_policy = opts.parse_or("auth_policy", self.auth_policy)?;
        self.superuser_policy = opts.parse_or("superuser_policy", self.superuser_policy)?;
        self.acl_policy = opts.parse_or("acl_policy", self.acl_policy)?;
        self.check_superuser = opts.flag_or("check_superuser", self.check_superuser)?;
        Ok(self)
    }

    /// Sets the cache implementation.
    pub fn cache<C2: Cache>(self, cache: C2) -> OrchestratorBuilder<C2> {
        OrchestratorBuilder {
            backends: self.backends,
            cache,
            auth_policy: self.auth_policy,
            superuser_policy: self.superuser_policy,
            acl_policy: self.acl_policy,
            check_superuser: self.check_superuser,
        }
    }

    /// Builds the orchestrator. Fails when no backend was added.
    pub fn build(self) -> Result<Orchestrator<C>> {
        if self.backends.is_empty() {
            return Err(Error::Config(
                "at least one backend must be configured".to_string(),
            ));
        }

        Ok(Orchestrator {
            backends: self.backends,
            cache: self.cache,
            auth_policy: self.auth_policy,
            superuser_policy: self.superuser_policy,
            acl_policy: self.acl_policy,
            check_superuser: self.check_superuser,
            closed: AtomicBool::new(false),
        })
    }
}

impl<C> Orchestrator<C>
where
    C: Cache,
{
    /// Authenticates a username/password pair.
    pub async fn authenticate(&self, credential: &Credential) -> Decision {
        self.decide(
            CacheKey::auth(credential),
            self.auth_policy,
            Check::Auth(credential),
        )
        .await
    }

    /// Returns whether a user is a superuser.
    pub async fn is_superuser(&self, username: &str) -> Decision {
        self.decide(
            CacheKey::superuser(username),
            self.superuser_policy,
            Check::Superuser(username),
        )
        .await
    }

    /// Checks topic access. Superusers are allowed without consulting ACLs
    /// unless the bypass is disabled.
    pub async fn check_acl(&self, request: &AclRequest) -> Decision {
        if self.check_superuser {
            let superuser = self.is_superuser(&request.username).await;
            if superuser.is_allowed() {
                debug!(
                    username = %request.username,
                    topic = %request.topic,
                    "acl granted to superuser"
                );
                return superuser;
            }
        }
        self.decide(CacheKey::acl(request), self.acl_policy, Check::Acl(request))
            .await
    }

    /// Drops every cached decision for a user.
    pub async fn invalidate_user(&self, username: &str) {
        self.cache.invalidate_user(username).await;
    }

    /// Closes every backend and clears the cache. Later checks deny.
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for backend in &self.backends {
            backend.close().await;
        }
        self.cache.clear().await;
        debug!(backends = self.backends.len(), "orchestrator shut down");
    }

    /// Returns whether [`Orchestrator::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the configured backends in consultation order.
    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    async fn decide(&self, key: CacheKey, policy: Policy, check: Check<'_>) -> Decision {
        if self.is_shut_down() {
            return Decision::deny(None);
        }

        if let Some(cached) = self.cache.get(&key).await {
            trace!(check = check.label(), username = check.username(), "cache hit");
            return cached;
        }

        let outcome = self.evaluate(policy, &check).await;
        debug!(
            check = check.label(),
            username = check.username(),
            %policy,
            allowed = outcome.decision.is_allowed(),
            backend = outcome.decision.backend().unwrap_or("-"),
            "decision"
        );

        // A denial caused by an unreachable backend is not worth remembering.
        if outcome.decision.is_allowed() || !outcome.abstained {
            self.cache.set(key, outcome.decision.clone()).await;
        }
        outcome.decision
    }

    async fn evaluate(&self, policy: Policy, check: &Check<'_>) -> Outcome {
        let mut abstained = false;

        for backend in &self.backends {
            let answer = match check {
                Check::Auth(credential) => backend.authenticate(credential).await,
                Check::Superuser(username) => backend.is_superuser(username).await,
                Check::Acl(request) => backend.check_acl(request).await,
            };

            match (answer, policy) {
                (Ok(true), Policy::Any) => {
                    return Outcome {
                        decision: Decision::allow(Some(backend.name().to_string())),
                        abstained,
                    };
                }
                (Ok(true), Policy::All) => {}
                (Ok(false), Policy::Any) => {}
                (Ok(false), Policy::All) => {
                    return Outcome {
                        decision: Decision::deny(Some(backend.name().to_string())),
                        abstained,
                    };
                }
                (Err(source), policy) => {
                    let err = Error::BackendUnavailable {
                        backend: backend.name().to_string(),
                        source,
                    };
                    warn!(
                        check = check.label(),
                        username = check.username(),
                        error = %err,
                        "backend abstained"
                    );
                    abstained = true;
                    if policy == Policy::All {
                        return Outcome {
                            decision: Decision::deny(Some(backend.name().to_string())),
                            abstained,
                        };
                    }
                }
            }
        }

        let decision = match policy {
            Policy::Any => Decision::deny(None),
            Policy::All => Decision::allow(None),
        };
        Outcome {
            decision,
            abstained,
        }
    }
}
