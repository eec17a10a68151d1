use crate::engine::Decision;
use crate::types::{Access, AclRequest, Credential};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fmt;

/// Kind of check a cached decision answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Auth,
    Superuser,
    Acl,
}

/// SHA-256 of a presented secret. Shown redacted.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecretDigest([u8; 32]);

impl fmt::Debug for SecretDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretDigest(<redacted>)")
    }
}

/// Request fingerprint used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Authentication; bound to the presented secret so a cached success
    /// cannot be replayed with another password.
    Auth {
        username: String,
        secret: SecretDigest,
    },
    /// Superuser lookup.
    Superuser { username: String },
    /// Topic access check.
    Acl {
        username: String,
        topic: String,
        client_id: String,
        access: Access,
    },
}

impl CacheKey {
    pub fn auth(credential: &Credential) -> Self {
        let digest = Sha256::new()
            .chain_update(credential.identity().as_bytes())
            .chain_update([0u8])
            .chain_update(credential.secret())
            .finalize();
        Self::Auth {
            username: credential.identity().to_string(),
            secret: SecretDigest(digest.into()),
        }
    }

    pub fn superuser(username: &str) -> Self {
        Self::Superuser {
            username: username.to_string(),
        }
    }

    pub fn acl(request: &AclRequest) -> Self {
        Self::Acl {
            username: request.username.clone(),
            topic: request.topic.clone(),
            client_id: request.client_id.clone(),
            access: request.access,
        }
    }

    pub fn kind(&self) -> CheckKind {
        match self {
            Self::Auth { .. } => CheckKind::Auth,
            Self::Superuser { .. } => CheckKind::Superuser,
            Self::Acl { .. } => CheckKind::Acl,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Self::Auth { username, .. }
            | Self::Superuser { username }
            | Self::Acl { username, .. } => username,
        }
    }
}

/// Cache interface for decisions.
///
/// Implementations must not hold internal locks across calls; the engine
/// queries backends between `get` and `set`.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns a live cached decision.
    async fn get(&self, key: &CacheKey) -> Option<Decision>;

    /// Stores a decision.
    async fn set(&self, key: CacheKey, decision: Decision);

    /// Drops every decision cached for a user.
    async fn invalidate_user(&self, username: &str);

    /// Drops everything.
    async fn clear(&self);
}

/// No-op cache implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl Cache for NoCache {
    async fn get(&self, _key: &CacheKey) -> Option<Decision> {
        None
    }

    async fn set(&self, _key: CacheKey, _decision: Decision) {}

    async fn invalidate_user(&self, _username: &str) {}

    async fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_key_depends_on_secret() {
        let right = CacheKey::auth(&Credential::new("test", "testpw"));
        let again = CacheKey::auth(&Credential::new("test", "testpw"));
        let wrong = CacheKey::auth(&Credential::new("test", "wrong_password"));
        assert_eq!(right, again);
        assert_ne!(right, wrong);
        assert!(!format!("{right:?}").contains("testpw"));
    }

    #[test]
    fn acl_key_covers_every_request_field() {
        let base = AclRequest::new("test", "a/b", "c1", Access::Read);
        let mut other_client = base.clone();
        other_client.client_id = "c2".to_string();
        let mut other_access = base.clone();
        other_access.access = Access::Write;

        assert_ne!(CacheKey::acl(&base), CacheKey::acl(&other_client));
        assert_ne!(CacheKey::acl(&base), CacheKey::acl(&other_access));
        assert_eq!(CacheKey::acl(&base).kind(), CheckKind::Acl);
        assert_eq!(CacheKey::acl(&base).username(), "test");
    }
}
