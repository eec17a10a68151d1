use crate::acl::AclRule;
use crate::error::BackendError;
use crate::types::Access;
use async_trait::async_trait;

/// Store interface for user records.
#[async_trait]
pub trait UserStore {
    /// Returns the stored password hash for a user, or `None` if unknown.
    async fn password_hash(&self, username: &str)
    -> std::result::Result<Option<String>, BackendError>;

    /// Returns whether a user is flagged as superuser.
    async fn is_superuser(&self, username: &str) -> std::result::Result<bool, BackendError>;
}

/// Store interface for ACL rows.
#[async_trait]
pub trait AclStore {
    /// Returns candidate rules for a user.
    ///
    /// Implementations return the user's own rules plus ownerless pattern
    /// rules. They may pre-filter on `access` but must not drop a rule that
    /// could grant it.
    async fn acl_rules(
        &self,
        username: &str,
        access: Access,
    ) -> std::result::Result<Vec<AclRule>, BackendError>;
}

/// Composite store trait.
pub trait CredentialStore: UserStore + AclStore + Send + Sync {}

impl<T> CredentialStore for T where T: UserStore + AclStore + Send + Sync {}
