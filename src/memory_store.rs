use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::acl::AclRule;
use crate::backend::{BackendKind, StoreBackend};
use crate::error::BackendError;
use crate::store::{AclStore, UserStore};
use crate::types::Access;

/// In-memory store implementation for tests and demos.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    users: RwLock<HashMap<String, UserRecord>>,
    rules: RwLock<HashMap<String, Vec<AclRule>>>,
    shared_rules: RwLock<Vec<AclRule>>,
}

#[derive(Debug, Clone)]
struct UserRecord {
    password_hash: String,
    superuser: bool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the store in a backend named `memory`.
    pub fn into_backend(self) -> StoreBackend<Self> {
        StoreBackend::new("memory", BackendKind::Memory, self)
    }

    /// Adds or replaces a user.
    pub fn add_user(
        &self,
        username: impl Into<String>,
        password_hash: impl Into<String>,
        superuser: bool,
    ) {
        let mut guard = self.inner.users.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(
            username.into(),
            UserRecord {
                password_hash: password_hash.into(),
                superuser,
            },
        );
    }

    /// Removes a user and its rules.
    pub fn remove_user(&self, username: &str) {
        self.inner
            .users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(username);
        self.inner
            .rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(username);
    }

    /// Adds a rule. Ownerless rules are shared by every user.
    pub fn add_rule(&self, rule: AclRule) {
        match rule.owner.clone() {
            Some(owner) => {
                let mut guard = self.inner.rules.write().unwrap_or_else(PoisonError::into_inner);
                guard.entry(owner).or_default().push(rule);
            }
            None => {
                let mut guard = self
                    .inner
                    .shared_rules
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                guard.push(rule);
            }
        }
    }

    /// Removes every rule.
    pub fn clear_rules(&self) {
        self.inner
            .rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner
            .shared_rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn password_hash(
        &self,
        username: &str,
    ) -> std::result::Result<Option<String>, BackendError> {
        let guard = self.inner.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(username).map(|user| user.password_hash.clone()))
    }

    async fn is_superuser(&self, username: &str) -> std::result::Result<bool, BackendError> {
        let guard = self.inner.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(username).is_some_and(|user| user.superuser))
    }
}

#[async_trait]
impl AclStore for MemoryStore {
    async fn acl_rules(
        &self,
        username: &str,
        access: Access,
    ) -> std::result::Result<Vec<AclRule>, BackendError> {
        let mut rules: Vec<AclRule> = {
            let guard = self.inner.rules.read().unwrap_or_else(PoisonError::into_inner);
            guard.get(username).cloned().unwrap_or_default()
        };
        {
            let guard = self
                .inner
                .shared_rules
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            rules.extend(guard.iter().cloned());
        }
        rules.retain(|rule| rule.permission.grants(access));
        Ok(rules)
    }
}
