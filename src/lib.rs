//! Authentication and topic ACL engine for MQTT brokers.
//!
//! This crate verifies client passwords against stored hashes, matches
//! topics against ACL patterns with MQTT wildcards and `%u`/`%c`
//! placeholders, and runs each check across an ordered chain of pluggable
//! async backends under an ANY or ALL policy. Decisions are fail-closed:
//! a backend error never grants access. Use [`Orchestrator`] for checks and
//! [`Cache`] implementations to memoize decisions.
//!
//! # Examples
//!
//! Authenticating against the in-memory store (enable `memory-store`):
//! ```no_run
//! use rs_mqtt_auth::{Access, AclRequest, AclRule, Credential, OrchestratorBuilder, Pbkdf2Hasher};
//! # #[cfg(feature = "memory-store")]
//! # {
//! use rs_mqtt_auth::MemoryStore;
//! let store = MemoryStore::new();
//! store.add_user("test", Pbkdf2Hasher::new().hash(b"testpw"), false);
//! store.add_rule(AclRule::owned("test", "test/topic/1", Access::Read));
//! let orchestrator = OrchestratorBuilder::new()
//!     .backend(store.into_backend())
//!     .build()
//!     .unwrap();
//! let _ = orchestrator.authenticate(&Credential::new("test", "testpw"));
//! let _ = orchestrator.check_acl(&AclRequest::new("test", "test/topic/1", "id", Access::Read));
//! # }
//! ```
//!
//! Creating a process-local cache (enable `memory-cache`):
//! ```no_run
//! # #[cfg(feature = "memory-cache")]
//! # {
//! use rs_mqtt_auth::MemoryCache;
//! use std::time::Duration;
//! let cache = MemoryCache::new(1024).with_ttl(Duration::from_secs(30));
//! # let _ = cache;
//! # }
//! ```
#![forbid(unsafe_code)]

mod acl;
mod backend;
mod cache;
mod config;
mod engine;
mod error;
mod hash;
mod store;
mod topic;
mod types;

#[cfg(feature = "memory-cache")]
mod memory_cache;

#[cfg(feature = "memory-store")]
mod memory_store;

#[cfg(feature = "file-backend")]
mod file_store;

#[cfg(feature = "jwt-backend")]
mod jwt;

pub use crate::acl::{AclRule, rules_permit};
pub use crate::backend::{Backend, BackendClosed, BackendKind, StoreBackend};
pub use crate::cache::{Cache, CacheKey, CheckKind, NoCache, SecretDigest};
pub use crate::config::Options;
pub use crate::engine::{Decision, Orchestrator, OrchestratorBuilder, Policy};
pub use crate::error::{BackendError, Error, Result};
pub use crate::hash::{
    HashAlgorithm, HashDescriptor, HashDigest, PasswordVerifier, Pbkdf2Hasher, SaltEncoding,
    verify_password,
};
pub use crate::store::{AclStore, CredentialStore, UserStore};
pub use crate::topic::{CLIENT_ID_PLACEHOLDER, USERNAME_PLACEHOLDER, substitute, topic_matches};
pub use crate::types::{Access, AclRequest, Credential};

#[cfg(feature = "memory-store")]
pub use crate::memory_store::MemoryStore;

#[cfg(feature = "memory-cache")]
pub use crate::memory_cache::MemoryCache;

#[cfg(feature = "file-backend")]
pub use crate::file_store::FileStore;

#[cfg(feature = "jwt-backend")]
pub use crate::jwt::{JwtBackend, UserField};
