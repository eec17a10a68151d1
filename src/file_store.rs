//! Flat-file credential store.
//!
//! Password file, one user per line:
//!
//! ```text
//! # comments and blank lines are ignored
//! test:PBKDF2$sha512$100000$os24lcPr9cJt2QDVWssblQ==$BK1B...
//! ```
//!
//! ACL file, mosquitto style:
//!
//! ```text
//! topic read public/#
//! pattern readwrite users/%u/#
//! user test
//! topic read test/topic/1
//! topic test/private
//! ```
//!
//! `topic` lines before the first `user` line and every `pattern` line apply
//! to all users. A lone token after `topic` or `pattern` is the topic, granted
//! `readwrite`. `deny` rules are rejected. Comments must start the line; `#`
//! elsewhere is part of the topic.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::acl::AclRule;
use crate::backend::{BackendKind, StoreBackend};
use crate::config::Options;
use crate::error::{BackendError, Error, Result};
use crate::hash::PasswordVerifier;
use crate::store::{AclStore, UserStore};
use crate::types::Access;

/// Store loaded from a password file and an optional ACL file.
#[derive(Debug, Clone, Default)]
pub struct FileStore {
    passwords: HashMap<String, String>,
    rules: HashMap<String, Vec<AclRule>>,
    shared_rules: Vec<AclRule>,
}

impl FileStore {
    /// Parses password and ACL file contents.
    pub fn parse(passwords: &str, acl: Option<&str>) -> Result<Self> {
        let mut store = Self {
            passwords: parse_passwords(passwords)?,
            ..Self::default()
        };
        if let Some(acl) = acl {
            store.load_acl(acl)?;
        }
        Ok(store)
    }

    /// Loads the files named by `files_password_path` (mandatory) and
    /// `files_acl_path` (optional).
    pub fn from_options(opts: &Options) -> Result<Self> {
        let passwords = read_file(opts.required("files_password_path")?)?;
        let acl = opts.get("files_acl_path").map(read_file).transpose()?;
        Self::parse(&passwords, acl.as_deref())
    }

    /// Builds a backend named `files`, honoring `hasher_salt_encoding`.
    pub fn backend_from_options(opts: &Options) -> Result<StoreBackend<Self>> {
        let verifier = PasswordVerifier::from_options(opts)?;
        Ok(StoreBackend::new("files", BackendKind::Files, Self::from_options(opts)?)
            .with_verifier(verifier))
    }

    /// Number of users with a password entry.
    pub fn user_count(&self) -> usize {
        self.passwords.len()
    }

    fn load_acl(&mut self, contents: &str) -> Result<()> {
        let mut current_user: Option<String> = None;

        for (index, raw) in contents.lines().enumerate() {
            let line = strip_comment(raw);
            if line.is_empty() {
                continue;
            }
            let line_no = index + 1;
            let (keyword, rest) = line
                .split_once(char::is_whitespace)
                .map(|(keyword, rest)| (keyword, rest.trim()))
                .unwrap_or((line, ""));

            match keyword {
                "user" => {
                    if rest.is_empty() {
                        return Err(Error::InvalidRule(format!(
                            "acl line {line_no}: `user` needs a username"
                        )));
                    }
                    current_user = Some(rest.to_string());
                }
                "topic" | "pattern" => {
                    let (permission, pattern) = parse_rule_body(rest, line_no)?;
                    match current_user.as_deref().filter(|_| keyword == "topic") {
                        Some(user) => self
                            .rules
                            .entry(user.to_string())
                            .or_default()
                            .push(AclRule::owned(user, pattern, permission)),
                        None => self
                            .shared_rules
                            .push(AclRule::shared(pattern, permission)),
                    }
                }
                other => {
                    return Err(Error::InvalidRule(format!(
                        "acl line {line_no}: unknown keyword `{other}`"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn read_file(path: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: Path::new(path).to_path_buf(),
        source,
    })
}

fn strip_comment(line: &str) -> &str {
    let line = line.trim();
    if line.starts_with('#') { "" } else { line }
}

fn parse_passwords(contents: &str) -> Result<HashMap<String, String>> {
    let mut passwords = HashMap::new();
    for (index, raw) in contents.lines().enumerate() {
        let line = strip_comment(raw);
        if line.is_empty() {
            continue;
        }
        let Some((username, hash)) = line.split_once(':') else {
            return Err(Error::Config(format!(
                "password line {}: expected `username:hash`",
                index + 1
            )));
        };
        let (username, hash) = (username.trim(), hash.trim());
        if username.is_empty() || hash.is_empty() {
            return Err(Error::Config(format!(
                "password line {}: empty username or hash",
                index + 1
            )));
        }
        passwords.insert(username.to_string(), hash.to_string());
    }
    Ok(passwords)
}

fn parse_rule_body(rest: &str, line_no: usize) -> Result<(Access, String)> {
    if rest.is_empty() {
        return Err(Error::InvalidRule(format!(
            "acl line {line_no}: missing topic"
        )));
    }
    // A single token is the topic itself, granted readwrite.
    let Some((first, remainder)) = rest
        .split_once(char::is_whitespace)
        .map(|(first, remainder)| (first, remainder.trim()))
    else {
        return Ok((Access::ReadWrite, rest.to_string()));
    };

    match first {
        "read" | "write" | "readwrite" => Ok((first.parse()?, remainder.to_string())),
        "deny" => Err(Error::InvalidRule(format!(
            "acl line {line_no}: `deny` rules are not supported"
        ))),
        other => Err(Error::InvalidRule(format!(
            "acl line {line_no}: invalid access type `{other}`"
        ))),
    }
}

#[async_trait]
impl UserStore for FileStore {
    async fn password_hash(
        &self,
        username: &str,
    ) -> std::result::Result<Option<String>, BackendError> {
        Ok(self.passwords.get(username).cloned())
    }

    async fn is_superuser(&self, _username: &str) -> std::result::Result<bool, BackendError> {
        Ok(false)
    }
}

#[async_trait]
impl AclStore for FileStore {
    async fn acl_rules(
        &self,
        username: &str,
        access: Access,
    ) -> std::result::Result<Vec<AclRule>, BackendError> {
        Ok(self
            .rules
            .get(username)
            .into_iter()
            .flatten()
            .chain(self.shared_rules.iter())
            .filter(|rule| rule.permission.grants(access))
            .cloned()
            .collect())
    }
}
