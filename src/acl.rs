use crate::error::{Error, Result};
use crate::topic::topic_matches;
use crate::types::{Access, AclRequest};

/// Stored ACL rule.
///
/// Rules with an `owner` apply to that username only. Ownerless rules apply
/// to every user, which is how `%u`/`%c` pattern rules are shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AclRule {
    /// Owning username, or `None` for rules shared by all users.
    pub owner: Option<String>,
    /// Topic pattern, possibly containing wildcards and placeholders.
    pub pattern: String,
    /// Granted access.
    pub permission: Access,
}

impl AclRule {
    /// Creates a rule owned by `owner`.
    pub fn owned(owner: impl Into<String>, pattern: impl Into<String>, permission: Access) -> Self {
        Self {
            owner: Some(owner.into()),
            pattern: pattern.into(),
            permission,
        }
    }

    /// Creates a rule shared by every user.
    pub fn shared(pattern: impl Into<String>, permission: Access) -> Self {
        Self {
            owner: None,
            pattern: pattern.into(),
            permission,
        }
    }

    /// Creates a rule from a stored permission bitmask.
    pub fn from_row(owner: Option<String>, pattern: impl Into<String>, mask: u8) -> Result<Self> {
        let pattern = pattern.into();
        if pattern.contains('\0') {
            return Err(Error::InvalidRule(
                "topic pattern must not contain NUL".to_string(),
            ));
        }
        Ok(Self {
            owner,
            pattern,
            permission: Access::from_mask(mask)?,
        })
    }

    /// Returns whether this rule is in effect for `username`.
    pub fn applies_to(&self, username: &str) -> bool {
        self.owner.as_deref().is_none_or(|owner| owner == username)
    }

    /// Returns whether this rule permits `request`.
    pub fn permits(&self, request: &AclRequest) -> bool {
        self.applies_to(&request.username)
            && self.permission.grants(request.access)
            && topic_matches(
                &self.pattern,
                &request.topic,
                &request.username,
                &request.client_id,
            )
    }
}

/// Returns whether any rule permits `request`.
pub fn rules_permit<'a, I>(rules: I, request: &AclRequest) -> bool
where
    I: IntoIterator<Item = &'a AclRule>,
{
    rules.into_iter().any(|rule| rule.permits(request))
}
