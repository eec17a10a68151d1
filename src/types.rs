use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Access kind requested by a client, or granted by an ACL rule.
///
/// The numeric values follow the usual ACL table bitmask:
/// `1 = read`, `2 = write`, `3 = read + write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Access {
    /// Subscribe / receive.
    Read,
    /// Publish.
    Write,
    /// Both directions.
    ReadWrite,
}

impl Access {
    /// Parses a stored permission bitmask.
    pub fn from_mask(mask: u8) -> Result<Self> {
        match mask {
            1 => Ok(Self::Read),
            2 => Ok(Self::Write),
            3 => Ok(Self::ReadWrite),
            other => Err(Error::InvalidRule(format!(
                "permission mask must be 1, 2 or 3, got {other}"
            ))),
        }
    }

    /// Returns the bitmask value.
    pub fn mask(self) -> u8 {
        match self {
            Self::Read => 1,
            Self::Write => 2,
            Self::ReadWrite => 3,
        }
    }

    /// Returns whether this granted permission covers `requested`.
    pub fn grants(self, requested: Access) -> bool {
        self == Self::ReadWrite || self == requested
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "readwrite",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Access {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "read" | "1" => Ok(Self::Read),
            "write" | "2" => Ok(Self::Write),
            "readwrite" | "3" => Ok(Self::ReadWrite),
            other => Err(Error::InvalidRule(format!("unknown access kind `{other}`"))),
        }
    }
}

/// Username/password pair presented at connect time.
///
/// The secret is wiped from memory on drop and never shown by `Debug`.
#[derive(Clone)]
pub struct Credential {
    identity: String,
    secret: Zeroizing<Vec<u8>>,
}

impl Credential {
    /// Creates a credential from an identity and raw secret bytes.
    pub fn new(identity: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            identity: identity.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    /// Returns the username.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns the raw secret.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// One authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AclRequest {
    /// Requesting username.
    pub username: String,
    /// Topic (or subscription filter) being published to or subscribed on.
    pub topic: String,
    /// MQTT client identifier.
    pub client_id: String,
    /// Requested access.
    pub access: Access,
}

impl AclRequest {
    /// Creates a request.
    pub fn new(
        username: impl Into<String>,
        topic: impl Into<String>,
        client_id: impl Into<String>,
        access: Access,
    ) -> Self {
        Self {
            username: username.into(),
            topic: topic.into(),
            client_id: client_id.into(),
            access,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readwrite_grants_both_directions() {
        assert!(Access::ReadWrite.grants(Access::Read));
        assert!(Access::ReadWrite.grants(Access::Write));
        assert!(Access::Read.grants(Access::Read));
        assert!(!Access::Read.grants(Access::Write));
        assert!(!Access::Write.grants(Access::ReadWrite));
    }

    #[test]
    fn from_mask_rejects_out_of_range() {
        assert_eq!(Access::from_mask(3).unwrap(), Access::ReadWrite);
        assert!(matches!(Access::from_mask(0), Err(Error::InvalidRule(_))));
        assert!(matches!(Access::from_mask(4), Err(Error::InvalidRule(_))));
    }

    #[test]
    fn credential_debug_hides_secret() {
        let credential = Credential::new("test", "testpw");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("test"));
        assert!(!rendered.contains("testpw"));
    }
}
