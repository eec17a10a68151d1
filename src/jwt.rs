//! Token backend: the MQTT password field carries a JWT.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::backend::{Backend, BackendClosed, BackendKind};
use crate::config::Options;
use crate::error::{BackendError, Error, Result};
use crate::types::{AclRequest, Credential};
use tracing::debug;

/// Claim compared against the MQTT username.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserField {
    /// Standard `sub` claim.
    #[default]
    Subject,
    /// Custom `username` claim.
    Username,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct TokenClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl TokenClaims {
    fn user(&self, field: UserField) -> Option<&str> {
        match field {
            UserField::Subject => self.sub.as_deref(),
            UserField::Username => self.username.as_deref(),
        }
    }
}

/// Authenticates clients presenting an HMAC-signed JWT as password.
///
/// A token authenticates when its signature is valid, it has not expired and
/// its user claim equals the MQTT username. Tokens carry no superuser or ACL
/// information, so those checks always answer `false`.
pub struct JwtBackend {
    name: String,
    decoding_key: DecodingKey,
    validation: Validation,
    user_field: UserField,
    closed: AtomicBool,
}

impl fmt::Debug for JwtBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtBackend")
            .field("name", &self.name)
            .field("decoding_key", &"<redacted>")
            .field("validation", &self.validation)
            .field("user_field", &self.user_field)
            .finish()
    }
}

impl JwtBackend {
    /// Creates a backend validating HS256 tokens against `secret`.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            name: "jwt".to_string(),
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            user_field: UserField::Subject,
            closed: AtomicBool::new(false),
        }
    }

    /// Reads `jwt_secret` (mandatory), `jwt_userfield` and `jwt_algorithm`.
    pub fn from_options(opts: &Options) -> Result<Self> {
        let secret = opts.required("jwt_secret")?;
        let user_field = match opts.get("jwt_userfield") {
            None => UserField::Subject,
            Some(field) if field.eq_ignore_ascii_case("sub") => UserField::Subject,
            Some(field) if field.eq_ignore_ascii_case("username") => UserField::Username,
            Some(other) => {
                return Err(Error::Config(format!(
                    "invalid value for `jwt_userfield`: expected `sub` or `username`, got `{other}`"
                )));
            }
        };
        let algorithm = match opts.get("jwt_algorithm").unwrap_or("HS256") {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => {
                return Err(Error::Config(format!(
                    "invalid value for `jwt_algorithm`: expected HS256/HS384/HS512, got `{other}`"
                )));
            }
        };
        Ok(Self::new(secret.as_bytes())
            .with_user_field(user_field)
            .with_algorithm(algorithm))
    }

    pub fn with_user_field(mut self, user_field: UserField) -> Self {
        self.user_field = user_field;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.validation = Validation::new(algorithm);
        self
    }

    fn ensure_open(&self) -> std::result::Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Box::new(BackendClosed(self.name.clone())));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for JwtBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Jwt
    }

    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> std::result::Result<bool, BackendError> {
        self.ensure_open()?;
        let Ok(token) = std::str::from_utf8(credential.secret()) else {
            return Ok(false);
        };
        match decode::<TokenClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims.user(self.user_field) == Some(credential.identity())),
            Err(err) => {
                debug!(
                    username = credential.identity(),
                    reason = ?err.kind(),
                    "token rejected"
                );
                Ok(false)
            }
        }
    }

    async fn is_superuser(&self, _username: &str) -> std::result::Result<bool, BackendError> {
        self.ensure_open()?;
        Ok(false)
    }

    async fn check_acl(&self, _request: &AclRequest) -> std::result::Result<bool, BackendError> {
        self.ensure_open()?;
        Ok(false)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(serde::Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        username: &'a str,
        exp: u64,
    }

    fn token(sub: &str, username: &str, secret: &[u8], ttl_secs: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let claims = TestClaims {
            sub,
            username,
            exp: (now + ttl_secs) as u64,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn login(backend: &JwtBackend, username: &str, token: &str) -> bool {
        block_on(backend.authenticate(&Credential::new(username, token))).unwrap()
    }

    #[test]
    fn valid_token_for_matching_user_authenticates() {
        let backend = JwtBackend::new(b"secret");
        let good = token("test", "t", b"secret", 3600);

        assert!(login(&backend, "test", &good));
        assert!(!login(&backend, "other", &good));
    }

    #[test]
    fn bad_signature_or_expired_token_is_rejected() {
        let backend = JwtBackend::new(b"secret");
        assert!(!login(&backend, "test", &token("test", "t", b"other", 3600)));
        assert!(!login(&backend, "test", &token("test", "t", b"secret", -3600)));
        assert!(!login(&backend, "test", "not-a-token"));
    }

    #[test]
    fn username_claim_can_be_selected() {
        let opts = Options::new()
            .with("jwt_secret", "secret")
            .with("jwt_userfield", "username");
        let backend = JwtBackend::from_options(&opts).unwrap();
        let token = token("subject", "test", b"secret", 3600);

        assert!(login(&backend, "test", &token));
        assert!(!login(&backend, "subject", &token));
    }

    #[test]
    fn from_options_validates_settings() {
        assert!(matches!(
            JwtBackend::from_options(&Options::new()),
            Err(Error::Config(_))
        ));
        let opts = Options::new()
            .with("jwt_secret", "secret")
            .with("jwt_algorithm", "RS256");
        assert!(matches!(
            JwtBackend::from_options(&opts),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn superuser_and_acl_are_never_granted() {
        let backend = JwtBackend::new(b"secret");
        assert!(!block_on(backend.is_superuser("test")).unwrap());
        let request = AclRequest::new("test", "a", "c", crate::types::Access::Read);
        assert!(!block_on(backend.check_acl(&request)).unwrap());
    }
}
