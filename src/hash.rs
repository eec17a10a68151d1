//! Stored password hash parsing and verification.
//!
//! Backends keep one hash string per user. The leading tag selects the
//! algorithm family:
//!
//! | format                                   | family                     |
//! |------------------------------------------|----------------------------|
//! | `PBKDF2$sha512$100000$<salt>$<hash>`     | PBKDF2-HMAC (sha256/sha512)|
//! | `SHA256$<salt>$<hash>`, `SHA512$...`     | salted digest              |
//! | `$2b$10$...` (also `$2a$`, `$2x$`, `$2y$`) | bcrypt                   |
//! | `$argon2id$v=19$m=...,t=...,p=...$...`   | Argon2 (PHC string)        |
//!
//! Salt and hash segments are standard base64. A string with an unknown tag
//! parses into [`HashDescriptor::Unknown`], which never verifies.

use crate::config::Options;
use crate::error::{Error, Result};
use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordVerifier as _};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use zeroize::Zeroizing;

const BCRYPT_VARIANTS: [&str; 4] = ["2a", "2b", "2x", "2y"];
const BCRYPT_BODY_LEN: usize = 53;

/// How the salt segment of a PBKDF2 or salted-digest hash is turned into bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaltEncoding {
    /// Salt segment is base64 and is decoded before use.
    #[default]
    Base64,
    /// Salt segment is used verbatim as UTF-8 bytes.
    Utf8,
}

impl FromStr for SaltEncoding {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "base64" => Ok(Self::Base64),
            "utf-8" | "utf8" => Ok(Self::Utf8),
            other => Err(Error::Config(format!(
                "unknown salt encoding `{other}`, expected `base64` or `utf-8`"
            ))),
        }
    }
}

impl SaltEncoding {
    fn decode(self, segment: &str) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => BASE64
                .decode(segment)
                .map_err(|err| Error::MalformedHash(format!("salt is not valid base64: {err}"))),
            Self::Utf8 => Ok(segment.as_bytes().to_vec()),
        }
    }
}

/// Inner digest used by PBKDF2 and salted-digest hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashDigest {
    Sha256,
    Sha512,
}

impl HashDigest {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("sha256") {
            Some(Self::Sha256)
        } else if name.eq_ignore_ascii_case("sha512") {
            Some(Self::Sha512)
        } else {
            None
        }
    }

    fn pbkdf2(self, secret: &[u8], salt: &[u8], iterations: u32, len: usize) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(vec![0u8; len]);
        match self {
            Self::Sha256 => pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut out),
            Self::Sha512 => pbkdf2_hmac::<Sha512>(secret, salt, iterations, &mut out),
        }
        out
    }

    fn salted_digest(self, salt: &[u8], secret: &[u8]) -> Zeroizing<Vec<u8>> {
        let out = match self {
            Self::Sha256 => Sha256::new()
                .chain_update(salt)
                .chain_update(secret)
                .finalize()
                .to_vec(),
            Self::Sha512 => Sha512::new()
                .chain_update(salt)
                .chain_update(secret)
                .finalize()
                .to_vec(),
        };
        Zeroizing::new(out)
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Algorithm family of a parsed hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Pbkdf2,
    Bcrypt,
    Sha,
    Argon2,
    Unknown,
}

/// Parsed stored hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashDescriptor {
    /// PBKDF2-HMAC with explicit parameters.
    Pbkdf2 {
        digest: HashDigest,
        iterations: u32,
        salt: Vec<u8>,
        hash: Vec<u8>,
    },
    /// Single digest over `salt || secret`.
    Sha {
        digest: HashDigest,
        salt: Vec<u8>,
        hash: Vec<u8>,
    },
    /// bcrypt modular-crypt string, verified by the bcrypt routine.
    Bcrypt { encoded: String },
    /// Argon2 PHC string, verified by the argon2 routine.
    Argon2 { encoded: String },
    /// Tag not recognized; never verifies.
    Unknown { tag: String },
}

impl HashDescriptor {
    /// Parses a stored hash string.
    pub fn parse(stored: &str, salt_encoding: SaltEncoding) -> Result<Self> {
        let stored = stored.trim();
        if let Some(rest) = stored.strip_prefix('$') {
            return Self::parse_modular(stored, rest);
        }

        let segments: Vec<&str> = stored.split('$').collect();
        if segments.len() < 2 {
            return Err(Error::MalformedHash(
                "missing `$`-separated algorithm tag".to_string(),
            ));
        }
        let tag = segments[0];

        if tag.eq_ignore_ascii_case("pbkdf2") {
            let [_, digest, iterations, salt, hash] = segments.as_slice() else {
                return Err(segment_count_error("PBKDF2", 5, segments.len()));
            };
            let digest = parse_digest(digest)?;
            let iterations: u32 = iterations.parse().map_err(|_| {
                Error::MalformedHash(format!("invalid iteration count `{iterations}`"))
            })?;
            if iterations == 0 {
                return Err(Error::MalformedHash(
                    "iteration count must be positive".to_string(),
                ));
            }
            return Ok(Self::Pbkdf2 {
                digest,
                iterations,
                salt: salt_encoding.decode(salt)?,
                hash: decode_hash(hash)?,
            });
        }

        if let Some(digest) = HashDigest::from_name(tag) {
            let [_, salt, hash] = segments.as_slice() else {
                return Err(segment_count_error(tag, 3, segments.len()));
            };
            let hash = decode_hash(hash)?;
            if hash.len() != digest.output_len() {
                return Err(Error::MalformedHash(format!(
                    "{tag} hash must be {} bytes, got {}",
                    digest.output_len(),
                    hash.len()
                )));
            }
            return Ok(Self::Sha {
                digest,
                salt: salt_encoding.decode(salt)?,
                hash,
            });
        }

        Ok(Self::Unknown {
            tag: tag.to_string(),
        })
    }

    fn parse_modular(stored: &str, rest: &str) -> Result<Self> {
        let id = rest.split('$').next().unwrap_or_default();

        if BCRYPT_VARIANTS.contains(&id) {
            let segments: Vec<&str> = rest.split('$').collect();
            let [_, cost, body] = segments.as_slice() else {
                return Err(segment_count_error("bcrypt", 3, segments.len()));
            };
            if cost.len() != 2 || cost.parse::<u32>().is_err() {
                return Err(Error::MalformedHash(format!("invalid bcrypt cost `{cost}`")));
            }
            if body.len() != BCRYPT_BODY_LEN {
                return Err(Error::MalformedHash(format!(
                    "bcrypt salt and hash must be {BCRYPT_BODY_LEN} characters, got {}",
                    body.len()
                )));
            }
            return Ok(Self::Bcrypt {
                encoded: stored.to_string(),
            });
        }

        if id.starts_with("argon2") {
            let parsed = PasswordHash::new(stored)
                .map_err(|err| Error::MalformedHash(format!("invalid argon2 string: {err}")))?;
            if parsed.hash.is_none() {
                return Err(Error::MalformedHash("argon2 string has no hash".to_string()));
            }
            return Ok(Self::Argon2 {
                encoded: stored.to_string(),
            });
        }

        Ok(Self::Unknown { tag: id.to_string() })
    }

    /// Returns the algorithm family.
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Pbkdf2 { .. } => HashAlgorithm::Pbkdf2,
            Self::Sha { .. } => HashAlgorithm::Sha,
            Self::Bcrypt { .. } => HashAlgorithm::Bcrypt,
            Self::Argon2 { .. } => HashAlgorithm::Argon2,
            Self::Unknown { .. } => HashAlgorithm::Unknown,
        }
    }

    /// Checks `secret` against this hash.
    pub fn verify(&self, secret: &[u8]) -> bool {
        match self {
            Self::Pbkdf2 {
                digest,
                iterations,
                salt,
                hash,
            } => {
                let derived = digest.pbkdf2(secret, salt, *iterations, hash.len());
                constant_time_eq(&derived, hash)
            }
            Self::Sha { digest, salt, hash } => {
                let derived = digest.salted_digest(salt, secret);
                constant_time_eq(&derived, hash)
            }
            Self::Bcrypt { encoded } => bcrypt::verify(secret, encoded).unwrap_or(false),
            Self::Argon2 { encoded } => PasswordHash::new(encoded)
                .map(|parsed| Argon2::default().verify_password(secret, &parsed).is_ok())
                .unwrap_or(false),
            Self::Unknown { .. } => false,
        }
    }
}

fn parse_digest(name: &str) -> Result<HashDigest> {
    HashDigest::from_name(name)
        .ok_or_else(|| Error::MalformedHash(format!("unsupported digest `{name}`")))
}

fn decode_hash(segment: &str) -> Result<Vec<u8>> {
    let hash = BASE64
        .decode(segment)
        .map_err(|err| Error::MalformedHash(format!("hash is not valid base64: {err}")))?;
    if hash.is_empty() {
        return Err(Error::MalformedHash("hash segment is empty".to_string()));
    }
    Ok(hash)
}

fn segment_count_error(algorithm: &str, expected: usize, got: usize) -> Error {
    Error::MalformedHash(format!(
        "{algorithm} hash needs {expected} `$`-separated segments, got {got}"
    ))
}

/// Compares two byte strings without returning early on the first mismatch.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verifies secrets against stored hash strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordVerifier {
    salt_encoding: SaltEncoding,
}

impl PasswordVerifier {
    /// Creates a verifier using base64 salts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `hasher_salt_encoding` from backend options.
    pub fn from_options(opts: &Options) -> Result<Self> {
        Ok(Self {
            salt_encoding: opts.parse_or("hasher_salt_encoding", SaltEncoding::Base64)?,
        })
    }

    /// Sets the salt encoding.
    pub fn with_salt_encoding(mut self, salt_encoding: SaltEncoding) -> Self {
        self.salt_encoding = salt_encoding;
        self
    }

    /// Returns the salt encoding.
    pub fn salt_encoding(&self) -> SaltEncoding {
        self.salt_encoding
    }

    /// Parses and checks, surfacing malformed hashes as errors.
    pub fn try_verify(&self, secret: &[u8], stored: &str) -> Result<bool> {
        let descriptor = HashDescriptor::parse(stored, self.salt_encoding)?;
        if let HashDescriptor::Unknown { tag } = &descriptor {
            return Err(Error::MalformedHash(format!("unknown algorithm `{tag}`")));
        }
        Ok(descriptor.verify(secret))
    }

    /// Checks `secret` against `stored`. Any parse failure is a mismatch.
    pub fn verify(&self, secret: &[u8], stored: &str) -> bool {
        match self.try_verify(secret, stored) {
            Ok(matched) => matched,
            Err(err) => {
                warn!(error = %err, "rejecting credential with unusable stored hash");
                false
            }
        }
    }
}

/// Verifies `secret` against `stored` with default settings.
pub fn verify_password(secret: &[u8], stored: &str) -> bool {
    PasswordVerifier::new().verify(secret, stored)
}

/// Produces `PBKDF2$...` hash strings for seeding credential stores.
#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2Hasher {
    digest: HashDigest,
    iterations: u32,
    salt_len: usize,
    key_len: usize,
    salt_encoding: SaltEncoding,
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self {
            digest: HashDigest::Sha512,
            iterations: 100_000,
            salt_len: 16,
            key_len: 64,
            salt_encoding: SaltEncoding::Base64,
        }
    }
}

impl Pbkdf2Hasher {
    /// Creates a hasher with sha512, 100000 iterations, 16-byte salt, 64-byte key.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn digest(mut self, digest: HashDigest) -> Self {
        self.digest = digest;
        self
    }

    /// Sets the iteration count; zero is raised to one.
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn salt_len(mut self, len: usize) -> Self {
        self.salt_len = len.max(1);
        self
    }

    pub fn key_len(mut self, len: usize) -> Self {
        self.key_len = len.max(1);
        self
    }

    pub fn salt_encoding(mut self, salt_encoding: SaltEncoding) -> Self {
        self.salt_encoding = salt_encoding;
        self
    }

    /// Hashes `secret` with a fresh random salt.
    pub fn hash(&self, secret: &[u8]) -> String {
        let mut raw_salt = vec![0u8; self.salt_len];
        rand::thread_rng().fill(raw_salt.as_mut_slice());
        let salt_segment = BASE64.encode(&raw_salt);
        let salt: &[u8] = match self.salt_encoding {
            SaltEncoding::Base64 => &raw_salt,
            SaltEncoding::Utf8 => salt_segment.as_bytes(),
        };
        let key = self
            .digest
            .pbkdf2(secret, salt, self.iterations, self.key_len);
        format!(
            "PBKDF2${}${}${}${}",
            self.digest,
            self.iterations,
            salt_segment,
            BASE64.encode(key.as_slice())
        )
    }
}
