//! Participant identifiers
//!
//! A participant id is 9 symbols drawn from a lowercase alphabet without the
//! visually ambiguous characters `0`, `1`, `i`, `l` and `o`. It is generated on
//! the participant's device and is the primary key of every stored record.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Symbols a participant id may contain
pub const ID_ALPHABET: &str = "abcdefghjkmnpqrstuvwxyz23456789";

/// Number of symbols in a participant id
pub const ID_LENGTH: usize = 9;

/// Maximum length of a sanitized storage key
pub const STORAGE_KEY_MAX_LEN: usize = 64;

/// Opaque participant identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Draw a fresh identifier from the thread-local RNG.
    ///
    /// Collisions are not checked; the id space is large enough for the
    /// expected participant counts.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Draw a fresh identifier from the given RNG
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let symbols = ID_ALPHABET.as_bytes();
        let id = (0..ID_LENGTH)
            .map(|_| symbols[rng.gen_range(0..symbols.len())] as char)
            .collect();
        Self(id)
    }

    /// Validate an externally supplied identifier
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = raw.chars().count() == ID_LENGTH
            && raw.chars().all(|c| ID_ALPHABET.contains(c));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(Error::InvalidParticipantId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key used to address this participant's record in storage
    pub fn storage_key(&self) -> String {
        sanitize_storage_key(&self.0)
    }
}

/// Decide which identifier a session runs under.
///
/// An explicitly supplied identifier (from a shared resume link) wins over the
/// one stored on this device, so a participant can continue on another device.
/// Without either, a fresh identifier is generated. The caller persists the
/// result locally.
pub fn resolve(explicit: Option<&str>, stored: Option<ParticipantId>) -> Result<ParticipantId> {
    match explicit.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => ParticipantId::parse(raw),
        None => Ok(stored.unwrap_or_else(ParticipantId::generate)),
    }
}

/// Reduce an arbitrary identifier to a safe storage key.
///
/// Keeps ASCII alphanumerics, `-` and `_`, truncated to
/// [`STORAGE_KEY_MAX_LEN`] characters, so a key can never escape its
/// storage directory or table row.
pub fn sanitize_storage_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(STORAGE_KEY_MAX_LEN)
        .collect()
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ParticipantId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}
