use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp, seconds, UTC.
pub type Timestamp = i64;

/// Main-chain index: monotonically increasing, assigned at stabilization.
pub type Mci = u64;

/// DAG level: `max(parent.level) + 1`.
pub type Level = u64;

/// Payment amount in the ledger's base unit.
pub type Amount = u64;

// ── Hash32 ───────────────────────────────────────────────────────────────────

/// A 32-byte SHA-256 digest, displayed as the 44-character base64 string used
/// for `unit_id` and ball identifiers on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        base64_encode(&self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, Base64IdError> {
        let bytes = base64_decode(s)?;
        if bytes.len() != 32 {
            return Err(Base64IdError::WrongLength(bytes.len()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({}…)", &self.to_base64()[..12])
    }
}

impl TryFrom<String> for Hash32 {
    type Error = Base64IdError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Hash32::from_base64(&s)
    }
}

impl From<Hash32> for String {
    fn from(h: Hash32) -> String {
        h.to_base64()
    }
}

/// `unit_id` — hash of a unit's canonical stripped form.
pub type UnitId = Hash32;

/// Ball identifier — hash of `(unit_id, parent_balls, skiplist_balls, is_nonserial)`.
pub type BallId = Hash32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Base64IdError {
    #[error("invalid base64: {0}")]
    Decode(String),
    #[error("decoded id has wrong length: {0} bytes, expected 32")]
    WrongLength(usize),
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Result<Vec<u8>, Base64IdError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| Base64IdError::Decode(e.to_string()))
}

// ── Address32 ────────────────────────────────────────────────────────────────

/// A 32-character base32 checksummed fingerprint of an address definition.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address32(pub String);

const ADDRESS_LEN: usize = 32;

impl Address32 {
    /// Wraps an already-derived base32 address string, validating its shape.
    /// Does not itself perform the derivation — see `ledger-crypto::address_from_definition`.
    pub fn from_string(s: String) -> Result<Self, AddressError> {
        if s.len() != ADDRESS_LEN {
            return Err(AddressError::WrongLength(s.len()));
        }
        if !s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return Err(AddressError::InvalidAlphabet);
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Address32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address32({})", self.0)
    }
}

impl TryFrom<String> for Address32 {
    type Error = AddressError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Address32::from_string(s)
    }
}

impl From<Address32> for String {
    fn from(a: Address32) -> String {
        a.0
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address has wrong length: {0}, expected {ADDRESS_LEN}")]
    WrongLength(usize),
    #[error("address contains characters outside the base32 alphabet")]
    InvalidAlphabet,
    #[error("address checksum mismatch")]
    BadChecksum,
}

// ── Dilithium key material ──────────────────────────────────────────────────

/// Dilithium2 public key (1312 bytes per NIST FIPS 204).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}b)", self.0.len())
    }
}

/// Dilithium2 signature (2420 bytes per NIST FIPS 204).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}b)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash32_base64_round_trips() {
        let h = Hash32::from_bytes([7u8; 32]);
        let s = h.to_base64();
        assert_eq!(s.len(), 44);
        assert_eq!(Hash32::from_base64(&s).unwrap(), h);
    }

    #[test]
    fn hash32_rejects_wrong_length() {
        let short = base64_encode(&[1u8; 16]);
        assert_eq!(
            Hash32::from_base64(&short),
            Err(Base64IdError::WrongLength(16))
        );
    }

    #[test]
    fn address_validates_length_and_alphabet() {
        let good = "A".repeat(32);
        assert!(Address32::from_string(good).is_ok());
        assert_eq!(
            Address32::from_string("TOOSHORT".to_string()),
            Err(AddressError::WrongLength(8))
        );
        let bad_chars = "a".repeat(32);
        assert_eq!(
            Address32::from_string(bad_chars),
            Err(AddressError::InvalidAlphabet)
        );
    }
}
