//! Master secret container
//!
//! The master secret is the root of the whole key tree. It only ever
//! exists in memory for the duration of a derivation or signing
//! operation, and its bytes are wiped when the value is dropped.

use std::fmt;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SecretError {
    #[error("master secret must be 16 or 32 bytes, got {0}")]
    InvalidSecretLength(usize),
}

/// A 128- or 256-bit master secret, zeroized on drop.
///
/// `Debug` never prints the contents.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret(Vec<u8>);

impl MasterSecret {
    /// Wrap raw secret bytes. Only 16- and 32-byte secrets are valid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SecretError> {
        if bytes.len() != 16 && bytes.len() != 32 {
            return Err(SecretError::InvalidSecretLength(bytes.len()));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Borrow the secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Secret length in bytes (16 or 32).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for `len`/`is_empty` symmetry.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterSecret(<{} bytes redacted>)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_16_and_32_bytes() {
        assert!(MasterSecret::from_bytes(&[0u8; 16]).is_ok());
        assert!(MasterSecret::from_bytes(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_rejects_other_lengths() {
        for len in [0usize, 8, 15, 17, 20, 24, 31, 33, 64] {
            let err = MasterSecret::from_bytes(&vec![0u8; len]).unwrap_err();
            assert_eq!(err, SecretError::InvalidSecretLength(len));
        }
    }

    #[test]
    fn test_debug_redacts() {
        let secret = MasterSecret::from_bytes(&[0xAB; 16]).unwrap();
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("ab"));
        assert!(!debug.contains("AB"));
        assert!(debug.contains("redacted"));
    }
}
