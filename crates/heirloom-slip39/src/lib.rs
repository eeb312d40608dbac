//! Heirloom SLIP-39 Module
//!
//! Encode a master secret as a checksummed mnemonic and recover it,
//! per SLIP-0039: https://github.com/satoshilabs/slips/blob/master/slip-0039.md
//!
//! SLIP-39 uses:
//! - 1024-word wordlist (10 bits per word)
//! - RS1024 checksum (Reed-Solomon over GF(1024))
//! - a 4-round Feistel cipher keyed by PBKDF2-HMAC-SHA256
//!
//! This implementation handles the single-share case only (1 group,
//! 1-of-1 members). The multi-group wire format is representable in
//! [`codec::ShareMetadata`] but shares with other shapes are rejected
//! at recovery time.
//!
//! # Example
//!
//! ```
//! use heirloom_slip39::{generate_mnemonic, recover_master_secret, validate_mnemonic};
//!
//! let secret = [0x42u8; 16];
//! let mnemonic = generate_mnemonic(&secret).unwrap();
//! assert!(validate_mnemonic(&mnemonic));
//!
//! let recovered = recover_master_secret(&mnemonic).unwrap();
//! assert_eq!(recovered.as_bytes(), &secret[..]);
//! ```

pub mod cipher;
pub mod codec;
pub mod mnemonic;
pub mod rs1024;
pub mod wordlist;

pub use codec::ShareMetadata;
pub use mnemonic::{
    generate_mnemonic, recover_master_secret, recover_master_secret_with_passphrase,
    validate_mnemonic,
};

use heirloom_core::SecretError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Slip39Error {
    #[error("mnemonic must be exactly 20 or 33 words, got {0}")]
    InvalidMnemonicLength(usize),
    #[error("unknown mnemonic word: {0}")]
    InvalidWord(String),
    #[error("RS1024 checksum mismatch")]
    ChecksumMismatch,
    #[error("nonzero padding bits in share value")]
    InvalidPadding,
    #[error("master secret must be 16 or 32 bytes, got {0}")]
    InvalidSecretLength(usize),
    #[error("cipher input length must be even, got {0}")]
    InvalidLength(usize),
    #[error("unsupported share shape: only single 1-of-1 shares are handled")]
    UnsupportedShareConfiguration,
}

impl From<SecretError> for Slip39Error {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::InvalidSecretLength(len) => Slip39Error::InvalidSecretLength(len),
        }
    }
}
