//! Heirloom Core
//!
//! Master-secret handling and deterministic key derivation.
//!
//! # Key Derivation
//!
//! From a single master secret (produced by the SLIP-39 recovery engine):
//! - Single-sig Taproot keys via BIP-86: m/86'/coin'/account'/change/index
//! - 2-of-2 multisig-in-segwit outputs from two account-level xpubs,
//!   with an optional per-instance branch level on the co-signer subtree
//!
//! The master secret lives only for the duration of a derivation or
//! signing operation and is zeroized on drop.

pub mod keys;
pub mod multisig;
pub mod secret;

pub use keys::{
    account_xpub, master_fingerprint, master_xpriv, parse_account_xpub, taproot_account_xpriv,
    taproot_address, taproot_signing_keypair, KeyError,
};
pub use multisig::{funding_descriptor, shared_descriptor, MultisigScript};
pub use secret::{MasterSecret, SecretError};
