//! Heirloom Wallet
//!
//! The account layer on top of the cryptographic core: derived-address
//! bookkeeping, UTXO selection with a fee-aware change decision,
//! transaction construction and signing for both output kinds
//! (single-sig Taproot, 2-of-2 multisig-in-segwit), the partial-
//! signature handoff between co-signers, and the async service that
//! serializes per-account mutations and degrades network failures to
//! stale views.
//!
//! Validation failures (bad address, bad amount, bad fee rate) reject
//! the input before any network or signing work starts. Cryptographic
//! errors always surface; only collaborator failures are degraded, and
//! only by the service layer.

pub mod account;
pub mod builder;
pub mod coin_selection;
pub mod contacts;
pub mod handoff;
pub mod service;
pub mod store;

pub use account::{Account, AccountKind, AddressRole, DerivedAddress, InheritanceMeta};
pub use builder::BuiltTransaction;
pub use coin_selection::{select_inputs, InputSelection, ScriptKind, SpendableUtxo};
pub use service::{ActivationPlan, WalletService};

use bitcoin::OutPoint;
use heirloom_chain::ChainError;
use heirloom_core::KeyError;
use heirloom_inherit::InheritError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("insufficient funds: have {have} sat, need {need} sat")]
    InsufficientFunds { have: u64, need: u64 },

    #[error("no spendable outputs")]
    NoUtxos,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid fee rate: {0} sat/vB")]
    InvalidFeeRate(u64),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("input {0} does not belong to this wallet")]
    UnrecognizedInput(OutPoint),

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("transaction build failed: {0}")]
    Build(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Inherit(#[from] InheritError),

    #[error("chain provider error: {0}")]
    Chain(#[from] ChainError),
}
