//! Heirloom Inheritance Module
//!
//! Staged custody for a user/heir pair assisted by an escrow co-signer:
//!
//! - **Funding**: deposits land on 2-of-2 user+escrow addresses;
//!   issuance of new funding addresses stays open.
//! - **Activation**: a one-way, manually triggered sweep of every
//!   funding UTXO into a single 2-of-2 user+heir output. Attempting it
//!   twice fails with [`InheritError::AlreadyActivated`].
//! - **Spend windows**: eligibility after activation is a pure function
//!   of confirmed blocks since the earliest funding transaction — first
//!   nobody, then both-must-sign, then the user alone, then (possibly
//!   concurrently) the heir alone.

pub mod conditions;
pub mod escrow;
pub mod lifecycle;

pub use conditions::{SpendEligibility, SpendingConditions};
pub use escrow::{EscrowCosigner, EscrowIdentityProvider, StaticEscrow};
pub use lifecycle::{InheritanceStage, InheritanceState, LocalRole};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InheritError {
    #[error("invalid spending conditions: {0}")]
    InvalidConditions(String),

    #[error("account is already activated")]
    AlreadyActivated,

    #[error("account is not activated")]
    NotActivated,

    #[error("escrow co-signer unavailable: {0}")]
    Escrow(String),
}
