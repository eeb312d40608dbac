//! Heirloom Chain Interface
//!
//! The wallet core never talks to the network itself; it consumes a
//! chain-data collaborator through the [`ChainSource`] trait (an
//! explorer client, an Electrum bridge, a test double). The
//! [`ChainClient`] wrapper adds the request hygiene every provider
//! needs: bounded exponential-backoff retries, at-most-one in-flight
//! request per query key, and a rate-limit cooldown that degrades to
//! empty results instead of failing the caller.

pub mod client;

pub use client::{ChainClient, RetryPolicy};

use async_trait::async_trait;
use bitcoin::{Address, Amount, OutPoint, Transaction, Txid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a chain-data provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Transient transport failure; safe to retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider asked us to back off.
    #[error("rate limited by provider")]
    RateLimited,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),
}

impl ChainError {
    /// Whether a retry can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport(_))
    }
}

/// An unspent output as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// The outpoint (txid:vout).
    pub outpoint: OutPoint,
    /// Value in satoshis.
    pub value: Amount,
    /// Confirmation height (0 if unconfirmed).
    pub height: u32,
}

/// Fee-rate tiers in sat/vB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimates {
    pub fast: u64,
    pub medium: u64,
    pub slow: u64,
}

/// Which fee tier a spend flow should target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeTier {
    Fast,
    Medium,
    Slow,
}

impl FeeEstimates {
    pub fn rate(&self, tier: FeeTier) -> u64 {
        match tier {
            FeeTier::Fast => self.fast,
            FeeTier::Medium => self.medium,
            FeeTier::Slow => self.slow,
        }
    }
}

/// The chain-data operations the wallet consumes.
///
/// Implementations are external collaborators; all methods are
/// fallible and the caller (not the implementation) owns retries and
/// caching.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Confirmed + pending balance of an address, in satoshis.
    async fn address_balance(&self, address: &Address) -> Result<Amount, ChainError>;

    /// Unspent outputs currently on an address.
    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>, ChainError>;

    /// Transaction ids touching an address, oldest first.
    async fn transactions(&self, address: &Address) -> Result<Vec<Txid>, ChainError>;

    /// Current fee-rate tiers.
    async fn fee_estimates(&self) -> Result<FeeEstimates, ChainError>;

    /// Submit a signed transaction, returning its txid.
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError>;

    /// Current best block height.
    async fn tip_height(&self) -> Result<u32, ChainError>;

    /// Height of the earliest confirmed transaction funding `address`,
    /// or `None` if the address has never received funds.
    async fn first_funding_height(&self, address: &Address) -> Result<Option<u32>, ChainError>;
}
