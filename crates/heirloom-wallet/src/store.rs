//! Persistence collaborator
//!
//! The core never owns a storage medium. Accounts are value objects
//! handed to an [`AccountStore`] implementation (a file, a database, a
//! keychain) that loads and saves them opaquely.

use async_trait::async_trait;
use thiserror::Error;

use crate::account::Account;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(String),
    #[error("stored record is unreadable: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// All persisted accounts. Callers rebuild derived lookups after
    /// loading.
    async fn load_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Persist one account snapshot, replacing any previous record
    /// with the same id.
    async fn save_account(&self, account: &Account) -> Result<(), StoreError>;
}
