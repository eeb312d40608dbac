//! Account and derived-address records
//!
//! Accounts are value objects: the persistence provider stores and
//! reloads them opaquely, the service mutates them under a per-account
//! lock, and everything else only reads.
//!
//! Every derived address records the derivation leaf it came from
//! ((change, role, index)), so locating the key for a UTXO is a map
//! lookup. A linear scan remains only as a compatibility shim for
//! records written before the lookup existed.

use std::collections::HashMap;
use std::str::FromStr;

use bitcoin::bip32::{Fingerprint, Xpub};
use bitcoin::{Address, Amount};
use serde::{Deserialize, Serialize};

use heirloom_inherit::InheritanceState;

/// Macro for serde modules mapping a type through its string form.
macro_rules! string_serde {
    ($mod_name:ident, $type:ty) => {
        mod $mod_name {
            use super::*;
            use serde::{Deserializer, Serializer};

            pub fn serialize<S>(value: &$type, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&value.to_string())
            }

            pub fn deserialize<'de, D>(deserializer: D) -> Result<$type, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                <$type>::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(fingerprint_serde, Fingerprint);
string_serde!(xpub_serde, Xpub);

/// Addresses from our own records are network-checked at creation, so
/// reloading them can assume the check.
mod address_serde {
    use bitcoin::address::NetworkUnchecked;
    use bitcoin::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(address: &Address, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&address.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let unchecked: Address<NetworkUnchecked> =
            s.parse().map_err(serde::de::Error::custom)?;
        Ok(unchecked.assume_checked())
    }
}

mod amount_serde {
    use bitcoin::Amount;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(amount.to_sat())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Amount::from_sat(u64::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    Standard,
    Inheritance,
}

/// What custody stage an address serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressRole {
    /// User+escrow 2-of-2, pre-activation deposits.
    Funding,
    /// User+heir 2-of-2, post-activation custody.
    Active,
    /// Standard single-sig.
    Unspecified,
}

/// One derived address and its bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedAddress {
    /// Leaf index under (change, role).
    pub index: u32,
    #[serde(with = "address_serde")]
    pub address: Address,
    pub is_change: bool,
    pub role: AddressRole,
    /// Whether the address has ever received funds.
    pub used: bool,
    #[serde(with = "amount_serde")]
    pub balance: Amount,
}

/// Inheritance-specific account fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InheritanceMeta {
    pub state: InheritanceState,
    #[serde(with = "fingerprint_serde")]
    pub local_fingerprint: Fingerprint,
    #[serde(with = "fingerprint_serde")]
    pub counterparty_fingerprint: Fingerprint,
    /// The other human party: the heir when we are the user, the user
    /// when we are the heir. The escrow identity is injected per
    /// operation, never persisted here.
    #[serde(with = "xpub_serde")]
    pub counterparty_xpub: Xpub,
}

impl InheritanceMeta {
    /// Pair an inheritance account from an externally supplied
    /// counterparty xpub (pasted or scanned), validating its version
    /// bytes against both known networks.
    pub fn pair(
        state: InheritanceState,
        local_fingerprint: Fingerprint,
        counterparty_fingerprint: Fingerprint,
        counterparty_xpub: &str,
    ) -> Result<Self, heirloom_core::KeyError> {
        Ok(Self {
            state,
            local_fingerprint,
            counterparty_fingerprint,
            counterparty_xpub: heirloom_core::parse_account_xpub(counterparty_xpub)?,
        })
    }
}

/// A wallet account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub kind: AccountKind,
    /// This wallet's account-level xpub.
    #[serde(with = "xpub_serde")]
    pub xpub: Xpub,
    #[serde(with = "amount_serde")]
    pub balance: Amount,
    next_receive_index: u32,
    next_change_index: u32,
    derived: Vec<DerivedAddress>,
    pub inheritance: Option<InheritanceMeta>,
    /// (is_change, role, index) -> position in `derived`. Rebuilt on
    /// load, maintained on insert.
    #[serde(skip)]
    leaf_lookup: HashMap<(bool, AddressRole, u32), usize>,
}

impl Account {
    pub fn new_standard(id: impl Into<String>, name: impl Into<String>, xpub: Xpub) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: AccountKind::Standard,
            xpub,
            balance: Amount::ZERO,
            next_receive_index: 0,
            next_change_index: 0,
            derived: Vec::new(),
            inheritance: None,
            leaf_lookup: HashMap::new(),
        }
    }

    pub fn new_inheritance(
        id: impl Into<String>,
        name: impl Into<String>,
        xpub: Xpub,
        meta: InheritanceMeta,
    ) -> Self {
        Self {
            kind: AccountKind::Inheritance,
            inheritance: Some(meta),
            ..Self::new_standard(id, name, xpub)
        }
    }

    /// Next unissued leaf index for a chain.
    pub fn next_index(&self, is_change: bool) -> u32 {
        if is_change {
            self.next_change_index
        } else {
            self.next_receive_index
        }
    }

    /// Record a freshly derived address and advance the chain index.
    ///
    /// The (index, is_change, role) triple maps to exactly one address;
    /// re-recording an existing leaf is a no-op so refreshes stay
    /// idempotent.
    pub fn record_address(&mut self, entry: DerivedAddress) {
        let key = (entry.is_change, entry.role, entry.index);
        if self.leaf_lookup.contains_key(&key) {
            return;
        }
        if entry.is_change {
            self.next_change_index = self.next_change_index.max(entry.index + 1);
        } else {
            self.next_receive_index = self.next_receive_index.max(entry.index + 1);
        }
        self.leaf_lookup.insert(key, self.derived.len());
        self.derived.push(entry);
    }

    pub fn addresses(&self) -> &[DerivedAddress] {
        &self.derived
    }

    /// O(1) leaf lookup.
    pub fn address_at(
        &self,
        is_change: bool,
        role: AddressRole,
        index: u32,
    ) -> Option<&DerivedAddress> {
        self.leaf_lookup
            .get(&(is_change, role, index))
            .map(|&i| &self.derived[i])
    }

    /// Find the derivation leaf behind an address string.
    pub fn locate(&self, address: &Address) -> Option<&DerivedAddress> {
        self.derived.iter().find(|d| &d.address == address)
    }

    /// Compatibility shim for records persisted before leaf indexes
    /// were recorded: scan the first `gap` leaves of every chain for
    /// one that derives to `address`. Prefer [`Account::locate`].
    pub fn locate_by_scan<F>(&self, address: &Address, gap: u32, derive: F) -> Option<(bool, u32)>
    where
        F: Fn(bool, u32) -> Option<Address>,
    {
        for is_change in [false, true] {
            for index in 0..gap {
                if derive(is_change, index).as_ref() == Some(address) {
                    return Some((is_change, index));
                }
            }
        }
        None
    }

    /// Mark an address as having received funds at some point, even if
    /// it is empty now.
    pub fn mark_used(&mut self, address: &Address) {
        if let Some(entry) = self.derived.iter_mut().find(|d| &d.address == address) {
            entry.used = true;
        }
    }

    /// Apply a fresh per-address balance snapshot, updating `used`
    /// flags and the account total.
    pub fn apply_balances(&mut self, balances: &HashMap<Address, Amount>) {
        let mut total = Amount::ZERO;
        for entry in &mut self.derived {
            if let Some(balance) = balances.get(&entry.address) {
                entry.balance = *balance;
                if *balance > Amount::ZERO {
                    entry.used = true;
                }
            }
            total += entry.balance;
        }
        self.balance = total;
    }

    /// Rebuild the leaf lookup after deserialization.
    pub fn rebuild_lookup(&mut self) {
        self.leaf_lookup = self
            .derived
            .iter()
            .enumerate()
            .map(|(i, d)| ((d.is_change, d.role, d.index), i))
            .collect();
    }
}
