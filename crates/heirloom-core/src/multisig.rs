//! 2-of-2 multisig-in-segwit script derivation
//!
//! Both custody stages of an inheritance account are 2-of-2 P2WSH
//! outputs built from two account-level xpubs:
//!
//! - funding: user + escrow co-signer, with an extra non-hardened
//!   "branch" level on the escrow subtree so that distinct account
//!   instances sharing the same two root identities get disjoint
//!   funding outputs
//! - active: user + heir, plain /change/index children
//!
//! Keys are canonically sorted by the descriptor (`sortedmulti`), so
//! both parties derive the identical script regardless of argument
//! order.

use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::secp256k1::{Secp256k1, Verification};
use bitcoin::{Address, Network, ScriptBuf};
use miniscript::{Descriptor, Threshold};

use crate::keys::KeyError;

/// A derived 2-of-2 output: descriptor plus the participant keys.
#[derive(Debug, Clone)]
pub struct MultisigScript {
    /// `wsh(sortedmulti(2, A, B))` over the derived child keys.
    pub descriptor: Descriptor<bitcoin::PublicKey>,
    /// Child keys in argument order (first local, then counterparty).
    pub keys: [bitcoin::PublicKey; 2],
}

impl MultisigScript {
    /// The P2WSH address for this output.
    pub fn address(&self, network: Network) -> Result<Address, KeyError> {
        self.descriptor
            .address(network)
            .map_err(|e| KeyError::DerivationFailed(e.to_string()))
    }

    /// The output script (script pubkey).
    pub fn script_pubkey(&self) -> ScriptBuf {
        self.descriptor.script_pubkey()
    }

    /// The witness script revealed when spending.
    pub fn witness_script(&self) -> Result<ScriptBuf, KeyError> {
        self.descriptor
            .explicit_script()
            .map_err(|e| KeyError::DerivationFailed(e.to_string()))
    }

    /// Participant keys in script order (lexicographic by serialization),
    /// the order signatures must appear in the witness.
    pub fn sorted_keys(&self) -> [bitcoin::PublicKey; 2] {
        let mut keys = self.keys;
        keys.sort_by_key(|k| k.to_bytes());
        keys
    }
}

fn child_key<C: Verification>(
    secp: &Secp256k1<C>,
    account: &Xpub,
    path: &[u32],
) -> Result<bitcoin::PublicKey, KeyError> {
    let steps = path
        .iter()
        .map(|&i| ChildNumber::from_normal_idx(i))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| KeyError::InvalidPath(e.to_string()))?;
    let child = account
        .derive_pub(secp, &steps)
        .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;
    Ok(bitcoin::PublicKey::new(child.public_key))
}

fn two_of_two(
    keys: [bitcoin::PublicKey; 2],
) -> Result<MultisigScript, KeyError> {
    let thresh = Threshold::new(2, keys.to_vec())
        .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;
    let descriptor = Descriptor::new_wsh_sortedmulti(thresh)
        .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;
    Ok(MultisigScript { descriptor, keys })
}

/// Funding-stage output: user + escrow, escrow walked one extra branch
/// level (`/branch/change/index`) to separate account instances.
pub fn funding_descriptor<C: Verification>(
    secp: &Secp256k1<C>,
    user: &Xpub,
    escrow: &Xpub,
    branch: u32,
    change: bool,
    index: u32,
) -> Result<MultisigScript, KeyError> {
    let user_key = child_key(secp, user, &[u32::from(change), index])?;
    let escrow_key = child_key(secp, escrow, &[branch, u32::from(change), index])?;
    two_of_two([user_key, escrow_key])
}

/// Active-stage output: user + heir at the same /change/index leaf.
pub fn shared_descriptor<C: Verification>(
    secp: &Secp256k1<C>,
    local: &Xpub,
    counterparty: &Xpub,
    change: bool,
    index: u32,
) -> Result<MultisigScript, KeyError> {
    let local_key = child_key(secp, local, &[u32::from(change), index])?;
    let other_key = child_key(secp, counterparty, &[u32::from(change), index])?;
    two_of_two([local_key, other_key])
}
