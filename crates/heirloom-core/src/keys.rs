//! Hierarchical key derivation from the master secret
//!
//! The master secret seeds a BIP-32 tree. Single-sig Taproot keys live
//! under the BIP-86 purpose (m/86'/coin'/account'), multisig participants
//! exchange account-level xpubs and derive non-hardened children per
//! address.

use bitcoin::bip32::{ChildNumber, DerivationPath, Fingerprint, Xpriv, Xpub};
use bitcoin::secp256k1::{Keypair, Secp256k1, Signing, Verification};
use bitcoin::{Address, Network};
use std::str::FromStr;
use thiserror::Error;

use crate::secret::MasterSecret;

/// BIP-86 purpose level for single-sig Taproot accounts.
pub const TAPROOT_PURPOSE: u32 = 86;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Derivation failed: {0}")]
    DerivationFailed(String),
    #[error("Invalid extended public key: {0}")]
    InvalidExtendedKey(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// SLIP-44 coin type for the network (0 = production, 1 = test networks).
fn coin_type(network: Network) -> u32 {
    match network {
        Network::Bitcoin => 0,
        _ => 1,
    }
}

/// Derive the BIP-32 root from the master secret.
///
/// The root is owned by the calling operation; derived children are
/// computed on demand and never cached.
pub fn master_xpriv(secret: &MasterSecret, network: Network) -> Result<Xpriv, KeyError> {
    Xpriv::new_master(network, secret.as_bytes())
        .map_err(|e| KeyError::DerivationFailed(e.to_string()))
}

/// Master key fingerprint, used to pair accounts across devices.
pub fn master_fingerprint<C: Signing>(secp: &Secp256k1<C>, master: &Xpriv) -> Fingerprint {
    master.fingerprint(secp)
}

/// Derive the hardened Taproot account key: m/86'/coin'/account'.
pub fn taproot_account_xpriv<C: Signing>(
    secp: &Secp256k1<C>,
    master: &Xpriv,
    network: Network,
    account: u32,
) -> Result<Xpriv, KeyError> {
    let path: DerivationPath = format!(
        "m/{}'/{}'/{}'",
        TAPROOT_PURPOSE,
        coin_type(network),
        account
    )
    .parse()
    .map_err(|e: bitcoin::bip32::Error| KeyError::InvalidPath(e.to_string()))?;
    master
        .derive_priv(secp, &path)
        .map_err(|e| KeyError::DerivationFailed(e.to_string()))
}

/// Account-level xpub for sharing with co-signers.
pub fn account_xpub<C: Signing>(secp: &Secp256k1<C>, account: &Xpriv) -> Xpub {
    Xpub::from_priv(secp, account)
}

/// Non-hardened child steps below an account key: /change/index.
fn leaf_path(change: bool, index: u32) -> Result<[ChildNumber; 2], KeyError> {
    let change = ChildNumber::from_normal_idx(u32::from(change))
        .map_err(|e| KeyError::InvalidPath(e.to_string()))?;
    let index =
        ChildNumber::from_normal_idx(index).map_err(|e| KeyError::InvalidPath(e.to_string()))?;
    Ok([change, index])
}

/// Single-sig Taproot (P2TR) address at account/change/index.
///
/// The BIP-341 key tweak is applied by the address constructor; the
/// matching signing key must be tweaked the same way (see the wallet
/// transaction signer).
pub fn taproot_address<C: Verification>(
    secp: &Secp256k1<C>,
    account: &Xpub,
    change: bool,
    index: u32,
    network: Network,
) -> Result<Address, KeyError> {
    let child = account
        .derive_pub(secp, &leaf_path(change, index)?)
        .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;
    let (xonly, _parity) = child.public_key.x_only_public_key();
    Ok(Address::p2tr(secp, xonly, None, network))
}

/// Untweaked signing keypair for the Taproot leaf at account/change/index.
pub fn taproot_signing_keypair<C: Signing>(
    secp: &Secp256k1<C>,
    account: &Xpriv,
    change: bool,
    index: u32,
) -> Result<Keypair, KeyError> {
    let child = account
        .derive_priv(secp, &leaf_path(change, index)?)
        .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;
    Ok(child.to_keypair(secp))
}

/// Parse an externally supplied account xpub.
///
/// Both known version-byte tables are accepted (production `xpub…` and
/// test-network `tpub…`); anything else is rejected as
/// [`KeyError::InvalidExtendedKey`].
pub fn parse_account_xpub(s: &str) -> Result<Xpub, KeyError> {
    Xpub::from_str(s.trim()).map_err(|e| KeyError::InvalidExtendedKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
    const TPUB: &str = "tpubD6NzVbkrYhZ4XgiXtGrdW5XDAPFCL9h7we1vwNCpn8tGbBcgfVYjXyhWo4E1xkh56hjod1RhGjxbaTLV3X4FyWuejifB9jusQ46QzG87VKp";

    fn test_secret() -> MasterSecret {
        MasterSecret::from_bytes(&[0x42u8; 16]).unwrap()
    }

    #[test]
    fn test_master_derivation_deterministic() {
        let secp = Secp256k1::new();
        let m1 = master_xpriv(&test_secret(), Network::Testnet).unwrap();
        let m2 = master_xpriv(&test_secret(), Network::Testnet).unwrap();
        assert_eq!(
            master_fingerprint(&secp, &m1),
            master_fingerprint(&secp, &m2)
        );

        let other = MasterSecret::from_bytes(&[0x43u8; 16]).unwrap();
        let m3 = master_xpriv(&other, Network::Testnet).unwrap();
        assert_ne!(
            master_fingerprint(&secp, &m1),
            master_fingerprint(&secp, &m3)
        );
    }

    #[test]
    fn test_taproot_address_prefixes() {
        let secp = Secp256k1::new();

        let master = master_xpriv(&test_secret(), Network::Bitcoin).unwrap();
        let account = taproot_account_xpriv(&secp, &master, Network::Bitcoin, 0).unwrap();
        let xpub = account_xpub(&secp, &account);
        let addr = taproot_address(&secp, &xpub, false, 0, Network::Bitcoin).unwrap();
        assert!(addr.to_string().starts_with("bc1p"));

        let master = master_xpriv(&test_secret(), Network::Testnet).unwrap();
        let account = taproot_account_xpriv(&secp, &master, Network::Testnet, 0).unwrap();
        let xpub = account_xpub(&secp, &account);
        let addr = taproot_address(&secp, &xpub, false, 0, Network::Testnet).unwrap();
        assert!(addr.to_string().starts_with("tb1p"));
    }

    #[test]
    fn test_taproot_addresses_distinct_per_leaf() {
        let secp = Secp256k1::new();
        let master = master_xpriv(&test_secret(), Network::Testnet).unwrap();
        let account = taproot_account_xpriv(&secp, &master, Network::Testnet, 0).unwrap();
        let xpub = account_xpub(&secp, &account);

        let recv0 = taproot_address(&secp, &xpub, false, 0, Network::Testnet).unwrap();
        let recv1 = taproot_address(&secp, &xpub, false, 1, Network::Testnet).unwrap();
        let change0 = taproot_address(&secp, &xpub, true, 0, Network::Testnet).unwrap();

        assert_ne!(recv0, recv1);
        assert_ne!(recv0, change0);

        // Same leaf twice is the same address: derivation is pure.
        let again = taproot_address(&secp, &xpub, false, 0, Network::Testnet).unwrap();
        assert_eq!(recv0, again);
    }

    #[test]
    fn test_signing_key_matches_address_key() {
        let secp = Secp256k1::new();
        let master = master_xpriv(&test_secret(), Network::Testnet).unwrap();
        let account = taproot_account_xpriv(&secp, &master, Network::Testnet, 0).unwrap();
        let xpub = account_xpub(&secp, &account);

        let keypair = taproot_signing_keypair(&secp, &account, false, 3).unwrap();
        let child = xpub.derive_pub(&secp, &leaf_path(false, 3).unwrap()).unwrap();
        assert_eq!(keypair.public_key(), child.public_key);
    }

    #[test]
    fn test_parse_xpub_both_networks() {
        assert!(parse_account_xpub(XPUB).is_ok());
        assert!(parse_account_xpub(TPUB).is_ok());
        // Surrounding whitespace is tolerated (pasted keys)
        assert!(parse_account_xpub(&format!("  {}\n", XPUB)).is_ok());
    }

    #[test]
    fn test_parse_xpub_rejects_garbage() {
        for bad in ["", "xpub", "not-a-key", "zpub6qg3Uc1BAQk"] {
            assert!(matches!(
                parse_account_xpub(bad),
                Err(KeyError::InvalidExtendedKey(_))
            ));
        }
    }

    #[test]
    fn test_account_xpub_roundtrip() {
        let secp = Secp256k1::new();
        let master = master_xpriv(&test_secret(), Network::Testnet).unwrap();
        let account = taproot_account_xpriv(&secp, &master, Network::Testnet, 0).unwrap();
        let xpub = account_xpub(&secp, &account);
        let parsed = parse_account_xpub(&xpub.to_string()).unwrap();
        assert_eq!(xpub, parsed);
    }
}
