//! Escrow co-signer identity
//!
//! Funding outputs are 2-of-2 between the user and a trusted
//! escrow/server party. That party's identity is an injected
//! capability, never a module-level constant: production wiring passes
//! a provider backed by the real service, while tests construct a
//! [`StaticEscrow`] from a throwaway key.

use async_trait::async_trait;
use bitcoin::bip32::{Fingerprint, Xpriv, Xpub};
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::Network;

use heirloom_core::{account_xpub, master_fingerprint, master_xpriv, taproot_account_xpriv, MasterSecret};

use crate::InheritError;

/// The escrow party's public identity, used to derive funding outputs.
pub trait EscrowIdentityProvider: Send + Sync {
    /// Account-level xpub the escrow signs under.
    fn account_xpub(&self) -> Xpub;

    /// Master fingerprint, for pairing records.
    fn fingerprint(&self) -> Fingerprint;
}

/// The out-of-band co-signing leg of activation: the escrow service
/// receives a partially signed sweep and returns it countersigned.
#[async_trait]
pub trait EscrowCosigner: Send + Sync {
    async fn cosign_activation(&self, psbt: Psbt) -> Result<Psbt, InheritError>;
}

/// A fixed-key escrow identity.
///
/// The key material lives in process memory, so this is only suitable
/// for tests and demos; real deployments implement
/// [`EscrowIdentityProvider`] against the escrow service instead.
pub struct StaticEscrow {
    xpriv: Xpriv,
    xpub: Xpub,
    fingerprint: Fingerprint,
}

impl StaticEscrow {
    /// Build from a raw master secret.
    pub fn from_secret(
        secret: &MasterSecret,
        network: Network,
        account: u32,
    ) -> Result<Self, InheritError> {
        let secp = Secp256k1::new();
        let master =
            master_xpriv(secret, network).map_err(|e| InheritError::Escrow(e.to_string()))?;
        let xpriv = taproot_account_xpriv(&secp, &master, network, account)
            .map_err(|e| InheritError::Escrow(e.to_string()))?;
        Ok(Self {
            xpriv,
            xpub: account_xpub(&secp, &xpriv),
            fingerprint: master_fingerprint(&secp, &master),
        })
    }

    /// The account xpriv, for wiring a test co-signer.
    pub fn signing_xpriv(&self) -> &Xpriv {
        &self.xpriv
    }
}

impl EscrowIdentityProvider for StaticEscrow {
    fn account_xpub(&self) -> Xpub {
        self.xpub
    }

    fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escrow() -> StaticEscrow {
        let secret = MasterSecret::from_bytes(&[0x0Eu8; 16]).unwrap();
        StaticEscrow::from_secret(&secret, Network::Testnet, 0).unwrap()
    }

    #[test]
    fn test_static_escrow_is_deterministic() {
        let a = escrow();
        let b = escrow();
        assert_eq!(a.account_xpub(), b.account_xpub());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_xpub_matches_xpriv() {
        let secp = Secp256k1::new();
        let e = escrow();
        assert_eq!(e.account_xpub(), account_xpub(&secp, e.signing_xpriv()));
    }

    #[test]
    fn test_distinct_secrets_distinct_identities() {
        let other = StaticEscrow::from_secret(
            &MasterSecret::from_bytes(&[0x0Fu8; 16]).unwrap(),
            Network::Testnet,
            0,
        )
        .unwrap();
        assert_ne!(escrow().account_xpub(), other.account_xpub());
    }
}
