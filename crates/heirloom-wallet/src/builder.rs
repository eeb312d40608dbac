//! Transaction construction and signing
//!
//! Builds unsigned transactions from selected coins and signs each
//! input for its script type: BIP-341 key-tweaked Schnorr for Taproot,
//! ECDSA under SIGHASH_ALL for 2-of-2 multisig-in-segwit. Nothing here
//! touches the network; finished transactions go to the chain
//! collaborator for broadcast.

use bitcoin::absolute::LockTime;
use bitcoin::bip32::Xpriv;
use bitcoin::hashes::Hash;
use bitcoin::key::TapTweak;
use bitcoin::secp256k1::{All, Keypair, Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};

use heirloom_core::{account_xpub, taproot_address, taproot_signing_keypair};

use crate::coin_selection::{InputSelection, SpendableUtxo};
use crate::WalletError;

/// A signed transaction and the fee it pays.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub tx: Transaction,
    pub fee: Amount,
}

/// Assemble the unsigned skeleton: version 2, no locktime, RBF
/// signaling on every input.
pub fn unsigned_transaction(outpoints: &[OutPoint], outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: outpoints
            .iter()
            .map(|outpoint| TxIn {
                previous_output: *outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::default(),
            })
            .collect(),
        output: outputs,
    }
}

/// Build and fully sign a single-sig Taproot spend.
///
/// Every selected coin's signing key is derived from its recorded leaf
/// (change flag + index); a change output is required exactly when the
/// selection carries change.
pub fn taproot_spend(
    secp: &Secp256k1<All>,
    account: &Xpriv,
    network: Network,
    selection: &InputSelection,
    destination: &Address,
    amount: Amount,
    change_address: Option<&Address>,
) -> Result<BuiltTransaction, WalletError> {
    let xpub = account_xpub(secp, account);

    let mut outputs = vec![TxOut {
        value: amount,
        script_pubkey: destination.script_pubkey(),
    }];
    if selection.include_change {
        let change_address = change_address.ok_or_else(|| {
            WalletError::Build("selection carries change but no change address given".into())
        })?;
        outputs.push(TxOut {
            value: selection.change,
            script_pubkey: change_address.script_pubkey(),
        });
    }

    let outpoints: Vec<OutPoint> = selection
        .selected
        .iter()
        .map(SpendableUtxo::outpoint)
        .collect();
    let mut tx = unsigned_transaction(&outpoints, outputs);

    let mut prevouts = Vec::with_capacity(selection.selected.len());
    let mut keypairs = Vec::with_capacity(selection.selected.len());
    for utxo in &selection.selected {
        let address = taproot_address(secp, &xpub, utxo.is_change, utxo.origin_index, network)?;
        prevouts.push(TxOut {
            value: utxo.value,
            script_pubkey: address.script_pubkey(),
        });
        keypairs.push(taproot_signing_keypair(
            secp,
            account,
            utxo.is_change,
            utxo.origin_index,
        )?);
    }

    let witnesses = sign_taproot_inputs(secp, &tx, &prevouts, &keypairs)?;
    for (input, witness) in tx.input.iter_mut().zip(witnesses) {
        input.witness = witness;
    }

    Ok(BuiltTransaction {
        tx,
        fee: selection.fee,
    })
}

/// Schnorr-sign every input of a Taproot key-spend.
fn sign_taproot_inputs(
    secp: &Secp256k1<All>,
    tx: &Transaction,
    prevouts: &[TxOut],
    keypairs: &[Keypair],
) -> Result<Vec<Witness>, WalletError> {
    let mut cache = SighashCache::new(tx);
    let mut witnesses = Vec::with_capacity(keypairs.len());
    for (index, keypair) in keypairs.iter().enumerate() {
        let sighash = cache
            .taproot_key_spend_signature_hash(
                index,
                &Prevouts::All(prevouts),
                TapSighashType::Default,
            )
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        let msg = Message::from_digest(sighash.to_byte_array());

        // BIP-341 key-path: sign under the tweaked key. The tweak
        // handles the even-y negation of the internal key.
        let tweaked = keypair.tap_tweak(secp, None);
        let signature = bitcoin::taproot::Signature {
            signature: secp.sign_schnorr(&msg, &tweaked.to_inner()),
            sighash_type: TapSighashType::Default,
        };
        witnesses.push(Witness::from_slice(&[signature.to_vec()]));
    }
    Ok(witnesses)
}

/// One co-signer's ECDSA signature over a P2WSH multisig input.
pub fn multisig_signature(
    secp: &Secp256k1<All>,
    tx: &Transaction,
    input_index: usize,
    witness_script: &ScriptBuf,
    value: Amount,
    key: &SecretKey,
) -> Result<bitcoin::ecdsa::Signature, WalletError> {
    let mut cache = SighashCache::new(tx);
    let sighash = cache
        .p2wsh_signature_hash(input_index, witness_script, value, EcdsaSighashType::All)
        .map_err(|e| WalletError::Signing(e.to_string()))?;
    let msg = Message::from_digest(sighash.to_byte_array());
    Ok(bitcoin::ecdsa::Signature {
        signature: secp.sign_ecdsa(&msg, key),
        sighash_type: EcdsaSighashType::All,
    })
}

/// Witness for a satisfied 2-of-2 P2WSH input: the null dummy element
/// CHECKMULTISIG pops, both signatures in script key order, then the
/// witness script itself.
pub fn multisig_witness(
    signatures: [&bitcoin::ecdsa::Signature; 2],
    witness_script: &ScriptBuf,
) -> Witness {
    Witness::from_slice(&[
        Vec::new(),
        signatures[0].to_vec(),
        signatures[1].to_vec(),
        witness_script.to_bytes(),
    ])
}
