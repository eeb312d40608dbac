//! Partial-signature handoff between co-signers
//!
//! 2-of-2 spends are built by one party, carried out-of-band as a PSBT,
//! countersigned by the other, and finalized by whoever holds the
//! second signature:
//!
//! ```text
//! A: build_psbt ─ sign_inputs(A) ─ export_psbt ──►
//!                                   B: import_psbt ─ sign_inputs(B) ─ finalize ─ broadcast
//! ```
//!
//! The importer matches every input's txid:vout against coins it knows;
//! a foreign input aborts the whole import before any signature is
//! produced.

use bitcoin::psbt::Psbt;
use bitcoin::script::Instruction;
use bitcoin::secp256k1::{All, Secp256k1, SecretKey};
use bitcoin::{Amount, OutPoint, ScriptBuf, Transaction, TxOut};

use crate::builder::{multisig_signature, multisig_witness, unsigned_transaction};
use crate::WalletError;

/// Everything one co-signer knows about a 2-of-2 coin it can sign.
#[derive(Debug, Clone)]
pub struct HandoffCoin {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub script_pubkey: ScriptBuf,
    pub witness_script: ScriptBuf,
    /// This party's child key for the coin's leaf.
    pub signing_key: SecretKey,
}

/// Build the handoff container spending `coins` into `outputs`.
pub fn build_psbt(coins: &[HandoffCoin], outputs: Vec<TxOut>) -> Result<Psbt, WalletError> {
    if coins.is_empty() {
        return Err(WalletError::NoUtxos);
    }
    let outpoints: Vec<OutPoint> = coins.iter().map(|c| c.outpoint).collect();
    let tx = unsigned_transaction(&outpoints, outputs);
    let mut psbt = Psbt::from_unsigned_tx(tx).map_err(|e| WalletError::Build(e.to_string()))?;
    for (input, coin) in psbt.inputs.iter_mut().zip(coins) {
        input.witness_utxo = Some(TxOut {
            value: coin.value,
            script_pubkey: coin.script_pubkey.clone(),
        });
        input.witness_script = Some(coin.witness_script.clone());
    }
    Ok(psbt)
}

/// Serialize for the out-of-band trip to the co-signer.
pub fn export_psbt(psbt: &Psbt) -> Vec<u8> {
    psbt.serialize()
}

/// Parse a partially signed transaction received from the other party.
pub fn import_psbt(bytes: &[u8]) -> Result<Psbt, WalletError> {
    Psbt::deserialize(bytes).map_err(|e| WalletError::Build(e.to_string()))
}

/// Add this party's signature to every input.
///
/// All inputs are matched against `coins` first; an input this party
/// cannot place fails the call with [`WalletError::UnrecognizedInput`]
/// and leaves the PSBT untouched.
pub fn sign_inputs(
    secp: &Secp256k1<All>,
    psbt: &mut Psbt,
    coins: &[HandoffCoin],
) -> Result<usize, WalletError> {
    let mut matched = Vec::with_capacity(psbt.unsigned_tx.input.len());
    for txin in &psbt.unsigned_tx.input {
        let coin = coins
            .iter()
            .find(|c| c.outpoint == txin.previous_output)
            .ok_or(WalletError::UnrecognizedInput(txin.previous_output))?;
        matched.push(coin);
    }

    let tx = psbt.unsigned_tx.clone();
    for (index, coin) in matched.into_iter().enumerate() {
        let signature =
            multisig_signature(secp, &tx, index, &coin.witness_script, coin.value, &coin.signing_key)?;
        let pubkey = bitcoin::PublicKey::new(coin.signing_key.public_key(secp));

        let input = &mut psbt.inputs[index];
        // The builder side already populated these; an importer whose
        // counterpart stripped them refills from its own records.
        if input.witness_utxo.is_none() {
            input.witness_utxo = Some(TxOut {
                value: coin.value,
                script_pubkey: coin.script_pubkey.clone(),
            });
        }
        if input.witness_script.is_none() {
            input.witness_script = Some(coin.witness_script.clone());
        }
        input.partial_sigs.insert(pubkey, signature);
    }
    Ok(psbt.inputs.len())
}

/// Public keys in the order the witness script pushes them.
fn script_keys(script: &ScriptBuf) -> Result<Vec<bitcoin::PublicKey>, WalletError> {
    let mut keys = Vec::new();
    for instruction in script.instructions() {
        let instruction = instruction.map_err(|e| WalletError::Build(e.to_string()))?;
        if let Instruction::PushBytes(push) = instruction {
            if push.len() == 33 {
                if let Ok(key) = bitcoin::PublicKey::from_slice(push.as_bytes()) {
                    keys.push(key);
                }
            }
        }
    }
    if keys.len() == 2 {
        Ok(keys)
    } else {
        Err(WalletError::Build(format!(
            "witness script pushes {} keys, expected 2",
            keys.len()
        )))
    }
}

/// Assemble the final witnesses once both signatures are present.
pub fn finalize(psbt: &Psbt) -> Result<Transaction, WalletError> {
    let mut tx = psbt.unsigned_tx.clone();
    for (index, input) in psbt.inputs.iter().enumerate() {
        let witness_script = input.witness_script.as_ref().ok_or_else(|| {
            WalletError::Build(format!("input {index} carries no witness script"))
        })?;

        let mut ordered = Vec::with_capacity(2);
        for key in script_keys(witness_script)? {
            let signature = input.partial_sigs.get(&key).ok_or_else(|| {
                WalletError::Signing(format!("input {index} is missing the signature for {key}"))
            })?;
            ordered.push(signature);
        }

        tx.input[index].witness = multisig_witness([ordered[0], ordered[1]], witness_script);
    }
    Ok(tx)
}
