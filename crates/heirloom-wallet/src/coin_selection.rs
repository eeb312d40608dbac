//! Coin selection and fee estimation
//!
//! Greedy largest-first selection: deterministic and simple, at the
//! cost of occasionally spending a slightly larger input set than an
//! optimal-subset search would. Fees come from a fixed linear virtual-
//! size model with per-script-type input/output costs; change below the
//! dust threshold is folded into the fee instead of creating an
//! uneconomical output.

use bitcoin::{Amount, OutPoint, Txid};
use serde::{Deserialize, Serialize};

use crate::WalletError;

/// Output script family, which drives the vsize model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptKind {
    /// Single-sig Taproot key spend.
    Taproot,
    /// 2-of-2 multisig inside P2WSH.
    WshMultisig,
}

impl ScriptKind {
    /// Virtual bytes one input of this kind contributes.
    fn input_vbytes(self) -> u64 {
        match self {
            // outpoint + sequence + 64-byte Schnorr witness, discounted
            ScriptKind::Taproot => 58,
            // two DER signatures plus the witness script, discounted
            ScriptKind::WshMultisig => 105,
        }
    }

    /// Virtual bytes one output of this kind contributes.
    fn output_vbytes(self) -> u64 {
        match self {
            ScriptKind::Taproot => 43,
            ScriptKind::WshMultisig => 43,
        }
    }
}

/// Fixed transaction overhead in virtual bytes (version, locktime,
/// counts, segwit marker).
const BASE_VBYTES: u64 = 11;

/// Outputs below this many satoshis are not worth creating.
pub const DUST_THRESHOLD_SATS: u64 = 330;

/// Linear estimate of transaction virtual size.
pub fn estimate_vsize(kind: ScriptKind, inputs: usize, outputs: usize) -> u64 {
    BASE_VBYTES + kind.input_vbytes() * inputs as u64 + kind.output_vbytes() * outputs as u64
}

/// Fee for the estimated size at a sat/vB rate.
pub fn estimate_fee(kind: ScriptKind, inputs: usize, outputs: usize, rate: u64) -> Amount {
    Amount::from_sat(estimate_vsize(kind, inputs, outputs) * rate)
}

/// A spendable coin, freshly fetched from the chain provider. Never
/// persisted: the provider is re-queried per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendableUtxo {
    pub txid: Txid,
    pub vout: u32,
    pub value: Amount,
    /// Leaf index of the address this coin sits on.
    pub origin_index: u32,
    pub is_change: bool,
}

impl SpendableUtxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid,
            vout: self.vout,
        }
    }
}

/// Result of input selection.
#[derive(Debug, Clone)]
pub struct InputSelection {
    /// Chosen coins, largest first.
    pub selected: Vec<SpendableUtxo>,
    /// Fee implied by the chosen shape (absorbs sub-dust remainders).
    pub fee: Amount,
    /// Change to return, zero when `include_change` is false.
    pub change: Amount,
    /// Whether the transaction carries a change output.
    pub include_change: bool,
}

/// Pick inputs to cover `target` at `fee_rate`.
///
/// Candidates are sorted by value descending and accumulated until the
/// running total covers target plus the no-change fee. The change
/// output is kept only if what remains after paying the two-output fee
/// clears the dust threshold; otherwise the remainder is folded into
/// the fee.
pub fn select_inputs(
    utxos: &[SpendableUtxo],
    target: Amount,
    fee_rate: u64,
    kind: ScriptKind,
) -> Result<InputSelection, WalletError> {
    if target == Amount::ZERO {
        return Err(WalletError::InvalidAmount("amount must be positive".into()));
    }
    if fee_rate == 0 {
        return Err(WalletError::InvalidFeeRate(fee_rate));
    }
    if utxos.is_empty() {
        return Err(WalletError::NoUtxos);
    }

    let mut candidates = utxos.to_vec();
    candidates.sort_by(|a, b| b.value.cmp(&a.value));

    let mut selected = Vec::new();
    let mut total = Amount::ZERO;

    for utxo in candidates {
        total += utxo.value;
        selected.push(utxo);

        let fee_no_change = estimate_fee(kind, selected.len(), 1, fee_rate);
        let needed = target + fee_no_change;
        if total < needed {
            continue;
        }

        let fee_with_change = estimate_fee(kind, selected.len(), 2, fee_rate);
        let change = total
            .checked_sub(target + fee_with_change)
            .unwrap_or(Amount::ZERO);

        return Ok(if change.to_sat() > DUST_THRESHOLD_SATS {
            InputSelection {
                selected,
                fee: fee_with_change,
                change,
                include_change: true,
            }
        } else {
            // Remainder is not worth an output; it rides as fee.
            InputSelection {
                fee: total - target,
                selected,
                change: Amount::ZERO,
                include_change: false,
            }
        });
    }

    let need = target + estimate_fee(kind, selected.len(), 1, fee_rate);
    Err(WalletError::InsufficientFunds {
        have: total.to_sat(),
        need: need.to_sat(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn txid(n: u8) -> Txid {
        Txid::from_str(&format!("{:064x}", n)).unwrap()
    }

    fn utxo(n: u8, sats: u64) -> SpendableUtxo {
        SpendableUtxo {
            txid: txid(n),
            vout: 0,
            value: Amount::from_sat(sats),
            origin_index: u32::from(n),
            is_change: false,
        }
    }

    #[test]
    fn test_largest_single_input_when_it_covers() {
        let utxos = vec![utxo(1, 5000), utxo(2, 3000), utxo(3, 1000)];
        let result =
            select_inputs(&utxos, Amount::from_sat(4000), 1, ScriptKind::Taproot).unwrap();

        // 5000 covers 4000 + fee for one input, so nothing else joins.
        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.selected[0].value, Amount::from_sat(5000));
        let spent: Amount = result.selected.iter().map(|u| u.value).sum();
        assert!(spent >= Amount::from_sat(4000) + result.fee);
    }

    #[test]
    fn test_accumulates_until_covered() {
        let utxos = vec![utxo(1, 5000), utxo(2, 3000), utxo(3, 1000)];
        let result =
            select_inputs(&utxos, Amount::from_sat(7000), 2, ScriptKind::Taproot).unwrap();

        assert!(result.selected.len() >= 2);
        // Largest first: 5000 then 3000.
        assert_eq!(result.selected[0].value, Amount::from_sat(5000));
        assert_eq!(result.selected[1].value, Amount::from_sat(3000));
        let spent: Amount = result.selected.iter().map(|u| u.value).sum();
        assert!(spent >= Amount::from_sat(7000) + result.fee);
    }

    #[test]
    fn test_insufficient_funds() {
        let utxos = vec![utxo(1, 5000), utxo(2, 3000), utxo(3, 1000)];
        let err =
            select_inputs(&utxos, Amount::from_sat(50_000), 1, ScriptKind::Taproot).unwrap_err();
        match err {
            WalletError::InsufficientFunds { have, need } => {
                assert_eq!(have, 9000);
                assert!(need > 50_000);
            }
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }
    }

    #[test]
    fn test_change_above_dust_is_returned() {
        let utxos = vec![utxo(1, 100_000)];
        let result =
            select_inputs(&utxos, Amount::from_sat(40_000), 1, ScriptKind::Taproot).unwrap();

        assert!(result.include_change);
        let fee_with_change = estimate_fee(ScriptKind::Taproot, 1, 2, 1);
        assert_eq!(result.fee, fee_with_change);
        assert_eq!(
            result.change,
            Amount::from_sat(100_000 - 40_000) - fee_with_change
        );
        // Value is conserved: inputs = target + change + fee.
        assert_eq!(
            Amount::from_sat(100_000),
            Amount::from_sat(40_000) + result.change + result.fee
        );
    }

    #[test]
    fn test_sub_dust_change_folds_into_fee() {
        // Remainder after the no-change fee is 300 sat, under the dust
        // threshold, so no change output is created.
        let fee_no_change = estimate_fee(ScriptKind::Taproot, 1, 1, 1);
        let target = 10_000u64;
        let utxos = vec![utxo(1, target + fee_no_change.to_sat() + 300)];

        let result =
            select_inputs(&utxos, Amount::from_sat(target), 1, ScriptKind::Taproot).unwrap();
        assert!(!result.include_change);
        assert_eq!(result.change, Amount::ZERO);
        assert_eq!(result.fee, fee_no_change + Amount::from_sat(300));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let utxos = vec![utxo(1, 5000)];
        assert!(matches!(
            select_inputs(&utxos, Amount::ZERO, 1, ScriptKind::Taproot),
            Err(WalletError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_zero_fee_rate_rejected() {
        let utxos = vec![utxo(1, 5000)];
        assert!(matches!(
            select_inputs(&utxos, Amount::from_sat(1000), 0, ScriptKind::Taproot),
            Err(WalletError::InvalidFeeRate(0))
        ));
    }

    #[test]
    fn test_empty_utxo_set_rejected() {
        assert!(matches!(
            select_inputs(&[], Amount::from_sat(1000), 1, ScriptKind::Taproot),
            Err(WalletError::NoUtxos)
        ));
    }

    #[test]
    fn test_multisig_inputs_cost_more() {
        assert!(
            estimate_vsize(ScriptKind::WshMultisig, 2, 1)
                > estimate_vsize(ScriptKind::Taproot, 2, 1)
        );
    }

    #[test]
    fn test_selection_is_deterministic() {
        let utxos = vec![utxo(3, 1000), utxo(1, 5000), utxo(2, 3000)];
        let a = select_inputs(&utxos, Amount::from_sat(5500), 1, ScriptKind::Taproot).unwrap();
        let b = select_inputs(&utxos, Amount::from_sat(5500), 1, ScriptKind::Taproot).unwrap();
        let ids_a: Vec<_> = a.selected.iter().map(|u| u.outpoint()).collect();
        let ids_b: Vec<_> = b.selected.iter().map(|u| u.outpoint()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
