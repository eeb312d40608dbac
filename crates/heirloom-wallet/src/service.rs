//! Wallet service
//!
//! Orchestrates the pure core against the chain collaborator. Every
//! account is a single-writer resource behind its own async mutex:
//! concurrent refresh/issuance calls against one account serialize,
//! while different accounts proceed in parallel.
//!
//! Network failures degrade here (stale balances, empty UTXO sets) so a
//! caller can always render something; the transaction-building paths
//! below still fail loudly rather than construct an underfunded spend.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use bitcoin::bip32::Xpriv;
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Address, Amount, Network, Txid};
use tokio::sync::Mutex;

use heirloom_chain::{ChainClient, ChainSource, FeeTier, RetryPolicy};
use heirloom_core::{funding_descriptor, shared_descriptor, taproot_address};
use heirloom_inherit::{EscrowCosigner, EscrowIdentityProvider, LocalRole, SpendEligibility};

use crate::account::{Account, AccountKind, AddressRole, DerivedAddress};
use crate::builder;
use crate::coin_selection::{self, ScriptKind, SpendableUtxo, DUST_THRESHOLD_SATS};
use crate::handoff::{self, HandoffCoin};
use crate::store::AccountStore;
use crate::WalletError;

/// Preview of an activation sweep, shown before anything is signed or
/// broadcast.
#[derive(Debug, Clone)]
pub struct ActivationPlan {
    pub utxo_count: usize,
    pub swept_value: Amount,
    pub fee: Amount,
    pub destination: Address,
}

pub struct WalletService<C: ChainSource> {
    chain: ChainClient<C>,
    network: Network,
    secp: Secp256k1<All>,
    accounts: Mutex<HashMap<String, Arc<Mutex<Account>>>>,
    store: Option<Arc<dyn AccountStore>>,
}

impl<C: ChainSource> WalletService<C> {
    pub fn new(source: C, network: Network, policy: RetryPolicy) -> Self {
        Self {
            chain: ChainClient::new(source, policy),
            network,
            secp: Secp256k1::new(),
            accounts: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// Persist account snapshots through this store after mutations.
    pub fn with_store(mut self, store: Arc<dyn AccountStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register an account (typically loaded from the persistence
    /// collaborator).
    pub async fn insert_account(&self, mut account: Account) {
        account.rebuild_lookup();
        self.accounts
            .lock()
            .await
            .insert(account.id.clone(), Arc::new(Mutex::new(account)));
    }

    async fn handle(&self, id: &str) -> Result<Arc<Mutex<Account>>, WalletError> {
        self.accounts
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WalletError::UnknownAccount(id.to_string()))
    }

    /// A point-in-time copy of the account record.
    pub async fn snapshot(&self, id: &str) -> Result<Account, WalletError> {
        let handle = self.handle(id).await?;
        let guard = handle.lock().await;
        Ok(guard.clone())
    }

    async fn persist(&self, account: &Account) {
        if let Some(store) = &self.store {
            if let Err(err) = store.save_account(account).await {
                // Persistence is a collaborator; its failure must not
                // poison a completed wallet operation.
                log::error!("failed to persist account {}: {}", account.id, err);
            }
        }
    }

    /// Issue the next receive (or change) address of a standard
    /// account.
    pub async fn generate_new_address(
        &self,
        id: &str,
        is_change: bool,
    ) -> Result<Address, WalletError> {
        let handle = self.handle(id).await?;
        let mut account = handle.lock().await;
        if account.kind != AccountKind::Standard {
            return Err(WalletError::Build(
                "address issuance on an inheritance account goes through its stage-specific calls"
                    .into(),
            ));
        }

        let index = account.next_index(is_change);
        let address = taproot_address(&self.secp, &account.xpub, is_change, index, self.network)?;
        account.record_address(DerivedAddress {
            index,
            address: address.clone(),
            is_change,
            role: AddressRole::Unspecified,
            used: false,
            balance: Amount::ZERO,
        });
        self.persist(&account).await;
        Ok(address)
    }

    /// Issue the next funding deposit address of an inheritance
    /// account. Open only while the account is in its funding stage.
    pub async fn generate_funding_address(
        &self,
        id: &str,
        escrow: &dyn EscrowIdentityProvider,
    ) -> Result<Address, WalletError> {
        let handle = self.handle(id).await?;
        let mut account = handle.lock().await;
        let meta = account
            .inheritance
            .as_ref()
            .ok_or_else(|| WalletError::Build("not an inheritance account".into()))?;
        if meta.state.role != LocalRole::User {
            return Err(WalletError::Build(
                "only the user side issues funding addresses".into(),
            ));
        }
        if !meta.state.funding_open() {
            return Err(heirloom_inherit::InheritError::AlreadyActivated.into());
        }

        let branch = meta.state.funding_branch;
        let index = account.next_index(false);
        let script = funding_descriptor(
            &self.secp,
            &account.xpub,
            &escrow.account_xpub(),
            branch,
            false,
            index,
        )?;
        let address = script.address(self.network)?;
        account.record_address(DerivedAddress {
            index,
            address: address.clone(),
            is_change: false,
            role: AddressRole::Funding,
            used: false,
            balance: Amount::ZERO,
        });
        self.persist(&account).await;
        Ok(address)
    }

    /// Refresh per-address balances from the chain provider.
    ///
    /// Provider failures keep the previous (stale) figures and are only
    /// logged; the refreshed total is returned either way.
    pub async fn update_account_balance(&self, id: &str) -> Result<Amount, WalletError> {
        let handle = self.handle(id).await?;
        let mut account = handle.lock().await;

        let mut balances = HashMap::new();
        for entry in account.addresses() {
            match self.chain.address_balance(&entry.address).await {
                Ok(balance) => {
                    balances.insert(entry.address.clone(), balance);
                }
                Err(err) => {
                    log::warn!(
                        "balance refresh degraded for {} (keeping stale value): {}",
                        entry.address,
                        err
                    );
                }
            }
        }
        account.apply_balances(&balances);

        // An address that only held funds in the past still counts as
        // used; the history check fills in what balances alone miss.
        let unused: Vec<Address> = account
            .addresses()
            .iter()
            .filter(|a| !a.used)
            .map(|a| a.address.clone())
            .collect();
        for address in unused {
            match self.chain.transactions(&address).await {
                Ok(txids) if !txids.is_empty() => account.mark_used(&address),
                Ok(_) => {}
                Err(err) => {
                    log::debug!("history check degraded for {}: {}", address, err);
                }
            }
        }

        let total = account.balance;
        self.persist(&account).await;
        Ok(total)
    }

    /// Fresh spendable coins for the given address role.
    async fn spendable_utxos(
        &self,
        account: &Account,
        role: AddressRole,
    ) -> Result<Vec<SpendableUtxo>, WalletError> {
        let mut utxos = Vec::new();
        for entry in account.addresses().iter().filter(|a| a.role == role) {
            for utxo in self.chain.utxos(&entry.address).await? {
                utxos.push(SpendableUtxo {
                    txid: utxo.outpoint.txid,
                    vout: utxo.outpoint.vout,
                    value: utxo.value,
                    origin_index: entry.index,
                    is_change: entry.is_change,
                });
            }
        }
        Ok(utxos)
    }

    /// Send from a standard account: validate, select, build, sign,
    /// broadcast.
    pub async fn send(
        &self,
        id: &str,
        account_xpriv: &Xpriv,
        destination: &str,
        amount: Amount,
        tier: FeeTier,
    ) -> Result<Txid, WalletError> {
        // Fail fast on bad input before any network or signing work.
        let destination = Address::from_str(destination)
            .map_err(|e| WalletError::InvalidAddress(e.to_string()))?
            .require_network(self.network)
            .map_err(|e| WalletError::InvalidAddress(e.to_string()))?;
        if amount.to_sat() <= DUST_THRESHOLD_SATS {
            return Err(WalletError::InvalidAmount(format!(
                "{} sat does not clear the dust threshold",
                amount.to_sat()
            )));
        }

        let handle = self.handle(id).await?;
        let mut account = handle.lock().await;
        if account.kind != AccountKind::Standard {
            return Err(WalletError::Build(
                "spends from inheritance accounts use the co-signing flow".into(),
            ));
        }

        let fee_rate = self.chain.fee_estimates().await?.rate(tier);
        let utxos = self.spendable_utxos(&account, AddressRole::Unspecified).await?;
        let selection = coin_selection::select_inputs(&utxos, amount, fee_rate, ScriptKind::Taproot)?;

        let change_address = if selection.include_change {
            let index = account.next_index(true);
            let address = taproot_address(&self.secp, &account.xpub, true, index, self.network)?;
            account.record_address(DerivedAddress {
                index,
                address: address.clone(),
                is_change: true,
                role: AddressRole::Unspecified,
                used: false,
                balance: Amount::ZERO,
            });
            Some(address)
        } else {
            None
        };

        let built = builder::taproot_spend(
            &self.secp,
            account_xpriv,
            self.network,
            &selection,
            &destination,
            amount,
            change_address.as_ref(),
        )?;

        let txid = self.chain.broadcast(&built.tx).await?;
        log::info!("broadcast spend {} (fee {} sat)", txid, built.fee.to_sat());
        self.persist(&account).await;
        Ok(txid)
    }

    /// Earliest confirmed funding height across the account's funding
    /// addresses.
    async fn earliest_funding_height(&self, account: &Account) -> Result<Option<u32>, WalletError> {
        let mut earliest: Option<u32> = None;
        for entry in account
            .addresses()
            .iter()
            .filter(|a| a.role == AddressRole::Funding)
        {
            if let Some(height) = self.chain.first_funding_height(&entry.address).await? {
                earliest = Some(earliest.map_or(height, |e| e.min(height)));
            }
        }
        Ok(earliest)
    }

    /// Current spend eligibility of an inheritance account. Read-only;
    /// recomputed from chain heights on every call.
    pub async fn spend_eligibility(&self, id: &str) -> Result<SpendEligibility, WalletError> {
        let handle = self.handle(id).await?;
        let account = handle.lock().await;
        let meta = account
            .inheritance
            .as_ref()
            .ok_or_else(|| WalletError::Build("not an inheritance account".into()))?;

        let tip = self.chain.tip_height().await?;
        let funded = self.earliest_funding_height(&account).await?;
        Ok(meta.state.eligibility(tip, funded))
    }

    /// Preview the activation sweep without signing anything.
    pub async fn activation_plan(&self, id: &str) -> Result<ActivationPlan, WalletError> {
        let handle = self.handle(id).await?;
        let account = handle.lock().await;
        let meta = account
            .inheritance
            .as_ref()
            .ok_or_else(|| WalletError::Build("not an inheritance account".into()))?;
        meta.state.ensure_can_activate()?;

        let utxos = self.spendable_utxos(&account, AddressRole::Funding).await?;
        if utxos.is_empty() {
            return Err(WalletError::NoUtxos);
        }
        let swept_value: Amount = utxos.iter().map(|u| u.value).sum();
        let fee_rate = self.chain.fee_estimates().await?.rate(FeeTier::Medium);
        let fee = coin_selection::estimate_fee(ScriptKind::WshMultisig, utxos.len(), 1, fee_rate);

        let destination =
            shared_descriptor(&self.secp, &account.xpub, &meta.counterparty_xpub, false, 0)?
                .address(self.network)?;

        if swept_value <= fee + Amount::from_sat(DUST_THRESHOLD_SATS) {
            return Err(WalletError::InsufficientFunds {
                have: swept_value.to_sat(),
                need: fee.to_sat() + DUST_THRESHOLD_SATS,
            });
        }

        Ok(ActivationPlan {
            utxo_count: utxos.len(),
            swept_value,
            fee,
            destination,
        })
    }

    /// Activate the inheritance account: sweep every funding UTXO into
    /// the user+heir output, co-signed by the escrow party.
    ///
    /// One-way and idempotent-guarded: a second call fails with
    /// `AlreadyActivated` before any signing or broadcast work.
    pub async fn activate(
        &self,
        id: &str,
        account_xpriv: &Xpriv,
        escrow: &dyn EscrowIdentityProvider,
        cosigner: &dyn EscrowCosigner,
    ) -> Result<Txid, WalletError> {
        let handle = self.handle(id).await?;
        let mut account = handle.lock().await;
        let meta = account
            .inheritance
            .as_ref()
            .ok_or_else(|| WalletError::Build("not an inheritance account".into()))?;
        meta.state.ensure_can_activate()?;
        if meta.state.role != LocalRole::User {
            return Err(WalletError::Build(
                "only the user side triggers activation".into(),
            ));
        }
        let branch = meta.state.funding_branch;
        let counterparty_xpub = meta.counterparty_xpub;

        let utxos = self.spendable_utxos(&account, AddressRole::Funding).await?;
        if utxos.is_empty() {
            return Err(WalletError::NoUtxos);
        }
        let swept_value: Amount = utxos.iter().map(|u| u.value).sum();
        let fee_rate = self.chain.fee_estimates().await?.rate(FeeTier::Medium);
        let fee = coin_selection::estimate_fee(ScriptKind::WshMultisig, utxos.len(), 1, fee_rate);
        let output_value = swept_value
            .checked_sub(fee)
            .filter(|v| v.to_sat() > DUST_THRESHOLD_SATS)
            .ok_or(WalletError::InsufficientFunds {
                have: swept_value.to_sat(),
                need: fee.to_sat() + DUST_THRESHOLD_SATS,
            })?;

        // Destination: the user+heir 2-of-2 at leaf 0.
        let active_script =
            shared_descriptor(&self.secp, &account.xpub, &counterparty_xpub, false, 0)?;
        let destination = active_script.address(self.network)?;

        // This side's view of every funding coin.
        let mut coins = Vec::with_capacity(utxos.len());
        for utxo in &utxos {
            let script = funding_descriptor(
                &self.secp,
                &account.xpub,
                &escrow.account_xpub(),
                branch,
                utxo.is_change,
                utxo.origin_index,
            )?;
            let signing_key = account_xpriv
                .derive_priv(
                    &self.secp,
                    &[
                        bitcoin::bip32::ChildNumber::from_normal_idx(u32::from(utxo.is_change))
                            .map_err(|e| WalletError::Build(e.to_string()))?,
                        bitcoin::bip32::ChildNumber::from_normal_idx(utxo.origin_index)
                            .map_err(|e| WalletError::Build(e.to_string()))?,
                    ],
                )
                .map_err(|e| WalletError::Signing(e.to_string()))?
                .private_key;
            coins.push(HandoffCoin {
                outpoint: utxo.outpoint(),
                value: utxo.value,
                script_pubkey: script.script_pubkey(),
                witness_script: script.witness_script()?,
                signing_key,
            });
        }

        let mut psbt = handoff::build_psbt(
            &coins,
            vec![bitcoin::TxOut {
                value: output_value,
                script_pubkey: destination.script_pubkey(),
            }],
        )?;
        handoff::sign_inputs(&self.secp, &mut psbt, &coins)?;

        // Out-of-band leg: the escrow service countersigns.
        let psbt = cosigner.cosign_activation(psbt).await?;
        let tx = handoff::finalize(&psbt)?;
        let txid = self.chain.broadcast(&tx).await?;

        // Only a successful broadcast flips the stage.
        account
            .inheritance
            .as_mut()
            .ok_or_else(|| WalletError::Build("not an inheritance account".into()))?
            .state
            .mark_activated()?;
        account.record_address(DerivedAddress {
            index: 0,
            address: destination,
            is_change: false,
            role: AddressRole::Active,
            used: true,
            balance: output_value,
        });
        log::info!(
            "activation sweep {} broadcast: {} sat to the user+heir output (fee {} sat)",
            txid,
            output_value.to_sat(),
            fee.to_sat()
        );
        self.persist(&account).await;
        Ok(txid)
    }
}
