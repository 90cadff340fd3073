use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::*;
use solana_pubkey::Pubkey;
use solana_sdk::{
    signature::{Keypair, Signature},
    transaction::{TransactionError, VersionedTransaction},
};
use solclaim_rpc_client::AddressLookupTableSnapshot;
use tokio::time::{sleep, Instant};

use crate::{
    blockhash::BlockhashMode,
    builder::TransactionBuilder,
    error::{ReclaimError, ReclaimResult},
    events::{EventSender, ReclaimEvent},
    rpc::LedgerRpc,
    types::{
        lamports_to_sol, BatchError, CloseAccountsOptions,
        CloseAccountsResult, CloseWithAltOptions, CloseWithAltResult,
        ClosePhase, ReclaimTransaction, SimulateCloseOutcome,
        TokenAccountInfo, ALT_BATCH_SIZE, ALT_FALLBACK_BATCH_SIZE,
        DEFAULT_BATCH_SIZE, SMALL_ACCOUNT_THRESHOLD, SMALL_BATCH_SIZE,
    },
};

/// Bounded wait for a submitted lookup table to become active.
pub const ALT_ACTIVATION_TIMEOUT: Duration = Duration::from_millis(15_000);

/// How long to wait in between lookup table activation checks.
pub const ALT_ACTIVATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wallet-adapter style bulk signer: receives the full ordered
/// transaction list exactly once per run, before submission begins.
#[async_trait]
pub trait SignAllTransactions: Send + Sync {
    async fn sign_all(
        &self,
        transactions: Vec<ReclaimTransaction>,
    ) -> ReclaimResult<Vec<ReclaimTransaction>>;
}

/// The signing strategy of a close run, resolved once at its start.
/// A run either signs every transaction with one local keypair or hands
/// the whole list to an external signer; the two are never mixed.
pub enum ReclaimSigner<'a> {
    Local(&'a Keypair),
    External(&'a dyn SignAllTransactions),
}

/// Drives the sign/broadcast/confirm pipeline over ordered transaction
/// batches and aggregates partial success into one result.
///
/// Batches are processed strictly sequentially: they share a recent
/// blockhash and wallet UIs expect one approval flow at a time.
pub struct TransactionExecutor {
    rpc: Arc<dyn LedgerRpc>,
}

impl TransactionExecutor {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self { rpc }
    }

    fn builder(&self, mode: BlockhashMode) -> TransactionBuilder {
        TransactionBuilder::new(self.rpc.clone()).with_blockhash_mode(mode)
    }

    /// Plain batching close flow for either signing strategy.
    /// `payer` receives the reclaimed rent and is the close authority.
    pub async fn close_accounts(
        &self,
        accounts: &[TokenAccountInfo],
        payer: &Pubkey,
        signer: ReclaimSigner<'_>,
        options: CloseAccountsOptions,
    ) -> ReclaimResult<CloseAccountsResult> {
        let batch_size = options.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        let transactions = self
            .builder(options.blockhash_mode)
            .build_close_transactions(accounts, payer, payer, payer, batch_size)
            .await?;
        let events = EventSender::new(options.events);

        match signer {
            ReclaimSigner::Local(keypair) => Ok(self
                .execute_batches(
                    transactions,
                    accounts,
                    Some(keypair),
                    options.simulate,
                    &events,
                )
                .await),
            ReclaimSigner::External(bulk_signer) => {
                let signed =
                    Self::bulk_sign(bulk_signer, transactions).await?;
                Ok(self
                    .execute_batches(
                        signed,
                        accounts,
                        None,
                        options.simulate,
                        &events,
                    )
                    .await)
            }
        }
    }

    /// Lookup-table-aware close flow. Small account counts skip the table
    /// entirely; any failure in the table path falls back to plain
    /// batching with a smaller batch size, exactly once.
    pub async fn close_accounts_with_alt(
        &self,
        accounts: &[TokenAccountInfo],
        wallet: &Pubkey,
        signer: &dyn SignAllTransactions,
        options: CloseWithAltOptions,
    ) -> ReclaimResult<CloseWithAltResult> {
        let events = EventSender::new(options.events);

        // Below the threshold the table overhead exceeds its savings.
        if accounts.len() <= SMALL_ACCOUNT_THRESHOLD {
            let batch_size = options.batch_size.unwrap_or(SMALL_BATCH_SIZE);
            return self
                .close_with_legacy_fallback(
                    accounts,
                    wallet,
                    signer,
                    batch_size,
                    options.blockhash_mode,
                    options.simulate,
                    &events,
                )
                .await;
        }

        match self
            .try_close_with_alt(
                accounts,
                wallet,
                signer,
                options.batch_size,
                options.blockhash_mode,
                options.simulate,
                &events,
            )
            .await
        {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(
                    "ALT setup failed, falling back to legacy transactions: {err}"
                );
                events.phase(ClosePhase::FallbackLegacy);
                let batch_size =
                    options.batch_size.unwrap_or(ALT_FALLBACK_BATCH_SIZE);
                self.close_with_legacy_fallback(
                    accounts,
                    wallet,
                    signer,
                    batch_size,
                    options.blockhash_mode,
                    options.simulate,
                    &events,
                )
                .await
            }
        }
    }

    async fn try_close_with_alt(
        &self,
        accounts: &[TokenAccountInfo],
        wallet: &Pubkey,
        signer: &dyn SignAllTransactions,
        batch_size: Option<usize>,
        blockhash_mode: BlockhashMode,
        simulate: bool,
        events: &EventSender,
    ) -> ReclaimResult<CloseWithAltResult> {
        let builder = self.builder(blockhash_mode);

        events.phase(ClosePhase::BuildingAlt);
        let (setup_txs, alt_address) = builder
            .build_alt_setup_transactions(accounts, wallet)
            .await?;

        events.phase(ClosePhase::SigningAlt);
        let signed_setup = Self::bulk_sign(signer, setup_txs).await?;

        events.phase(ClosePhase::ConfirmingAlt);
        for tx in &signed_setup {
            self.send_and_confirm(tx).await?;
        }

        events.phase(ClosePhase::WaitingAlt);
        let table = self.wait_for_alt_activation(&alt_address).await?;

        events.phase(ClosePhase::BuildingClose);
        let close_batch_size = batch_size.unwrap_or(ALT_BATCH_SIZE);
        let close_txs = builder
            .build_close_transactions_with_alt(
                accounts,
                wallet,
                wallet,
                wallet,
                &table,
                close_batch_size,
            )
            .await?;

        events.phase(ClosePhase::SigningClose);
        let signed_close = Self::bulk_sign(signer, close_txs).await?;

        events.phase(ClosePhase::ConfirmingClose);
        let outcome = self
            .execute_batches(signed_close, accounts, None, simulate, events)
            .await;

        Ok(CloseWithAltResult {
            outcome,
            used_alt: true,
            alt_address: Some(alt_address),
        })
    }

    async fn close_with_legacy_fallback(
        &self,
        accounts: &[TokenAccountInfo],
        wallet: &Pubkey,
        signer: &dyn SignAllTransactions,
        batch_size: usize,
        blockhash_mode: BlockhashMode,
        simulate: bool,
        events: &EventSender,
    ) -> ReclaimResult<CloseWithAltResult> {
        events.phase(ClosePhase::BuildingClose);
        let transactions = self
            .builder(blockhash_mode)
            .build_close_transactions(accounts, wallet, wallet, wallet, batch_size)
            .await?;

        events.phase(ClosePhase::SigningClose);
        let signed = Self::bulk_sign(signer, transactions).await?;

        events.phase(ClosePhase::ConfirmingClose);
        let outcome = self
            .execute_batches(signed, accounts, None, simulate, events)
            .await;

        Ok(CloseWithAltResult {
            outcome,
            used_alt: false,
            alt_address: None,
        })
    }

    /// Single-account dry-run sanity check, independent of the batch
    /// engine. Never errors; failures are reported in the outcome.
    pub async fn simulate_close(
        &self,
        accounts: &[TokenAccountInfo],
        wallet: &Pubkey,
    ) -> SimulateCloseOutcome {
        match self.try_simulate_close(accounts, wallet).await {
            Ok(None) => SimulateCloseOutcome {
                success: true,
                error: None,
            },
            Ok(Some(err)) => SimulateCloseOutcome {
                success: false,
                error: Some(format!("{err:?}")),
            },
            Err(err) => SimulateCloseOutcome {
                success: false,
                error: Some(err.to_string()),
            },
        }
    }

    async fn try_simulate_close(
        &self,
        accounts: &[TokenAccountInfo],
        wallet: &Pubkey,
    ) -> ReclaimResult<Option<TransactionError>> {
        let sample = &accounts[..accounts.len().min(1)];
        let transactions = self
            .builder(BlockhashMode::default())
            .build_close_transactions(sample, wallet, wallet, wallet, 1)
            .await?;

        let Some(tx) = transactions.first() else {
            return Ok(None);
        };
        self.rpc.simulate_transaction(tx).await
    }

    // -----------------
    // Batch loop
    // -----------------

    /// Processes batches strictly in order. One batch's failure never
    /// aborts the run; it is recorded and the loop continues.
    ///
    /// Accounting is positional: each successful batch contributes
    /// `ceil(total / batches)` accounts (capped by the remainder), and
    /// reclaimed lamports are summed over the first `closed_count`
    /// accounts in input order. A partially executed batch would be
    /// mis-accounted; per-account verification is a possible future
    /// refinement.
    async fn execute_batches(
        &self,
        transactions: Vec<ReclaimTransaction>,
        accounts: &[TokenAccountInfo],
        local_signer: Option<&Keypair>,
        simulate: bool,
        events: &EventSender,
    ) -> CloseAccountsResult {
        let total_batches = transactions.len();
        if total_batches == 0 {
            return CloseAccountsResult::empty_success();
        }
        let per_batch = accounts.len().div_ceil(total_batches);

        let mut signatures = Vec::new();
        let mut errors = Vec::new();
        let mut closed_count = 0usize;

        for (index, tx) in transactions.iter().enumerate() {
            events.send(ReclaimEvent::BatchStarted {
                batch_index: index,
                total_batches,
            });

            match self
                .process_batch(tx, local_signer, simulate, index)
                .await
            {
                Ok(signature) => {
                    closed_count += per_batch
                        .min(accounts.len().saturating_sub(index * per_batch));
                    signatures.push(signature.clone());
                    if !simulate {
                        events.send(ReclaimEvent::BatchCompleted {
                            batch_index: index,
                            total_batches,
                            signature,
                        });
                    }
                }
                Err(err) => {
                    let error = err.to_string();
                    warn!("Batch {index} failed: {error}");
                    errors.push(BatchError {
                        batch_index: index,
                        error: error.clone(),
                    });
                    events.send(ReclaimEvent::BatchFailed {
                        batch_index: index,
                        error,
                    });
                }
            }
        }

        let reclaimed_lamports = accounts
            .iter()
            .take(closed_count)
            .map(|account| account.rent_lamports)
            .sum::<u64>();

        CloseAccountsResult {
            success: errors.is_empty(),
            closed_count,
            failed_count: accounts.len() - closed_count,
            reclaimed_lamports,
            reclaimed_sol: lamports_to_sol(reclaimed_lamports),
            signatures,
            errors,
        }
    }

    async fn process_batch(
        &self,
        tx: &ReclaimTransaction,
        local_signer: Option<&Keypair>,
        simulate: bool,
        index: usize,
    ) -> ReclaimResult<String> {
        let tx = match local_signer {
            Some(keypair) => sign_with_keypair(tx, keypair)?,
            None => tx.clone(),
        };

        if simulate {
            // A simulation reporting an on chain error counts as a failed
            // batch, so a dry run predicts which batches would fail.
            if let Some(err) = self.rpc.simulate_transaction(&tx).await? {
                return Err(ReclaimError::TransactionFailed(
                    err,
                    Signature::default(),
                ));
            }
            Ok(format!("simulated-{index}"))
        } else {
            let signature = self.send_and_confirm(&tx).await?;
            Ok(signature.to_string())
        }
    }

    async fn send_and_confirm(
        &self,
        tx: &ReclaimTransaction,
    ) -> ReclaimResult<Signature> {
        let signature = self.rpc.send_transaction(tx).await?;
        if let Some(err) = self.rpc.confirm_transaction(&signature).await? {
            return Err(ReclaimError::TransactionFailed(err, signature));
        }
        Ok(signature)
    }

    async fn bulk_sign(
        signer: &dyn SignAllTransactions,
        transactions: Vec<ReclaimTransaction>,
    ) -> ReclaimResult<Vec<ReclaimTransaction>> {
        let expected = transactions.len();
        let signed = signer.sign_all(transactions).await?;
        if signed.len() != expected {
            return Err(ReclaimError::ExternalSignerMismatch {
                expected,
                actual: signed.len(),
            });
        }
        Ok(signed)
    }

    /// Polls the lookup table until it is active with its addresses
    /// populated. Timing out is a hard error so the caller falls back to
    /// plain batching; the abandoned table is never retried.
    async fn wait_for_alt_activation(
        &self,
        address: &Pubkey,
    ) -> ReclaimResult<AddressLookupTableSnapshot> {
        let start = Instant::now();
        while start.elapsed() < ALT_ACTIVATION_TIMEOUT {
            if let Some(table) = self.rpc.get_lookup_table(address).await? {
                if table.is_active() && !table.addresses.is_empty() {
                    return Ok(table);
                }
            }
            trace!("Waiting for lookup table {address} to activate");
            sleep(ALT_ACTIVATION_POLL_INTERVAL).await;
        }
        Err(ReclaimError::AltActivationTimedOut)
    }
}

fn sign_with_keypair(
    tx: &ReclaimTransaction,
    keypair: &Keypair,
) -> ReclaimResult<ReclaimTransaction> {
    match tx {
        ReclaimTransaction::Legacy(tx) => {
            let mut tx = tx.clone();
            let recent_blockhash = tx.message.recent_blockhash;
            tx.try_sign(&[keypair], recent_blockhash)?;
            Ok(ReclaimTransaction::Legacy(tx))
        }
        ReclaimTransaction::Versioned(tx) => {
            let signed =
                VersionedTransaction::try_new(tx.message.clone(), &[keypair])?;
            Ok(ReclaimTransaction::Versioned(signed))
        }
    }
}
