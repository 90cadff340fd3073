use std::{str::FromStr, sync::Arc};

use solana_pubkey::Pubkey;
use solana_sdk::{
    commitment_config::CommitmentConfig, signature::Keypair, signer::Signer,
};
use solclaim_rpc_client::SolclaimRpcClient;

use crate::{
    error::{ReclaimError, ReclaimResult},
    executor::{ReclaimSigner, SignAllTransactions, TransactionExecutor},
    rpc::LedgerRpc,
    scanner::AccountScanner,
    types::{
        CloseAccountsOptions, CloseAccountsResult, CloseWithAltOptions,
        CloseWithAltResult, ScanResult, SimulateCloseOutcome,
        TokenAccountInfo,
    },
};

/// Configuration of the [RentReclaimer] facade.
#[derive(Debug, Clone, Default)]
pub struct ReclaimerConfig {
    /// RPC endpoint to connect to. Required unless a client is injected
    /// via [RentReclaimer::with_rpc].
    pub rpc_endpoint: Option<String>,
    /// Commitment for the underlying client. Defaults to confirmed.
    pub commitment: Option<CommitmentConfig>,
}

/// The reclaim facade: scans a wallet for empty token accounts and
/// drives the close flows, with or without the lookup table
/// optimization.
pub struct RentReclaimer {
    rpc: Arc<dyn LedgerRpc>,
    scanner: AccountScanner,
    executor: TransactionExecutor,
}

impl std::fmt::Debug for RentReclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RentReclaimer").finish_non_exhaustive()
    }
}

impl RentReclaimer {
    pub fn new(config: ReclaimerConfig) -> ReclaimResult<Self> {
        let Some(endpoint) = &config.rpc_endpoint else {
            return Err(ReclaimError::MissingRpcEndpoint);
        };
        let commitment =
            config.commitment.unwrap_or(CommitmentConfig::confirmed());
        let rpc: Arc<dyn LedgerRpc> = Arc::new(
            SolclaimRpcClient::new_with_endpoint(endpoint, commitment),
        );
        Ok(Self::with_rpc(rpc))
    }

    /// Builds a reclaimer over an injected ledger client.
    pub fn with_rpc(rpc: Arc<dyn LedgerRpc>) -> Self {
        let scanner = AccountScanner::new(rpc.clone());
        let executor = TransactionExecutor::new(rpc.clone());
        Self {
            rpc,
            scanner,
            executor,
        }
    }

    pub fn rpc(&self) -> &Arc<dyn LedgerRpc> {
        &self.rpc
    }

    /// Validates a textual wallet address. A malformed address is a fatal
    /// error raised before any batch work starts.
    pub fn parse_wallet(address: &str) -> ReclaimResult<Pubkey> {
        Pubkey::from_str(address).map_err(|_| {
            ReclaimError::InvalidWalletAddress(address.to_string())
        })
    }

    pub async fn scan(&self, wallet: &Pubkey) -> ReclaimResult<ScanResult> {
        self.scanner.scan_wallet(wallet).await
    }

    /// Close flow signing locally with [keypair], which also receives the
    /// reclaimed rent. Scans for closeable accounts when none are given.
    pub async fn close_with_keypair(
        &self,
        keypair: &Keypair,
        accounts: Option<Vec<TokenAccountInfo>>,
        options: CloseAccountsOptions,
    ) -> ReclaimResult<CloseAccountsResult> {
        let wallet = keypair.pubkey();
        let accounts = self.resolve_accounts(&wallet, accounts).await?;
        if accounts.is_empty() {
            return Ok(CloseAccountsResult::empty_success());
        }

        self.executor
            .close_accounts(
                &accounts,
                &wallet,
                ReclaimSigner::Local(keypair),
                options,
            )
            .await
    }

    /// Close flow for an external wallet signer, plain batching.
    pub async fn close_with_wallet(
        &self,
        wallet: &Pubkey,
        signer: &dyn SignAllTransactions,
        accounts: Option<Vec<TokenAccountInfo>>,
        options: CloseAccountsOptions,
    ) -> ReclaimResult<CloseAccountsResult> {
        let accounts = self.resolve_accounts(wallet, accounts).await?;
        if accounts.is_empty() {
            return Ok(CloseAccountsResult::empty_success());
        }

        self.executor
            .close_accounts(
                &accounts,
                wallet,
                ReclaimSigner::External(signer),
                options,
            )
            .await
    }

    /// Close flow for an external wallet signer with the lookup table
    /// optimization and phase reporting.
    pub async fn close_with_wallet_alt(
        &self,
        wallet: &Pubkey,
        signer: &dyn SignAllTransactions,
        accounts: Option<Vec<TokenAccountInfo>>,
        options: CloseWithAltOptions,
    ) -> ReclaimResult<CloseWithAltResult> {
        let accounts = self.resolve_accounts(wallet, accounts).await?;
        if accounts.is_empty() {
            return Ok(CloseWithAltResult {
                outcome: CloseAccountsResult::empty_success(),
                used_alt: false,
                alt_address: None,
            });
        }

        self.executor
            .close_accounts_with_alt(&accounts, wallet, signer, options)
            .await
    }

    /// Single-account dry-run sanity check.
    pub async fn simulate(
        &self,
        wallet: &Pubkey,
        accounts: Option<Vec<TokenAccountInfo>>,
    ) -> ReclaimResult<SimulateCloseOutcome> {
        let accounts = self.resolve_accounts(wallet, accounts).await?;
        if accounts.is_empty() {
            return Ok(SimulateCloseOutcome {
                success: true,
                error: None,
            });
        }
        Ok(self.executor.simulate_close(&accounts, wallet).await)
    }

    async fn resolve_accounts(
        &self,
        wallet: &Pubkey,
        accounts: Option<Vec<TokenAccountInfo>>,
    ) -> ReclaimResult<Vec<TokenAccountInfo>> {
        match accounts {
            Some(accounts) => Ok(accounts),
            None => Ok(self.scan(wallet).await?.closeable_accounts),
        }
    }
}
