use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::*;
use solana_rpc_client::{
    nonblocking::rpc_client::RpcClient, rpc_client::SerializableTransaction,
};
use solana_rpc_client_api::{
    client_error::ErrorKind as RpcClientErrorKind,
    config::RpcSendTransactionConfig, request::RpcError,
    request::TokenAccountsFilter, response::RpcKeyedAccount,
};
use solana_sdk::{
    account::Account,
    address_lookup_table::state::{AddressLookupTable, LookupTableMeta},
    clock::Slot,
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::TransactionError,
};

/// How long we wait for a sent transaction to reach the client's
/// commitment level before giving up.
const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_millis(30_000);

/// How long to wait in between signature status checks.
const CONFIRM_CHECK_INTERVAL: Duration = Duration::from_millis(400);

// -----------------
// SolclaimRpcClientError
// -----------------
#[derive(Debug, thiserror::Error)]
pub enum SolclaimRpcClientError {
    #[error("RPC Client error: {0}")]
    RpcClientError(#[from] solana_rpc_client_api::client_error::Error),

    #[error("Error getting blockhash: {0} ({0:?})")]
    GetLatestBlockhash(solana_rpc_client_api::client_error::Error),

    #[error("Error getting slot: {0} ({0:?})")]
    GetSlot(solana_rpc_client_api::client_error::Error),

    #[error("Error deserializing lookup table: {0}")]
    LookupTableDeserialize(solana_sdk::instruction::InstructionError),

    #[error("Error sending transaction: {0} ({0:?})")]
    SendTransaction(solana_rpc_client_api::client_error::Error),

    #[error("Error simulating transaction: {0} ({0:?})")]
    SimulateTransaction(solana_rpc_client_api::client_error::Error),

    #[error("Error fetching token accounts owned by {0}: {1}")]
    GetTokenAccounts(Pubkey, solana_rpc_client_api::client_error::Error),

    #[error(
        "Error confirming signature status of {0} at desired commitment level {1}"
    )]
    CannotConfirmTransactionSignatureStatus(Signature, CommitmentLevel),
}

impl SolclaimRpcClientError {
    /// Returns the signature of the transaction that caused the error
    /// if available.
    pub fn signature(&self) -> Option<Signature> {
        use SolclaimRpcClientError::*;
        match self {
            CannotConfirmTransactionSignatureStatus(sig, _) => Some(*sig),
            _ => None,
        }
    }
}

pub type SolclaimRpcClientResult<T> =
    std::result::Result<T, SolclaimRpcClientError>;

// -----------------
// AddressLookupTableSnapshot
// -----------------

/// The on chain state of an address lookup table at the time it was fetched.
#[derive(Debug, Clone)]
pub struct AddressLookupTableSnapshot {
    pub address: Pubkey,
    pub meta: LookupTableMeta,
    pub addresses: Vec<Pubkey>,
}

impl AddressLookupTableSnapshot {
    /// A table counts as active while its deactivation was never requested.
    pub fn is_active(&self) -> bool {
        self.meta.deactivation_slot == u64::MAX
    }
}

// -----------------
// SolclaimRpcClient
// -----------------

/// Wraps a [RpcClient] to provide the exact ledger surface the reclaim
/// engine needs: blockhash and slot snapshots, preflighted sends,
/// bounded confirmation polling, dry-run simulation, lookup table
/// fetches and parsed token account enumeration.
#[derive(Clone)]
pub struct SolclaimRpcClient {
    client: Arc<RpcClient>,
}

impl From<RpcClient> for SolclaimRpcClient {
    fn from(client: RpcClient) -> Self {
        Self::new(Arc::new(client))
    }
}

impl SolclaimRpcClient {
    /// Create a new [SolclaimRpcClient] from an existing [RpcClient].
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }

    pub fn new_with_endpoint(
        endpoint: &str,
        commitment: CommitmentConfig,
    ) -> Self {
        RpcClient::new_with_commitment(endpoint.to_string(), commitment).into()
    }

    pub fn url(&self) -> String {
        self.client.url()
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.client.commitment()
    }

    pub fn commitment_level(&self) -> CommitmentLevel {
        self.commitment().commitment
    }

    pub async fn get_latest_blockhash(
        &self,
    ) -> SolclaimRpcClientResult<Hash> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(SolclaimRpcClientError::GetLatestBlockhash)
    }

    /// Slot snapshot at finalized commitment. Lookup table creation is
    /// bound to a finalized slot to avoid "slot not yet visible" errors.
    pub async fn get_finalized_slot(&self) -> SolclaimRpcClientResult<Slot> {
        self.client
            .get_slot_with_commitment(CommitmentConfig::finalized())
            .await
            .map_err(SolclaimRpcClientError::GetSlot)
    }

    pub async fn get_account(
        &self,
        pubkey: &Pubkey,
    ) -> SolclaimRpcClientResult<Option<Account>> {
        let err = match self.client.get_account(pubkey).await {
            Ok(acc) => return Ok(Some(acc)),
            Err(err) => match err.kind() {
                RpcClientErrorKind::RpcError(rpc_err) => {
                    if let RpcError::ForUser(msg) = rpc_err {
                        if msg.starts_with("AccountNotFound") {
                            return Ok(None);
                        }
                    }
                    err
                }
                _ => err,
            },
        };
        Err(SolclaimRpcClientError::RpcClientError(err))
    }

    pub async fn get_lookup_table(
        &self,
        address: &Pubkey,
    ) -> SolclaimRpcClientResult<Option<AddressLookupTableSnapshot>> {
        let acc = self.get_account(address).await?;
        let Some(acc) = acc else { return Ok(None) };

        let table =
            AddressLookupTable::deserialize(&acc.data).map_err(|err| {
                SolclaimRpcClientError::LookupTableDeserialize(err)
            })?;
        Ok(Some(AddressLookupTableSnapshot {
            address: *address,
            meta: table.meta.clone(),
            addresses: table.addresses.to_vec(),
        }))
    }

    /// Sends a transaction with preflight checks enabled at confirmed
    /// commitment and returns its signature without waiting for it to land.
    pub async fn send_transaction(
        &self,
        tx: &impl SerializableTransaction,
    ) -> SolclaimRpcClientResult<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            ..Default::default()
        };
        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(SolclaimRpcClientError::SendTransaction)
    }

    /// Blocks until the transaction reaches the client's commitment level.
    /// Returns the on chain error of the transaction if it landed but failed.
    pub async fn confirm_transaction(
        &self,
        signature: &Signature,
    ) -> SolclaimRpcClientResult<Option<TransactionError>> {
        let start = Instant::now();
        loop {
            let status = self
                .client
                .get_signature_status_with_commitment(
                    signature,
                    self.client.commitment(),
                )
                .await?;

            if let Some(status) = status {
                return Ok(status.err());
            }

            if start.elapsed() < DEFAULT_CONFIRM_TIMEOUT {
                tokio::time::sleep(CONFIRM_CHECK_INTERVAL).await;
                continue;
            } else {
                trace!("Timed out confirming {signature}");
                return Err(SolclaimRpcClientError::CannotConfirmTransactionSignatureStatus(
                    *signature,
                    self.client.commitment().commitment,
                ));
            }
        }
    }

    /// Dry-runs the transaction against the ledger. Returns the error the
    /// simulation produced, if any.
    pub async fn simulate_transaction(
        &self,
        tx: &impl SerializableTransaction,
    ) -> SolclaimRpcClientResult<Option<TransactionError>> {
        let res = self
            .client
            .simulate_transaction(tx)
            .await
            .map_err(SolclaimRpcClientError::SimulateTransaction)?;
        Ok(res.value.err)
    }

    /// Parsed token accounts of [owner] under the given token program.
    pub async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        program_id: &Pubkey,
    ) -> SolclaimRpcClientResult<Vec<RpcKeyedAccount>> {
        self.client
            .get_token_accounts_by_owner(
                owner,
                TokenAccountsFilter::ProgramId(*program_id),
            )
            .await
            .map_err(|err| {
                SolclaimRpcClientError::GetTokenAccounts(*owner, err)
            })
    }

    pub fn get_inner(&self) -> &Arc<RpcClient> {
        &self.client
    }
}
