use async_trait::async_trait;
use solana_pubkey::Pubkey;
use solana_rpc_client_api::response::RpcKeyedAccount;
use solana_sdk::{
    clock::Slot, hash::Hash, signature::Signature,
    transaction::TransactionError,
};
use solclaim_rpc_client::{AddressLookupTableSnapshot, SolclaimRpcClient};

use crate::{error::ReclaimResult, types::ReclaimTransaction};

/// The ledger collaborator the reclaim engine runs against.
///
/// [SolclaimRpcClient] is the production implementation; tests drive the
/// engine through a scripted stub instead of a validator.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Recent blockhash at the client's commitment level.
    async fn get_latest_blockhash(&self) -> ReclaimResult<Hash>;

    /// Slot snapshot at finalized commitment.
    async fn get_finalized_slot(&self) -> ReclaimResult<Slot>;

    /// Broadcasts the transaction with preflight checks enabled and
    /// returns its signature.
    async fn send_transaction(
        &self,
        tx: &ReclaimTransaction,
    ) -> ReclaimResult<Signature>;

    /// Blocks until the transaction is confirmed. `Ok(Some(err))` means it
    /// landed on chain but failed.
    async fn confirm_transaction(
        &self,
        signature: &Signature,
    ) -> ReclaimResult<Option<TransactionError>>;

    /// Dry-runs the transaction. `Ok(Some(err))` is the simulation failure.
    async fn simulate_transaction(
        &self,
        tx: &ReclaimTransaction,
    ) -> ReclaimResult<Option<TransactionError>>;

    async fn get_lookup_table(
        &self,
        address: &Pubkey,
    ) -> ReclaimResult<Option<AddressLookupTableSnapshot>>;

    /// Parsed token accounts of [owner] under the given token program.
    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        program_id: &Pubkey,
    ) -> ReclaimResult<Vec<RpcKeyedAccount>>;
}

#[async_trait]
impl LedgerRpc for SolclaimRpcClient {
    async fn get_latest_blockhash(&self) -> ReclaimResult<Hash> {
        Ok(SolclaimRpcClient::get_latest_blockhash(self).await?)
    }

    async fn get_finalized_slot(&self) -> ReclaimResult<Slot> {
        Ok(SolclaimRpcClient::get_finalized_slot(self).await?)
    }

    async fn send_transaction(
        &self,
        tx: &ReclaimTransaction,
    ) -> ReclaimResult<Signature> {
        let signature = match tx {
            ReclaimTransaction::Legacy(tx) => {
                SolclaimRpcClient::send_transaction(self, tx).await?
            }
            ReclaimTransaction::Versioned(tx) => {
                SolclaimRpcClient::send_transaction(self, tx).await?
            }
        };
        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
    ) -> ReclaimResult<Option<TransactionError>> {
        Ok(SolclaimRpcClient::confirm_transaction(self, signature).await?)
    }

    async fn simulate_transaction(
        &self,
        tx: &ReclaimTransaction,
    ) -> ReclaimResult<Option<TransactionError>> {
        let err = match tx {
            ReclaimTransaction::Legacy(tx) => {
                SolclaimRpcClient::simulate_transaction(self, tx).await?
            }
            ReclaimTransaction::Versioned(tx) => {
                SolclaimRpcClient::simulate_transaction(self, tx).await?
            }
        };
        Ok(err)
    }

    async fn get_lookup_table(
        &self,
        address: &Pubkey,
    ) -> ReclaimResult<Option<AddressLookupTableSnapshot>> {
        Ok(SolclaimRpcClient::get_lookup_table(self, address).await?)
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        program_id: &Pubkey,
    ) -> ReclaimResult<Vec<RpcKeyedAccount>> {
        Ok(SolclaimRpcClient::get_token_accounts_by_owner(
            self, owner, program_id,
        )
        .await?)
    }
}
