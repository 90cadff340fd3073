use std::{collections::HashSet, sync::Arc};

use solana_pubkey::Pubkey;
use solana_sdk::{
    address_lookup_table as alt,
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    message::{v0, AddressLookupTableAccount, VersionedMessage},
    signature::Signature,
    transaction::{Transaction, VersionedTransaction},
};
use solclaim_rpc_client::AddressLookupTableSnapshot;

use crate::{
    blockhash::{
        BlockhashMode, BlockhashProvider, CachedBlockhash, FreshBlockhash,
    },
    error::ReclaimResult,
    rpc::LedgerRpc,
    types::{ReclaimTransaction, TokenAccountInfo},
};

/// Compute unit limit attached to every close transaction for safety.
pub const COMPUTE_UNIT_LIMIT: u32 = 200_000;

/// Addresses carried by the combined create + extend lookup table
/// transaction. Conservative to stay under the transaction size limit
/// with the create instruction on board.
pub const ALT_FIRST_CHUNK_SIZE: usize = 20;

/// Addresses per follow-up extend transaction.
pub const ALT_EXTEND_CHUNK_SIZE: usize = 30;

/// Turns closeable account descriptors into ordered, size-bounded close
/// transactions, optionally compiled against an address lookup table.
pub struct TransactionBuilder {
    rpc: Arc<dyn LedgerRpc>,
    blockhash_mode: BlockhashMode,
}

impl TransactionBuilder {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self {
            rpc,
            blockhash_mode: BlockhashMode::default(),
        }
    }

    pub fn with_blockhash_mode(mut self, mode: BlockhashMode) -> Self {
        self.blockhash_mode = mode;
        self
    }

    fn blockhash_provider(&self) -> Box<dyn BlockhashProvider> {
        match self.blockhash_mode {
            BlockhashMode::SharedPerBuild => {
                Box::new(CachedBlockhash::new(self.rpc.clone()))
            }
            BlockhashMode::FreshPerBatch => {
                Box::new(FreshBlockhash::new(self.rpc.clone()))
            }
        }
    }

    /// `ceil(account_count / batch_size)` contiguous batches in scan order,
    /// all full except possibly the last.
    pub fn total_batches(account_count: usize, batch_size: usize) -> usize {
        account_count.div_ceil(batch_size)
    }

    /// One close instruction per account, routed to the token program the
    /// account belongs to. The spl-token-2022 builder accepts both program
    /// ids.
    pub fn close_instructions(
        accounts: &[TokenAccountInfo],
        destination: &Pubkey,
        authority: &Pubkey,
    ) -> ReclaimResult<Vec<Instruction>> {
        accounts
            .iter()
            .map(|account| {
                Ok(spl_token_2022::instruction::close_account(
                    &account.program_id,
                    &account.pubkey,
                    destination,
                    authority,
                    &[],
                )?)
            })
            .collect()
    }

    /// Builds one legacy transaction per batch: a compute budget
    /// instruction followed by the batch's close instructions.
    ///
    /// An empty account list yields an empty transaction list without
    /// touching the network. A blockhash fetch failure is a hard error.
    pub async fn build_close_transactions(
        &self,
        accounts: &[TokenAccountInfo],
        payer: &Pubkey,
        destination: &Pubkey,
        authority: &Pubkey,
        batch_size: usize,
    ) -> ReclaimResult<Vec<ReclaimTransaction>> {
        if accounts.is_empty() {
            return Ok(vec![]);
        }

        let provider = self.blockhash_provider();
        let mut transactions = Vec::new();

        for (index, batch) in accounts.chunks(batch_size).enumerate() {
            let mut instructions =
                vec![ComputeBudgetInstruction::set_compute_unit_limit(
                    COMPUTE_UNIT_LIMIT,
                )];
            instructions.extend(Self::close_instructions(
                batch,
                destination,
                authority,
            )?);

            let mut tx =
                Transaction::new_with_payer(&instructions, Some(payer));
            tx.message.recent_blockhash =
                provider.blockhash_for_batch(index).await?;
            transactions.push(ReclaimTransaction::Legacy(tx));
        }

        Ok(transactions)
    }

    /// The deduplicated address set a lookup table for these accounts must
    /// hold: payer, both token program ids, every account pubkey. First
    /// seen order is preserved.
    pub fn lookup_addresses(
        accounts: &[TokenAccountInfo],
        payer: &Pubkey,
    ) -> Vec<Pubkey> {
        let mut seen = HashSet::new();
        let mut addresses = Vec::new();
        for address in [*payer, spl_token::id(), spl_token_2022::id()]
            .into_iter()
            .chain(accounts.iter().map(|account| account.pubkey))
        {
            if seen.insert(address) {
                addresses.push(address);
            }
        }
        addresses
    }

    /// Builds the lookup table setup transactions: one create + extend
    /// transaction carrying the first address chunk and as many extend
    /// transactions as the remainder needs.
    ///
    /// The create instruction is bound to a finalized slot snapshot so the
    /// derived table address is stable for the cluster. The returned table
    /// is not active yet; the caller must submit every setup transaction
    /// and then wait for activation.
    pub async fn build_alt_setup_transactions(
        &self,
        accounts: &[TokenAccountInfo],
        payer: &Pubkey,
    ) -> ReclaimResult<(Vec<ReclaimTransaction>, Pubkey)> {
        let slot = self.rpc.get_finalized_slot().await?;
        let (create_ix, table_address) =
            alt::instruction::create_lookup_table(*payer, *payer, slot);

        let addresses = Self::lookup_addresses(accounts, payer);
        let provider = self.blockhash_provider();
        let mut transactions = Vec::new();

        let first_end = addresses.len().min(ALT_FIRST_CHUNK_SIZE);
        let instructions = vec![
            create_ix,
            alt::instruction::extend_lookup_table(
                table_address,
                *payer,
                Some(*payer),
                addresses[..first_end].to_vec(),
            ),
        ];
        let mut tx = Transaction::new_with_payer(&instructions, Some(payer));
        tx.message.recent_blockhash = provider.blockhash_for_batch(0).await?;
        transactions.push(ReclaimTransaction::Legacy(tx));

        for (index, chunk) in addresses[first_end..]
            .chunks(ALT_EXTEND_CHUNK_SIZE)
            .enumerate()
        {
            let extend_ix = alt::instruction::extend_lookup_table(
                table_address,
                *payer,
                Some(*payer),
                chunk.to_vec(),
            );
            let mut tx =
                Transaction::new_with_payer(&[extend_ix], Some(payer));
            tx.message.recent_blockhash =
                provider.blockhash_for_batch(index + 1).await?;
            transactions.push(ReclaimTransaction::Legacy(tx));
        }

        Ok((transactions, table_address))
    }

    /// Builds close transactions as v0 messages compiled against the
    /// active lookup table, and appends a deactivate instruction to the
    /// last transaction as cleanup.
    pub async fn build_close_transactions_with_alt(
        &self,
        accounts: &[TokenAccountInfo],
        payer: &Pubkey,
        destination: &Pubkey,
        authority: &Pubkey,
        table: &AddressLookupTableSnapshot,
        batch_size: usize,
    ) -> ReclaimResult<Vec<ReclaimTransaction>> {
        if accounts.is_empty() {
            return Ok(vec![]);
        }

        let alt_account = AddressLookupTableAccount {
            key: table.address,
            addresses: table.addresses.clone(),
        };
        let batches = accounts.chunks(batch_size).collect::<Vec<_>>();
        let total_batches = batches.len();
        let provider = self.blockhash_provider();
        let mut transactions = Vec::new();

        for (index, batch) in batches.into_iter().enumerate() {
            let mut instructions =
                vec![ComputeBudgetInstruction::set_compute_unit_limit(
                    COMPUTE_UNIT_LIMIT,
                )];
            instructions.extend(Self::close_instructions(
                batch,
                destination,
                authority,
            )?);

            if index == total_batches - 1 {
                instructions.push(alt::instruction::deactivate_lookup_table(
                    table.address,
                    *authority,
                ));
            }

            let blockhash = provider.blockhash_for_batch(index).await?;
            let message = VersionedMessage::V0(v0::Message::try_compile(
                payer,
                &instructions,
                &[alt_account.clone()],
                blockhash,
            )?);
            let num_signatures =
                message.header().num_required_signatures as usize;
            transactions.push(ReclaimTransaction::Versioned(
                VersionedTransaction {
                    signatures: vec![Signature::default(); num_signatures],
                    message,
                },
            ));
        }

        Ok(transactions)
    }
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;
    use solana_rpc_client_api::response::RpcKeyedAccount;
    use solana_sdk::{
        clock::Slot, hash::Hash, transaction::TransactionError,
    };

    use super::*;

    struct FixedBlockhashRpc(Hash);

    #[async_trait]
    impl LedgerRpc for FixedBlockhashRpc {
        async fn get_latest_blockhash(&self) -> ReclaimResult<Hash> {
            Ok(self.0)
        }

        async fn get_finalized_slot(&self) -> ReclaimResult<Slot> {
            unreachable!()
        }

        async fn send_transaction(
            &self,
            _tx: &ReclaimTransaction,
        ) -> ReclaimResult<Signature> {
            unreachable!()
        }

        async fn confirm_transaction(
            &self,
            _signature: &Signature,
        ) -> ReclaimResult<Option<TransactionError>> {
            unreachable!()
        }

        async fn simulate_transaction(
            &self,
            _tx: &ReclaimTransaction,
        ) -> ReclaimResult<Option<TransactionError>> {
            unreachable!()
        }

        async fn get_lookup_table(
            &self,
            _address: &Pubkey,
        ) -> ReclaimResult<Option<AddressLookupTableSnapshot>> {
            unreachable!()
        }

        async fn get_token_accounts_by_owner(
            &self,
            _owner: &Pubkey,
            _program_id: &Pubkey,
        ) -> ReclaimResult<Vec<RpcKeyedAccount>> {
            unreachable!()
        }
    }

    fn closeable_account() -> TokenAccountInfo {
        TokenAccountInfo {
            pubkey: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            amount: 0,
            decimals: 6,
            rent_lamports: crate::types::TOKEN_ACCOUNT_RENT,
            is_closeable: true,
            program_id: spl_token::id(),
        }
    }

    #[test]
    fn test_total_batches() {
        assert_eq!(TransactionBuilder::total_batches(0, 20), 0);
        assert_eq!(TransactionBuilder::total_batches(1, 20), 1);
        assert_eq!(TransactionBuilder::total_batches(20, 20), 1);
        assert_eq!(TransactionBuilder::total_batches(21, 20), 2);
        assert_eq!(TransactionBuilder::total_batches(45, 15), 3);
    }

    #[tokio::test]
    async fn test_built_transactions_partition_accounts_in_order() {
        let blockhash = Hash::new_unique();
        let payer = Pubkey::new_unique();
        let accounts = (0..47).map(|_| closeable_account()).collect::<Vec<_>>();
        let builder =
            TransactionBuilder::new(Arc::new(FixedBlockhashRpc(blockhash)));

        let txs = builder
            .build_close_transactions(&accounts, &payer, &payer, &payer, 20)
            .await
            .unwrap();

        assert_eq!(txs.len(), TransactionBuilder::total_batches(47, 20));
        // Compute budget instruction plus the batch's close instructions,
        // all batches full except the last.
        assert_eq!(txs[0].instruction_count(), 21);
        assert_eq!(txs[1].instruction_count(), 21);
        assert_eq!(txs[2].instruction_count(), 8);

        let mut closed = Vec::new();
        for tx in &txs {
            assert_eq!(tx.recent_blockhash(), blockhash);
            let ReclaimTransaction::Legacy(tx) = tx else {
                panic!("expected legacy transaction");
            };
            for ix in tx.message.instructions.iter().skip(1) {
                closed.push(
                    tx.message.account_keys[ix.accounts[0] as usize],
                );
            }
        }
        let original = accounts
            .iter()
            .map(|account| account.pubkey)
            .collect::<Vec<_>>();
        assert_eq!(closed, original);

        let none = builder
            .build_close_transactions(&[], &payer, &payer, &payer, 20)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_lookup_addresses_dedups_and_keeps_order() {
        let payer = Pubkey::new_unique();
        let mut accounts =
            (0..3).map(|_| closeable_account()).collect::<Vec<_>>();
        // Duplicate account pubkey and the payer itself showing up as an
        // account should not be listed twice.
        accounts.push(accounts[0].clone());
        let mut payer_owned = closeable_account();
        payer_owned.pubkey = payer;
        accounts.push(payer_owned);

        let addresses =
            TransactionBuilder::lookup_addresses(&accounts, &payer);

        assert_eq!(addresses.len(), 3 + 3);
        assert_eq!(addresses[0], payer);
        assert_eq!(addresses[1], spl_token::id());
        assert_eq!(addresses[2], spl_token_2022::id());
        assert_eq!(addresses[3], accounts[0].pubkey);
    }

    #[test]
    fn test_close_instructions_route_to_account_program() {
        let destination = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let mut accounts = vec![closeable_account(), closeable_account()];
        accounts[1].program_id = spl_token_2022::id();

        let ixs = TransactionBuilder::close_instructions(
            &accounts,
            &destination,
            &authority,
        )
        .unwrap();

        assert_eq!(ixs.len(), 2);
        assert_eq!(ixs[0].program_id, spl_token::id());
        assert_eq!(ixs[1].program_id, spl_token_2022::id());
    }
}
