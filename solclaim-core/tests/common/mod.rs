#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use serde_json::json;
use solana_account_decoder::{
    parse_account_data::ParsedAccount, UiAccount, UiAccountData,
};
use solana_pubkey::Pubkey;
use solana_rpc_client_api::{
    client_error::{Error as ClientError, ErrorKind as ClientErrorKind},
    response::RpcKeyedAccount,
};
use solana_sdk::{
    address_lookup_table::state::LookupTableMeta, clock::Slot, hash::Hash,
    signature::Signature, transaction::TransactionError,
};
use solclaim_core::{
    LedgerRpc, ReclaimError, ReclaimResult, ReclaimTransaction,
    SignAllTransactions, TokenAccountInfo, TOKEN_ACCOUNT_RENT,
};
use solclaim_rpc_client::AddressLookupTableSnapshot;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn scripted_rpc_error(msg: &str) -> ReclaimError {
    ReclaimError::from(
        solclaim_rpc_client::SolclaimRpcClientError::RpcClientError(
            ClientError {
                request: None,
                kind: ClientErrorKind::Custom(msg.to_string()),
            },
        ),
    )
}

// -----------------
// LedgerRpcStub
// -----------------

#[derive(Default)]
struct StubState {
    send_calls: usize,
    confirm_calls: usize,
    simulate_calls: usize,
    alt_polls: usize,
    sent: Vec<ReclaimTransaction>,
    simulated: Vec<ReclaimTransaction>,
    /// Send call index -> error message returned instead of a signature.
    send_failures: HashMap<usize, String>,
    /// Confirm call index -> on chain error the transaction landed with.
    confirm_failures: HashMap<usize, TransactionError>,
    /// Simulate call index -> error the simulation reports.
    simulate_failures: HashMap<usize, TransactionError>,
    /// Lookup table polls returning inactive before the table activates.
    /// `None` means the table never activates.
    alt_polls_until_active: Option<usize>,
    alt_addresses: Vec<Pubkey>,
    token_accounts: HashMap<Pubkey, Vec<RpcKeyedAccount>>,
    failing_token_programs: Vec<Pubkey>,
}

/// Scripted in-memory [LedgerRpc] so the whole engine runs without a
/// validator. Call indices are global per method, in submission order.
pub struct LedgerRpcStub {
    blockhash: Hash,
    blockhash_fetches: AtomicUsize,
    slot_fetches: AtomicUsize,
    state: Mutex<StubState>,
}

impl Default for LedgerRpcStub {
    fn default() -> Self {
        Self {
            blockhash: Hash::new_unique(),
            blockhash_fetches: AtomicUsize::new(0),
            slot_fetches: AtomicUsize::new(0),
            state: Mutex::new(StubState {
                alt_polls_until_active: Some(0),
                ..Default::default()
            }),
        }
    }
}

impl LedgerRpcStub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    pub fn fail_send(&self, call_index: usize, msg: &str) {
        self.state
            .lock()
            .unwrap()
            .send_failures
            .insert(call_index, msg.to_string());
    }

    pub fn fail_confirm(&self, call_index: usize, err: TransactionError) {
        self.state
            .lock()
            .unwrap()
            .confirm_failures
            .insert(call_index, err);
    }

    pub fn fail_simulate(&self, call_index: usize, err: TransactionError) {
        self.state
            .lock()
            .unwrap()
            .simulate_failures
            .insert(call_index, err);
    }

    /// Scripts the lookup table: inactive for the first `polls` checks,
    /// then active and holding `addresses`.
    pub fn activate_alt_after(&self, polls: usize, addresses: Vec<Pubkey>) {
        let mut state = self.state.lock().unwrap();
        state.alt_polls_until_active = Some(polls);
        state.alt_addresses = addresses;
    }

    /// Scripts a lookup table that never becomes active.
    pub fn never_activate_alt(&self) {
        self.state.lock().unwrap().alt_polls_until_active = None;
    }

    pub fn add_token_account(
        &self,
        program_id: Pubkey,
        keyed: RpcKeyedAccount,
    ) {
        self.state
            .lock()
            .unwrap()
            .token_accounts
            .entry(program_id)
            .or_default()
            .push(keyed);
    }

    pub fn fail_token_accounts_for(&self, program_id: Pubkey) {
        self.state
            .lock()
            .unwrap()
            .failing_token_programs
            .push(program_id);
    }

    pub fn blockhash_fetches(&self) -> usize {
        self.blockhash_fetches.load(Ordering::SeqCst)
    }

    pub fn slot_fetches(&self) -> usize {
        self.slot_fetches.load(Ordering::SeqCst)
    }

    pub fn alt_polls(&self) -> usize {
        self.state.lock().unwrap().alt_polls
    }

    pub fn sent(&self) -> Vec<ReclaimTransaction> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn simulated(&self) -> Vec<ReclaimTransaction> {
        self.state.lock().unwrap().simulated.clone()
    }
}

#[async_trait]
impl LedgerRpc for LedgerRpcStub {
    async fn get_latest_blockhash(&self) -> ReclaimResult<Hash> {
        self.blockhash_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.blockhash)
    }

    async fn get_finalized_slot(&self) -> ReclaimResult<Slot> {
        self.slot_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(42)
    }

    async fn send_transaction(
        &self,
        tx: &ReclaimTransaction,
    ) -> ReclaimResult<Signature> {
        let mut state = self.state.lock().unwrap();
        let index = state.send_calls;
        state.send_calls += 1;
        if let Some(msg) = state.send_failures.get(&index) {
            let msg = msg.clone();
            return Err(scripted_rpc_error(&msg));
        }
        state.sent.push(tx.clone());
        Ok(Signature::new_unique())
    }

    async fn confirm_transaction(
        &self,
        _signature: &Signature,
    ) -> ReclaimResult<Option<TransactionError>> {
        let mut state = self.state.lock().unwrap();
        let index = state.confirm_calls;
        state.confirm_calls += 1;
        Ok(state.confirm_failures.get(&index).cloned())
    }

    async fn simulate_transaction(
        &self,
        tx: &ReclaimTransaction,
    ) -> ReclaimResult<Option<TransactionError>> {
        let mut state = self.state.lock().unwrap();
        let index = state.simulate_calls;
        state.simulate_calls += 1;
        state.simulated.push(tx.clone());
        Ok(state.simulate_failures.get(&index).cloned())
    }

    async fn get_lookup_table(
        &self,
        address: &Pubkey,
    ) -> ReclaimResult<Option<AddressLookupTableSnapshot>> {
        let mut state = self.state.lock().unwrap();
        state.alt_polls += 1;
        let active = match state.alt_polls_until_active {
            Some(polls) => state.alt_polls > polls,
            None => false,
        };
        if !active {
            return Ok(None);
        }
        Ok(Some(AddressLookupTableSnapshot {
            address: *address,
            meta: LookupTableMeta {
                deactivation_slot: u64::MAX,
                ..Default::default()
            },
            addresses: state.alt_addresses.clone(),
        }))
    }

    async fn get_token_accounts_by_owner(
        &self,
        _owner: &Pubkey,
        program_id: &Pubkey,
    ) -> ReclaimResult<Vec<RpcKeyedAccount>> {
        let state = self.state.lock().unwrap();
        if state.failing_token_programs.contains(program_id) {
            return Err(scripted_rpc_error("scripted token account failure"));
        }
        Ok(state.token_accounts.get(program_id).cloned().unwrap_or_default())
    }
}

// -----------------
// Signers
// -----------------

/// Bulk signer passing transactions through unchanged and counting the
/// calls it receives.
#[derive(Default)]
pub struct RecordingSigner {
    calls: Mutex<Vec<usize>>,
}

impl RecordingSigner {
    /// Transaction counts of each `sign_all` call, in order.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignAllTransactions for RecordingSigner {
    async fn sign_all(
        &self,
        transactions: Vec<ReclaimTransaction>,
    ) -> ReclaimResult<Vec<ReclaimTransaction>> {
        self.calls.lock().unwrap().push(transactions.len());
        Ok(transactions)
    }
}

/// Bulk signer refusing every request, like a user dismissing the
/// wallet popup.
pub struct RejectingSigner;

#[async_trait]
impl SignAllTransactions for RejectingSigner {
    async fn sign_all(
        &self,
        _transactions: Vec<ReclaimTransaction>,
    ) -> ReclaimResult<Vec<ReclaimTransaction>> {
        Err(ReclaimError::ExternalSigner("user rejected".to_string()))
    }
}

// -----------------
// Fixtures
// -----------------

pub fn closeable_account(owner: Pubkey) -> TokenAccountInfo {
    token_account(owner, 0)
}

pub fn token_account(owner: Pubkey, amount: u64) -> TokenAccountInfo {
    TokenAccountInfo {
        pubkey: Pubkey::new_unique(),
        mint: Pubkey::new_unique(),
        owner,
        amount,
        decimals: 6,
        rent_lamports: TOKEN_ACCOUNT_RENT,
        is_closeable: amount == 0,
        program_id: spl_token::id(),
    }
}

/// A token account in the jsonParsed shape the scanner consumes.
pub fn keyed_token_account(
    owner: &Pubkey,
    program_id: &Pubkey,
    amount: u64,
) -> RpcKeyedAccount {
    let parsed = json!({
        "type": "account",
        "info": {
            "mint": Pubkey::new_unique().to_string(),
            "owner": owner.to_string(),
            "tokenAmount": {
                "amount": amount.to_string(),
                "decimals": 6,
                "uiAmount": 0.0,
                "uiAmountString": "0",
            },
        },
    });
    RpcKeyedAccount {
        pubkey: Pubkey::new_unique().to_string(),
        account: UiAccount {
            lamports: TOKEN_ACCOUNT_RENT,
            data: UiAccountData::Json(ParsedAccount {
                program: "spl-token".to_string(),
                parsed,
                space: 165,
            }),
            owner: program_id.to_string(),
            executable: false,
            rent_epoch: 0,
            space: Some(165),
        },
    }
}
