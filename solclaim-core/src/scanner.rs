use std::{str::FromStr, sync::Arc};

use log::*;
use solana_account_decoder::UiAccountData;
use solana_pubkey::Pubkey;
use solana_rpc_client_api::response::RpcKeyedAccount;

use crate::{
    error::ReclaimResult,
    rpc::LedgerRpc,
    types::{lamports_to_sol, ScanResult, TokenAccountInfo},
};

/// Read-only enumeration of a wallet's token accounts under both token
/// programs, classifying empty ones as closeable.
pub struct AccountScanner {
    rpc: Arc<dyn LedgerRpc>,
}

impl AccountScanner {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self { rpc }
    }

    pub async fn scan_wallet(
        &self,
        wallet: &Pubkey,
    ) -> ReclaimResult<ScanResult> {
        debug!("Scanning token accounts of {wallet}");

        let spl_token_id = spl_token::id();
        let spl_token_2022_id = spl_token_2022::id();
        let (spl_accounts, token_2022_accounts) = tokio::join!(
            self.token_accounts_for_program(wallet, &spl_token_id),
            self.token_accounts_for_program(wallet, &spl_token_2022_id),
        );

        let mut closeable_accounts = Vec::new();
        let mut non_closeable_accounts = Vec::new();
        let total_accounts =
            spl_accounts.len() + token_2022_accounts.len();
        for account in spl_accounts.into_iter().chain(token_2022_accounts) {
            if account.is_closeable {
                closeable_accounts.push(account);
            } else {
                non_closeable_accounts.push(account);
            }
        }

        let total_reclaimable_lamports = closeable_accounts
            .iter()
            .map(|account| account.rent_lamports)
            .sum::<u64>();

        debug!(
            "Found {} token accounts, {} closeable ({} lamports reclaimable)",
            total_accounts,
            closeable_accounts.len(),
            total_reclaimable_lamports
        );

        Ok(ScanResult {
            total_accounts,
            closeable_accounts,
            non_closeable_accounts,
            total_reclaimable_lamports,
            total_reclaimable_sol: lamports_to_sol(total_reclaimable_lamports),
        })
    }

    /// Accounts of [wallet] under one token program. A fetch error is
    /// swallowed so a single failing program never aborts the scan; that
    /// program simply contributes zero accounts.
    async fn token_accounts_for_program(
        &self,
        wallet: &Pubkey,
        program_id: &Pubkey,
    ) -> Vec<TokenAccountInfo> {
        let keyed_accounts = match self
            .rpc
            .get_token_accounts_by_owner(wallet, program_id)
            .await
        {
            Ok(keyed_accounts) => keyed_accounts,
            Err(err) => {
                warn!(
                    "Failed to fetch token accounts for program {program_id}: {err}"
                );
                return vec![];
            }
        };

        keyed_accounts
            .iter()
            .filter_map(|keyed| {
                let parsed = parse_keyed_account(keyed, program_id);
                if parsed.is_none() {
                    warn!(
                        "Skipping token account {} with unparseable data",
                        keyed.pubkey
                    );
                }
                parsed
            })
            .collect()
    }
}

/// Extracts a [TokenAccountInfo] from the jsonParsed RPC representation
/// of a token account. Returns `None` on any shape mismatch.
fn parse_keyed_account(
    keyed: &RpcKeyedAccount,
    program_id: &Pubkey,
) -> Option<TokenAccountInfo> {
    let pubkey = Pubkey::from_str(&keyed.pubkey).ok()?;
    let UiAccountData::Json(parsed_account) = &keyed.account.data else {
        return None;
    };
    let info = parsed_account.parsed.get("info")?;
    let mint = Pubkey::from_str(info.get("mint")?.as_str()?).ok()?;
    let owner = Pubkey::from_str(info.get("owner")?.as_str()?).ok()?;
    let token_amount = info.get("tokenAmount")?;
    let amount = token_amount.get("amount")?.as_str()?.parse::<u64>().ok()?;
    let decimals =
        u8::try_from(token_amount.get("decimals")?.as_u64()?).ok()?;

    Some(TokenAccountInfo {
        pubkey,
        mint,
        owner,
        amount,
        decimals,
        rent_lamports: keyed.account.lamports,
        is_closeable: amount == 0,
        program_id: *program_id,
    })
}
