use std::fmt;

use solana_pubkey::Pubkey;
use solana_sdk::{
    hash::Hash,
    native_token::LAMPORTS_PER_SOL,
    transaction::{Transaction, VersionedTransaction},
};
use tokio::sync::mpsc::UnboundedSender;

use crate::{blockhash::BlockhashMode, events::ReclaimEvent};

/// Deposit ("rent") locked up by a token account, in lamports.
pub const TOKEN_ACCOUNT_RENT: u64 = 2_039_280;

/// Accounts per close transaction when batching without a lookup table.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Accounts per close transaction when compiling against a lookup table.
pub const ALT_BATCH_SIZE: usize = 15;

/// Accounts per close transaction after the lookup table path failed and
/// we fell back to legacy batching.
pub const ALT_FALLBACK_BATCH_SIZE: usize = 10;

/// Below this many accounts the lookup table overhead is not worth it
/// and we batch legacy transactions unconditionally.
pub const SMALL_ACCOUNT_THRESHOLD: usize = 5;

/// Batch size used for the small account shortcut.
pub const SMALL_BATCH_SIZE: usize = 5;

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

// -----------------
// TokenAccountInfo
// -----------------

/// One token account of the scanned wallet, classified by the scanner.
/// Produced read-only; an account consumed by a close batch must not be
/// referenced again.
#[derive(Debug, Clone)]
pub struct TokenAccountInfo {
    pub pubkey: Pubkey,
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub decimals: u8,
    /// Lamports reclaimed when this account is closed.
    pub rent_lamports: u64,
    /// Holds iff `amount == 0`.
    pub is_closeable: bool,
    /// The token program owning this account, one of
    /// [spl_token::id] or [spl_token_2022::id].
    pub program_id: Pubkey,
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub total_accounts: usize,
    pub closeable_accounts: Vec<TokenAccountInfo>,
    pub non_closeable_accounts: Vec<TokenAccountInfo>,
    pub total_reclaimable_lamports: u64,
    pub total_reclaimable_sol: f64,
}

// -----------------
// Execution results
// -----------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    pub batch_index: usize,
    pub error: String,
}

/// Aggregate outcome of one close run. Partial success is a first class
/// outcome: `success` only says that no batch failed.
#[derive(Debug, Clone, Default)]
pub struct CloseAccountsResult {
    pub success: bool,
    pub closed_count: usize,
    pub failed_count: usize,
    pub reclaimed_lamports: u64,
    pub reclaimed_sol: f64,
    /// One entry per successfully processed batch. Synthetic
    /// `simulated-<index>` entries in dry-run mode.
    pub signatures: Vec<String>,
    pub errors: Vec<BatchError>,
}

impl CloseAccountsResult {
    /// The trivial result for an empty account list: nothing was sent,
    /// nothing failed.
    pub fn empty_success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }
}

/// Outcome of the lookup-table-aware close flow.
#[derive(Debug, Clone, Default)]
pub struct CloseWithAltResult {
    pub outcome: CloseAccountsResult,
    pub used_alt: bool,
    pub alt_address: Option<Pubkey>,
}

#[derive(Debug, Clone, Default)]
pub struct SimulateCloseOutcome {
    pub success: bool,
    pub error: Option<String>,
}

// -----------------
// ClosePhase
// -----------------

/// Phases of the lookup-table-aware close flow, in the order they are
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePhase {
    BuildingAlt,
    SigningAlt,
    ConfirmingAlt,
    WaitingAlt,
    BuildingClose,
    SigningClose,
    ConfirmingClose,
    FallbackLegacy,
}

impl fmt::Display for ClosePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ClosePhase::*;
        let label = match self {
            BuildingAlt => "building-alt",
            SigningAlt => "signing-alt",
            ConfirmingAlt => "confirming-alt",
            WaitingAlt => "waiting-alt",
            BuildingClose => "building-close",
            SigningClose => "signing-close",
            ConfirmingClose => "confirming-close",
            FallbackLegacy => "fallback-legacy",
        };
        f.write_str(label)
    }
}

// -----------------
// ReclaimTransaction
// -----------------

/// A built close or lookup table setup transaction. Legacy transactions
/// are broadcast via their serialized wire bytes, versioned ones are
/// sent directly.
#[derive(Debug, Clone)]
pub enum ReclaimTransaction {
    Legacy(Transaction),
    Versioned(VersionedTransaction),
}

impl ReclaimTransaction {
    pub fn is_versioned(&self) -> bool {
        matches!(self, Self::Versioned(_))
    }

    pub fn recent_blockhash(&self) -> Hash {
        match self {
            Self::Legacy(tx) => tx.message.recent_blockhash,
            Self::Versioned(tx) => *tx.message.recent_blockhash(),
        }
    }

    pub fn instruction_count(&self) -> usize {
        match self {
            Self::Legacy(tx) => tx.message.instructions.len(),
            Self::Versioned(tx) => match &tx.message {
                solana_sdk::message::VersionedMessage::Legacy(msg) => {
                    msg.instructions.len()
                }
                solana_sdk::message::VersionedMessage::V0(msg) => {
                    msg.instructions.len()
                }
            },
        }
    }

    /// `true` if the message references at least one address lookup table.
    pub fn uses_lookup_tables(&self) -> bool {
        match self {
            Self::Legacy(_) => false,
            Self::Versioned(tx) => match &tx.message {
                solana_sdk::message::VersionedMessage::Legacy(_) => false,
                solana_sdk::message::VersionedMessage::V0(msg) => {
                    !msg.address_table_lookups.is_empty()
                }
            },
        }
    }
}

// -----------------
// Options
// -----------------

/// Options for the plain batching close flows.
#[derive(Debug, Default)]
pub struct CloseAccountsOptions {
    pub batch_size: Option<usize>,
    /// Dry-run every batch instead of broadcasting.
    pub simulate: bool,
    /// Whether batches share one blockhash or fetch a fresh one each.
    pub blockhash_mode: BlockhashMode,
    /// Receives [ReclaimEvent]s while the run progresses. Events sent to
    /// a dropped receiver are silently discarded.
    pub events: Option<UnboundedSender<ReclaimEvent>>,
}

/// Options for the lookup-table-aware close flow.
#[derive(Debug, Default)]
pub struct CloseWithAltOptions {
    /// Batch size for the close transactions. Defaults depend on the
    /// path taken: [ALT_BATCH_SIZE], [ALT_FALLBACK_BATCH_SIZE] or
    /// [SMALL_BATCH_SIZE].
    pub batch_size: Option<usize>,
    pub simulate: bool,
    /// Whether batches share one blockhash or fetch a fresh one each.
    pub blockhash_mode: BlockhashMode,
    pub events: Option<UnboundedSender<ReclaimEvent>>,
}
