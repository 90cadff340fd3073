pub mod blockhash;
pub mod builder;
pub mod error;
pub mod events;
pub mod executor;
pub mod reclaimer;
pub mod rpc;
pub mod scanner;
pub mod types;

pub use blockhash::BlockhashMode;
pub use builder::TransactionBuilder;
pub use error::{ReclaimError, ReclaimResult};
pub use events::{EventSender, ReclaimEvent};
pub use executor::{
    ReclaimSigner, SignAllTransactions, TransactionExecutor,
};
pub use reclaimer::{ReclaimerConfig, RentReclaimer};
pub use rpc::LedgerRpc;
pub use scanner::AccountScanner;
pub use types::*;
