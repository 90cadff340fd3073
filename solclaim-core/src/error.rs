use solana_sdk::{
    message::CompileError, program_error::ProgramError, signature::Signature,
    signer::SignerError, transaction::TransactionError,
};
use thiserror::Error;

pub type ReclaimResult<T> = std::result::Result<T, ReclaimError>;

#[derive(Error, Debug)]
pub enum ReclaimError {
    #[error("SolclaimRpcClientError: {0} ({0:?})")]
    SolclaimRpcClientError(
        #[from] solclaim_rpc_client::SolclaimRpcClientError,
    ),

    #[error("Either an RPC endpoint or a client must be provided")]
    MissingRpcEndpoint,

    #[error("Invalid wallet address: {0}")]
    InvalidWalletAddress(String),

    #[error("ALT activation timed out")]
    AltActivationTimedOut,

    #[error("Transaction {1} failed: {0:?}")]
    TransactionFailed(TransactionError, Signature),

    #[error("Failed to compile transaction message: {0}")]
    CompileMessage(#[from] CompileError),

    #[error("Failed to build close instruction: {0}")]
    CloseInstruction(#[from] ProgramError),

    #[error("Failed to sign transaction: {0}")]
    Signing(#[from] SignerError),

    #[error("External signer failed: {0}")]
    ExternalSigner(String),

    #[error("External signer returned {actual} transactions, expected {expected}")]
    ExternalSignerMismatch { expected: usize, actual: usize },
}

impl ReclaimError {
    /// Returns a signature related to this error if available.
    pub fn signature(&self) -> Option<Signature> {
        match self {
            ReclaimError::SolclaimRpcClientError(err) => err.signature(),
            ReclaimError::TransactionFailed(_, sig) => Some(*sig),
            _ => None,
        }
    }
}
