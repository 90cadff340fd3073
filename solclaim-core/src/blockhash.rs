use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use tokio::sync::OnceCell;

use crate::{error::ReclaimResult, rpc::LedgerRpc};

/// Which blockhash each batch of a build is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockhashMode {
    /// One fetch per build call, shared by every batch.
    #[default]
    SharedPerBuild,
    /// A fresh fetch per batch, for runs where a slow signer could
    /// outlive blockhash validity.
    FreshPerBatch,
}

/// Supplies the recent blockhash each batch transaction is built against.
///
/// The default provider fetches once per build and shares that hash across
/// every batch, matching the fast path where all batches are signed and
/// sent well within blockhash validity. Long runs with a slow signer can
/// opt into [FreshBlockhash] to refetch per batch instead.
#[async_trait]
pub trait BlockhashProvider: Send + Sync {
    async fn blockhash_for_batch(
        &self,
        batch_index: usize,
    ) -> ReclaimResult<Hash>;
}

/// Fetches the blockhash on first use and serves the cached value for
/// every further batch of the same build.
pub struct CachedBlockhash {
    rpc: Arc<dyn LedgerRpc>,
    cached: OnceCell<Hash>,
}

impl CachedBlockhash {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self {
            rpc,
            cached: OnceCell::new(),
        }
    }
}

#[async_trait]
impl BlockhashProvider for CachedBlockhash {
    async fn blockhash_for_batch(
        &self,
        _batch_index: usize,
    ) -> ReclaimResult<Hash> {
        let hash = self
            .cached
            .get_or_try_init(|| self.rpc.get_latest_blockhash())
            .await?;
        Ok(*hash)
    }
}

/// Fetches a fresh blockhash for every batch.
pub struct FreshBlockhash {
    rpc: Arc<dyn LedgerRpc>,
}

impl FreshBlockhash {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl BlockhashProvider for FreshBlockhash {
    async fn blockhash_for_batch(
        &self,
        _batch_index: usize,
    ) -> ReclaimResult<Hash> {
        self.rpc.get_latest_blockhash().await
    }
}
