//! Seam between the reconciler and the chain
//!
//! The reconciler only needs a head height and range scans, so it runs
//! against anything implementing [`ChainSource`] - the real watcher in
//! production, a scripted fake in tests.

use async_trait::async_trait;

use spage_chain::{Address, ChainWatcher, Result, ScanOutcome};

/// Source of chain observations for the reconciler
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Current chain head height
    async fn head(&self) -> Result<u64>;

    /// Scan `[from, to]` for mints and contenthash updates, given the
    /// resolvers known so far
    async fn scan_range(&self, from: u64, to: u64, resolvers: &[Address]) -> Result<ScanOutcome>;
}

#[async_trait]
impl ChainSource for ChainWatcher {
    async fn head(&self) -> Result<u64> {
        ChainWatcher::head(self).await
    }

    async fn scan_range(&self, from: u64, to: u64, resolvers: &[Address]) -> Result<ScanOutcome> {
        ChainWatcher::scan_range(self, from, to, resolvers).await
    }
}
