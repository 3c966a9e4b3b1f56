//! Chain watcher: discovers newly registered names and contenthash updates
//!
//! A name's resolver is recorded once, at registration. Later resolver
//! changes are NOT observed: updates emitted by a swapped-in resolver are
//! missed until that resolver emits again after an operator reindex. This is
//! a known limitation of the discovery scheme, not an oversight.

use keccak_hash::H256;
use tracing::{instrument, warn};

use crate::ens;
use crate::error::Result;
use crate::rpc::{LogFilter, RpcClient};
use crate::types::Address;
use spage_store::Cid;

/// Watcher inputs fixed at startup
#[derive(Clone, Debug)]
pub struct WatcherConfig {
    /// Page registry contract emitting mint events
    pub registry: Address,
    /// Universal resolver used for initial resolver discovery
    pub universal_resolver: Address,
}

/// A name discovered from a registry mint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewName {
    pub name: String,
    pub resolver: Address,
    pub at_height: u64,
}

/// A contenthash update emitted by a known resolver
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentUpdate {
    pub resolver: Address,
    /// Namehash of the updated name
    pub node: H256,
    pub cid: Cid,
    pub at_height: u64,
}

/// Result of scanning one block range
#[derive(Clone, Debug, Default)]
pub struct ScanOutcome {
    pub new_names: Vec<NewName>,
    pub content_updates: Vec<ContentUpdate>,
}

/// Scans the chain for registrations and record updates
pub struct ChainWatcher {
    rpc: RpcClient,
    config: WatcherConfig,
}

impl ChainWatcher {
    /// Create a new watcher over an RPC client
    pub fn new(rpc: RpcClient, config: WatcherConfig) -> Self {
        Self { rpc, config }
    }

    /// Current chain head
    pub async fn head(&self) -> Result<u64> {
        self.rpc.block_number().await
    }

    /// Chain id reported by the endpoint
    pub async fn chain_id(&self) -> Result<u64> {
        self.rpc.chain_id().await
    }

    /// Scan `[from, to]` for mints and for contenthash updates emitted by
    /// the given resolver set
    #[instrument(skip(self, known_resolvers), fields(resolvers = known_resolvers.len()))]
    pub async fn scan_range(
        &self,
        from: u64,
        to: u64,
        known_resolvers: &[Address],
    ) -> Result<ScanOutcome> {
        let new_names = self.scan_mints(from, to).await?;

        // A name minted inside this range can receive its first contenthash
        // update in the same range; its resolver must be part of this scan.
        let mut resolvers = known_resolvers.to_vec();
        for new_name in &new_names {
            if !resolvers.contains(&new_name.resolver) {
                resolvers.push(new_name.resolver);
            }
        }

        let content_updates = self.scan_content_updates(from, to, &resolvers).await?;
        Ok(ScanOutcome {
            new_names,
            content_updates,
        })
    }

    /// Registry mints: `Transfer` events whose sender is the zero address.
    /// The token id is the namehash; the registry's `pageName(bytes32)` view
    /// recovers the printable name.
    async fn scan_mints(&self, from: u64, to: u64) -> Result<Vec<NewName>> {
        let zero_sender = H256::from_slice(&{
            let mut padded = [0u8; 32];
            padded[12..].copy_from_slice(Address::ZERO.as_bytes());
            padded
        });
        let filter = LogFilter {
            from_block: from,
            to_block: to,
            address: Some(self.config.registry),
            topics: vec![Some(*ens::TRANSFER_TOPIC), Some(zero_sender)],
        };

        let mut names = Vec::new();
        for log in self.rpc.get_logs(&filter).await? {
            // Transfer(address indexed from, address indexed to, uint256 indexed tokenId)
            let Some(node) = log.topics.get(3).copied() else {
                warn!(height = log.block_number, "mint log without a token id topic");
                continue;
            };
            let name = match self.page_name(&node, log.block_number).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(node = %node, error = %e, "could not recover name for minted token");
                    continue;
                }
            };
            let resolver = match self.resolver_for(&name, log.block_number).await {
                Ok(resolver) => resolver,
                Err(e) => {
                    warn!(name = %name, error = %e, "universal resolver lookup failed");
                    continue;
                }
            };
            names.push(NewName {
                name,
                resolver,
                at_height: log.block_number,
            });
        }
        Ok(names)
    }

    /// Contenthash updates across every known resolver. Queries are issued
    /// sequentially: the RPC provider's rate limit is the binding constraint.
    async fn scan_content_updates(
        &self,
        from: u64,
        to: u64,
        known_resolvers: &[Address],
    ) -> Result<Vec<ContentUpdate>> {
        let mut updates = Vec::new();
        for resolver in known_resolvers {
            let filter = LogFilter {
                from_block: from,
                to_block: to,
                address: Some(*resolver),
                topics: vec![Some(*ens::CONTENTHASH_CHANGED_TOPIC)],
            };
            for log in self.rpc.get_logs(&filter).await? {
                let Some(node) = log.topics.get(1).copied() else {
                    warn!(resolver = %resolver, "contenthash log without a node topic");
                    continue;
                };
                let hash_bytes = match ens::decode_bytes(&log.data) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(resolver = %resolver, error = %e, "malformed contenthash payload");
                        continue;
                    }
                };
                let cid = match ens::contenthash_to_cid(&hash_bytes) {
                    Ok(cid) => cid,
                    Err(e) => {
                        warn!(node = %node, error = %e, "skipping undecodable contenthash");
                        continue;
                    }
                };
                updates.push(ContentUpdate {
                    resolver: *resolver,
                    node,
                    cid,
                    at_height: log.block_number,
                });
            }
        }
        Ok(updates)
    }

    async fn page_name(&self, node: &H256, height: u64) -> Result<String> {
        let data = ens::encode_bytes32_call(ens::selector("pageName(bytes32)"), node);
        let ret = self
            .rpc
            .eth_call(&self.config.registry, &data, Some(height))
            .await?;
        Ok(ens::decode_string(&ret)?.to_lowercase())
    }

    async fn resolver_for(&self, name: &str, height: u64) -> Result<Address> {
        let encoded = ens::dns_encode(name)?;
        let data = ens::encode_bytes_call(ens::selector("findResolver(bytes)"), &encoded);
        let ret = self
            .rpc
            .eth_call(&self.config.universal_resolver, &data, Some(height))
            .await?;
        Ok(Address(ens::decode_address_word(&ret)?))
    }
}
