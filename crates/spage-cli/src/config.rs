//! Node configuration

use std::path::PathBuf;
use std::time::Duration;

use spage_chain::Address;

/// Default upload byte cap (100 MiB), overridable via `DSERVICE_MAX_UPLOAD`
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Contract addresses the node watches
#[derive(Clone, Copy, Debug)]
pub struct Contracts {
    /// SimplePage registry emitting mint events
    pub simplepage: Address,
    /// ENS universal resolver for initial resolver discovery
    pub universal_resolver: Address,
}

/// Known deployments, keyed by chain id. Flags override either address.
pub fn default_contracts(chain_id: u64) -> Option<Contracts> {
    // mainnet and sepolia deployments
    let (simplepage, universal_resolver) = match chain_id {
        1 => (
            "0x7730c96a3a756a74b92d34cf28d23b0d1a98e3c7",
            "0xce01f8eee7e479c928f8919abd53e553a36cef67",
        ),
        11155111 => (
            "0x2b5fd9c2f7ee7f86b8ce1c4e9e1bbcf52b07fd1e",
            "0xc8af999e38273d658be1b921b88a9ddf005769cc",
        ),
        _ => return None,
    };
    Some(Contracts {
        simplepage: simplepage.parse().expect("checked literal"),
        universal_resolver: universal_resolver.parse().expect("checked literal"),
    })
}

/// Node server and indexer configuration
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Kubo API URL
    pub ipfs_api: String,
    /// Host to bind the HTTP surface to
    pub api_host: String,
    /// Port to bind the HTTP surface to
    pub api_port: u16,
    /// Chain JSON-RPC endpoint
    pub rpc_url: String,
    /// First height to scan when the store holds no cursor
    pub start_block: u64,
    /// Expected chain id; verified against the endpoint when set
    pub chain_id: Option<u64>,
    /// Run the HTTP surface without the reconciler
    pub disable_indexing: bool,
    /// Registry address override
    pub simplepage: Option<Address>,
    /// Universal resolver address override
    pub universal_resolver: Option<Address>,
    /// TLS key path; TLS serves only when both paths are set
    pub tls_key: Option<PathBuf>,
    /// TLS certificate path
    pub tls_cert: Option<PathBuf>,
    /// Upload byte cap
    pub max_upload_bytes: usize,
    /// Blocks per scan chunk
    pub batch: u64,
    /// Sleep between reconciler cycles
    pub cycle_interval: Duration,
    /// Staged uploads older than this are pruned
    pub max_staged_age: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ipfs_api: "http://localhost:5001".to_string(),
            api_host: "localhost".to_string(),
            api_port: 3000,
            rpc_url: "http://localhost:8545".to_string(),
            start_block: 0,
            chain_id: None,
            disable_indexing: false,
            simplepage: None,
            universal_resolver: None,
            tls_key: None,
            tls_cert: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            batch: 100,
            cycle_interval: Duration::from_millis(500),
            max_staged_age: Duration::from_secs(3600),
        }
    }
}

impl NodeConfig {
    /// Bind address of the HTTP surface
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    /// Resolve the contract pair from overrides and chain-id defaults
    pub fn contracts(&self) -> Option<Contracts> {
        let defaults = self.chain_id.and_then(default_contracts);
        let simplepage = self.simplepage.or(defaults.map(|c| c.simplepage))?;
        let universal_resolver = self
            .universal_resolver
            .or(defaults.map(|c| c.universal_resolver))?;
        Some(Contracts {
            simplepage,
            universal_resolver,
        })
    }

    /// Whether both TLS paths are present
    pub fn tls_enabled(&self) -> bool {
        self.tls_key.is_some() && self.tls_cert.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = NodeConfig::default();
        assert_eq!(config.bind_addr(), "localhost:3000");
    }

    #[test]
    fn overrides_beat_chain_defaults() {
        let mut config = NodeConfig {
            chain_id: Some(1),
            ..Default::default()
        };
        let defaults = config.contracts().unwrap();

        let custom: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        config.simplepage = Some(custom);
        let resolved = config.contracts().unwrap();
        assert_eq!(resolved.simplepage, custom);
        assert_eq!(resolved.universal_resolver, defaults.universal_resolver);
    }

    #[test]
    fn unknown_chain_without_overrides_has_no_contracts() {
        let config = NodeConfig {
            chain_id: Some(31337),
            ..Default::default()
        };
        assert!(config.contracts().is_none());
    }
}
