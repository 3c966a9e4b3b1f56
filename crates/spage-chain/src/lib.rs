//! # SimplePage chain watcher
//!
//! Chain-facing half of the dservice indexer:
//! - **JSON-RPC client**: the four methods the watcher needs, with deadlines
//! - **ENS primitives**: namehash, DNS-wire encoding, contenthash decoding
//! - **Watcher**: mint discovery on the page registry and contenthash-update
//!   discovery across every resolver ever seen
//!
//! The watcher is stateless; the resolver set it scans is handed in by the
//! reconciler each cycle, reconstructed from the pin namespace.

pub mod ens;
pub mod error;
pub mod rpc;
pub mod types;
pub mod watcher;

pub use ens::{cid_to_contenthash, contenthash_to_cid, namehash};
pub use error::{ChainError, Result};
pub use rpc::{LogFilter, RpcClient, RpcConfig};
pub use types::{Address, Log, H256};
pub use watcher::{ChainWatcher, ContentUpdate, NewName, ScanOutcome, WatcherConfig};
