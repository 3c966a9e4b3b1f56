//! # SimplePage indexing core
//!
//! The indexer + pinning lifecycle engine of the dservice:
//! - **List registry**: operator and indexer sets stored as identity-CID pins
//! - **Finalization map**: persistent per-name version history with a serial
//!   update queue
//! - **Reconciler**: the polling cycle reconciling chain progress, the local
//!   pin set, and operator allow/block policy
//! - **Upload intake** and the **serving path** for reduced archives
//!
//! All state lives in the store's pin namespace; on restart the engine
//! reconstructs itself from pins alone.

pub mod error;
pub mod finalization;
pub mod lists;
pub mod reconciler;
pub mod serve;
pub mod source;
pub mod upload;

pub use error::{CoreError, Result};
pub use finalization::{FinalEntry, FinalizationMap, FinalizationStore};
pub use lists::{
    contenthash_set, ListKind, ListRegistry, ListValue, ALLOW_SET, BLOCK_SET, DOMAINS_SET,
    RESOLVERS_SET,
};
pub use reconciler::{Indexer, IndexerConfig};
pub use serve::{read_archive_lite, read_history_archive};
pub use source::ChainSource;
pub use upload::write_archive;
