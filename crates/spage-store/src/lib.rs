//! # SimplePage store adapter
//!
//! Semantic wrapper over a content-addressed block store for the dservice.
//!
//! This crate provides:
//! - **Archive operations**: import and export CAR bundles
//! - **Block operations**: get, put, and remove raw blocks
//! - **Pin operations**: labelled pins, prefix listing, reverse lookup by CID
//! - **DAG operations**: directory listing and recursive descendant enumeration
//! - **CAR codec**: synchronous CAR v1 encode/decode for served archives
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     indexer / HTTP surface (callers)    │
//! ├─────────────────────────────────────────┤
//! │            PageStore trait              │
//! ├────────────────────┬────────────────────┤
//! │     IpfsStore      │    MemoryStore     │
//! ├────────────────────┴────────────────────┤
//! │        Kubo HTTP API / in-memory        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The pin namespace (see [`labels`]) is the dservice's only persistence
//! layer: every piece of runtime state is reconstructed from pins on startup.

pub mod car;
pub mod cid_utils;
pub mod error;
pub mod ipfs;
pub mod labels;
pub mod memory;

pub use cid_utils::{
    hash_cid, identity_cid, identity_payload, parse_cid, Cid, CidCodec, Multihash,
};
pub use error::{Result, StoreError};
pub use ipfs::{IpfsConfig, IpfsStore};
pub use memory::MemoryStore;

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;

/// One entry of a directory node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name within the directory
    pub name: String,
    /// CID of the child
    pub cid: Cid,
    /// Entry kind
    pub kind: EntryKind,
}

/// Kind of a directory entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One pin as reported by the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinEntry {
    /// Pinned CID (for indirect references, the CID of the covering pin)
    pub cid: Cid,
    /// Pin label; empty for indirect references
    pub label: String,
}

/// Trait for store backends
///
/// All operations are idempotent with respect to repeated identical calls.
/// Label uniqueness is not enforced: the same label on multiple pins is an
/// operator error that implementations tolerate and log.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Verify the store is reachable
    async fn health_check(&self) -> Result<()>;

    /// Import a CAR archive, returning the root CID of the last declared root
    async fn import_archive(&self, archive: Bytes) -> Result<Cid>;

    /// Export the full DAG under `root` as a CAR archive
    async fn export_archive(&self, root: &Cid) -> Result<Bytes>;

    /// Retrieve a raw block
    async fn get_block(&self, cid: &Cid) -> Result<Bytes>;

    /// Store a block under the given codec and return its CID
    async fn put_block(&self, data: &[u8], codec: CidCodec) -> Result<Cid>;

    /// Remove a block. Missing blocks are not an error.
    async fn remove_block(&self, cid: &Cid) -> Result<()>;

    /// List the entries of a directory node
    async fn list_children(&self, cid: &Cid) -> Result<Vec<DirEntry>>;

    /// Add a pin under `label`. Recursive pins cover the whole DAG.
    async fn pin_add(&self, cid: &Cid, label: &str, recursive: bool) -> Result<()>;

    /// Remove the pin of `cid` carrying `label`. Missing pins are not an error.
    async fn pin_remove(&self, cid: &Cid, label: &str) -> Result<()>;

    /// List pins whose label starts with `label_prefix`, in insertion order
    /// where the backend preserves it
    async fn pin_list(&self, label_prefix: &str) -> Result<Vec<PinEntry>>;

    /// List every pin referencing `cid`, directly or transitively
    async fn pins_by_cid(&self, cid: &Cid) -> Result<Vec<PinEntry>>;

    /// Enumerate the CIDs of the DAG under `cid`, including `cid` itself
    async fn enumerate_descendants(&self, cid: &Cid) -> Result<HashSet<Cid>>;
}

/// Store backend selected at startup
pub enum AnyStore {
    /// Kubo-backed store (production)
    Ipfs(IpfsStore),
    /// In-memory store (tests, development)
    Memory(MemoryStore),
}

#[async_trait]
impl PageStore for AnyStore {
    async fn health_check(&self) -> Result<()> {
        match self {
            Self::Ipfs(s) => s.health_check().await,
            Self::Memory(s) => s.health_check().await,
        }
    }

    async fn import_archive(&self, archive: Bytes) -> Result<Cid> {
        match self {
            Self::Ipfs(s) => s.import_archive(archive).await,
            Self::Memory(s) => s.import_archive(archive).await,
        }
    }

    async fn export_archive(&self, root: &Cid) -> Result<Bytes> {
        match self {
            Self::Ipfs(s) => s.export_archive(root).await,
            Self::Memory(s) => s.export_archive(root).await,
        }
    }

    async fn get_block(&self, cid: &Cid) -> Result<Bytes> {
        match self {
            Self::Ipfs(s) => s.get_block(cid).await,
            Self::Memory(s) => s.get_block(cid).await,
        }
    }

    async fn put_block(&self, data: &[u8], codec: CidCodec) -> Result<Cid> {
        match self {
            Self::Ipfs(s) => s.put_block(data, codec).await,
            Self::Memory(s) => s.put_block(data, codec).await,
        }
    }

    async fn remove_block(&self, cid: &Cid) -> Result<()> {
        match self {
            Self::Ipfs(s) => s.remove_block(cid).await,
            Self::Memory(s) => s.remove_block(cid).await,
        }
    }

    async fn list_children(&self, cid: &Cid) -> Result<Vec<DirEntry>> {
        match self {
            Self::Ipfs(s) => s.list_children(cid).await,
            Self::Memory(s) => s.list_children(cid).await,
        }
    }

    async fn pin_add(&self, cid: &Cid, label: &str, recursive: bool) -> Result<()> {
        match self {
            Self::Ipfs(s) => s.pin_add(cid, label, recursive).await,
            Self::Memory(s) => s.pin_add(cid, label, recursive).await,
        }
    }

    async fn pin_remove(&self, cid: &Cid, label: &str) -> Result<()> {
        match self {
            Self::Ipfs(s) => s.pin_remove(cid, label).await,
            Self::Memory(s) => s.pin_remove(cid, label).await,
        }
    }

    async fn pin_list(&self, label_prefix: &str) -> Result<Vec<PinEntry>> {
        match self {
            Self::Ipfs(s) => s.pin_list(label_prefix).await,
            Self::Memory(s) => s.pin_list(label_prefix).await,
        }
    }

    async fn pins_by_cid(&self, cid: &Cid) -> Result<Vec<PinEntry>> {
        match self {
            Self::Ipfs(s) => s.pins_by_cid(cid).await,
            Self::Memory(s) => s.pins_by_cid(cid).await,
        }
    }

    async fn enumerate_descendants(&self, cid: &Cid) -> Result<HashSet<Cid>> {
        match self {
            Self::Ipfs(s) => s.enumerate_descendants(cid).await,
            Self::Memory(s) => s.enumerate_descendants(cid).await,
        }
    }
}
