//! In-memory page store for testing and development
//!
//! Directory nodes are dag-cbor maps of `entry-name -> link`; files are raw
//! blocks. Links are recovered by decoding dag-cbor, so descendant
//! enumeration works for any structured block, the finalization map included.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use ipld_core::ipld::Ipld;
use parking_lot::RwLock;

use crate::cid_utils::{hash_cid, Cid, CidCodec};
use crate::error::{Result, StoreError};
use crate::{car, DirEntry, EntryKind, PageStore, PinEntry};

#[derive(Clone, Debug)]
struct StoredPin {
    cid: Cid,
    label: String,
    recursive: bool,
}

/// An in-memory page store with full (CID, label) pin multiplicity
#[derive(Default)]
pub struct MemoryStore {
    blocks: DashMap<Cid, Bytes>,
    // insertion order is observable through pin_list
    pins: RwLock<Vec<StoredPin>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks stored
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the store holds no blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Drop all blocks and pins
    pub fn clear(&self) {
        self.blocks.clear();
        self.pins.write().clear();
    }

    /// Direct links of a block; raw blocks and identity CIDs have none
    fn links(&self, cid: &Cid) -> Vec<Cid> {
        if cid.codec() != CidCodec::DagCbor.code() {
            return Vec::new();
        }
        let Some(data) = self.blocks.get(cid) else {
            return Vec::new();
        };
        match serde_ipld_dagcbor::from_slice::<Ipld>(data.value()) {
            Ok(ipld) => {
                let mut out = Vec::new();
                collect_links(&ipld, &mut out);
                out
            }
            Err(_) => Vec::new(),
        }
    }

    fn descendants(&self, root: &Cid) -> HashSet<Cid> {
        let mut seen = HashSet::from([*root]);
        let mut queue = vec![*root];
        while let Some(next) = queue.pop() {
            for link in self.links(&next) {
                if seen.insert(link) {
                    queue.push(link);
                }
            }
        }
        seen
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn import_archive(&self, archive: Bytes) -> Result<Cid> {
        let (roots, blocks) = car::decode(&archive)?;
        let root = *roots.last().expect("decode guarantees at least one root");
        if !blocks.iter().any(|(cid, _)| *cid == root) {
            return Err(StoreError::InvalidArchive(format!(
                "root {root} not present in archive"
            )));
        }
        for (cid, data) in blocks {
            self.blocks.insert(cid, Bytes::from(data));
        }
        Ok(root)
    }

    async fn export_archive(&self, root: &Cid) -> Result<Bytes> {
        if !self.blocks.contains_key(root) {
            return Err(StoreError::NotFound(*root));
        }
        let mut blocks = Vec::new();
        for cid in self.descendants(root) {
            if let Some(data) = self.blocks.get(&cid) {
                blocks.push((cid, data.value().to_vec()));
            }
        }
        car::encode(vec![*root], blocks)
    }

    async fn get_block(&self, cid: &Cid) -> Result<Bytes> {
        self.blocks
            .get(cid)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(*cid))
    }

    async fn put_block(&self, data: &[u8], codec: CidCodec) -> Result<Cid> {
        let cid = hash_cid(data, codec);
        self.blocks.insert(cid, Bytes::copy_from_slice(data));
        Ok(cid)
    }

    async fn remove_block(&self, cid: &Cid) -> Result<()> {
        self.blocks.remove(cid);
        Ok(())
    }

    async fn list_children(&self, cid: &Cid) -> Result<Vec<DirEntry>> {
        let data = self.get_block(cid).await?;
        let ipld: Ipld = serde_ipld_dagcbor::from_slice(&data)
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        let Ipld::Map(map) = ipld else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for (name, value) in map {
            if let Ipld::Link(link) = value {
                let child = widen(&link)?;
                entries.push(DirEntry {
                    name,
                    kind: if child.codec() == CidCodec::DagCbor.code() {
                        EntryKind::Directory
                    } else {
                        EntryKind::File
                    },
                    cid: child,
                });
            }
        }
        Ok(entries)
    }

    async fn pin_add(&self, cid: &Cid, label: &str, recursive: bool) -> Result<()> {
        let mut pins = self.pins.write();
        if pins.iter().any(|p| p.cid == *cid && p.label == label) {
            return Ok(());
        }
        pins.push(StoredPin {
            cid: *cid,
            label: label.to_string(),
            recursive,
        });
        Ok(())
    }

    async fn pin_remove(&self, cid: &Cid, label: &str) -> Result<()> {
        self.pins
            .write()
            .retain(|p| !(p.cid == *cid && p.label == label));
        Ok(())
    }

    async fn pin_list(&self, label_prefix: &str) -> Result<Vec<PinEntry>> {
        Ok(self
            .pins
            .read()
            .iter()
            .filter(|p| p.label.starts_with(label_prefix))
            .map(|p| PinEntry {
                cid: p.cid,
                label: p.label.clone(),
            })
            .collect())
    }

    async fn pins_by_cid(&self, cid: &Cid) -> Result<Vec<PinEntry>> {
        let pins = self.pins.read().clone();
        let mut entries = Vec::new();
        for pin in pins {
            let references = pin.cid == *cid
                || (pin.recursive && self.descendants(&pin.cid).contains(cid));
            if references {
                entries.push(PinEntry {
                    cid: pin.cid,
                    label: pin.label,
                });
            }
        }
        Ok(entries)
    }

    async fn enumerate_descendants(&self, cid: &Cid) -> Result<HashSet<Cid>> {
        Ok(self.descendants(cid))
    }
}

fn collect_links(ipld: &Ipld, out: &mut Vec<Cid>) {
    match ipld {
        Ipld::Link(link) => {
            if let Ok(cid) = widen(link) {
                out.push(cid);
            }
        }
        Ipld::List(items) => items.iter().for_each(|i| collect_links(i, out)),
        Ipld::Map(map) => map.values().for_each(|v| collect_links(v, out)),
        _ => {}
    }
}

// ipld-core links carry the stock 64-byte digest capacity; hash links always
// fit, only identity CIDs would not, and those never appear inside blocks
fn widen(link: &cid::Cid) -> Result<Cid> {
    Cid::read_bytes(link.to_bytes().as_slice()).map_err(|e| StoreError::InvalidCid(e.to_string()))
}

/// Encode a directory node mapping entry names to child CIDs
pub fn encode_directory(entries: &BTreeMap<String, Cid>) -> Result<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(entries).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn file(store: &MemoryStore, data: &[u8]) -> Cid {
        store.put_block(data, CidCodec::Raw).await.unwrap()
    }

    async fn dir(store: &MemoryStore, entries: &[(&str, Cid)]) -> Cid {
        let map: BTreeMap<String, Cid> =
            entries.iter().map(|(n, c)| (n.to_string(), *c)).collect();
        let bytes = encode_directory(&map).unwrap();
        store.put_block(&bytes, CidCodec::DagCbor).await.unwrap()
    }

    #[tokio::test]
    async fn block_roundtrip() {
        let store = MemoryStore::new();
        let cid = file(&store, b"hello").await;
        assert_eq!(store.get_block(&cid).await.unwrap().as_ref(), b"hello");

        store.remove_block(&cid).await.unwrap();
        assert!(matches!(
            store.get_block(&cid).await,
            Err(StoreError::NotFound(_))
        ));
        // removing again is fine
        store.remove_block(&cid).await.unwrap();
    }

    #[tokio::test]
    async fn list_children_reports_kinds() {
        let store = MemoryStore::new();
        let index = file(&store, b"<html>").await;
        let assets = dir(&store, &[]).await;
        let root = dir(&store, &[("index.html", index), ("docs", assets)]).await;

        let mut entries = store.list_children(&root).await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "docs");
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert_eq!(entries[1].name, "index.html");
        assert_eq!(entries[1].kind, EntryKind::File);
    }

    #[tokio::test]
    async fn descendants_cover_the_whole_tree() {
        let store = MemoryStore::new();
        let leaf = file(&store, b"leaf").await;
        let inner = dir(&store, &[("leaf.txt", leaf)]).await;
        let root = dir(&store, &[("sub", inner)]).await;

        let descendants = store.enumerate_descendants(&root).await.unwrap();
        assert_eq!(descendants, HashSet::from([root, inner, leaf]));
    }

    #[tokio::test]
    async fn pins_track_indirect_references() {
        let store = MemoryStore::new();
        let leaf = file(&store, b"shared").await;
        let root = dir(&store, &[("f", leaf)]).await;

        store.pin_add(&root, "spg_final_a.eth_1", true).await.unwrap();

        let direct = store.pins_by_cid(&root).await.unwrap();
        assert_eq!(direct.len(), 1);
        let indirect = store.pins_by_cid(&leaf).await.unwrap();
        assert_eq!(indirect.len(), 1);
        assert_eq!(indirect[0].label, "spg_final_a.eth_1");

        // non-recursive pins do not cover children
        store.pin_remove(&root, "spg_final_a.eth_1").await.unwrap();
        store.pin_add(&root, "spg_list_x", false).await.unwrap();
        assert!(store.pins_by_cid(&leaf).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pin_add_is_idempotent_and_ordered() {
        let store = MemoryStore::new();
        let a = file(&store, b"a").await;
        let b = file(&store, b"b").await;

        store.pin_add(&a, "spg_list_s", false).await.unwrap();
        store.pin_add(&b, "spg_list_t", false).await.unwrap();
        store.pin_add(&a, "spg_list_s", false).await.unwrap();

        let pins = store.pin_list("spg_list_").await.unwrap();
        assert_eq!(pins.len(), 2);
        assert_eq!(pins[0].label, "spg_list_s");
        assert_eq!(pins[1].label, "spg_list_t");
    }

    #[tokio::test]
    async fn archive_roundtrip_preserves_root() {
        let store = MemoryStore::new();
        let index = file(&store, b"content").await;
        let root = dir(&store, &[("index.html", index)]).await;

        let archive = store.export_archive(&root).await.unwrap();

        let other = MemoryStore::new();
        let imported = other.import_archive(archive).await.unwrap();
        assert_eq!(imported, root);
        assert_eq!(other.get_block(&index).await.unwrap().as_ref(), b"content");
    }

    #[tokio::test]
    async fn import_rejects_truncated_archives() {
        let store = MemoryStore::new();
        let err = store.import_archive(Bytes::from_static(b"junk")).await;
        assert!(matches!(err, Err(StoreError::InvalidArchive(_))));
    }
}
