//! Persistent finalization map
//!
//! The map `{name -> sorted-by-height [(height, cid)]}` is the canonical
//! record of every live and historical version. It is serialized as a single
//! dag-cbor block pinned under `spg_finalizations`. Version roots are stored
//! as CID *strings*, not links: the map pin must never cover the version
//! DAGs, or the nuke path's keep-set computation would see every block as
//! still referenced and never free anything. Durability of the DAGs comes
//! from the `spg_final_*` pins instead.
//!
//! Replacing the pin is not transactional in every store, so a brief window
//! with both the old and the new pin is tolerated: reads pick the candidate
//! that decodes to the most entries. Writers are serialized through an
//! internal update queue; this is the only strictly serial section of the
//! dservice.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use spage_store::{labels, Cid, CidCodec, PageStore, StoreError};

use crate::error::Result;

/// One finalized version of a name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalEntry {
    pub height: u64,
    #[serde(with = "cid_string")]
    pub cid: Cid,
}

// CIDs in the persisted map are strings so the map block has no IPLD links;
// see the module docs for why that matters to the nuke path
mod cid_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use spage_store::Cid;

    pub fn serialize<S: Serializer>(cid: &Cid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&cid.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Cid, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cid::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

/// Semantic content of the finalization map
pub type FinalizationMap = BTreeMap<String, Vec<FinalEntry>>;

/// Store-backed finalization map with serialized mutations
pub struct FinalizationStore<S> {
    store: Arc<S>,
    // update queue: mutations close over read-compute-write under this lock
    queue: Mutex<()>,
}

impl<S: PageStore> FinalizationStore<S> {
    /// Create over a store
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            queue: Mutex::new(()),
        }
    }

    /// Read the current map, tolerating the multi-pin replacement window
    pub async fn load(&self) -> Result<FinalizationMap> {
        Ok(self.load_with_pins().await?.0)
    }

    /// Names that currently have finalization history
    pub async fn list_names(&self) -> Result<Vec<String>> {
        Ok(self.load().await?.into_keys().collect())
    }

    /// Finalized versions of `name`, ascending by height
    pub async fn entries_for(&self, name: &str) -> Result<Vec<FinalEntry>> {
        Ok(self.load().await?.remove(name).unwrap_or_default())
    }

    /// Whether `(name, height, cid)` is already recorded
    pub async fn is_finalized(&self, name: &str, height: u64, cid: &Cid) -> Result<bool> {
        Ok(self
            .entries_for(name)
            .await?
            .iter()
            .any(|e| e.height == height && e.cid == *cid))
    }

    /// Insert or replace the entry of `name` at `height`, keeping the list
    /// sorted ascending
    pub async fn push(&self, name: &str, height: u64, cid: Cid) -> Result<()> {
        self.mutate(|map| {
            let entries = map.entry(name.to_string()).or_default();
            match entries.binary_search_by_key(&height, |e| e.height) {
                Ok(i) => entries[i] = FinalEntry { height, cid },
                Err(i) => entries.insert(i, FinalEntry { height, cid }),
            }
        })
        .await
    }

    /// Drop all history of `name`
    pub async fn remove(&self, name: &str) -> Result<()> {
        self.mutate(|map| {
            map.remove(name);
        })
        .await
    }

    async fn load_with_pins(&self) -> Result<(FinalizationMap, Vec<Cid>)> {
        let mut pinned = Vec::new();
        let mut best: Option<FinalizationMap> = None;
        for pin in self.store.pin_list(labels::FINALIZATIONS_LABEL).await? {
            if pin.label != labels::FINALIZATIONS_LABEL {
                continue;
            }
            pinned.push(pin.cid);
            let data = match self.store.get_block(&pin.cid).await {
                Ok(data) => data,
                Err(StoreError::NotFound(_)) => {
                    warn!(cid = %pin.cid, "finalization map pin without a block");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let map: FinalizationMap = match serde_ipld_dagcbor::from_slice(&data) {
                Ok(map) => map,
                Err(e) => {
                    warn!(cid = %pin.cid, error = %e, "undecodable finalization map candidate");
                    continue;
                }
            };
            let richer = match &best {
                Some(current) => entry_count(&map) > entry_count(current),
                None => true,
            };
            if richer {
                best = Some(map);
            }
        }
        Ok((best.unwrap_or_default(), pinned))
    }

    async fn mutate<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut FinalizationMap),
    {
        let _guard = self.queue.lock().await;

        let (mut map, old_pins) = self.load_with_pins().await?;
        apply(&mut map);

        let data = serde_ipld_dagcbor::to_vec(&map)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let new_cid = self.store.put_block(&data, CidCodec::DagCbor).await?;
        self.store
            .pin_add(&new_cid, labels::FINALIZATIONS_LABEL, true)
            .await?;
        for old in old_pins {
            if old != new_cid {
                self.store
                    .pin_remove(&old, labels::FINALIZATIONS_LABEL)
                    .await?;
                // the superseded block is unpinned; leave removal to the
                // store's own garbage collection
                debug!(cid = %old, "replaced finalization map pin");
            }
        }
        Ok(())
    }
}

fn entry_count(map: &FinalizationMap) -> usize {
    map.values().map(Vec::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use spage_store::{hash_cid, MemoryStore};

    fn version(n: u8) -> Cid {
        hash_cid(&[n], CidCodec::Raw)
    }

    fn finals() -> FinalizationStore<MemoryStore> {
        FinalizationStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn starts_empty() {
        let finals = finals();
        assert!(finals.load().await.unwrap().is_empty());
        assert!(finals.entries_for("alice.eth").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_keeps_entries_sorted() {
        let finals = finals();
        finals.push("alice.eth", 103, version(3)).await.unwrap();
        finals.push("alice.eth", 101, version(1)).await.unwrap();
        finals.push("alice.eth", 102, version(2)).await.unwrap();

        let entries = finals.entries_for("alice.eth").await.unwrap();
        assert_eq!(
            entries,
            vec![
                FinalEntry { height: 101, cid: version(1) },
                FinalEntry { height: 102, cid: version(2) },
                FinalEntry { height: 103, cid: version(3) },
            ]
        );
    }

    #[tokio::test]
    async fn push_replaces_same_height() {
        let finals = finals();
        finals.push("alice.eth", 101, version(1)).await.unwrap();
        finals.push("alice.eth", 101, version(9)).await.unwrap();

        let entries = finals.entries_for("alice.eth").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].cid, version(9));
        assert!(finals.is_finalized("alice.eth", 101, &version(9)).await.unwrap());
        assert!(!finals.is_finalized("alice.eth", 101, &version(1)).await.unwrap());
    }

    #[tokio::test]
    async fn remove_drops_only_one_name() {
        let finals = finals();
        finals.push("alice.eth", 101, version(1)).await.unwrap();
        finals.push("bob.eth", 102, version(2)).await.unwrap();
        finals.remove("alice.eth").await.unwrap();

        assert_eq!(finals.list_names().await.unwrap(), vec!["bob.eth"]);
    }

    #[tokio::test]
    async fn exactly_one_pin_after_updates() {
        let finals = finals();
        for height in 1..=5u64 {
            finals.push("alice.eth", height, version(height as u8)).await.unwrap();
        }
        let store = Arc::clone(&finals.store);
        let pins = store.pin_list(labels::FINALIZATIONS_LABEL).await.unwrap();
        assert_eq!(pins.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_pushes_compose() {
        let finals = Arc::new(finals());
        let mut handles = Vec::new();
        for height in 1..=8u64 {
            let finals = Arc::clone(&finals);
            handles.push(tokio::spawn(async move {
                finals.push("alice.eth", height, version(height as u8)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(finals.entries_for("alice.eth").await.unwrap().len(), 8);
    }
}
