//! End-to-end reconciler scenarios against the in-memory store and a
//! scripted chain source

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use spage_chain::{namehash, Address, ContentUpdate, NewName, ScanOutcome};
use spage_core::{
    contenthash_set, write_archive, ChainSource, FinalEntry, FinalizationStore, Indexer,
    IndexerConfig, ListRegistry, ListValue, ALLOW_SET, BLOCK_SET, DOMAINS_SET, RESOLVERS_SET,
};
use spage_store::memory::encode_directory;
use spage_store::{labels, Cid, CidCodec, MemoryStore, PageStore, StoreError};

/// Scripted chain: scripted mints and updates, manually advanced head
#[derive(Clone, Default)]
struct FakeChain {
    inner: Arc<Mutex<FakeChainInner>>,
}

#[derive(Default)]
struct FakeChainInner {
    head: u64,
    mints: Vec<NewName>,
    updates: Vec<ContentUpdate>,
    scans: Vec<(u64, u64)>,
}

impl FakeChain {
    fn new() -> Self {
        Self::default()
    }

    fn set_head(&self, head: u64) {
        self.inner.lock().head = head;
    }

    fn mint(&self, name: &str, resolver: Address, at_height: u64) {
        self.inner.lock().mints.push(NewName {
            name: name.to_string(),
            resolver,
            at_height,
        });
    }

    fn update(&self, resolver: Address, name: &str, cid: Cid, at_height: u64) {
        self.inner.lock().updates.push(ContentUpdate {
            resolver,
            node: namehash(name),
            cid,
            at_height,
        });
    }

    fn scans(&self) -> Vec<(u64, u64)> {
        self.inner.lock().scans.clone()
    }
}

#[async_trait]
impl ChainSource for FakeChain {
    async fn head(&self) -> spage_chain::Result<u64> {
        Ok(self.inner.lock().head)
    }

    async fn scan_range(
        &self,
        from: u64,
        to: u64,
        resolvers: &[Address],
    ) -> spage_chain::Result<ScanOutcome> {
        let mut inner = self.inner.lock();
        inner.scans.push((from, to));

        let new_names: Vec<NewName> = inner
            .mints
            .iter()
            .filter(|m| (from..=to).contains(&m.at_height))
            .cloned()
            .collect();

        // like the real watcher: resolvers first seen in this range already
        // contribute their updates within the same range
        let mut known = resolvers.to_vec();
        for mint in &new_names {
            if !known.contains(&mint.resolver) {
                known.push(mint.resolver);
            }
        }

        let content_updates = inner
            .updates
            .iter()
            .filter(|u| (from..=to).contains(&u.at_height) && known.contains(&u.resolver))
            .cloned()
            .collect();

        Ok(ScanOutcome {
            new_names,
            content_updates,
        })
    }
}

fn resolver(n: u8) -> Address {
    Address([n; 20])
}

struct Node {
    store: Arc<MemoryStore>,
    chain: FakeChain,
    indexer: Indexer<MemoryStore, FakeChain>,
    lists: ListRegistry<MemoryStore>,
    finals: FinalizationStore<MemoryStore>,
}

fn node_with_config(config: IndexerConfig) -> Node {
    let store = Arc::new(MemoryStore::new());
    let chain = FakeChain::new();
    Node {
        indexer: Indexer::new(Arc::clone(&store), chain.clone(), config),
        lists: ListRegistry::new(Arc::clone(&store)),
        finals: FinalizationStore::new(Arc::clone(&store)),
        store,
        chain,
    }
}

fn node() -> Node {
    node_with_config(IndexerConfig::default())
}

/// Store a page DAG: a root directory with an index file and an extra asset
async fn page(store: &MemoryStore, content: &[u8], asset: Cid) -> Cid {
    let index = store.put_block(content, CidCodec::Raw).await.unwrap();
    let dir: BTreeMap<String, Cid> = [
        ("index.html".to_string(), index),
        ("asset.bin".to_string(), asset),
    ]
    .into();
    let bytes = encode_directory(&dir).unwrap();
    store.put_block(&bytes, CidCodec::DagCbor).await.unwrap()
}

#[tokio::test]
async fn mint_and_finalize() {
    let mut node = node();
    let asset = node.store.put_block(b"asset", CidCodec::Raw).await.unwrap();
    let bafy_a = page(&node.store, b"v1", asset).await;

    node.chain.mint("alice.eth", resolver(1), 100);
    node.chain.update(resolver(1), "alice.eth", bafy_a, 101);
    node.chain.set_head(101);

    node.indexer.cycle().await.unwrap();

    assert_eq!(node.lists.strings(DOMAINS_SET).await.unwrap(), vec!["alice.eth"]);
    assert_eq!(
        node.lists.addresses(RESOLVERS_SET).await.unwrap(),
        vec![[1u8; 20]]
    );
    assert_eq!(
        node.lists
            .strings(&contenthash_set("alice.eth"))
            .await
            .unwrap(),
        vec![format!("101-{bafy_a}")]
    );

    let pins = node.store.pin_list("spg_final_alice.eth_101").await.unwrap();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].cid, bafy_a);

    assert_eq!(
        node.finals.entries_for("alice.eth").await.unwrap(),
        vec![FinalEntry { height: 101, cid: bafy_a }]
    );
}

#[tokio::test]
async fn multiple_updates_latest_wins() {
    let mut node = node();
    let asset = node.store.put_block(b"asset", CidCodec::Raw).await.unwrap();
    let bafy_a = page(&node.store, b"v1", asset).await;
    let bafy_b = page(&node.store, b"v2", asset).await;
    let bafy_c = page(&node.store, b"v3", asset).await;

    node.chain.mint("alice.eth", resolver(1), 100);
    node.chain.update(resolver(1), "alice.eth", bafy_a, 101);
    node.chain.update(resolver(1), "alice.eth", bafy_b, 102);
    node.chain.update(resolver(1), "alice.eth", bafy_c, 103);

    // updates land over successive cycles; each finalizes the then-newest
    for head in [101, 102, 103] {
        node.chain.set_head(head);
        node.indexer.cycle().await.unwrap();
    }

    let pins = node.store.pin_list("spg_final_alice.eth_103").await.unwrap();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].cid, bafy_c);

    assert_eq!(
        node.finals.entries_for("alice.eth").await.unwrap(),
        vec![
            FinalEntry { height: 101, cid: bafy_a },
            FinalEntry { height: 102, cid: bafy_b },
            FinalEntry { height: 103, cid: bafy_c },
        ]
    );
}

#[tokio::test]
async fn block_list_nukes_but_spares_shared_blocks() {
    let mut node = node();
    let shared = node.store.put_block(b"shared asset", CidCodec::Raw).await.unwrap();
    let alice_page = page(&node.store, b"alice html", shared).await;
    let bob_page = page(&node.store, b"bob html", shared).await;

    node.chain.mint("alice.eth", resolver(1), 100);
    node.chain.mint("bob.eth", resolver(2), 100);
    node.chain.update(resolver(1), "alice.eth", alice_page, 101);
    node.chain.update(resolver(2), "bob.eth", bob_page, 101);
    node.chain.set_head(101);
    node.indexer.cycle().await.unwrap();
    assert_eq!(node.finals.list_names().await.unwrap().len(), 2);

    // operator blocks alice
    node.lists
        .add(BLOCK_SET, &ListValue::Str("alice.eth".to_string()))
        .await
        .unwrap();
    node.indexer.cycle().await.unwrap();

    assert!(node
        .store
        .pin_list("spg_final_alice.eth_")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(node.finals.list_names().await.unwrap(), vec!["bob.eth"]);

    // alice's unique blocks are gone
    assert!(matches!(
        node.store.get_block(&alice_page).await,
        Err(StoreError::NotFound(_))
    ));
    // the block shared with bob survives, and bob's page is intact
    assert!(node.store.get_block(&shared).await.is_ok());
    assert!(node.store.get_block(&bob_page).await.is_ok());
}

#[tokio::test]
async fn allow_list_is_exclusive() {
    let mut node = node();
    let asset = node.store.put_block(b"asset", CidCodec::Raw).await.unwrap();
    let alice_page = page(&node.store, b"alice", asset).await;
    let bob_page = page(&node.store, b"bob", asset).await;

    node.lists
        .add(ALLOW_SET, &ListValue::Str("bob.eth".to_string()))
        .await
        .unwrap();

    node.chain.mint("alice.eth", resolver(1), 100);
    node.chain.mint("bob.eth", resolver(2), 100);
    node.chain.update(resolver(1), "alice.eth", alice_page, 101);
    node.chain.update(resolver(2), "bob.eth", bob_page, 101);
    node.chain.set_head(101);
    node.indexer.cycle().await.unwrap();

    // only bob is finalized while the allow set excludes alice
    assert_eq!(node.finals.list_names().await.unwrap(), vec!["bob.eth"]);
    assert!(node
        .store
        .pin_list("spg_final_alice.eth_")
        .await
        .unwrap()
        .is_empty());

    // admitting alice finalizes her on a later cycle
    node.lists
        .add(ALLOW_SET, &ListValue::Str("alice.eth".to_string()))
        .await
        .unwrap();
    node.indexer.cycle().await.unwrap();

    let mut names = node.finals.list_names().await.unwrap();
    names.sort();
    assert_eq!(names, vec!["alice.eth", "bob.eth"]);
}

#[tokio::test]
async fn stale_staged_uploads_are_pruned() {
    let mut node = node_with_config(IndexerConfig {
        max_staged_age: std::time::Duration::from_secs(3600),
        ..Default::default()
    });

    // a fresh upload through the intake path
    let index = spage_store::hash_cid(b"fresh", CidCodec::Raw);
    let archive = spage_store::car::encode(vec![index], vec![(index, b"fresh".to_vec())]).unwrap();
    write_archive(node.store.as_ref(), "carol.eth", archive, 1024)
        .await
        .unwrap();

    // an orphan staged two hours ago
    let stale = node.store.put_block(b"stale", CidCodec::Raw).await.unwrap();
    let old_ts = chrono::Utc::now().timestamp() as u64 - 7200;
    node.store
        .pin_add(&stale, &labels::staged("dave.eth", old_ts), true)
        .await
        .unwrap();

    node.indexer.cycle().await.unwrap();

    assert_eq!(
        node.store.pin_list("spg_staged_carol.eth_").await.unwrap().len(),
        1,
        "fresh staged upload must survive"
    );
    assert!(
        node.store.pin_list("spg_staged_dave.eth_").await.unwrap().is_empty(),
        "stale staged upload must be pruned"
    );
}

#[tokio::test]
async fn finalize_removes_staged_pins_for_the_name() {
    let mut node = node();
    let asset = node.store.put_block(b"asset", CidCodec::Raw).await.unwrap();
    let uploaded = page(&node.store, b"uploaded", asset).await;
    let finalized = page(&node.store, b"onchain", asset).await;

    // two staged uploads with different CIDs than the finalized version
    node.store
        .pin_add(
            &uploaded,
            &labels::staged("alice.eth", chrono::Utc::now().timestamp() as u64),
            true,
        )
        .await
        .unwrap();

    node.chain.mint("alice.eth", resolver(1), 100);
    node.chain.update(resolver(1), "alice.eth", finalized, 101);
    node.chain.set_head(101);
    node.indexer.cycle().await.unwrap();

    assert!(node.store.pin_list("spg_staged_alice.eth_").await.unwrap().is_empty());
    assert_eq!(node.store.pin_list("spg_final_alice.eth_").await.unwrap().len(), 1);
}

#[tokio::test]
async fn restart_resumes_from_the_persisted_cursor() {
    let store = Arc::new(MemoryStore::new());
    let chain = FakeChain::new();
    let asset = store.put_block(b"asset", CidCodec::Raw).await.unwrap();
    let page_cid = page(&store, b"page", asset).await;

    chain.mint("alice.eth", resolver(1), 50);
    chain.update(resolver(1), "alice.eth", page_cid, 60);
    chain.set_head(100);

    let mut first = Indexer::new(Arc::clone(&store), chain.clone(), IndexerConfig::default());
    first.cycle().await.unwrap();
    drop(first);

    let lists = ListRegistry::new(Arc::clone(&store));
    assert_eq!(lists.strings(DOMAINS_SET).await.unwrap(), vec!["alice.eth"]);
    let scans_before = chain.scans().len();

    // fresh indexer, start-block deliberately reset to 0
    let mut second = Indexer::new(
        Arc::clone(&store),
        chain.clone(),
        IndexerConfig {
            start_block: 0,
            ..Default::default()
        },
    );
    chain.set_head(105);
    second.cycle().await.unwrap();

    // scanning resumed past the processed range instead of rescanning from 0
    let scans = chain.scans();
    assert_eq!(scans.len(), scans_before + 1);
    assert_eq!(scans[scans_before].0, 101);

    // the name minted at 50 is still known without rediscovery
    assert_eq!(lists.strings(DOMAINS_SET).await.unwrap(), vec!["alice.eth"]);
}

#[tokio::test]
async fn cycles_are_idempotent() {
    let mut node = node();
    let asset = node.store.put_block(b"asset", CidCodec::Raw).await.unwrap();
    let page_cid = page(&node.store, b"page", asset).await;

    node.chain.mint("alice.eth", resolver(1), 100);
    node.chain.update(resolver(1), "alice.eth", page_cid, 101);
    node.chain.set_head(101);

    node.indexer.cycle().await.unwrap();
    let pins_after_one = node.store.pin_list("").await.unwrap().len();
    let finals_after_one = node.finals.entries_for("alice.eth").await.unwrap();

    // nothing external changed; a second cycle must not move the store
    node.indexer.cycle().await.unwrap();
    assert_eq!(node.store.pin_list("").await.unwrap().len(), pins_after_one);
    assert_eq!(
        node.finals.entries_for("alice.eth").await.unwrap(),
        finals_after_one
    );
}

#[tokio::test]
async fn final_pins_agree_with_the_map() {
    let mut node = node();
    let asset = node.store.put_block(b"asset", CidCodec::Raw).await.unwrap();
    for (name, res, height) in [("alice.eth", 1u8, 101u64), ("bob.eth", 2, 102)] {
        let cid = page(&node.store, name.as_bytes(), asset).await;
        node.chain.mint(name, resolver(res), 100);
        node.chain.update(resolver(res), name, cid, height);
    }
    node.chain.set_head(102);
    node.indexer.cycle().await.unwrap();

    // invariants: one final pin per (name, height), matching the map, with
    // every reachable block resident
    for name in node.finals.list_names().await.unwrap() {
        for entry in node.finals.entries_for(&name).await.unwrap() {
            let label = labels::finalized(&name, entry.height);
            let pins = node.store.pin_list(&label).await.unwrap();
            assert_eq!(pins.len(), 1, "exactly one pin for {label}");
            assert_eq!(pins[0].cid, entry.cid);

            for cid in node.store.enumerate_descendants(&entry.cid).await.unwrap() {
                assert!(node.store.get_block(&cid).await.is_ok());
            }
        }
    }
}

#[tokio::test]
async fn missing_final_pin_is_reported_as_a_violation() {
    let mut node = node();
    let asset = node.store.put_block(b"asset", CidCodec::Raw).await.unwrap();
    let page_cid = page(&node.store, b"page", asset).await;

    node.chain.mint("alice.eth", resolver(1), 100);
    node.chain.update(resolver(1), "alice.eth", page_cid, 101);
    node.chain.set_head(101);
    node.indexer.cycle().await.unwrap();
    assert!(node.indexer.audit_finalized().await.unwrap().is_empty());

    // remove the durability pin behind the map's back
    let label = labels::finalized("alice.eth", 101);
    node.store.pin_remove(&page_cid, &label).await.unwrap();

    let violations = node.indexer.audit_finalized().await.unwrap();
    assert_eq!(violations, vec![("alice.eth".to_string(), 101)]);

    // a pin under the right label but the wrong CID is still a violation
    let imposter = node.store.put_block(b"imposter", CidCodec::Raw).await.unwrap();
    node.store.pin_add(&imposter, &label, true).await.unwrap();
    let violations = node.indexer.audit_finalized().await.unwrap();
    assert_eq!(violations, vec![("alice.eth".to_string(), 101)]);

    // the map stays the truth and cycles keep running
    node.indexer.cycle().await.unwrap();
    assert_eq!(
        node.finals.entries_for("alice.eth").await.unwrap(),
        vec![FinalEntry { height: 101, cid: page_cid }]
    );
}

#[tokio::test]
async fn ties_at_equal_height_go_to_the_last_written() {
    let mut node = node();
    let asset = node.store.put_block(b"asset", CidCodec::Raw).await.unwrap();
    let first = page(&node.store, b"first", asset).await;
    let second = page(&node.store, b"second", asset).await;

    node.chain.mint("alice.eth", resolver(1), 100);
    node.chain.update(resolver(1), "alice.eth", first, 101);
    node.chain.update(resolver(1), "alice.eth", second, 101);
    node.chain.set_head(101);
    node.indexer.cycle().await.unwrap();

    assert_eq!(
        node.finals.entries_for("alice.eth").await.unwrap(),
        vec![FinalEntry { height: 101, cid: second }]
    );
}

#[tokio::test]
async fn heights_compare_numerically_not_lexicographically() {
    let mut node = node();
    let asset = node.store.put_block(b"asset", CidCodec::Raw).await.unwrap();
    let early = page(&node.store, b"early", asset).await;
    let late = page(&node.store, b"late", asset).await;

    // "9" sorts after "100" lexicographically; the newest entry is at 100
    node.chain.mint("alice.eth", resolver(1), 5);
    node.chain.update(resolver(1), "alice.eth", early, 9);
    node.chain.update(resolver(1), "alice.eth", late, 100);
    node.chain.set_head(100);
    node.indexer.cycle().await.unwrap();

    let pins = node.store.pin_list("spg_final_alice.eth_100").await.unwrap();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].cid, late);
}
