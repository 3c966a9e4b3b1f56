//! The reconciler: drives one polling cycle end-to-end
//!
//! A cycle runs four stages, strictly in order and never in parallel:
//! advance the chain cursor, sync finalizations for active names, nuke
//! blocked names, prune stale staged uploads. The cycle is single-flighted;
//! the chain cursor is persisted only after every store mutation of the
//! cycle has succeeded, so a crash at any point resumes cleanly from the
//! previous cursor with idempotent stages.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use integer_encoding::VarInt;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use spage_chain::{namehash, Address};
use spage_store::{identity_cid, identity_payload, labels, parse_cid, Cid, PageStore};

use crate::error::Result;
use crate::finalization::FinalizationStore;
use crate::lists::{contenthash_set, ListRegistry, ListValue, BLOCK_SET, DOMAINS_SET};
use crate::lists::{ALLOW_SET, RESOLVERS_SET};
use crate::source::ChainSource;

/// Reconciler tuning; every field is runtime configuration
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// First height to scan when the store holds no cursor
    pub start_block: u64,
    /// Blocks per scan chunk
    pub batch: u64,
    /// Sleep between cycles
    pub cycle_interval: Duration,
    /// Staged uploads older than this are orphans
    pub max_staged_age: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            batch: 100,
            cycle_interval: Duration::from_millis(500),
            max_staged_age: Duration::from_secs(3600),
        }
    }
}

/// The indexing engine reconciling chain state, pin state, and policy
pub struct Indexer<S, C> {
    store: Arc<S>,
    lists: ListRegistry<S>,
    finals: FinalizationStore<S>,
    chain: C,
    config: IndexerConfig,
    /// Next height to scan; loaded lazily from the store
    cursor: Option<u64>,
    stop: Option<watch::Receiver<bool>>,
}

impl<S: PageStore, C: ChainSource> Indexer<S, C> {
    /// Create an indexer over a store and a chain source
    pub fn new(store: Arc<S>, chain: C, config: IndexerConfig) -> Self {
        Self {
            lists: ListRegistry::new(Arc::clone(&store)),
            finals: FinalizationStore::new(Arc::clone(&store)),
            store,
            chain,
            config,
            cursor: None,
            stop: None,
        }
    }

    /// Run cycles until the stop flag flips. The in-flight cycle is awaited;
    /// idempotent stages make an interrupted cycle a no-op on restart.
    pub async fn run(mut self, stop: watch::Receiver<bool>) {
        self.stop = Some(stop);
        info!("indexer started");
        loop {
            if self.stopping() {
                break;
            }
            if let Err(e) = self.cycle().await {
                warn!(error = %e, "cycle aborted, retrying next tick");
            }
            let interval = self.config.cycle_interval;
            let stop = self.stop.as_mut().expect("set on entry");
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.changed() => {}
            }
        }
        info!("indexer stopped");
    }

    /// One full reconciliation cycle
    #[instrument(skip(self))]
    pub async fn cycle(&mut self) -> Result<()> {
        self.advance().await?;
        if self.stopping() {
            return Ok(());
        }
        self.sync().await?;
        if self.stopping() {
            return Ok(());
        }
        self.nuke_blocked().await?;
        if self.stopping() {
            return Ok(());
        }
        self.prune_staged().await?;

        // every mutation of this cycle has succeeded; only now may the
        // cursor move forward
        if let Some(cursor) = self.cursor {
            if cursor > 0 {
                self.persist_cursor(cursor - 1).await?;
            }
        }
        Ok(())
    }

    /// Stage (a): scan new chunks up to the chain head, feeding the
    /// `domains`, `resolvers`, and per-name contenthash sets
    async fn advance(&mut self) -> Result<()> {
        let head = self.chain.head().await?;
        let mut cursor = match self.cursor {
            Some(cursor) => cursor,
            None => match self.load_cursor().await? {
                Some(last_processed) => {
                    info!(last_processed, "resuming from persisted cursor");
                    last_processed + 1
                }
                None => self.config.start_block,
            },
        };

        while cursor <= head {
            let to = (cursor + self.config.batch).min(head);

            let resolvers: Vec<Address> = self
                .lists
                .addresses(RESOLVERS_SET)
                .await?
                .into_iter()
                .map(Address)
                .collect();
            let outcome = self.chain.scan_range(cursor, to, &resolvers).await?;

            for new_name in &outcome.new_names {
                debug!(name = %new_name.name, resolver = %new_name.resolver, height = new_name.at_height, "registered name discovered");
                self.lists
                    .add(DOMAINS_SET, &ListValue::Str(new_name.name.clone()))
                    .await?;
                self.lists
                    .add(RESOLVERS_SET, &ListValue::Address(new_name.resolver.0))
                    .await?;
            }

            // node-hash to name mapping over everything known so far,
            // including names first seen in this chunk
            let nodes: HashMap<_, _> = self
                .lists
                .strings(DOMAINS_SET)
                .await?
                .into_iter()
                .map(|name| (namehash(&name), name))
                .collect();

            for update in &outcome.content_updates {
                let Some(name) = nodes.get(&update.node) else {
                    debug!(node = %update.node, "contenthash update for an unknown name");
                    continue;
                };
                let entry = format!("{}-{}", update.at_height, update.cid);
                self.lists
                    .add(&contenthash_set(name), &ListValue::Str(entry))
                    .await?;
            }

            cursor = to + 1;
            self.cursor = Some(cursor);
            if self.stopping() {
                return Ok(());
            }
        }
        self.cursor.get_or_insert(cursor);
        Ok(())
    }

    /// Stage (b): finalize the newest version of every active name
    async fn sync(&self) -> Result<()> {
        self.audit_finalized().await?;
        for name in self.active_names().await? {
            let Some((height, cid)) = self.newest_version(&name).await? else {
                continue;
            };
            if !self.finals.is_finalized(&name, height, &cid).await? {
                self.finalize_page(cid, &name, height).await?;
            }
        }
        Ok(())
    }

    /// Stage (c): nuke every finalized name the policy now excludes
    async fn nuke_blocked(&self) -> Result<()> {
        let allow = self.lists.strings(ALLOW_SET).await?;
        let block = self.lists.strings(BLOCK_SET).await?;
        for name in self.finals.list_names().await? {
            let excluded = if allow.is_empty() {
                block.contains(&name)
            } else {
                !allow.contains(&name)
            };
            if excluded {
                self.nuke_page(&name).await?;
            }
        }
        Ok(())
    }

    /// Stage (d): remove staged pins older than the configured age
    async fn prune_staged(&self) -> Result<()> {
        let now = Utc::now().timestamp().max(0) as u64;
        let max_age = self.config.max_staged_age.as_secs();
        for pin in self.store.pin_list(labels::STAGED_PREFIX).await? {
            let Some((name, staged_at)) = labels::parse_staged(&pin.label) else {
                warn!(label = %pin.label, "unparseable staged label");
                continue;
            };
            if now.saturating_sub(staged_at) > max_age {
                info!(name, staged_at, "pruning orphaned staged upload");
                self.store.pin_remove(&pin.cid, &pin.label).await?;
            }
        }
        Ok(())
    }

    /// Verify every finalization map entry is backed by a final pin with the
    /// matching CID. Disagreements are logged loudly and returned as
    /// `(name, height)` pairs; processing continues with the map as truth.
    pub async fn audit_finalized(&self) -> Result<Vec<(String, u64)>> {
        let mut violations = Vec::new();
        for (name, entries) in self.finals.load().await? {
            for entry in &entries {
                let label = labels::finalized(&name, entry.height);
                let backed = self
                    .store
                    .pin_list(&label)
                    .await?
                    .iter()
                    .any(|p| p.label == label && p.cid == entry.cid);
                if !backed {
                    error!(
                        name = %name,
                        height = entry.height,
                        cid = %entry.cid,
                        "finalization map entry without a matching final pin; continuing with the map as truth"
                    );
                    violations.push((name.clone(), entry.height));
                }
            }
        }
        Ok(violations)
    }

    /// Promote a version to finalized: durability pin first, then the map,
    /// then staged cleanup. Safe to retry at any step.
    #[instrument(skip(self, cid), fields(cid = %cid))]
    pub async fn finalize_page(&self, cid: Cid, name: &str, height: u64) -> Result<()> {
        let label = labels::finalized(name, height);

        for existing in self.store.pin_list(&label).await? {
            if existing.label == label && existing.cid != cid {
                error!(
                    label = %label,
                    pinned = %existing.cid,
                    expected = %cid,
                    "final pin disagrees with the finalization map; continuing with the map as truth"
                );
            }
        }

        self.store.pin_add(&cid, &label, true).await?;
        self.finals.push(name, height, cid).await?;

        // all staged uploads of this name are superseded, whatever their CID
        for staged in self.store.pin_list(&labels::staged_prefix(name)).await? {
            self.store.pin_remove(&staged.cid, &staged.label).await?;
        }
        info!(name, height, "finalized");
        Ok(())
    }

    /// Remove all finalized state of `name` and every block only it used.
    /// Blocks shared with another name's version or a staged upload survive.
    #[instrument(skip(self))]
    pub async fn nuke_page(&self, name: &str) -> Result<()> {
        let pins = self.store.pin_list(&labels::finalized_prefix(name)).await?;
        let roots: HashSet<Cid> = pins.iter().map(|p| p.cid).collect();

        let mut descendants = HashSet::new();
        for root in &roots {
            descendants.extend(self.store.enumerate_descendants(root).await?);
        }

        for pin in &pins {
            self.store.pin_remove(&pin.cid, &pin.label).await?;
        }

        // keep-set: anything still referenced by any pin, under any label
        let mut keep = HashSet::new();
        for cid in &descendants {
            if !self.store.pins_by_cid(cid).await?.is_empty() {
                keep.insert(*cid);
            }
        }

        for cid in descendants.difference(&keep) {
            if let Err(e) = self.store.remove_block(cid).await {
                debug!(cid = %cid, error = %e, "block already gone during nuke");
            }
        }

        self.finals.remove(name).await?;
        info!(name, removed = descendants.len() - keep.len(), "nuked");
        Ok(())
    }

    /// Active names under current policy: a non-empty allow set replaces
    /// `domains` entirely, otherwise `domains` minus the block set
    async fn active_names(&self) -> Result<Vec<String>> {
        let allow = self.lists.strings(ALLOW_SET).await?;
        if !allow.is_empty() {
            return Ok(allow);
        }
        let block = self.lists.strings(BLOCK_SET).await?;
        Ok(self
            .lists
            .strings(DOMAINS_SET)
            .await?
            .into_iter()
            .filter(|name| !block.contains(name))
            .collect())
    }

    /// Highest entry of `contenthash_<name>`. Heights are decimal strings of
    /// varying width: both sides are parsed as integers before comparison,
    /// never compared lexicographically. Ties go to the last written entry.
    async fn newest_version(&self, name: &str) -> Result<Option<(u64, Cid)>> {
        let mut newest: Option<(u64, Cid)> = None;
        for entry in self.lists.strings(&contenthash_set(name)).await? {
            let Some((height_str, cid_str)) = entry.split_once('-') else {
                warn!(name, entry = %entry, "contenthash entry without a dash separator");
                continue;
            };
            let Ok(height) = height_str.parse::<u64>() else {
                warn!(name, entry = %entry, "contenthash entry with a non-numeric height");
                continue;
            };
            let cid = match parse_cid(cid_str) {
                Ok(cid) => cid,
                Err(e) => {
                    warn!(name, entry = %entry, error = %e, "contenthash entry with a bad CID");
                    continue;
                }
            };
            if newest.map_or(true, |(h, _)| height >= h) {
                newest = Some((height, cid));
            }
        }
        Ok(newest)
    }

    async fn load_cursor(&self) -> Result<Option<u64>> {
        let mut last = None;
        for pin in self.store.pin_list(labels::LATEST_BLOCK_LABEL).await? {
            if pin.label != labels::LATEST_BLOCK_LABEL {
                continue;
            }
            let Some(payload) = identity_payload(&pin.cid) else {
                warn!(cid = %pin.cid, "cursor pin is not an identity CID");
                continue;
            };
            let Some((height, _)) = u64::decode_var(&payload) else {
                warn!(cid = %pin.cid, "cursor pin does not decode as a varint");
                continue;
            };
            // tolerate a replacement window: the newest cursor wins
            last = Some(last.map_or(height, |l: u64| l.max(height)));
        }
        Ok(last)
    }

    async fn persist_cursor(&self, last_processed: u64) -> Result<()> {
        let cid = identity_cid(&last_processed.encode_var_vec())?;
        self.store
            .pin_add(&cid, labels::LATEST_BLOCK_LABEL, false)
            .await?;
        for pin in self.store.pin_list(labels::LATEST_BLOCK_LABEL).await? {
            if pin.label == labels::LATEST_BLOCK_LABEL && pin.cid != cid {
                self.store.pin_remove(&pin.cid, &pin.label).await?;
            }
        }
        Ok(())
    }

    fn stopping(&self) -> bool {
        self.stop.as_ref().is_some_and(|stop| *stop.borrow())
    }
}
