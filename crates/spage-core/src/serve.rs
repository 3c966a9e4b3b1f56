//! Serving path: synthesize reduced archives for readers
//!
//! A page DAG can be multi-megabyte; rendering needs only the shell. The
//! reduced archive carries the root, the top-level index files, and every
//! non-underscore subdirectory in full. Underscore-prefixed directories hold
//! large asset bundles that readers fetch separately.

use std::collections::HashSet;

use bytes::Bytes;

use spage_store::{car, Cid, EntryKind, PageStore};

use crate::error::{CoreError, Result};
use crate::finalization::FinalizationStore;

/// Root-level files included in a reduced archive
const ROOT_FILES: [&str; 4] = [
    "index.html",
    "index.md",
    "_template.html",
    "manifest.webmanifest",
];

/// Build a reduced archive for the page rooted at `root`
pub async fn read_archive_lite<S: PageStore>(store: &S, root: &Cid) -> Result<Bytes> {
    let mut include = HashSet::from([*root]);

    for entry in store.list_children(root).await? {
        match entry.kind {
            EntryKind::Directory => {
                if !entry.name.starts_with('_') {
                    include.extend(store.enumerate_descendants(&entry.cid).await?);
                }
            }
            EntryKind::File => {
                if ROOT_FILES.contains(&entry.name.as_str()) {
                    include.insert(entry.cid);
                }
            }
        }
    }

    let mut blocks = Vec::with_capacity(include.len());
    for cid in include {
        let data = store.get_block(&cid).await?;
        blocks.push((cid, data.to_vec()));
    }
    Ok(car::encode(vec![*root], blocks)?)
}

/// Build an archive of the full finalization history of `name`: the roots
/// are the finalized CIDs in ascending height order, the blocks the union
/// of their DAGs
pub async fn read_history_archive<S: PageStore>(
    store: &S,
    finals: &FinalizationStore<S>,
    name: &str,
) -> Result<Bytes> {
    let entries = finals.entries_for(name).await?;
    if entries.is_empty() {
        return Err(CoreError::NotFound(format!(
            "no finalization history for {name}"
        )));
    }

    let roots: Vec<Cid> = entries.iter().map(|e| e.cid).collect();
    let mut include = HashSet::new();
    for root in &roots {
        include.extend(store.enumerate_descendants(root).await?);
    }

    let mut blocks = Vec::with_capacity(include.len());
    for cid in include {
        let data = store.get_block(&cid).await?;
        blocks.push((cid, data.to_vec()));
    }
    Ok(car::encode(roots, blocks)?)
}
