//! Upload intake: stage an archive for a name
//!
//! No ownership check happens here. The matching on-chain contenthash event
//! is the authorization; unmatched staged uploads age out via pruning.

use bytes::Bytes;
use chrono::Utc;
use tracing::info;

use spage_store::{labels, Cid, PageStore, StoreError};

use crate::error::{CoreError, Result};

/// Import `archive` and stage its root for `name`, returning the root CID
pub async fn write_archive<S: PageStore>(
    store: &S,
    name: &str,
    archive: Bytes,
    max_bytes: usize,
) -> Result<Cid> {
    if archive.len() > max_bytes {
        return Err(CoreError::UploadTooLarge {
            size: archive.len(),
            max: max_bytes,
        });
    }

    let root = store.import_archive(archive).await.map_err(|e| match e {
        StoreError::InvalidArchive(msg) => CoreError::InvalidArchive(msg),
        other => CoreError::Store(other),
    })?;

    let staged_at = Utc::now().timestamp().max(0) as u64;
    store
        .pin_add(&root, &labels::staged(name, staged_at), true)
        .await?;

    info!(name, root = %root, "archive staged");
    Ok(root)
}
