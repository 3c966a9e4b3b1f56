//! Typed operator and indexer sets stored as identity-CID pins
//!
//! Every element of a set is one pin: the label is `spg_list_<set>` and the
//! CID is the identity hash of the element's binary form, so the value is
//! recovered straight from the pin without reading any block. Adding an
//! element twice produces the identical CID and is therefore a no-op.

use std::sync::Arc;

use integer_encoding::VarInt;
use tracing::warn;

use spage_store::{identity_cid, identity_payload, labels, PageStore};

use crate::error::Result;

/// Operator-visible allow set; when non-empty it replaces `domains` entirely
pub const ALLOW_SET: &str = "allow";

/// Operator-visible block set
pub const BLOCK_SET: &str = "block";

/// Every name discovered from registry mints
pub const DOMAINS_SET: &str = "domains";

/// Every resolver address ever seen.
///
/// A resolver is recorded once, when its name is registered; later resolver
/// changes on the registry are not observed (see the watcher docs).
pub const RESOLVERS_SET: &str = "resolvers";

/// Name of the per-name contenthash history set
pub fn contenthash_set(name: &str) -> String {
    format!("contenthash_{name}")
}

/// A typed set element
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListValue {
    /// UTF-8 string
    Str(String),
    /// 20-byte chain address
    Address([u8; 20]),
    /// Unsigned number, varint-encoded
    Number(u64),
}

impl ListValue {
    /// Binary form fed to the identity hash
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ListValue::Str(s) => s.as_bytes().to_vec(),
            ListValue::Address(a) => a.to_vec(),
            ListValue::Number(n) => n.encode_var_vec(),
        }
    }
}

/// Expected type when reading a set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListKind {
    Str,
    Address,
    Number,
}

impl ListKind {
    /// Decode an element's binary form, or `None` if it does not fit the type
    pub fn decode(&self, bytes: &[u8]) -> Option<ListValue> {
        match self {
            ListKind::Str => String::from_utf8(bytes.to_vec()).ok().map(ListValue::Str),
            ListKind::Address => {
                let raw: [u8; 20] = bytes.try_into().ok()?;
                Some(ListValue::Address(raw))
            }
            ListKind::Number => {
                let (value, read) = u64::decode_var(bytes)?;
                (read == bytes.len()).then_some(ListValue::Number(value))
            }
        }
    }
}

/// Registry of typed sets over the pin namespace
pub struct ListRegistry<S> {
    store: Arc<S>,
}

impl<S> Clone for ListRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: PageStore> ListRegistry<S> {
    /// Create a registry over a store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// All elements of `set`, in insertion order
    pub async fn get(&self, set: &str, kind: ListKind) -> Result<Vec<ListValue>> {
        let label = labels::list(set);
        let mut values = Vec::new();
        for pin in self.store.pin_list(&label).await? {
            // prefix listing may catch longer set names; match exactly
            if pin.label != label {
                continue;
            }
            let Some(payload) = identity_payload(&pin.cid) else {
                warn!(set, cid = %pin.cid, "set element pin is not an identity CID");
                continue;
            };
            match kind.decode(&payload) {
                Some(value) => values.push(value),
                None => warn!(set, cid = %pin.cid, "set element does not decode as {kind:?}"),
            }
        }
        Ok(values)
    }

    /// Add `value` to `set`; adding an existing element is a no-op
    pub async fn add(&self, set: &str, value: &ListValue) -> Result<()> {
        let cid = identity_cid(&value.to_bytes())?;
        self.store.pin_add(&cid, &labels::list(set), false).await?;
        Ok(())
    }

    /// Remove `value` from `set`; removing a missing element is a no-op
    pub async fn remove(&self, set: &str, value: &ListValue) -> Result<()> {
        let cid = identity_cid(&value.to_bytes())?;
        self.store.pin_remove(&cid, &labels::list(set)).await?;
        Ok(())
    }

    /// Whether `set` contains `value`
    pub async fn contains(&self, set: &str, value: &ListValue) -> Result<bool> {
        let cid = identity_cid(&value.to_bytes())?;
        let label = labels::list(set);
        Ok(self
            .store
            .pin_list(&label)
            .await?
            .iter()
            .any(|p| p.label == label && p.cid == cid))
    }

    /// Drop every element of `set`
    pub async fn clear(&self, set: &str) -> Result<()> {
        let label = labels::list(set);
        for pin in self.store.pin_list(&label).await? {
            if pin.label == label {
                self.store.pin_remove(&pin.cid, &pin.label).await?;
            }
        }
        Ok(())
    }

    /// Convenience: the string elements of `set`
    pub async fn strings(&self, set: &str) -> Result<Vec<String>> {
        Ok(self
            .get(set, ListKind::Str)
            .await?
            .into_iter()
            .filter_map(|v| match v {
                ListValue::Str(s) => Some(s),
                _ => None,
            })
            .collect())
    }

    /// Convenience: the address elements of `set`
    pub async fn addresses(&self, set: &str) -> Result<Vec<[u8; 20]>> {
        Ok(self
            .get(set, ListKind::Address)
            .await?
            .into_iter()
            .filter_map(|v| match v {
                ListValue::Address(a) => Some(a),
                _ => None,
            })
            .collect())
    }
}
