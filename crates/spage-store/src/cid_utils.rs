//! CID construction helpers
//!
//! Two kinds of CID appear in the dservice: ordinary hash-derived CIDs naming
//! blocks, and identity CIDs whose digest *is* the payload. Identity CIDs back
//! the pin-label database - a pinned value is recovered straight from the pin's
//! CID without touching any block. Identity payloads (height-CID composites)
//! routinely exceed the 64-byte digest capacity of the stock `cid::Cid` alias,
//! so the crate works with a wider buffer throughout.

use multihash_codetable::{Code, MultihashDigest};

use crate::error::{Result, StoreError};

/// Maximum digest size carried by a [`Cid`] in this crate.
pub const DIGEST_CAPACITY: usize = 128;

/// CID type used across the dservice.
pub type Cid = cid::CidGeneric<DIGEST_CAPACITY>;

/// Multihash type matching [`Cid`].
pub type Multihash = multihash::Multihash<DIGEST_CAPACITY>;

/// Multicodec code of the identity multihash
pub const IDENTITY_CODE: u64 = 0x00;

/// Supported IPLD codecs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CidCodec {
    /// Raw binary data (0x55)
    Raw,
    /// DAG-CBOR (0x71)
    DagCbor,
    /// DAG-PB/Protobuf (0x70)
    DagPb,
}

impl CidCodec {
    /// Get the multicodec code
    pub fn code(&self) -> u64 {
        match self {
            CidCodec::Raw => 0x55,
            CidCodec::DagCbor => 0x71,
            CidCodec::DagPb => 0x70,
        }
    }

    /// Parse from multicodec code
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x55 => Some(CidCodec::Raw),
            0x71 => Some(CidCodec::DagCbor),
            0x70 => Some(CidCodec::DagPb),
            _ => None,
        }
    }

    /// Kubo name of the codec
    pub fn name(&self) -> &'static str {
        match self {
            CidCodec::Raw => "raw",
            CidCodec::DagCbor => "dag-cbor",
            CidCodec::DagPb => "dag-pb",
        }
    }
}

/// Create a hash-derived CID (v1, SHA2-256) for `data`
pub fn hash_cid(data: &[u8], codec: CidCodec) -> Cid {
    let digest = Code::Sha2_256.digest(data);
    let multihash = Multihash::wrap(digest.code(), digest.digest())
        .expect("sha2-256 digest fits the multihash buffer");
    Cid::new_v1(codec.code(), multihash)
}

/// Create an identity CID carrying `payload` as its own digest
pub fn identity_cid(payload: &[u8]) -> Result<Cid> {
    let multihash = Multihash::wrap(IDENTITY_CODE, payload).map_err(|_| {
        StoreError::InvalidCid(format!(
            "identity payload of {} bytes exceeds the {DIGEST_CAPACITY}-byte digest capacity",
            payload.len()
        ))
    })?;
    Ok(Cid::new_v1(CidCodec::Raw.code(), multihash))
}

/// Recover the payload of an identity CID, or `None` for hash-derived CIDs
pub fn identity_payload(cid: &Cid) -> Option<Vec<u8>> {
    let hash = cid.hash();
    (hash.code() == IDENTITY_CODE).then(|| hash.digest().to_vec())
}

/// Parse a CID from its string form
pub fn parse_cid(s: &str) -> Result<Cid> {
    Cid::try_from(s).map_err(|e| StoreError::InvalidCid(e.to_string()))
}
