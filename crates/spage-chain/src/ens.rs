//! ENS primitives: namehash, DNS-wire name encoding, contenthash decoding,
//! and the thin slice of ABI codec the watcher's calls need

use keccak_hash::{keccak, H256};
use once_cell::sync::Lazy;
use spage_store::Cid;

use crate::error::{ChainError, Result};

/// Topic 0 of `Transfer(address,address,uint256)`
pub static TRANSFER_TOPIC: Lazy<H256> =
    Lazy::new(|| keccak(b"Transfer(address,address,uint256)"));

/// Topic 0 of `ContenthashChanged(bytes32,bytes)`
pub static CONTENTHASH_CHANGED_TOPIC: Lazy<H256> =
    Lazy::new(|| keccak(b"ContenthashChanged(bytes32,bytes)"));

/// Multicodec prefix identifying an inter-planetary contenthash
const CONTENTHASH_PREFIX: [u8; 2] = [0xE3, 0x01];

/// Deterministic 32-byte hash of a hierarchical name (EIP-137)
pub fn namehash(name: &str) -> H256 {
    let mut node = H256::zero();
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = keccak(label.as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_bytes());
        buf[32..].copy_from_slice(label_hash.as_bytes());
        node = keccak(buf);
    }
    node
}

/// DNS wire encoding of a name, as `findResolver(bytes)` expects it
pub fn dns_encode(name: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(name.len() + 2);
    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(ChainError::Decode(format!("invalid label in {name}")));
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    Ok(out)
}

/// First four bytes of the keccak of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak(signature.as_bytes());
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&hash.as_bytes()[..4]);
    sel
}

/// Encode a call taking a single `bytes32` argument
pub fn encode_bytes32_call(sel: [u8; 4], word: &H256) -> Vec<u8> {
    let mut data = sel.to_vec();
    data.extend_from_slice(word.as_bytes());
    data
}

/// Encode a call taking a single dynamic `bytes` argument
pub fn encode_bytes_call(sel: [u8; 4], bytes: &[u8]) -> Vec<u8> {
    let mut data = sel.to_vec();
    data.extend_from_slice(&abi_word(32));
    data.extend_from_slice(&abi_word(bytes.len() as u64));
    data.extend_from_slice(bytes);
    let padding = (32 - bytes.len() % 32) % 32;
    data.extend_from_slice(&vec![0u8; padding]);
    data
}

/// Decode an `address` from the first return word
pub fn decode_address_word(ret: &[u8]) -> Result<[u8; 20]> {
    if ret.len() < 32 {
        return Err(ChainError::Decode("return data shorter than one word".to_string()));
    }
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&ret[12..32]);
    Ok(addr)
}

/// Decode a single dynamic `bytes` return value
pub fn decode_bytes(ret: &[u8]) -> Result<Vec<u8>> {
    if ret.len() < 64 {
        return Err(ChainError::Decode("return data shorter than bytes head".to_string()));
    }
    let offset = abi_u64(&ret[..32])? as usize;
    if ret.len() < offset + 32 {
        return Err(ChainError::Decode("bytes offset out of range".to_string()));
    }
    let len = abi_u64(&ret[offset..offset + 32])? as usize;
    let start = offset + 32;
    if ret.len() < start + len {
        return Err(ChainError::Decode("bytes length out of range".to_string()));
    }
    Ok(ret[start..start + len].to_vec())
}

/// Decode a single dynamic `string` return value
pub fn decode_string(ret: &[u8]) -> Result<String> {
    let bytes = decode_bytes(ret)?;
    String::from_utf8(bytes).map_err(|e| ChainError::Decode(e.to_string()))
}

/// Decode an encoded contenthash into a CID
///
/// Only the inter-planetary codec prefix `0xE3 0x01` is accepted; the
/// remaining bytes are the binary CID. Everything else is a decode failure
/// the caller skips with a warning.
pub fn contenthash_to_cid(bytes: &[u8]) -> Result<Cid> {
    if bytes.len() < 2 || bytes[..2] != CONTENTHASH_PREFIX {
        return Err(ChainError::Decode(format!(
            "contenthash prefix 0x{} is not inter-planetary",
            hex::encode(bytes.iter().take(2).copied().collect::<Vec<_>>())
        )));
    }
    Cid::read_bytes(&bytes[2..]).map_err(|e| ChainError::Decode(e.to_string()))
}

/// Encode a CID as a contenthash byte string (the inverse of
/// [`contenthash_to_cid`], used by tests and tooling)
pub fn cid_to_contenthash(cid: &Cid) -> Vec<u8> {
    let mut out = CONTENTHASH_PREFIX.to_vec();
    out.extend_from_slice(&cid.to_bytes());
    out
}

fn abi_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn abi_u64(word: &[u8]) -> Result<u64> {
    if word.len() != 32 || word[..24].iter().any(|b| *b != 0) {
        return Err(ChainError::Decode("word does not fit u64".to_string()));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(raw))
}
