//! CAR (content-addressed archive) v1 codec
//!
//! A CAR file is a dag-cbor header `{roots, version}` followed by
//! varint-length-delimited sections of `cid ++ block bytes`. The dservice
//! only ever handles archives that fit in memory (uploads are byte-capped,
//! served archives are reduced), so the codec is synchronous over buffers.

use std::io::{Cursor, Read, Write};

use bytes::Bytes;
use integer_encoding::{VarIntReader, VarIntWriter};
use serde::{Deserialize, Serialize};

use crate::cid_utils::Cid;
use crate::error::{Result, StoreError};

/// Upper bound on a single length-delimited section. Anything larger than
/// this in an uploaded archive is garbage or abuse.
const MAX_SECTION_BYTES: u64 = 8 * 1024 * 1024;

/// CAR file header
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CarHeader {
    pub roots: Vec<Cid>,
    pub version: u64,
}

/// Decode a CAR buffer into its roots and blocks, preserving block order
pub fn decode(bytes: &[u8]) -> Result<(Vec<Cid>, Vec<(Cid, Vec<u8>)>)> {
    let mut cursor = Cursor::new(bytes);

    let header_bytes = ld_read(&mut cursor)?
        .ok_or_else(|| StoreError::InvalidArchive("missing header".to_string()))?;
    let header: CarHeader = serde_ipld_dagcbor::from_slice(&header_bytes)
        .map_err(|e| StoreError::InvalidArchive(format!("bad header: {e}")))?;
    if header.version != 1 {
        return Err(StoreError::InvalidArchive(format!(
            "unsupported CAR version {}",
            header.version
        )));
    }
    if header.roots.is_empty() {
        return Err(StoreError::InvalidArchive("no roots".to_string()));
    }

    let mut blocks = Vec::new();
    while let Some(section) = ld_read(&mut cursor)? {
        let mut section_cursor = Cursor::new(section.as_slice());
        let cid = Cid::read_bytes(&mut section_cursor)
            .map_err(|e| StoreError::InvalidArchive(format!("bad section CID: {e}")))?;
        let data = section[section_cursor.position() as usize..].to_vec();
        blocks.push((cid, data));
    }

    Ok((header.roots, blocks))
}

/// Encode roots and blocks into a CAR buffer
pub fn encode<I>(roots: Vec<Cid>, blocks: I) -> Result<Bytes>
where
    I: IntoIterator<Item = (Cid, Vec<u8>)>,
{
    let header = CarHeader { roots, version: 1 };
    let header_bytes = serde_ipld_dagcbor::to_vec(&header)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    let mut out = Vec::new();
    ld_write(&mut out, &header_bytes)?;
    for (cid, data) in blocks {
        let mut section = cid.to_bytes();
        section.extend_from_slice(&data);
        ld_write(&mut out, &section)?;
    }
    Ok(Bytes::from(out))
}

fn ld_read<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let len: u64 = match reader.read_varint() {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(StoreError::InvalidArchive(e.to_string())),
    };
    if len > MAX_SECTION_BYTES {
        return Err(StoreError::InvalidArchive(format!(
            "section of {len} bytes exceeds the {MAX_SECTION_BYTES}-byte limit"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .map_err(|e| StoreError::InvalidArchive(e.to_string()))?;
    Ok(Some(buf))
}

fn ld_write<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer.write_varint(bytes.len() as u64)?;
    writer.write_all(bytes)?;
    Ok(())
}
