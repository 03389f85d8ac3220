//! On-disk layout of slot records.
//!
//! Keys are `[namespace:1][slot:8 big-endian]` so lexicographic order matches
//! numeric slot order. Values are
//! `[version-or-sentinel:8 big-endian][root:32, only for blocks][lz4 payload]`,
//! where the lz4 payload carries its uncompressed length as a 4-byte
//! little-endian prefix.

use super::error::StorageError;
use super::record::{BlockRoot, BlockVersion, SlotRecord, StoredBlock};

/// Reserved for store-level metadata. Nothing is written under it yet.
pub const NAMESPACE_META: u8 = 0;
pub const NAMESPACE_SLOT: u8 = 1;

pub const SLOT_KEY_LEN: usize = 9;
const VERSION_LEN: usize = 8;
const SIZE_PREFIX_LEN: usize = 4;

/// Version word written for slots upstream confirmed as empty.
pub const EMPTY_SENTINEL: u64 = i64::MAX as u64;

/// Largest block payload the store accepts. Writes above it are rejected and larger
/// size prefixes on read are treated as corruption instead of being allocated.
pub const MAX_BLOCK_BYTES: usize = 64 * 1024 * 1024;

pub fn slot_key(slot: u64) -> [u8; SLOT_KEY_LEN] {
    let mut key = [0u8; SLOT_KEY_LEN];
    key[0] = NAMESPACE_SLOT;
    key[1..].copy_from_slice(&slot.to_be_bytes());
    key
}

/// Returns the slot encoded in `key`, or `None` when the key lives outside the
/// slot namespace.
pub fn decode_slot_key(key: &[u8]) -> Option<u64> {
    if key.len() != SLOT_KEY_LEN || key[0] != NAMESPACE_SLOT {
        return None;
    }
    let mut slot = [0u8; 8];
    slot.copy_from_slice(&key[1..]);
    Some(u64::from_be_bytes(slot))
}

fn version_word(version: BlockVersion) -> u64 {
    match version {
        BlockVersion::Phase0 => 0,
        BlockVersion::Altair => 1,
        BlockVersion::Bellatrix => 2,
    }
}

/// Decoded version word of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionTag {
    Empty,
    Block(BlockVersion),
}

/// Fails for payloads above [`MAX_BLOCK_BYTES`], which would never decode again.
pub fn encode_record(slot: u64, record: &SlotRecord) -> Result<Vec<u8>, StorageError> {
    match record {
        SlotRecord::Empty => Ok(EMPTY_SENTINEL.to_be_bytes().to_vec()),
        SlotRecord::Block(block) => {
            if block.ssz.len() > MAX_BLOCK_BYTES {
                return Err(StorageError::TooLarge {
                    slot,
                    size: block.ssz.len(),
                    limit: MAX_BLOCK_BYTES,
                });
            }
            let compressed = lz4_flex::compress_prepend_size(&block.ssz);
            let mut value = Vec::with_capacity(VERSION_LEN + BlockRoot::LEN + compressed.len());
            value.extend_from_slice(&version_word(block.version).to_be_bytes());
            value.extend_from_slice(block.root.as_bytes());
            value.extend_from_slice(&compressed);
            Ok(value)
        }
    }
}

/// Reads only the leading version word, leaving root and payload untouched.
pub fn decode_version(slot: u64, value: &[u8]) -> Result<VersionTag, StorageError> {
    let Some(word) = value.get(..VERSION_LEN) else {
        return Err(StorageError::corrupt(
            slot,
            format!("value has {} bytes, shorter than the version word", value.len()),
        ));
    };
    let mut buf = [0u8; VERSION_LEN];
    buf.copy_from_slice(word);
    match u64::from_be_bytes(buf) {
        EMPTY_SENTINEL => Ok(VersionTag::Empty),
        0 => Ok(VersionTag::Block(BlockVersion::Phase0)),
        1 => Ok(VersionTag::Block(BlockVersion::Altair)),
        2 => Ok(VersionTag::Block(BlockVersion::Bellatrix)),
        other => Err(StorageError::corrupt(slot, format!("unknown version word {other}"))),
    }
}

pub fn decode_record(slot: u64, value: &[u8]) -> Result<SlotRecord, StorageError> {
    let version = match decode_version(slot, value)? {
        // Trailing bytes after the sentinel are ignored; older writers padded a zero root.
        VersionTag::Empty => return Ok(SlotRecord::Empty),
        VersionTag::Block(version) => version,
    };

    let rest = &value[VERSION_LEN..];
    if rest.len() < BlockRoot::LEN + SIZE_PREFIX_LEN {
        return Err(StorageError::corrupt(
            slot,
            format!("block value truncated to {} bytes", value.len()),
        ));
    }
    let mut root = [0u8; BlockRoot::LEN];
    root.copy_from_slice(&rest[..BlockRoot::LEN]);

    let ssz = decompress_payload(slot, &rest[BlockRoot::LEN..])?;
    Ok(SlotRecord::Block(StoredBlock {
        version,
        root: BlockRoot(root),
        ssz,
    }))
}

fn decompress_payload(slot: u64, payload: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut prefix = [0u8; SIZE_PREFIX_LEN];
    prefix.copy_from_slice(&payload[..SIZE_PREFIX_LEN]);
    let size = u32::from_le_bytes(prefix) as usize;
    if size > MAX_BLOCK_BYTES {
        return Err(StorageError::corrupt(
            slot,
            format!("payload claims {size} uncompressed bytes"),
        ));
    }

    let ssz = lz4_flex::decompress(&payload[SIZE_PREFIX_LEN..], size)
        .map_err(|source| StorageError::Decompress { slot, source })?;
    if ssz.len() != size {
        return Err(StorageError::corrupt(
            slot,
            format!("payload decompressed to {} bytes, expected {size}", ssz.len()),
        ));
    }
    Ok(ssz)
}
