use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error as AnyError};

/// Consensus fork a stored block was produced under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockVersion {
    Phase0,
    Altair,
    Bellatrix,
}

impl BlockVersion {
    pub const ALL: [BlockVersion; 3] = [
        BlockVersion::Phase0,
        BlockVersion::Altair,
        BlockVersion::Bellatrix,
    ];

    /// Lower-case fork name as used by the beacon API `Eth-Consensus-Version` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockVersion::Phase0 => "phase0",
            BlockVersion::Altair => "altair",
            BlockVersion::Bellatrix => "bellatrix",
        }
    }
}

impl fmt::Display for BlockVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockVersion {
    type Err = AnyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "phase0" => Ok(BlockVersion::Phase0),
            "altair" => Ok(BlockVersion::Altair),
            "bellatrix" => Ok(BlockVersion::Bellatrix),
            other => Err(anyhow!("unsupported consensus version {other:?}")),
        }
    }
}

/// 32-byte beacon block root.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockRoot(pub [u8; 32]);

impl BlockRoot {
    pub const LEN: usize = 32;

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(value: &str) -> anyhow::Result<Self> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|err| anyhow!("invalid block root hex: {err}"))?;
        let root: [u8; 32] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| anyhow!("block root must be 32 bytes, got {}", bytes.len()))?;
        Ok(Self(root))
    }
}

impl fmt::Debug for BlockRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockRoot({})", self.to_hex())
    }
}

/// A fetched signed block kept as opaque SSZ bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub version: BlockVersion,
    pub root: BlockRoot,
    pub ssz: Vec<u8>,
}

impl StoredBlock {
    pub fn new(version: BlockVersion, root: BlockRoot, ssz: impl Into<Vec<u8>>) -> Self {
        Self {
            version,
            root,
            ssz: ssz.into(),
        }
    }
}

/// Resolved state of a processed slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotRecord {
    /// Upstream confirmed that no block was produced for the slot.
    Empty,
    Block(StoredBlock),
}

impl SlotRecord {
    pub fn from_block(block: Option<StoredBlock>) -> Self {
        match block {
            Some(block) => SlotRecord::Block(block),
            None => SlotRecord::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SlotRecord::Empty)
    }

    pub fn block(&self) -> Option<&StoredBlock> {
        match self {
            SlotRecord::Empty => None,
            SlotRecord::Block(block) => Some(block),
        }
    }

    pub fn into_block(self) -> Option<StoredBlock> {
        match self {
            SlotRecord::Empty => None,
            SlotRecord::Block(block) => Some(block),
        }
    }
}
