use thiserror::Error;

use crate::data_type::DataType;
use crate::GridCoord;

/// Top-level error for engine operations.
///
/// Store misses are not represented here: an absent chunk resolves to the
/// fill value, and absence is modelled as `Option` below this layer.
#[derive(Error, Debug)]
pub enum ArrayError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Malformed(#[from] MalformedError),
    #[error(transparent)]
    Pipeline(#[from] CodecChainError),
    #[error(transparent)]
    Argument(#[from] ArgumentError),
}

/// Stored bytes which cannot be interpreted under the declared metadata.
#[derive(Error, Debug)]
pub enum MalformedError {
    #[error("could not parse metadata document: {0}")]
    Metadata(String),
    #[error("chunk is {actual} bytes, expected {expected}")]
    ChunkLength { expected: usize, actual: usize },
    #[error("shard index is {actual} bytes, expected {expected}")]
    ShardIndexLength { expected: usize, actual: usize },
    #[error("shard index entry ({offset}, {nbytes}) is outside the object")]
    ShardIndexBounds { offset: u64, nbytes: u64 },
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("fill value {0} is not representable in data type {1}")]
    FillValue(serde_json::Value, DataType),
    #[error("could not decompress chunk: {0}")]
    Compression(String),
}

/// Illegal codec composition, caught at pipeline construction.
#[derive(Error, Debug)]
pub enum CodecChainError {
    #[error("more than one array->bytes codec found")]
    MultipleArrayToBytes,
    #[error("illegal codec order: {0} codec found after {1} codec")]
    IllegalOrder(&'static str, &'static str),
    #[error("sharding codec must be the only codec in its chain")]
    ShardingNotSole,
    #[error("endianness undefined for multi-byte data type {0}")]
    MissingEndian(DataType),
    #[error("shard shape {outer:?} is not a multiple of inner chunk shape {inner:?}")]
    UnalignedShardGrid { outer: GridCoord, inner: GridCoord },
}

/// Caller-supplied arguments which cannot be satisfied.
#[derive(Error, Debug)]
pub enum ArgumentError {
    #[error("rank mismatch: expected {expected}, got {actual}")]
    RankMismatch { expected: usize, actual: usize },
    #[error("selection {region} extends beyond array shape {shape:?}")]
    OutOfBounds { region: String, shape: GridCoord },
    #[error("value shape {actual:?} does not match selection shape {expected:?}")]
    ShapeMismatch {
        expected: GridCoord,
        actual: GridCoord,
    },
    #[error("type annotation {annotated} mismatches stored data type {stored}")]
    DataTypeMismatch { annotated: DataType, stored: DataType },
    #[error("shape may not contain zero-length dimensions")]
    ZeroDimension,
    #[error("value handle target cannot be persisted")]
    UnwritableHandle,
    #[error("in-memory array has no byte representation until a codec supplies one")]
    UntypedArrayBytes,
}

impl ArgumentError {
    pub(crate) fn check_rank(expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::RankMismatch { expected, actual })
        }
    }
}
