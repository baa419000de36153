use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::ArrayRepr;
use crate::data_type::ReflectedType;
use crate::error::ArrayError;
use crate::{ArcArrayD, MaybeNdim, Ndim};

pub mod bytes_codec;
pub mod sharding_indexed;

use bytes_codec::BytesCodec;
use sharding_indexed::ShardingIndexedCodec;

/// The pivot codec between the decoded-array and byte domains.
pub trait ABCodec {
    fn encode<T: ReflectedType>(
        &self,
        decoded: ArcArrayD<T>,
        repr: &ArrayRepr<T>,
    ) -> Result<Bytes, ArrayError>;

    fn decode<T: ReflectedType>(
        &self,
        encoded: &[u8],
        repr: &ArrayRepr<T>,
    ) -> Result<ArcArrayD<T>, ArrayError>;
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "snake_case", tag = "name", content = "configuration")]
pub enum ABCodecType {
    Bytes(BytesCodec),
    ShardingIndexed(ShardingIndexedCodec),
}

impl Default for ABCodecType {
    fn default() -> Self {
        Self::Bytes(BytesCodec::default())
    }
}

impl ABCodec for ABCodecType {
    fn encode<T: ReflectedType>(
        &self,
        decoded: ArcArrayD<T>,
        repr: &ArrayRepr<T>,
    ) -> Result<Bytes, ArrayError> {
        match self {
            Self::Bytes(c) => c.encode(decoded, repr),
            Self::ShardingIndexed(c) => c.encode(decoded, repr),
        }
    }

    fn decode<T: ReflectedType>(
        &self,
        encoded: &[u8],
        repr: &ArrayRepr<T>,
    ) -> Result<ArcArrayD<T>, ArrayError> {
        match self {
            Self::Bytes(c) => c.decode(encoded, repr),
            Self::ShardingIndexed(c) => c.decode(encoded, repr),
        }
    }
}

impl MaybeNdim for ABCodecType {
    fn maybe_ndim(&self) -> Option<usize> {
        match self {
            Self::Bytes(_) => None,
            Self::ShardingIndexed(c) => Some(c.ndim()),
        }
    }
}

crate::variant_from_data!(ABCodecType, Bytes, BytesCodec);
crate::variant_from_data!(ABCodecType, ShardingIndexed, ShardingIndexedCodec);
