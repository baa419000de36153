use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ArrayError;
use crate::MaybeNdim;

pub mod crc32c_codec;
#[cfg(feature = "gzip")]
pub mod gzip_codec;

/// Codec between two byte representations.
pub trait BBCodec {
    fn encode(&self, decoded: &[u8]) -> Result<Bytes, ArrayError>;

    fn decode(&self, encoded: &[u8]) -> Result<Bytes, ArrayError>;
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "lowercase", tag = "name", content = "configuration")]
pub enum BBCodecType {
    Crc32c(crc32c_codec::Crc32cCodec),
    #[cfg(feature = "gzip")]
    Gzip(gzip_codec::GzipCodec),
}

impl BBCodec for BBCodecType {
    fn encode(&self, decoded: &[u8]) -> Result<Bytes, ArrayError> {
        match self {
            Self::Crc32c(c) => c.encode(decoded),
            #[cfg(feature = "gzip")]
            Self::Gzip(c) => c.encode(decoded),
        }
    }

    fn decode(&self, encoded: &[u8]) -> Result<Bytes, ArrayError> {
        match self {
            Self::Crc32c(c) => c.decode(encoded),
            #[cfg(feature = "gzip")]
            Self::Gzip(c) => c.decode(encoded),
        }
    }
}

impl MaybeNdim for BBCodecType {
    fn maybe_ndim(&self) -> Option<usize> {
        None
    }
}

crate::variant_from_data!(BBCodecType, Crc32c, crc32c_codec::Crc32cCodec);

#[cfg(feature = "gzip")]
crate::variant_from_data!(BBCodecType, Gzip, gzip_codec::GzipCodec);
