use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{ABCodec, ArrayRepr};
use crate::data_type::ReflectedType;
use crate::error::{ArrayError, MalformedError};
use crate::{to_usize, ArcArrayD};

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Big,
    Little,
}

#[cfg(target_endian = "big")]
pub const NATIVE_ENDIAN: Endian = Endian::Big;
#[cfg(target_endian = "little")]
pub const NATIVE_ENDIAN: Endian = Endian::Little;

/// The format's standard byte order for multi-byte elements.
pub const ZARR_ENDIAN: Endian = Endian::Little;

impl Default for Endian {
    fn default() -> Self {
        ZARR_ENDIAN
    }
}

/// Fixed-width element serialization with a configured byte order.
///
/// Single-byte data types may omit the byte order.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BytesCodec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endian: Option<Endian>,
}

impl Default for BytesCodec {
    fn default() -> Self {
        Self {
            endian: Some(ZARR_ENDIAN),
        }
    }
}

impl BytesCodec {
    pub fn new(endian: Option<Endian>) -> Self {
        Self { endian }
    }

    pub fn new_big() -> Self {
        Self::new(Some(Endian::Big))
    }

    pub fn new_little() -> Self {
        Self::new(Some(Endian::Little))
    }

    pub fn new_native() -> Self {
        Self::new(Some(NATIVE_ENDIAN))
    }

    pub fn endian(&self) -> Option<Endian> {
        self.endian
    }
}

impl ABCodec for BytesCodec {
    fn encode<T: ReflectedType>(
        &self,
        decoded: ArcArrayD<T>,
        _repr: &ArrayRepr<T>,
    ) -> Result<Bytes, ArrayError> {
        let endian = T::ZARR_TYPE.valid_endian(self.endian)?;
        let mut buf = Vec::default();
        T::write_array_to(&decoded, &mut buf, endian);
        Ok(buf.into())
    }

    fn decode<T: ReflectedType>(
        &self,
        encoded: &[u8],
        repr: &ArrayRepr<T>,
    ) -> Result<ArcArrayD<T>, ArrayError> {
        let endian = T::ZARR_TYPE.valid_endian(self.endian)?;
        if encoded.len() != repr.nbytes() {
            return Err(MalformedError::ChunkLength {
                expected: repr.nbytes(),
                actual: encoded.len(),
            }
            .into());
        }
        Ok(T::read_array_from(
            encoded,
            endian,
            to_usize(&repr.shape).as_slice(),
        ))
    }
}
