use bytes::Bytes;

use crate::codecs::ab::bytes_codec::{Endian, ZARR_ENDIAN};
use crate::codecs::ArrayRepr;
use crate::data_type::ReflectedType;
use crate::error::{ArgumentError, ArrayError, MalformedError};
use crate::store::{ByteRange, NodeKey, Store};
use crate::{to_usize, ArcArrayD};

/// A lazy reference to bytes-or-array-or-nothing: the uniform currency
/// between the array engine, the codec pipeline and the store.
///
/// Explicit tag-and-branch, not trait objects: the variants are few,
/// closed, and on the hot path.
pub enum ValueHandle<'s, S: Store, T: ReflectedType> {
    Absent,
    Bytes(Bytes),
    Array(ArcArrayD<T>),
    File(&'s S, NodeKey),
}

impl<'s, S: Store, T: ReflectedType> ValueHandle<'s, S, T> {
    /// Materialize the handle as raw bytes.
    ///
    /// An in-memory array has no byte representation until a codec
    /// supplies one; use [ValueHandle::to_bytes_with] from codec code.
    pub fn to_bytes(&self) -> Result<Option<Bytes>, ArrayError> {
        match self {
            Self::Absent => Ok(None),
            Self::Bytes(b) => Ok(Some(b.clone())),
            Self::Array(_) => Err(ArgumentError::UntypedArrayBytes.into()),
            Self::File(store, key) => Ok(store.get(key)?),
        }
    }

    /// Materialize the handle as raw bytes, serializing an in-memory
    /// array with the codec-requested endianness.
    pub fn to_bytes_with(&self, endian: Endian) -> Result<Option<Bytes>, ArrayError> {
        match self {
            Self::Array(arr) => {
                let mut buf = Vec::default();
                T::write_array_to(arr, &mut buf, endian);
                Ok(Some(buf.into()))
            }
            other => other.to_bytes(),
        }
    }

    /// Read a subrange of the handle's bytes without materializing the rest.
    pub fn read_range(&self, range: ByteRange) -> Result<Option<Bytes>, ArrayError> {
        match self {
            Self::Absent => Ok(None),
            Self::Bytes(b) => Ok(Some(range.slice_of(b))),
            Self::Array(_) => Err(ArgumentError::UntypedArrayBytes.into()),
            Self::File(store, key) => Ok(store.get_range(key, range)?),
        }
    }

    /// Materialize the handle as a decoded array of the given
    /// representation, deserializing bytes with the format's standard
    /// little-endian layout.
    pub fn to_array(&self, repr: &ArrayRepr<T>) -> Result<Option<ArcArrayD<T>>, ArrayError> {
        let bytes = match self {
            Self::Absent => return Ok(None),
            Self::Array(arr) => return Ok(Some(arr.clone())),
            Self::Bytes(b) => b.clone(),
            Self::File(store, key) => match store.get(key)? {
                Some(b) => b,
                None => return Ok(None),
            },
        };
        if bytes.len() != repr.nbytes() {
            return Err(MalformedError::ChunkLength {
                expected: repr.nbytes(),
                actual: bytes.len(),
            }
            .into());
        }
        Ok(Some(T::read_array_from(
            &bytes,
            ZARR_ENDIAN,
            to_usize(&repr.shape).as_slice(),
        )))
    }

    /// Persist bytes through the handle; `None` removes the target.
    ///
    /// Only file-backed handles can persist.
    pub fn write(&self, value: Option<Bytes>) -> Result<(), ArrayError> {
        match self {
            Self::File(store, key) => {
                match value {
                    Some(b) => store.set(key, b)?,
                    None => store.erase(key)?,
                }
                Ok(())
            }
            _ => Err(ArgumentError::UnwritableHandle.into()),
        }
    }
}
