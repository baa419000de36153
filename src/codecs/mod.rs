use bytes::Bytes;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::chunk_grid::ArrayRegion;
use crate::data_type::{NBytes, ReflectedType};
use crate::error::{ArgumentError, ArrayError, CodecChainError};
use crate::store::Store;
use crate::value::ValueHandle;
use crate::{to_usize, ArcArrayD, GridCoord, MaybeNdim};

pub mod aa;
pub mod ab;
pub mod bb;

use aa::{AACodec, AACodecType};
use ab::sharding_indexed::ShardingIndexedCodec;
use ab::{ABCodec, ABCodecType};
use bb::{BBCodec, BBCodecType};

/// Shape and fill value of a decoded chunk of element type `T`.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayRepr<T: ReflectedType> {
    pub shape: GridCoord,
    pub fill_value: T,
}

impl<T: ReflectedType> ArrayRepr<T> {
    pub fn new<C: Into<GridCoord>>(shape: C, fill_value: T) -> Self {
        Self {
            shape: shape.into(),
            fill_value,
        }
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().map(|s| *s as usize).product()
    }

    pub fn nbytes(&self) -> usize {
        self.numel() * T::ZARR_TYPE.nbytes()
    }

    /// A chunk of this representation holding only the fill value.
    pub fn empty_array(&self) -> ArcArrayD<T> {
        ArcArrayD::from_elem(
            to_usize(&self.shape).as_slice().to_vec(),
            self.fill_value,
        )
    }
}

/// Any codec, in any of the three domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodecType {
    AA(AACodecType),
    AB(ABCodecType),
    BB(BBCodecType),
}

impl MaybeNdim for CodecType {
    fn maybe_ndim(&self) -> Option<usize> {
        match self {
            Self::AA(c) => c.maybe_ndim(),
            Self::AB(c) => c.maybe_ndim(),
            Self::BB(c) => c.maybe_ndim(),
        }
    }
}

/// An ordered codec pipeline: array-to-array codecs, then exactly one
/// array-to-bytes codec, then bytes-to-bytes codecs.
///
/// Constructing from a codec list validates the ordering invariants; a
/// sharding codec must be the sole member of its chain.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecChain {
    aa_codecs: Vec<AACodecType>,
    ab_codec: Box<ABCodecType>,
    bb_codecs: Vec<BBCodecType>,
}

impl Default for CodecChain {
    fn default() -> Self {
        Self {
            aa_codecs: Vec::default(),
            ab_codec: Box::new(ABCodecType::default()),
            bb_codecs: Vec::default(),
        }
    }
}

impl FromIterator<CodecType> for Result<CodecChain, CodecChainError> {
    fn from_iter<T: IntoIterator<Item = CodecType>>(iter: T) -> Self {
        let mut aa_codecs = Vec::default();
        let mut ab_codec = None;
        let mut bb_codecs = Vec::default();

        for ce in iter {
            match ce {
                CodecType::AA(c) => {
                    if ab_codec.is_some() {
                        return Err(CodecChainError::IllegalOrder("array->array", "array->bytes"));
                    }
                    if !bb_codecs.is_empty() {
                        return Err(CodecChainError::IllegalOrder("array->array", "bytes->bytes"));
                    }
                    aa_codecs.push(c);
                }
                CodecType::AB(c) => {
                    if ab_codec.is_some() {
                        return Err(CodecChainError::MultipleArrayToBytes);
                    }
                    if !bb_codecs.is_empty() {
                        return Err(CodecChainError::IllegalOrder("array->bytes", "bytes->bytes"));
                    }
                    ab_codec = Some(c);
                }
                CodecType::BB(c) => bb_codecs.push(c),
            }
        }

        let chain = CodecChain {
            aa_codecs,
            ab_codec: Box::new(ab_codec.unwrap_or_default()),
            bb_codecs,
        };
        if matches!(*chain.ab_codec, ABCodecType::ShardingIndexed(_))
            && !(chain.aa_codecs.is_empty() && chain.bb_codecs.is_empty())
        {
            return Err(CodecChainError::ShardingNotSole);
        }
        Ok(chain)
    }
}

impl CodecChain {
    pub fn from_codecs<I: IntoIterator<Item = CodecType>>(
        codecs: I,
    ) -> Result<Self, CodecChainError> {
        codecs.into_iter().collect()
    }

    pub fn aa_codecs(&self) -> &[AACodecType] {
        &self.aa_codecs
    }

    pub fn ab_codec(&self) -> &ABCodecType {
        &self.ab_codec
    }

    pub fn bb_codecs(&self) -> &[BBCodecType] {
        &self.bb_codecs
    }

    /// Replace the array->bytes codec; None restores the default.
    pub fn replace_ab_codec(&mut self, codec: Option<ABCodecType>) {
        self.ab_codec = Box::new(codec.unwrap_or_default());
    }

    pub fn aa_codecs_mut(&mut self) -> &mut Vec<AACodecType> {
        &mut self.aa_codecs
    }

    pub fn bb_codecs_mut(&mut self) -> &mut Vec<BBCodecType> {
        &mut self.bb_codecs
    }

    fn to_codec_vec(&self) -> Vec<CodecType> {
        let mut out = Vec::with_capacity(self.aa_codecs.len() + 1 + self.bb_codecs.len());
        out.extend(self.aa_codecs.iter().cloned().map(CodecType::AA));
        out.push(CodecType::AB((*self.ab_codec).clone()));
        out.extend(self.bb_codecs.iter().cloned().map(CodecType::BB));
        out
    }

    /// The sharding codec, if this chain is exactly one sharding codec.
    pub fn sharding(&self) -> Option<&ShardingIndexedCodec> {
        match &*self.ab_codec {
            ABCodecType::ShardingIndexed(c)
                if self.aa_codecs.is_empty() && self.bb_codecs.is_empty() =>
            {
                Some(c)
            }
            _ => None,
        }
    }

    /// Whether sub-chunk regions can be read without the whole chunk.
    pub fn supports_partial(&self) -> bool {
        self.sharding().is_some()
    }

    /// Consistent dimensionality of all member codecs, where declared.
    pub fn validate_ndim(&self) -> Result<Option<usize>, ArgumentError> {
        let mut ndim = None;
        for c in self.to_codec_vec() {
            match (ndim, c.maybe_ndim()) {
                (Some(n1), Some(n2)) if n1 != n2 => {
                    return Err(ArgumentError::RankMismatch {
                        expected: n1,
                        actual: n2,
                    })
                }
                (None, n2 @ Some(_)) => ndim = n2,
                _ => (),
            }
        }
        Ok(ndim)
    }

    pub fn encode<T: ReflectedType>(
        &self,
        decoded: ArcArrayD<T>,
        repr: &ArrayRepr<T>,
    ) -> Result<Bytes, ArrayError> {
        let mut arr = decoded;
        let mut ab_repr = repr.clone();
        for c in self.aa_codecs.iter() {
            ab_repr = c.encoded_repr(ab_repr);
            arr = c.encode(arr);
        }

        let mut bytes = self.ab_codec.encode(arr, &ab_repr)?;
        for c in self.bb_codecs.iter() {
            bytes = c.encode(&bytes)?;
        }
        Ok(bytes)
    }

    pub fn decode<T: ReflectedType>(
        &self,
        encoded: &[u8],
        repr: &ArrayRepr<T>,
    ) -> Result<ArcArrayD<T>, ArrayError> {
        let mut bytes = Bytes::copy_from_slice(encoded);
        for c in self.bb_codecs.iter().rev() {
            bytes = c.decode(&bytes)?;
        }

        let ab_repr = self
            .aa_codecs
            .iter()
            .fold(repr.clone(), |r, c| c.encoded_repr(r));
        let mut arr = self.ab_codec.decode(&bytes, &ab_repr)?;
        for c in self.aa_codecs.iter().rev() {
            arr = c.decode(arr);
        }
        Ok(arr)
    }

    /// Decode only the part of a chunk covered by `region`, through the
    /// handle. Returns the region-shaped result, or None when the chunk
    /// is not stored.
    ///
    /// Chains other than a lone sharding codec cannot skip bytes, so
    /// they decode the whole chunk and slice.
    pub fn decode_partial<S: Store, T: ReflectedType>(
        &self,
        handle: &ValueHandle<'_, S, T>,
        region: &ArrayRegion,
        repr: &ArrayRepr<T>,
    ) -> Result<Option<ArcArrayD<T>>, ArrayError> {
        if let Some(sharding) = self.sharding() {
            return sharding.decode_partial(handle, region, repr);
        }

        let Some(bytes) = handle.to_bytes()? else {
            return Ok(None);
        };
        let whole = self.decode(&bytes, repr)?;
        Ok(Some(whole.slice(region.slice_info()).to_shared()))
    }

    /// Overwrite only the part of a chunk covered by `region`, through
    /// the handle, leaving the rest of the chunk intact. A chunk which
    /// ends up holding only the fill value is removed instead.
    pub fn encode_partial<S: Store, T: ReflectedType>(
        &self,
        handle: &ValueHandle<'_, S, T>,
        value: &ArcArrayD<T>,
        region: &ArrayRegion,
        repr: &ArrayRepr<T>,
    ) -> Result<(), ArrayError> {
        if let Some(sharding) = self.sharding() {
            return sharding.encode_partial(handle, value, region, repr);
        }

        // read-modify-write of the whole chunk
        let mut chunk = match handle.to_bytes()? {
            Some(bytes) => self.decode(&bytes, repr)?,
            None => repr.empty_array(),
        };
        chunk.slice_mut(region.slice_info()).assign(value);

        if chunk.iter().all(|v| v == &repr.fill_value) {
            handle.write(None)
        } else {
            let encoded = self.encode(chunk, repr)?;
            handle.write(Some(encoded))
        }
    }
}

impl MaybeNdim for CodecChain {
    fn maybe_ndim(&self) -> Option<usize> {
        self.validate_ndim().ok().flatten()
    }
}

impl Serialize for CodecChain {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_codec_vec().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CodecChain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let codecs = Vec::<CodecType>::deserialize(deserializer)?;
        Self::from_codecs(codecs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::ab::bytes_codec::BytesCodec;
    use super::*;
    use smallvec::smallvec;

    fn bytes_le() -> CodecType {
        CodecType::AB(ABCodecType::Bytes(BytesCodec::new_little()))
    }

    fn crc() -> CodecType {
        CodecType::BB(BBCodecType::Crc32c(bb::crc32c_codec::Crc32cCodec {}))
    }

    fn transpose() -> CodecType {
        CodecType::AA(AACodecType::Transpose(aa::TransposeCodec::new_f()))
    }

    fn sharding() -> CodecType {
        CodecType::AB(ABCodecType::ShardingIndexed(ShardingIndexedCodec::new(
            smallvec![2u64, 2],
        )))
    }

    #[test]
    fn valid_compositions() {
        CodecChain::from_codecs([]).unwrap();
        CodecChain::from_codecs([bytes_le()]).unwrap();
        CodecChain::from_codecs([transpose(), bytes_le(), crc()]).unwrap();
        let chain = CodecChain::from_codecs([sharding()]).unwrap();
        assert!(chain.sharding().is_some());
        assert!(chain.supports_partial());
    }

    #[test]
    fn invalid_compositions() {
        assert!(matches!(
            CodecChain::from_codecs([bytes_le(), bytes_le()]),
            Err(CodecChainError::MultipleArrayToBytes)
        ));
        assert!(matches!(
            CodecChain::from_codecs([bytes_le(), transpose()]),
            Err(CodecChainError::IllegalOrder(..))
        ));
        assert!(matches!(
            CodecChain::from_codecs([crc(), bytes_le()]),
            Err(CodecChainError::IllegalOrder(..))
        ));
        assert!(matches!(
            CodecChain::from_codecs([transpose(), sharding()]),
            Err(CodecChainError::ShardingNotSole)
        ));
        assert!(matches!(
            CodecChain::from_codecs([sharding(), crc()]),
            Err(CodecChainError::ShardingNotSole)
        ));
    }

    #[test]
    fn serde_roundtrip() {
        let s = r#"[{"name":"transpose","configuration":{"order":"F"}},{"name":"bytes","configuration":{"endian":"big"}},{"name":"crc32c","configuration":{}}]"#;
        let chain: CodecChain = serde_json::from_str(s).unwrap();
        assert_eq!(chain.aa_codecs().len(), 1);
        assert_eq!(chain.bb_codecs().len(), 1);
        let s2 = serde_json::to_string(&chain).unwrap();
        assert_eq!(s, &s2);
    }

    #[test]
    fn serde_rejects_bad_composition() {
        let s = r#"[{"name":"crc32c","configuration":{}},{"name":"bytes","configuration":{}}]"#;
        assert!(serde_json::from_str::<CodecChain>(s).is_err());
    }

    #[test]
    fn encode_decode_with_transpose_and_checksum() {
        let chain = CodecChain::from_codecs([transpose(), bytes_le(), crc()]).unwrap();
        let repr = ArrayRepr::new(smallvec![2u64, 3], 0i32);
        let arr = ArcArrayD::from_shape_vec(vec![2, 3], vec![1i32, 2, 3, 4, 5, 6]).unwrap();

        let encoded = chain.encode(arr.clone(), &repr).unwrap();
        // 24 data bytes plus the 4-byte checksum
        assert_eq!(encoded.len(), 28);
        let decoded = chain.decode(&encoded, &repr).unwrap();
        assert_eq!(arr, decoded);
    }

    #[test]
    fn decode_length_mismatch_is_fatal() {
        let chain = CodecChain::from_codecs([bytes_le()]).unwrap();
        let repr = ArrayRepr::new(smallvec![2u64, 2], 0i32);
        assert!(chain.decode(&[0u8; 15], &repr).is_err());
    }
}
