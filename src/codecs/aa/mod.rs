use serde::{Deserialize, Serialize};

use super::ArrayRepr;
use crate::data_type::ReflectedType;
use crate::{ArcArrayD, MaybeNdim};

mod transpose;
pub use transpose::{Order, TransposeCodec};

/// Codec between two decoded-array representations.
pub trait AACodec {
    fn encode<T: ReflectedType>(&self, decoded: ArcArrayD<T>) -> ArcArrayD<T>;

    fn decode<T: ReflectedType>(&self, encoded: ArcArrayD<T>) -> ArcArrayD<T>;

    /// The representation this codec's encoded output has for a given
    /// decoded input.
    fn encoded_repr<T: ReflectedType>(&self, decoded: ArrayRepr<T>) -> ArrayRepr<T>;
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "lowercase", tag = "name", content = "configuration")]
pub enum AACodecType {
    Transpose(TransposeCodec),
}

impl AACodec for AACodecType {
    fn encode<T: ReflectedType>(&self, decoded: ArcArrayD<T>) -> ArcArrayD<T> {
        match self {
            Self::Transpose(c) => c.encode(decoded),
        }
    }

    fn decode<T: ReflectedType>(&self, encoded: ArcArrayD<T>) -> ArcArrayD<T> {
        match self {
            Self::Transpose(c) => c.decode(encoded),
        }
    }

    fn encoded_repr<T: ReflectedType>(&self, decoded: ArrayRepr<T>) -> ArrayRepr<T> {
        match self {
            Self::Transpose(c) => c.encoded_repr(decoded),
        }
    }
}

impl MaybeNdim for AACodecType {
    fn maybe_ndim(&self) -> Option<usize> {
        match self {
            Self::Transpose(c) => c.maybe_ndim(),
        }
    }
}

crate::variant_from_data!(AACodecType, Transpose, TransposeCodec);

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn roundtrip_transpose_config() {
        let s = r#"{"name":"transpose","configuration":{"order":[1,2,0]}}"#;
        let aa: AACodecType = serde_json::from_str(s).expect("Could not deser transpose");
        assert_eq!(
            aa,
            AACodecType::Transpose(TransposeCodec::new_permutation(smallvec![1, 2, 0]).unwrap())
        );
        assert_eq!(serde_json::to_string(&aa).unwrap(), s);

        let s = r#"{"name":"transpose","configuration":{"order":"C"}}"#;
        let aa: AACodecType = serde_json::from_str(s).expect("Could not deser transpose");
        assert_eq!(aa, AACodecType::Transpose(TransposeCodec { order: Order::C }));
    }
}
