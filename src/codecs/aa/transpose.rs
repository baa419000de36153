use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{AACodec, ArrayRepr};
use crate::data_type::ReflectedType;
use crate::{ArcArrayD, CoordVec, MaybeNdim};

mod strings {
    use crate::named_unit_variant;
    named_unit_variant!(C);
    named_unit_variant!(F);
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Order {
    #[serde(with = "strings::C")]
    C,
    #[serde(with = "strings::F")]
    F,
    Permutation(CoordVec<usize>),
}

impl Order {
    /// Checks that the order is a valid permutation,
    /// and simplifies to C or F if possible.
    pub fn validate(self) -> Result<Self, &'static str> {
        let permutation = match self {
            Order::C | Order::F => return Ok(self),
            Order::Permutation(p) => p,
        };

        let mut it = permutation.iter();
        let mut last = *it.next().ok_or("Empty permutation")?;

        let mut visited = HashSet::with_capacity(permutation.len());
        visited.insert(last);

        let mut is_increasing = true;
        let mut is_decreasing = true;

        for p in it {
            if is_decreasing && p > &last {
                is_decreasing = false;
            }
            if is_increasing && p < &last {
                is_increasing = false;
            }
            if !visited.insert(*p) {
                return Err("Repeated dimension index");
            }
            last = *p;
        }

        if visited.into_iter().max().unwrap() != permutation.len() - 1 {
            return Err("Skipped dimension index");
        }

        if is_increasing {
            Ok(Self::C)
        } else if is_decreasing {
            Ok(Self::F)
        } else {
            Ok(Self::Permutation(permutation))
        }
    }

    pub fn new_permutation(permutation: CoordVec<usize>) -> Result<Self, &'static str> {
        Self::Permutation(permutation).validate()
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::C
    }
}

impl MaybeNdim for Order {
    fn maybe_ndim(&self) -> Option<usize> {
        match self {
            Self::Permutation(p) => Some(p.len()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransposeCodec {
    pub order: Order,
}

impl TransposeCodec {
    pub fn new_c() -> Self {
        Self { order: Order::C }
    }

    pub fn new_f() -> Self {
        Self { order: Order::F }
    }

    pub fn new_permutation(perm: CoordVec<usize>) -> Result<Self, &'static str> {
        Ok(Self {
            order: Order::new_permutation(perm)?,
        })
    }
}

fn reverse_permutation(p: &[usize]) -> CoordVec<usize> {
    let mut pos_idx: HashMap<_, _> = p.iter().enumerate().map(|(idx, pos)| (*pos, idx)).collect();
    (0..pos_idx.len())
        .map(|pos| pos_idx.remove(&pos).unwrap())
        .collect()
}

impl AACodec for TransposeCodec {
    fn encode<T: ReflectedType>(&self, decoded: ArcArrayD<T>) -> ArcArrayD<T> {
        match &self.order {
            Order::C => decoded,
            Order::F => decoded.reversed_axes(),
            Order::Permutation(p) => decoded.permuted_axes(p.as_slice()),
        }
    }

    fn decode<T: ReflectedType>(&self, encoded: ArcArrayD<T>) -> ArcArrayD<T> {
        match &self.order {
            Order::C => encoded,
            Order::F => encoded.reversed_axes(),
            Order::Permutation(p) => encoded.permuted_axes(reverse_permutation(p).as_slice()),
        }
    }

    fn encoded_repr<T: ReflectedType>(&self, decoded: ArrayRepr<T>) -> ArrayRepr<T> {
        let shape = match &self.order {
            Order::C => decoded.shape,
            Order::F => decoded.shape.iter().rev().cloned().collect(),
            Order::Permutation(p) => p.iter().map(|idx| decoded.shape[*idx]).collect(),
        };
        ArrayRepr {
            shape,
            fill_value: decoded.fill_value,
        }
    }
}

impl MaybeNdim for TransposeCodec {
    fn maybe_ndim(&self) -> Option<usize> {
        self.order.maybe_ndim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    const SHAPE: [usize; 3] = [3, 4, 5];

    #[test]
    fn roundtrip_order() {
        let to_deser = vec![r#""C""#, r#""F""#, r#"[0,1,2]"#];
        for s in to_deser.into_iter() {
            let c: Order = serde_json::from_str(s).unwrap_or_else(|_| panic!("Could not deser {s}"));
            let s2 = serde_json::to_string(&c).unwrap_or_else(|_| panic!("Could not ser {c:?}"));
            assert_eq!(s, &s2);
        }
    }

    #[test]
    fn order_validation() {
        assert_eq!(Order::new_permutation(smallvec![0, 1, 2]).unwrap(), Order::C);
        assert_eq!(Order::new_permutation(smallvec![2, 1, 0]).unwrap(), Order::F);
        assert!(matches!(
            Order::new_permutation(smallvec![2, 0, 1]).unwrap(),
            Order::Permutation(_)
        ));
        assert!(Order::new_permutation(smallvec![0, 0, 1]).is_err());
        assert!(Order::new_permutation(smallvec![0, 1, 3]).is_err());
        assert!(Order::new_permutation(smallvec![]).is_err());
    }

    fn make_arr() -> ArcArrayD<u8> {
        ArcArrayD::from_shape_vec(SHAPE.to_vec(), (0..60).collect()).unwrap()
    }

    #[test]
    fn transpose_c_is_noop() {
        let orig = make_arr();
        let t = TransposeCodec::new_c();
        let encoded = t.encode(orig.clone());
        assert_eq!(encoded, orig);
    }

    #[test]
    fn transpose_f() {
        let orig = make_arr();
        let t = TransposeCodec::new_f();
        let encoded = t.encode(orig.clone());

        let mut rev_shape = orig.shape().to_vec();
        rev_shape.reverse();
        assert_eq!(encoded.shape(), rev_shape.as_slice());

        let decoded = t.decode(encoded);
        assert_eq!(decoded, orig);
    }

    #[test]
    fn transpose_permutation() {
        let orig = make_arr();
        let perm: CoordVec<usize> = smallvec![2, 0, 1];
        let t = TransposeCodec::new_permutation(perm.clone()).unwrap();

        let encoded = t.encode(orig.clone());
        let expected_shape: Vec<_> = perm.iter().map(|idx| SHAPE[*idx]).collect();
        assert_eq!(encoded.shape(), expected_shape.as_slice());

        let decoded = t.decode(encoded);
        assert_eq!(decoded, orig);

        let repr = ArrayRepr::new(smallvec![3u64, 4, 5], 0u8);
        let enc_repr = t.encoded_repr(repr);
        assert_eq!(enc_repr.shape.as_slice(), &[5, 3, 4]);
    }
}
