use smallvec::SmallVec;

pub mod array;
pub mod chunk_grid;
pub mod chunk_key_encoding;
pub mod codecs;
pub mod concurrency;
pub mod data_type;
pub mod error;
pub mod indexer;
pub mod metadata;
pub mod store;
mod util;
pub mod value;

const COORD_SMALLVEC_SIZE: usize = 6;
pub const ZARR_FORMAT: usize = 3;

pub type CoordVec<T> = SmallVec<[T; COORD_SMALLVEC_SIZE]>;
pub type GridCoord = CoordVec<u64>;
pub type ArcArrayD<T> = ndarray::ArcArray<T, ndarray::IxDyn>;

pub use array::Array;
pub use error::ArrayError;

pub(crate) fn to_usize(coord: &[u64]) -> CoordVec<usize> {
    coord.iter().map(|c| *c as usize).collect()
}

pub trait Ndim {
    fn ndim(&self) -> usize;

    fn same_ndim<T: Ndim>(&self, other: &T) -> Result<usize, error::ArgumentError> {
        let n = self.ndim();
        if n == other.ndim() {
            Ok(n)
        } else {
            Err(error::ArgumentError::RankMismatch {
                expected: n,
                actual: other.ndim(),
            })
        }
    }
}

/// Dimensionality which may be undefined, e.g. for codecs which
/// operate independently of the array's shape.
pub trait MaybeNdim {
    fn maybe_ndim(&self) -> Option<usize>;

    fn union_ndim<T: MaybeNdim>(&self, other: &T) -> Result<Option<usize>, error::ArgumentError> {
        match (self.maybe_ndim(), other.maybe_ndim()) {
            (Some(n1), Some(n2)) if n1 != n2 => Err(error::ArgumentError::RankMismatch {
                expected: n1,
                actual: n2,
            }),
            (Some(n1), _) => Ok(Some(n1)),
            (None, n2) => Ok(n2),
        }
    }
}

impl<T: Ndim> MaybeNdim for T {
    fn maybe_ndim(&self) -> Option<usize> {
        Some(self.ndim())
    }
}
