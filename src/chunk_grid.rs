use ndarray::{IxDyn, SliceInfo, SliceInfoElem};
use serde::{Deserialize, Serialize};

use crate::error::ArgumentError;
use crate::{CoordVec, GridCoord, Ndim};

/// Half-open extent along one axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArraySlice {
    pub offset: u64,
    pub shape: u64,
}

impl ArraySlice {
    pub fn new(offset: u64, shape: u64) -> Self {
        Self { offset, shape }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.shape
    }
}

/// A hyper-rectangular selection: one [ArraySlice] per axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayRegion(CoordVec<ArraySlice>);

impl FromIterator<ArraySlice> for ArrayRegion {
    fn from_iter<T: IntoIterator<Item = ArraySlice>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Ndim for ArrayRegion {
    fn ndim(&self) -> usize {
        self.0.len()
    }
}

impl ArrayRegion {
    pub fn from_offset_shape(offset: &[u64], shape: &[u64]) -> Result<Self, ArgumentError> {
        ArgumentError::check_rank(offset.len(), shape.len())?;
        Ok(offset
            .iter()
            .zip(shape.iter())
            .map(|(o, s)| ArraySlice::new(*o, *s))
            .collect())
    }

    /// The whole of an array of the given shape.
    pub fn whole(shape: &[u64]) -> Self {
        shape.iter().map(|s| ArraySlice::new(0, *s)).collect()
    }

    /// The same extents, based at the origin.
    pub fn at_origin(&self) -> Self {
        self.0
            .iter()
            .map(|sl| ArraySlice::new(0, sl.shape))
            .collect()
    }

    /// Whether this region covers the entirety of an array of the given
    /// shape. Ranks must match.
    pub fn is_whole(&self, shape: &[u64]) -> bool {
        self.ndim() == shape.len()
            && self
                .0
                .iter()
                .zip(shape.iter())
                .all(|(sl, sh)| sl.offset == 0 && &sl.shape == sh)
    }

    /// Whether the region lies entirely within an array of the given shape.
    pub fn is_within(&self, shape: &[u64]) -> bool {
        self.ndim() == shape.len()
            && self.0.iter().zip(shape.iter()).all(|(sl, sh)| sl.end() <= *sh)
    }

    pub fn slices(&self) -> &[ArraySlice] {
        self.0.as_slice()
    }

    pub fn offset(&self) -> GridCoord {
        self.0.iter().map(|s| s.offset).collect()
    }

    pub fn shape(&self) -> GridCoord {
        self.0.iter().map(|s| s.shape).collect()
    }

    pub fn end(&self) -> GridCoord {
        self.0.iter().map(|s| s.end()).collect()
    }

    pub fn numel(&self) -> u64 {
        self.0.iter().map(|s| s.shape).product()
    }

    pub fn slice_info(&self) -> SliceInfo<Vec<SliceInfoElem>, IxDyn, IxDyn> {
        let indices: Vec<_> = self
            .0
            .iter()
            .map(|sl| SliceInfoElem::Slice {
                start: sl.offset as isize,
                end: Some(sl.end() as isize),
                step: 1,
            })
            .collect();
        SliceInfo::try_from(indices).expect("Bad index size")
    }
}

impl std::fmt::Display for ArrayRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, sl) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", sl.offset, sl.end())?;
        }
        write!(f, "]")
    }
}

/// Regular grid of identically-shaped chunks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegularChunkGrid {
    chunk_shape: GridCoord,
}

impl RegularChunkGrid {
    pub fn new<T: Into<GridCoord>>(chunk_shape: T) -> Self {
        Self {
            chunk_shape: chunk_shape.into(),
        }
    }

    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// The chunk index containing the voxel, and the voxel's offset
    /// within that chunk.
    pub fn voxel_chunk(&self, idx: &[u64]) -> (GridCoord, GridCoord) {
        let mut chunk_idx = GridCoord::with_capacity(self.ndim());
        let mut offset = GridCoord::with_capacity(self.ndim());

        for (vx, cs) in idx.iter().zip(self.chunk_shape.iter()) {
            chunk_idx.push(vx / cs);
            offset.push(vx % cs);
        }
        (chunk_idx, offset)
    }

    /// Number of chunks along each axis for an array of the given shape.
    pub fn chunk_count(&self, shape: &[u64]) -> GridCoord {
        shape
            .iter()
            .zip(self.chunk_shape.iter())
            .map(|(s, cs)| s.div_ceil(*cs))
            .collect()
    }
}

impl Ndim for RegularChunkGrid {
    fn ndim(&self) -> usize {
        self.chunk_shape.len()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "name", content = "configuration", rename_all = "lowercase")]
pub enum ChunkGridType {
    Regular(RegularChunkGrid),
}

impl ChunkGridType {
    pub fn as_regular(&self) -> &RegularChunkGrid {
        match self {
            Self::Regular(g) => g,
        }
    }

    pub fn chunk_shape(&self) -> &[u64] {
        self.as_regular().chunk_shape()
    }
}

impl Ndim for ChunkGridType {
    fn ndim(&self) -> usize {
        match self {
            Self::Regular(g) => g.ndim(),
        }
    }
}

impl From<&[u64]> for ChunkGridType {
    fn from(value: &[u64]) -> Self {
        let cs: GridCoord = value.iter().cloned().collect();
        Self::Regular(RegularChunkGrid::new(cs))
    }
}
