use crate::chunk_grid::{ArrayRegion, ArraySlice};
use crate::error::ArgumentError;
use crate::{GridCoord, Ndim};

/// How one chunk participates in a selection: where the selection falls
/// within the chunk, and where the chunk's contribution falls within
/// the selection-shaped output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkProjection {
    pub chunk_coord: GridCoord,
    pub chunk_region: ArrayRegion,
    pub out_region: ArrayRegion,
}

/// Maps a hyper-rectangular selection over an array onto the regular
/// chunk grid, enumerating [ChunkProjection]s in row-major chunk order.
///
/// The enumeration order is not part of the contract; projections have
/// pairwise-disjoint `out_region`s and may be processed concurrently.
#[derive(Clone, Debug)]
pub struct BasicIndexer {
    region: ArrayRegion,
    chunk_shape: GridCoord,
    first_chunk: GridCoord,
    // inclusive; meaningless when the selection is empty
    last_chunk: GridCoord,
}

impl BasicIndexer {
    pub fn new(
        region: &ArrayRegion,
        shape: &[u64],
        chunk_shape: &[u64],
    ) -> Result<Self, ArgumentError> {
        ArgumentError::check_rank(shape.len(), region.ndim())?;
        ArgumentError::check_rank(shape.len(), chunk_shape.len())?;
        if chunk_shape.iter().any(|cs| *cs == 0) {
            return Err(ArgumentError::ZeroDimension);
        }
        if !region.is_within(shape) {
            return Err(ArgumentError::OutOfBounds {
                region: region.to_string(),
                shape: shape.iter().cloned().collect(),
            });
        }

        let mut first_chunk = GridCoord::with_capacity(shape.len());
        let mut last_chunk = GridCoord::with_capacity(shape.len());
        for (sl, cs) in region.slices().iter().zip(chunk_shape.iter()) {
            first_chunk.push(sl.offset / cs);
            last_chunk.push(sl.end().saturating_sub(1) / cs);
        }

        Ok(Self {
            region: region.clone(),
            chunk_shape: chunk_shape.iter().cloned().collect(),
            first_chunk,
            last_chunk,
        })
    }

    /// Shape of the selection, i.e. of the output of a read.
    pub fn shape(&self) -> GridCoord {
        self.region.shape()
    }

    pub fn is_empty(&self) -> bool {
        self.region.numel() == 0
    }

    fn project(&self, chunk_coord: &[u64]) -> ChunkProjection {
        let mut chunk_region = Vec::with_capacity(chunk_coord.len());
        let mut out_region = Vec::with_capacity(chunk_coord.len());
        for ((c, cs), sel) in chunk_coord
            .iter()
            .zip(self.chunk_shape.iter())
            .zip(self.region.slices().iter())
        {
            let chunk_start = c * cs;
            let start = sel.offset.max(chunk_start);
            let end = sel.end().min(chunk_start + cs);
            chunk_region.push(ArraySlice::new(start - chunk_start, end - start));
            out_region.push(ArraySlice::new(start - sel.offset, end - start));
        }
        ChunkProjection {
            chunk_coord: chunk_coord.iter().cloned().collect(),
            chunk_region: chunk_region.into_iter().collect(),
            out_region: out_region.into_iter().collect(),
        }
    }

    pub fn iter(&self) -> ProjectionIter<'_> {
        ProjectionIter {
            indexer: self,
            next_chunk: (!self.is_empty()).then(|| self.first_chunk.clone()),
        }
    }
}

impl Ndim for BasicIndexer {
    fn ndim(&self) -> usize {
        self.region.ndim()
    }
}

impl<'a> IntoIterator for &'a BasicIndexer {
    type Item = ChunkProjection;
    type IntoIter = ProjectionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ProjectionIter<'a> {
    indexer: &'a BasicIndexer,
    next_chunk: Option<GridCoord>,
}

impl<'a> Iterator for ProjectionIter<'a> {
    type Item = ChunkProjection;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next_chunk.take()?;
        let out = self.indexer.project(&current);

        // row-major odometer over the chunk range
        let mut next = current;
        for axis in (0..next.len()).rev() {
            if next[axis] < self.indexer.last_chunk[axis] {
                next[axis] += 1;
                self.next_chunk = Some(next);
                return Some(out);
            }
            next[axis] = self.indexer.first_chunk[axis];
        }
        // odometer exhausted; rank-0 selections land here on their only chunk
        Some(out)
    }
}
