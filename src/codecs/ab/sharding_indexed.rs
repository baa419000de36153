use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{ABCodec, ArrayRepr};
use crate::chunk_grid::ArrayRegion;
use crate::codecs::CodecChain;
use crate::concurrency::concurrent_map;
use crate::data_type::ReflectedType;
use crate::error::{ArrayError, CodecChainError, MalformedError};
use crate::indexer::BasicIndexer;
use crate::store::{ByteRange, Store};
use crate::value::ValueHandle;
use crate::{ArcArrayD, GridCoord, Ndim};

/// Packs a grid of independently-encoded inner chunks into one stored
/// object, with a trailing index of `(offset, nbytes)` records.
///
/// Inner chunks holding only the fill value are not stored; their index
/// records carry the sentinel value. The index makes it possible to
/// read and write sub-rectangles of the outer chunk without touching
/// the whole object.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ShardingIndexedCodec {
    pub chunk_shape: GridCoord,
    #[serde(default)]
    pub codecs: CodecChain,
}

impl Ndim for ShardingIndexedCodec {
    fn ndim(&self) -> usize {
        self.chunk_shape.len()
    }
}

impl ShardingIndexedCodec {
    pub fn new<C: Into<GridCoord>>(chunk_shape: C) -> Self {
        Self {
            chunk_shape: chunk_shape.into(),
            codecs: CodecChain::default(),
        }
    }

    /// Builder-style setter for the inner pipeline.
    pub fn with_codecs(mut self, codecs: CodecChain) -> Self {
        self.codecs = codecs;
        self
    }

    /// Number of inner chunks along each axis of a shard of the given
    /// shape. Every shard axis must be a multiple of the inner axis.
    pub fn grid_shape(&self, shard_shape: &[u64]) -> Result<GridCoord, CodecChainError> {
        if shard_shape.len() != self.chunk_shape.len()
            || self
                .chunk_shape
                .iter()
                .zip(shard_shape.iter())
                .any(|(c, s)| *c == 0 || s % c != 0)
        {
            return Err(CodecChainError::UnalignedShardGrid {
                outer: shard_shape.iter().cloned().collect(),
                inner: self.chunk_shape.clone(),
            });
        }
        Ok(self
            .chunk_shape
            .iter()
            .zip(shard_shape.iter())
            .map(|(c, s)| s / c)
            .collect())
    }

    fn inner_repr<T: ReflectedType>(&self, repr: &ArrayRepr<T>) -> ArrayRepr<T> {
        ArrayRepr::new(self.chunk_shape.clone(), repr.fill_value)
    }

    fn inner_indexer<T: ReflectedType>(
        &self,
        region: &ArrayRegion,
        repr: &ArrayRepr<T>,
    ) -> Result<BasicIndexer, ArrayError> {
        Ok(BasicIndexer::new(region, &repr.shape, &self.chunk_shape)?)
    }

    /// Decode the part of a stored shard covered by `region`.
    ///
    /// Returns a region-shaped array, or None when no shard is stored.
    /// Only the index and the intersecting present sub-chunks are read,
    /// each with its own ranged read; absent sub-chunks become fill.
    pub fn decode_partial<S: Store, T: ReflectedType>(
        &self,
        handle: &ValueHandle<'_, S, T>,
        region: &ArrayRegion,
        repr: &ArrayRepr<T>,
    ) -> Result<Option<ArcArrayD<T>>, ArrayError> {
        let grid = self.grid_shape(&repr.shape)?;
        let Some(index_bytes) = handle.read_range(ByteRange::suffix(ShardIndex::nbytes_for(&grid) as u64))?
        else {
            return Ok(None);
        };
        let index = ShardIndex::from_bytes(&index_bytes, grid)?;

        let inner_repr = self.inner_repr(repr);
        let indexer = self.inner_indexer(region, repr)?;
        let present: Vec<_> = indexer
            .iter()
            .filter_map(|proj| {
                index
                    .get(&proj.chunk_coord)
                    .filter(|a| !a.is_empty())
                    .map(|a| (proj, *a))
            })
            .collect();

        let decoded = concurrent_map(present, None, |(proj, addr)| {
            let bytes = handle
                .read_range(addr.byte_range())?
                .filter(|b| b.len() as u64 == addr.nbytes)
                .ok_or(MalformedError::ShardIndexBounds {
                    offset: addr.offset,
                    nbytes: addr.nbytes,
                })?;
            let sub = self.codecs.decode(&bytes, &inner_repr)?;
            let part = sub.slice(proj.chunk_region.slice_info()).to_shared();
            Ok::<_, ArrayError>((proj.out_region, part))
        })?;

        let mut out = ArrayRepr::new(region.shape(), repr.fill_value).empty_array();
        for (out_region, part) in decoded {
            out.slice_mut(out_region.slice_info()).assign(&part);
        }
        Ok(Some(out))
    }

    /// Overwrite the part of a stored shard covered by `region`.
    ///
    /// `value` is the region-shaped new content. Untouched present
    /// sub-chunks keep their encoded bytes; touched ones are wholly
    /// replaced or read-modify-written; sub-chunks left holding only
    /// fill become absent. The object is rewritten with sub-chunks
    /// compacted in row-major order and a fresh trailing index, or
    /// removed entirely when every sub-chunk is absent.
    pub fn encode_partial<S: Store, T: ReflectedType>(
        &self,
        handle: &ValueHandle<'_, S, T>,
        value: &ArcArrayD<T>,
        region: &ArrayRegion,
        repr: &ArrayRepr<T>,
    ) -> Result<(), ArrayError> {
        let grid = self.grid_shape(&repr.shape)?;
        let idx_nbytes = ShardIndex::nbytes_for(&grid);
        let inner_repr = self.inner_repr(repr);

        let (index, payload) = match handle.to_bytes()? {
            Some(b) => {
                if b.len() < idx_nbytes {
                    return Err(MalformedError::ShardIndexLength {
                        expected: idx_nbytes,
                        actual: b.len(),
                    }
                    .into());
                }
                let payload = b.slice(..b.len() - idx_nbytes);
                let index = ShardIndex::from_bytes(&b[b.len() - idx_nbytes..], grid.clone())?;
                index.check_bounds(payload.len() as u64)?;
                (index, payload)
            }
            None => (ShardIndex::empty(grid.clone()), Bytes::new()),
        };

        let affected: Vec<_> = self.inner_indexer(region, repr)?.iter().collect();
        let replaced = concurrent_map(affected, None, |proj| {
            let sub = if proj.chunk_region.is_whole(&self.chunk_shape) {
                value.slice(proj.out_region.slice_info()).to_shared()
            } else {
                let mut existing = match index.get(&proj.chunk_coord).filter(|a| !a.is_empty()) {
                    Some(addr) => {
                        let sub_bytes = addr.slice_of(&payload);
                        self.codecs.decode(&sub_bytes, &inner_repr)?
                    }
                    None => inner_repr.empty_array(),
                };
                existing
                    .slice_mut(proj.chunk_region.slice_info())
                    .assign(&value.slice(proj.out_region.slice_info()));
                existing
            };
            let encoded = if sub.iter().all(|v| v == &inner_repr.fill_value) {
                None
            } else {
                Some(self.codecs.encode(sub, &inner_repr)?)
            };
            Ok::<_, ArrayError>((proj.chunk_coord, encoded))
        })?;
        let mut replaced: HashMap<GridCoord, Option<Bytes>> = replaced.into_iter().collect();

        let mut new_payload: Vec<u8> = Vec::with_capacity(payload.len());
        let mut new_index = ShardIndex::empty(grid);
        let whole = ArrayRegion::whole(&repr.shape);
        for proj in self.inner_indexer(&whole, repr)?.iter() {
            let sub_bytes = match replaced.remove(&proj.chunk_coord) {
                Some(new) => new,
                None => index
                    .get(&proj.chunk_coord)
                    .filter(|a| !a.is_empty())
                    .map(|a| a.slice_of(&payload)),
            };
            if let Some(b) = sub_bytes {
                new_index.set(
                    &proj.chunk_coord,
                    ChunkAddress {
                        offset: new_payload.len() as u64,
                        nbytes: b.len() as u64,
                    },
                );
                new_payload.extend_from_slice(&b);
            }
        }

        if new_index.is_all_empty() {
            handle.write(None)
        } else {
            new_payload.extend_from_slice(&new_index.to_bytes());
            handle.write(Some(new_payload.into()))
        }
    }
}

impl ABCodec for ShardingIndexedCodec {
    fn encode<T: ReflectedType>(
        &self,
        decoded: ArcArrayD<T>,
        repr: &ArrayRepr<T>,
    ) -> Result<Bytes, ArrayError> {
        let grid = self.grid_shape(&repr.shape)?;
        let inner_repr = self.inner_repr(repr);
        let whole = ArrayRegion::whole(&repr.shape);
        let cells: Vec<_> = self.inner_indexer(&whole, repr)?.iter().collect();

        let encoded = concurrent_map(cells, None, |proj| {
            let sub = decoded.slice(proj.out_region.slice_info()).to_shared();
            if sub.iter().all(|v| v == &inner_repr.fill_value) {
                return Ok::<_, ArrayError>(None);
            }
            Ok(Some(self.codecs.encode(sub, &inner_repr)?))
        })?;

        let mut payload: Vec<u8> = Vec::default();
        let mut index = ShardIndex::empty(grid);
        // encoded results arrive in the same row-major order the index uses
        let whole_again = self.inner_indexer(&ArrayRegion::whole(&repr.shape), repr)?;
        for (proj, sub_bytes) in whole_again.iter().zip(encoded) {
            if let Some(b) = sub_bytes {
                index.set(
                    &proj.chunk_coord,
                    ChunkAddress {
                        offset: payload.len() as u64,
                        nbytes: b.len() as u64,
                    },
                );
                payload.extend_from_slice(&b);
            }
        }
        payload.extend_from_slice(&index.to_bytes());
        Ok(payload.into())
    }

    fn decode<T: ReflectedType>(
        &self,
        encoded: &[u8],
        repr: &ArrayRepr<T>,
    ) -> Result<ArcArrayD<T>, ArrayError> {
        let grid = self.grid_shape(&repr.shape)?;
        let idx_nbytes = ShardIndex::nbytes_for(&grid);
        if encoded.len() < idx_nbytes {
            return Err(MalformedError::ShardIndexLength {
                expected: idx_nbytes,
                actual: encoded.len(),
            }
            .into());
        }
        let (payload, index_bytes) = encoded.split_at(encoded.len() - idx_nbytes);
        let index = ShardIndex::from_bytes(index_bytes, grid)?;
        index.check_bounds(payload.len() as u64)?;

        let inner_repr = self.inner_repr(repr);
        let whole = ArrayRegion::whole(&repr.shape);
        let present: Vec<_> = self
            .inner_indexer(&whole, repr)?
            .iter()
            .filter_map(|proj| {
                index
                    .get(&proj.chunk_coord)
                    .filter(|a| !a.is_empty())
                    .map(|a| (proj, *a))
            })
            .collect();

        let decoded = concurrent_map(present, None, |(proj, addr)| {
            let bytes = &payload[addr.offset as usize..(addr.offset + addr.nbytes) as usize];
            let sub = self.codecs.decode(bytes, &inner_repr)?;
            Ok::<_, ArrayError>((proj.out_region, sub))
        })?;

        let mut out = repr.empty_array();
        for (out_region, sub) in decoded {
            out.slice_mut(out_region.slice_info()).assign(&sub);
        }
        Ok(out)
    }
}

/// Location of one encoded inner chunk within its shard.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ChunkAddress {
    pub offset: u64,
    pub nbytes: u64,
}

impl ChunkAddress {
    pub const NBYTES: usize = 16;

    pub fn empty() -> Self {
        Self {
            offset: u64::MAX,
            nbytes: u64::MAX,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.offset == u64::MAX && self.nbytes == u64::MAX
    }

    pub fn end_offset(&self) -> Option<u64> {
        if self.is_empty() {
            None
        } else {
            Some(self.offset + self.nbytes)
        }
    }

    fn byte_range(&self) -> ByteRange {
        ByteRange::new(self.offset as i64, (self.offset + self.nbytes) as i64)
    }

    fn slice_of(&self, payload: &Bytes) -> Bytes {
        payload.slice(self.offset as usize..(self.offset + self.nbytes) as usize)
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            offset: LittleEndian::read_u64(&buf[..8]),
            nbytes: LittleEndian::read_u64(&buf[8..16]),
        }
    }

    fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(&mut buf[..8], self.offset);
        LittleEndian::write_u64(&mut buf[8..16], self.nbytes);
    }
}

/// C order
fn to_linear_idx(coord: &[u64], shape: &[u64]) -> Option<usize> {
    if coord.len() != shape.len() {
        return None;
    }
    let mut total = 0;
    let mut prev_s: usize = 1;
    for (s, i) in shape.iter().rev().zip(coord.iter().rev()) {
        if i >= s {
            return None;
        }
        total += *i as usize * prev_s;
        prev_s *= *s as usize;
    }
    Some(total)
}

/// The trailing per-sub-chunk address table of a shard, in row-major
/// sub-chunk order.
pub struct ShardIndex {
    addrs: Vec<ChunkAddress>,
    shape: GridCoord,
}

impl ShardIndex {
    /// An index with every sub-chunk absent.
    pub fn empty(shape: GridCoord) -> Self {
        let n = shape.iter().map(|s| *s as usize).product();
        Self {
            addrs: vec![ChunkAddress::empty(); n],
            shape,
        }
    }

    pub fn nbytes_for(grid_shape: &[u64]) -> usize {
        grid_shape.iter().map(|s| *s as usize).product::<usize>() * ChunkAddress::NBYTES
    }

    pub fn nbytes(&self) -> usize {
        self.addrs.len() * ChunkAddress::NBYTES
    }

    pub fn from_bytes(bytes: &[u8], shape: GridCoord) -> Result<Self, MalformedError> {
        let expected = Self::nbytes_for(&shape);
        if bytes.len() != expected {
            return Err(MalformedError::ShardIndexLength {
                expected,
                actual: bytes.len(),
            });
        }
        let addrs = bytes
            .chunks_exact(ChunkAddress::NBYTES)
            .map(ChunkAddress::read_from)
            .collect();
        Ok(Self { addrs, shape })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = vec![0u8; self.nbytes()];
        for (addr, slot) in self.addrs.iter().zip(buf.chunks_exact_mut(ChunkAddress::NBYTES)) {
            addr.write_to(slot);
        }
        buf.into()
    }

    /// Every non-sentinel record must land within the payload.
    pub fn check_bounds(&self, payload_len: u64) -> Result<(), MalformedError> {
        for addr in self.addrs.iter() {
            if let Some(end) = addr.end_offset() {
                if end > payload_len {
                    return Err(MalformedError::ShardIndexBounds {
                        offset: addr.offset,
                        nbytes: addr.nbytes,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, coord: &[u64]) -> Option<&ChunkAddress> {
        to_linear_idx(coord, &self.shape).and_then(|i| self.addrs.get(i))
    }

    pub fn set(&mut self, coord: &[u64], addr: ChunkAddress) {
        let i = to_linear_idx(coord, &self.shape).expect("coordinate within shard grid");
        self.addrs[i] = addr;
    }

    pub fn is_all_empty(&self) -> bool {
        self.addrs.iter().all(|a| a.is_empty())
    }

    pub fn addrs(&self) -> &[ChunkAddress] {
        &self.addrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NodeKey};
    use smallvec::smallvec;

    fn make_arr() -> ArcArrayD<i32> {
        ArcArrayD::from_shape_vec(vec![50, 60], (0..50 * 60).collect()).unwrap()
    }

    fn region(offset: &[u64], shape: &[u64]) -> ArrayRegion {
        ArrayRegion::from_offset_shape(offset, shape).unwrap()
    }

    #[test]
    fn roundtrip_shard_simple() {
        let codec = ShardingIndexedCodec::new(smallvec![10u64, 20]);
        let repr = ArrayRepr::new(smallvec![50u64, 60], 0i32);
        let arr = make_arr();

        let buf = codec.encode(arr.clone(), &repr).unwrap();
        let arr2 = codec.decode(&buf, &repr).unwrap();
        assert_eq!(arr, arr2);
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn roundtrip_shard_compressed_inner() {
        use crate::codecs::bb::gzip_codec::GzipCodec;
        use crate::codecs::{CodecChain, CodecType};

        let inner = CodecChain::from_codecs([
            CodecType::AB(Default::default()),
            CodecType::BB(GzipCodec::default().into()),
        ])
        .unwrap();
        let codec = ShardingIndexedCodec::new(smallvec![10u64, 20]).with_codecs(inner);
        let repr = ArrayRepr::new(smallvec![50u64, 60], 0i32);
        let arr = make_arr();

        let buf = codec.encode(arr.clone(), &repr).unwrap();
        let arr2 = codec.decode(&buf, &repr).unwrap();
        assert_eq!(arr, arr2);
    }

    #[test]
    fn unaligned_grid_rejected() {
        let codec = ShardingIndexedCodec::new(smallvec![3u64, 3]);
        assert!(matches!(
            codec.grid_shape(&[8, 8]),
            Err(CodecChainError::UnalignedShardGrid { .. })
        ));
        codec.grid_shape(&[9, 9]).unwrap();
    }

    #[test]
    fn index_layout() {
        // 8x8 shard of 2x2 inner chunks: 16 records, 256 index bytes
        let codec = ShardingIndexedCodec::new(smallvec![2u64, 2]);
        let repr = ArrayRepr::new(smallvec![8u64, 8], 0i32);
        let arr = ArcArrayD::from_shape_vec(vec![8, 8], (0..64).collect()).unwrap();

        let buf = codec.encode(arr, &repr).unwrap();
        let grid = codec.grid_shape(&repr.shape).unwrap();
        assert_eq!(ShardIndex::nbytes_for(&grid), 256);

        let index = ShardIndex::from_bytes(&buf[buf.len() - 256..], grid).unwrap();
        index.check_bounds((buf.len() - 256) as u64).unwrap();

        // all sub-chunks present, non-overlapping, tightly packed
        let mut spans: Vec<_> = index
            .addrs()
            .iter()
            .map(|a| {
                assert!(!a.is_empty());
                (a.offset, a.end_offset().unwrap())
            })
            .collect();
        spans.sort_unstable();
        assert_eq!(spans[0].0, 0);
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0);
        }
        assert_eq!(spans.last().unwrap().1, (buf.len() - 256) as u64);
    }

    #[test]
    fn fill_subchunks_are_sentinel() {
        let codec = ShardingIndexedCodec::new(smallvec![2u64, 2]);
        let repr = ArrayRepr::new(smallvec![4u64, 4], 0i32);
        // only the top-left inner chunk has data
        let mut arr = repr.empty_array();
        arr[[0, 0]] = 1;
        arr[[1, 1]] = 2;

        let buf = codec.encode(arr, &repr).unwrap();
        let grid = codec.grid_shape(&repr.shape).unwrap();
        let index = ShardIndex::from_bytes(&buf[buf.len() - 64..], grid).unwrap();
        let present: Vec<_> = index.addrs().iter().map(|a| !a.is_empty()).collect();
        assert_eq!(present, vec![true, false, false, false]);
    }

    #[test]
    fn partial_decode_reads_subrectangle() {
        let store = MemoryStore::new();
        let key: NodeKey = "shard".parse().unwrap();
        let codec = ShardingIndexedCodec::new(smallvec![2u64, 2]);
        let repr = ArrayRepr::new(smallvec![8u64, 8], 0i32);
        let arr = ArcArrayD::from_shape_vec(vec![8, 8], (0..64).collect()).unwrap();

        let buf = codec.encode(arr.clone(), &repr).unwrap();
        store.set(&key, buf).unwrap();
        let handle = ValueHandle::File(&store, key);

        let sel = region(&[3, 3], &[3, 3]);
        let out = codec.decode_partial(&handle, &sel, &repr).unwrap().unwrap();
        assert_eq!(out.shape(), &[3, 3]);
        assert_eq!(out, arr.slice(sel.slice_info()).to_shared());
    }

    #[test]
    fn partial_decode_of_missing_shard() {
        let store = MemoryStore::new();
        let key: NodeKey = "shard".parse().unwrap();
        let codec = ShardingIndexedCodec::new(smallvec![2u64, 2]);
        let repr = ArrayRepr::new(smallvec![8u64, 8], 0i32);
        let handle: ValueHandle<_, i32> = ValueHandle::File(&store, key);

        assert!(codec
            .decode_partial(&handle, &region(&[0, 0], &[2, 2]), &repr)
            .unwrap()
            .is_none());
    }

    #[test]
    fn partial_encode_overlays_and_keeps_rest() {
        let store = MemoryStore::new();
        let key: NodeKey = "shard".parse().unwrap();
        let codec = ShardingIndexedCodec::new(smallvec![2u64, 2]);
        let repr = ArrayRepr::new(smallvec![8u64, 8], 0i32);
        let arr = ArcArrayD::from_shape_vec(vec![8, 8], (0..64).collect()).unwrap();

        store.set(&key, codec.encode(arr.clone(), &repr).unwrap()).unwrap();
        let handle = ValueHandle::File(&store, key.clone());

        // single-element overwrite straddling no sub-chunk boundaries
        let patch = ArcArrayD::from_elem(vec![1, 1], 99i32);
        codec
            .encode_partial(&handle, &patch, &region(&[3, 3], &[1, 1]), &repr)
            .unwrap();

        let stored = store.get(&key).unwrap().unwrap();
        let grid = codec.grid_shape(&repr.shape).unwrap();
        let index =
            ShardIndex::from_bytes(&stored[stored.len() - 256..], grid).unwrap();
        index.check_bounds((stored.len() - 256) as u64).unwrap();

        let mut expected = arr;
        expected[[3, 3]] = 99;
        let out = codec.decode(&stored, &repr).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn partial_encode_into_empty_shard() {
        let store = MemoryStore::new();
        let key: NodeKey = "shard".parse().unwrap();
        let codec = ShardingIndexedCodec::new(smallvec![2u64, 2]);
        let repr = ArrayRepr::new(smallvec![4u64, 4], 0i32);
        let handle = ValueHandle::File(&store, key.clone());

        let patch = ArcArrayD::from_elem(vec![2, 2], 7i32);
        codec
            .encode_partial(&handle, &patch, &region(&[2, 0], &[2, 2]), &repr)
            .unwrap();

        let out = codec
            .decode(&store.get(&key).unwrap().unwrap(), &repr)
            .unwrap();
        assert_eq!(out[[2, 0]], 7);
        assert_eq!(out[[0, 0]], 0);
    }

    #[test]
    fn overwriting_with_fill_erases_object() {
        let store = MemoryStore::new();
        let key: NodeKey = "shard".parse().unwrap();
        let codec = ShardingIndexedCodec::new(smallvec![2u64, 2]);
        let repr = ArrayRepr::new(smallvec![4u64, 4], 0i32);
        let handle = ValueHandle::File(&store, key.clone());

        let patch = ArcArrayD::from_elem(vec![2, 2], 7i32);
        codec
            .encode_partial(&handle, &patch, &region(&[0, 0], &[2, 2]), &repr)
            .unwrap();
        assert!(store.exists(&key).unwrap());

        let blank = ArcArrayD::from_elem(vec![2, 2], 0i32);
        codec
            .encode_partial(&handle, &blank, &region(&[0, 0], &[2, 2]), &repr)
            .unwrap();
        assert!(!store.exists(&key).unwrap());
    }
}
