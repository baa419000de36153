use log::debug;

use crate::chunk_grid::ArrayRegion;
use crate::chunk_key_encoding::ChunkKeyEncoder;
use crate::codecs::ArrayRepr;
use crate::concurrency::concurrent_map;
use crate::data_type::ReflectedType;
use crate::error::{ArgumentError, ArrayError, MalformedError};
use crate::indexer::BasicIndexer;
use crate::metadata::{ArrayMetadata, JsonObject};
use crate::store::{ListableStore, NodeKey, Store};
use crate::value::ValueHandle;
use crate::{to_usize, ArcArrayD, GridCoord, Ndim};

/// A chunked n-dimensional array of `T` stored under one key prefix.
///
/// Reads and writes accept hyper-rectangular selections; each touched
/// chunk is fetched, decoded, encoded and stored independently, fanned
/// out on the worker pool. Chunks holding only the fill value are not
/// stored.
pub struct Array<'s, S: Store, T: ReflectedType> {
    store: &'s S,
    key: NodeKey,
    meta_key: NodeKey,
    metadata: ArrayMetadata,
    fill_value: T,
    chunk_concurrency: Option<usize>,
}

impl<'s, S: Store, T: ReflectedType> Ndim for Array<'s, S, T> {
    fn ndim(&self) -> usize {
        self.metadata.ndim()
    }
}

impl<'s, S: Store, T: ReflectedType> Array<'s, S, T> {
    /// Wrap existing metadata; does not touch the store.
    pub(crate) fn new(
        store: &'s S,
        key: NodeKey,
        metadata: ArrayMetadata,
    ) -> Result<Self, ArrayError> {
        if T::ZARR_TYPE != metadata.data_type() {
            return Err(ArgumentError::DataTypeMismatch {
                annotated: T::ZARR_TYPE,
                stored: metadata.data_type(),
            }
            .into());
        }
        let fill_value = metadata.effective_fill_value()?;
        let mut meta_key = key.clone();
        meta_key.with_metadata();

        Ok(Self {
            store,
            key,
            meta_key,
            metadata,
            fill_value,
            chunk_concurrency: None,
        })
    }

    /// Create a new array node, persisting its metadata document.
    pub fn create(store: &'s S, key: NodeKey, metadata: ArrayMetadata) -> Result<Self, ArrayError> {
        metadata.validate()?;
        let arr = Self::new(store, key, metadata)?;
        arr.write_meta()?;
        Ok(arr)
    }

    /// Open an existing array node from its metadata document.
    pub fn open(store: &'s S, key: NodeKey) -> Result<Self, ArrayError> {
        let mut meta_key = key.clone();
        meta_key.with_metadata();
        let Some(bytes) = store.get(&meta_key)? else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no array metadata under '{}'", meta_key),
            )
            .into());
        };
        let metadata: ArrayMetadata = serde_json::from_slice(&bytes)
            .map_err(|e| MalformedError::Metadata(e.to_string()))?;
        metadata.validate()?;
        Self::new(store, key, metadata)
    }

    /// Cap the number of concurrently processed chunks per operation.
    ///
    /// Unset means the whole worker pool.
    pub fn set_chunk_concurrency(&mut self, limit: Option<usize>) {
        self.chunk_concurrency = limit;
    }

    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    pub fn shape(&self) -> &[u64] {
        self.metadata.shape()
    }

    pub fn chunk_shape(&self) -> &[u64] {
        self.metadata.chunk_shape()
    }

    pub fn fill_value(&self) -> T {
        self.fill_value
    }

    pub fn attributes(&self) -> &JsonObject {
        self.metadata.attributes()
    }

    /// Mutate the attribute map and rewrite the metadata document.
    pub fn update_attributes<F, R>(&mut self, f: F) -> Result<R, ArrayError>
    where
        F: FnOnce(&mut JsonObject) -> R,
    {
        let out = f(self.metadata.attributes_mut());
        self.write_meta()?;
        Ok(out)
    }

    pub(crate) fn write_meta(&self) -> Result<(), ArrayError> {
        let doc = serde_json::to_vec_pretty(&self.metadata)
            .map_err(|e| MalformedError::Metadata(e.to_string()))?;
        self.store.set(&self.meta_key, doc.into())?;
        Ok(())
    }

    fn chunk_repr(&self) -> ArrayRepr<T> {
        ArrayRepr::new(
            self.chunk_shape().iter().cloned().collect::<GridCoord>(),
            self.fill_value,
        )
    }

    fn chunk_key(&self, chunk_coord: &[u64]) -> NodeKey {
        self.metadata
            .chunk_key_encoding()
            .chunk_key(&self.key, chunk_coord)
    }

    fn chunk_handle(&self, chunk_coord: &[u64]) -> ValueHandle<'s, S, T> {
        ValueHandle::File(self.store, self.chunk_key(chunk_coord))
    }

    fn indexer(&self, region: &ArrayRegion) -> Result<BasicIndexer, ArrayError> {
        Ok(BasicIndexer::new(
            region,
            self.shape(),
            self.chunk_shape(),
        )?)
    }

    /// Read one whole chunk, substituting fill for absent ones.
    ///
    /// Stored chunks are always full-sized; cells of an edge chunk
    /// beyond the array bounds read as fill.
    pub fn read_chunk(&self, chunk_coord: &[u64]) -> Result<ArcArrayD<T>, ArrayError> {
        let repr = self.chunk_repr();
        let handle = self.chunk_handle(chunk_coord);
        match handle.to_bytes()? {
            Some(bytes) => self.metadata.codecs().decode(&bytes, &repr),
            None => Ok(repr.empty_array()),
        }
    }

    /// Write one whole chunk. A chunk of pure fill value is elided:
    /// its key is removed rather than written.
    pub fn write_chunk(&self, chunk_coord: &[u64], chunk: ArcArrayD<T>) -> Result<(), ArrayError> {
        let repr = self.chunk_repr();
        let expected = to_usize(&repr.shape);
        if chunk.shape() != expected.as_slice() {
            return Err(ArgumentError::ShapeMismatch {
                expected: repr.shape.clone(),
                actual: chunk.shape().iter().map(|s| *s as u64).collect(),
            }
            .into());
        }

        let handle = self.chunk_handle(chunk_coord);
        if chunk.iter().all(|v| v == &self.fill_value) {
            debug!("eliding all-fill chunk at {:?}", chunk_coord);
            handle.write(None)
        } else {
            let encoded = self.metadata.codecs().encode(chunk, &repr)?;
            handle.write(Some(encoded))
        }
    }

    /// Read a selection into a new array of the selection's shape.
    ///
    /// Chunks without stored data contribute the fill value. The
    /// selection must lie within the array's bounds.
    pub fn read_region(&self, region: &ArrayRegion) -> Result<ArcArrayD<T>, ArrayError> {
        let indexer = self.indexer(region)?;
        let repr = self.chunk_repr();
        let codecs = self.metadata.codecs();

        let projections: Vec<_> = indexer.iter().collect();
        let parts = concurrent_map(projections, self.chunk_concurrency, |proj| {
            let handle = self.chunk_handle(&proj.chunk_coord);
            let part = codecs.decode_partial(&handle, &proj.chunk_region, &repr)?;
            Ok::<_, ArrayError>((proj.out_region, part))
        })?;

        let mut out = ArrayRepr::new(indexer.shape(), self.fill_value).empty_array();
        for (out_region, part) in parts {
            if let Some(arr) = part {
                out.slice_mut(out_region.slice_info()).assign(&arr);
            }
        }
        Ok(out)
    }

    /// Read the entire array.
    pub fn read(&self) -> Result<ArcArrayD<T>, ArrayError> {
        self.read_region(&ArrayRegion::whole(self.shape()))
    }

    /// Read a single element.
    pub fn read_scalar(&self, coord: &[u64]) -> Result<T, ArrayError> {
        let region = ArrayRegion::from_offset_shape(coord, &vec![1; coord.len()])?;
        let out = self.read_region(&region)?;
        Ok(*out.iter().next().expect("selection holds one element"))
    }

    /// Write an array at the given offset.
    ///
    /// Wholly-covered chunks are encoded directly; partially-covered
    /// chunks are read-modify-written (delegated to the sharding codec's
    /// sub-chunk machinery where it is in play). Chunks left holding
    /// only fill are removed.
    pub fn write_region(&self, offset: &[u64], value: ArcArrayD<T>) -> Result<(), ArrayError> {
        let shape: GridCoord = value.shape().iter().map(|s| *s as u64).collect();
        let region = ArrayRegion::from_offset_shape(offset, &shape)?;
        let indexer = self.indexer(&region)?;
        let repr = self.chunk_repr();
        let codecs = self.metadata.codecs();

        let projections: Vec<_> = indexer.iter().collect();
        concurrent_map(projections, self.chunk_concurrency, |proj| {
            let sub = value.slice(proj.out_region.slice_info()).to_shared();
            if proj.chunk_region.is_whole(self.chunk_shape()) {
                self.write_chunk(&proj.chunk_coord, sub)?;
            } else {
                let handle = self.chunk_handle(&proj.chunk_coord);
                codecs.encode_partial(&handle, &sub, &proj.chunk_region, &repr)?;
            }
            Ok::<_, ArrayError>(())
        })?;
        Ok(())
    }

    /// Broadcast a scalar over a selection.
    pub fn fill_region(&self, region: &ArrayRegion, value: T) -> Result<(), ArrayError> {
        let chunk = ArcArrayD::from_elem(
            to_usize(&region.shape()).as_slice().to_vec(),
            value,
        );
        self.write_region(&region.offset(), chunk)
    }

    /// Set every element of the array to a scalar.
    pub fn write_scalar(&self, value: T) -> Result<(), ArrayError> {
        self.fill_region(&ArrayRegion::whole(self.shape()), value)
    }
}

impl<'s, S: ListableStore, T: ReflectedType> Array<'s, S, T> {
    /// Change the array's shape without moving data.
    ///
    /// The rank is fixed. Chunks falling wholly outside the new bounds
    /// are deleted concurrently; the metadata document is rewritten.
    pub fn resize(&mut self, new_shape: GridCoord) -> Result<(), ArrayError> {
        ArgumentError::check_rank(self.ndim(), new_shape.len())?;
        if new_shape.contains(&0) {
            return Err(ArgumentError::ZeroDimension.into());
        }

        let grid = self.metadata.chunk_grid().as_regular();
        let new_counts = grid.chunk_count(&new_shape);
        let encoding = self.metadata.chunk_key_encoding();

        let mut doomed = Vec::default();
        for key in self.store.list_prefix(&self.key)? {
            let Some(rest) = key.strip_prefix(&self.key) else {
                continue;
            };
            let encoded = rest
                .iter()
                .map(|n| n.as_ref())
                .collect::<Vec<_>>()
                .join("/");
            let Some(coord) = encoding.decode_chunk_key(&encoded) else {
                continue;
            };
            if coord.len() != self.ndim() {
                continue;
            }
            if coord.iter().zip(new_counts.iter()).any(|(c, n)| c >= n) {
                doomed.push(key);
            }
        }

        concurrent_map(doomed, self.chunk_concurrency, |key| {
            self.store.erase(&key).map_err(ArrayError::Io)
        })?;

        self.metadata.set_shape(new_shape);
        self.write_meta()
    }

    /// Remove the array node and all of its chunks.
    pub fn erase(self) -> Result<(), ArrayError> {
        self.store.erase_prefix(&self.key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_key_encoding::{ChunkKeyEncoding, Separator};
    use crate::codecs::ab::bytes_codec::BytesCodec;
    use crate::codecs::ab::sharding_indexed::{ShardIndex, ShardingIndexedCodec};
    use crate::metadata::ArrayMetadataBuilder;
    use crate::store::MemoryStore;
    use smallvec::smallvec;

    fn region(offset: &[u64], shape: &[u64]) -> ArrayRegion {
        ArrayRegion::from_offset_shape(offset, shape).unwrap()
    }

    fn chunk_keys(store: &MemoryStore) -> Vec<String> {
        let mut keys: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|k| k.encode())
            .filter(|k| !k.ends_with("zarr.json"))
            .collect();
        keys.sort();
        keys
    }

    fn basic_array(store: &MemoryStore) -> Array<'_, MemoryStore, i32> {
        let meta = ArrayMetadataBuilder::<i32>::new(smallvec![4u64, 4])
            .chunk_grid(vec![2, 2].as_slice())
            .unwrap()
            .ab_codec(BytesCodec::new_little())
            .unwrap()
            .build()
            .unwrap();
        Array::create(store, NodeKey::default(), meta).unwrap()
    }

    fn sharded_array(store: &MemoryStore) -> Array<'_, MemoryStore, i32> {
        let meta = ArrayMetadataBuilder::<i32>::new(smallvec![8u64, 8])
            .chunk_grid(vec![8, 8].as_slice())
            .unwrap()
            .ab_codec(ShardingIndexedCodec::new(smallvec![2u64, 2]))
            .unwrap()
            .build()
            .unwrap();
        Array::create(store, NodeKey::default(), meta).unwrap()
    }

    fn range_arr(shape: &[usize]) -> ArcArrayD<i32> {
        let n: usize = shape.iter().product();
        ArcArrayD::from_shape_vec(shape.to_vec(), (0..n as i32).collect()).unwrap()
    }

    #[test]
    fn quadrant_write_then_full_read() {
        let store = MemoryStore::new();
        let arr = basic_array(&store);

        let quad = ArcArrayD::from_shape_vec(vec![2, 2], vec![1, 2, 3, 4]).unwrap();
        arr.write_region(&[0, 0], quad).unwrap();

        let out = arr.read().unwrap();
        let expected = ArcArrayD::from_shape_vec(
            vec![4, 4],
            vec![1, 2, 0, 0, 3, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        )
        .unwrap();
        assert_eq!(out, expected);

        // only the touched chunk is stored
        assert_eq!(chunk_keys(&store), vec!["c0/0".to_string()]);
    }

    #[test]
    fn scalar_overwrite_elides_chunks() {
        let store = MemoryStore::new();
        let arr = basic_array(&store);

        arr.write_scalar(7).unwrap();
        let out = arr.read().unwrap();
        assert!(out.iter().all(|v| *v == 7));
        assert_eq!(chunk_keys(&store).len(), 4);

        arr.write_scalar(0).unwrap();
        assert!(chunk_keys(&store).is_empty());
        assert!(arr.read().unwrap().iter().all(|v| *v == 0));
    }

    #[test]
    fn fresh_array_reads_fill() {
        let store = MemoryStore::new();
        let meta = ArrayMetadataBuilder::<i32>::new(smallvec![3u64, 3])
            .chunk_grid(vec![2, 2].as_slice())
            .unwrap()
            .fill_value(-1)
            .build()
            .unwrap();
        let arr = Array::<_, i32>::create(&store, NodeKey::default(), meta).unwrap();
        assert!(arr.read().unwrap().iter().all(|v| *v == -1));
    }

    #[test]
    fn partial_write_crossing_chunks() {
        let store = MemoryStore::new();
        let arr = basic_array(&store);

        // center 2x2 straddles all four chunks
        let center = ArcArrayD::from_elem(vec![2, 2], 5);
        arr.write_region(&[1, 1], center).unwrap();

        let out = arr.read().unwrap();
        assert_eq!(out[[1, 1]], 5);
        assert_eq!(out[[2, 2]], 5);
        assert_eq!(out[[0, 0]], 0);
        assert_eq!(out[[3, 3]], 0);

        // read-modify-write kept the untouched quadrant cells
        let out2 = arr.read_region(&region(&[0, 0], &[2, 2])).unwrap();
        assert_eq!(out2[[0, 0]], 0);
        assert_eq!(out2[[1, 1]], 5);
    }

    #[test]
    fn disjoint_writes_do_not_interfere() {
        let store = MemoryStore::new();
        let arr = basic_array(&store);

        arr.write_region(&[0, 0], ArcArrayD::from_elem(vec![2, 2], 1))
            .unwrap();
        let before = arr.read_region(&region(&[2, 2], &[2, 2])).unwrap();
        arr.write_region(&[0, 2], ArcArrayD::from_elem(vec![2, 2], 2))
            .unwrap();
        let after = arr.read_region(&region(&[2, 2], &[2, 2])).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn out_of_bounds_selection_rejected() {
        let store = MemoryStore::new();
        let arr = basic_array(&store);
        assert!(matches!(
            arr.read_region(&region(&[2, 2], &[3, 3])),
            Err(ArrayError::Argument(ArgumentError::OutOfBounds { .. }))
        ));
        assert!(arr
            .write_region(&[3, 3], ArcArrayD::from_elem(vec![2, 2], 1))
            .is_err());
    }

    #[test]
    fn sharded_write_and_windowed_read() {
        let store = MemoryStore::new();
        let arr = sharded_array(&store);

        let data = range_arr(&[8, 8]);
        arr.write_region(&[0, 0], data.clone()).unwrap();

        // one physical object
        assert_eq!(chunk_keys(&store), vec!["c0/0".to_string()]);

        let window = arr.read_region(&region(&[3, 3], &[3, 3])).unwrap();
        assert_eq!(window, data.slice(region(&[3, 3], &[3, 3]).slice_info()).to_shared());

        // trailing index: 16 sub-chunks at 16 bytes each
        let object = store.get(&"c0/0".parse().unwrap()).unwrap().unwrap();
        let index = ShardIndex::from_bytes(&object[object.len() - 256..], smallvec![4u64, 4]).unwrap();
        index.check_bounds((object.len() - 256) as u64).unwrap();
        let mut spans: Vec<_> = index
            .addrs()
            .iter()
            .filter_map(|a| a.end_offset().map(|e| (a.offset, e)))
            .collect();
        spans.sort_unstable();
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0);
        }
    }

    #[test]
    fn sharded_single_element_overwrite() {
        let store = MemoryStore::new();
        let arr = sharded_array(&store);

        let data = range_arr(&[8, 8]);
        arr.write_region(&[0, 0], data.clone()).unwrap();
        arr.fill_region(&region(&[3, 3], &[1, 1]), 99).unwrap();

        let out = arr.read().unwrap();
        let mut expected = data;
        expected[[3, 3]] = 99;
        assert_eq!(out, expected);

        let object = store.get(&"c0/0".parse().unwrap()).unwrap().unwrap();
        let index = ShardIndex::from_bytes(&object[object.len() - 256..], smallvec![4u64, 4]).unwrap();
        index.check_bounds((object.len() - 256) as u64).unwrap();
    }

    #[test]
    fn v2_keys_one_dimensional() {
        let store = MemoryStore::new();
        let meta = ArrayMetadataBuilder::<i32>::new(smallvec![5u64])
            .chunk_grid(vec![3].as_slice())
            .unwrap()
            .chunk_key_encoding(ChunkKeyEncoding::new_v2(Separator::Dot))
            .build()
            .unwrap();
        let arr = Array::create(&store, NodeKey::default(), meta).unwrap();

        arr.write_region(&[0], ArcArrayD::from_shape_vec(vec![5], vec![10, 20, 30, 40, 50]).unwrap())
            .unwrap();
        assert_eq!(chunk_keys(&store), vec!["0".to_string(), "1".to_string()]);

        let out = arr.read_region(&region(&[1], &[3])).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[20, 30, 40]);
    }

    #[test]
    fn rank_zero_array() {
        let store = MemoryStore::new();
        let meta = ArrayMetadataBuilder::<i32>::new(GridCoord::default())
            .build()
            .unwrap();
        let arr = Array::create(&store, NodeKey::default(), meta).unwrap();

        arr.write_scalar(42).unwrap();
        assert_eq!(chunk_keys(&store), vec!["c".to_string()]);
        assert_eq!(arr.read_scalar(&[]).unwrap(), 42);

        arr.write_scalar(0).unwrap();
        assert!(chunk_keys(&store).is_empty());
        assert_eq!(arr.read_scalar(&[]).unwrap(), 0);
    }

    #[test]
    fn open_roundtrips_metadata() {
        let store = MemoryStore::new();
        {
            let arr = basic_array(&store);
            arr.write_region(&[2, 0], ArcArrayD::from_elem(vec![2, 2], 9))
                .unwrap();
        }

        let arr = Array::<_, i32>::open(&store, NodeKey::default()).unwrap();
        assert_eq!(arr.shape(), &[4, 4]);
        assert_eq!(arr.read_scalar(&[2, 0]).unwrap(), 9);

        // annotation must match the stored dtype
        assert!(matches!(
            Array::<_, f32>::open(&store, NodeKey::default()),
            Err(ArrayError::Argument(ArgumentError::DataTypeMismatch { .. }))
        ));
    }

    #[test]
    fn resize_collects_outside_chunks() {
        let store = MemoryStore::new();
        let mut arr = basic_array(&store);
        arr.write_scalar(3).unwrap();
        assert_eq!(chunk_keys(&store).len(), 4);

        arr.resize(smallvec![2u64, 2]).unwrap();
        assert_eq!(chunk_keys(&store), vec!["c0/0".to_string()]);
        assert_eq!(arr.shape(), &[2, 2]);
        assert!(arr.read().unwrap().iter().all(|v| *v == 3));

        let reopened = Array::<_, i32>::open(&store, NodeKey::default()).unwrap();
        assert_eq!(reopened.shape(), &[2, 2]);
    }

    #[test]
    fn resize_grow_keeps_data() {
        let store = MemoryStore::new();
        let mut arr = basic_array(&store);
        arr.write_scalar(3).unwrap();
        arr.resize(smallvec![6u64, 6]).unwrap();
        assert_eq!(chunk_keys(&store).len(), 4);
        let out = arr.read().unwrap();
        assert_eq!(out[[3, 3]], 3);
        assert_eq!(out[[5, 5]], 0);
    }

    #[test]
    fn erase_removes_node() {
        let store = MemoryStore::new();
        let arr = basic_array(&store);
        arr.write_scalar(1).unwrap();
        arr.erase().unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn attribute_updates_rewrite_metadata() {
        let store = MemoryStore::new();
        let mut arr = basic_array(&store);
        arr.update_attributes(|attrs| {
            attrs.insert("species".into(), serde_json::Value::from("vole"))
        })
        .unwrap();

        let arr2 = Array::<_, i32>::open(&store, NodeKey::default()).unwrap();
        assert_eq!(
            arr2.attributes().get("species"),
            Some(&serde_json::Value::from("vole"))
        );
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn compressed_roundtrip() {
        use crate::codecs::bb::gzip_codec::GzipCodec;

        let store = MemoryStore::new();
        let meta = ArrayMetadataBuilder::<i32>::new(smallvec![4u64, 4])
            .chunk_grid(vec![2, 2].as_slice())
            .unwrap()
            .push_bb_codec(GzipCodec::default())
            .build()
            .unwrap();
        let arr = Array::create(&store, NodeKey::default(), meta).unwrap();

        let data = range_arr(&[4, 4]);
        arr.write_region(&[0, 0], data.clone()).unwrap();
        assert_eq!(arr.read().unwrap(), data);
    }

    #[cfg(feature = "filesystem")]
    #[test]
    fn filesystem_backed_array() {
        use crate::store::FileSystemStore;
        use tempdir::TempDir;

        let tmp = TempDir::new("array-test").unwrap();
        let fs_store = FileSystemStore::create(tmp.path().join("root.zarr"), true).unwrap();
        let meta = ArrayMetadataBuilder::<f64>::new(smallvec![4u64, 4])
            .chunk_grid(vec![2, 2].as_slice())
            .unwrap()
            .fill_value(0.5)
            .build()
            .unwrap();
        let key: NodeKey = "measurements".parse().unwrap();
        let arr = Array::create(&fs_store, key.clone(), meta).unwrap();

        arr.write_region(&[1, 1], ArcArrayD::from_elem(vec![2, 2], 2.5))
            .unwrap();

        let arr2 = Array::<_, f64>::open(&fs_store, key).unwrap();
        let out = arr2.read().unwrap();
        assert_eq!(out[[1, 1]], 2.5);
        assert_eq!(out[[0, 0]], 0.5);
    }
}
