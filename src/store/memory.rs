use std::collections::HashMap;
use std::io;

use bytes::Bytes;
use parking_lot::RwLock;

use super::{ByteRange, ListableStore, NodeKey, Store};

/// In-memory store backed by a hash map.
///
/// Intended for tests and scratch data; contents are lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<NodeKey, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &NodeKey) -> io::Result<Option<Bytes>> {
        let map = self.map.read();
        // Bytes clones are reference-counted
        Ok(map.get(key).cloned())
    }

    fn get_range(&self, key: &NodeKey, range: ByteRange) -> io::Result<Option<Bytes>> {
        let map = self.map.read();
        Ok(map.get(key).map(|b| range.slice_of(b)))
    }

    fn set(&self, key: &NodeKey, value: Bytes) -> io::Result<()> {
        let mut map = self.map.write();
        map.insert(key.clone(), value);
        Ok(())
    }

    fn set_range(&self, key: &NodeKey, offset: u64, value: Bytes) -> io::Result<()> {
        let mut map = self.map.write();
        let existing = map
            .get(key)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no object to overwrite"))?;
        let end = offset as usize + value.len();
        if existing.len() < end {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "object is too short for positional overwrite",
            ));
        }
        let mut buf = existing.to_vec();
        buf[offset as usize..end].copy_from_slice(&value);
        map.insert(key.clone(), buf.into());
        Ok(())
    }

    fn erase(&self, key: &NodeKey) -> io::Result<()> {
        let mut map = self.map.write();
        map.remove(key);
        Ok(())
    }

    fn exists(&self, key: &NodeKey) -> io::Result<bool> {
        let map = self.map.read();
        Ok(map.contains_key(key))
    }
}

impl ListableStore for MemoryStore {
    fn list(&self) -> io::Result<Vec<NodeKey>> {
        let map = self.map.read();
        Ok(map.keys().cloned().collect())
    }

    fn list_prefix(&self, prefix: &NodeKey) -> io::Result<Vec<NodeKey>> {
        let map = self.map.read();
        Ok(map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn list_dir(&self, prefix: &NodeKey) -> io::Result<(Vec<NodeKey>, Vec<NodeKey>)> {
        let map = self.map.read();
        let mut keys = Vec::default();
        let mut prefixes = Vec::default();
        for k in map.keys() {
            let Some(rest) = k.strip_prefix(prefix) else {
                continue;
            };
            match rest.len() {
                0 => (),
                1 => keys.push(k.clone()),
                _ => {
                    let mut p = prefix.clone();
                    p.push(rest[0].clone());
                    if !prefixes.contains(&p) {
                        prefixes.push(p);
                    }
                }
            }
        }
        Ok((keys, prefixes))
    }

    fn erase_prefix(&self, prefix: &NodeKey) -> io::Result<()> {
        let mut map = self.map.write();
        map.retain(|k, _v| !k.starts_with(prefix));
        Ok(())
    }
}
