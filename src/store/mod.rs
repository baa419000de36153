use std::fmt::Display;
use std::io;
use std::str::FromStr;

use bytes::Bytes;
use itertools::Itertools;
use log::warn;
use smallvec::SmallVec;

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "filesystem")]
pub mod filesystem;
#[cfg(feature = "filesystem")]
pub use filesystem::FileSystemStore;

const NODE_KEY_SIZE: usize = 10;
pub const METADATA_NAME: &str = "zarr.json";
pub(crate) const KEY_SEP: &str = "/";

fn metadata_name() -> NodeName {
    METADATA_NAME.parse().unwrap()
}

/// A single component of a store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeName(String);

#[derive(thiserror::Error, Debug)]
pub enum InvalidNodeName {
    #[error("node name is empty string")]
    Empty,
    #[error("node name contains '/'")]
    HasSlash,
    #[error("node name is comprised only of periods")]
    IsPeriods,
    #[error("node name starts with reserved prefix '__'")]
    ReservedPrefix,
}

impl NodeName {
    pub fn new(s: String) -> Result<Self, InvalidNodeName> {
        Self::validate(&s)?;
        Ok(Self(s))
    }

    fn validate(s: &str) -> Result<(), InvalidNodeName> {
        let mut is_periods = true;
        let mut is_underscore = true;
        let mut has_non_recommended = false;
        let mut len: usize = 0;
        for c in s.chars() {
            if is_periods && c != '.' {
                is_periods = false;
            }
            if is_underscore {
                if len >= 2 {
                    return Err(InvalidNodeName::ReservedPrefix);
                }
                if c != '_' {
                    is_underscore = false;
                }
            }
            if c == '/' {
                return Err(InvalidNodeName::HasSlash);
            }

            if !has_non_recommended && !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.'
            {
                has_non_recommended = true;
                warn!(
                    "Node name has non-recommended character `{}`; prefer `a-z`, `A-Z`, `0-9`, `-`, `_`, `.`",
                    c
                );
            }

            len += 1;
        }
        if len == 0 {
            return Err(InvalidNodeName::Empty);
        }
        if is_periods {
            return Err(InvalidNodeName::IsPeriods);
        }
        Ok(())
    }
}

impl Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for NodeName {
    type Err = InvalidNodeName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_owned())
    }
}

/// A store key: a possibly-empty sequence of validated name components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodeKey(SmallVec<[NodeName; NODE_KEY_SIZE]>);

impl NodeKey {
    /// Adds a new key component in-place.
    ///
    /// Returns the new number of components.
    pub fn push(&mut self, name: NodeName) -> usize {
        self.0.push(name);
        self.0.len()
    }

    /// Pop the last key component.
    ///
    /// None if we are at the root.
    pub fn pop(&mut self) -> Option<NodeName> {
        self.0.pop()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether this key starts with (or equals) the other key.
    pub fn starts_with(&self, other: &NodeKey) -> bool {
        self.len() >= other.len() && &self.as_slice()[..other.len()] == other.as_slice()
    }

    /// The components of this key below the given prefix.
    ///
    /// None if this key does not start with the prefix.
    pub fn strip_prefix(&self, prefix: &NodeKey) -> Option<&[NodeName]> {
        self.starts_with(prefix)
            .then(|| &self.as_slice()[prefix.len()..])
    }

    pub fn with_metadata(&mut self) -> usize {
        self.push(metadata_name())
    }

    pub fn as_slice(&self) -> &[NodeName] {
        self.0.as_slice()
    }

    /// Encode the key as a string by joining its parts with `/`.
    pub fn encode(&self) -> String {
        self.0.iter().map(|n| n.as_ref()).join(KEY_SEP)
    }
}

impl Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromIterator<NodeName> for NodeKey {
    fn from_iter<T: IntoIterator<Item = NodeName>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromStr for NodeKey {
    type Err = InvalidNodeName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut k = Self::default();
        for n in s.split(KEY_SEP) {
            k.push(NodeName::new(n.to_owned())?);
        }
        Ok(k)
    }
}

impl AsRef<[NodeName]> for NodeKey {
    fn as_ref(&self) -> &[NodeName] {
        &self.0
    }
}

/// A byte range within a stored object.
///
/// The end is exclusive; negative endpoints count back from the end of
/// the object; unspecified endpoints mean "start" and "end" respectively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl ByteRange {
    pub fn new(start: impl Into<Option<i64>>, end: impl Into<Option<i64>>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// The trailing `nbytes` of the object.
    pub fn suffix(nbytes: u64) -> Self {
        Self::new(-(nbytes as i64), None)
    }

    fn offset(point: i64, len: usize) -> usize {
        if point < 0 {
            len.saturating_sub(point.unsigned_abs() as usize)
        } else {
            (point as usize).min(len)
        }
    }

    /// Clamped `(start, end)` offsets within an object of the given length.
    pub fn to_bounds(&self, len: usize) -> (usize, usize) {
        let start = self.start.map(|s| Self::offset(s, len)).unwrap_or(0);
        let end = self.end.map(|e| Self::offset(e, len)).unwrap_or(len);
        (start, end.max(start))
    }

    pub fn slice_of(&self, value: &Bytes) -> Bytes {
        let (start, end) = self.to_bounds(value.len());
        value.slice(start..end)
    }
}

/// Key-addressed binary blob service with byte-range support.
///
/// All operations are visible to subsequent operations from the same
/// caller once they return; cross-caller visibility follows the backing
/// store. Missing keys are `Ok(None)`, all other failures are fatal.
pub trait Store: Send + Sync {
    /// Get a whole object.
    fn get(&self, key: &NodeKey) -> io::Result<Option<Bytes>>;

    /// Get a subrange of an object.
    ///
    /// The default implementation reads the whole object and slices it;
    /// implementors with cheaper ranged reads should replace it.
    fn get_range(&self, key: &NodeKey, range: ByteRange) -> io::Result<Option<Bytes>> {
        Ok(self.get(key)?.map(|b| range.slice_of(&b)))
    }

    /// Replace an object.
    fn set(&self, key: &NodeKey, value: Bytes) -> io::Result<()>;

    /// Positional overwrite within an existing object.
    ///
    /// The object must exist and be at least `offset + value.len()` long.
    fn set_range(&self, key: &NodeKey, offset: u64, value: Bytes) -> io::Result<()> {
        let existing = self
            .get(key)?
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
        self.set(key, buf.into())
    }

    /// Idempotent removal.
    fn erase(&self, key: &NodeKey) -> io::Result<()>;

    fn exists(&self, key: &NodeKey) -> io::Result<bool> {
        self.get(key).map(|o| o.is_some())
    }
}

pub trait ListableStore: Store {
    /// Retrieve all keys in the store.
    fn list(&self) -> io::Result<Vec<NodeKey>> {
        self.list_prefix(&NodeKey::default())
    }

    /// Retrieve all keys under a given prefix.
    fn list_prefix(&self, prefix: &NodeKey) -> io::Result<Vec<NodeKey>> {
        let mut to_visit = vec![prefix.clone()];
        let mut result = vec![];

        while let Some(next) = to_visit.pop() {
            let (keys, prefixes) = self.list_dir(&next)?;
            result.extend(keys);
            to_visit.extend(prefixes);
        }

        Ok(result)
    }

    /// Retrieve the keys and child prefixes directly under a prefix.
    fn list_dir(&self, prefix: &NodeKey) -> io::Result<(Vec<NodeKey>, Vec<NodeKey>)>;

    /// Delete all objects whose keys start with the given prefix.
    fn erase_prefix(&self, prefix: &NodeKey) -> io::Result<()> {
        for key in self.list_prefix(prefix)? {
            self.erase(&key)?;
        }
        Ok(())
    }
}
