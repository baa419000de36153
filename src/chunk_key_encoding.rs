use std::fmt::Display;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::store::NodeKey;
use crate::GridCoord;

/// Derives store keys from chunk grid coordinates, and back.
pub trait ChunkKeyEncoder {
    fn encode_chunk_key(&self, coord: &[u64]) -> String;

    /// None when the string is not a chunk key under this encoding.
    fn decode_chunk_key(&self, key: &str) -> Option<GridCoord>;

    /// The store key of a chunk within the node at `array_key`.
    fn chunk_key(&self, array_key: &NodeKey, coord: &[u64]) -> NodeKey {
        let mut key = array_key.clone();
        for part in self.encode_chunk_key(coord).split('/') {
            key.push(part.parse().expect("chunk key components are valid names"));
        }
        key
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    #[serde(rename = "/")]
    Slash,
    #[serde(rename = ".")]
    Dot,
}

impl Separator {
    fn as_char(&self) -> char {
        match self {
            Separator::Slash => '/',
            Separator::Dot => '.',
        }
    }
}

impl Display for Separator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

fn slash() -> Separator {
    Separator::Slash
}

fn dot() -> Separator {
    Separator::Dot
}

fn join_coords(coord: &[u64], sep: Separator) -> String {
    coord.iter().map(|n| n.to_string()).join(&sep.to_string())
}

fn split_coords(s: &str, sep: Separator) -> Option<GridCoord> {
    s.split(sep.as_char())
        .map(|part| part.parse().ok())
        .collect()
}

/// `"c"` followed by separator-joined coordinates; bare `"c"` for rank-0.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DefaultChunkKeyEncoding {
    #[serde(default = "slash")]
    separator: Separator,
}

impl Default for DefaultChunkKeyEncoding {
    fn default() -> Self {
        Self { separator: slash() }
    }
}

impl ChunkKeyEncoder for DefaultChunkKeyEncoding {
    fn encode_chunk_key(&self, coord: &[u64]) -> String {
        format!("c{}", join_coords(coord, self.separator))
    }

    fn decode_chunk_key(&self, key: &str) -> Option<GridCoord> {
        let rest = key.strip_prefix('c')?;
        if rest.is_empty() {
            return Some(GridCoord::default());
        }
        split_coords(rest, self.separator)
    }
}

/// Separator-joined coordinates with no prefix; `"0"` for rank-0.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct V2ChunkKeyEncoding {
    #[serde(default = "dot")]
    separator: Separator,
}

impl Default for V2ChunkKeyEncoding {
    fn default() -> Self {
        Self { separator: dot() }
    }
}

impl ChunkKeyEncoder for V2ChunkKeyEncoding {
    fn encode_chunk_key(&self, coord: &[u64]) -> String {
        if coord.is_empty() {
            "0".to_string()
        } else {
            join_coords(coord, self.separator)
        }
    }

    fn decode_chunk_key(&self, key: &str) -> Option<GridCoord> {
        split_coords(key, self.separator)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "name", content = "configuration", rename_all = "lowercase")]
pub enum ChunkKeyEncoding {
    Default(DefaultChunkKeyEncoding),
    V2(V2ChunkKeyEncoding),
}

impl Default for ChunkKeyEncoding {
    fn default() -> Self {
        Self::Default(DefaultChunkKeyEncoding::default())
    }
}

impl ChunkKeyEncoding {
    pub fn new_default(separator: Separator) -> Self {
        Self::Default(DefaultChunkKeyEncoding { separator })
    }

    pub fn new_v2(separator: Separator) -> Self {
        Self::V2(V2ChunkKeyEncoding { separator })
    }
}

impl ChunkKeyEncoder for ChunkKeyEncoding {
    fn encode_chunk_key(&self, coord: &[u64]) -> String {
        match self {
            Self::Default(e) => e.encode_chunk_key(coord),
            Self::V2(e) => e.encode_chunk_key(coord),
        }
    }

    fn decode_chunk_key(&self, key: &str) -> Option<GridCoord> {
        match self {
            Self::Default(e) => e.decode_chunk_key(key),
            Self::V2(e) => e.decode_chunk_key(key),
        }
    }
}
