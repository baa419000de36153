use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chunk_grid::ChunkGridType;
use crate::chunk_key_encoding::ChunkKeyEncoding;
use crate::codecs::aa::AACodecType;
use crate::codecs::ab::ABCodecType;
use crate::codecs::bb::BBCodecType;
use crate::codecs::CodecChain;
use crate::data_type::{DataType, ReflectedType};
use crate::error::{ArgumentError, ArrayError, MalformedError};
use crate::{CoordVec, GridCoord, MaybeNdim, Ndim, ZARR_FORMAT};

pub type JsonObject = HashMap<String, serde_json::Value>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Array,
}

/// The `zarr.json` document describing one array.
///
/// Immutable after creation apart from explicit resize and attribute
/// updates, which rewrite the whole document. Unknown fields are
/// rejected on decode; forward compatibility is not attempted.
///
/// Use the [ArrayMetadataBuilder] to construct this in a convenient way.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArrayMetadata {
    zarr_format: usize,
    node_type: NodeType,
    shape: GridCoord,
    data_type: DataType,
    chunk_grid: ChunkGridType,
    #[serde(default)]
    chunk_key_encoding: ChunkKeyEncoding,
    fill_value: serde_json::Value,
    #[serde(default)]
    codecs: CodecChain,
    #[serde(default)]
    attributes: JsonObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dimension_names: Option<CoordVec<Option<String>>>,
}

impl Ndim for ArrayMetadata {
    fn ndim(&self) -> usize {
        self.shape.len()
    }
}

impl ArrayMetadata {
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn chunk_shape(&self) -> &[u64] {
        self.chunk_grid.chunk_shape()
    }

    pub fn chunk_grid(&self) -> &ChunkGridType {
        &self.chunk_grid
    }

    pub fn chunk_key_encoding(&self) -> &ChunkKeyEncoding {
        &self.chunk_key_encoding
    }

    pub fn codecs(&self) -> &CodecChain {
        &self.codecs
    }

    pub fn fill_value_json(&self) -> &serde_json::Value {
        &self.fill_value
    }

    pub fn attributes(&self) -> &JsonObject {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut JsonObject {
        &mut self.attributes
    }

    pub fn dimension_names(&self) -> Option<&[Option<String>]> {
        self.dimension_names.as_deref()
    }

    pub(crate) fn set_shape(&mut self, shape: GridCoord) {
        self.shape = shape;
    }

    /// The declared fill value as the reflected element type.
    pub fn effective_fill_value<T: ReflectedType>(&self) -> Result<T, MalformedError> {
        T::from_fill_value(&self.fill_value)
            .ok_or_else(|| MalformedError::FillValue(self.fill_value.clone(), self.data_type))
    }

    /// Structural validation beyond what the serde layer enforces.
    pub fn validate(&self) -> Result<(), MalformedError> {
        let invalid = |msg: String| MalformedError::Metadata(msg);

        if self.zarr_format != ZARR_FORMAT {
            return Err(invalid(format!(
                "unsupported zarr_format {}",
                self.zarr_format
            )));
        }
        if self.shape.contains(&0) {
            return Err(invalid("shape contains a zero-length dimension".into()));
        }
        if self.chunk_grid.ndim() != self.ndim() {
            return Err(invalid(format!(
                "chunk grid rank {} does not match array rank {}",
                self.chunk_grid.ndim(),
                self.ndim()
            )));
        }
        if self.chunk_shape().contains(&0) {
            return Err(invalid("chunk shape contains a zero-length dimension".into()));
        }
        if let Some(names) = &self.dimension_names {
            if names.len() != self.ndim() {
                return Err(invalid(format!(
                    "{} dimension names for rank-{} array",
                    names.len(),
                    self.ndim()
                )));
            }
        }
        match self.codecs.validate_ndim() {
            Ok(Some(n)) if n != self.ndim() => {
                return Err(invalid(format!(
                    "codec rank {} does not match array rank {}",
                    n,
                    self.ndim()
                )))
            }
            Ok(_) => (),
            Err(e) => return Err(invalid(e.to_string())),
        }
        if let Some(sharding) = self.codecs.sharding() {
            sharding
                .grid_shape(self.chunk_shape())
                .map_err(|e| invalid(e.to_string()))?;
        }
        self.data_type.validate_fill_value(&self.fill_value)?;
        Ok(())
    }
}

pub struct ArrayMetadataBuilder<T: ReflectedType> {
    shape: GridCoord,
    chunk_grid: Option<ChunkGridType>,
    chunk_key_encoding: Option<ChunkKeyEncoding>,
    fill_value: Option<T>,
    codecs: CodecChain,
    attributes: JsonObject,
    dimension_names: Option<CoordVec<Option<String>>>,
}

impl<T: ReflectedType> Ndim for ArrayMetadataBuilder<T> {
    fn ndim(&self) -> usize {
        self.shape.len()
    }
}

impl<T: ReflectedType> ArrayMetadataBuilder<T> {
    /// Prepare metadata for an array with a shape and the reflected
    /// data type.
    ///
    /// At a minimum, [ArrayMetadataBuilder::chunk_grid] should be
    /// called, as the default behaviour is to have a single chunk for
    /// the entire array.
    pub fn new<C: Into<GridCoord>>(shape: C) -> Self {
        Self {
            shape: shape.into(),
            chunk_grid: None,
            chunk_key_encoding: None,
            fill_value: None,
            codecs: CodecChain::default(),
            attributes: JsonObject::default(),
            dimension_names: None,
        }
    }

    /// Set the chunk grid.
    ///
    /// Fails if the chunk grid is incompatible with the array's
    /// dimensionality.
    pub fn chunk_grid<G: Into<ChunkGridType>>(mut self, chunk_grid: G) -> Result<Self, ArrayError> {
        let cg = chunk_grid.into();
        self.union_ndim(&cg)?;
        self.chunk_grid = Some(cg);
        Ok(self)
    }

    /// Set the chunk key encoding.
    ///
    /// By default, uses the default chunk key encoding
    /// (`c`-prefixed, `/`-separated).
    pub fn chunk_key_encoding<E: Into<ChunkKeyEncoding>>(mut self, chunk_key_encoding: E) -> Self {
        self.chunk_key_encoding = Some(chunk_key_encoding.into());
        self
    }

    /// Set the fill value.
    ///
    /// By default, uses the data type's default value, which is
    /// generally `false` or `0`.
    pub fn fill_value(mut self, fill_value: T) -> Self {
        self.fill_value = Some(fill_value);
        self
    }

    /// Set the array->bytes codec.
    ///
    /// Replaces an existing one; by default, a little-endian bytes codec.
    /// Fails if the dimensions are not compatible with the array's shape.
    pub fn ab_codec<C: Into<ABCodecType>>(mut self, codec: C) -> Result<Self, ArrayError> {
        let c = codec.into();
        self.union_ndim(&c)?;
        self.codecs.replace_ab_codec(Some(c));
        Ok(self)
    }

    /// Append an array->array codec.
    ///
    /// This will be the last AA encoder, or first AA decoder.
    ///
    /// Fails if the dimensions are not compatible with the array's shape.
    pub fn push_aa_codec<C: Into<AACodecType>>(mut self, codec: C) -> Result<Self, ArrayError> {
        let c = codec.into();
        self.union_ndim(&c)?;
        self.codecs.aa_codecs_mut().push(c);
        Ok(self)
    }

    /// Append a bytes->bytes codec.
    ///
    /// This will be the last BB encoder, or first BB decoder.
    pub fn push_bb_codec<C: Into<BBCodecType>>(mut self, codec: C) -> Self {
        let c = codec.into();
        self.codecs.bb_codecs_mut().push(c);
        self
    }

    pub fn set_attribute<V: Serialize>(mut self, key: String, value: V) -> Result<Self, ArrayError> {
        let v = serde_json::to_value(value)
            .map_err(|e| MalformedError::Metadata(e.to_string()))?;
        self.attributes.insert(key, v);
        Ok(self)
    }

    /// Set the dimension names.
    ///
    /// Fails if the number of names does not match the array's rank.
    pub fn dimension_names(
        mut self,
        names: CoordVec<Option<String>>,
    ) -> Result<Self, ArrayError> {
        ArgumentError::check_rank(self.shape.len(), names.len())?;
        self.dimension_names = Some(names);
        Ok(self)
    }

    /// Build and validate the [ArrayMetadata].
    pub fn build(self) -> Result<ArrayMetadata, ArrayError> {
        let chunk_grid = self
            .chunk_grid
            .unwrap_or_else(|| ChunkGridType::from(self.shape.as_slice()));
        let fill_value = self
            .fill_value
            .unwrap_or_default()
            .to_fill_value();

        let meta = ArrayMetadata {
            zarr_format: ZARR_FORMAT,
            node_type: NodeType::Array,
            shape: self.shape,
            data_type: T::ZARR_TYPE,
            chunk_grid,
            chunk_key_encoding: self.chunk_key_encoding.unwrap_or_default(),
            fill_value,
            codecs: self.codecs,
            attributes: self.attributes,
            dimension_names: self.dimension_names,
        };
        meta.validate()?;
        Ok(meta)
    }
}
