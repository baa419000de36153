use std::fmt::{Debug, Display};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::codecs::ab::bytes_codec::Endian;
use crate::error::{CodecChainError, MalformedError};
use crate::ArcArrayD;

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntSize {
    b8,
    b16,
    b32,
    b64,
}

impl IntSize {
    pub fn nbytes(&self) -> usize {
        match self {
            Self::b8 => 1,
            Self::b16 => 2,
            Self::b32 => 4,
            Self::b64 => 8,
        }
    }
}

impl TryFrom<usize> for IntSize {
    type Error = &'static str;

    fn try_from(nbits: usize) -> Result<Self, Self::Error> {
        match nbits {
            8 => Ok(Self::b8),
            16 => Ok(Self::b16),
            32 => Ok(Self::b32),
            64 => Ok(Self::b64),
            _ => Err("Invalid integer width"),
        }
    }
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatSize {
    b32,
    b64,
}

impl FloatSize {
    pub fn nbytes(&self) -> usize {
        match self {
            Self::b32 => 4,
            Self::b64 => 8,
        }
    }
}

impl TryFrom<usize> for FloatSize {
    type Error = &'static str;

    fn try_from(nbits: usize) -> Result<Self, Self::Error> {
        match nbits {
            32 => Ok(Self::b32),
            64 => Ok(Self::b64),
            _ => Err("Invalid float width"),
        }
    }
}

pub trait NBytes {
    /// Number of bytes in the data type.
    fn nbytes(&self) -> usize;

    fn nbits(&self) -> usize {
        self.nbytes() * 8
    }

    fn has_endianness(&self) -> bool {
        self.nbytes() > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Bool,
    Int(IntSize),
    UInt(IntSize),
    Float(FloatSize),
}

impl DataType {
    /// A usable endianness for this data type.
    ///
    /// Uses the given endianness if [Some], a meaningless default for
    /// single-byte types if [None], and errors for multi-byte types
    /// with no endianness configured.
    pub fn valid_endian(&self, endian: Option<Endian>) -> Result<Endian, CodecChainError> {
        match endian {
            Some(e) => Ok(e),
            None if !self.has_endianness() => Ok(Endian::default()),
            None => Err(CodecChainError::MissingEndian(*self)),
        }
    }

    pub fn default_fill_value(&self) -> serde_json::Value {
        match self {
            Self::Bool => serde_json::Value::from(false),
            Self::Int(_) | Self::UInt(_) => serde_json::Value::from(0),
            Self::Float(_) => serde_json::Value::from(0.0),
        }
    }

    /// Checks that the JSON value is representable in this data type.
    pub fn validate_fill_value(&self, value: &serde_json::Value) -> Result<(), MalformedError> {
        let ok = match self {
            Self::Bool => bool::from_fill_value(value).is_some(),
            Self::Int(s) => match s {
                IntSize::b8 => i8::from_fill_value(value).is_some(),
                IntSize::b16 => i16::from_fill_value(value).is_some(),
                IntSize::b32 => i32::from_fill_value(value).is_some(),
                IntSize::b64 => i64::from_fill_value(value).is_some(),
            },
            Self::UInt(s) => match s {
                IntSize::b8 => u8::from_fill_value(value).is_some(),
                IntSize::b16 => u16::from_fill_value(value).is_some(),
                IntSize::b32 => u32::from_fill_value(value).is_some(),
                IntSize::b64 => u64::from_fill_value(value).is_some(),
            },
            Self::Float(s) => match s {
                FloatSize::b32 => f32::from_fill_value(value).is_some(),
                FloatSize::b64 => f64::from_fill_value(value).is_some(),
            },
        };
        if ok {
            Ok(())
        } else {
            Err(MalformedError::FillValue(value.clone(), *self))
        }
    }
}

impl NBytes for DataType {
    fn nbytes(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int(s) | Self::UInt(s) => s.nbytes(),
            Self::Float(s) => s.nbytes(),
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nbits = self.nbits();
        let s = match self {
            Self::Bool => "bool".into(),
            Self::Int(_) => format!("int{nbits}"),
            Self::UInt(_) => format!("uint{nbits}"),
            Self::Float(_) => format!("float{nbits}"),
        };
        write!(f, "{}", s)
    }
}

fn split_str_num(s: &str) -> (&str, Option<usize>) {
    if let Some(idx) = s.find(|c: char| c.is_ascii_digit()) {
        (&s[0..idx], s[idx..].parse().ok())
    } else {
        (s, None)
    }
}

impl FromStr for DataType {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, nbits) = split_str_num(s);
        if let Some(n) = nbits {
            match name {
                "int" => Ok(Self::Int(n.try_into()?)),
                "uint" => Ok(Self::UInt(n.try_into()?)),
                "float" => Ok(Self::Float(n.try_into()?)),
                _ => Err("Unknown data type"),
            }
        } else if s == "bool" {
            Ok(Self::Bool)
        } else {
            Err("Could not parse data type")
        }
    }
}

impl Serialize for DataType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

type PrimitiveEncoder<T> = Box<dyn Fn(T, &mut [u8])>;
type PrimitiveDecoder<T> = Box<dyn Fn(&[u8]) -> T>;

/// Trait implemented by primitive types which are reflected in the
/// supported data type enumeration.
///
/// The supertraits are not necessary for this trait, but remove
/// redundant bounds elsewhere when operating generically over data
/// types. `DeserializeOwned` is needed for metadata `fill_value`.
pub trait ReflectedType:
    Send + Sync + Clone + Copy + Default + serde::de::DeserializeOwned + serde::ser::Serialize + PartialEq + Debug + 'static
{
    const ZARR_TYPE: DataType;

    /// Produce a routine which writes the bytes of a self-typed value
    /// into the given buffer.
    fn encoder(endian: Endian) -> PrimitiveEncoder<Self>;

    /// Produce a routine which reads a self-typed value from the given
    /// byte buffer.
    fn decoder(endian: Endian) -> PrimitiveDecoder<Self>;

    /// Parse a metadata fill value.
    fn from_fill_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Serialize a fill value for the metadata document.
    fn to_fill_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("primitive is always JSON-representable")
    }

    fn write_array_to(array: &ArcArrayD<Self>, buf: &mut Vec<u8>, endian: Endian) {
        let nbytes = Self::ZARR_TYPE.nbytes();
        let encoder = Self::encoder(endian);
        buf.reserve(array.len() * nbytes);
        let mut scratch = vec![0u8; nbytes];
        for val in array.iter() {
            encoder(*val, scratch.as_mut());
            buf.extend_from_slice(scratch.as_slice());
        }
    }

    /// Caller must ensure `bytes.len() == product(shape) * nbytes`.
    fn read_array_from(bytes: &[u8], endian: Endian, shape: &[usize]) -> ArcArrayD<Self> {
        let decoder = Self::decoder(endian);
        let data: Vec<Self> = bytes
            .chunks_exact(Self::ZARR_TYPE.nbytes())
            .map(|c| decoder(c))
            .collect();
        ArcArrayD::from_shape_vec(shape.to_vec(), data)
            .expect("byte length was checked against shape")
    }
}

macro_rules! reflected_primitive {
    ($d_name:expr, $d_type:ty, $bo_read_fn:ident, $bo_write_fn:ident) => {
        impl ReflectedType for $d_type {
            const ZARR_TYPE: DataType = $d_name;

            fn encoder(endian: Endian) -> PrimitiveEncoder<Self> {
                use byteorder::ByteOrder;
                Box::new(match endian {
                    Endian::Big => {
                        |v: Self, buf: &mut [u8]| byteorder::BigEndian::$bo_write_fn(buf, v)
                    }
                    Endian::Little => {
                        |v: Self, buf: &mut [u8]| byteorder::LittleEndian::$bo_write_fn(buf, v)
                    }
                })
            }

            fn decoder(endian: Endian) -> PrimitiveDecoder<Self> {
                use byteorder::ByteOrder;
                Box::new(match endian {
                    Endian::Big => |buf: &[u8]| byteorder::BigEndian::$bo_read_fn(buf),
                    Endian::Little => |buf: &[u8]| byteorder::LittleEndian::$bo_read_fn(buf),
                })
            }
        }
    };
}

macro_rules! reflected_float {
    ($d_name:expr, $d_type:ty, $bo_read_fn:ident, $bo_write_fn:ident) => {
        impl ReflectedType for $d_type {
            const ZARR_TYPE: DataType = $d_name;

            fn encoder(endian: Endian) -> PrimitiveEncoder<Self> {
                use byteorder::ByteOrder;
                Box::new(match endian {
                    Endian::Big => {
                        |v: Self, buf: &mut [u8]| byteorder::BigEndian::$bo_write_fn(buf, v)
                    }
                    Endian::Little => {
                        |v: Self, buf: &mut [u8]| byteorder::LittleEndian::$bo_write_fn(buf, v)
                    }
                })
            }

            fn decoder(endian: Endian) -> PrimitiveDecoder<Self> {
                use byteorder::ByteOrder;
                Box::new(match endian {
                    Endian::Big => |buf: &[u8]| byteorder::BigEndian::$bo_read_fn(buf),
                    Endian::Little => |buf: &[u8]| byteorder::LittleEndian::$bo_read_fn(buf),
                })
            }

            // The metadata document is JSON, which has no literal for the
            // IEEE-754 specials; they round-trip as strings.
            fn from_fill_value(value: &serde_json::Value) -> Option<Self> {
                match value {
                    serde_json::Value::String(s) => match s.as_str() {
                        "NaN" => Some(<$d_type>::NAN),
                        "Infinity" => Some(<$d_type>::INFINITY),
                        "-Infinity" => Some(<$d_type>::NEG_INFINITY),
                        _ => None,
                    },
                    other => serde_json::from_value(other.clone()).ok(),
                }
            }

            fn to_fill_value(&self) -> serde_json::Value {
                if self.is_nan() {
                    serde_json::Value::from("NaN")
                } else if *self == <$d_type>::INFINITY {
                    serde_json::Value::from("Infinity")
                } else if *self == <$d_type>::NEG_INFINITY {
                    serde_json::Value::from("-Infinity")
                } else {
                    serde_json::to_value(self).expect("finite float is JSON-representable")
                }
            }
        }
    };
}

impl ReflectedType for bool {
    const ZARR_TYPE: DataType = DataType::Bool;

    fn encoder(_endian: Endian) -> PrimitiveEncoder<Self> {
        Box::new(|v: Self, buf: &mut [u8]| buf[0] = v.into())
    }

    fn decoder(_endian: Endian) -> PrimitiveDecoder<Self> {
        Box::new(|buf: &[u8]| buf[0] != 0)
    }
}

impl ReflectedType for u8 {
    const ZARR_TYPE: DataType = DataType::UInt(IntSize::b8);

    fn encoder(_endian: Endian) -> PrimitiveEncoder<Self> {
        Box::new(|v: Self, buf: &mut [u8]| buf[0] = v)
    }

    fn decoder(_endian: Endian) -> PrimitiveDecoder<Self> {
        Box::new(|buf: &[u8]| buf[0])
    }
}

impl ReflectedType for i8 {
    const ZARR_TYPE: DataType = DataType::Int(IntSize::b8);

    fn encoder(_endian: Endian) -> PrimitiveEncoder<Self> {
        Box::new(|v: Self, buf: &mut [u8]| buf[0] = v as u8)
    }

    fn decoder(_endian: Endian) -> PrimitiveDecoder<Self> {
        Box::new(|buf: &[u8]| buf[0] as i8)
    }
}

reflected_primitive!(DataType::UInt(IntSize::b16), u16, read_u16, write_u16);
reflected_primitive!(DataType::UInt(IntSize::b32), u32, read_u32, write_u32);
reflected_primitive!(DataType::UInt(IntSize::b64), u64, read_u64, write_u64);
reflected_primitive!(DataType::Int(IntSize::b16), i16, read_i16, write_i16);
reflected_primitive!(DataType::Int(IntSize::b32), i32, read_i32, write_i32);
reflected_primitive!(DataType::Int(IntSize::b64), i64, read_i64, write_i64);
reflected_float!(DataType::Float(FloatSize::b32), f32, read_f32, write_f32);
reflected_float!(DataType::Float(FloatSize::b64), f64, read_f64, write_f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_dtypes() {
        use DataType::*;
        let strs = vec![
            (r#""bool""#, Bool),
            (r#""int8""#, Int(IntSize::b8)),
            (r#""int16""#, Int(IntSize::b16)),
            (r#""int32""#, Int(IntSize::b32)),
            (r#""int64""#, Int(IntSize::b64)),
            (r#""uint8""#, UInt(IntSize::b8)),
            (r#""uint16""#, UInt(IntSize::b16)),
            (r#""uint32""#, UInt(IntSize::b32)),
            (r#""uint64""#, UInt(IntSize::b64)),
            (r#""float32""#, Float(FloatSize::b32)),
            (r#""float64""#, Float(FloatSize::b64)),
        ];
        for (s, expected) in strs {
            let dt: DataType =
                serde_json::from_str(s).unwrap_or_else(|_| panic!("Couldn't parse '{}'", s));
            assert_eq!(dt, expected, "Got {:?}, expected {:?}", dt, expected);

            let s2 = serde_json::to_string(&dt)
                .unwrap_or_else(|_| panic!("Couldn't serialize {:?}", dt));
            assert_eq!(s, &s2, "Got {:?}, expected {:?}", s2, s);
        }
    }

    #[test]
    fn rejects_unknown_dtypes() {
        for s in [r#""float16""#, r#""complex64""#, r#""r8""#, r#""int7""#] {
            assert!(serde_json::from_str::<DataType>(s).is_err(), "parsed {}", s);
        }
    }

    #[test]
    fn can_validate_endian() {
        for dt in [
            DataType::Bool,
            DataType::UInt(IntSize::b8),
            DataType::Int(IntSize::b8),
        ] {
            for e in [Endian::Little, Endian::Big] {
                dt.valid_endian(Some(e)).unwrap();
            }
            dt.valid_endian(None).unwrap();
        }

        for dt in [
            DataType::UInt(IntSize::b16),
            DataType::Int(IntSize::b32),
            DataType::Float(FloatSize::b32),
        ] {
            for e in [Endian::Little, Endian::Big] {
                dt.valid_endian(Some(e)).unwrap();
            }
            assert!(dt.valid_endian(None).is_err());
        }
    }

    #[test]
    fn float_fill_value_specials() {
        let nan = f64::from_fill_value(&serde_json::Value::from("NaN")).unwrap();
        assert!(nan.is_nan());
        assert_eq!(nan.to_fill_value(), serde_json::Value::from("NaN"));

        let inf = f32::from_fill_value(&serde_json::Value::from("Infinity")).unwrap();
        assert_eq!(inf, f32::INFINITY);
        assert_eq!(
            f32::NEG_INFINITY.to_fill_value(),
            serde_json::Value::from("-Infinity")
        );

        assert_eq!(f64::from_fill_value(&serde_json::Value::from(1.5)), Some(1.5));
        assert!(f64::from_fill_value(&serde_json::Value::from("nope")).is_none());
    }

    #[test]
    fn primitive_wire_roundtrip() {
        let arr = ArcArrayD::from_shape_vec(vec![2, 3], vec![1i32, -2, 3, -4, 5, -6]).unwrap();
        for endian in [Endian::Little, Endian::Big] {
            let mut buf = Vec::new();
            i32::write_array_to(&arr, &mut buf, endian);
            assert_eq!(buf.len(), 24);
            let back = i32::read_array_from(&buf, endian, &[2, 3]);
            assert_eq!(arr, back);
        }
    }
}
