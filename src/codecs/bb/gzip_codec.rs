use std::io::{Read, Write};

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;
use serde::{Deserialize, Serialize};

use super::BBCodec;
use crate::error::{ArrayError, MalformedError};

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Debug)]
pub struct GzipCodec {
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl BBCodec for GzipCodec {
    fn encode(&self, decoded: &[u8]) -> Result<Bytes, ArrayError> {
        let mut encoder = GzEncoder::new(Vec::default(), GzCompression::new(self.level));
        encoder.write_all(decoded).map_err(ArrayError::Io)?;
        Ok(encoder.finish().map_err(ArrayError::Io)?.into())
    }

    fn decode(&self, encoded: &[u8]) -> Result<Bytes, ArrayError> {
        let mut decoder = GzDecoder::new(encoded);
        let mut out = Vec::default();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| MalformedError::Compression(e.to_string()))?;
        Ok(out.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let codec = GzipCodec::default();
        let payload: Vec<u8> = (0..255).cycle().take(4096).collect();
        let encoded = codec.encode(&payload).unwrap();
        assert!(encoded.len() < payload.len());
        assert_eq!(&codec.decode(&encoded).unwrap()[..], payload.as_slice());
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = GzipCodec::default();
        assert!(matches!(
            codec.decode(b"not a gzip stream"),
            Err(ArrayError::Malformed(MalformedError::Compression(_)))
        ));
    }
}
