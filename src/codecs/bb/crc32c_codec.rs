use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use crc32c::crc32c;
use serde::{Deserialize, Serialize};

use super::BBCodec;
use crate::error::{ArrayError, MalformedError};

const CHECKSUM_NBYTES: usize = 4;

/// Appends a little-endian CRC32C of the payload; verified and stripped
/// on decode.
#[derive(Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Debug, Default)]
pub struct Crc32cCodec {}

impl BBCodec for Crc32cCodec {
    fn encode(&self, decoded: &[u8]) -> Result<Bytes, ArrayError> {
        let mut out = Vec::with_capacity(decoded.len() + CHECKSUM_NBYTES);
        out.extend_from_slice(decoded);
        let mut suffix = [0u8; CHECKSUM_NBYTES];
        LittleEndian::write_u32(&mut suffix, crc32c(decoded));
        out.extend_from_slice(&suffix);
        Ok(out.into())
    }

    fn decode(&self, encoded: &[u8]) -> Result<Bytes, ArrayError> {
        if encoded.len() < CHECKSUM_NBYTES {
            return Err(MalformedError::ChunkLength {
                expected: CHECKSUM_NBYTES,
                actual: encoded.len(),
            }
            .into());
        }
        let (payload, suffix) = encoded.split_at(encoded.len() - CHECKSUM_NBYTES);
        let stored = LittleEndian::read_u32(suffix);
        let computed = crc32c(payload);
        if stored != computed {
            return Err(MalformedError::ChecksumMismatch { stored, computed }.into());
        }
        Ok(Bytes::copy_from_slice(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let codec = Crc32cCodec::default();
        let payload = b"some chunk bytes";
        let encoded = codec.encode(payload).unwrap();
        assert_eq!(encoded.len(), payload.len() + CHECKSUM_NBYTES);
        assert_eq!(&codec.decode(&encoded).unwrap()[..], payload);
    }

    #[test]
    fn corruption_detected() {
        let codec = Crc32cCodec::default();
        let mut encoded = codec.encode(b"some chunk bytes").unwrap().to_vec();
        encoded[3] ^= 0xff;
        assert!(matches!(
            codec.decode(&encoded),
            Err(ArrayError::Malformed(MalformedError::ChecksumMismatch { .. }))
        ));
    }

    #[test]
    fn truncated_object_rejected() {
        let codec = Crc32cCodec::default();
        assert!(codec.decode(&[1, 2]).is_err());
    }
}
