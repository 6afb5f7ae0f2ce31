use crate::{Codec, CodecError};

/// Raw (non-framed) snappy decompression, as used by LevelDB-style blocks
pub struct Snappy;

impl Codec for Snappy {
    fn name(&self) -> &str {
        "snappy"
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut decoder = snap::raw::Decoder::new();
        decoder
            .decompress_vec(input)
            .map_err(|e| CodecError::new("snappy", e.to_string()))
    }
}
