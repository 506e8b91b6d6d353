//! Transport decoding for parts sent with `Content-Transfer-Encoding: base64`.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use bytes::Bytes;

use crate::stages::StageError;

/// Standard alphabet, padding optional on the final quantum.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Whether a part's transfer encoding needs decoding before anything else sees the bytes.
pub fn requires_decoding(encoding: &str) -> bool {
    encoding.trim().eq_ignore_ascii_case("base64")
}

/// Incremental base64 decoder.
///
/// ASCII whitespace (line breaks from MIME encoders) is ignored. Input that does not
/// fill a complete 4-character quantum is carried to the next chunk.
#[derive(Debug, Default)]
pub struct Base64Decoder {
    carry: Vec<u8>,
}

impl Base64Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Bytes, StageError> {
        self.carry
            .extend(chunk.iter().copied().filter(|b| !b.is_ascii_whitespace()));

        let ready = self.carry.len() / 4 * 4;
        if ready == 0 {
            return Ok(Bytes::new());
        }

        let decoded = LENIENT
            .decode(&self.carry[..ready])
            .map_err(|e| StageError::Decode(e.to_string()))?;
        self.carry.drain(..ready);
        Ok(Bytes::from(decoded))
    }

    pub fn finish(&mut self) -> Result<Bytes, StageError> {
        if self.carry.is_empty() {
            return Ok(Bytes::new());
        }
        let decoded = LENIENT
            .decode(&self.carry)
            .map_err(|e| StageError::Decode(e.to_string()))?;
        self.carry.clear();
        Ok(Bytes::from(decoded))
    }
}
