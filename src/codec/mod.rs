//! Payload codec: bzip2 compression wrapped in standard base64.
//!
//! Tokens are plain ASCII so they can be embedded verbatim in a shell script
//! and decoded on the node with `base64 -d | bunzip2`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bzip2::{read::BzDecoder, write::BzEncoder, Compression};
use std::io::{Read, Write};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid base64 token: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Decompression failed: {0}")]
    Decompression(String),
}

/// Compresses and encodes arbitrary bytes into a text token.
pub fn encode(content: &[u8]) -> Result<String, CodecError> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(content)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Reverses [`encode`]. Surrounding whitespace in the token is ignored.
pub fn decode(token: &str) -> Result<Vec<u8>, CodecError> {
    let compressed = STANDARD.decode(token.trim())?;
    let mut decoder = BzDecoder::new(compressed.as_slice());
    let mut content = Vec::new();
    decoder
        .read_to_end(&mut content)
        .map_err(|e| CodecError::Decompression(e.to_string()))?;
    Ok(content)
}
