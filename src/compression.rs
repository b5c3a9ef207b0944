//! LZ4 framing for cache objects
//!
//! Objects written to the local cache are framed with a 4-byte header:
//!
//! - `LZ4O` followed by LZ4 data with a prepended size
//! - `\0\0\0\0` followed by the raw content
//!
//! The raw form is used when compression is disabled, when the content is too
//! small to benefit, or when compressing did not shrink it. Both forms are
//! always readable regardless of the configured strategy, so changing the
//! strategy never invalidates an existing cache.

use crate::error::{OutputError, Result};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};
use tracing::trace;

const LZ4_MAGIC: &[u8; 4] = b"LZ4O";
const RAW_MAGIC: &[u8; 4] = &[0, 0, 0, 0];

/// Below this size content is always stored raw
const MIN_COMPRESS_SIZE: usize = 64;

/// How cache objects are compressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrategy {
    /// Store objects raw
    None,
    /// LZ4 when it helps (default)
    #[default]
    Fast,
}

/// Stateless compression engine for cache objects
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionEngine {
    strategy: CompressionStrategy,
}

impl CompressionEngine {
    /// Create a new engine with the given strategy
    pub fn new(strategy: CompressionStrategy) -> Self {
        Self { strategy }
    }

    /// Configured strategy
    pub fn strategy(&self) -> CompressionStrategy {
        self.strategy
    }

    /// Frame content for storage
    pub fn compress(&self, content: &[u8]) -> Vec<u8> {
        if self.strategy == CompressionStrategy::Fast && content.len() >= MIN_COMPRESS_SIZE {
            let compressed = compress_prepend_size(content);
            if compressed.len() < content.len() {
                trace!("Compressed {} -> {} bytes", content.len(), compressed.len());
                return frame(LZ4_MAGIC, &compressed);
            }
        }
        frame(RAW_MAGIC, content)
    }

    /// Recover content from a framed object
    ///
    /// # Errors
    ///
    /// - [`OutputError::Decompression`] if the header is unknown or the LZ4
    ///   payload is corrupt
    pub fn decompress(&self, framed: &[u8]) -> Result<Vec<u8>> {
        if framed.len() < 4 {
            return Err(OutputError::Decompression("object shorter than header".to_string()));
        }
        let (header, body) = framed.split_at(4);
        if header == RAW_MAGIC {
            Ok(body.to_vec())
        } else if header == LZ4_MAGIC {
            decompress_size_prepended(body).map_err(|e| OutputError::Decompression(e.to_string()))
        } else {
            Err(OutputError::Decompression(format!("unknown object header {:?}", header)))
        }
    }
}

fn frame(magic: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(magic.len() + body.len());
    out.extend_from_slice(magic);
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_content_stored_raw() {
        let engine = CompressionEngine::new(CompressionStrategy::Fast);
        let framed = engine.compress(b"a,b\n1,2\n");
        assert_eq!(&framed[..4], RAW_MAGIC);
        assert_eq!(engine.decompress(&framed).unwrap(), b"a,b\n1,2\n");
    }

    #[test]
    fn test_repetitive_content_compressed() {
        let engine = CompressionEngine::new(CompressionStrategy::Fast);
        let content = b"col_a,col_b\n".repeat(200);
        let framed = engine.compress(&content);
        assert_eq!(&framed[..4], LZ4_MAGIC);
        assert!(framed.len() < content.len());
        assert_eq!(engine.decompress(&framed).unwrap(), content);
    }

    #[test]
    fn test_none_strategy_reads_compressed_objects() {
        let fast = CompressionEngine::new(CompressionStrategy::Fast);
        let none = CompressionEngine::new(CompressionStrategy::None);
        let content = b"x".repeat(4096);

        assert_eq!(&none.compress(&content)[..4], RAW_MAGIC);
        assert_eq!(none.decompress(&fast.compress(&content)).unwrap(), content);
    }

    #[test]
    fn test_corrupt_header() {
        let engine = CompressionEngine::default();
        assert!(engine.decompress(b"XYZW1234").is_err());
        assert!(engine.decompress(b"LZ").is_err());
    }
}
