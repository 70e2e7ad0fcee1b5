//! FlateDecode (zlib) — the only stream filter an xref stream or object
//! stream is allowed to use (§4.3, §4.6).

use crate::error::{Error, Result};
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Decompress zlib-wrapped deflate data.
///
/// Tolerates truncated streams the way real-world PDF generators produce
/// them: if decompression runs out of input partway through, whatever was
/// recovered before the failure is returned rather than discarded, since a
/// partial xref/object stream is still more useful than none.
pub fn decode(input: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(input);
    let mut output = Vec::new();
    match decoder.read_to_end(&mut output) {
        Ok(_) => Ok(output),
        Err(e) => {
            if output.is_empty() {
                Err(Error::Decode(format!("FlateDecode failed: {}", e)))
            } else {
                log::warn!("FlateDecode: partial recovery of {} bytes after: {}", output.len(), e);
                Ok(output)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn zlib_compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let original = b"hello xref stream world, xref stream, xref stream";
        let compressed = zlib_compress(original);
        let decoded = decode(&compressed).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_garbage_errors() {
        let result = decode(b"not zlib data at all");
        assert!(result.is_err());
    }
}
