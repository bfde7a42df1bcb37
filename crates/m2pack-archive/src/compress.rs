//! zlib compression for pack payloads.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::{Error, Result};

/// Compress data with zlib at the default level.
pub fn compress_zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| Error::Compression(e.to_string()))?;
    encoder.finish().map_err(|e| Error::Compression(e.to_string()))
}

/// Upfront reservation is at most this multiple of the compressed length.
const RESERVE_RATIO: u64 = 4;

fn reserve_hint(compressed_len: usize, expected_size: u64) -> usize {
    expected_size.min((compressed_len as u64).saturating_mul(RESERVE_RATIO)) as usize
}

/// Decompress zlib data with known output size.
///
/// Output past `expected_size` is discarded; a shorter stream is an error.
pub fn decompress_zlib_sized(data: &[u8], expected_size: u64) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(reserve_hint(data.len(), expected_size));
    ZlibDecoder::new(data)
        .take(expected_size)
        .read_to_end(&mut output)
        .map_err(|e| Error::Decompression(e.to_string()))?;

    if output.len() as u64 != expected_size {
        return Err(Error::SizeMismatch {
            expected: expected_size,
            actual: output.len() as u64,
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_roundtrip() {
        let original = b"Hello, World! Hello, World! Hello, World! Hello, World!";

        let compressed = compress_zlib(original).unwrap();
        assert_eq!(compressed[0], 0x78);

        let decompressed = decompress_zlib_sized(&compressed, original.len() as u64).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_trims_to_expected_size() {
        let compressed = compress_zlib(b"abcdefgh").unwrap();
        assert_eq!(decompress_zlib_sized(&compressed, 4).unwrap(), b"abcd");
    }

    #[test]
    fn test_short_stream_is_error() {
        let compressed = compress_zlib(b"abc").unwrap();
        assert!(matches!(
            decompress_zlib_sized(&compressed, 10),
            Err(Error::SizeMismatch { expected: 10, actual: 3 })
        ));
    }

    #[test]
    fn test_reservation_follows_input() {
        assert_eq!(reserve_hint(10, 1 << 40), 40);
        assert_eq!(reserve_hint(10, 25), 25);
        assert_eq!(reserve_hint(0, u64::MAX), 0);

        let compressed = compress_zlib(b"tiny").unwrap();
        assert!(matches!(
            decompress_zlib_sized(&compressed, 1 << 40),
            Err(Error::SizeMismatch { expected, actual: 4 }) if expected == 1 << 40
        ));
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(matches!(
            decompress_zlib_sized(&[0xde, 0xad, 0xbe, 0xef, 0x00], 16),
            Err(Error::Decompression(_))
        ));
    }
}
