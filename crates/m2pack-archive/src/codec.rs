//! Blob encoding pipeline shared by file payloads, the file list and the
//! file table.
//!
//! Encoding: optional zlib, AES-256-CTR with the pair selected by the
//! compressed size, then base64. Decoding reverses the steps, choosing the
//! key from the *stored* compressed size and decompressing only when the
//! stored plaintext size differs from it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::compress;
use crate::crypto;
use crate::{Error, PackVersion, Result};

/// An encoded blob plus the size fields the reader needs to decode it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Base64 ciphertext
    pub data: Vec<u8>,
    /// Plaintext length
    pub size: u64,
    /// Length after compression, equal to `size` when stored
    pub compressed_size: u64,
    /// Length of `data`
    pub encoded_size: u64,
}

impl Encoded {
    /// Whether compression was kept for this blob.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.size != self.compressed_size
    }
}

/// Encode a blob for the given pack version.
///
/// With `compress` set, the zlib stream is kept only when strictly smaller
/// than the plaintext, since equal sizes mean "stored".
pub fn encode(version: PackVersion, plaintext: &[u8], compress: bool) -> Result<Encoded> {
    let size = plaintext.len() as u64;

    let compressed = if compress && !plaintext.is_empty() {
        let deflated = compress::compress_zlib(plaintext)?;
        (deflated.len() < plaintext.len()).then_some(deflated)
    } else {
        None
    };

    let mut payload = compressed.unwrap_or_else(|| plaintext.to_vec());
    let compressed_size = payload.len() as u64;

    let (iv, key) = version.key_pair(compressed_size);
    crypto::apply_keystream(iv, key, &mut payload);

    let data = STANDARD.encode(&payload).into_bytes();
    let encoded_size = data.len() as u64;

    Ok(Encoded {
        data,
        size,
        compressed_size,
        encoded_size,
    })
}

/// Decode a blob using its stored size fields.
pub fn decode(
    version: PackVersion,
    encoded: &[u8],
    compressed_size: u64,
    size: u64,
) -> Result<Vec<u8>> {
    let mut payload = decode_base64(encoded)?;

    let (iv, key) = version.key_pair(compressed_size);
    crypto::apply_keystream(iv, key, &mut payload);

    if size != compressed_size {
        return compress::decompress_zlib_sized(&payload, size);
    }

    if payload.len() as u64 != size {
        return Err(Error::SizeMismatch {
            expected: size,
            actual: payload.len() as u64,
        });
    }
    Ok(payload)
}

/// Base64-decode, tolerating CR/LF line breaks.
fn decode_base64(encoded: &[u8]) -> Result<Vec<u8>> {
    if memchr::memchr2(b'\r', b'\n', encoded).is_none() {
        return Ok(STANDARD.decode(encoded)?);
    }

    let joined: Vec<u8> = encoded
        .iter()
        .copied()
        .filter(|&b| b != b'\r' && b != b'\n')
        .collect();
    Ok(STANDARD.decode(joined)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressible_roundtrip() {
        let plaintext = "0123456789".repeat(100);

        for version in PackVersion::ALL {
            let encoded = encode(version, plaintext.as_bytes(), true).unwrap();
            assert!(encoded.is_compressed());
            assert!(encoded.compressed_size < encoded.size);
            assert_eq!(encoded.encoded_size, encoded.data.len() as u64);
            assert_eq!(encoded.encoded_size, encoded.compressed_size.div_ceil(3) * 4);

            let decoded = decode(version, &encoded.data, encoded.compressed_size, encoded.size).unwrap();
            assert_eq!(decoded, plaintext.as_bytes());
        }
    }

    #[test]
    fn test_incompressible_is_stored() {
        let encoded = encode(PackVersion::Ms2f, b"test", true).unwrap();
        assert_eq!(encoded.size, 4);
        assert_eq!(encoded.compressed_size, 4);
        assert_eq!(encoded.data.len(), 8);

        let decoded = decode(PackVersion::Ms2f, &encoded.data, 4, 4).unwrap();
        assert_eq!(decoded, b"test");
    }

    #[test]
    fn test_uncompressed_request() {
        let plaintext = vec![0u8; 512];
        let encoded = encode(PackVersion::Ns2f, &plaintext, false).unwrap();
        assert!(!encoded.is_compressed());
        assert_eq!(decode(PackVersion::Ns2f, &encoded.data, 512, 512).unwrap(), plaintext);
    }

    #[test]
    fn test_empty() {
        let encoded = encode(PackVersion::Ps2f, b"", true).unwrap();
        assert_eq!(encoded.compressed_size, 0);
        assert!(encoded.data.is_empty());
        assert!(decode(PackVersion::Ps2f, b"", 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_key_depends_on_stored_compressed_size() {
        let encoded = encode(PackVersion::Ms2f, b"abcdef", false).unwrap();

        // Claiming a different compressed size selects another pair.
        let wrong = decode(PackVersion::Ms2f, &encoded.data, 7, 7);
        assert!(matches!(wrong, Err(Error::SizeMismatch { .. })));

        // A size congruent modulo 128 selects the same pair but fails the length check.
        let same_slot = decode(PackVersion::Ms2f, &encoded.data, 6 + 128, 6 + 128);
        assert!(matches!(same_slot, Err(Error::SizeMismatch { expected: 134, actual: 6 })));
    }

    #[test]
    fn test_wrong_version_does_not_decode() {
        let plaintext = "abc".repeat(200);
        let encoded = encode(PackVersion::Os2f, plaintext.as_bytes(), true).unwrap();
        let result = decode(PackVersion::Ps2f, &encoded.data, encoded.compressed_size, encoded.size);
        assert!(result.map_or(true, |decoded| decoded != plaintext.as_bytes()));
    }

    #[test]
    fn test_malformed_base64() {
        assert!(matches!(
            decode(PackVersion::Ms2f, b"!!!!", 3, 3),
            Err(Error::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_line_breaks_tolerated() {
        let plaintext = vec![0x5au8; 100];
        let encoded = encode(PackVersion::Ms2f, &plaintext, false).unwrap();

        let mut wrapped = encoded.data.clone();
        wrapped.insert(72, b'\n');
        wrapped.push(b'\n');

        assert_eq!(decode(PackVersion::Ms2f, &wrapped, 100, 100).unwrap(), plaintext);
    }
}
