//! Payload encryption using AES-256-CTR.
//!
//! The counter is the full 16-byte IV incremented as a big-endian integer.
//! CTR is symmetric, so the same transform encrypts and decrypts.

use cipher::generic_array::GenericArray;
use cipher::{KeyIvInit, StreamCipher};

use crate::keys::{IV_SIZE, KEY_SIZE};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Apply the AES-256-CTR keystream to `data` in place.
pub fn apply_keystream(iv: &[u8; IV_SIZE], key: &[u8; KEY_SIZE], data: &mut [u8]) {
    let key = GenericArray::from_slice(key);
    let iv = GenericArray::from_slice(iv);
    let mut cipher = Aes256Ctr::new(key, iv);
    cipher.apply_keystream(data);
}

/// Encrypt or decrypt to a new buffer.
pub fn transform(iv: &[u8; IV_SIZE], key: &[u8; KEY_SIZE], data: &[u8]) -> Vec<u8> {
    let mut buffer = data.to_vec();
    apply_keystream(iv, key, &mut buffer);
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let iv = [7u8; IV_SIZE];
        let key = [42u8; KEY_SIZE];
        let plaintext = b"not a multiple of the block size";

        let ciphertext = transform(&iv, &key, plaintext);
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(&ciphertext[..], &plaintext[..]);
        assert_eq!(transform(&iv, &key, &ciphertext), plaintext);
    }

    #[test]
    fn test_empty() {
        assert!(transform(&[0; IV_SIZE], &[0; KEY_SIZE], &[]).is_empty());
    }

    #[test]
    fn test_nist_sp800_38a_f5_5() {
        // AES-256 CTR test vector, first block.
        let key = [
            0x60, 0x3d, 0xeb, 0x10, 0x15, 0xca, 0x71, 0xbe, 0x2b, 0x73, 0xae, 0xf0, 0x85, 0x7d,
            0x77, 0x81, 0x1f, 0x35, 0x2c, 0x07, 0x3b, 0x61, 0x08, 0xd7, 0x2d, 0x98, 0x10, 0xa3,
            0x09, 0x14, 0xdf, 0xf4,
        ];
        let iv = [
            0xf0, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa, 0xfb, 0xfc, 0xfd,
            0xfe, 0xff,
        ];
        let plaintext = [
            0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93,
            0x17, 0x2a,
        ];
        let expected = [
            0x60, 0x1e, 0xc3, 0x13, 0x77, 0x57, 0x89, 0xa5, 0xb7, 0xa7, 0xf5, 0x04, 0xbb, 0xf3,
            0xd2, 0x28,
        ];

        assert_eq!(transform(&iv, &key, &plaintext), expected);
    }
}
