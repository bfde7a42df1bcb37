//! Per-version IV/key tables.
//!
//! Every pack version carries 128 AES-256 key/IV pairs. A blob is encrypted
//! with the pair at `compressed_size % 128`, where `compressed_size` is the
//! size field stored next to the blob, so a reader can pick the same pair
//! before it has decrypted anything.
//!
//! The tables live in `keys/<version>.bin`: 128 16-byte IVs followed by 128
//! 32-byte keys. They are split into arrays at compile time.
//!
//! The shipped tables are deterministic placeholders, not the game client's
//! keys. Archives packed with them round-trip through this crate but are
//! not readable by the client, and client archives will not decode here.
//! To work with real archives, replace each file with the client's table in
//! the same 6144-byte layout and rebuild.

/// Number of key/IV pairs per pack version.
pub const KEY_COUNT: usize = 128;

/// AES-CTR IV length in bytes.
pub const IV_SIZE: usize = 16;

/// AES-256 key length in bytes.
pub const KEY_SIZE: usize = 32;

const TABLE_SIZE: usize = KEY_COUNT * (IV_SIZE + KEY_SIZE);

/// The 128 key/IV pairs of one pack version.
#[derive(Debug)]
pub struct KeyTable {
    ivs: [[u8; IV_SIZE]; KEY_COUNT],
    keys: [[u8; KEY_SIZE]; KEY_COUNT],
}

impl KeyTable {
    const fn from_raw(raw: &[u8; TABLE_SIZE]) -> Self {
        let mut ivs = [[0u8; IV_SIZE]; KEY_COUNT];
        let mut keys = [[0u8; KEY_SIZE]; KEY_COUNT];

        let mut slot = 0;
        while slot < KEY_COUNT {
            let mut i = 0;
            while i < IV_SIZE {
                ivs[slot][i] = raw[slot * IV_SIZE + i];
                i += 1;
            }

            let key_base = KEY_COUNT * IV_SIZE + slot * KEY_SIZE;
            let mut i = 0;
            while i < KEY_SIZE {
                keys[slot][i] = raw[key_base + i];
                i += 1;
            }
            slot += 1;
        }

        Self { ivs, keys }
    }

    /// Table slot selected by a stored size field.
    #[inline]
    pub const fn slot(size: u64) -> usize {
        (size % KEY_COUNT as u64) as usize
    }

    /// IV/key pair for a stored size field.
    #[inline]
    pub fn pair(&self, size: u64) -> (&[u8; IV_SIZE], &[u8; KEY_SIZE]) {
        let slot = Self::slot(size);
        (&self.ivs[slot], &self.keys[slot])
    }
}

pub(crate) static MS2F_KEYS: KeyTable = KeyTable::from_raw(include_bytes!("../keys/ms2f.bin"));
pub(crate) static NS2F_KEYS: KeyTable = KeyTable::from_raw(include_bytes!("../keys/ns2f.bin"));
pub(crate) static OS2F_KEYS: KeyTable = KeyTable::from_raw(include_bytes!("../keys/os2f.bin"));
pub(crate) static PS2F_KEYS: KeyTable = KeyTable::from_raw(include_bytes!("../keys/ps2f.bin"));
