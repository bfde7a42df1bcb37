//! Pack versions.
//!
//! A pack is identified by the 4-byte magic at the start of its header stream.
//! The four known versions share one structure and differ in their stream
//! header layout, file record layout and key tables.

use std::fmt;
use std::str::FromStr;

use crate::keys::{KeyTable, IV_SIZE, KEY_SIZE, MS2F_KEYS, NS2F_KEYS, OS2F_KEYS, PS2F_KEYS};
use crate::{Error, Result};

/// One of the four known pack versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackVersion {
    /// `MS2F`, the original layout with 64-bit file counts.
    Ms2f,
    /// `NS2F`
    Ns2f,
    /// `OS2F`
    Os2f,
    /// `PS2F`
    Ps2f,
}

impl PackVersion {
    /// All known versions.
    pub const ALL: [PackVersion; 4] = [Self::Ms2f, Self::Ns2f, Self::Os2f, Self::Ps2f];

    /// Resolve a header stream magic.
    pub fn from_magic(magic: [u8; 4]) -> Result<Self> {
        match &magic {
            b"MS2F" => Ok(Self::Ms2f),
            b"NS2F" => Ok(Self::Ns2f),
            b"OS2F" => Ok(Self::Os2f),
            b"PS2F" => Ok(Self::Ps2f),
            _ => Err(Error::UnknownFormat(magic)),
        }
    }

    /// Magic written at the start of the header stream.
    #[inline]
    pub const fn magic(self) -> &'static [u8; 4] {
        match self {
            Self::Ms2f => b"MS2F",
            Self::Ns2f => b"NS2F",
            Self::Os2f => b"OS2F",
            Self::Ps2f => b"PS2F",
        }
    }

    /// Magic as text.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ms2f => "MS2F",
            Self::Ns2f => "NS2F",
            Self::Os2f => "OS2F",
            Self::Ps2f => "PS2F",
        }
    }

    /// Key/IV table for this version.
    #[inline]
    pub fn key_table(self) -> &'static KeyTable {
        match self {
            Self::Ms2f => &MS2F_KEYS,
            Self::Ns2f => &NS2F_KEYS,
            Self::Os2f => &OS2F_KEYS,
            Self::Ps2f => &PS2F_KEYS,
        }
    }

    /// IV and key selected by a stored compressed size.
    #[inline]
    pub fn key_pair(self, size: u64) -> (&'static [u8; IV_SIZE], &'static [u8; KEY_SIZE]) {
        self.key_table().pair(size)
    }
}

impl fmt::Display for PackVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PackVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let magic: [u8; 4] = s
            .to_ascii_uppercase()
            .as_bytes()
            .try_into()
            .map_err(|_| Error::UnknownFormat(padded_magic(s.as_bytes())))?;
        Self::from_magic(magic)
    }
}

fn padded_magic(bytes: &[u8]) -> [u8; 4] {
    let mut magic = [b' '; 4];
    for (dst, src) in magic.iter_mut().zip(bytes) {
        *dst = *src;
    }
    magic
}
