//! Stream header and file table layouts.
//!
//! All on-disk integers are little-endian and records are packed without
//! padding. `MS2F` uses 64-bit file counts and a leading reserved word;
//! `NS2F`, `OS2F` and `PS2F` share a narrower layout.

use m2pack_common::BinaryReader;
use zerocopy::byteorder::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{Error, PackVersion, Result};

/// Compression flag stored in each file record.
///
/// The flag is informational only: a record is compressed exactly when its
/// `size` differs from its `compressed_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CompressionType {
    /// Stored as-is.
    Store = 0,
    /// zlib-wrapped DEFLATE.
    Deflate = 8,
}

impl TryFrom<u32> for CompressionType {
    type Error = u32;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Store),
            8 => Ok(Self::Deflate),
            other => Err(other),
        }
    }
}

/// Stream header, independent of the on-disk layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Number of files in the archive
    pub total_files: u64,
    /// Plaintext file list length
    pub file_list_size: u64,
    /// File list length after compression (equal to `file_list_size` if stored)
    pub file_list_compressed_size: u64,
    /// Base64 file list length
    pub file_list_encoded_size: u64,
    /// Plaintext file table length
    pub fat_size: u64,
    /// File table length after compression
    pub fat_compressed_size: u64,
    /// Base64 file table length
    pub fat_encoded_size: u64,
}

/// A file table record, independent of the on-disk layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileEntry {
    /// 1-based index shared with the file list
    pub file_index: u64,
    /// Offset of the encoded payload in the data stream
    pub offset: u64,
    /// Plaintext size
    pub size: u64,
    /// Size after compression (equal to `size` if stored)
    pub compressed_size: u64,
    /// Base64 payload size in the data stream
    pub encoded_size: u64,
    /// Raw compression flag
    pub compression: u32,
}

impl FileEntry {
    /// Whether the payload was compressed before encryption.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.size != self.compressed_size
    }

    /// Decoded compression flag, or the raw value if unknown.
    pub fn compression_type(&self) -> std::result::Result<CompressionType, u32> {
        CompressionType::try_from(self.compression)
    }

    /// End of the encoded payload in the data stream.
    #[inline]
    pub fn end_offset(&self) -> Option<u64> {
        self.offset.checked_add(self.encoded_size)
    }
}

/// `MS2F` stream header (follows the magic).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Ms2fStreamHeader {
    /// Always zero
    pub reserved: U32,
    pub file_list_compressed_size: U64,
    pub file_list_encoded_size: U64,
    pub file_list_size: U64,
    pub fat_compressed_size: U64,
    pub fat_encoded_size: U64,
    pub fat_size: U64,
    pub total_files: U64,
}

/// `NS2F`/`OS2F`/`PS2F` stream header (follows the magic).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Ns2fStreamHeader {
    pub total_files: U32,
    pub file_list_compressed_size: U64,
    pub file_list_encoded_size: U64,
    pub file_list_size: U64,
    pub fat_compressed_size: U64,
    pub fat_encoded_size: U64,
    pub fat_size: U64,
}

/// `MS2F` file table record.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Ms2fFileHeader {
    /// Always zero
    pub reserved: U32,
    pub file_index: U32,
    pub compression: U32,
    pub offset: U64,
    pub encoded_size: U64,
    pub compressed_size: U64,
    pub size: U64,
}

/// `NS2F`/`OS2F`/`PS2F` file table record.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Ns2fFileHeader {
    pub compression: U32,
    pub file_index: U32,
    pub encoded_size: U32,
    pub compressed_size: U64,
    pub size: U64,
    pub offset: U64,
}

fn narrow(field: &'static str, value: u64) -> Result<U32> {
    u32::try_from(value)
        .map(U32::new)
        .map_err(|_| Error::FieldOverflow { field, value })
}

impl From<Ms2fStreamHeader> for ArchiveHeader {
    fn from(raw: Ms2fStreamHeader) -> Self {
        Self {
            total_files: raw.total_files.get(),
            file_list_size: raw.file_list_size.get(),
            file_list_compressed_size: raw.file_list_compressed_size.get(),
            file_list_encoded_size: raw.file_list_encoded_size.get(),
            fat_size: raw.fat_size.get(),
            fat_compressed_size: raw.fat_compressed_size.get(),
            fat_encoded_size: raw.fat_encoded_size.get(),
        }
    }
}

impl From<&ArchiveHeader> for Ms2fStreamHeader {
    fn from(header: &ArchiveHeader) -> Self {
        Self {
            reserved: U32::new(0),
            file_list_compressed_size: U64::new(header.file_list_compressed_size),
            file_list_encoded_size: U64::new(header.file_list_encoded_size),
            file_list_size: U64::new(header.file_list_size),
            fat_compressed_size: U64::new(header.fat_compressed_size),
            fat_encoded_size: U64::new(header.fat_encoded_size),
            fat_size: U64::new(header.fat_size),
            total_files: U64::new(header.total_files),
        }
    }
}

impl From<Ns2fStreamHeader> for ArchiveHeader {
    fn from(raw: Ns2fStreamHeader) -> Self {
        Self {
            total_files: raw.total_files.get() as u64,
            file_list_size: raw.file_list_size.get(),
            file_list_compressed_size: raw.file_list_compressed_size.get(),
            file_list_encoded_size: raw.file_list_encoded_size.get(),
            fat_size: raw.fat_size.get(),
            fat_compressed_size: raw.fat_compressed_size.get(),
            fat_encoded_size: raw.fat_encoded_size.get(),
        }
    }
}

impl TryFrom<&ArchiveHeader> for Ns2fStreamHeader {
    type Error = Error;

    fn try_from(header: &ArchiveHeader) -> Result<Self> {
        Ok(Self {
            total_files: narrow("total_files", header.total_files)?,
            file_list_compressed_size: U64::new(header.file_list_compressed_size),
            file_list_encoded_size: U64::new(header.file_list_encoded_size),
            file_list_size: U64::new(header.file_list_size),
            fat_compressed_size: U64::new(header.fat_compressed_size),
            fat_encoded_size: U64::new(header.fat_encoded_size),
            fat_size: U64::new(header.fat_size),
        })
    }
}

impl From<Ms2fFileHeader> for FileEntry {
    fn from(raw: Ms2fFileHeader) -> Self {
        Self {
            file_index: raw.file_index.get() as u64,
            offset: raw.offset.get(),
            size: raw.size.get(),
            compressed_size: raw.compressed_size.get(),
            encoded_size: raw.encoded_size.get(),
            compression: raw.compression.get(),
        }
    }
}

impl TryFrom<&FileEntry> for Ms2fFileHeader {
    type Error = Error;

    fn try_from(entry: &FileEntry) -> Result<Self> {
        Ok(Self {
            reserved: U32::new(0),
            file_index: narrow("file_index", entry.file_index)?,
            compression: U32::new(entry.compression),
            offset: U64::new(entry.offset),
            encoded_size: U64::new(entry.encoded_size),
            compressed_size: U64::new(entry.compressed_size),
            size: U64::new(entry.size),
        })
    }
}

impl From<Ns2fFileHeader> for FileEntry {
    fn from(raw: Ns2fFileHeader) -> Self {
        Self {
            file_index: raw.file_index.get() as u64,
            offset: raw.offset.get(),
            size: raw.size.get(),
            compressed_size: raw.compressed_size.get(),
            encoded_size: raw.encoded_size.get() as u64,
            compression: raw.compression.get(),
        }
    }
}

impl TryFrom<&FileEntry> for Ns2fFileHeader {
    type Error = Error;

    fn try_from(entry: &FileEntry) -> Result<Self> {
        Ok(Self {
            compression: U32::new(entry.compression),
            file_index: narrow("file_index", entry.file_index)?,
            encoded_size: narrow("encoded_size", entry.encoded_size)?,
            compressed_size: U64::new(entry.compressed_size),
            size: U64::new(entry.size),
            offset: U64::new(entry.offset),
        })
    }
}

impl PackVersion {
    /// Size of the stream header that follows the magic.
    pub const fn header_size(self) -> usize {
        match self {
            Self::Ms2f => std::mem::size_of::<Ms2fStreamHeader>(),
            Self::Ns2f | Self::Os2f | Self::Ps2f => std::mem::size_of::<Ns2fStreamHeader>(),
        }
    }

    /// Size of one file table record.
    pub const fn entry_size(self) -> usize {
        match self {
            Self::Ms2f => std::mem::size_of::<Ms2fFileHeader>(),
            Self::Ns2f | Self::Os2f | Self::Ps2f => std::mem::size_of::<Ns2fFileHeader>(),
        }
    }

    /// Read the stream header that follows the magic.
    pub fn read_header(self, reader: &mut BinaryReader<'_>) -> Result<ArchiveHeader> {
        let needed = self.header_size();
        if reader.remaining() < needed {
            return Err(Error::TruncatedHeader {
                needed: reader.position() + needed,
                available: reader.len(),
            });
        }

        let header: ArchiveHeader = match self {
            Self::Ms2f => reader.read_struct::<Ms2fStreamHeader>()?.into(),
            Self::Ns2f | Self::Os2f | Self::Ps2f => reader.read_struct::<Ns2fStreamHeader>()?.into(),
        };
        Ok(header)
    }

    /// Append the stream header (without magic) to `out`.
    pub fn write_header(self, header: &ArchiveHeader, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Ms2f => out.extend_from_slice(Ms2fStreamHeader::from(header).as_bytes()),
            Self::Ns2f | Self::Os2f | Self::Ps2f => {
                out.extend_from_slice(Ns2fStreamHeader::try_from(header)?.as_bytes())
            }
        }
        Ok(())
    }

    /// Parse `total_files` consecutive records from a decoded file table.
    ///
    /// Trailing bytes past the last record are ignored.
    pub fn read_file_table(self, bytes: &[u8], total_files: u64) -> Result<Vec<FileEntry>> {
        let entry_size = self.entry_size();
        let needed = usize::try_from(total_files)
            .ok()
            .and_then(|count| count.checked_mul(entry_size))
            .unwrap_or(usize::MAX);

        if bytes.len() < needed {
            return Err(Error::TruncatedTable {
                needed,
                available: bytes.len(),
            });
        }

        let mut reader = BinaryReader::new(&bytes[..needed]);
        let mut entries = Vec::with_capacity(needed / entry_size.max(1));
        while !reader.is_empty() {
            let entry: FileEntry = match self {
                Self::Ms2f => reader.read_struct::<Ms2fFileHeader>()?.into(),
                Self::Ns2f | Self::Os2f | Self::Ps2f => reader.read_struct::<Ns2fFileHeader>()?.into(),
            };
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Serialize records into a plaintext file table.
    pub fn write_file_table(self, entries: &[FileEntry]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(entries.len() * self.entry_size());
        for entry in entries {
            match self {
                Self::Ms2f => out.extend_from_slice(Ms2fFileHeader::try_from(entry)?.as_bytes()),
                Self::Ns2f | Self::Os2f | Self::Ps2f => {
                    out.extend_from_slice(Ns2fFileHeader::try_from(entry)?.as_bytes())
                }
            }
        }
        Ok(out)
    }
}
