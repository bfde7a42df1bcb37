//! Pack archive writer.

use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::codec;
use crate::file_list::FileList;
use crate::header::{ArchiveHeader, CompressionType, FileEntry};
use crate::{Error, PackVersion, Result};

/// Streams file payloads into a data stream and assembles the header stream.
///
/// Files get consecutive indices starting at 1 in the order they are added.
///
/// # Example
///
/// ```
/// use m2pack_archive::{PackArchive, PackVersion, PackWriter};
///
/// let mut writer = PackWriter::new(PackVersion::Ms2f, Vec::new());
/// writer.add_file("a.txt", b"test")?;
/// let (header, data) = writer.finish()?;
///
/// let archive = PackArchive::from_bytes(&header, data)?;
/// assert_eq!(archive.read_index(0)?, b"test");
/// # Ok::<(), m2pack_archive::Error>(())
/// ```
pub struct PackWriter<W: Write> {
    version: PackVersion,
    data: W,
    /// Bytes written to `data` so far
    offset: u64,
    entries: Vec<FileEntry>,
    file_list: FileList,
}

impl<W: Write> PackWriter<W> {
    /// Create a writer appending payloads to `data`.
    pub fn new(version: PackVersion, data: W) -> Self {
        Self {
            version,
            data,
            offset: 0,
            entries: Vec::new(),
            file_list: FileList::new(),
        }
    }

    /// Pack version being written.
    #[inline]
    pub fn version(&self) -> PackVersion {
        self.version
    }

    /// Number of files added so far.
    #[inline]
    pub fn file_count(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Records written so far.
    #[inline]
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Encode a file and append it to the data stream.
    ///
    /// Returns the file's index. `path` must not contain `,`, CR or LF, since
    /// the file list could not give it back unchanged.
    pub fn add_file(&mut self, path: &str, contents: &[u8]) -> Result<u64> {
        if path.is_empty() || path.contains([',', '\r', '\n']) {
            return Err(Error::UnrepresentablePath(PathBuf::from(path)));
        }

        let index = self.file_count() + 1;
        let encoded = codec::encode(self.version, contents, true)?;

        let compression = if encoded.is_compressed() {
            CompressionType::Deflate
        } else {
            CompressionType::Store
        };
        let entry = FileEntry {
            file_index: index,
            offset: self.offset,
            size: encoded.size,
            compressed_size: encoded.compressed_size,
            encoded_size: encoded.encoded_size,
            compression: compression as u32,
        };
        trace!(index, path, ?entry, "adding file");

        self.data.write_all(&encoded.data)?;
        self.offset += encoded.encoded_size;
        self.file_list.insert(index, path)?;
        self.entries.push(entry);

        Ok(index)
    }

    /// Encode the file list and file table and build the header stream.
    ///
    /// Returns the header stream bytes and the flushed data sink.
    pub fn finish(mut self) -> Result<(Vec<u8>, W)> {
        let file_list = self.file_list.encode(self.version)?;

        let table = self.version.write_file_table(&self.entries)?;
        let fat = codec::encode(self.version, &table, true)?;

        let header = ArchiveHeader {
            total_files: self.file_count(),
            file_list_size: file_list.size,
            file_list_compressed_size: file_list.compressed_size,
            file_list_encoded_size: file_list.encoded_size,
            fat_size: fat.size,
            fat_compressed_size: fat.compressed_size,
            fat_encoded_size: fat.encoded_size,
        };
        debug!(version = %self.version, ?header, "writing stream header");

        let mut out = Vec::with_capacity(
            4 + self.version.header_size() + file_list.data.len() + fat.data.len(),
        );
        out.extend_from_slice(self.version.magic());
        self.version.write_header(&header, &mut out)?;
        out.extend_from_slice(&file_list.data);
        out.extend_from_slice(&fat.data);

        self.data.flush()?;
        Ok((out, self.data))
    }
}
