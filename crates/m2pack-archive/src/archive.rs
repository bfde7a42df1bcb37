//! Pack archive reader.
//!
//! An archive is a header stream (`.m2h`) holding the magic, stream header,
//! encoded file list and encoded file table, plus a data stream (`.m2d`)
//! holding each file's encoded payload at the offset recorded in the table.
//!
//! All metadata is decoded and cross-checked when the archive is opened;
//! payloads are decoded on demand and independently of each other.

use std::fs::{self, File};
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use m2pack_common::BinaryReader;
use memmap2::Mmap;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::codec;
use crate::file_list::FileList;
use crate::header::{ArchiveHeader, FileEntry};
use crate::{Error, PackVersion, Result};

/// Header stream extension.
pub const HEADER_EXTENSION: &str = "m2h";

/// Data stream extension.
pub const DATA_EXTENSION: &str = "m2d";

/// A file in a pack archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    /// Relative path from the file list
    pub name: String,
    /// File table record
    pub record: FileEntry,
}

impl PackEntry {
    /// 1-based file index.
    #[inline]
    pub fn index(&self) -> u64 {
        self.record.file_index
    }

    /// Plaintext size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.record.size
    }
}

/// Counts reported by the extraction helpers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Files written
    pub extracted: usize,
    /// Files that failed to decode or write
    pub errors: usize,
    /// Files in the archive
    pub total: usize,
}

enum DataStream {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for DataStream {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(mmap) => mmap,
            Self::Owned(bytes) => bytes,
        }
    }
}

/// Decoded archive metadata.
struct Metadata {
    version: PackVersion,
    header: ArchiveHeader,
    entries: Vec<PackEntry>,
}

/// A pack archive opened for reading.
pub struct PackArchive {
    /// Data stream contents
    data: DataStream,
    /// Archive name
    name: String,
    /// Pack version from the magic
    version: PackVersion,
    /// Stream header
    header: ArchiveHeader,
    /// Entries in file index order
    entries: Vec<PackEntry>,
}

impl PackArchive {
    /// Open an archive from its header stream path.
    ///
    /// The data stream is the file next to it with the `.m2d` extension.
    pub fn open<P: AsRef<Path>>(header_path: P) -> Result<Self> {
        let header_path = header_path.as_ref();
        let header_bytes = fs::read(header_path)?;
        let metadata = Metadata::parse(&header_bytes)?;

        let data_path = header_path.with_extension(DATA_EXTENSION);
        debug!(path = %data_path.display(), "opening data stream");
        let file = File::open(&data_path)?;
        let data = if file.metadata()?.len() == 0 {
            DataStream::Owned(Vec::new())
        } else {
            DataStream::Mapped(unsafe { Mmap::map(&file)? })
        };

        let name = header_path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Self::assemble(name, metadata, data)
    }

    /// Open an archive from in-memory header and data streams.
    pub fn from_bytes(header: &[u8], data: Vec<u8>) -> Result<Self> {
        let metadata = Metadata::parse(header)?;
        Self::assemble("memory".to_string(), metadata, DataStream::Owned(data))
    }

    fn assemble(name: String, metadata: Metadata, data: DataStream) -> Result<Self> {
        validate_ranges(&metadata.entries, data.len() as u64)?;

        Ok(Self {
            data,
            name,
            version: metadata.version,
            header: metadata.header,
            entries: metadata.entries,
        })
    }

    /// Get the archive name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pack version of this archive.
    #[inline]
    pub fn version(&self) -> PackVersion {
        self.version
    }

    /// Decoded stream header.
    #[inline]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Get the number of entries.
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over entries in file index order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PackEntry> + '_ {
        self.entries.iter()
    }

    /// Get entry by position (file index minus one).
    #[inline]
    pub fn get(&self, index: usize) -> Option<&PackEntry> {
        self.entries.get(index)
    }

    /// Find an entry by path (case-insensitive, either separator).
    pub fn find(&self, name: &str) -> Option<&PackEntry> {
        let normalized = name.replace('\\', "/");
        self.entries
            .iter()
            .find(|e| e.name.replace('\\', "/").eq_ignore_ascii_case(&normalized))
    }

    /// Read and decode an entry's contents.
    pub fn read(&self, entry: &PackEntry) -> Result<Vec<u8>> {
        self.read_record(&entry.record)
            .map_err(|e| e.for_entry(entry.index(), &entry.name))
    }

    /// Read entry by position.
    pub fn read_index(&self, index: usize) -> Result<Vec<u8>> {
        let entry = self.entries.get(index).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "entry index out of bounds",
            ))
        })?;
        self.read(entry)
    }

    /// Decode an entry and write it below `dest`, creating parent folders.
    ///
    /// The file is written next to its target and renamed over it, so an
    /// existing symlink at the target is replaced, never followed.
    pub fn extract_entry<P: AsRef<Path>>(&self, entry: &PackEntry, dest: P) -> Result<PathBuf> {
        let output_path = safe_join(dest.as_ref(), &entry.name)
            .map_err(|e| e.for_entry(entry.index(), &entry.name))?;
        let data = self.read(entry)?;

        let write = || -> Result<()> {
            let parent = output_path.parent().unwrap_or(dest.as_ref());
            fs::create_dir_all(parent)?;

            let mut file = NamedTempFile::new_in(parent)?;
            file.write_all(&data)?;
            file.persist(&output_path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| e.for_entry(entry.index(), &entry.name))?;

        Ok(output_path)
    }

    /// Extract every entry below `dest`, one at a time.
    ///
    /// A failing entry does not stop the others; each result is passed to
    /// `callback`.
    pub fn extract_all<P, F>(&self, dest: P, mut callback: F) -> ExtractStats
    where
        P: AsRef<Path>,
        F: FnMut(&PackEntry, Result<PathBuf>),
    {
        let dest = dest.as_ref();
        let mut stats = ExtractStats {
            total: self.entries.len(),
            ..Default::default()
        };

        for entry in &self.entries {
            let result = self.extract_entry(entry, dest);
            match result {
                Ok(_) => stats.extracted += 1,
                Err(_) => stats.errors += 1,
            }
            callback(entry, result);
        }

        stats
    }

    /// Parallel read of multiple entries.
    #[cfg(feature = "parallel")]
    pub fn read_parallel(&self, entries: &[&PackEntry]) -> Vec<Result<Vec<u8>>> {
        use rayon::prelude::*;

        entries.par_iter().map(|entry| self.read(entry)).collect()
    }

    /// Parallel extraction with a callback per entry.
    #[cfg(feature = "parallel")]
    pub fn extract_parallel<P, F>(&self, dest: P, mut callback: F) -> ExtractStats
    where
        P: AsRef<Path>,
        F: FnMut(&PackEntry, Result<PathBuf>) + Send,
    {
        use std::sync::atomic::{AtomicUsize, Ordering};

        use parking_lot::Mutex;
        use rayon::prelude::*;

        let dest = dest.as_ref();
        let extracted = AtomicUsize::new(0);
        let errors = AtomicUsize::new(0);
        let callback = Mutex::new(&mut callback);

        self.entries.par_iter().for_each(|entry| {
            let result = self.extract_entry(entry, dest);
            match result {
                Ok(_) => extracted.fetch_add(1, Ordering::Relaxed),
                Err(_) => errors.fetch_add(1, Ordering::Relaxed),
            };
            let mut guard = callback.lock();
            (*guard)(entry, result);
        });

        ExtractStats {
            extracted: extracted.load(Ordering::Relaxed),
            errors: errors.load(Ordering::Relaxed),
            total: self.entries.len(),
        }
    }

    fn read_record(&self, record: &FileEntry) -> Result<Vec<u8>> {
        // Ranges were checked against the data stream in `assemble`.
        let start = record.offset as usize;
        let end = start + record.encoded_size as usize;
        trace!(
            index = record.file_index,
            offset = record.offset,
            encoded_size = record.encoded_size,
            "decoding entry"
        );

        codec::decode(
            self.version,
            &self.data[start..end],
            record.compressed_size,
            record.size,
        )
    }
}

impl std::fmt::Debug for PackArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackArchive")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Metadata {
    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::TruncatedHeader {
                needed: 4,
                available: bytes.len(),
            });
        }

        let mut reader = BinaryReader::new(bytes);
        let version = PackVersion::from_magic(reader.read_array::<4>()?)?;
        let header = version.read_header(&mut reader)?;

        debug!(
            %version,
            total_files = header.total_files,
            file_list_size = header.file_list_size,
            file_list_compressed_size = header.file_list_compressed_size,
            file_list_encoded_size = header.file_list_encoded_size,
            fat_size = header.fat_size,
            fat_compressed_size = header.fat_compressed_size,
            fat_encoded_size = header.fat_encoded_size,
            "read stream header"
        );

        let file_list_blob = take_blob(&mut reader, header.file_list_encoded_size)?;
        let file_list = FileList::decode(
            version,
            file_list_blob,
            header.file_list_compressed_size,
            header.file_list_size,
        )?;

        let fat_blob = take_blob(&mut reader, header.fat_encoded_size)?;
        let fat = codec::decode(version, fat_blob, header.fat_compressed_size, header.fat_size)?;
        let mut records = version.read_file_table(&fat, header.total_files)?;
        debug!(records = records.len(), "read file table");

        if !file_list.is_dense(header.total_files) {
            return Err(Error::InconsistentArchive(format!(
                "file list has {} entries but indices must be exactly 1..={}",
                file_list.len(),
                header.total_files
            )));
        }

        records.sort_by_key(|record| record.file_index);
        let table_dense = records
            .iter()
            .zip(1u64..)
            .all(|(record, expected)| record.file_index == expected);
        if !table_dense {
            return Err(Error::InconsistentArchive(format!(
                "file table indices are not exactly 1..={}",
                header.total_files
            )));
        }

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let name = file_list
                .get(record.file_index)
                .ok_or_else(|| {
                    Error::InconsistentArchive(format!(
                        "file {} has no file list entry",
                        record.file_index
                    ))
                })?
                .to_string();
            entries.push(PackEntry { name, record });
        }

        Ok(Self {
            version,
            header,
            entries,
        })
    }
}

/// Take an encoded blob of `len` bytes from the header stream.
fn take_blob<'a>(reader: &mut BinaryReader<'a>, len: u64) -> Result<&'a [u8]> {
    let needed = usize::try_from(len).unwrap_or(usize::MAX);
    if reader.remaining() < needed {
        return Err(Error::TruncatedHeader {
            needed: reader.position().saturating_add(needed),
            available: reader.len(),
        });
    }
    Ok(reader.read_bytes(needed)?)
}

/// Check every payload lies inside the data stream and no two overlap.
fn validate_ranges(entries: &[PackEntry], data_len: u64) -> Result<()> {
    let mut ranges = Vec::with_capacity(entries.len());

    for entry in entries {
        let record = &entry.record;
        match record.end_offset() {
            Some(end) if end <= data_len => {
                if record.encoded_size > 0 {
                    ranges.push((record.offset, end, record.file_index));
                }
            }
            _ => {
                return Err(Error::EntryOutOfBounds {
                    index: record.file_index,
                    offset: record.offset,
                    size: record.encoded_size,
                    data_len,
                })
            }
        }
    }

    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        let (_, prev_end, prev_index) = pair[0];
        let (next_start, _, next_index) = pair[1];
        if next_start < prev_end {
            return Err(Error::InconsistentArchive(format!(
                "files {prev_index} and {next_index} overlap in the data stream"
            )));
        }
    }

    Ok(())
}

/// Join a file list path below `dest`, refusing paths that would escape it.
fn safe_join(dest: &Path, name: &str) -> Result<PathBuf> {
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(Error::UnsafePath(name.to_string()));
    }

    let mut path = dest.to_path_buf();
    let mut components = 0;
    for component in name.split(['/', '\\']) {
        match component {
            "" | "." => continue,
            ".." => return Err(Error::UnsafePath(name.to_string())),
            c if c.contains(':') => return Err(Error::UnsafePath(name.to_string())),
            c => {
                path.push(c);
                components += 1;
            }
        }
    }

    if components == 0 {
        return Err(Error::UnsafePath(name.to_string()));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_join() {
        let dest = Path::new("out");
        assert_eq!(
            safe_join(dest, "Data\\Xml/item.xml").unwrap(),
            Path::new("out").join("Data").join("Xml").join("item.xml")
        );
        assert_eq!(
            safe_join(dest, "./a//b").unwrap(),
            Path::new("out").join("a").join("b")
        );
        assert!(safe_join(dest, "../evil").is_err());
        assert!(safe_join(dest, "a/../../evil").is_err());
        assert!(safe_join(dest, "/etc/passwd").is_err());
        assert!(safe_join(dest, "C:\\Windows").is_err());
        assert!(safe_join(dest, "").is_err());
    }

    fn entry(index: u64, offset: u64, encoded_size: u64) -> PackEntry {
        PackEntry {
            name: format!("{index}.bin"),
            record: FileEntry {
                file_index: index,
                offset,
                encoded_size,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_validate_ranges() {
        let entries = vec![entry(1, 0, 8), entry(2, 8, 4), entry(3, 12, 0)];
        assert!(validate_ranges(&entries, 12).is_ok());

        assert!(matches!(
            validate_ranges(&entries, 11),
            Err(Error::EntryOutOfBounds { index: 2, .. })
        ));

        let overlapping = vec![entry(1, 0, 8), entry(2, 4, 8)];
        assert!(matches!(
            validate_ranges(&overlapping, 16),
            Err(Error::InconsistentArchive(_))
        ));

        let wrapping = vec![entry(1, u64::MAX, 2)];
        assert!(matches!(
            validate_ranges(&wrapping, 16),
            Err(Error::EntryOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_short_header_stream() {
        assert!(matches!(
            PackArchive::from_bytes(b"MS", Vec::new()),
            Err(Error::TruncatedHeader { needed: 4, available: 2 })
        ));
    }

    #[test]
    fn test_unknown_magic() {
        let mut header = b"XS2F".to_vec();
        header.extend_from_slice(&[0u8; 64]);
        assert!(matches!(
            PackArchive::from_bytes(&header, Vec::new()),
            Err(Error::UnknownFormat(magic)) if &magic == b"XS2F"
        ));
    }
}
