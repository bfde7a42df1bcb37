//! Reader and writer for MapleStory2 pack archives.
//!
//! An archive is a pair of files: a header stream (`.m2h`) and a data stream
//! (`.m2d`). Four variants exist, identified by the header magic:
//!
//! - `MS2F` - 60-byte stream header, 44-byte file records
//! - `NS2F`, `OS2F`, `PS2F` - 52-byte stream header, 36-byte file records
//!
//! Every blob (file payload, file list, file table) is optionally zlib
//! compressed, encrypted with AES-256-CTR using an (IV, key) pair picked by
//! its compressed size, then base64 encoded.
//!
//! # Example
//!
//! ```no_run
//! use m2pack_archive::{pack_folder_to_files, PackArchive, PackVersion};
//!
//! let (header, _data) = pack_folder_to_files("Data/Xml", PackVersion::Ms2f)?;
//!
//! let archive = PackArchive::open(&header)?;
//! for entry in archive.iter() {
//!     println!("{}: {} bytes", entry.name, entry.size());
//! }
//!
//! if let Some(entry) = archive.find("string/stringcommon.xml") {
//!     let data = archive.read(entry)?;
//! }
//! # Ok::<(), m2pack_archive::Error>(())
//! ```

mod archive;
pub mod codec;
mod compress;
pub mod crypto;
mod error;
mod file_list;
mod folder;
pub mod header;
mod keys;
mod version;
mod writer;

pub use archive::{ExtractStats, PackArchive, PackEntry, DATA_EXTENSION, HEADER_EXTENSION};
pub use codec::Encoded;
pub use error::{Error, Result};
pub use file_list::FileList;
pub use folder::{
    collect_files, output_paths, pack_folder, pack_folder_into, pack_folder_to_files,
    PackedArchive,
};
pub use header::{ArchiveHeader, CompressionType, FileEntry};
pub use keys::{KeyTable, IV_SIZE, KEY_COUNT, KEY_SIZE};
pub use version::PackVersion;
pub use writer::PackWriter;
