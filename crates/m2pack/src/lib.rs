//! m2pack - MapleStory2 pack archive library.
//!
//! This crate provides a unified interface to the m2pack crates.
//!
//! # Crates
//!
//! - [`m2pack_common`] - Common utilities (binary reading)
//! - [`m2pack_archive`] - `.m2h`/`.m2d` archive reading and writing
//!
//! # Example
//!
//! ```no_run
//! use m2pack::prelude::*;
//!
//! // Pack a folder next to itself as Xml.m2h / Xml.m2d
//! let (header, _) = pack_folder_to_files("Data/Xml", PackVersion::Ns2f)?;
//!
//! // Open it again and extract everything
//! let archive = PackArchive::open(&header)?;
//! let stats = archive.extract_all("Expanded/Xml", |_, _| {});
//! println!("{} of {} files extracted", stats.extracted, stats.total);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use m2pack_archive as archive;
pub use m2pack_common as common;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use m2pack_archive::{
        pack_folder, pack_folder_to_files, ArchiveHeader, ExtractStats, FileEntry, FileList,
        PackArchive, PackEntry, PackVersion, PackWriter, PackedArchive, DATA_EXTENSION,
        HEADER_EXTENSION,
    };
    pub use m2pack_common::BinaryReader;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
