//! Packing a directory tree into an archive.

use std::ffi::OsString;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, trace};
use walkdir::WalkDir;

use crate::archive::{DATA_EXTENSION, HEADER_EXTENSION};
use crate::writer::PackWriter;
use crate::{Error, PackVersion, Result};

/// In-memory header and data streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedArchive {
    /// Header stream (`.m2h`)
    pub header: Vec<u8>,
    /// Data stream (`.m2d`)
    pub data: Vec<u8>,
}

/// Files below `folder` in packing order, paired with their archive paths.
///
/// The walk is depth-first with entries sorted by file name at each level and
/// directory symlinks followed. Archive streams found in the tree are skipped.
pub fn collect_files(folder: &Path) -> Result<Vec<(PathBuf, String)>> {
    let metadata = match fs::metadata(folder) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FolderNotFound(folder.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_dir() {
        return Err(Error::NotADirectory(folder.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if is_archive_stream(entry.path()) {
            trace!(path = %entry.path().display(), "skipping archive stream");
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(folder)
            .map_err(|_| Error::UnrepresentablePath(entry.path().to_path_buf()))?;
        let name = archive_path(relative)?;
        files.push((entry.into_path(), name));
    }

    Ok(files)
}

/// Pack every file below `folder` into `data`, returning the header stream.
pub fn pack_folder_into<W: Write>(
    folder: &Path,
    version: PackVersion,
    data: W,
) -> Result<(Vec<u8>, W)> {
    let files = collect_files(folder)?;
    info!(folder = %folder.display(), %version, files = files.len(), "packing folder");

    let mut writer = PackWriter::new(version, data);
    for (path, name) in &files {
        let contents = fs::read(path)?;
        let index = writer.add_file(name, &contents)?;
        debug!(index, name = %name, size = contents.len(), "packed file");
    }

    writer.finish()
}

/// Pack every file below `folder` into in-memory streams.
pub fn pack_folder<P: AsRef<Path>>(folder: P, version: PackVersion) -> Result<PackedArchive> {
    let (header, data) = pack_folder_into(folder.as_ref(), version, Vec::new())?;
    Ok(PackedArchive { header, data })
}

/// Pack `folder` into `<parent>/<name>.m2h` and `<parent>/<name>.m2d`.
///
/// Both streams are staged as temporary files beside their targets and
/// only renamed into place once packing succeeds, so a failed run leaves
/// any previous archive untouched.
///
/// Returns the header and data stream paths.
pub fn pack_folder_to_files<P: AsRef<Path>>(
    folder: P,
    version: PackVersion,
) -> Result<(PathBuf, PathBuf)> {
    let folder = folder.as_ref();
    let (header_path, data_path) = output_paths(folder)?;
    let parent = data_path
        .parent()
        .ok_or_else(|| Error::UnrepresentablePath(data_path.clone()))?;

    let data = BufWriter::new(NamedTempFile::new_in(parent)?);
    let (header, data) = pack_folder_into(folder, version, data)?;
    let data = data.into_inner().map_err(|e| e.into_error())?;

    let mut header_file = NamedTempFile::new_in(parent)?;
    header_file.write_all(&header)?;

    data.persist(&data_path).map_err(|e| e.error)?;
    header_file.persist(&header_path).map_err(|e| e.error)?;

    info!(
        header = %header_path.display(),
        data = %data_path.display(),
        "wrote archive"
    );
    Ok((header_path, data_path))
}

/// Stream paths written next to `folder`.
pub fn output_paths(folder: &Path) -> Result<(PathBuf, PathBuf)> {
    let absolute = match folder.canonicalize() {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FolderNotFound(folder.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let (parent, name) = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => (parent, name),
        _ => return Err(Error::UnrepresentablePath(absolute.clone())),
    };

    let with_extension = |extension: &str| {
        let mut file_name = OsString::from(name);
        file_name.push(".");
        file_name.push(extension);
        parent.join(file_name)
    };
    Ok((
        with_extension(HEADER_EXTENSION),
        with_extension(DATA_EXTENSION),
    ))
}

fn is_archive_stream(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ext.eq_ignore_ascii_case(HEADER_EXTENSION) || ext.eq_ignore_ascii_case(DATA_EXTENSION)
        })
        .unwrap_or(false)
}

/// Join the normal components of a relative path with `/`.
fn archive_path(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => return Err(Error::UnrepresentablePath(relative.to_path_buf())),
            },
            _ => return Err(Error::UnrepresentablePath(relative.to_path_buf())),
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PackArchive;

    fn write(root: &Path, relative: &str, contents: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_walk_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.txt", b"b");
        write(dir.path(), "a/z.txt", b"z");
        write(dir.path(), "a/sub/y.txt", b"y");
        write(dir.path(), "c/x.txt", b"x");

        let names: Vec<String> = collect_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        assert_eq!(names, ["a/sub/y.txt", "a/z.txt", "b.txt", "c/x.txt"]);
    }

    #[test]
    fn test_skips_archive_streams() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.txt", b"keep");
        write(dir.path(), "old.m2h", b"header");
        write(dir.path(), "old.M2D", b"data");

        let files = collect_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, "keep.txt");
    }

    #[test]
    fn test_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            pack_folder(&missing, PackVersion::Ms2f),
            Err(Error::FolderNotFound(_))
        ));
    }

    #[test]
    fn test_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "file.txt", b"x");
        assert!(matches!(
            pack_folder(dir.path().join("file.txt"), PackVersion::Ms2f),
            Err(Error::NotADirectory(_))
        ));
    }

    #[test]
    fn test_pack_folder_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", b"test");
        write(dir.path(), "nested/b.bin", &[7u8; 300]);

        let packed = pack_folder(dir.path(), PackVersion::Os2f).unwrap();
        let archive = PackArchive::from_bytes(&packed.header, packed.data).unwrap();

        assert_eq!(archive.entry_count(), 2);
        assert_eq!(archive.read(archive.find("a.txt").unwrap()).unwrap(), b"test");
        assert_eq!(
            archive.read(archive.find("nested/b.bin").unwrap()).unwrap(),
            vec![7u8; 300]
        );
    }

    #[test]
    fn test_output_paths() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Textures.v2");
        fs::create_dir(&folder).unwrap();

        let (header, data) = output_paths(&folder).unwrap();
        let parent = dir.path().canonicalize().unwrap();
        assert_eq!(header, parent.join("Textures.v2.m2h"));
        assert_eq!(data, parent.join("Textures.v2.m2d"));
    }
}
