//! The file list: index to relative path mapping stored in the header stream.
//!
//! Plaintext form is one `"<index>,<path>\r\n"` line per file. Readers take
//! the index from before the first comma and the path from after the last
//! comma, so a path containing a comma loses everything up to its last comma.

use std::collections::BTreeMap;

use crate::codec::{self, Encoded};
use crate::{Error, PackVersion, Result};

/// Mapping from 1-based file index to relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileList {
    entries: BTreeMap<u64, String>,
}

impl FileList {
    /// Create an empty file list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, rejecting an index that is already present.
    pub fn insert(&mut self, index: u64, path: impl Into<String>) -> Result<()> {
        use std::collections::btree_map::Entry;

        match self.entries.entry(index) {
            Entry::Occupied(_) => Err(Error::DuplicateFileIndex(index)),
            Entry::Vacant(slot) => {
                slot.insert(path.into());
                Ok(())
            }
        }
    }

    /// Path for an index.
    pub fn get(&self, index: u64) -> Option<&str> {
        self.entries.get(&index).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> + '_ {
        self.entries.iter().map(|(&index, path)| (index, path.as_str()))
    }

    /// Whether the indices are exactly `1..=count`.
    pub fn is_dense(&self, count: u64) -> bool {
        self.entries.len() as u64 == count
            && self.entries.keys().zip(1..).all(|(&index, expected)| index == expected)
    }

    /// Render the plaintext form.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for (index, path) in &self.entries {
            text.push_str(&index.to_string());
            text.push(',');
            text.push_str(path);
            text.push_str("\r\n");
        }
        text
    }

    /// Parse the plaintext form.
    pub fn parse(text: &[u8]) -> Result<Self> {
        let mut list = Self::new();

        for line in text
            .split(|&b| b == b'\r' || b == b'\n')
            .filter(|line| !line.is_empty())
        {
            let (first, last) = match (memchr::memchr(b',', line), memchr::memrchr(b',', line)) {
                (Some(first), Some(last)) => (first, last),
                _ => return Err(malformed(line, "missing comma")),
            };

            let digits = &line[..first];
            let index = Some(digits)
                .filter(|digits| !digits.is_empty() && digits.iter().all(u8::is_ascii_digit))
                .and_then(|digits| std::str::from_utf8(digits).ok())
                .and_then(|digits| digits.parse::<u64>().ok())
                .ok_or_else(|| malformed(line, "index is not a non-negative integer"))?;

            let path = String::from_utf8_lossy(&line[last + 1..]).into_owned();
            list.insert(index, path)?;
        }

        Ok(list)
    }

    /// Encode the plaintext form for the header stream.
    pub fn encode(&self, version: PackVersion) -> Result<Encoded> {
        codec::encode(version, self.to_text().as_bytes(), true)
    }

    /// Decode and parse a file list blob.
    pub fn decode(
        version: PackVersion,
        encoded: &[u8],
        compressed_size: u64,
        size: u64,
    ) -> Result<Self> {
        let text = codec::decode(version, encoded, compressed_size, size)?;
        Self::parse(&text)
    }
}

fn malformed(line: &[u8], reason: &'static str) -> Error {
    Error::MalformedFileListEntry {
        line: String::from_utf8_lossy(line).into_owned(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let mut list = FileList::new();
        list.insert(2, "b/c.xml").unwrap();
        list.insert(1, "a.txt").unwrap();
        assert_eq!(list.to_text(), "1,a.txt\r\n2,b/c.xml\r\n");
    }

    #[test]
    fn test_parse_separators() {
        let list = FileList::parse(b"1,a.txt\r\n\r\n2,b.txt\n3,c.txt\r\r\n").unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(1), Some("a.txt"));
        assert_eq!(list.get(3), Some("c.txt"));
        assert!(list.is_dense(3));
    }

    #[test]
    fn test_path_after_last_comma() {
        let list = FileList::parse(b"1,a.txt\r\n2,notes, v1.txt\r\n").unwrap();
        assert_eq!(list.get(2), Some(" v1.txt"));
    }

    #[test]
    fn test_missing_comma() {
        assert!(matches!(
            FileList::parse(b"1,a.txt\r\nbroken\r\n"),
            Err(Error::MalformedFileListEntry { reason: "missing comma", .. })
        ));
    }

    #[test]
    fn test_bad_index() {
        for line in [
            &b"-1,a.txt\r\n"[..],
            b"x,a.txt\r\n",
            b"+1,a.txt\r\n",
            b" 1,a.txt\r\n",
            b"1 ,a.txt\r\n",
            b",a.txt\r\n",
            b"18446744073709551616,a.txt\r\n",
        ] {
            assert!(
                matches!(FileList::parse(line), Err(Error::MalformedFileListEntry { .. })),
                "accepted {:?}",
                String::from_utf8_lossy(line)
            );
        }
        assert_eq!(FileList::parse(b"007,a.txt\r\n").unwrap().get(7), Some("a.txt"));
    }

    #[test]
    fn test_duplicate_index() {
        assert!(matches!(
            FileList::parse(b"1,a.txt\r\n1,b.txt\r\n"),
            Err(Error::DuplicateFileIndex(1))
        ));
    }

    #[test]
    fn test_dense() {
        let list = FileList::parse(b"1,a\r\n3,c\r\n").unwrap();
        assert!(!list.is_dense(2));
        assert!(!list.is_dense(3));
        assert!(FileList::new().is_dense(0));
    }

    #[test]
    fn test_encode_decode() {
        let mut list = FileList::new();
        for i in 1..=50 {
            list.insert(i, format!("Data/Resource/Image/item_{i:04}.png")).unwrap();
        }

        let encoded = list.encode(PackVersion::Ns2f).unwrap();
        assert!(encoded.is_compressed());

        let decoded = FileList::decode(
            PackVersion::Ns2f,
            &encoded.data,
            encoded.compressed_size,
            encoded.size,
        )
        .unwrap();
        assert_eq!(decoded, list);
    }
}
