//! Archive content summaries
//!
//! A [`ContentSummary`] records every regular file in an archive with its
//! SHA-256 and size, plus the total number of CRLF sequences across all
//! files. Summaries are derived once per artifact and never mutated.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use thiserror::Error;

/// Upper bound on buffer space reserved from an entry's declared size
const MAX_PREALLOC: u64 = 1 << 20;

/// Errors produced while summarizing an archive
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive entry has no usable path")]
    InvalidEntryPath,
}

/// Container format of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    /// Zip container (Python wheels)
    Zip,
    /// Uncompressed tar
    Tar,
    /// Gzip-compressed tar (npm tarballs, `.crate` files)
    TarGz,
    /// Opaque blob summarized as a single entry (e.g. `.deb`)
    Raw,
}

/// Digest of a single archive member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    /// Hex SHA-256 of the member's bytes
    pub sha256: String,
    /// Size in bytes
    pub size: u64,
}

impl FileDigest {
    fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            sha256: hex::encode(hasher.finalize()),
            size: bytes.len() as u64,
        }
    }
}

/// Per-archive content digest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSummary {
    /// Regular files keyed by archive path
    pub files: BTreeMap<String, FileDigest>,
    /// Total `\r\n` occurrences across all files
    pub crlf_count: u64,
}

/// Paths partitioned by how two summaries relate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryDiff {
    /// Present only in the left-hand summary
    pub left_only: Vec<String>,
    /// Present in both with different content
    pub diffs: Vec<String>,
    /// Present only in the right-hand summary
    pub right_only: Vec<String>,
}

impl SummaryDiff {
    /// No differences at all
    pub fn is_empty(&self) -> bool {
        self.left_only.is_empty() && self.diffs.is_empty() && self.right_only.is_empty()
    }
}

impl ContentSummary {
    /// Build a summary from `(path, contents)` pairs.
    ///
    /// Later duplicates of a path replace earlier ones; CRLFs are counted for
    /// every member read, as archive tools see them.
    pub fn from_entries<I, P, B>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, B)>,
        P: Into<String>,
        B: AsRef<[u8]>,
    {
        let mut summary = ContentSummary::default();
        for (path, bytes) in entries {
            summary.insert(path.into(), bytes.as_ref());
        }
        summary
    }

    /// Summarize an archive held in memory.
    ///
    /// `name` is only used for [`ArchiveKind::Raw`], where it becomes the
    /// single entry's path.
    pub fn from_bytes(kind: ArchiveKind, name: &str, bytes: &[u8]) -> Result<Self, SummaryError> {
        match kind {
            ArchiveKind::Zip => Self::from_zip(bytes),
            ArchiveKind::Tar => Self::from_tar(bytes),
            ArchiveKind::TarGz => Self::from_tar(flate2::read::GzDecoder::new(bytes)),
            ArchiveKind::Raw => Ok(Self::from_entries([(name.to_string(), bytes)])),
        }
    }

    /// Summarize an archive from a reader.
    pub fn from_reader<R: Read>(
        kind: ArchiveKind,
        name: &str,
        mut reader: R,
    ) -> Result<Self, SummaryError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(kind, name, &bytes)
    }

    fn from_zip(bytes: &[u8]) -> Result<Self, SummaryError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut summary = ContentSummary::default();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let path = file.name().to_string();
            // The declared size is untrusted header data.
            let mut contents = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
            file.read_to_end(&mut contents)?;
            summary.insert(path, &contents);
        }
        Ok(summary)
    }

    fn from_tar<R: Read>(reader: R) -> Result<Self, SummaryError> {
        let mut archive = tar::Archive::new(reader);
        let mut summary = ContentSummary::default();
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry
                .path()?
                .to_str()
                .ok_or(SummaryError::InvalidEntryPath)?
                .to_string();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            summary.insert(path, &contents);
        }
        Ok(summary)
    }

    fn insert(&mut self, path: String, bytes: &[u8]) {
        self.crlf_count += count_crlf(bytes);
        self.files.insert(path, FileDigest::of(bytes));
    }

    /// Number of files in the summary
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the summary has no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Compare `self` (left) against `other` (right).
    ///
    /// All three path lists come out sorted, independent of insertion order.
    pub fn diff(&self, other: &ContentSummary) -> SummaryDiff {
        let mut result = SummaryDiff::default();
        for (path, digest) in &self.files {
            match other.files.get(path) {
                None => result.left_only.push(path.clone()),
                Some(theirs) if theirs != digest => result.diffs.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in other.files.keys() {
            if !self.files.contains_key(path) {
                result.right_only.push(path.clone());
            }
        }
        result
    }
}

fn count_crlf(bytes: &[u8]) -> u64 {
    bytes.windows(2).filter(|w| *w == b"\r\n").count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_entries_hashes_and_sizes() {
        let summary = ContentSummary::from_entries([("foo", b"foo".as_slice())]);
        let digest = &summary.files["foo"];
        assert_eq!(digest.size, 3);
        assert_eq!(
            digest.sha256,
            "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae"
        );
        assert_eq!(summary.crlf_count, 0);
    }

    #[test]
    fn test_crlf_count_spans_files() {
        let summary = ContentSummary::from_entries([
            ("a.txt", b"one\r\ntwo\r\n".as_slice()),
            ("b.txt", b"three\r\nfour\n".as_slice()),
        ]);
        assert_eq!(summary.crlf_count, 3);
    }

    #[test]
    fn test_diff_partitions_paths() {
        let left = ContentSummary::from_entries([
            ("both-same", b"x".as_slice()),
            ("both-diff", b"left".as_slice()),
            ("left-only", b"l".as_slice()),
        ]);
        let right = ContentSummary::from_entries([
            ("both-same", b"x".as_slice()),
            ("both-diff", b"right".as_slice()),
            ("right-only", b"r".as_slice()),
        ]);
        let diff = left.diff(&right);
        assert_eq!(diff.left_only, vec!["left-only"]);
        assert_eq!(diff.diffs, vec!["both-diff"]);
        assert_eq!(diff.right_only, vec!["right-only"]);
    }

    #[test]
    fn test_diff_is_sorted_regardless_of_insertion() {
        let left = ContentSummary::from_entries([("z", b"1".as_slice()), ("a", b"1".as_slice())]);
        let right = ContentSummary::default();
        assert_eq!(left.diff(&right).left_only, vec!["a", "z"]);
    }

    #[test]
    fn test_zip_summary_skips_directories() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.add_directory("pkg/", options).unwrap();
        writer.start_file("pkg/mod.py", options).unwrap();
        writer.write_all(b"print('hi')\r\n").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let summary = ContentSummary::from_bytes(ArchiveKind::Zip, "x.whl", &bytes).unwrap();
        assert_eq!(summary.len(), 1);
        assert!(summary.files.contains_key("pkg/mod.py"));
        assert_eq!(summary.crlf_count, 1);
    }

    #[test]
    fn test_zip_declared_size_is_not_trusted() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file("pkg/mod.py", options).unwrap();
        writer.write_all(b"pass\n").unwrap();
        let mut bytes = writer.finish().unwrap().into_inner();

        // Claim a ~4 GiB uncompressed size in both headers.
        let huge = 0xFFFF_FFF0u32.to_le_bytes();
        let patch = |bytes: &mut Vec<u8>, signature: &[u8], offset: usize| {
            let at = bytes
                .windows(4)
                .position(|w| w == signature)
                .expect("header present");
            bytes[at + offset..at + offset + 4].copy_from_slice(&huge);
        };
        patch(&mut bytes, b"PK\x03\x04", 22);
        patch(&mut bytes, b"PK\x01\x02", 24);

        // Either outcome is fine; reserving the declared size is not.
        let _ = ContentSummary::from_bytes(ArchiveKind::Zip, "x.whl", &bytes);
    }

    #[test]
    fn test_tar_gz_summary() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"fn main() {}\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "crate-1.0.0/src/main.rs", data.as_slice())
            .unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar_bytes).unwrap();
        let gz_bytes = gz.finish().unwrap();

        let summary =
            ContentSummary::from_bytes(ArchiveKind::TarGz, "crate-1.0.0.crate", &gz_bytes).unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary.files["crate-1.0.0/src/main.rs"].size, data.len() as u64);
    }

    #[test]
    fn test_raw_summary_is_single_entry() {
        let summary =
            ContentSummary::from_bytes(ArchiveKind::Raw, "xz-utils.deb", b"deb_contents").unwrap();
        assert_eq!(summary.len(), 1);
        assert!(summary.files.contains_key("xz-utils.deb"));
    }

    #[test]
    fn test_corrupt_zip_is_error() {
        let result = ContentSummary::from_bytes(ArchiveKind::Zip, "bad.whl", b"not a zip");
        assert!(matches!(result, Err(SummaryError::Zip(_))));
    }
}
