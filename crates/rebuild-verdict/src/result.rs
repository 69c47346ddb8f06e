//! Verdict types
//!
//! The closed set of mismatch categories and their fixed ranking.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A classified reproducibility discrepancy.
///
/// Variants are declared in precedence order, but ranking is taken from the
/// explicit [`VerdictKind::PRECEDENCE`] table rather than declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictKind {
    /// macOS `.DS_Store` present upstream but not in the rebuild
    DsStore,
    /// Upstream has more CRLF line endings than the rebuild
    LineEndings,
    /// Files missing in both directions
    MismatchedFiles,
    /// Files only present upstream
    UpstreamOnly,
    /// Files only present in the rebuild
    RebuildOnly,
    /// Only package-metadata files differ
    MetadataOnly,
    /// Content differs outside of metadata
    ContentDiff,
}

impl VerdictKind {
    /// Evaluation order, highest precedence first.
    pub const PRECEDENCE: [VerdictKind; 7] = [
        VerdictKind::DsStore,
        VerdictKind::LineEndings,
        VerdictKind::MismatchedFiles,
        VerdictKind::UpstreamOnly,
        VerdictKind::RebuildOnly,
        VerdictKind::MetadataOnly,
        VerdictKind::ContentDiff,
    ];

    /// 1-based rank (1 = evaluated first).
    pub fn rank(&self) -> usize {
        Self::PRECEDENCE
            .iter()
            .position(|k| k == self)
            .map(|i| i + 1)
            .unwrap_or(usize::MAX)
    }

    /// Stable human-readable message.
    pub fn message(&self) -> &'static str {
        match self {
            VerdictKind::DsStore => ".DS_STORE file(s) found in upstream but not rebuild",
            VerdictKind::LineEndings => "excess CRLF line endings found in upstream",
            VerdictKind::MismatchedFiles => "mismatched file(s) in upstream and rebuild",
            VerdictKind::UpstreamOnly => "file(s) found in upstream but not rebuild",
            VerdictKind::RebuildOnly => "file(s) found in rebuild but not upstream",
            VerdictKind::MetadataOnly => "metadata-only mismatch",
            VerdictKind::ContentDiff => "content differences found",
        }
    }

    /// Machine-readable code, e.g. `"MISMATCHED_FILES"`.
    pub fn code(&self) -> &'static str {
        match self {
            VerdictKind::DsStore => "DS_STORE",
            VerdictKind::LineEndings => "LINE_ENDINGS",
            VerdictKind::MismatchedFiles => "MISMATCHED_FILES",
            VerdictKind::UpstreamOnly => "UPSTREAM_ONLY",
            VerdictKind::RebuildOnly => "REBUILD_ONLY",
            VerdictKind::MetadataOnly => "METADATA_ONLY",
            VerdictKind::ContentDiff => "CONTENT_DIFF",
        }
    }

    /// Whether the mismatch is environment-induced rather than a real divergence.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            VerdictKind::DsStore | VerdictKind::LineEndings | VerdictKind::MetadataOnly
        )
    }
}

impl PartialOrd for VerdictKind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VerdictKind {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
