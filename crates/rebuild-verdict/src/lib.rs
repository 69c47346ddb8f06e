//! Ranked reproducibility verdicts for package archives.
//!
//! The classifier compares the content summary of a rebuilt artifact against
//! the upstream original and produces at most one [`VerdictKind`]. Rules are
//! evaluated in the fixed order of [`VerdictKind::PRECEDENCE`]; the first rule
//! that matches wins and rules are never combined.

mod config;
mod result;
mod summary;

pub use config::ClassifierConfig;
pub use result::VerdictKind;
pub use summary::{ArchiveKind, ContentSummary, FileDigest, SummaryDiff, SummaryError};

/// Final path component left behind by macOS Finder.
const DS_STORE_NAME: &str = ".ds_store";

/// Facts about a rebuilt/upstream pair that the rules are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    /// Paths present only upstream
    pub upstream_only: Vec<String>,
    /// Paths present only in the rebuild
    pub rebuild_only: Vec<String>,
    /// Paths present in both with different content
    pub diffs: Vec<String>,
    /// CRLF count in the upstream archive
    pub upstream_crlf: u64,
    /// CRLF count in the rebuilt archive
    pub rebuild_crlf: u64,
}

impl Comparison {
    /// Compute the comparison of `rebuilt` against `upstream`.
    pub fn new(rebuilt: &ContentSummary, upstream: &ContentSummary) -> Self {
        let diff = upstream.diff(rebuilt);
        Self {
            upstream_only: diff.left_only,
            rebuild_only: diff.right_only,
            diffs: diff.diffs,
            upstream_crlf: upstream.crlf_count,
            rebuild_crlf: rebuilt.crlf_count,
        }
    }

    /// Whether the rule for `kind` matches these facts.
    ///
    /// Rules are independent predicates; precedence is applied by the caller.
    pub fn matches(&self, kind: VerdictKind, config: &ClassifierConfig) -> bool {
        match kind {
            VerdictKind::DsStore => self.upstream_only.iter().any(|p| is_ds_store(p)),
            VerdictKind::LineEndings => self.upstream_crlf > self.rebuild_crlf,
            VerdictKind::MismatchedFiles => {
                !self.upstream_only.is_empty() && !self.rebuild_only.is_empty()
            }
            VerdictKind::UpstreamOnly => !self.upstream_only.is_empty(),
            VerdictKind::RebuildOnly => !self.rebuild_only.is_empty(),
            VerdictKind::MetadataOnly => {
                self.upstream_only.is_empty()
                    && self.rebuild_only.is_empty()
                    && !self.diffs.is_empty()
                    && self.diffs.iter().all(|p| config.is_metadata_path(p))
            }
            VerdictKind::ContentDiff => !self.diffs.is_empty(),
        }
    }

    /// Highest-precedence matching verdict, or `None` for an exact match.
    pub fn verdict(&self, config: &ClassifierConfig) -> Option<VerdictKind> {
        VerdictKind::PRECEDENCE
            .iter()
            .copied()
            .find(|kind| self.matches(*kind, config))
    }
}

/// Classify a rebuilt artifact against its upstream original.
pub fn classify(
    rebuilt: &ContentSummary,
    upstream: &ContentSummary,
    config: &ClassifierConfig,
) -> Option<VerdictKind> {
    Comparison::new(rebuilt, upstream).verdict(config)
}

fn is_ds_store(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .map(|name| name.eq_ignore_ascii_case(DS_STORE_NAME))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(entries: &[(&str, &str)]) -> ContentSummary {
        ContentSummary::from_entries(entries.iter().map(|(p, c)| (*p, c.as_bytes())))
    }

    fn wheel_config() -> ClassifierConfig {
        ClassifierConfig::with_metadata_markers([".dist-info/"])
    }

    #[test]
    fn test_identical_is_none() {
        let s = summary(&[("foo", "foo")]);
        assert_eq!(classify(&s, &s, &wheel_config()), None);
    }

    #[test]
    fn test_ds_store_beats_crlf() {
        let rebuilt = summary(&[("pkg/a.py", "x\n")]);
        let upstream = summary(&[("pkg/a.py", "x\n"), ("pkg/.DS_Store", "junk\r\n\r\n")]);
        assert_eq!(
            classify(&rebuilt, &upstream, &wheel_config()),
            Some(VerdictKind::DsStore)
        );
    }

    #[test]
    fn test_ds_store_matches_uppercase_and_top_level() {
        assert!(is_ds_store("dir/.DS_STORE"));
        assert!(is_ds_store(".DS_Store"));
        assert!(!is_ds_store("dir/not.DS_Store.txt"));
    }

    #[test]
    fn test_crlf_excess_upstream() {
        let rebuilt = summary(&[("a.txt", "one\ntwo\n")]);
        let upstream = summary(&[("a.txt", "one\r\ntwo\r\n")]);
        assert_eq!(
            classify(&rebuilt, &upstream, &wheel_config()),
            Some(VerdictKind::LineEndings)
        );
    }

    #[test]
    fn test_crlf_excess_in_rebuild_is_content_diff() {
        let rebuilt = summary(&[("a.txt", "one\r\n")]);
        let upstream = summary(&[("a.txt", "one\n")]);
        assert_eq!(
            classify(&rebuilt, &upstream, &wheel_config()),
            Some(VerdictKind::ContentDiff)
        );
    }

    #[test]
    fn test_mismatched_files_both_directions() {
        let rebuilt = summary(&[("totally-not-foo", "not-in-the-least-foo")]);
        let upstream = summary(&[("foo", "foo")]);
        assert_eq!(
            classify(&rebuilt, &upstream, &wheel_config()),
            Some(VerdictKind::MismatchedFiles)
        );
    }

    #[test]
    fn test_one_directional_extras() {
        let small = summary(&[("a", "1")]);
        let big = summary(&[("a", "1"), ("b", "2")]);
        assert_eq!(
            classify(&small, &big, &wheel_config()),
            Some(VerdictKind::UpstreamOnly)
        );
        assert_eq!(
            classify(&big, &small, &wheel_config()),
            Some(VerdictKind::RebuildOnly)
        );
    }

    #[test]
    fn test_metadata_only_then_flip() {
        let upstream = summary(&[
            ("pkg/a.py", "same"),
            ("pkg-1.0.dist-info/RECORD", "upstream"),
        ]);
        let rebuilt = summary(&[
            ("pkg/a.py", "same"),
            ("pkg-1.0.dist-info/RECORD", "rebuilt"),
        ]);
        assert_eq!(
            classify(&rebuilt, &upstream, &wheel_config()),
            Some(VerdictKind::MetadataOnly)
        );

        let upstream = summary(&[
            ("pkg/a.py", "upstream"),
            ("pkg-1.0.dist-info/RECORD", "upstream"),
        ]);
        let rebuilt = summary(&[
            ("pkg/a.py", "rebuilt"),
            ("pkg-1.0.dist-info/RECORD", "rebuilt"),
        ]);
        assert_eq!(
            classify(&rebuilt, &upstream, &wheel_config()),
            Some(VerdictKind::ContentDiff)
        );
    }

    #[test]
    fn test_metadata_rule_needs_markers() {
        let upstream = summary(&[("pkg-1.0.dist-info/RECORD", "a")]);
        let rebuilt = summary(&[("pkg-1.0.dist-info/RECORD", "b")]);
        assert_eq!(
            classify(&rebuilt, &upstream, &ClassifierConfig::default()),
            Some(VerdictKind::ContentDiff)
        );
    }

    #[test]
    fn test_comparison_exposes_partition() {
        let rebuilt = summary(&[("totally-not-foo", "not-in-the-least-foo")]);
        let upstream = summary(&[("foo", "foo")]);
        let cmp = Comparison::new(&rebuilt, &upstream);
        assert_eq!(cmp.upstream_only, vec!["foo"]);
        assert_eq!(cmp.rebuild_only, vec!["totally-not-foo"]);
        assert!(cmp.diffs.is_empty());
    }
}
