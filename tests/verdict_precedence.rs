//! Verdict precedence across real archive formats

use std::io::{Cursor, Write};

use rebuild_lane::rebuild::{Ecosystem, RebuilderRegistry};
use rebuild_lane::verdict::{classify, ArchiveKind, ContentSummary, VerdictKind};

fn wheel(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (path, contents) in entries {
        writer.start_file(*path, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn tgz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    let tar_bytes = builder.into_inner().unwrap();
    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(&tar_bytes).unwrap();
    gz.finish().unwrap()
}

fn verdict(ecosystem: Ecosystem, rebuilt: &[u8], upstream: &[u8]) -> Option<VerdictKind> {
    let rebuilder = RebuilderRegistry::standard().get(ecosystem).unwrap();
    let kind = rebuilder.archive_kind();
    let rebuilt = ContentSummary::from_bytes(kind, "artifact", rebuilt).unwrap();
    let upstream = ContentSummary::from_bytes(kind, "artifact", upstream).unwrap();
    classify(&rebuilt, &upstream, &rebuilder.classifier_config())
}

#[test]
fn test_identical_wheels_reproduce() {
    let bytes = wheel(&[("foo", b"foo")]);
    assert_eq!(verdict(Ecosystem::PyPI, &bytes, &bytes), None);
}

#[test]
fn test_zip_metadata_does_not_affect_identity() {
    // Different compression, same member contents.
    let stored = {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file("pkg/a.py", options).unwrap();
        writer.write_all(b"x = 1\n").unwrap();
        writer.finish().unwrap().into_inner()
    };
    let deflated = wheel(&[("pkg/a.py", b"x = 1\n")]);
    assert_ne!(stored, deflated);
    assert_eq!(verdict(Ecosystem::PyPI, &stored, &deflated), None);
}

#[test]
fn test_ds_store_outranks_every_other_rule() {
    let rebuilt = wheel(&[("pkg/a.py", b"rebuilt\n"), ("pkg/extra.py", b"e")]);
    let upstream = wheel(&[
        ("pkg/a.py", b"upstream\r\n\r\n"),
        ("pkg/.DS_Store", b"\0\0"),
        ("pkg/other.py", b"o"),
    ]);
    assert_eq!(verdict(Ecosystem::PyPI, &rebuilt, &upstream), Some(VerdictKind::DsStore));
}

#[test]
fn test_crlf_outranks_file_set_differences() {
    let rebuilt = wheel(&[("a.txt", b"one\ntwo\n")]);
    let upstream = wheel(&[("a.txt", b"one\r\ntwo\r\n"), ("b.txt", b"b")]);
    assert_eq!(verdict(Ecosystem::PyPI, &rebuilt, &upstream), Some(VerdictKind::LineEndings));
}

#[test]
fn test_wheel_record_only_is_metadata() {
    let rebuilt = wheel(&[
        ("foo/__init__.py", b""),
        ("foo-1.0.dist-info/RECORD", b"foo/__init__.py,sha256=a,0\n"),
    ]);
    let upstream = wheel(&[
        ("foo/__init__.py", b""),
        ("foo-1.0.dist-info/RECORD", b"foo/__init__.py,sha256=b,0\n"),
    ]);
    assert_eq!(verdict(Ecosystem::PyPI, &rebuilt, &upstream), Some(VerdictKind::MetadataOnly));
}

#[test]
fn test_crate_vcs_info_is_metadata_but_npm_has_none() {
    let rebuilt = tgz(&[
        ("foo-1.0.0/src/lib.rs", b"pub fn f() {}\n"),
        ("foo-1.0.0/.cargo_vcs_info.json", b"{\"git\":{\"sha1\":\"aaaa\"}}"),
    ]);
    let upstream = tgz(&[
        ("foo-1.0.0/src/lib.rs", b"pub fn f() {}\n"),
        ("foo-1.0.0/.cargo_vcs_info.json", b"{\"git\":{\"sha1\":\"bbbb\"}}"),
    ]);
    assert_eq!(verdict(Ecosystem::CratesIo, &rebuilt, &upstream), Some(VerdictKind::MetadataOnly));
    assert_eq!(verdict(Ecosystem::Npm, &rebuilt, &upstream), Some(VerdictKind::ContentDiff));
}

#[test]
fn test_verdict_is_deterministic() {
    let rebuilt = tgz(&[("package/index.js", b"a"), ("package/new.js", b"n")]);
    let upstream = tgz(&[("package/index.js", b"b"), ("package/old.js", b"o")]);
    let first = verdict(Ecosystem::Npm, &rebuilt, &upstream);
    for _ in 0..10 {
        assert_eq!(verdict(Ecosystem::Npm, &rebuilt, &upstream), first);
    }
    assert_eq!(first, Some(VerdictKind::MismatchedFiles));
}

#[test]
fn test_debian_packages_compare_as_blobs() {
    assert_eq!(verdict(Ecosystem::Debian, b"deb", b"deb"), None);
    assert_eq!(verdict(Ecosystem::Debian, b"deb", b"bed"), Some(VerdictKind::ContentDiff));
}

#[test]
fn test_raw_kind_ignores_container_format() {
    let summary = ContentSummary::from_bytes(ArchiveKind::Raw, "x.deb", b"not-a-zip").unwrap();
    assert_eq!(summary.len(), 1);
}
