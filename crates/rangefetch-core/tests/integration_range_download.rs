//! Integration test: local HTTP server with Range support, full probe → plan →
//! fetch → merge → verify over libcurl.

mod common;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::range_server::{self, RangeServerOptions};
use rangefetch_core::checksum::{digest_bytes, DigestAlgorithm};
use rangefetch_core::probe::ProbeError;
use rangefetch_core::retry::{ChunkError, FetchError};
use rangefetch_core::{
    download, CancelToken, DownloadError, DownloadRequest, Event, IntegrityVerdict, MemorySink,
};
use tempfile::tempdir;

fn body(len: usize) -> Vec<u8> {
    (0u8..100).cycle().take(len).collect()
}

fn request(url: &str, out: &Path, chunks: usize) -> DownloadRequest {
    DownloadRequest::builder(url)
        .chunk_count(chunks)
        .max_attempts(2)
        .base_delay(Duration::from_millis(10))
        .output_extension("csv")
        .output_dir(out)
        .deadline(Some(Duration::from_secs(30)))
        .build()
        .unwrap()
}

fn artifacts(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("output_"))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn three_chunks_download_merges_and_verifies_md5_token() {
    let data = body(900);
    let token = format!("\"md5:{}\"", digest_bytes(DigestAlgorithm::Md5, &data));
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            etag: Some(token.clone()),
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let out = dir.path().join("output");
    let sink = MemorySink::new();

    let outcome = download(&request(&server.url, &out, 3), &sink, CancelToken::new())
        .expect("download");

    let ranges: Vec<(u64, u64)> = outcome
        .plan
        .ranges()
        .iter()
        .map(|r| (r.start, r.end))
        .collect();
    assert_eq!(ranges, [(0, 299), (300, 599), (600, 899)]);
    assert_eq!(outcome.bytes, 900);
    assert_eq!(std::fs::read(&outcome.artifact).unwrap(), data);
    assert_eq!(outcome.verdict, IntegrityVerdict::Match { token });
    assert_eq!(server.gets(), 3);
    assert_eq!(artifacts(&out), [outcome.artifact.clone()]);
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1, "chunk storage removed");
    assert_eq!(
        sink.count(|e| matches!(e, Event::IntegrityVerified { .. })),
        1
    );
}

#[test]
fn sha256_token_is_honoured() {
    let data = body(64 * 1024 + 17);
    let token = format!("sha256:{}", digest_bytes(DigestAlgorithm::Sha256, &data));
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            etag: Some(token),
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let outcome = download(
        &request(&server.url, dir.path(), 5),
        &MemorySink::new(),
        CancelToken::new(),
    )
    .unwrap();
    assert!(outcome.verdict.is_match());
    assert_eq!(std::fs::read(&outcome.artifact).unwrap(), data);
}

#[test]
fn late_first_chunk_still_merges_in_order() {
    let data = body(4000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            delay_range_start: HashMap::from([(0, Duration::from_millis(300))]),
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let outcome = download(
        &request(&server.url, dir.path(), 4),
        &MemorySink::new(),
        CancelToken::new(),
    )
    .unwrap();
    assert_eq!(std::fs::read(&outcome.artifact).unwrap(), data);
    assert_eq!(outcome.verdict, IntegrityVerdict::Unverifiable);
}

#[test]
fn wrong_etag_reports_mismatch_and_keeps_artifact() {
    let data = body(1000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            etag: Some("\"5e1f-61a0b2c3\"".to_string()),
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let outcome = download(
        &request(&server.url, dir.path(), 2),
        &MemorySink::new(),
        CancelToken::new(),
    )
    .unwrap();
    assert!(matches!(outcome.verdict, IntegrityVerdict::Mismatch { .. }));
    assert_eq!(std::fs::read(&outcome.artifact).unwrap(), data);
}

#[test]
fn missing_content_length_fails_before_any_chunk_work() {
    let server = range_server::start_with_options(
        body(900),
        RangeServerOptions {
            omit_content_length: true,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let out = dir.path().join("output");
    let err = download(
        &request(&server.url, &out, 3),
        &MemorySink::new(),
        CancelToken::new(),
    )
    .unwrap_err();
    assert!(
        matches!(err, DownloadError::Probe(ProbeError::MissingContentLength)),
        "{:?}",
        err
    );
    assert_eq!(server.gets(), 0);
    assert!(!out.exists(), "no output directory or artifact");
}

#[test]
fn permanently_failing_chunk_yields_aggregated_error() {
    let server = range_server::start_with_options(
        body(900),
        RangeServerOptions {
            fail_range_start: HashMap::from([(300, 500)]),
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let out = dir.path().join("output");
    let err = download(
        &request(&server.url, &out, 3),
        &MemorySink::new(),
        CancelToken::new(),
    )
    .unwrap_err();
    let agg = match err {
        DownloadError::Aggregated(agg) => agg,
        other => panic!("expected aggregated error, got {:?}", other),
    };
    assert_eq!(agg.failures.len(), 1);
    assert!(matches!(
        agg.failures[0],
        (
            1,
            ChunkError::Permanent {
                source: FetchError::Http(500),
                ..
            }
        )
    ));
    assert!(artifacts(&out).is_empty(), "no artifact on failure");
}

#[test]
fn server_ignoring_range_is_permanent() {
    let server = range_server::start_with_options(
        body(3000),
        RangeServerOptions {
            ignore_ranges: true,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let err = download(
        &request(&server.url, dir.path(), 3),
        &MemorySink::new(),
        CancelToken::new(),
    )
    .unwrap_err();
    let agg = match err {
        DownloadError::Aggregated(agg) => agg,
        other => panic!("expected aggregated error, got {:?}", other),
    };
    assert!(agg.failures.iter().all(|(_, e)| matches!(
        e,
        ChunkError::Permanent {
            attempt: 1,
            source: FetchError::RangeIgnored { .. }
        }
    )));
}

#[test]
fn unreachable_host_is_probe_error() {
    // Port 9 (discard) on localhost is closed in test environments.
    let dir = tempdir().unwrap();
    let err = download(
        &request("http://127.0.0.1:9/file", dir.path(), 2),
        &MemorySink::new(),
        CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, DownloadError::Probe(ProbeError::Transport(_))));
}
