//! Integration tests for the sink fan-out
//!
//! Centered on the order-preservation law: bytes written to the file sink
//! are byte-for-byte identical to, and in the same order as, the buffers
//! delivered by the reader.

use common::sink::{SinkConfig, SinkSet};
use proptest::prelude::*;
use std::fs;
use std::path::Path;

fn file_config(path: &Path) -> SinkConfig {
    SinkConfig {
        file: Some(path.to_path_buf()),
        stdout: false,
        verbose: false,
    }
}

#[test]
fn file_sink_writes_chunks_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feed.bin");

    let chunks: Vec<Vec<u8>> = vec![
        vec![0xAB; 512],
        vec![0xCD; 300],
        Vec::new(),
        vec![0xEF; 512],
    ];

    let mut sinks = SinkSet::open(&file_config(&path)).unwrap();
    for chunk in &chunks {
        sinks.dispatch(chunk).unwrap();
    }
    sinks.finish().unwrap();

    let written = fs::read(&path).unwrap();
    assert_eq!(written.len(), 1324);
    assert_eq!(written, chunks.concat());
}

#[test]
fn file_sink_truncates_existing_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feed.bin");
    fs::write(&path, b"stale bytes from an earlier run").unwrap();

    let mut sinks = SinkSet::open(&file_config(&path)).unwrap();
    sinks.dispatch(&[1, 2, 3]).unwrap();
    sinks.finish().unwrap();

    assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
}

#[test]
fn open_fails_for_unwritable_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("feed.bin");
    assert!(SinkSet::open(&file_config(&path)).is_err());
}

proptest! {
    #[test]
    fn file_sink_preserves_arbitrary_streams(
        chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..600),
            0..12,
        )
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.bin");

        let mut sinks = SinkSet::open(&file_config(&path)).unwrap();
        for chunk in &chunks {
            sinks.dispatch(chunk).unwrap();
        }
        sinks.finish().unwrap();

        prop_assert_eq!(fs::read(&path).unwrap(), chunks.concat());
    }
}
