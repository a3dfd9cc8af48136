//! Muxer configuration loaded from TOML files.

mod common;

use assert_matches::assert_matches;
use common::*;
use std::io::Write;
use tempfile::NamedTempFile;
use webmforge::mux::MuxerConfig;
use webmforge::Error;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_file_drives_muxer() {
    let file = write_config(
        r#"
        max_cluster_duration = 4000000
        output_cues = false
        timecode_scale = 100000
        muxing_app = "unit_test"
        writing_app = "unit_test"
        "#,
    );
    let config = MuxerConfig::load(file.path()).unwrap();
    assert_eq!(config.timecode_scale, 100_000);

    let mut harness = MuxHarness::with_config(config);
    harness.add_video_track();
    for ms in [0, 3, 6] {
        harness.add_key_frame(VIDEO_TRACK, ms * 1_000_000);
    }
    let mut parsed = load(harness.finish());

    assert_eq!(parsed.timecode_scale(), 100_000);
    assert_eq!(parsed.info().muxing_app.as_deref(), Some(APP));
    assert!(parsed.cues().is_none());
    let clusters: Vec<usize> = collect_blocks(&mut parsed).iter().map(|b| b.cluster).collect();
    assert_eq!(clusters, vec![0, 0, 1]);
    // Ticks are 0.1 ms, so the 6 ms frame sits 60 ticks into the segment.
    let second = parsed.find_cluster(6_000_000).unwrap();
    assert_eq!(parsed.cluster(second).unwrap().timecode(), 60);
}

#[test]
fn test_config_file_with_fixed_duration() {
    let file = write_config("duration = 250.0\n");
    let config = MuxerConfig {
        muxing_app: APP.to_string(),
        writing_app: APP.to_string(),
        ..MuxerConfig::load(file.path()).unwrap()
    };
    let mut harness = MuxHarness::with_config(config);
    harness.add_video_track();
    harness.add_key_frame(VIDEO_TRACK, 0);
    let parsed = load(harness.finish());
    assert_eq!(parsed.info().duration, Some(250.0));
}

#[test]
fn test_invalid_config_file() {
    let file = write_config("cues_track = 0\n");
    assert_matches!(MuxerConfig::load(file.path()), Err(Error::Validation(_)));

    let missing = file.path().with_extension("missing");
    assert_matches!(MuxerConfig::load(&missing), Err(Error::Io(_)));
}

#[test]
fn test_config_round_trips_through_file() {
    let config = MuxerConfig {
        max_cluster_size: 1 << 20,
        new_cluster_on_video_key: true,
        cues_track: Some(VIDEO_TRACK),
        ..test_config()
    };
    let file = write_config(&config.to_toml_string().unwrap());
    assert_eq!(MuxerConfig::load(file.path()).unwrap(), config);
}
