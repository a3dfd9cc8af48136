//! Discard padding, lacing and the DocTypeVersion bump they trigger.

mod common;

use common::*;
use webmforge::ebml::Lacing;
use webmforge::mux::Frame;
use webmforge::parse::BlockKind;

#[test]
fn test_discard_padding() {
    let mut harness = MuxHarness::new();
    harness.add_audio_track();
    let paddings = [12_810_000, 127, -128];
    for (i, padding) in paddings.into_iter().enumerate() {
        harness
            .segment
            .add_frame(
                &Frame::new(AUDIO_TRACK, i as u64 * 20_000_000, FRAME)
                    .key(true)
                    .with_discard_padding(padding),
            )
            .unwrap();
    }
    let mut parsed = load(harness.finish());

    assert_eq!(parsed.ebml_header().unwrap().doc_type_version, 4);
    let blocks = collect_blocks(&mut parsed);
    assert_eq!(blocks.len(), 3);
    for (block, padding) in blocks.iter().zip(paddings) {
        assert_eq!(block.kind, BlockKind::BlockGroup);
        assert!(block.is_key);
        assert_eq!(block.discard_padding, padding);
        assert_eq!(block.frames, vec![FRAME.to_vec()]);
    }
}

#[test]
fn test_codec_delay_raises_doc_type_version() {
    let mut harness = MuxHarness::new();
    harness.add_audio_track();
    {
        let audio = harness.segment.track_mut(AUDIO_TRACK).unwrap();
        audio.codec_delay = 6_500_000;
        audio.seek_pre_roll = 80_000_000;
        audio.language = Some("eng".to_string());
    }
    harness.add_key_frame(AUDIO_TRACK, 0);
    let parsed = load(harness.finish());

    assert_eq!(parsed.ebml_header().unwrap().doc_type_version, 4);
    let audio = parsed.tracks().get_by_number(AUDIO_TRACK).unwrap();
    assert_eq!(audio.codec_delay, 6_500_000);
    assert_eq!(audio.seek_pre_roll, 80_000_000);
    assert_eq!(audio.language.as_deref(), Some("eng"));
}

#[test]
fn test_plain_frames_keep_version_2() {
    let mut harness = MuxHarness::new();
    harness.add_audio_track();
    harness.add_key_frame(AUDIO_TRACK, 0);
    let parsed = load(harness.finish());
    assert_eq!(parsed.ebml_header().unwrap().doc_type_version, 2);
}

#[test]
fn test_laced_frames() {
    let mut harness = MuxHarness::new();
    harness.add_audio_track();
    let payloads: [&[u8]; 3] = [&[1; 300], &[2; 5], &[3; 128]];
    harness
        .segment
        .add_laced_frames(AUDIO_TRACK, 0, &payloads, true)
        .unwrap();
    harness
        .segment
        .add_laced_frames(AUDIO_TRACK, 10_000_000, &[&[4u8; 7][..]], false)
        .unwrap();
    let mut parsed = load(harness.finish());

    let cluster = parsed.first_cluster().unwrap();
    let entry = parsed.first_entry(cluster).unwrap();
    let block = parsed.entry(entry).unwrap().block().clone();
    assert_eq!(block.lacing(), Lacing::Ebml);
    assert_eq!(block.frame_count(), 3);

    let blocks = collect_blocks(&mut parsed);
    assert_eq!(blocks.len(), 2);
    assert!(blocks[0].is_key);
    assert_eq!(
        blocks[0].frames,
        payloads.iter().map(|p| p.to_vec()).collect::<Vec<_>>()
    );
    // A single payload is written without lacing.
    assert!(!blocks[1].is_key);
    assert_eq!(blocks[1].frames, vec![vec![4; 7]]);
    assert_eq!(blocks[1].time_ns, 10_000_000);
}

#[test]
fn test_lacing_rejected_when_disabled() {
    let mut harness = MuxHarness::new();
    harness.add_audio_track();
    harness.segment.track_mut(AUDIO_TRACK).unwrap().lacing = false;
    let payloads: [&[u8]; 2] = [&[1; 4], &[2; 4]];
    assert!(harness
        .segment
        .add_laced_frames(AUDIO_TRACK, 0, &payloads, true)
        .is_err());

    harness.add_key_frame(AUDIO_TRACK, 0);
    let parsed = load(harness.finish());
    assert!(!parsed.tracks().get_by_number(AUDIO_TRACK).unwrap().lacing);
}
