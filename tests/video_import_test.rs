//! End-to-end tests: render synthetic frame sequences, run the recognition
//! pipeline over them and rebuild the repertoire tree.

mod common;

use chess_core::fen::STANDARD_START_BOARD;
use chess_core::position_tree::build_position_tree;
use common::{write_frame, write_frames, BOARD_AT, CELL};
use video_import::{ImportError, RecognitionConfig, RecognitionPipeline};

// Each move keeps white pawns on dark squares and black pawns on light ones,
// so every step clears the default change threshold with the test renderer.
const AFTER_D4: &str = "rnbqkbnr/pppppppp/8/8/3P4/8/PPP1PPPP/RNBQKBNR";
const AFTER_D4_D5: &str = "rnbqkbnr/ppp1pppp/8/3p4/3P4/8/PPP1PPPP/RNBQKBNR";
const AFTER_D4_F5: &str = "rnbqkbnr/ppppp1pp/8/5p2/3P4/8/PPP1PPPP/RNBQKBNR";
const AFTER_D4_F5_B4: &str = "rnbqkbnr/ppppp1pp/8/5p2/1P1P4/8/P1P1PPPP/RNBQKBNR";
const AFTER_D4_F5_B4_H5: &str = "rnbqkbnr/ppppp1p1/8/5p1p/1P1P4/8/P1P1PPPP/RNBQKBNR";

// ---------------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------------

#[test]
fn test_commentary_video_with_rewind() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(
        dir.path(),
        &[
            Some(STANDARD_START_BOARD), // 1
            Some(STANDARD_START_BOARD), // 2
            Some(AFTER_D4),             // 3
            Some(AFTER_D4),             // 4
            Some(AFTER_D4_D5),          // 5
            Some(AFTER_D4_D5),          // 6
            Some(AFTER_D4),             // 7  rewind to show an alternative
            Some(AFTER_D4_F5),          // 8
            None,                       // 9  camera cut, no board
            Some(AFTER_D4_F5),          // 10
            Some(AFTER_D4_F5_B4),       // 11
            Some(AFTER_D4_F5_B4_H5),    // 12
        ],
    );

    let pipeline = RecognitionPipeline::new(RecognitionConfig::default());
    let mut progress = Vec::new();
    let result = pipeline
        .recognize(dir.path(), |done, total| progress.push((done, total)))
        .unwrap();

    assert_eq!(result.total_frames, 12);
    assert_eq!(result.frames_with_board, 12);
    assert_eq!(progress, vec![(5, 12), (10, 12), (12, 12)]);

    let region = result.board_region.unwrap();
    assert_eq!((region.x1, region.y1), (BOARD_AT, BOARD_AT));
    assert_eq!(region.width(), CELL * 8);
    assert_eq!(result.calibration_frame, Some(1));

    // Frames are processed in numeric order (frame_10 after frame_9).
    let indices: Vec<u64> = result.positions.iter().map(|p| p.frame_index).collect();
    assert_eq!(indices, (1..=12).collect::<Vec<u64>>());
    assert_eq!(result.positions[0].fen, STANDARD_START_BOARD);
    assert_eq!(result.positions[4].fen, AFTER_D4_D5);
    assert_eq!(result.positions[6].fen, AFTER_D4);
    assert_eq!(result.positions[11].fen, AFTER_D4_F5_B4_H5);
    assert!(result.positions.iter().all(|p| p.confidence == 1.0));

    // Frames 2, 4 and 6 repeat their predecessor and skip the matcher.
    assert_eq!(result.reclassified_frames, 9);

    let tree = build_position_tree(&result.positions).unwrap();
    assert_eq!(
        tree.lines(),
        vec![
            vec!["d4".to_string(), "d5".to_string()],
            vec!["d4".to_string(), "f5".to_string(), "b4".to_string(), "h5".to_string()],
        ]
    );
    assert_eq!(tree.node_count(), 6);
    assert_eq!(tree.to_movetext(), "1. d4 d5 (1... f5 2. b4 h5)");

    // Provenance points at the first frame of each position.
    let d4 = &tree.root.children[0];
    assert_eq!(d4.frame_index, 3);
    assert_eq!(tree.provenance[&d4.id].timestamp_seconds, 3.0);
    let f5 = &d4.children[1];
    assert_eq!(f5.mv.as_deref(), Some("f5"));
    assert_eq!(f5.frame_index, 8);
}

#[test]
fn test_timestamps_follow_frame_rate() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), &[Some(STANDARD_START_BOARD), Some(AFTER_D4)]);

    let config = RecognitionConfig {
        frame_rate: 2.0,
        ..RecognitionConfig::default()
    };
    let result = RecognitionPipeline::new(config)
        .recognize(dir.path(), |_, _| {})
        .unwrap();

    let stamps: Vec<f64> = result.positions.iter().map(|p| p.timestamp_seconds).collect();
    assert_eq!(stamps, vec![0.5, 1.0]);
}

#[test]
fn test_board_appears_after_intro() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(
        dir.path(),
        &[None, None, Some(STANDARD_START_BOARD), Some(AFTER_D4)],
    );

    let result = RecognitionPipeline::new(RecognitionConfig::default())
        .recognize(dir.path(), |_, _| {})
        .unwrap();

    assert_eq!(result.calibration_frame, Some(3));
    // Intro frames are still classified against the fixed region; they read
    // as a board without kings, which the tree builder drops.
    assert_eq!(result.positions.len(), 4);
    let tree = build_position_tree(&result.positions).unwrap();
    assert_eq!(tree.root.frame_index, 3);
    assert_eq!(tree.lines(), vec![vec!["d4".to_string()]]);
}

#[test]
fn test_board_outside_search_window() {
    let dir = tempfile::tempdir().unwrap();
    for i in 1..=3 {
        write_frame(dir.path(), i, None);
    }
    write_frame(dir.path(), 4, Some(STANDARD_START_BOARD));

    let config = RecognitionConfig {
        board_search_frames: 3,
        ..RecognitionConfig::default()
    };
    let result = RecognitionPipeline::new(config)
        .recognize(dir.path(), |_, _| {})
        .unwrap();

    assert_eq!(result.total_frames, 4);
    assert_eq!(result.frames_with_board, 0);
    assert!(result.positions.is_empty());
    assert!(build_position_tree(&result.positions).is_none());
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[test]
fn test_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let err = RecognitionPipeline::new(RecognitionConfig::default())
        .recognize(&dir.path().join("missing"), |_, _| {})
        .unwrap_err();
    assert!(matches!(err, ImportError::FrameDirectory { .. }));
}

#[test]
fn test_directory_without_frames() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.txt"), "no frames here").unwrap();
    let err = RecognitionPipeline::new(RecognitionConfig::default())
        .recognize(dir.path(), |_, _| {})
        .unwrap_err();
    assert!(matches!(err, ImportError::NoFrames(_)));
}

#[test]
fn test_cancel_mid_run() {
    let dir = tempfile::tempdir().unwrap();
    let fens: Vec<Option<&str>> = (0..8).map(|_| Some(STANDARD_START_BOARD)).collect();
    write_frames(dir.path(), &fens);

    let pipeline = RecognitionPipeline::new(RecognitionConfig {
        progress_every: 2,
        ..RecognitionConfig::default()
    });
    let token = pipeline.cancel_token();
    let mut reports = 0;
    let err = pipeline
        .recognize(dir.path(), |_, _| {
            reports += 1;
            token.cancel();
        })
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(reports, 1);
}

#[test]
fn test_result_serializes_for_callers() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), &[Some(STANDARD_START_BOARD), Some(AFTER_D4)]);

    let result = RecognitionPipeline::new(RecognitionConfig::default())
        .recognize(dir.path(), |_, _| {})
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["totalFrames"], 2);
    assert_eq!(json["positions"][1]["fen"], AFTER_D4);
    assert_eq!(json["positions"][1]["boardDetected"], true);
    assert_eq!(json["boardRegion"]["x1"], BOARD_AT);

    let tree = build_position_tree(&result.positions).unwrap();
    let tree_json = serde_json::to_value(&tree).unwrap();
    assert_eq!(tree_json["orientation"], "white");
    assert_eq!(tree_json["root"]["children"][0]["move"], "d4");
    assert_eq!(tree_json["provenance"]["n1"]["frameIndex"], 2);
}
