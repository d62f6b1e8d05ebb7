use serde::{Deserialize, Serialize};

/// One recognized board state, as produced by the frame recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizedPosition {
    pub frame_index: u64,
    pub timestamp_seconds: f64,
    pub fen: String, // board-only FEN, empty when no board was read
    pub confidence: f64,
    pub board_detected: bool,
}

impl RecognizedPosition {
    pub fn detected(frame_index: u64, timestamp_seconds: f64, fen: String, confidence: f64) -> Self {
        Self {
            frame_index,
            timestamp_seconds,
            fen,
            confidence,
            board_detected: true,
        }
    }

    pub fn undetected(frame_index: u64, timestamp_seconds: f64) -> Self {
        Self {
            frame_index,
            timestamp_seconds,
            fen: String::new(),
            confidence: 0.0,
            board_detected: false,
        }
    }

    /// Whether the tree builder can use this position at all.
    pub fn is_usable(&self) -> bool {
        self.board_detected && !self.fen.trim().is_empty()
    }
}
