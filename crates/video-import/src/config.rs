//! Recognition configuration from environment variables

use std::env;
use std::str::FromStr;

use chess_core::fen::{has_eight_ranks, STANDARD_START_BOARD};
use tracing::info;

use crate::error::ImportError;

#[derive(Clone, Debug, PartialEq)]
pub struct RecognitionConfig {
    /// Leading frames searched for a board before giving up
    pub board_search_frames: usize,

    /// Candidate square sizes, as fractions of the shorter image side
    pub locator_scales: Vec<f64>,

    /// Minimum mean-intensity difference for a cell pair to count as contrasting
    pub cell_contrast: f64,

    /// Checkerboard score a region must exceed to count as a board
    pub min_board_score: f64,

    /// Mean absolute pixel difference above which a crop is re-classified
    pub change_threshold: f64,

    /// Report progress every N frames (and on the last one)
    pub progress_every: usize,

    /// Extraction rate used to turn frame indices into timestamps
    pub frame_rate: f64,

    /// Position the calibration frame is assumed to show
    pub assumed_start_fen: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            board_search_frames: 10,
            locator_scales: vec![0.8, 0.6, 0.5, 0.4, 0.3],
            cell_contrast: 20.0,
            min_board_score: 0.3,
            change_threshold: 5.0,
            progress_every: 5,
            frame_rate: 1.0,
            assumed_start_fen: STANDARD_START_BOARD.to_string(),
        }
    }
}

impl RecognitionConfig {
    /// Defaults overridden by any of `BOARD_SEARCH_FRAMES`, `BOARD_MIN_SCORE`,
    /// `CHANGE_THRESHOLD`, `PROGRESS_EVERY`, `FRAME_RATE`, `ASSUMED_START_FEN`.
    pub fn from_env() -> Result<Self, ImportError> {
        let defaults = Self::default();

        let config = Self {
            board_search_frames: env_or("BOARD_SEARCH_FRAMES", defaults.board_search_frames)?,
            min_board_score: env_or("BOARD_MIN_SCORE", defaults.min_board_score)?,
            change_threshold: env_or("CHANGE_THRESHOLD", defaults.change_threshold)?,
            progress_every: env_or("PROGRESS_EVERY", defaults.progress_every)?,
            frame_rate: env_or("FRAME_RATE", defaults.frame_rate)?,
            assumed_start_fen: env::var("ASSUMED_START_FEN").unwrap_or(defaults.assumed_start_fen),
            ..defaults
        };

        config.validate()?;
        info!(
            search_frames = config.board_search_frames,
            change_threshold = config.change_threshold,
            frame_rate = config.frame_rate,
            "Recognition config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.board_search_frames == 0 {
            return Err(ImportError::Config("BOARD_SEARCH_FRAMES must be at least 1"));
        }
        if self.progress_every == 0 {
            return Err(ImportError::Config("PROGRESS_EVERY must be at least 1"));
        }
        if !(self.frame_rate > 0.0) {
            return Err(ImportError::Config("FRAME_RATE must be positive"));
        }
        if self.locator_scales.iter().any(|s| !(*s > 0.0 && *s <= 1.0)) {
            return Err(ImportError::Config("locator scales must lie in (0, 1]"));
        }
        if !has_eight_ranks(&self.assumed_start_fen) {
            return Err(ImportError::ConfigValue {
                key: "ASSUMED_START_FEN",
                value: self.assumed_start_fen.clone(),
            });
        }
        Ok(())
    }

    /// Timestamp of a frame under the configured extraction rate.
    pub fn timestamp_for(&self, frame_index: u64) -> f64 {
        frame_index as f64 / self.frame_rate
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ImportError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ImportError::ConfigValue { key, value }),
        Err(_) => Ok(default),
    }
}
