//! Frame directory -> recognized position sequence.
//!
//! One sequential scan per video: find the board once, calibrate once, then
//! classify each frame, skipping the matcher when the board crop has not
//! changed since the last classified frame.

use std::path::Path;

use chess_core::fen::has_eight_ranks;
use chess_core::RecognizedPosition;
use image::GrayImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::board_locator::{BoardLocator, BoardRegion};
use crate::cancel::CancelToken;
use crate::change::ChangeDetector;
use crate::config::RecognitionConfig;
use crate::error::ImportError;
use crate::frames::{list_frames, Frame};
use crate::matcher;
use crate::templates::{calibrate, Calibration};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub positions: Vec<RecognizedPosition>,
    pub total_frames: usize,
    pub frames_with_board: usize,
    pub board_region: Option<BoardRegion>,
    /// Index of the frame the templates were learned from.
    pub calibration_frame: Option<u64>,
    /// Frames that actually went through the matcher.
    pub reclassified_frames: usize,
}

impl RecognitionResult {
    fn without_board(total_frames: usize) -> Self {
        Self {
            positions: Vec::new(),
            total_frames,
            frames_with_board: 0,
            board_region: None,
            calibration_frame: None,
            reclassified_frames: 0,
        }
    }
}

/// The reading attached to the last classified crop.
#[derive(Debug, Clone)]
struct FrameReading {
    fen: String,
    confidence: f64,
    detected: bool,
}

impl FrameReading {
    fn undetected() -> Self {
        Self {
            fen: String::new(),
            confidence: 0.0,
            detected: false,
        }
    }

    fn at(&self, frame_index: u64, timestamp: f64) -> RecognizedPosition {
        if self.detected {
            RecognizedPosition::detected(frame_index, timestamp, self.fen.clone(), self.confidence)
        } else {
            RecognizedPosition::undetected(frame_index, timestamp)
        }
    }
}

struct LocatedBoard {
    frame_index: u64,
    region: BoardRegion,
    crop: GrayImage,
}

pub struct RecognitionPipeline {
    config: RecognitionConfig,
    cancel: CancelToken,
}

impl RecognitionPipeline {
    pub fn new(config: RecognitionConfig) -> Self {
        Self::with_cancel(config, CancelToken::new())
    }

    pub fn with_cancel(config: RecognitionConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    /// Token that stops this pipeline from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    /// Recognize every frame in `frames_dir`. `on_progress(processed, total)`
    /// is called every `progress_every` frames and after the last one.
    pub fn recognize<F>(&self, frames_dir: &Path, mut on_progress: F) -> Result<RecognitionResult, ImportError>
    where
        F: FnMut(usize, usize),
    {
        let frames = list_frames(frames_dir)?;
        if frames.is_empty() {
            return Err(ImportError::NoFrames(frames_dir.to_path_buf()));
        }
        let total = frames.len();
        info!(frames = total, dir = %frames_dir.display(), "Starting recognition");

        let Some(located) = self.find_board(&frames)? else {
            info!(
                searched = total.min(self.config.board_search_frames),
                "No board found, nothing to recognize"
            );
            return Ok(RecognitionResult::without_board(total));
        };
        info!(
            frame = located.frame_index,
            x1 = located.region.x1,
            y1 = located.region.y1,
            x2 = located.region.x2,
            y2 = located.region.y2,
            score = located.region.score,
            "Board region fixed"
        );

        self.cancel.check()?;
        let calibration = calibrate(&located.crop, &self.config.assumed_start_fen)?;
        let region = located.region;
        let calibration_frame = located.frame_index;
        drop(located);

        let mut detector = ChangeDetector::new(self.config.change_threshold);
        let mut last_reading: Option<FrameReading> = None;
        let mut positions = Vec::with_capacity(total);
        let mut frames_with_board = 0;
        let mut reclassified = 0;

        for (i, frame) in frames.iter().enumerate() {
            self.cancel.check()?;
            let timestamp = self.config.timestamp_for(frame.index);

            let position = match load_gray(&frame.path).and_then(|image| region.crop(&image)) {
                Ok(crop) => match &last_reading {
                    Some(reading) if !detector.has_changed(&crop) => reading.at(frame.index, timestamp),
                    _ => {
                        let reading = self.classify(&crop, &calibration, frame.index);
                        reclassified += 1;
                        detector.update(crop);
                        let position = reading.at(frame.index, timestamp);
                        last_reading = Some(reading);
                        position
                    }
                },
                Err(e) => {
                    warn!(frame = frame.index, error = %e, "Frame unreadable, recording as undetected");
                    RecognizedPosition::undetected(frame.index, timestamp)
                }
            };

            if position.board_detected {
                frames_with_board += 1;
            }
            positions.push(position);

            let processed = i + 1;
            if processed % self.config.progress_every == 0 || processed == total {
                on_progress(processed, total);
            }
        }

        detector.release();
        info!(
            frames = total,
            frames_with_board,
            reclassified,
            "Recognition complete"
        );

        Ok(RecognitionResult {
            positions,
            total_frames: total,
            frames_with_board,
            board_region: Some(region),
            calibration_frame: Some(calibration_frame),
            reclassified_frames: reclassified,
        })
    }

    /// First frame among the leading `board_search_frames` with a board.
    fn find_board(&self, frames: &[Frame]) -> Result<Option<LocatedBoard>, ImportError> {
        for frame in frames.iter().take(self.config.board_search_frames) {
            self.cancel.check()?;

            let image = match load_gray(&frame.path) {
                Ok(image) => image,
                Err(e) => {
                    warn!(frame = frame.index, error = %e, "Skipping unreadable frame during board search");
                    continue;
                }
            };

            let locator = BoardLocator::new(&image, &self.config);
            let (region, best_score) = locator.locate_with_cancel(&self.cancel)?;
            match region {
                Some(region) => {
                    let crop = region.crop(&image)?;
                    return Ok(Some(LocatedBoard {
                        frame_index: frame.index,
                        region,
                        crop,
                    }));
                }
                None => debug!(frame = frame.index, best_score, "No board in frame"),
            }
        }
        Ok(None)
    }

    fn classify(&self, crop: &GrayImage, calibration: &Calibration, frame_index: u64) -> FrameReading {
        let reading = matcher::recognize(crop, calibration);
        if !has_eight_ranks(&reading.fen) {
            warn!(frame = frame_index, fen = %reading.fen, "Malformed classification, recording as undetected");
            return FrameReading::undetected();
        }
        debug!(frame = frame_index, fen = %reading.fen, mean_score = reading.mean_score, "Frame classified");
        FrameReading {
            fen: reading.fen,
            confidence: 1.0,
            detected: true,
        }
    }
}

fn load_gray(path: &Path) -> Result<GrayImage, ImportError> {
    Ok(image::open(path)?.to_luma8())
}
