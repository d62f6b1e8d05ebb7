//! Chessboard recognition over extracted video frames.
//!
//! A board is located once, piece templates are learned from the first board
//! (assumed to be the starting position), and every frame is classified into
//! a board FEN. The resulting sequence feeds `chess_core::position_tree`.

pub mod board_locator;
pub mod cancel;
pub mod change;
pub mod config;
pub mod error;
pub mod frames;
pub mod matcher;
pub mod pipeline;
pub mod templates;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use board_locator::{locate_board, BoardLocator, BoardRegion};
pub use cancel::CancelToken;
pub use config::RecognitionConfig;
pub use error::ImportError;
pub use pipeline::{RecognitionPipeline, RecognitionResult};
