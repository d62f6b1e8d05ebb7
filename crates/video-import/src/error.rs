//! Import error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Invalid value for {key}: {value}")]
    ConfigValue { key: &'static str, value: String },

    #[error("Cannot read frame directory {path}: {source}")]
    FrameDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No frames found in {0}")]
    NoFrames(PathBuf),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Crop outside image: {0}")]
    Crop(String),

    #[error("Calibration error: {0}")]
    Calibration(String),

    #[error("Recognition cancelled")]
    Cancelled,
}

impl ImportError {
    /// Whether the run was stopped on request rather than failing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ImportError::Cancelled)
    }
}
