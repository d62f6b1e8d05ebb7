//! Frame catalog: numerically ordered `frame_<n>.<png|jpg|jpeg>` files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::ImportError;

static FRAME_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^frame_(\d+)\.(?i:png|jpe?g)$").expect("frame name pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub index: u64,
    pub path: PathBuf,
}

/// Parse the frame index out of a file name, `None` for anything else.
pub fn frame_index(file_name: &str) -> Option<u64> {
    FRAME_NAME.captures(file_name)?.get(1)?.as_str().parse().ok()
}

/// List every frame file in `dir`, sorted by index (so `frame_3` precedes
/// `frame_10`). Sub-directories and non-matching names are ignored.
pub fn list_frames(dir: &Path) -> Result<Vec<Frame>, ImportError> {
    let entries = fs::read_dir(dir).map_err(|source| ImportError::FrameDirectory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut frames = Vec::new();
    for entry in entries.flatten() {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(frame_index) {
            frames.push(Frame {
                index,
                path: entry.path(),
            });
        }
    }

    frames.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.path.cmp(&b.path)));
    Ok(frames)
}
