//! Video import driver
//!
//! Recognizes a directory of extracted frames and rebuilds the repertoire
//! tree shown in the video.
//!
//! Usage: video-import <frames_dir> [--fps 1] [--out result.json]

use std::path::PathBuf;

use anyhow::{bail, Context};
use chess_core::build_position_tree;
use serde_json::json;
use tracing::{info, warn};

use video_import::{RecognitionConfig, RecognitionPipeline};

struct Args {
    frames_dir: PathBuf,
    fps: Option<f64>,
    out: Option<PathBuf>,
}

/// Parse `<frames_dir> [--fps N] [--out FILE]` from CLI args
fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut frames_dir = None;
    let mut fps = None;
    let mut out = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--fps" => {
                let value = args.get(i + 1).context("--fps needs a value")?;
                fps = Some(value.parse().with_context(|| format!("invalid --fps {value}"))?);
                i += 2;
            }
            "--out" => {
                let value = args.get(i + 1).context("--out needs a path")?;
                out = Some(PathBuf::from(value));
                i += 2;
            }
            other if frames_dir.is_none() && !other.starts_with("--") => {
                frames_dir = Some(PathBuf::from(other));
                i += 1;
            }
            other => bail!("unexpected argument {other}"),
        }
    }

    let Some(frames_dir) = frames_dir else {
        bail!("usage: video-import <frames_dir> [--fps N] [--out FILE]");
    };
    Ok(Args { frames_dir, fps, out })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args = parse_args()?;
    let mut config = RecognitionConfig::from_env()?;
    if let Some(fps) = args.fps {
        config.frame_rate = fps;
        config.validate()?;
    }

    let pipeline = RecognitionPipeline::new(config);
    let cancel = pipeline.cancel_token();

    // Ctrl-C stops the scan at the next frame boundary
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling recognition");
            cancel.cancel();
        }
    });

    let frames_dir = args.frames_dir.clone();
    let result = tokio::task::spawn_blocking(move || {
        pipeline.recognize(&frames_dir, |processed, total| {
            info!(processed, total, percent = processed * 100 / total, "Progress");
        })
    })
    .await
    .context("recognition task panicked")?;

    let result = match result {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => {
            warn!("Recognition cancelled, no result written");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let tree = build_position_tree(&result.positions);
    match &tree {
        Some(tree) => info!(
            nodes = tree.node_count(),
            lines = tree.lines().len(),
            orientation = %tree.orientation,
            "Repertoire tree rebuilt"
        ),
        None => info!("No usable positions, no tree"),
    }

    let movetext = tree.as_ref().map(|t| t.to_movetext());
    let output = json!({
        "positions": result.positions,
        "totalFrames": result.total_frames,
        "framesWithBoard": result.frames_with_board,
        "boardRegion": result.board_region,
        "calibrationFrame": result.calibration_frame,
        "tree": tree,
        "movetext": movetext,
    });

    match args.out {
        Some(path) => {
            let body = serde_json::to_string_pretty(&output)?;
            std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Result written");
        }
        None => println!("{}", serde_json::to_string_pretty(&output)?),
    }

    Ok(())
}
