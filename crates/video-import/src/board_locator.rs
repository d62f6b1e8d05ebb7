//! Calibration-free board localisation by checkerboard contrast.
//!
//! Square candidates are slid over the image at a handful of scales; each is
//! split into an 8x8 grid and scored by the fraction of adjacent cell pairs
//! whose mean intensities differ clearly. The winner is then grown when it
//! looks like only the interior ranks of the board were matched.

use image::{imageops, GrayImage};
use serde::Serialize;
use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::config::RecognitionConfig;
use crate::error::ImportError;

/// Horizontal plus vertical neighbour pairs in an 8x8 grid.
const ADJACENT_PAIRS: f64 = 112.0;

/// Grid counts the best candidate may actually span when it only covers part
/// of the board.
const OBSERVED_CELL_COUNTS: std::ops::RangeInclusive<u32> = 4..=7;

/// Axis-aligned board rectangle in source image pixels (`x2`/`y2` exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRegion {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub score: f64,
}

impl BoardRegion {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Copy the region out of `image`. Fails if the image is too small, which
    /// happens when a frame has different dimensions from the one the region
    /// was found in.
    pub fn crop(&self, image: &GrayImage) -> Result<GrayImage, ImportError> {
        if self.x2 > image.width() || self.y2 > image.height() {
            return Err(ImportError::Crop(format!(
                "region {}x{}+{}+{} exceeds {}x{} image",
                self.width(),
                self.height(),
                self.x1,
                self.y1,
                image.width(),
                image.height()
            )));
        }
        Ok(imageops::crop_imm(image, self.x1, self.y1, self.width(), self.height()).to_image())
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    x: u32,
    y: u32,
    size: u32,
    score: f64,
}

impl Candidate {
    fn into_region(self) -> BoardRegion {
        BoardRegion {
            x1: self.x,
            y1: self.y,
            x2: self.x + self.size,
            y2: self.y + self.size,
            score: self.score,
        }
    }
}

/// Summed-area table so any cell mean is four lookups.
struct IntegralImage {
    sums: Vec<u64>,
    stride: usize,
}

impl IntegralImage {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                row += image.get_pixel(x as u32, y as u32).0[0] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { sums, stride }
    }

    fn mean(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> f64 {
        let area = (x1 - x0) as u64 * (y1 - y0) as u64;
        if area == 0 {
            return 0.0;
        }
        let at = |x: u32, y: u32| self.sums[y as usize * self.stride + x as usize];
        let total = at(x1, y1) + at(x0, y0) - at(x1, y0) - at(x0, y1);
        total as f64 / area as f64
    }
}

pub struct BoardLocator<'a> {
    width: u32,
    height: u32,
    integral: IntegralImage,
    config: &'a RecognitionConfig,
}

impl<'a> BoardLocator<'a> {
    pub fn new(image: &GrayImage, config: &'a RecognitionConfig) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            integral: IntegralImage::new(image),
            config,
        }
    }

    /// Checkerboard score of the square at `(x, y)` with side `size`.
    pub fn score(&self, x: u32, y: u32, size: u32) -> f64 {
        self.measure(x, y, size).0
    }

    /// Score plus the mean absolute difference over all 112 adjacent cell
    /// pairs. The second value peaks when the grid lines up with the real
    /// cells; a square straddling two ranks can still score 1.0.
    fn measure(&self, x: u32, y: u32, size: u32) -> (f64, f64) {
        if size < 8 || x + size > self.width || y + size > self.height {
            return (0.0, 0.0);
        }

        let cell = size as f64 / 8.0;
        let edge = |i: u32| (i as f64 * cell).round() as u32;
        let mut means = [[0.0f64; 8]; 8];
        for (row, row_means) in means.iter_mut().enumerate() {
            let (top, bottom) = (y + edge(row as u32), y + edge(row as u32 + 1));
            for (col, mean) in row_means.iter_mut().enumerate() {
                let (left, right) = (x + edge(col as u32), x + edge(col as u32 + 1));
                *mean = self.integral.mean(left, top, right, bottom);
            }
        }

        let contrast = self.config.cell_contrast;
        let mut contrasting = 0u32;
        let mut total_diff = 0.0;
        let mut pair = |a: f64, b: f64| {
            let diff = (a - b).abs();
            total_diff += diff;
            if diff > contrast {
                contrasting += 1;
            }
        };
        for row in 0..8 {
            for col in 0..8 {
                if col < 7 {
                    pair(means[row][col], means[row][col + 1]);
                }
                if row < 7 {
                    pair(means[row][col], means[row + 1][col]);
                }
            }
        }

        (contrasting as f64 / ADJACENT_PAIRS, total_diff / ADJACENT_PAIRS)
    }

    /// Best board region (if its score clears the threshold) and the best
    /// score seen.
    pub fn locate(&self) -> (Option<BoardRegion>, f64) {
        // Without a token the search has no error path.
        self.search(None).unwrap_or((None, 0.0))
    }

    pub fn locate_with_cancel(
        &self,
        cancel: &CancelToken,
    ) -> Result<(Option<BoardRegion>, f64), ImportError> {
        self.search(Some(cancel))
    }

    fn search(
        &self,
        cancel: Option<&CancelToken>,
    ) -> Result<(Option<BoardRegion>, f64), ImportError> {
        let min_dim = self.width.min(self.height);
        let mut best: Option<Candidate> = None;

        for &scale in &self.config.locator_scales {
            if let Some(token) = cancel {
                token.check()?;
            }

            let size = (min_dim as f64 * scale) as u32;
            if size < 8 {
                continue;
            }
            let step = (size / 4).max(1);

            let mut y = 0;
            while y + size <= self.height {
                let mut x = 0;
                while x + size <= self.width {
                    let score = self.score(x, y, size);
                    if best.map_or(true, |b| score > b.score) {
                        best = Some(Candidate { x, y, size, score });
                    }
                    x += step;
                }
                y += step;
            }
            trace!(scale, size, best = ?best.map(|b| b.score), "Scale scanned");
        }

        let Some(best) = best else {
            return Ok((None, 0.0));
        };
        if best.score <= self.config.min_board_score {
            debug!(score = best.score, "No board found");
            return Ok((None, best.score));
        }

        let refined = self.refine(best, cancel)?;
        debug!(
            x = refined.x,
            y = refined.y,
            size = refined.size,
            score = refined.score,
            grown = refined.size > best.size,
            "Board located"
        );
        Ok((Some(refined.into_region()), best.score))
    }

    /// Look for a larger 8-cell square around `best`, assuming it only spanned
    /// 4..=7 real cells. Kept only if it scores at least as well and is larger.
    /// Equal scores are ranked by mean pair contrast, then size.
    fn refine(&self, best: Candidate, cancel: Option<&CancelToken>) -> Result<Candidate, ImportError> {
        let mut grown: Option<(Candidate, f64)> = None;

        for observed in OBSERVED_CELL_COUNTS {
            if let Some(token) = cancel {
                token.check()?;
            }

            let cell = best.size as f64 / observed as f64;
            let size = (cell * 8.0).round() as u32;
            if size <= best.size || size > self.width || size > self.height {
                continue;
            }

            let reach = 1.5 * cell;
            let step = (cell / 4.0).max(1.0);
            let steps = (reach / step).floor() as i64;

            for sy in -steps..=steps {
                for sx in -steps..=steps {
                    let x = best.x as f64 + sx as f64 * step;
                    let y = best.y as f64 + sy as f64 * step;
                    if x < 0.0 || y < 0.0 {
                        continue;
                    }
                    let (x, y) = (x.round() as u32, y.round() as u32);
                    if x + size > self.width || y + size > self.height {
                        continue;
                    }

                    let (score, strength) = self.measure(x, y, size);
                    if score < best.score {
                        continue;
                    }
                    let better = match grown {
                        None => true,
                        Some((current, current_strength)) => {
                            score > current.score
                                || (score == current.score
                                    && (strength > current_strength
                                        || (strength == current_strength && size > current.size)))
                        }
                    };
                    if better {
                        grown = Some((Candidate { x, y, size, score }, strength));
                    }
                }
            }
        }

        Ok(grown.map_or(best, |(candidate, _)| candidate))
    }
}

/// Convenience wrapper: locate a board in `image` with `config`.
pub fn locate_board(image: &GrayImage, config: &RecognitionConfig) -> (Option<BoardRegion>, f64) {
    BoardLocator::new(image, config).locate()
}
