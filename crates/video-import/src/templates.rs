//! Reference templates learned from a single board assumed to show a known
//! position (normally the starting position).
//!
//! The assumption is not checked. If the calibration frame shows anything
//! else, the templates are silently wrong and so is every later reading.

use std::collections::BTreeMap;

use chess_core::fen::parse_fen_board;
use chess_core::PieceClass;
use image::{imageops, imageops::FilterType, GrayImage, Luma};
use serde::Serialize;
use tracing::debug;

use crate::error::ImportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SquareColor {
    Light,
    Dark,
}

impl SquareColor {
    /// Colour of the square at `row`/`col` of the image grid (a8 is light).
    pub fn of(row: usize, col: usize) -> Self {
        if (row + col) % 2 == 0 {
            SquareColor::Light
        } else {
            SquareColor::Dark
        }
    }

    pub fn other(self) -> Self {
        match self {
            SquareColor::Light => SquareColor::Dark,
            SquareColor::Dark => SquareColor::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CellKey {
    pub piece: PieceClass,
    pub square: SquareColor,
}

impl CellKey {
    pub fn new(piece: PieceClass, square: SquareColor) -> Self {
        Self { piece, square }
    }
}

/// Cell size and grid-line margins of a board crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellGeometry {
    pub cell_width: u32,
    pub cell_height: u32,
    pub margin_x: u32,
    pub margin_y: u32,
}

impl CellGeometry {
    pub fn for_board(width: u32, height: u32) -> Result<Self, ImportError> {
        let (cell_width, cell_height) = (width / 8, height / 8);
        let margin_x = (cell_width / 8).max(1);
        let margin_y = (cell_height / 8).max(1);

        if cell_width <= 2 * margin_x || cell_height <= 2 * margin_y {
            return Err(ImportError::Calibration(format!(
                "board crop {width}x{height} is too small for an 8x8 grid"
            )));
        }

        Ok(Self {
            cell_width,
            cell_height,
            margin_x,
            margin_y,
        })
    }

    pub fn inner_width(&self) -> u32 {
        self.cell_width - 2 * self.margin_x
    }

    pub fn inner_height(&self) -> u32 {
        self.cell_height - 2 * self.margin_y
    }

    /// Margin-cropped pixels of one cell. Clamped to the board bounds.
    pub fn cell(&self, board: &GrayImage, row: usize, col: usize) -> GrayImage {
        let x = col as u32 * self.cell_width + self.margin_x;
        let y = row as u32 * self.cell_height + self.margin_y;
        imageops::crop_imm(board, x, y, self.inner_width(), self.inner_height()).to_image()
    }
}

/// Immutable CellKey -> template mapping for one run.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTemplateSet {
    templates: BTreeMap<CellKey, GrayImage>,
}

impl ReferenceTemplateSet {
    pub fn get(&self, key: &CellKey) -> Option<&GrayImage> {
        self.templates.get(key)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Templates for cells of one square colour, in key order.
    pub fn for_square(&self, square: SquareColor) -> impl Iterator<Item = (&CellKey, &GrayImage)> {
        self.templates.iter().filter(move |(key, _)| key.square == square)
    }
}

/// Everything the matcher needs, produced once per run.
#[derive(Debug, Clone)]
pub struct Calibration {
    pub templates: ReferenceTemplateSet,
    pub geometry: CellGeometry,
    /// mean(empty light) - mean(empty dark)
    pub brightness_delta: f64,
}

/// Learn templates from `board`, assumed to show `assumed_fen`.
pub fn calibrate(board: &GrayImage, assumed_fen: &str) -> Result<Calibration, ImportError> {
    let grid = parse_fen_board(assumed_fen)
        .map_err(|e| ImportError::Calibration(format!("assumed position: {e}")))?;
    let geometry = CellGeometry::for_board(board.width(), board.height())?;

    let mut samples: BTreeMap<CellKey, Vec<GrayImage>> = BTreeMap::new();
    for (row, rank) in grid.iter().enumerate() {
        for (col, &piece) in rank.iter().enumerate() {
            let key = CellKey::new(piece, SquareColor::of(row, col));
            samples
                .entry(key)
                .or_default()
                .push(geometry.cell(board, row, col));
        }
    }

    let mut templates: BTreeMap<CellKey, GrayImage> = samples
        .iter()
        .filter_map(|(key, cells)| average(cells).map(|avg| (*key, avg)))
        .collect();

    let empty_light = templates
        .get(&CellKey::new(PieceClass::Empty, SquareColor::Light))
        .ok_or_else(|| ImportError::Calibration("no empty light square to calibrate from".into()))?;
    let empty_dark = templates
        .get(&CellKey::new(PieceClass::Empty, SquareColor::Dark))
        .ok_or_else(|| ImportError::Calibration("no empty dark square to calibrate from".into()))?;
    let brightness_delta = mean_intensity(empty_light) - mean_intensity(empty_dark);

    let mut synthesized = 0;
    for piece in PieceClass::ALL {
        for known in [SquareColor::Light, SquareColor::Dark] {
            let missing = CellKey::new(piece, known.other());
            if templates.contains_key(&missing) {
                continue;
            }
            let Some(source) = templates.get(&CellKey::new(piece, known)) else {
                continue;
            };
            let delta = match known {
                SquareColor::Light => -brightness_delta,
                SquareColor::Dark => brightness_delta,
            };
            let variant = shift_brightness(source, delta);
            templates.insert(missing, variant);
            synthesized += 1;
        }
    }

    debug!(
        templates = templates.len(),
        synthesized,
        brightness_delta,
        cell_width = geometry.cell_width,
        cell_height = geometry.cell_height,
        "Calibrated templates"
    );

    Ok(Calibration {
        templates: ReferenceTemplateSet { templates },
        geometry,
        brightness_delta,
    })
}

/// Pixel-wise mean of `cells`; samples of a different size are resized to
/// the first sample's dimensions first.
fn average(cells: &[GrayImage]) -> Option<GrayImage> {
    let first = cells.first()?;
    let (w, h) = first.dimensions();
    let mut sums = vec![0u32; (w * h) as usize];

    for cell in cells {
        let resized;
        let cell = if cell.dimensions() == (w, h) {
            cell
        } else {
            resized = imageops::resize(cell, w, h, FilterType::Triangle);
            &resized
        };
        for (sum, pixel) in sums.iter_mut().zip(cell.as_raw()) {
            *sum += *pixel as u32;
        }
    }

    let n = cells.len() as u32;
    let pixels = sums.into_iter().map(|sum| ((sum + n / 2) / n) as u8).collect();
    GrayImage::from_raw(w, h, pixels)
}

pub(crate) fn mean_intensity(image: &GrayImage) -> f64 {
    let raw = image.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    raw.iter().map(|&p| p as f64).sum::<f64>() / raw.len() as f64
}

fn shift_brightness(image: &GrayImage, delta: f64) -> GrayImage {
    let mut shifted = image.clone();
    for Luma([p]) in shifted.pixels_mut() {
        *p = (*p as f64 + delta).round().clamp(0.0, 255.0) as u8;
    }
    shifted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{render_board, DARK, LIGHT};
    use chess_core::fen::STANDARD_START_BOARD;

    #[test]
    fn test_geometry_margins() {
        let geometry = CellGeometry::for_board(240, 240).unwrap();
        assert_eq!(geometry.cell_width, 30);
        assert_eq!(geometry.margin_x, 3);
        assert_eq!(geometry.inner_width(), 24);

        // Tiny cells still lose one pixel per side.
        let tiny = CellGeometry::for_board(48, 48).unwrap();
        assert_eq!(tiny.margin_x, 1);
        assert_eq!(tiny.inner_width(), 4);

        assert!(CellGeometry::for_board(16, 16).is_err());
    }

    #[test]
    fn test_calibration_fills_every_slot() {
        let board = render_board(STANDARD_START_BOARD, 30);
        let calibration = calibrate(&board, STANDARD_START_BOARD).unwrap();

        assert_eq!(calibration.templates.len(), 26);
        assert_eq!(calibration.brightness_delta, (LIGHT - DARK) as f64);
        for piece in PieceClass::ALL {
            for square in [SquareColor::Light, SquareColor::Dark] {
                let template = calibration.templates.get(&CellKey::new(piece, square)).unwrap();
                assert_eq!(template.dimensions(), (24, 24));
            }
        }
    }

    #[test]
    fn test_missing_variant_is_shifted_copy() {
        let board = render_board(STANDARD_START_BOARD, 30);
        let calibration = calibrate(&board, STANDARD_START_BOARD).unwrap();

        // The white queen starts on a light square only.
        let light = calibration
            .templates
            .get(&CellKey::new(PieceClass::WhiteQueen, SquareColor::Light))
            .unwrap();
        let dark = calibration
            .templates
            .get(&CellKey::new(PieceClass::WhiteQueen, SquareColor::Dark))
            .unwrap();

        // Hole pixel: light square shifted down to the dark level.
        assert_eq!(light.get_pixel(17, 17).0[0], LIGHT);
        assert_eq!(dark.get_pixel(17, 17).0[0], DARK);
        // Ink pixel shifted by the same delta.
        assert_eq!(light.get_pixel(0, 0).0[0], 255);
        assert_eq!(dark.get_pixel(0, 0).0[0], 255 - (LIGHT - DARK));
    }

    #[test]
    fn test_average_resizes_off_size_samples() {
        let a = GrayImage::from_pixel(4, 4, Luma([100]));
        let b = GrayImage::from_pixel(8, 8, Luma([200]));
        let avg = average(&[a, b]).unwrap();
        assert_eq!(avg.dimensions(), (4, 4));
        assert!(avg.pixels().all(|p| p.0[0] == 150));
    }

    #[test]
    fn test_shift_brightness_clamps() {
        let image = GrayImage::from_raw(3, 1, vec![0, 128, 250]).unwrap();
        assert_eq!(shift_brightness(&image, 10.0).into_raw(), vec![10, 138, 255]);
        assert_eq!(shift_brightness(&image, -130.0).into_raw(), vec![0, 0, 120]);
    }

    #[test]
    fn test_invalid_assumed_fen() {
        let board = render_board(STANDARD_START_BOARD, 30);
        assert!(matches!(
            calibrate(&board, "not a fen"),
            Err(ImportError::Calibration(_))
        ));
    }
}
