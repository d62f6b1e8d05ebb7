//! Nearest-template cell classification.

use chess_core::fen::{grid_to_fen, BoardGrid};
use chess_core::PieceClass;
use image::{imageops, imageops::FilterType, GrayImage};

use crate::templates::{Calibration, SquareColor};

/// Result of classifying all 64 cells of one board crop.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardReading {
    pub fen: String,
    pub grid: BoardGrid,
    /// Mean best-template similarity over the 64 cells.
    pub mean_score: f64,
}

/// `1 - mean((a - b)^2) / 255^2`. Zero for empty or mismatched inputs.
pub fn compute_inverse_mse(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let squared: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    1.0 - squared / a.len() as f64 / (255.0 * 255.0)
}

/// Similarity of a cell against a template, resizing the template when the
/// dimensions differ.
fn similarity(cell: &GrayImage, template: &GrayImage) -> f64 {
    if cell.dimensions() == template.dimensions() {
        return compute_inverse_mse(cell.as_raw(), template.as_raw());
    }
    let (w, h) = cell.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }
    let resized = imageops::resize(template, w, h, FilterType::Triangle);
    compute_inverse_mse(cell.as_raw(), resized.as_raw())
}

/// Best matching piece class for one cell. Ties keep the first template in
/// key order.
fn classify_cell(cell: &GrayImage, square: SquareColor, calibration: &Calibration) -> (PieceClass, f64) {
    let mut best = (PieceClass::Empty, f64::NEG_INFINITY);
    for (key, template) in calibration.templates.for_square(square) {
        let score = similarity(cell, template);
        if score > best.1 {
            best = (key.piece, score);
        }
    }
    best
}

/// Classify every cell of `board` against the calibrated templates.
pub fn recognize(board: &GrayImage, calibration: &Calibration) -> BoardReading {
    let mut grid = [[PieceClass::Empty; 8]; 8];
    let mut total = 0.0;

    for (row, rank) in grid.iter_mut().enumerate() {
        for (col, slot) in rank.iter_mut().enumerate() {
            let cell = calibration.geometry.cell(board, row, col);
            let (piece, score) = classify_cell(&cell, SquareColor::of(row, col), calibration);
            *slot = piece;
            total += score.max(0.0);
        }
    }

    BoardReading {
        fen: grid_to_fen(&grid),
        grid,
        mean_score: total / 64.0,
    }
}
