//! Synthetic board rendering shared by unit and integration tests.
//!
//! Pieces are near-solid silhouettes: a 28 px ink block per 30 px cell with
//! 6 px holes that tell the roles apart. The ink covers most of the cell so a
//! single pawn move shifts the mean absolute difference of the whole board
//! past the default change threshold, as long as a white piece stays on dark
//! squares or a black piece on light ones (1. d4 d5 does, 1. e4 does not).

use std::path::Path;

use chess_core::fen::parse_fen_board;
use chess_core::PieceClass;
use image::{imageops, GrayImage, Luma};

pub const LIGHT: u8 = 230;
pub const DARK: u8 = 30;
pub const BACKGROUND: u8 = 128;

/// Frame canvas size and where the board sits on it.
pub const CANVAS: u32 = 400;
pub const BOARD_AT: u32 = 60;
pub const CELL: u32 = 30;

/// Holes punched into the silhouette, one bit per quadrant
/// (bit 0 top-left, bit 1 top-right, bit 2 bottom-left, bit 3 bottom-right).
fn hole_mask(piece: PieceClass) -> u8 {
    match piece {
        PieceClass::Empty | PieceClass::WhitePawn | PieceClass::BlackPawn => 0,
        PieceClass::WhiteKnight | PieceClass::BlackKnight => 0b0001,
        PieceClass::WhiteBishop | PieceClass::BlackBishop => 0b0010,
        PieceClass::WhiteRook | PieceClass::BlackRook => 0b0100,
        PieceClass::WhiteQueen | PieceClass::BlackQueen => 0b1000,
        PieceClass::WhiteKing | PieceClass::BlackKing => 0b0011,
    }
}

fn ink(piece: PieceClass) -> u8 {
    match piece.fen_char() {
        Some(c) if c.is_ascii_uppercase() => 255,
        _ => 0,
    }
}

/// Render `fen` as an `8 * cell` square board. Hole geometry assumes
/// `cell` is 30.
pub fn render_board(fen: &str, cell: u32) -> GrayImage {
    let grid = parse_fen_board(fen).expect("test FEN is valid");
    let (inset, hole) = (cell / 30, cell / 5);

    GrayImage::from_fn(cell * 8, cell * 8, |x, y| {
        let (row, col) = ((y / cell) as usize, (x / cell) as usize);
        let background = if (row + col) % 2 == 0 { LIGHT } else { DARK };
        let piece = grid[row][col];
        let (px, py) = (x % cell, y % cell);

        let in_block = |p: u32| p >= inset && p < cell - inset;
        if piece.is_empty() || !in_block(px) || !in_block(py) {
            return Luma([background]);
        }

        // Holes start at cell / 5 or 3 * cell / 5 on each axis.
        let in_hole = |p: u32, high: bool| {
            let start = if high { cell * 3 / 5 } else { cell / 5 };
            p >= start && p < start + hole
        };
        let punched = (0..4u8).any(|bit| {
            hole_mask(piece) & (1 << bit) != 0 && in_hole(px, bit & 1 != 0) && in_hole(py, bit & 2 != 0)
        });
        if punched {
            Luma([background])
        } else {
            Luma([ink(piece)])
        }
    })
}

/// Write `frame_<index>.png`: the board for `fen` on a flat canvas, or just
/// the canvas when `fen` is `None`.
pub fn write_frame(dir: &Path, index: u64, fen: Option<&str>) {
    let mut canvas = GrayImage::from_pixel(CANVAS, CANVAS, Luma([BACKGROUND]));
    if let Some(fen) = fen {
        imageops::replace(&mut canvas, &render_board(fen, CELL), BOARD_AT as i64, BOARD_AT as i64);
    }
    canvas
        .save(dir.join(format!("frame_{index}.png")))
        .expect("write test frame");
}

/// Write one frame per entry, numbered from 1.
pub fn write_frames(dir: &Path, fens: &[Option<&str>]) {
    for (i, fen) in fens.iter().enumerate() {
        write_frame(dir, i as u64 + 1, *fen);
    }
}
