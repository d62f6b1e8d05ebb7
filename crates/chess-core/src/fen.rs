//! Board-only FEN helpers shared by the recognizer and the tree builder.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const STANDARD_START_BOARD: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";

/// Grid of cell classes. Row 0 is rank 8, column 0 is the a-file.
pub type BoardGrid = [[PieceClass; 8]; 8];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    #[error("Expected 8 ranks, found {0}")]
    RankCount(usize),

    #[error("Rank {rank} describes {files} files")]
    RankWidth { rank: usize, files: usize },

    #[error("Unknown piece character '{0}'")]
    UnknownPiece(char),
}

/// One of the 13 visual classes a board cell can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceClass {
    Empty,
    #[serde(rename = "w_pawn")]
    WhitePawn,
    #[serde(rename = "w_knight")]
    WhiteKnight,
    #[serde(rename = "w_bishop")]
    WhiteBishop,
    #[serde(rename = "w_rook")]
    WhiteRook,
    #[serde(rename = "w_queen")]
    WhiteQueen,
    #[serde(rename = "w_king")]
    WhiteKing,
    #[serde(rename = "b_pawn")]
    BlackPawn,
    #[serde(rename = "b_knight")]
    BlackKnight,
    #[serde(rename = "b_bishop")]
    BlackBishop,
    #[serde(rename = "b_rook")]
    BlackRook,
    #[serde(rename = "b_queen")]
    BlackQueen,
    #[serde(rename = "b_king")]
    BlackKing,
}

impl PieceClass {
    pub const ALL: [PieceClass; 13] = [
        PieceClass::Empty,
        PieceClass::WhitePawn,
        PieceClass::WhiteKnight,
        PieceClass::WhiteBishop,
        PieceClass::WhiteRook,
        PieceClass::WhiteQueen,
        PieceClass::WhiteKing,
        PieceClass::BlackPawn,
        PieceClass::BlackKnight,
        PieceClass::BlackBishop,
        PieceClass::BlackRook,
        PieceClass::BlackQueen,
        PieceClass::BlackKing,
    ];

    /// FEN character, `None` for an empty cell.
    pub fn fen_char(self) -> Option<char> {
        let c = match self {
            PieceClass::Empty => return None,
            PieceClass::WhitePawn => 'P',
            PieceClass::WhiteKnight => 'N',
            PieceClass::WhiteBishop => 'B',
            PieceClass::WhiteRook => 'R',
            PieceClass::WhiteQueen => 'Q',
            PieceClass::WhiteKing => 'K',
            PieceClass::BlackPawn => 'p',
            PieceClass::BlackKnight => 'n',
            PieceClass::BlackBishop => 'b',
            PieceClass::BlackRook => 'r',
            PieceClass::BlackQueen => 'q',
            PieceClass::BlackKing => 'k',
        };
        Some(c)
    }

    pub fn from_fen_char(c: char) -> Option<Self> {
        PieceClass::ALL
            .into_iter()
            .find(|class| class.fen_char() == Some(c))
    }

    pub fn name(self) -> &'static str {
        match self {
            PieceClass::Empty => "empty",
            PieceClass::WhitePawn => "w_pawn",
            PieceClass::WhiteKnight => "w_knight",
            PieceClass::WhiteBishop => "w_bishop",
            PieceClass::WhiteRook => "w_rook",
            PieceClass::WhiteQueen => "w_queen",
            PieceClass::WhiteKing => "w_king",
            PieceClass::BlackPawn => "b_pawn",
            PieceClass::BlackKnight => "b_knight",
            PieceClass::BlackBishop => "b_bishop",
            PieceClass::BlackRook => "b_rook",
            PieceClass::BlackQueen => "b_queen",
            PieceClass::BlackKing => "b_king",
        }
    }

    pub fn is_empty(self) -> bool {
        self == PieceClass::Empty
    }
}

impl std::fmt::Display for PieceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Encode a grid as the placement field of a FEN.
pub fn grid_to_fen(grid: &BoardGrid) -> String {
    let mut ranks = Vec::with_capacity(8);

    for row in grid {
        let mut rank = String::new();
        let mut empties = 0;
        for cell in row {
            match cell.fen_char() {
                Some(c) => {
                    if empties > 0 {
                        rank.push_str(&empties.to_string());
                        empties = 0;
                    }
                    rank.push(c);
                }
                None => empties += 1,
            }
        }
        if empties > 0 {
            rank.push_str(&empties.to_string());
        }
        ranks.push(rank);
    }

    ranks.join("/")
}

/// Parse the placement field of a FEN (full FENs are accepted, only the first
/// field is read) into a grid.
pub fn parse_fen_board(fen: &str) -> Result<BoardGrid, FenError> {
    let placement = board_part(fen);
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::RankCount(ranks.len()));
    }

    let mut grid = [[PieceClass::Empty; 8]; 8];
    for (row, rank) in ranks.iter().enumerate() {
        let mut col = 0usize;
        for c in rank.chars() {
            if let Some(skip) = c.to_digit(10) {
                col += skip as usize;
            } else {
                let class = PieceClass::from_fen_char(c).ok_or(FenError::UnknownPiece(c))?;
                if col < 8 {
                    grid[row][col] = class;
                }
                col += 1;
            }
            if col > 8 {
                return Err(FenError::RankWidth { rank: row, files: col });
            }
        }
        if col != 8 {
            return Err(FenError::RankWidth { rank: row, files: col });
        }
    }

    Ok(grid)
}

/// The placement field of a FEN, with surrounding whitespace trimmed.
pub fn board_part(fen: &str) -> &str {
    fen.split_whitespace().next().unwrap_or("")
}

/// Cheap well-formedness check: exactly seven rank separators.
pub fn has_eight_ranks(fen: &str) -> bool {
    board_part(fen).matches('/').count() == 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_position_round_trip() {
        let grid = parse_fen_board(STANDARD_START_FEN).unwrap();
        assert_eq!(grid[0][4], PieceClass::BlackKing);
        assert_eq!(grid[7][3], PieceClass::WhiteQueen);
        assert_eq!(grid[4][4], PieceClass::Empty);
        assert_eq!(grid_to_fen(&grid), STANDARD_START_BOARD);
    }

    #[test]
    fn test_grid_round_trip() {
        // Every class at least once, scattered over the board.
        let mut grid = [[PieceClass::Empty; 8]; 8];
        for (i, class) in PieceClass::ALL.iter().enumerate() {
            let square = i * 5;
            grid[square / 8][square % 8] = *class;
        }
        grid[7][7] = PieceClass::WhiteKing;

        let fen = grid_to_fen(&grid);
        assert_eq!(parse_fen_board(&fen).unwrap(), grid);
    }

    #[test]
    fn test_fen_round_trip() {
        let fens = [
            "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R",
            "8/8/8/8/8/8/8/8",
            "4k3/8/8/3Pp3/8/8/8/4K3",
        ];
        for fen in fens {
            let grid = parse_fen_board(fen).unwrap();
            assert_eq!(grid_to_fen(&grid), fen);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(
            parse_fen_board("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP"),
            Err(FenError::RankCount(7))
        );
        assert!(matches!(
            parse_fen_board("rnbqkbnr/ppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR"),
            Err(FenError::RankWidth { rank: 1, files: 7 })
        ));
        assert!(matches!(
            parse_fen_board("rnbqkbnr/pppppppp/9/8/8/8/PPPPPPPP/RNBQKBNR"),
            Err(FenError::RankWidth { rank: 2, .. })
        ));
        assert_eq!(
            parse_fen_board("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNX"),
            Err(FenError::UnknownPiece('X'))
        );
    }

    #[test]
    fn test_board_part_and_rank_check() {
        assert_eq!(board_part(STANDARD_START_FEN), STANDARD_START_BOARD);
        assert!(has_eight_ranks(STANDARD_START_FEN));
        assert!(!has_eight_ranks("8/8/8"));
        assert!(!has_eight_ranks(""));
    }
}
