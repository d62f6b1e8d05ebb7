pub mod fen;
pub mod position;
pub mod position_tree;

pub use fen::{grid_to_fen, parse_fen_board, BoardGrid, FenError, PieceClass};
pub use position::RecognizedPosition;
pub use position_tree::{build_position_tree, PositionTreeBuilder, RepertoireNode, RepertoireTree};
