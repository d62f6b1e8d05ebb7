//! Repertoire tree reconstruction from a sequence of recognized positions.
//!
//! The builder folds positions one at a time over an arena of nodes. Each
//! position is either a continuation of the cursor by one legal move, a
//! return to a previously seen position (backtrack), or a gap that is
//! dropped. Nothing is ever linked across a gap.

use serde::Serialize;
use serde_json::Value as JsonValue;
use shakmaty::{fen::Fen, san::San, CastlingMode, Chess, Color, EnPassantMode, Position};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

use crate::fen::{grid_to_fen, parse_fen_board, BoardGrid, PieceClass};
use crate::position::RecognizedPosition;

/// Stable arena index of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    fn label(self) -> String {
        format!("n{}", self.0)
    }
}

/// Frame that first showed a node's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub frame_index: u64,
    pub timestamp_seconds: f64,
}

/// What a single `push` did to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First usable position, planted as the root.
    Root,
    /// One legal move from the cursor. `created` is false when an existing
    /// child with the same move was reused.
    Continuation { created: bool },
    /// Cursor moved back to a previously visited node.
    Backtrack,
    /// Same board as the previous usable position.
    Duplicate,
    /// Unreachable from the cursor and never seen before.
    Gap,
    /// No board was detected for this frame.
    Ignored,
}

struct TreeNode {
    board: String,
    position: Chess,
    san: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    first_seen: Provenance,
}

/// Incremental state of the reconstruction: node arena, cursor and the
/// board -> first node index.
pub struct PositionTreeBuilder {
    nodes: Vec<TreeNode>,
    cursor: Option<NodeId>,
    visited: HashMap<String, NodeId>,
    last_board: Option<String>,
}

impl Default for PositionTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionTreeBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            cursor: None,
            visited: HashMap::new(),
            last_board: None,
        }
    }

    /// Feed the next recognized position.
    pub fn push(&mut self, recognized: &RecognizedPosition) -> Transition {
        if !recognized.is_usable() {
            return Transition::Ignored;
        }

        let provenance = Provenance {
            frame_index: recognized.frame_index,
            timestamp_seconds: recognized.timestamp_seconds,
        };

        // Unparseable boards can never match anything; treat them as gaps.
        let Some(board) = canonical_board(&recognized.fen) else {
            trace!(frame = recognized.frame_index, fen = %recognized.fen, "Unparseable board, skipping");
            return Transition::Gap;
        };

        if self.last_board.as_deref() == Some(board.as_str()) {
            return Transition::Duplicate;
        }
        self.last_board = Some(board.clone());

        let Some(cursor) = self.cursor else {
            return self.plant_root(&recognized.fen, board, provenance);
        };

        if let Some((san, position)) = single_move_to(&self.nodes[cursor.0].position, &board) {
            let existing = self.nodes[cursor.0]
                .children
                .iter()
                .copied()
                .find(|child| self.nodes[child.0].san.as_deref() == Some(san.as_str()));

            let (id, created) = match existing {
                Some(id) => (id, false),
                None => {
                    let id = self.add_node(TreeNode {
                        board: board.clone(),
                        position,
                        san: Some(san.clone()),
                        parent: Some(cursor),
                        children: Vec::new(),
                        first_seen: provenance,
                    });
                    self.nodes[cursor.0].children.push(id);
                    (id, true)
                }
            };

            self.visited.entry(board).or_insert(id);
            self.cursor = Some(id);
            debug!(frame = provenance.frame_index, san = %san, created, "Continuation");
            return Transition::Continuation { created };
        }

        if let Some(&id) = self.visited.get(&board) {
            self.cursor = Some(id);
            debug!(frame = provenance.frame_index, node = %id.label(), "Backtrack");
            return Transition::Backtrack;
        }

        debug!(frame = provenance.frame_index, board = %board, "Gap, position dropped");
        Transition::Gap
    }

    fn plant_root(&mut self, fen: &str, board: String, provenance: Provenance) -> Transition {
        let Some(position) = root_position(fen) else {
            debug!(frame = provenance.frame_index, fen = %fen, "Not a legal root position, skipping");
            return Transition::Gap;
        };

        let id = self.add_node(TreeNode {
            board: board.clone(),
            position,
            san: None,
            parent: None,
            children: Vec::new(),
            first_seen: provenance,
        });
        self.visited.insert(board, id);
        self.cursor = Some(id);
        debug!(frame = provenance.frame_index, "Root planted");
        Transition::Root
    }

    fn add_node(&mut self, node: TreeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Board FEN of the node under the cursor.
    pub fn cursor_board(&self) -> Option<&str> {
        self.cursor.map(|id| self.nodes[id.0].board.as_str())
    }

    /// Freeze the arena into an owned tree. `None` if no root was ever planted.
    pub fn finish(self) -> Option<RepertoireTree> {
        let root_node = self.nodes.first()?;
        let orientation = match root_node.position.turn() {
            Color::White => "white",
            Color::Black => "black",
        };

        let provenance = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i).label(), node.first_seen))
            .collect();

        Some(RepertoireTree {
            root: self.export(NodeId(0)),
            orientation: orientation.to_string(),
            provenance,
        })
    }

    fn export(&self, id: NodeId) -> RepertoireNode {
        let node = &self.nodes[id.0];
        RepertoireNode {
            id: id.label(),
            fen: Fen::from_position(&node.position, EnPassantMode::Legal).to_string(),
            board_fen: node.board.clone(),
            mv: node.san.clone(),
            parent_id: node.parent.map(NodeId::label),
            children: node.children.iter().map(|&child| self.export(child)).collect(),
            first_seen_timestamp: node.first_seen.timestamp_seconds,
            frame_index: node.first_seen.frame_index,
        }
    }
}

/// Fold a whole sequence into a tree.
pub fn build_position_tree(positions: &[RecognizedPosition]) -> Option<RepertoireTree> {
    let mut builder = PositionTreeBuilder::new();
    let mut gaps = 0usize;
    for recognized in positions {
        if builder.push(recognized) == Transition::Gap {
            gaps += 1;
        }
    }
    debug!(nodes = builder.node_count(), gaps, "Position tree built");
    builder.finish()
}

/// Re-encode a FEN's placement field so equal boards compare equal as strings.
fn canonical_board(fen: &str) -> Option<String> {
    parse_fen_board(fen).ok().map(|grid| grid_to_fen(&grid))
}

/// Find the legal move from `position` whose result has the given placement.
fn single_move_to(position: &Chess, board: &str) -> Option<(String, Chess)> {
    for mv in position.legal_moves() {
        let mut next = position.clone();
        next.play_unchecked(mv.clone());
        if next.board().to_string() == board {
            let san = San::from_move(position, mv).to_string();
            return Some((san, next));
        }
    }
    None
}

/// Build the root position. Missing FEN fields default to white to move, no
/// en passant square and castling rights inferred from home squares.
fn root_position(fen: &str) -> Option<Chess> {
    let grid = parse_fen_board(fen).ok()?;
    let mut fields = fen.split_whitespace().skip(1);
    let turn = fields.next().unwrap_or("w");
    let castling = fields
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| infer_castling(&grid));
    let ep = fields.next().unwrap_or("-");
    let halfmoves = fields.next().unwrap_or("0");
    let fullmoves = fields.next().unwrap_or("1");

    let text = format!(
        "{} {turn} {castling} {ep} {halfmoves} {fullmoves}",
        grid_to_fen(&grid)
    );
    let setup: Fen = text.parse().ok()?;
    setup.into_position::<Chess>(CastlingMode::Standard).ok()
}

fn infer_castling(grid: &BoardGrid) -> String {
    // Row 7 is rank 1, row 0 is rank 8.
    let mut rights = String::new();
    if grid[7][4] == PieceClass::WhiteKing {
        if grid[7][7] == PieceClass::WhiteRook {
            rights.push('K');
        }
        if grid[7][0] == PieceClass::WhiteRook {
            rights.push('Q');
        }
    }
    if grid[0][4] == PieceClass::BlackKing {
        if grid[0][7] == PieceClass::BlackRook {
            rights.push('k');
        }
        if grid[0][0] == PieceClass::BlackRook {
            rights.push('q');
        }
    }
    if rights.is_empty() {
        rights.push('-');
    }
    rights
}

/// A node of the finished tree. Children are owned, in first-seen order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepertoireNode {
    pub id: String,
    pub fen: String,
    pub board_fen: String,
    #[serde(rename = "move")]
    pub mv: Option<String>,
    pub parent_id: Option<String>,
    pub children: Vec<RepertoireNode>,
    pub first_seen_timestamp: f64,
    pub frame_index: u64,
}

impl RepertoireNode {
    fn count(&self) -> usize {
        1 + self.children.iter().map(RepertoireNode::count).sum::<usize>()
    }

    fn collect_lines(&self, prefix: &mut Vec<String>, lines: &mut Vec<Vec<String>>) {
        if self.children.is_empty() {
            lines.push(prefix.clone());
            return;
        }
        for child in &self.children {
            if let Some(mv) = &child.mv {
                prefix.push(mv.clone());
            }
            child.collect_lines(prefix, lines);
            prefix.pop();
        }
    }

    fn find(&self, id: &str) -> Option<&RepertoireNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}

/// Reconstructed repertoire plus provenance for every node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepertoireTree {
    pub root: RepertoireNode,
    /// Side to move in the root position ("white" or "black").
    pub orientation: String,
    /// Node id -> frame that first showed it.
    pub provenance: BTreeMap<String, Provenance>,
}

impl RepertoireTree {
    pub fn node_count(&self) -> usize {
        self.root.count()
    }

    /// Every root-to-leaf line as SAN moves, in child order.
    pub fn lines(&self) -> Vec<Vec<String>> {
        let mut lines = Vec::new();
        self.root.collect_lines(&mut Vec::new(), &mut lines);
        lines
    }

    pub fn find(&self, id: &str) -> Option<&RepertoireNode> {
        self.root.find(id)
    }

    /// Nested JSON with `children` arrays, for editors that want the
    /// compact shape rather than the full serde form.
    pub fn to_json(&self) -> JsonValue {
        node_to_json(&self.root)
    }

    /// PGN movetext with the first child as main line and the others as
    /// parenthesised variations.
    pub fn to_movetext(&self) -> String {
        let mut tokens = Vec::new();
        write_line(&self.root, &mut tokens, true);
        tokens.join(" ")
    }
}

fn node_to_json(node: &RepertoireNode) -> JsonValue {
    let children: Vec<JsonValue> = node.children.iter().map(node_to_json).collect();

    serde_json::json!({
        "id": node.id,
        "move": node.mv,
        "fen": node.fen,
        "parentId": node.parent_id,
        "timestamp": node.first_seen_timestamp,
        "frameIndex": node.frame_index,
        "children": children,
    })
}

fn write_line(node: &RepertoireNode, tokens: &mut Vec<String>, force_number: bool) {
    let Some((main, alternatives)) = node.children.split_first() else {
        return;
    };

    tokens.push(numbered_move(&node.fen, main, force_number));
    for alt in alternatives {
        let mut variation = vec![numbered_move(&node.fen, alt, true)];
        write_line(alt, &mut variation, false);
        tokens.push(format!("({})", variation.join(" ")));
    }
    write_line(main, tokens, !alternatives.is_empty());
}

/// "12. Nf3" for white, "12... Nc6" for black when the number is forced,
/// bare SAN otherwise.
fn numbered_move(parent_fen: &str, child: &RepertoireNode, force_number: bool) -> String {
    let san = child.mv.as_deref().unwrap_or("");
    let mut fields = parent_fen.split_whitespace().skip(1);
    let white_to_move = fields.next() != Some("b");
    let fullmove = fields.nth(3).unwrap_or("1");

    if white_to_move {
        format!("{fullmove}. {san}")
    } else if force_number {
        format!("{fullmove}... {san}")
    } else {
        san.to_string()
    }
}
