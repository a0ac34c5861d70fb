use std::collections::HashMap;
use std::str::FromStr;

use chess::{Board, BoardStatus, ChessMove, Color, Piece};

use crate::errors::{Result, TunerError};

/// Terminal classification of a position, from the rules collaborator's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Ongoing,
    /// Winner's color
    Checkmate(Color),
    Stalemate,
    /// Fifty-move rule draw (100 halfmoves without capture or pawn push)
    FiftyMove,
    /// Threefold repetition draw
    Repetition,
    /// Other claimable draw (insufficient mating material)
    DrawOther,
}

/// Board legality and terminal-state detection, abstracted so the tuning core
/// never depends on a concrete move generator.
pub trait RulesEngine {
    fn is_legal(&self, mv: ChessMove) -> bool;
    fn apply(&mut self, mv: ChessMove) -> Result<()>;
    fn terminal_status(&self) -> GameStatus;
    fn side_to_move(&self) -> Color;
    fn fen(&self) -> String;
}

/// `RulesEngine` backed by the `chess` crate.
///
/// `chess::Board` tracks neither the halfmove clock nor repetitions, so both
/// live here: the clock resets on captures and pawn pushes, and the
/// repetition table is cleared on those same irreversible moves since no
/// earlier position can recur past one.
pub struct LibraryRules {
    board: Board,
    halfmove_clock: u32,
    repetitions: HashMap<u64, u32>,
}

impl LibraryRules {
    pub fn new() -> Self {
        Self::from_board(Board::default())
    }

    /// The FEN halfmove field is dropped by `chess::Board`, so the fifty-move
    /// counter starts at zero even for mid-game FENs.
    pub fn from_fen(fen: &str) -> Result<Self> {
        let board = Board::from_str(fen)
            .map_err(|e| TunerError::Resource(format!("invalid FEN '{}': {}", fen, e)))?;
        Ok(Self::from_board(board))
    }

    fn from_board(board: Board) -> Self {
        let mut repetitions = HashMap::new();
        repetitions.insert(board.get_hash(), 1);
        Self {
            board,
            halfmove_clock: 0,
            repetitions,
        }
    }
}

impl Default for LibraryRules {
    fn default() -> Self {
        Self::new()
    }
}

impl RulesEngine for LibraryRules {
    fn is_legal(&self, mv: ChessMove) -> bool {
        self.board.legal(mv)
    }

    fn apply(&mut self, mv: ChessMove) -> Result<()> {
        if !self.board.legal(mv) {
            return Err(TunerError::ContractViolation(format!(
                "illegal move {} in position {}",
                mv, self.board
            )));
        }
        let pawn_move = self.board.piece_on(mv.get_source()) == Some(Piece::Pawn);
        let capture = self.board.piece_on(mv.get_dest()).is_some();
        self.board = self.board.make_move_new(mv);
        if pawn_move || capture {
            self.halfmove_clock = 0;
            self.repetitions.clear();
        } else {
            self.halfmove_clock += 1;
        }
        *self.repetitions.entry(self.board.get_hash()).or_insert(0) += 1;
        Ok(())
    }

    fn terminal_status(&self) -> GameStatus {
        match self.board.status() {
            BoardStatus::Checkmate => GameStatus::Checkmate(!self.board.side_to_move()),
            BoardStatus::Stalemate => GameStatus::Stalemate,
            BoardStatus::Ongoing => {
                if self.repetitions.values().any(|&count| count >= 3) {
                    GameStatus::Repetition
                } else if self.halfmove_clock >= 100 {
                    GameStatus::FiftyMove
                } else if insufficient_material(&self.board) {
                    GameStatus::DrawOther
                } else {
                    GameStatus::Ongoing
                }
            }
        }
    }

    fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    fn fen(&self) -> String {
        self.board.to_string()
    }
}

/// King vs king, or king + single minor piece vs king.
fn insufficient_material(board: &Board) -> bool {
    match board.combined().popcnt() {
        2 => true,
        3 => (*board.pieces(Piece::Knight) | *board.pieces(Piece::Bishop)).popcnt() == 1,
        _ => false,
    }
}
