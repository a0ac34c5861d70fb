use std::str::FromStr;

use chess::{ChessMove, Color};

use crate::engine::{EngineHandle, SearchLimit};
use crate::errors::{Result, TunerError};
use crate::rules::{GameStatus, LibraryRules, RulesEngine};

/// Tagged outcome of one completed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Winner's color
    Checkmate(Color),
    Stalemate,
    FiftyMove,
    Repetition,
    /// Other claimable draw (insufficient material)
    Draw,
    /// Move cap reached or the game was aborted
    Unfinished,
}

/// Immutable record of one game: how it ended and the moves played.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub outcome: MatchOutcome,
    pub moves: Vec<String>,
}

/// Plays exactly one game between two engine handles, alternating by side to
/// move, until the rules collaborator reports a terminal state.
pub struct MatchRunner {
    limit: SearchLimit,
    max_moves: u32,
}

impl MatchRunner {
    pub fn new(limit: SearchLimit, max_moves: u32) -> Self {
        Self { limit, max_moves }
    }

    /// Play one game from `start_fen` to a terminal state.
    pub fn play(
        &self,
        white: &mut EngineHandle,
        black: &mut EngineHandle,
        start_fen: &str,
    ) -> Result<MatchResult> {
        Ok(self.play_traced(white, black, start_fen)?.0)
    }

    /// Like `play`, but also returns the FEN of every position a move was
    /// searched from, excluding positions reached after a forced mate was
    /// reported — those carry no evaluation signal for regression labels.
    pub fn play_traced(
        &self,
        white: &mut EngineHandle,
        black: &mut EngineHandle,
        start_fen: &str,
    ) -> Result<(MatchResult, Vec<String>)> {
        let mut rules = LibraryRules::from_fen(start_fen)?;
        let mut moves: Vec<String> = Vec::new();
        let mut fens: Vec<String> = Vec::new();
        let mut mate_seen = false;

        for _ in 0..self.max_moves {
            if let Some(outcome) = terminal_outcome(rules.terminal_status()) {
                return Ok((MatchResult { outcome, moves }, fens));
            }

            if !mate_seen {
                fens.push(rules.fen());
            }

            let handle: &mut EngineHandle = if rules.side_to_move() == Color::White {
                white
            } else {
                black
            };
            handle.set_position(Some(start_fen), &moves)?;
            let search = handle.search(self.limit)?;
            mate_seen |= search.mate;

            let mv = ChessMove::from_str(&search.best_move).map_err(|_| {
                TunerError::ContractViolation(format!(
                    "unparseable best move '{}' in position {}",
                    search.best_move,
                    rules.fen()
                ))
            })?;
            if !rules.is_legal(mv) {
                return Err(TunerError::ContractViolation(format!(
                    "engine played illegal move {} in position {}",
                    search.best_move,
                    rules.fen()
                )));
            }
            rules.apply(mv)?;
            moves.push(search.best_move);
        }

        // Check once more so a game that ends exactly on the cap is classified.
        let outcome = terminal_outcome(rules.terminal_status()).unwrap_or(MatchOutcome::Unfinished);
        Ok((MatchResult { outcome, moves }, fens))
    }
}

fn terminal_outcome(status: GameStatus) -> Option<MatchOutcome> {
    match status {
        GameStatus::Ongoing => None,
        GameStatus::Checkmate(winner) => Some(MatchOutcome::Checkmate(winner)),
        GameStatus::Stalemate => Some(MatchOutcome::Stalemate),
        GameStatus::FiftyMove => Some(MatchOutcome::FiftyMove),
        GameStatus::Repetition => Some(MatchOutcome::Repetition),
        GameStatus::DrawOther => Some(MatchOutcome::Draw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_outcome_mapping() {
        assert_eq!(terminal_outcome(GameStatus::Ongoing), None);
        assert_eq!(
            terminal_outcome(GameStatus::Checkmate(Color::White)),
            Some(MatchOutcome::Checkmate(Color::White))
        );
        assert_eq!(
            terminal_outcome(GameStatus::Repetition),
            Some(MatchOutcome::Repetition)
        );
        assert_eq!(terminal_outcome(GameStatus::DrawOther), Some(MatchOutcome::Draw));
    }
}
