use std::path::{Path, PathBuf};
use std::time::Duration;

use chess::Color;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rayon::prelude::*;

use crate::engine::{EngineHandle, EngineOption, SearchLimit};
use crate::errors::{Result, TunerError};
use crate::match_runner::{MatchOutcome, MatchResult, MatchRunner};
use crate::population::Population;

/// One recorded game: which model indices held each color, and how it ended.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub white: usize,
    pub black: usize,
    pub result: MatchResult,
}

/// The engine-process seam of the tournament: plays one game between two
/// persisted weight files from a starting FEN.
pub trait GamePlayer: Sync {
    fn play(&self, white_weights: &Path, black_weights: &Path, start_fen: &str)
        -> Result<MatchResult>;
}

/// Production `GamePlayer`: two engine subprocesses per game, each configured
/// with its side's weight file, torn down when the game ends.
pub struct UciGamePlayer {
    pub engine_path: PathBuf,
    pub limit: SearchLimit,
    pub read_timeout: Duration,
    pub max_moves: u32,
}

impl UciGamePlayer {
    fn spawn_side(&self, weights: &Path) -> Result<EngineHandle> {
        let weights = weights
            .canonicalize()
            .map_err(|e| TunerError::Resource(format!("cannot resolve {}: {}", weights.display(), e)))?;
        let mut handle = EngineHandle::spawn(&self.engine_path, self.read_timeout)?;
        handle.configure(&[
            EngineOption::HashMb(1),
            EngineOption::UseNnue(false),
            EngineOption::WeightFile(weights),
        ])?;
        Ok(handle)
    }
}

impl GamePlayer for UciGamePlayer {
    fn play(
        &self,
        white_weights: &Path,
        black_weights: &Path,
        start_fen: &str,
    ) -> Result<MatchResult> {
        let mut white = self.spawn_side(white_weights)?;
        let mut black = self.spawn_side(black_weights)?;
        let result = MatchRunner::new(self.limit, self.max_moves).play(&mut white, &mut black, start_fen);
        // Shut both sides down on every path; Drop covers the error exits.
        let _ = white.shutdown();
        let _ = black.shutdown();
        result
    }
}

/// Concurrent round-robin of one generation against a fixed panel of
/// reference models (the top-ranked slots of the previous cycle).
pub struct Tournament<P: GamePlayer> {
    player: P,
    openings: Vec<String>,
    panel_size: usize,
    pool_size: usize,
    model_dir: PathBuf,
}

impl<P: GamePlayer> Tournament<P> {
    pub fn new(
        player: P,
        openings: Vec<String>,
        panel_size: usize,
        pool_size: usize,
        model_dir: PathBuf,
    ) -> Result<Self> {
        if openings.is_empty() {
            return Err(TunerError::Resource("opening pool is empty".to_string()));
        }
        if panel_size == 0 || pool_size == 0 {
            return Err(TunerError::Resource(
                "panel size and pool size must be nonzero".to_string(),
            ));
        }
        Ok(Self {
            player,
            openings,
            panel_size,
            pool_size,
            model_dir,
        })
    }

    fn model_path(&self, index: usize) -> PathBuf {
        self.model_dir.join(format!("model_{}.txt", index))
    }

    /// Persist every model, then play the full schedule: one worker task per
    /// population member on a bounded pool, each playing every panel opponent
    /// once as each color from `games_per_pairing` sampled openings. Blocks
    /// until all workers have joined.
    pub fn run(&self, population: &Population, games_per_pairing: usize) -> Result<Vec<GameRecord>> {
        // The reserve opponent at index `panel_size` must exist: a model
        // whose own index falls inside the panel plays it instead of itself.
        if self.panel_size >= population.len() {
            return Err(TunerError::Resource(format!(
                "panel size {} requires a population larger than {}",
                self.panel_size,
                self.panel_size
            )));
        }

        population.save_all(&self.model_dir)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.pool_size)
            .build()
            .map_err(|e| TunerError::Resource(format!("failed to build worker pool: {}", e)))?;

        let pb = ProgressBar::new(population.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tournament workers",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }

        let blocks: Result<Vec<Vec<GameRecord>>> = pool.install(|| {
            (0..population.len())
                .into_par_iter()
                .map(|model_index| {
                    let block = self.run_worker(model_index, games_per_pairing);
                    pb.inc(1);
                    block
                })
                .collect()
        });
        pb.finish_with_message("tournament complete");

        Ok(blocks?.into_iter().flatten().collect())
    }

    /// Schedule for one population member. A protocol failure aborts this
    /// worker's remaining games but never the tournament; a contract
    /// violation aborts the whole run.
    fn run_worker(&self, model_index: usize, games_per_pairing: usize) -> Result<Vec<GameRecord>> {
        let mut rng = rand::thread_rng();
        let fens: Vec<&String> = (0..games_per_pairing)
            .map(|_| &self.openings[rng.gen_range(0..self.openings.len())])
            .collect();

        let model_path = self.model_path(model_index);
        let mut records = Vec::with_capacity(2 * self.panel_size * games_per_pairing);

        for slot in 0..self.panel_size {
            // Self-play is excluded: a panel slot matching the model's own
            // index is swapped for the reserve opponent.
            let opponent_index = if slot == model_index { self.panel_size } else { slot };
            let opponent_path = self.model_path(opponent_index);

            for fen in &fens {
                let pairings = [
                    (model_index, &model_path, opponent_index, &opponent_path),
                    (opponent_index, &opponent_path, model_index, &model_path),
                ];
                for (white, white_path, black, black_path) in pairings {
                    match self.player.play(white_path, black_path, fen) {
                        Ok(result) => records.push(GameRecord { white, black, result }),
                        Err(e @ TunerError::ContractViolation(_)) => return Err(e),
                        Err(e) => {
                            eprintln!(
                                "Warning: worker {} aborted after failed game ({})",
                                model_index, e
                            );
                            return Ok(records);
                        }
                    }
                }
            }
        }

        Ok(records)
    }
}

/// Reduce raw match records to a normalized per-model score in [0, 1]:
/// 1 point to the checkmating side, half a point each for any draw
/// classification, nothing for an unfinished game (neither points nor
/// denominator, so a crashed opponent cannot skew a healthy model's ratio).
///
/// A model with zero counted games scores 0.0 with a warning rather than
/// dividing by zero.
pub fn fitness(records: &[GameRecord], population_size: usize) -> Vec<f64> {
    let mut points = vec![0.0f64; population_size];
    let mut games = vec![0u32; population_size];

    for record in records {
        let (white, black) = (record.white, record.black);
        if white >= population_size || black >= population_size {
            continue;
        }
        match record.result.outcome {
            MatchOutcome::Unfinished => continue,
            MatchOutcome::Checkmate(winner) => {
                games[white] += 1;
                games[black] += 1;
                if winner == Color::White {
                    points[white] += 1.0;
                } else {
                    points[black] += 1.0;
                }
            }
            MatchOutcome::Stalemate
            | MatchOutcome::FiftyMove
            | MatchOutcome::Repetition
            | MatchOutcome::Draw => {
                games[white] += 1;
                games[black] += 1;
                points[white] += 0.5;
                points[black] += 0.5;
            }
        }
    }

    (0..population_size)
        .map(|i| {
            if games[i] == 0 {
                eprintln!(
                    "Warning: model {} played no finished games, fitness defaulted to 0.0",
                    i
                );
                0.0
            } else {
                points[i] / f64::from(games[i])
            }
        })
        .collect()
}

/// Plain-text win/draw/loss tally across all recorded games.
pub fn summarize(records: &[GameRecord]) -> String {
    let mut white_wins = 0usize;
    let mut black_wins = 0usize;
    let mut draws = 0usize;
    let mut unfinished = 0usize;
    for record in records {
        match record.result.outcome {
            MatchOutcome::Checkmate(Color::White) => white_wins += 1,
            MatchOutcome::Checkmate(Color::Black) => black_wins += 1,
            MatchOutcome::Unfinished => unfinished += 1,
            _ => draws += 1,
        }
    }
    format!(
        "games: {} | white wins: {} | black wins: {} | draws: {} | unfinished: {}",
        records.len(),
        white_wins,
        black_wins,
        draws,
        unfinished
    )
}
