use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chess::Color;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rayon::prelude::*;

use crate::engine::{EngineHandle, EngineOption, SearchLimit};
use crate::errors::{Result, TunerError};
use crate::match_runner::{MatchOutcome, MatchRunner};

/// One self-play game in the regression dataset: the game's result label
/// (1.0 white win, 0.5 draw, 0.0 black win) and the FEN of every position
/// visited before a forced mate was announced.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledGame {
    pub score: f64,
    pub positions: Vec<String>,
}

/// Append-only sink shared by the self-play workers. Each game is written as
/// a `GameData: <score> <count>` header followed by `<count>` FEN lines, and
/// the whole block goes out under one lock so games never interleave.
pub struct DatasetWriter {
    file: Mutex<File>,
}

impl DatasetWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| TunerError::Resource(format!("cannot open {}: {}", path.display(), e)))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn append(&self, game: &LabeledGame) -> Result<()> {
        let mut block = format!("GameData: {} {}\n", game.score, game.positions.len());
        for fen in &game.positions {
            block.push_str(fen);
            block.push('\n');
        }
        let mut file = self.file.lock().unwrap();
        file.write_all(block.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Streaming reader over a dataset file. Yields one `LabeledGame` per
/// `GameData:` block; a malformed header or a truncated FEN block is a data
/// integrity error, not a silent skip.
pub struct DatasetReader {
    lines: std::io::Lines<BufReader<File>>,
}

impl DatasetReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| TunerError::Resource(format!("cannot open {}: {}", path.display(), e)))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
        })
    }

    fn parse_header(line: &str) -> Result<(f64, usize)> {
        let rest = line
            .strip_prefix("GameData:")
            .ok_or_else(|| {
                TunerError::DataIntegrity(format!("expected GameData header, got: {}", line))
            })?
            .trim();
        let mut parts = rest.split_whitespace();
        let score: f64 = parts
            .next()
            .ok_or_else(|| TunerError::DataIntegrity("header missing score".to_string()))?
            .parse()?;
        let count: usize = parts
            .next()
            .ok_or_else(|| TunerError::DataIntegrity("header missing position count".to_string()))?
            .parse()?;
        Ok((score, count))
    }
}

impl Iterator for DatasetReader {
    type Item = Result<LabeledGame>;

    fn next(&mut self) -> Option<Self::Item> {
        // Skip blank lines between blocks.
        let header = loop {
            match self.lines.next()? {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => break line,
                Err(e) => return Some(Err(e.into())),
            }
        };

        let (score, count) = match Self::parse_header(&header) {
            Ok(parsed) => parsed,
            Err(e) => return Some(Err(e)),
        };

        let mut positions = Vec::with_capacity(count);
        for _ in 0..count {
            match self.lines.next() {
                Some(Ok(line)) => positions.push(line),
                Some(Err(e)) => return Some(Err(e.into())),
                None => {
                    return Some(Err(TunerError::DataIntegrity(format!(
                        "dataset truncated: expected {} positions, found {}",
                        count,
                        positions.len()
                    ))))
                }
            }
        }

        Some(Ok(LabeledGame { score, positions }))
    }
}

/// Generates the regression dataset by self-play: default-configured engine
/// vs itself from randomly sampled openings, recording every pre-mate
/// position with the final game result.
pub struct DatasetBuilder {
    pub engine_path: PathBuf,
    pub openings: Vec<String>,
    pub num_games: usize,
    pub pool_size: usize,
    pub movetime_ms: u64,
    pub read_timeout: Duration,
    pub max_moves: u32,
}

impl DatasetBuilder {
    fn play_one(&self, fen: &str) -> Result<LabeledGame> {
        let mut white = EngineHandle::spawn(&self.engine_path, self.read_timeout)?;
        let mut black = EngineHandle::spawn(&self.engine_path, self.read_timeout)?;
        let options = [EngineOption::HashMb(1), EngineOption::UseNnue(false)];
        white.configure(&options)?;
        black.configure(&options)?;

        let runner = MatchRunner::new(SearchLimit::MoveTime(self.movetime_ms), self.max_moves);
        let (result, positions) = runner.play_traced(&mut white, &mut black, fen)?;
        let _ = white.shutdown();
        let _ = black.shutdown();

        let score = match result.outcome {
            MatchOutcome::Checkmate(Color::White) => 1.0,
            MatchOutcome::Checkmate(Color::Black) => 0.0,
            _ => 0.5,
        };
        Ok(LabeledGame { score, positions })
    }

    /// Build the dataset at `dataset_path`. If the file already exists it is
    /// left untouched so a finished build is never redone by accident.
    pub fn run(&self, dataset_path: &Path) -> Result<()> {
        if dataset_path.exists() {
            println!(
                "Dataset {} already exists, skipping generation",
                dataset_path.display()
            );
            return Ok(());
        }
        if self.openings.is_empty() {
            return Err(TunerError::Resource("opening pool is empty".to_string()));
        }

        let writer = DatasetWriter::create(dataset_path)?;
        let games_done = AtomicUsize::new(0);
        let positions_done = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.pool_size)
            .build()
            .map_err(|e| TunerError::Resource(format!("failed to build worker pool: {}", e)))?;

        let pb = ProgressBar::new(self.num_games as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} self-play games",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }

        pool.install(|| -> Result<()> {
            (0..self.num_games)
                .into_par_iter()
                .map(|_| {
                    let fen = {
                        let mut rng = rand::thread_rng();
                        self.openings[rng.gen_range(0..self.openings.len())].clone()
                    };
                    match self.play_one(&fen) {
                        Ok(game) => {
                            games_done.fetch_add(1, Ordering::Relaxed);
                            positions_done.fetch_add(game.positions.len(), Ordering::Relaxed);
                            writer.append(&game)?;
                        }
                        // A crashed or silent engine loses one game, not
                        // the whole dataset build.
                        Err(e) => eprintln!("Warning: self-play game dropped ({})", e),
                    }
                    pb.inc(1);
                    Ok(())
                })
                .collect()
        })?;

        pb.finish_with_message("dataset complete");
        println!(
            "Recorded {} games, {} positions to {}",
            games_done.load(Ordering::Relaxed),
            positions_done.load(Ordering::Relaxed),
            dataset_path.display()
        );
        Ok(())
    }
}
