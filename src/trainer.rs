use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::dataset::DatasetReader;
use crate::engine::{EngineHandle, EngineOption};
use crate::errors::{Result, TunerError};
use crate::model::{WeightModel, NUM_WEIGHTS};

/// Logistic win-probability estimate from a centipawn score, with the
/// conventional 400-point scale: +400 maps to 10/11, 0 to one half.
pub fn sigmoid(q: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(-q / 400.0))
}

/// Static evaluation oracle for one candidate weight file. Implementations
/// score a position in centipawns from White's point of view.
pub trait PositionScorer {
    fn score(&mut self, fen: &str) -> Result<i32>;
}

/// Production scorer: an engine subprocess loaded with the candidate
/// weights, queried position by position over the eval hook.
pub struct EngineScorer {
    handle: EngineHandle,
}

impl EngineScorer {
    pub fn spawn(engine_path: &Path, weights: &Path, read_timeout: Duration) -> Result<Self> {
        let weights = weights
            .canonicalize()
            .map_err(|e| TunerError::Resource(format!("cannot resolve {}: {}", weights.display(), e)))?;
        let mut handle = EngineHandle::spawn(engine_path, read_timeout)?;
        handle.configure(&[
            EngineOption::HashMb(1),
            EngineOption::UseNnue(false),
            EngineOption::WeightFile(weights),
        ])?;
        Ok(Self { handle })
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.handle.shutdown()
    }
}

impl PositionScorer for EngineScorer {
    fn score(&mut self, fen: &str) -> Result<i32> {
        self.handle.set_position(Some(fen), &[])?;
        self.handle.evaluate()
    }
}

/// Builds a fresh scorer for a persisted weight file. The seam exists so the
/// regression machinery can be exercised without engine subprocesses.
pub type ScorerFactory = dyn Fn(&Path) -> Result<Box<dyn PositionScorer>> + Send + Sync;

/// Outcome of one full coordinate-descent sweep.
#[derive(Debug, Clone, Copy)]
pub struct SweepReport {
    /// Mean squared error of the model the sweep started from.
    pub baseline: f64,
    /// Number of weights nudged this sweep.
    pub changed: usize,
}

/// Texel-style coordinate descent: per sweep, every weight is probed up and
/// down by `delta` against the dataset, and every probe that beats the
/// sweep's baseline error is committed at once.
pub struct CoordinateTrainer {
    dataset_path: PathBuf,
    work_dir: PathBuf,
    delta: i32,
    pool_size: usize,
    factory: Arc<ScorerFactory>,
}

impl CoordinateTrainer {
    pub fn new(
        dataset_path: PathBuf,
        work_dir: PathBuf,
        delta: i32,
        pool_size: usize,
        factory: Arc<ScorerFactory>,
    ) -> Result<Self> {
        if delta == 0 {
            return Err(TunerError::Resource("probe delta must be nonzero".to_string()));
        }
        if pool_size == 0 {
            return Err(TunerError::Resource("pool size must be nonzero".to_string()));
        }
        std::fs::create_dir_all(&work_dir)
            .map_err(|e| TunerError::Resource(format!("cannot create {}: {}", work_dir.display(), e)))?;
        Ok(Self {
            dataset_path,
            work_dir,
            delta,
            pool_size,
            factory,
        })
    }

    /// Trainer backed by real engine subprocesses.
    pub fn with_engine(
        dataset_path: PathBuf,
        work_dir: PathBuf,
        delta: i32,
        pool_size: usize,
        engine_path: PathBuf,
        read_timeout: Duration,
    ) -> Result<Self> {
        let factory: Arc<ScorerFactory> = Arc::new(move |weights: &Path| {
            Ok(Box::new(EngineScorer::spawn(&engine_path, weights, read_timeout)?)
                as Box<dyn PositionScorer>)
        });
        Self::new(dataset_path, work_dir, delta, pool_size, factory)
    }

    /// Mean squared error of `model` over the whole dataset: each recorded
    /// position's predicted win probability against its game's result.
    /// `tag` keeps concurrent probes' scratch weight files apart.
    pub fn model_error(&self, model: &WeightModel, tag: &str) -> Result<f64> {
        let probe_path = self.work_dir.join(format!("probe_{}.txt", tag));
        model.save(&probe_path)?;

        let run = (|| {
            let mut scorer = (self.factory)(&probe_path)?;
            let mut total = 0.0f64;
            let mut positions = 0usize;
            for game in DatasetReader::open(&self.dataset_path)? {
                let game = game?;
                for fen in &game.positions {
                    let eval = scorer.score(fen)?;
                    let diff = game.score - sigmoid(f64::from(eval));
                    total += diff * diff;
                    positions += 1;
                }
            }
            if positions == 0 {
                return Err(TunerError::DataIntegrity(
                    "dataset contains no positions".to_string(),
                ));
            }
            Ok(total / positions as f64)
        })();

        let _ = std::fs::remove_file(&probe_path);
        run
    }

    /// Probe one weight against the sweep baseline: `+delta` first, then
    /// `-delta`. Returns the committed adjustment for this index (0 when
    /// neither direction improves).
    fn probe_index(&self, model: &WeightModel, index: usize, baseline: f64) -> Result<i32> {
        let mut probe = model.clone();
        let mut deltas = vec![0i32; NUM_WEIGHTS];

        deltas[index] = self.delta;
        probe.add_delta(&deltas);
        let up = self.model_error(&probe, &format!("{}_up", index))?;
        if up < baseline {
            return Ok(self.delta);
        }

        deltas[index] = -2 * self.delta;
        probe.add_delta(&deltas);
        let down = self.model_error(&probe, &format!("{}_down", index))?;
        if down < baseline {
            return Ok(-self.delta);
        }

        Ok(0)
    }

    /// One full sweep over all weights. A probe that fails (dead scorer,
    /// unreadable dataset shard) leaves its weight untouched.
    pub fn sweep(&self, model: &mut WeightModel) -> Result<SweepReport> {
        let baseline = self.model_error(model, "baseline")?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.pool_size)
            .build()
            .map_err(|e| TunerError::Resource(format!("failed to build worker pool: {}", e)))?;

        let pb = ProgressBar::new(NUM_WEIGHTS as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} weights probed",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }

        let snapshot = model.clone();
        let deltas: Vec<i32> = pool.install(|| {
            (0..NUM_WEIGHTS)
                .into_par_iter()
                .map(|index| {
                    let delta = match self.probe_index(&snapshot, index, baseline) {
                        Ok(delta) => delta,
                        Err(e) => {
                            eprintln!("Warning: probe of weight {} failed ({})", index, e);
                            0
                        }
                    };
                    pb.inc(1);
                    delta
                })
                .collect()
        });
        pb.finish_and_clear();

        let changed = deltas.iter().filter(|d| **d != 0).count();
        model.add_delta(&deltas);
        Ok(SweepReport { baseline, changed })
    }

    /// Sweep until no weight moves (or the optional cap is hit), writing a
    /// timestamped checkpoint after each sweep.
    pub fn run(&self, model: &mut WeightModel, iterations: Option<usize>) -> Result<()> {
        let mut sweep_count = 0usize;
        loop {
            if let Some(cap) = iterations {
                if sweep_count >= cap {
                    println!("Stopping after {} sweeps (iteration cap)", sweep_count);
                    return Ok(());
                }
            }

            let report = self.sweep(model)?;
            sweep_count += 1;
            println!(
                "Sweep {}: baseline error {:.6}, {} weights adjusted",
                sweep_count, report.baseline, report.changed
            );

            let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
            let checkpoint = self.work_dir.join(format!("checkpoint_{}.txt", stamp));
            model.save(&checkpoint)?;
            println!("Checkpoint written to {}", checkpoint.display());

            if report.changed == 0 {
                println!("Converged after {} sweeps", sweep_count);
                return Ok(());
            }
        }
    }
}
