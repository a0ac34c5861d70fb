//! Tuning harness for the hand-crafted evaluation weights of a UCI chess
//! engine. The engine stays a black box: candidate weight vectors are
//! persisted to files, engine subprocesses are pointed at them over the UCI
//! option channel, and their play decides which candidates survive.
//!
//! Two pipelines share the infrastructure:
//!
//! - **Evolution** (`evolve` binary): a generational loop where a population
//!   of weight models plays round-robin tournaments against a panel of the
//!   previous cycle's best, and winners breed the next generation by
//!   crossover and mutation.
//! - **Texel regression** (`texel` binary): self-play games are recorded as
//!   a labeled position dataset, then coordinate descent nudges each weight
//!   in whichever direction reduces the squared error between predicted and
//!   actual game results.

pub mod config;
pub mod dataset;
pub mod engine;
pub mod errors;
pub mod match_runner;
pub mod model;
pub mod population;
pub mod rules;
pub mod trainer;
pub mod tournament;

pub use config::TunerConfig;
pub use dataset::{DatasetBuilder, DatasetReader, DatasetWriter, LabeledGame};
pub use engine::{EngineHandle, EngineOption, SearchLimit, SearchOutcome};
pub use errors::{Result, TunerError};
pub use match_runner::{MatchOutcome, MatchResult, MatchRunner};
pub use model::{WeightModel, NUM_WEIGHTS};
pub use population::Population;
pub use rules::{GameStatus, LibraryRules, RulesEngine};
pub use trainer::{CoordinateTrainer, EngineScorer, PositionScorer, ScorerFactory};
pub use tournament::{fitness, summarize, GamePlayer, GameRecord, Tournament, UciGamePlayer};
