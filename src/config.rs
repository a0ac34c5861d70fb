use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TunerError};

fn default_threads() -> usize {
    num_cpus::get()
}

/// Everything both tuning pipelines need, loaded from one JSON file so a run
/// is reproducible from the config alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// UCI engine binary under tuning.
    pub engine_path: PathBuf,
    /// Opening book: alternating label and FEN lines.
    pub openings_path: PathBuf,
    /// Optional weight file seeding generation zero.
    pub initial_model: Option<PathBuf>,
    /// Where per-slot model files and checkpoints live.
    pub model_dir: PathBuf,
    /// Self-play regression dataset location.
    pub dataset_path: PathBuf,

    pub training_cycles: usize,
    pub population_size: usize,
    pub mutation_rate: f64,
    pub mutation_magnitude: i32,
    pub panel_size: usize,
    pub games_per_pairing: usize,
    pub game_depth: u8,
    pub max_moves: u32,

    pub selfplay_movetime_ms: u64,
    pub selfplay_games: usize,
    pub coordinate_delta: i32,

    #[serde(default = "default_threads")]
    pub tournament_threads: usize,
    #[serde(default = "default_threads")]
    pub dataset_threads: usize,
    #[serde(default = "default_threads")]
    pub regression_threads: usize,

    pub read_timeout_ms: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("./engine"),
            openings_path: PathBuf::from("openings.txt"),
            initial_model: None,
            model_dir: PathBuf::from("models"),
            dataset_path: PathBuf::from("dataset.txt"),
            training_cycles: 10,
            population_size: 16,
            mutation_rate: 0.2,
            mutation_magnitude: 50,
            panel_size: 4,
            games_per_pairing: 2,
            game_depth: 6,
            max_moves: 300,
            selfplay_movetime_ms: 100,
            selfplay_games: 1000,
            coordinate_delta: 1,
            tournament_threads: default_threads(),
            dataset_threads: default_threads(),
            regression_threads: default_threads(),
            read_timeout_ms: 10_000,
        }
    }
}

impl TunerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| TunerError::Resource(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| TunerError::DataIntegrity(format!("bad config {}: {}", path.display(), e)))
    }

    /// Check everything a run depends on before any subprocess is spawned,
    /// creating the model directory if it is missing.
    pub fn validate(&self) -> Result<()> {
        if !self.engine_path.is_file() {
            return Err(TunerError::Resource(format!(
                "engine binary not found: {}",
                self.engine_path.display()
            )));
        }
        if !self.openings_path.is_file() {
            return Err(TunerError::Resource(format!(
                "opening book not found: {}",
                self.openings_path.display()
            )));
        }
        if let Some(seed) = &self.initial_model {
            if !seed.is_file() {
                return Err(TunerError::Resource(format!(
                    "initial model not found: {}",
                    seed.display()
                )));
            }
        }
        fs::create_dir_all(&self.model_dir).map_err(|e| {
            TunerError::Resource(format!("cannot create {}: {}", self.model_dir.display(), e))
        })?;

        if self.population_size < 4 || self.population_size % 2 != 0 {
            return Err(TunerError::Resource(format!(
                "population size must be even and at least 4, got {}",
                self.population_size
            )));
        }
        if self.panel_size == 0 || self.panel_size >= self.population_size {
            return Err(TunerError::Resource(format!(
                "panel size must be between 1 and {}, got {}",
                self.population_size - 1,
                self.panel_size
            )));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(TunerError::Resource(format!(
                "mutation rate must be within [0, 1], got {}",
                self.mutation_rate
            )));
        }
        Ok(())
    }
}

/// Parse an opening book of alternating label and FEN lines into the FEN
/// pool the samplers draw from.
pub fn load_opening_fens(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| TunerError::Resource(format!("cannot read {}: {}", path.display(), e)))?;
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() % 2 != 0 {
        return Err(TunerError::DataIntegrity(format!(
            "opening book {} has an odd number of lines, expected label/FEN pairs",
            path.display()
        )));
    }
    let fens: Vec<String> = lines
        .chunks(2)
        .map(|pair| pair[1].trim().to_string())
        .collect();
    if fens.is_empty() {
        return Err(TunerError::Resource(format!(
            "opening book {} is empty",
            path.display()
        )));
    }
    Ok(fens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuner.json");
        let mut config = TunerConfig::default();
        config.population_size = 8;
        config.panel_size = 3;
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = TunerConfig::load(&path).unwrap();
        assert_eq!(loaded.population_size, 8);
        assert_eq!(loaded.panel_size, 3);
        assert_eq!(loaded.mutation_rate, config.mutation_rate);
    }

    #[test]
    fn test_load_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuner.json");
        std::fs::write(&path, r#"{"population_size": 6, "panel_size": 2}"#).unwrap();

        let loaded = TunerConfig::load(&path).unwrap();
        assert_eq!(loaded.population_size, 6);
        assert_eq!(loaded.training_cycles, TunerConfig::default().training_cycles);
        assert!(loaded.tournament_threads >= 1);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuner.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            TunerConfig::load(&path),
            Err(TunerError::DataIntegrity(_))
        ));
    }

    fn valid_config(dir: &Path) -> TunerConfig {
        let engine = dir.join("engine");
        let openings = dir.join("openings.txt");
        std::fs::write(&engine, "").unwrap();
        std::fs::write(&openings, "start\nrnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1\n").unwrap();
        TunerConfig {
            engine_path: engine,
            openings_path: openings,
            model_dir: dir.join("models"),
            dataset_path: dir.join("dataset.txt"),
            ..TunerConfig::default()
        }
    }

    #[test]
    fn test_validate_accepts_good_config_and_creates_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = valid_config(dir.path());
        config.validate().unwrap();
        assert!(config.model_dir.is_dir());
    }

    #[test]
    fn test_validate_rejects_missing_engine() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.engine_path = dir.path().join("missing");
        assert!(matches!(config.validate(), Err(TunerError::Resource(_))));
    }

    #[test]
    fn test_validate_rejects_odd_population() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.population_size = 7;
        assert!(matches!(config.validate(), Err(TunerError::Resource(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_panel() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.panel_size = config.population_size;
        assert!(matches!(config.validate(), Err(TunerError::Resource(_))));
    }

    #[test]
    fn test_opening_fens_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openings.txt");
        std::fs::write(&path, "Italian\nfen-one\nSicilian\nfen-two\n").unwrap();
        let fens = load_opening_fens(&path).unwrap();
        assert_eq!(fens, vec!["fen-one".to_string(), "fen-two".to_string()]);
    }

    #[test]
    fn test_opening_fens_rejects_odd_line_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openings.txt");
        std::fs::write(&path, "Italian\nfen-one\nSicilian\n").unwrap();
        assert!(matches!(
            load_opening_fens(&path),
            Err(TunerError::DataIntegrity(_))
        ));
    }
}
