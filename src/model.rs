use std::fs;
use std::path::Path;

use rand::Rng;

use crate::errors::{Result, TunerError};

/// Number of tunable evaluation terms. The index layout (material values,
/// mobility tables, king-safety tables, pawn-structure tables, ...) is a
/// contract shared with the engine build; both sides must agree on it.
pub const NUM_WEIGHTS: usize = 381;

/// A gene whose magnitude reaches this bound resets to zero during mutation,
/// stopping runaway drift.
const DRIFT_LIMIT: i32 = 3000;

/// Ordered, fixed-length vector of signed evaluation weights.
///
/// Serialized as a single line of comma-separated integers, the format the
/// engine's `HCEWeightFile` option consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightModel {
    weights: Vec<i32>,
}

impl WeightModel {
    /// Zero-initialized model.
    pub fn new() -> Self {
        Self {
            weights: vec![0; NUM_WEIGHTS],
        }
    }

    pub fn from_weights(weights: Vec<i32>) -> Result<Self> {
        if weights.len() != NUM_WEIGHTS {
            return Err(TunerError::DataIntegrity(format!(
                "expected {} weights, got {}",
                NUM_WEIGHTS,
                weights.len()
            )));
        }
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &[i32] {
        &self.weights
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| TunerError::Resource(format!("cannot read {}: {}", path.display(), e)))?;
        let line = contents.lines().next().unwrap_or("");
        let weights = line
            .split(',')
            .map(|token| token.trim().parse::<i32>())
            .collect::<std::result::Result<Vec<i32>, _>>()
            .map_err(|e| {
                TunerError::DataIntegrity(format!("malformed weight in {}: {}", path.display(), e))
            })?;
        Self::from_weights(weights).map_err(|_| {
            TunerError::DataIntegrity(format!(
                "{} holds {} weights, expected {}",
                path.display(),
                line.split(',').count(),
                NUM_WEIGHTS
            ))
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let line = self
            .weights
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join(",");
        fs::write(path, line)
            .map_err(|e| TunerError::Resource(format!("cannot write {}: {}", path.display(), e)))
    }

    /// Uniform crossover: each gene independently taken from `other` with
    /// probability one half.
    pub fn crossover<R: Rng>(&mut self, other: &WeightModel, rng: &mut R) {
        for (mine, theirs) in self.weights.iter_mut().zip(other.weights.iter()) {
            if rng.gen_bool(0.5) {
                *mine = *theirs;
            }
        }
    }

    /// Mutate each gene independently with probability `rate`, adding
    /// `floor(normal_sample * magnitude)`. Genes that drift past
    /// `DRIFT_LIMIT` reset to zero.
    pub fn mutate<R: Rng>(&mut self, rng: &mut R, rate: f64, magnitude: i32) {
        for weight in self.weights.iter_mut() {
            if rng.gen::<f64>() < rate {
                let sample = irwin_hall_normal(rng);
                *weight += (sample * f64::from(magnitude)).floor() as i32;
                if weight.abs() >= DRIFT_LIMIT {
                    *weight = 0;
                }
            }
        }
    }

    /// Add per-index deltas; `deltas` must match the model length.
    pub fn add_delta(&mut self, deltas: &[i32]) {
        debug_assert_eq!(deltas.len(), self.weights.len());
        for (weight, delta) in self.weights.iter_mut().zip(deltas.iter()) {
            *weight += delta;
        }
    }

    /// Order-sensitive rolling hash, stable across runs. Useful for spotting
    /// lineage collapse between generations.
    pub fn stable_hash(&self) -> u64 {
        let mut hash: u64 = 0;
        for &weight in &self.weights {
            hash = hash.wrapping_add(weight as i64 as u64) % 0xffff_ffff;
            hash = (hash << 1) % 0xffff_ffff;
        }
        hash
    }
}

impl Default for WeightModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard normal approximated by the mean of 50 uniform(-1, 1) draws
/// (Irwin-Hall). Precision is ample for mutation noise.
fn irwin_hall_normal<R: Rng>(rng: &mut R) -> f64 {
    let mut sum = 0.0;
    for _ in 0..50 {
        sum += rng.gen_range(-1.0..1.0);
    }
    sum / 50.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.txt");

        let mut rng = StdRng::seed_from_u64(7);
        let mut model = WeightModel::new();
        model.mutate(&mut rng, 1.0, 50);

        model.save(&path).unwrap();
        let loaded = WeightModel::load(&path).unwrap();
        assert_eq!(loaded, model);

        // Serialization is lossless down to the file bytes.
        let first = std::fs::read_to_string(&path).unwrap();
        loaded.save(&path).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.txt");
        std::fs::write(&path, "1,2,3").unwrap();
        match WeightModel::load(&path) {
            Err(TunerError::DataIntegrity(_)) => {}
            other => panic!("expected DataIntegrity, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.txt");
        std::fs::write(&path, "1,two,3").unwrap();
        assert!(WeightModel::load(&path).is_err());
    }

    #[test]
    fn test_mutation_rate_zero_is_noop() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut model = WeightModel::new();
        model.mutate(&mut rng, 1.0, 50);

        let before = model.clone();
        model.mutate(&mut rng, 0.0, 50);
        assert_eq!(model, before);
    }

    #[test]
    fn test_crossover_deterministic_under_seed() {
        let mut a = WeightModel::new();
        let mut b = WeightModel::new();
        let mut setup_rng = StdRng::seed_from_u64(1);
        a.mutate(&mut setup_rng, 1.0, 100);
        b.mutate(&mut setup_rng, 1.0, 100);

        let mut child1 = a.clone();
        child1.crossover(&b, &mut StdRng::seed_from_u64(42));
        let mut child2 = a.clone();
        child2.crossover(&b, &mut StdRng::seed_from_u64(42));
        assert_eq!(child1, child2);

        // Every child gene comes from one of the parents.
        for i in 0..NUM_WEIGHTS {
            let gene = child1.weights()[i];
            assert!(gene == a.weights()[i] || gene == b.weights()[i]);
        }
    }

    #[test]
    fn test_drift_clamp_resets_to_zero() {
        let mut weights = vec![0; NUM_WEIGHTS];
        weights[0] = 2999;
        let mut model = WeightModel::from_weights(weights).unwrap();

        // Rate 1.0 forces every gene to mutate; index 0 is one step from the
        // bound, so a large magnitude will trip the reset on most seeds. Find
        // one that does.
        let mut tripped = false;
        for seed in 0..20 {
            let mut probe = model.clone();
            probe.mutate(&mut StdRng::seed_from_u64(seed), 1.0, 500);
            if probe.weights()[0] == 0 {
                tripped = true;
                break;
            }
            assert!(probe.weights()[0].abs() < DRIFT_LIMIT);
        }
        assert!(tripped, "no seed tripped the drift clamp");

        // And a direct check that in-range values survive mutation bounds.
        model.mutate(&mut StdRng::seed_from_u64(3), 1.0, 1);
        for &w in model.weights() {
            assert!(w.abs() < DRIFT_LIMIT);
        }
    }

    #[test]
    fn test_stable_hash_is_order_sensitive() {
        let mut a = vec![0; NUM_WEIGHTS];
        a[0] = 1;
        let mut b = vec![0; NUM_WEIGHTS];
        b[1] = 1;
        let ha = WeightModel::from_weights(a).unwrap().stable_hash();
        let hb = WeightModel::from_weights(b).unwrap().stable_hash();
        assert_ne!(ha, hb);
    }
}
