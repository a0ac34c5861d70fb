use std::cmp::Ordering;
use std::path::Path;

use rand::Rng;

use crate::errors::{Result, TunerError};
use crate::model::WeightModel;

/// One generation of candidate weight models under evolution.
///
/// Insertion order equals rank order after each evolution step: index 0 is
/// the fittest survivor of the previous cycle. Size stays constant across
/// cycles.
pub struct Population {
    models: Vec<WeightModel>,
    size: usize,
}

impl Population {
    /// Size must be even and at least 4 so the kept half can breed.
    pub fn new(size: usize) -> Result<Self> {
        if size < 4 || size % 2 != 0 {
            return Err(TunerError::Resource(format!(
                "population size must be even and >= 4, got {}",
                size
            )));
        }
        Ok(Self {
            models: (0..size).map(|_| WeightModel::new()).collect(),
            size,
        })
    }

    pub fn from_models(models: Vec<WeightModel>) -> Result<Self> {
        let size = models.len();
        if size < 4 || size % 2 != 0 {
            return Err(TunerError::Resource(format!(
                "population size must be even and >= 4, got {}",
                size
            )));
        }
        Ok(Self { models, size })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn models(&self) -> &[WeightModel] {
        &self.models
    }

    /// Fill every slot, resuming from per-slot checkpoints where they exist:
    /// `model_dir/model_<i>.txt` first, then the seed model (mutated for
    /// every slot except 0 so one lineage preserves the unmutated seed),
    /// else a mutated zero vector.
    pub fn initialize<R: Rng>(
        &mut self,
        rate: f64,
        magnitude: i32,
        seed_file: Option<&Path>,
        model_dir: &Path,
        rng: &mut R,
    ) -> Result<()> {
        for i in 0..self.size {
            let checkpoint = model_dir.join(format!("model_{}.txt", i));
            if checkpoint.exists() {
                self.models[i] = WeightModel::load(&checkpoint)?;
                continue;
            }
            match seed_file {
                Some(seed) if seed.exists() => {
                    self.models[i] = WeightModel::load(seed)?;
                    if i > 0 {
                        self.models[i].mutate(rng, rate, magnitude);
                    }
                }
                _ => {
                    self.models[i] = WeightModel::new();
                    self.models[i].mutate(rng, rate, magnitude);
                }
            }
        }
        Ok(())
    }

    /// Persist every model to its index-qualified file under `dir`.
    pub fn save_all(&self, dir: &Path) -> Result<()> {
        for (i, model) in self.models.iter().enumerate() {
            model.save(dir.join(format!("model_{}.txt", i)))?;
        }
        Ok(())
    }

    /// Replace this generation with its successor: rank by fitness, keep the
    /// top half, refill by crossover + mutation.
    ///
    /// Children come from adjacent kept pairs `(kept[i], kept[i+1])`, plus
    /// one final child bred from the best kept model and a uniformly random
    /// kept model, restoring the population to its fixed size.
    pub fn create_next_generation<R: Rng>(
        &mut self,
        fitness: &[f64],
        rate: f64,
        magnitude: i32,
        rng: &mut R,
    ) -> Result<()> {
        if fitness.len() != self.size {
            return Err(TunerError::DataIntegrity(format!(
                "fitness vector length {} does not match population size {}",
                fitness.len(),
                self.size
            )));
        }

        // Rank descending by fitness; ties keep original index order so
        // identical fitness vectors always rank identically.
        let mut order: Vec<usize> = (0..self.size).collect();
        order.sort_by(|&a, &b| {
            fitness[b]
                .partial_cmp(&fitness[a])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });

        let keep = self.size / 2;
        let kept: Vec<WeightModel> = order[..keep]
            .iter()
            .map(|&i| self.models[i].clone())
            .collect();

        let kept_fitness: Vec<f64> = order[..keep].iter().map(|&i| fitness[i]).collect();
        println!(
            "Kept fitness: {:?}",
            kept_fitness
                .iter()
                .map(|f| (f * 1000.0).round() / 1000.0)
                .collect::<Vec<f64>>()
        );

        let mut next = kept.clone();
        for i in 0..keep - 1 {
            let mut child = kept[i].clone();
            child.crossover(&kept[i + 1], rng);
            child.mutate(rng, rate, magnitude);
            next.push(child);
        }
        // One slot short: breed the best survivor with a random one.
        let partner = rng.gen_range(0..keep);
        let mut child = kept[0].clone();
        child.crossover(&kept[partner], rng);
        child.mutate(rng, rate, magnitude);
        next.push(child);

        debug_assert_eq!(next.len(), self.size);
        self.models = next;
        Ok(())
    }
}
