//! Training configuration (§6's recognized options), serializable so it can
//! round-trip through a TOML file, with the teacher's fluent-builder style.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub workers: usize,
    pub worker_concurrency: usize,
    pub total_steps: u64,
    pub checkpoint_every: u64,

    pub c_init: f32,
    pub c_base: f32,

    pub noise_alpha: f32,
    pub noise_fraction: f32,

    pub evaluations_per_turn: u32,
    pub max_turns: u32,

    pub buffer_size: usize,
    pub batch_size: usize,

    pub weight_decay: f64,
    /// `(step_threshold, learning_rate)`, ascending by threshold. The
    /// active rate is the last entry whose threshold has been reached.
    pub lr_schedule: Vec<(u64, f64)>,

    pub checkpoint_dir: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            worker_concurrency: 8,
            total_steps: 20_000,
            checkpoint_every: 500,
            c_init: 1.25,
            c_base: 19_652.0,
            noise_alpha: 0.3,
            noise_fraction: 0.25,
            evaluations_per_turn: 200,
            max_turns: 84,
            buffer_size: 100_000,
            batch_size: 256,
            weight_decay: 1e-4,
            lr_schedule: vec![(0, 2e-3), (10_000, 2e-4), (15_000, 2e-5)],
            checkpoint_dir: "checkpoints".to_string(),
        }
    }
}

impl TrainingConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_worker_concurrency(mut self, k: usize) -> Self {
        self.worker_concurrency = k;
        self
    }

    pub fn with_total_steps(mut self, steps: u64) -> Self {
        self.total_steps = steps;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<String>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// The learning rate in force at `step`, per the piecewise-constant
    /// schedule.
    pub fn learning_rate_at(&self, step: u64) -> f64 {
        self.lr_schedule
            .iter()
            .filter(|(threshold, _)| *threshold <= step)
            .last()
            .map(|(_, lr)| *lr)
            .unwrap_or(self.lr_schedule.first().map(|(_, lr)| *lr).unwrap_or(1e-3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learning_rate_follows_threshold_schedule() {
        let cfg = TrainingConfig::default();
        assert_eq!(cfg.learning_rate_at(0), 2e-3);
        assert_eq!(cfg.learning_rate_at(9_999), 2e-3);
        assert_eq!(cfg.learning_rate_at(10_000), 2e-4);
        assert_eq!(cfg.learning_rate_at(20_000), 2e-5);
    }
}
