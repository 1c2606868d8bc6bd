//! Replay buffer (C5): a fixed-capacity ring of training examples, with
//! without-replacement sampling. Mirrors the `insert`/`sample` ring
//! semantics of the original numpy-array implementation.

use rand::seq::index::sample as sample_indices;
use rand::Rng;

/// One training example: the evaluator's input tensor (flattened) and its
/// label, `[outcome, pi_0, .., pi_{M-1}]`.
#[derive(Clone, Debug)]
pub struct Example {
    pub features: Vec<f32>,
    pub label: Vec<f32>,
}

pub struct ReplayBuffer {
    capacity: usize,
    slots: Vec<Option<Example>>,
    oldest_index: usize,
    size: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay buffer capacity must be positive");
        Self {
            capacity,
            slots: vec![None; capacity],
            oldest_index: 0,
            size: 0,
        }
    }

    pub fn insert(&mut self, example: Example) {
        self.slots[self.oldest_index] = Some(example);
        self.oldest_index = (self.oldest_index + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Gathers `min(n, len())` distinct examples, sampled uniformly without
    /// replacement from the populated prefix.
    pub fn sample(&self, n: usize, rng: &mut impl Rng) -> Vec<&Example> {
        let n = n.min(self.size);
        sample_indices(rng, self.size, n)
            .into_iter()
            .map(|i| self.slots[i].as_ref().expect("index < size is always populated"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn example(tag: f32) -> Example {
        Example {
            features: vec![tag],
            label: vec![tag],
        }
    }

    #[test]
    fn ring_overwrites_oldest_entries() {
        let mut buf = ReplayBuffer::new(3);
        for i in 1..=5 {
            buf.insert(example(i as f32));
        }
        assert_eq!(buf.len(), 3);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let sampled = buf.sample(10, &mut rng);
        assert_eq!(sampled.len(), 3);
        let mut tags: Vec<i32> = sampled.iter().map(|e| e.features[0] as i32).collect();
        tags.sort_unstable();
        assert_eq!(tags, vec![3, 4, 5]);
    }

    #[test]
    fn sample_never_duplicates_indices() {
        let mut buf = ReplayBuffer::new(8);
        for i in 0..8 {
            buf.insert(example(i as f32));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let sampled = buf.sample(8, &mut rng);
        let mut tags: Vec<i32> = sampled.iter().map(|e| e.features[0] as i32).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), 8);
    }

    #[test]
    fn empty_buffer_samples_nothing() {
        let buf = ReplayBuffer::new(4);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(buf.sample(4, &mut rng).is_empty());
    }
}
