//! K-fold cross validation

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Default number of folds
pub const DEFAULT_FOLDS: usize = 3;
/// Default shuffle seed
pub const DEFAULT_SEED: u64 = 42;

/// Splits sample indices into `n_splits` folds, each used once as test set
#[derive(Debug, Clone)]
pub struct KFold {
    n_splits: usize,
    shuffle: bool,
    seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            seed: DEFAULT_SEED,
        }
    }

    /// Shuffle indices with a fixed seed before splitting
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.shuffle = true;
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// `(train_indices, test_indices)` per fold
    ///
    /// Fewer samples than folds yields one fold per sample; earlier folds
    /// absorb the remainder.
    pub fn split(&self, n_samples: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed);
            indices.shuffle(&mut rng);
        }

        let folds = self.n_splits.clamp(1, n_samples.max(1));
        let fold_size = n_samples / folds;
        let remainder = n_samples % folds;

        let mut result = Vec::with_capacity(folds);
        let mut start = 0;
        for i in 0..folds {
            let size = if i < remainder { fold_size + 1 } else { fold_size };
            let end = start + size;
            if size == 0 {
                break;
            }

            let test = indices[start..end].to_vec();
            let mut train = Vec::with_capacity(n_samples - size);
            train.extend_from_slice(&indices[..start]);
            train.extend_from_slice(&indices[end..]);
            result.push((train, test));

            start = end;
        }
        result
    }
}

/// Per-fold scores collected during cross validation
#[derive(Debug, Clone, Default)]
pub struct FoldScores {
    pub mae: Vec<f64>,
    pub r2: Vec<f64>,
}

impl FoldScores {
    pub fn push(&mut self, mae: f64, r2: f64) {
        self.mae.push(mae);
        self.r2.push(r2);
    }

    pub fn len(&self) -> usize {
        self.mae.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mae.is_empty()
    }

    pub fn mean_mae(&self) -> f64 {
        mean(&self.mae)
    }

    pub fn mean_r2(&self) -> f64 {
        mean(&self.r2)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
