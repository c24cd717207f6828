//! Isolation Forest over one-dimensional samples
//!
//! Outliers sit in sparse regions and are separated from the rest by fewer random
//! splits, so their average path length through the trees is short. Scores follow
//! the usual convention: `decision_function` is negative for outliers, with the
//! zero point placed so that `contamination` of the training set falls below it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
enum Node {
    Split {
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn grow(samples: &mut [f64], max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: Self::grow_node(samples, 0, max_depth, rng),
        }
    }

    fn grow_node(samples: &mut [f64], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
        let size = samples.len();
        if depth >= max_depth || size <= 1 {
            return Node::Leaf { size };
        }

        let (min, max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        if max <= min {
            return Node::Leaf { size };
        }

        let threshold = rng.gen_range(min..max);

        // partition in place: values below the threshold first
        let mut split = 0;
        for i in 0..size {
            if samples[i] < threshold {
                samples.swap(i, split);
                split += 1;
            }
        }
        if split == 0 || split == size {
            return Node::Leaf { size };
        }

        let (left, right) = samples.split_at_mut(split);
        Node::Split {
            threshold,
            left: Box::new(Self::grow_node(left, depth + 1, max_depth, rng)),
            right: Box::new(Self::grow_node(right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, x: f64) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                Node::Leaf { size } => return depth as f64 + average_path_length(*size),
                Node::Split {
                    threshold,
                    left,
                    right,
                } => {
                    node = if x < *threshold { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful binary search tree lookup among `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Hyper-parameters of a forest fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: Option<u64>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 1000,
            max_samples: 256,
            contamination: 0.01,
            seed: None,
        }
    }
}

/// A fitted forest. Immutable once built; refits produce a new forest.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    offset: f64,
}

impl IsolationForest {
    /// Fit a forest on `samples`. Returns `None` for an empty training set.
    pub fn fit(samples: &[f64], params: &ForestParams) -> Option<Self> {
        if samples.is_empty() || params.n_estimators == 0 {
            return None;
        }

        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let sample_size = params.max_samples.max(2).min(samples.len());
        let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let mut subsample = Vec::with_capacity(sample_size);
        let trees = (0..params.n_estimators)
            .map(|_| {
                subsample.clear();
                subsample.extend(
                    rand::seq::index::sample(&mut rng, samples.len(), sample_size)
                        .into_iter()
                        .map(|i| samples[i]),
                );
                IsolationTree::grow(&mut subsample, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            offset: 0.0,
        };

        let mut training_scores: Vec<f64> =
            samples.iter().map(|&x| forest.score_sample(x)).collect();
        forest.offset = percentile(&mut training_scores, 100.0 * params.contamination);

        Some(forest)
    }

    /// Opposite of the anomaly score: in `[-1, 0)`, lower is more abnormal.
    pub fn score_sample(&self, x: f64) -> f64 {
        let mean_path = self
            .trees
            .iter()
            .map(|tree| tree.path_length(x))
            .sum::<f64>()
            / self.trees.len() as f64;

        let normalizer = average_path_length(self.sample_size);
        if normalizer > 0.0 {
            -(2.0_f64.powf(-mean_path / normalizer))
        } else {
            -0.5
        }
    }

    /// Shifted score: negative for outliers, positive for inliers.
    pub fn decision_function(&self, x: f64) -> f64 {
        self.score_sample(x) - self.offset
    }

    pub fn is_outlier(&self, x: f64) -> bool {
        self.decision_function(x) < 0.0
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// Percentile with linear interpolation between closest ranks. Sorts `values`.
fn percentile(values: &mut [f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    values[lower] + (values[upper] - values[lower]) * frac
}
