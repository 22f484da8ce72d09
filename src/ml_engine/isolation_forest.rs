//! Isolation forest: unsupervised anomaly scoring by random partitioning.
//!
//! Each tree recursively splits a random sub-sample on a random feature at a
//! uniformly drawn cut point. Anomalies sit in sparse regions and are
//! isolated after few splits, so a short average path length means a high
//! anomaly score `s = 2^(-E[h] / c(psi))`, where `psi` is the sub-sample size
//! and `c` the average unsuccessful-search path length of a binary tree.
//!
//! Trees are seeded individually from the forest seed, so the fitted model
//! is identical whether trees are built sequentially or on the rayon pool.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::defaults::EULER_GAMMA;

#[derive(Debug, Error, PartialEq)]
pub enum IsolationError {
    #[error("Need at least {needed} rows to train, got {got}")]
    TooFewSamples { needed: usize, got: usize },

    #[error("Every feature column is constant")]
    DegenerateFeatures,

    #[error("Contamination {0} is outside (0, 0.5]")]
    InvalidContamination(f64),

    #[error("Row has {got} features, model expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_samples: usize,
    pub seed: u64,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build<R: AsRef<[f64]>>(rows: &[R], sample: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(rows, sample, 0, height_limit, rng);
        tree
    }

    /// Append the subtree for `idx` and return its node index.
    fn grow<R: AsRef<[f64]>>(
        &mut self,
        rows: &[R],
        idx: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let node_id = self.nodes.len();
        if depth >= height_limit || idx.len() <= 1 {
            self.nodes.push(Node::Leaf { size: idx.len() });
            return node_id;
        }

        // Features that still vary inside this node
        let dims = rows[idx[0]].as_ref().len();
        let splittable: Vec<(usize, f64, f64)> = (0..dims)
            .filter_map(|f| {
                let (lo, hi) = idx.iter().map(|&i| rows[i].as_ref()[f]).fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), v| (lo.min(v), hi.max(v)),
                );
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();

        if splittable.is_empty() {
            self.nodes.push(Node::Leaf { size: idx.len() });
            return node_id;
        }

        let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
        let threshold = rng.gen_range(lo..hi);
        // lo <= threshold < hi, so both sides are non-empty
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .into_iter()
            .partition(|&i| rows[i].as_ref()[feature] <= threshold);

        self.nodes.push(Node::Leaf { size: 0 });
        let left = self.grow(rows, left_idx, depth + 1, height_limit, rng);
        let right = self.grow(rows, right_idx, depth + 1, height_limit, rng);
        self.nodes[node_id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        node_id
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[node] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[feature] <= threshold { left } else { right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(size),
            }
        }
    }
}

/// Average path length of an unsuccessful binary search tree lookup over `n` items.
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

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    dims: usize,
}

impl IsolationForest {
    /// Fit a forest on `rows`. Needs at least two rows and one varying column.
    pub fn fit<R: AsRef<[f64]> + Sync>(rows: &[R], params: &ForestParams) -> Result<Self, IsolationError> {
        if rows.len() < 2 {
            return Err(IsolationError::TooFewSamples {
                needed: 2,
                got: rows.len(),
            });
        }
        let dims = rows[0].as_ref().len();
        if let Some(bad) = rows.iter().find(|r| r.as_ref().len() != dims) {
            return Err(IsolationError::DimensionMismatch {
                expected: dims,
                got: bad.as_ref().len(),
            });
        }
        let varies = (0..dims).any(|f| {
            let first = rows[0].as_ref()[f];
            rows.iter().any(|r| r.as_ref()[f] != first)
        });
        if !varies {
            return Err(IsolationError::DegenerateFeatures);
        }

        let sample_size = params.max_samples.min(rows.len()).max(2);
        let height_limit = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..params.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let sample = rand::seq::index::sample(&mut rng, rows.len(), sample_size).into_vec();
                IsolationTree::build(rows, sample, height_limit, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            sample_size,
            dims,
        })
    }

    /// Anomaly score in (0, 1]; above ~0.5 is increasingly anomalous.
    pub fn score(&self, row: &[f64]) -> Result<f64, IsolationError> {
        if row.len() != self.dims {
            return Err(IsolationError::DimensionMismatch {
                expected: self.dims,
                got: row.len(),
            });
        }
        let mean_path =
            self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
        Ok(2f64.powf(-mean_path / average_path_length(self.sample_size)))
    }

    pub fn score_rows<R: AsRef<[f64]> + Sync>(&self, rows: &[R]) -> Result<Vec<f64>, IsolationError> {
        rows.par_iter().map(|r| self.score(r.as_ref())).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Score above which a sample is an outlier: the `(1 - contamination)`
/// quantile of the training scores, linearly interpolated.
pub fn outlier_threshold(scores: &[f64], contamination: f64) -> Result<f64, IsolationError> {
    if !(contamination > 0.0 && contamination <= 0.5) {
        return Err(IsolationError::InvalidContamination(contamination));
    }
    if scores.is_empty() {
        return Err(IsolationError::TooFewSamples { needed: 1, got: 0 });
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = (1.0 - contamination) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ForestParams {
        ForestParams {
            n_trees: 100,
            max_samples: 256,
            seed: 42,
        }
    }

    fn cluster_with_outlier() -> Vec<[f64; 2]> {
        let mut rng = StdRng::seed_from_u64(7);
        let mut rows: Vec<[f64; 2]> = (0..300)
            .map(|_| [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)])
            .collect();
        rows.push([12.0, -12.0]);
        rows
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) is about 10.24
        assert!((average_path_length(256) - 10.24).abs() < 0.01);
    }

    #[test]
    fn test_far_point_scores_highest() {
        let rows = cluster_with_outlier();
        let forest = IsolationForest::fit(&rows, &params()).unwrap();
        let scores = forest.score_rows(&rows).unwrap();
        let outlier = scores[300];
        assert!(outlier > 0.6, "outlier score {outlier}");
        assert!(scores[..300].iter().all(|s| *s < outlier));
    }

    #[test]
    fn test_far_point_crosses_threshold() {
        let rows = cluster_with_outlier();
        let forest = IsolationForest::fit(&rows, &params()).unwrap();
        let scores = forest.score_rows(&rows).unwrap();
        let threshold = outlier_threshold(&scores, 0.01).unwrap();
        assert!(scores[300] > threshold);
    }

    #[test]
    fn test_same_seed_same_scores() {
        let rows = cluster_with_outlier();
        let a = IsolationForest::fit(&rows, &params()).unwrap().score_rows(&rows).unwrap();
        let b = IsolationForest::fit(&rows, &params()).unwrap().score_rows(&rows).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_rows_are_rejected() {
        let rows = vec![[1.0, 2.0]; 50];
        assert_eq!(
            IsolationForest::fit(&rows, &params()).unwrap_err(),
            IsolationError::DegenerateFeatures
        );
    }

    #[test]
    fn test_threshold_interpolates() {
        let scores = [0.1, 0.2, 0.3, 0.4, 0.5];
        // position 0.9 * 4 = 3.6
        let t = outlier_threshold(&scores, 0.1).unwrap();
        assert!((t - 0.46).abs() < 1e-12);
        assert!(outlier_threshold(&scores, 0.0).is_err());
        assert!(outlier_threshold(&scores, 0.6).is_err());
    }
}
