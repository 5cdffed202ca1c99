//! Isolation forest outlier scoring.
//!
//! Trees are grown on random sub-samples; a row that is isolated after few
//! random splits is unusual. Scores follow the decision-function convention:
//! lower (negative) is more anomalous, roughly zero at the boundary.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::config::ForestConfig;
use crate::features::FeatureMatrix;

/// Euler–Mascheroni constant, used in the harmonic number approximation.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Offset applied to the raw anomaly score (automatic contamination policy).
const DECISION_OFFSET: f64 = 0.5;

/// Assigns one anomaly score per matrix row; lower = more anomalous.
pub trait OutlierScorer {
  fn score(&self, matrix: &FeatureMatrix) -> Vec<f64>;
}

#[derive(Debug)]
enum Node {
  Leaf {
    size: usize,
  },
  Split {
    feature: usize,
    threshold: f64,
    left: usize,
    right: usize,
  },
}

#[derive(Debug)]
struct Tree {
  nodes: Vec<Node>,
}

impl Tree {
  fn grow(matrix: &FeatureMatrix, rows: Vec<usize>, depth_limit: usize, rng: &mut StdRng) -> Self {
    let mut tree = Tree { nodes: Vec::new() };
    tree.build(matrix, rows, 0, depth_limit, rng);
    tree
  }

  fn build(
    &mut self,
    matrix: &FeatureMatrix,
    rows: Vec<usize>,
    depth: usize,
    depth_limit: usize,
    rng: &mut StdRng,
  ) -> usize {
    let slot = self.nodes.len();
    self.nodes.push(Node::Leaf { size: rows.len() });

    if depth >= depth_limit || rows.len() <= 1 {
      return slot;
    }

    // Only features that still vary inside this node can split it.
    let candidates: Vec<(usize, f64, f64)> = (0..matrix.cols())
      .filter_map(|c| {
        let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
          let v = matrix.get(r, c);
          (lo.min(v), hi.max(v))
        });
        (hi > lo).then_some((c, lo, hi))
      })
      .collect();

    if candidates.is_empty() {
      return slot;
    }

    let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
      .into_iter()
      .partition(|&r| matrix.get(r, feature) < threshold);

    let left = self.build(matrix, left_rows, depth + 1, depth_limit, rng);
    let right = self.build(matrix, right_rows, depth + 1, depth_limit, rng);
    self.nodes[slot] = Node::Split {
      feature,
      threshold,
      left,
      right,
    };
    slot
  }

  fn path_length(&self, row: &[f64]) -> f64 {
    let mut idx = 0;
    let mut depth = 0.0;
    loop {
      match &self.nodes[idx] {
        Node::Leaf { size } => return depth + average_path_length(*size),
        Node::Split {
          feature,
          threshold,
          left,
          right,
        } => {
          idx = if row[*feature] < *threshold { *left } else { *right };
          depth += 1.0;
        }
      }
    }
  }
}

/// Expected path length of an unsuccessful BST search over `n` points.
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

/// A forest fitted to one matrix.
#[derive(Debug)]
pub struct FittedForest {
  trees: Vec<Tree>,
  sample_size: usize,
}

impl FittedForest {
  /// `0.5 - 2^(-E[h(x)] / c(psi))`.
  pub fn decision(&self, row: &[f64]) -> f64 {
    let norm = average_path_length(self.sample_size);
    if self.trees.is_empty() || norm == 0.0 {
      return 0.0;
    }
    let mean_depth =
      self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
    DECISION_OFFSET - 2f64.powf(-mean_depth / norm)
  }

  pub fn tree_count(&self) -> usize {
    self.trees.len()
  }
}

/// Seeded isolation forest; every call to [`OutlierScorer::score`] fits afresh.
#[derive(Debug, Clone, Default)]
pub struct IsolationForest {
  config: ForestConfig,
}

impl IsolationForest {
  pub fn new(config: ForestConfig) -> Self {
    Self { config }
  }

  pub fn fit(&self, matrix: &FeatureMatrix) -> FittedForest {
    let n = matrix.rows();
    let sample_size = self.config.sample_size.min(n);
    if sample_size == 0 {
      return FittedForest {
        trees: Vec::new(),
        sample_size,
      };
    }
    let depth_limit = (sample_size as f64).log2().ceil().max(0.0) as usize;

    let mut rng = StdRng::seed_from_u64(self.config.seed);
    let trees = (0..self.config.trees)
      .map(|_| {
        let rows = index::sample(&mut rng, n, sample_size).into_vec();
        Tree::grow(matrix, rows, depth_limit, &mut rng)
      })
      .collect();

    FittedForest { trees, sample_size }
  }
}

impl OutlierScorer for IsolationForest {
  fn score(&self, matrix: &FeatureMatrix) -> Vec<f64> {
    let forest = self.fit(matrix);
    (0..matrix.rows())
      .map(|r| forest.decision(matrix.row(r)))
      .collect()
  }
}
