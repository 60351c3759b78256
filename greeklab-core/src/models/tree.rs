//! CART regression tree (squared-error splits).
//!
//! Shared building block of the bagged forest and the boosting ensemble.
//! Classification is handled by regressing on 0/1 labels, so a leaf value is
//! the fraction of positive samples that reached it.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all of them.
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Node,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Fit on the rows selected by `indices` (repeats allowed, for bootstrap
    /// samples). `rows[i]` and `targets[i]` describe sample `i`.
    pub fn fit<R: Rng>(
        rows: &[&[f64]],
        targets: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let n_features = rows.first().map_or(0, |r| r.len());
        let builder = Builder {
            rows,
            targets,
            params,
            n_features,
        };
        let root = builder.build(indices, 0, rng);
        Self { root }
    }

    /// A single-leaf tree.
    pub fn constant(value: f64) -> Self {
        Self {
            root: Node::Leaf { value },
        }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = x.get(*feature).copied().unwrap_or(0.0);
                    node = if v <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }

    pub fn n_leaves(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => walk(left) + walk(right),
            }
        }
        walk(&self.root)
    }
}

struct Builder<'a> {
    rows: &'a [&'a [f64]],
    targets: &'a [f64],
    params: &'a TreeParams,
    n_features: usize,
}

impl Builder<'_> {
    fn build<R: Rng>(&self, indices: &[usize], depth: usize, rng: &mut R) -> Node {
        let mean = mean_of(self.targets, indices);
        let min_leaf = self.params.min_samples_leaf.max(1);

        // `depth` counts splits above this node; max_depth bounds the splits.
        if depth >= self.params.max_depth || indices.len() < 2 * min_leaf {
            return Node::Leaf { value: mean };
        }

        let Some(best) = self.best_split(indices, min_leaf, rng) else {
            return Node::Leaf { value: mean };
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.rows[i][best.feature] <= best.threshold);

        let left = self.build(&left_idx, depth + 1, rng);
        let right = self.build(&right_idx, depth + 1, rng);
        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn best_split<R: Rng>(&self, indices: &[usize], min_leaf: usize, rng: &mut R) -> Option<Candidate> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        if let Some(k) = self.params.max_features {
            features.shuffle(rng);
            features.truncate(k.clamp(1, self.n_features.max(1)));
            // Deterministic scan order keeps tie-breaking independent of the shuffle.
            features.sort_unstable();
        }

        let n = indices.len() as f64;
        let total: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let parent_score = total * total / n;

        let mut best: Option<Candidate> = None;
        let mut order = indices.to_vec();
        for &feature in &features {
            order.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut left_sum = 0.0;
            for k in 0..order.len() - 1 {
                left_sum += self.targets[order[k]];
                let n_left = k + 1;
                let n_right = order.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let here = self.rows[order[k]][feature];
                let next = self.rows[order[k + 1]][feature];
                if here == next {
                    continue;
                }
                let right_sum = total - left_sum;
                // SSE reduction, up to the constant sum of squares.
                let gain = left_sum * left_sum / n_left as f64
                    + right_sum * right_sum / n_right as f64
                    - parent_score;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Candidate {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

fn mean_of(targets: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(depth: usize) -> TreeParams {
        TreeParams {
            max_depth: depth,
            min_samples_leaf: 1,
            max_features: None,
        }
    }

    #[test]
    fn learns_a_step_function() {
        let data: Vec<[f64; 2]> = (0..20).map(|i| [i as f64, 0.0]).collect();
        let rows: Vec<&[f64]> = data.iter().map(|r| r.as_slice()).collect();
        let targets: Vec<f64> = (0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect();
        let idx: Vec<usize> = (0..20).collect();
        let tree = RegressionTree::fit(&rows, &targets, &idx, &params(3), &mut StdRng::seed_from_u64(0));
        assert_eq!(tree.predict(&[2.0, 0.0]), 0.0);
        assert_eq!(tree.predict(&[15.0, 0.0]), 1.0);
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn depth_limit_respected() {
        let data: Vec<[f64; 1]> = (0..64).map(|i| [i as f64]).collect();
        let rows: Vec<&[f64]> = data.iter().map(|r| r.as_slice()).collect();
        let targets: Vec<f64> = (0..64).map(|i| (i as f64).sin()).collect();
        let idx: Vec<usize> = (0..64).collect();
        let tree = RegressionTree::fit(&rows, &targets, &idx, &params(3), &mut StdRng::seed_from_u64(0));
        assert!(tree.depth() <= 4);
    }

    #[test]
    fn min_leaf_respected() {
        let data: Vec<[f64; 1]> = (0..10).map(|i| [i as f64]).collect();
        let rows: Vec<&[f64]> = data.iter().map(|r| r.as_slice()).collect();
        let mut targets = vec![0.0; 10];
        targets[9] = 1.0;
        let idx: Vec<usize> = (0..10).collect();
        let p = TreeParams {
            max_depth: 5,
            min_samples_leaf: 3,
            max_features: None,
        };
        let tree = RegressionTree::fit(&rows, &targets, &idx, &p, &mut StdRng::seed_from_u64(0));
        // The lone positive cannot be isolated in a leaf smaller than 3.
        assert!(tree.predict(&[9.0]) < 1.0);
    }

    #[test]
    fn constant_targets_give_single_leaf() {
        let data: Vec<[f64; 1]> = (0..10).map(|i| [i as f64]).collect();
        let rows: Vec<&[f64]> = data.iter().map(|r| r.as_slice()).collect();
        let targets = vec![0.25; 10];
        let idx: Vec<usize> = (0..10).collect();
        let tree = RegressionTree::fit(&rows, &targets, &idx, &params(4), &mut StdRng::seed_from_u64(0));
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict(&[100.0]), 0.25);
    }
}
