//! Bagged CART classification trees
//!
//! Trees split on weighted Gini impurity over a random feature subset and
//! are grown on bootstrap resamples. Every node keeps its weighted class
//! distribution, which gives two things for free:
//!
//! - `predict_proba`: the mean leaf distribution across trees
//! - path contributions: walking root → leaf, the change in class
//!   distribution at each split is credited to the split feature, so
//!   `bias + Σ contributions == predict_proba` exactly

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split
    pub max_features: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Split {
    feature: usize,
    threshold: f64,
    left: usize,
    right: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Node {
    /// Weighted class distribution of the training samples reaching this node
    value: Vec<f64>,
    split: Option<Split>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

fn gini_sum_sq(counts: impl Iterator<Item = f64>, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.map(|c| (c / total).powi(2)).sum::<f64>()
}

struct Builder<'a> {
    x: &'a Array2<f64>,
    y: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
    params: TreeParams,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl Builder<'_> {
    fn class_totals(&self, indices: &[usize]) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_classes];
        for &i in indices {
            totals[self.y[i]] += self.weights[i];
        }
        totals
    }

    fn build(&mut self, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let totals = self.class_totals(&indices);
        let total: f64 = totals.iter().sum();
        let value = totals
            .iter()
            .map(|c| if total > 0.0 { c / total } else { 0.0 })
            .collect();

        let id = self.nodes.len();
        self.nodes.push(Node { value, split: None });

        let impurity = gini_sum_sq(totals.iter().copied(), total);
        if depth >= self.params.max_depth
            || indices.len() < self.params.min_samples_split
            || indices.len() < 2 * self.params.min_samples_leaf
            || impurity <= f64::EPSILON
        {
            return id;
        }

        let Some(best) = self.best_split(&indices, &totals, total, impurity, rng) else {
            return id;
        };
        self.importances[best.feature] += best.gain;

        let x = self.x;
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, best.feature]] <= best.threshold);

        let left = self.build(left, depth + 1, rng);
        let right = self.build(right, depth + 1, rng);
        self.nodes[id].split = Some(Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        });
        id
    }

    /// Best split among a random feature subset.
    ///
    /// Keeps drawing features past `max_features` until at least one valid
    /// split has been seen.
    fn best_split(
        &self,
        indices: &[usize],
        totals: &[f64],
        total: f64,
        impurity: f64,
        rng: &mut StdRng,
    ) -> Option<Candidate> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(rng);

        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<Candidate> = None;
        let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(indices.len());

        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.params.max_features && best.is_some() {
                break;
            }

            sorted.clear();
            sorted.extend(indices.iter().map(|&i| (self.x[[i, feature]], i)));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0.0; self.n_classes];
            let mut left_total = 0.0;
            for pos in 0..sorted.len() - 1 {
                let (current, i) = sorted[pos];
                left[self.y[i]] += self.weights[i];
                left_total += self.weights[i];

                let n_left = pos + 1;
                if n_left < min_leaf || sorted.len() - n_left < min_leaf {
                    continue;
                }
                let next = sorted[pos + 1].0;
                if next <= current {
                    continue;
                }

                let right_total = total - left_total;
                let left_gini = gini_sum_sq(left.iter().copied(), left_total);
                let right_gini = gini_sum_sq(
                    totals.iter().zip(&left).map(|(t, l)| t - l),
                    right_total,
                );
                let gain = total * impurity - left_total * left_gini - right_total * right_gini;

                if best.is_none_or(|b| gain > b.gain + 1e-12) && gain > 1e-12 {
                    let mut threshold = (current + next) / 2.0;
                    if threshold >= next {
                        threshold = current;
                    }
                    best = Some(Candidate {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// A single fitted classification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    /// Normalized impurity decrease per feature
    importances: Vec<f64>,
}

impl DecisionTree {
    fn fit(
        x: &Array2<f64>,
        y: &[usize],
        weights: &[f64],
        indices: Vec<usize>,
        n_classes: usize,
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut builder = Builder {
            x,
            y,
            weights,
            n_classes,
            params,
            nodes: Vec::new(),
            importances: vec![0.0; x.ncols()],
        };
        builder.build(indices, 0, rng);

        let mut importances = builder.importances;
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        }

        Self {
            nodes: builder.nodes,
            importances,
        }
    }

    /// Node ids from the root to the leaf reached by `row`.
    fn path(&self, row: &[f64]) -> Vec<usize> {
        let mut path = vec![0];
        let mut id = 0;
        while let Some(split) = self.nodes[id].split {
            id = if row[split.feature] <= split.threshold {
                split.left
            } else {
                split.right
            };
            path.push(id);
        }
        path
    }

    pub fn predict_proba(&self, row: &[f64]) -> &[f64] {
        let leaf = self.path(row).last().copied().unwrap_or(0);
        &self.nodes[leaf].value
    }

    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Node], id: usize) -> usize {
            match nodes[id].split {
                Some(s) => 1 + depth_of(nodes, s.left).max(depth_of(nodes, s.right)),
                None => 0,
            }
        }
        depth_of(&self.nodes, 0)
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Per-feature, per-class contributions to one prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Contributions {
    /// Mean root distribution (the prior before any split)
    pub bias: Vec<f64>,
    /// Shape (features, classes)
    pub values: Array2<f64>,
}

impl Contributions {
    /// Signed contribution of each feature toward `class`.
    pub fn for_class(&self, class: usize) -> Vec<f64> {
        self.values.column(class).to_vec()
    }
}

/// Forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub tree: TreeParams,
    pub seed: u64,
}

/// Bootstrap-aggregated decision trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    n_classes: usize,
}

impl RandomForest {
    /// Fit on `x` (one sample per row) with class labels `y` in
    /// `0..n_classes` and per-sample weights.
    pub fn fit(
        x: &Array2<f64>,
        y: &[usize],
        sample_weight: &[f64],
        n_classes: usize,
        params: &ForestParams,
    ) -> Result<Self, CoreError> {
        let n = x.nrows();
        if n == 0 {
            return Err(CoreError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if y.len() != n || sample_weight.len() != n {
            return Err(CoreError::invalid_parameter(
                "labels",
                format!(
                    "{} rows, {} labels, {} weights",
                    n,
                    y.len(),
                    sample_weight.len()
                ),
            ));
        }
        if let Some(bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(CoreError::invalid_parameter(
                "labels",
                format!("class {bad} outside 0..{n_classes}"),
            ));
        }
        if params.n_estimators == 0 {
            return Err(CoreError::invalid_parameter("n_estimators", "must be at least 1"));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let trees: Vec<DecisionTree> = (0..params.n_estimators)
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.random());
                let bootstrap: Vec<usize> =
                    (0..n).map(|_| tree_rng.random_range(0..n)).collect();
                DecisionTree::fit(
                    x,
                    y,
                    sample_weight,
                    bootstrap,
                    n_classes,
                    params.tree,
                    &mut tree_rng,
                )
            })
            .collect();

        debug!(
            trees = trees.len(),
            max_depth = trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
            "forest fitted"
        );

        Ok(Self {
            trees,
            n_features: x.ncols(),
            n_classes,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean class distribution across trees.
    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, v) in proba.iter_mut().zip(tree.predict_proba(row)) {
                *p += v;
            }
        }
        let n = self.trees.len().max(1) as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        proba
    }

    /// Mean impurity decrease per feature, summing to 1.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (acc, v) in importances.iter_mut().zip(&tree.importances) {
                *acc += v;
            }
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        }
        importances
    }

    /// Decompose the prediction for `row` along each tree's decision path.
    pub fn contributions(&self, row: &[f64]) -> Contributions {
        let mut bias = vec![0.0; self.n_classes];
        let mut values = Array2::zeros((self.n_features, self.n_classes));

        for tree in &self.trees {
            let path = tree.path(row);
            for (b, v) in bias.iter_mut().zip(&tree.nodes[0].value) {
                *b += v;
            }
            for step in path.windows(2) {
                let parent = &tree.nodes[step[0]];
                let child = &tree.nodes[step[1]];
                if let Some(split) = parent.split {
                    for class in 0..self.n_classes {
                        values[[split.feature, class]] += child.value[class] - parent.value[class];
                    }
                }
            }
        }

        let n = self.trees.len().max(1) as f64;
        bias.iter_mut().for_each(|b| *b /= n);
        values.mapv_inplace(|v| v / n);

        Contributions { bias, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n_estimators: usize, seed: u64) -> ForestParams {
        ForestParams {
            n_estimators,
            tree: TreeParams {
                max_depth: 6,
                min_samples_split: 2,
                min_samples_leaf: 1,
                max_features: 1,
            },
            seed,
        }
    }

    /// Class is decided by feature 0; feature 1 is noise or constant.
    fn separable(n: usize, noisy: bool) -> (Array2<f64>, Vec<usize>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| match (j, noisy) {
            (0, _) => i as f64,
            (_, true) => ((i * 7919) % 13) as f64,
            (_, false) => 1.0,
        });
        let y = (0..n).map(|i| if i < n / 2 { 0 } else { 1 }).collect();
        (x, y)
    }

    #[test]
    fn test_single_tree_separates() {
        let (x, y) = separable(40, false);
        let forest = RandomForest::fit(&x, &y, &vec![1.0; 40], 2, &params(1, 3)).unwrap();

        // Only feature 0 can split, so the outermost leaves are pure
        assert_eq!(forest.predict_proba(&[0.0, 1.0]), vec![1.0, 0.0]);
        assert_eq!(forest.predict_proba(&[39.0, 1.0]), vec![0.0, 1.0]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = separable(60, true);
        let forest = RandomForest::fit(&x, &y, &vec![1.0; 60], 2, &params(15, 1)).unwrap();

        for v in [0.0, 12.5, 29.5, 30.5, 59.0] {
            let p = forest.predict_proba(&[v, 3.0]);
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_contributions_reconstruct_prediction() {
        let (x, y) = separable(60, true);
        let forest = RandomForest::fit(&x, &y, &vec![1.0; 60], 2, &params(10, 5)).unwrap();

        let row = [31.0, 4.0];
        let proba = forest.predict_proba(&row);
        let contributions = forest.contributions(&row);

        for class in 0..2 {
            let total: f64 =
                contributions.bias[class] + contributions.for_class(class).iter().sum::<f64>();
            assert!((total - proba[class]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_importances_favour_signal() {
        let (x, y) = separable(80, true);
        let forest = RandomForest::fit(&x, &y, &vec![1.0; 80], 2, &params(20, 2)).unwrap();
        let importances = forest.feature_importances();

        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = separable(50, true);
        let a = RandomForest::fit(&x, &y, &vec![1.0; 50], 2, &params(5, 9)).unwrap();
        let b = RandomForest::fit(&x, &y, &vec![1.0; 50], 2, &params(5, 9)).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_max_depth_respected() {
        let (x, y) = separable(64, true);
        let mut p = params(4, 1);
        p.tree.max_depth = 2;
        let forest = RandomForest::fit(&x, &y, &vec![1.0; 64], 2, &p).unwrap();

        assert!(forest.trees().iter().all(|t| t.depth() <= 2));
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        let (x, y) = separable(10, true);
        let result = RandomForest::fit(&x, &y[..9], &vec![1.0; 10], 2, &params(1, 1));

        assert!(matches!(result, Err(CoreError::InvalidParameter { .. })));
    }
}
