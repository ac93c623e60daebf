//! Bagged classification trees
//!
//! Trees are CART with Gini impurity, grown on bootstrap samples and
//! considering a random subset of features at every split. Nodes live in a
//! flat arena per tree and refer to their children by index.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::error::{Result, WeatherwiseError};

/// Width of a feature row
pub const FEATURES: usize = 4;

/// Feature row: temperature, precipitation, wind speed, humidity
pub type FeatureRow = [f64; FEATURES];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub trees: usize,
    pub max_depth: usize,
    /// Features tried at each split
    pub max_features: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            trees: 120,
            max_depth: 6,
            max_features: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        /// Share of positive samples that reached this leaf
        probability: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

#[allow(clippy::cast_precision_loss)]
fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

struct Split {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

struct Builder<'a> {
    rows: &'a [FeatureRow],
    labels: &'a [bool],
    params: ForestParams,
    nodes: Vec<Node>,
}

impl Builder<'_> {
    fn positives(&self, samples: &[usize]) -> usize {
        samples.iter().filter(|&&i| self.labels[i]).count()
    }

    #[allow(clippy::cast_precision_loss)]
    fn best_split(&self, samples: &[usize], rng: &mut StdRng) -> Option<Split> {
        let total = samples.len();
        let total_pos = self.positives(samples);
        let tried = self.params.max_features.clamp(1, FEATURES);
        let mut best: Option<Split> = None;

        // keep looking past `tried` features until some split is valid
        for (n, feature) in index::sample(rng, FEATURES, FEATURES).into_iter().enumerate() {
            if n >= tried && best.is_some() {
                break;
            }
            let mut ordered: Vec<usize> = samples.to_vec();
            ordered.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut left_pos = 0;
            for k in 1..total {
                if self.labels[ordered[k - 1]] {
                    left_pos += 1;
                }
                let lo = self.rows[ordered[k - 1]][feature];
                let hi = self.rows[ordered[k]][feature];
                if lo >= hi {
                    continue;
                }
                let right_pos = total_pos - left_pos;
                let impurity = (k as f64 * gini(left_pos, k)
                    + (total - k) as f64 * gini(right_pos, total - k))
                    / total as f64;
                if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                    best = Some(Split {
                        feature,
                        threshold: (lo + hi) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }

    #[allow(clippy::cast_precision_loss)]
    fn grow(&mut self, samples: &[usize], depth: usize, rng: &mut StdRng) -> usize {
        let id = self.nodes.len();
        let positives = self.positives(samples);
        let probability = if samples.is_empty() {
            0.0
        } else {
            positives as f64 / samples.len() as f64
        };
        self.nodes.push(Node::Leaf { probability });

        let parent_impurity = gini(positives, samples.len());
        if depth >= self.params.max_depth || samples.len() < 2 || parent_impurity == 0.0 {
            return id;
        }
        let Some(split) = self.best_split(samples, rng) else {
            return id;
        };
        if split.impurity >= parent_impurity {
            return id;
        }

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| self.rows[i][split.feature] <= split.threshold);
        let left = self.grow(&left, depth + 1, rng);
        let right = self.grow(&right, depth + 1, rng);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }
}

impl Tree {
    fn predict(&self, row: &FeatureRow) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes.get(id) {
                Some(Node::Leaf { probability }) => return *probability,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => id = if row[*feature] <= *threshold { *left } else { *right },
                None => return 0.0,
            }
        }
    }
}

/// Ensemble of bootstrap-trained trees
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Tree>,
}

impl RandomForest {
    /// Fit on `rows` with boolean `labels`. Identical inputs and params give
    /// an identical forest.
    pub fn fit(rows: &[FeatureRow], labels: &[bool], params: ForestParams) -> Result<Self> {
        if rows.is_empty() {
            return Err(WeatherwiseError::insufficient("no training rows"));
        }
        if rows.len() != labels.len() {
            return Err(WeatherwiseError::validation(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if params.trees == 0 {
            return Err(WeatherwiseError::validation("forest needs at least one tree"));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let n = rows.len();
        let trees = (0..params.trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                let mut builder = Builder {
                    rows,
                    labels,
                    params,
                    nodes: Vec::new(),
                };
                builder.grow(&bootstrap, 0, &mut rng);
                Tree {
                    nodes: builder.nodes,
                }
            })
            .collect();
        Ok(Self { trees })
    }

    /// Mean positive-class probability across trees
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn predict_proba(&self, row: &FeatureRow) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    #[must_use]
    pub fn predict(&self, row: &FeatureRow) -> bool {
        self.predict_proba(row) > 0.5
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> (Vec<FeatureRow>, Vec<bool>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for t in -10..=40 {
            for p in [0.0, 5.0, 15.0] {
                let temp = f64::from(t);
                rows.push([temp, p, 3.0, 60.0]);
                labels.push(temp < 0.0 || temp > 35.0 || p > 10.0);
            }
        }
        (rows, labels)
    }

    #[test]
    fn test_learns_threshold_rules() {
        let (rows, labels) = grid();
        let forest = RandomForest::fit(&rows, &labels, ForestParams::default()).unwrap();
        assert_eq!(forest.len(), 120);

        assert!(forest.predict(&[-8.0, 0.0, 3.0, 60.0]));
        assert!(forest.predict(&[38.0, 0.0, 3.0, 60.0]));
        assert!(forest.predict(&[18.0, 15.0, 3.0, 60.0]));
        assert!(!forest.predict(&[18.0, 0.0, 3.0, 60.0]));
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let (rows, labels) = grid();
        let a = RandomForest::fit(&rows, &labels, ForestParams::default()).unwrap();
        let b = RandomForest::fit(&rows, &labels, ForestParams::default()).unwrap();
        for row in &rows {
            assert_eq!(a.predict_proba(row), b.predict_proba(row));
        }
    }

    #[test]
    fn test_single_class_never_predicts_positive() {
        let rows = vec![[10.0, 0.0, 3.0, 60.0]; 20];
        let labels = vec![false; 20];
        let forest = RandomForest::fit(&rows, &labels, ForestParams::default()).unwrap();
        assert_eq!(forest.predict_proba(&[50.0, 50.0, 20.0, 99.0]), 0.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(RandomForest::fit(&[], &[], ForestParams::default()).is_err());
        assert!(RandomForest::fit(&[[0.0; FEATURES]], &[], ForestParams::default()).is_err());
        let no_trees = ForestParams {
            trees: 0,
            ..ForestParams::default()
        };
        assert!(RandomForest::fit(&[[0.0; FEATURES]], &[true], no_trees).is_err());
    }
}
