use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

pub const MAX_BINS: usize = 256;
const MIN_SPLIT_GAIN: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            subsample: 1.0,
            colsample_bytree: 1.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            seed: 27,
        }
    }
}

impl BoosterParams {
    fn soft_threshold(&self, g: f64) -> f64 {
        g.signum() * (g.abs() - self.reg_alpha).max(0.0)
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        let t = self.soft_threshold(g);
        t * t / denom
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -self.soft_threshold(g) / denom * self.learning_rate
    }

    fn columns_per_tree(&self, n_features: usize) -> usize {
        if n_features == 0 {
            return 0;
        }
        ((n_features as f64 * self.colsample_bytree).round() as usize).clamp(1, n_features)
    }
}

struct BinnedMatrix {
    cuts: Vec<Vec<f64>>,
    bins: Vec<Vec<u8>>,
}

impl BinnedMatrix {
    fn build(x: &[Vec<f64>], n_features: usize) -> Self {
        let (cuts, bins) = (0..n_features)
            .into_par_iter()
            .map(|f| {
                let column: Vec<f64> = x.iter().map(|row| row[f]).collect();
                let cuts = quantile_cuts(&column);
                let bins = column.iter().map(|&v| bin_of(&cuts, v)).collect();
                (cuts, bins)
            })
            .unzip();
        Self { cuts, bins }
    }

    fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 2
    }

    /// Upper edge of `bin`. The last bin has none: every present value goes left.
    fn threshold(&self, feature: usize, bin: u8) -> f64 {
        self.cuts[feature]
            .get(bin as usize - 1)
            .copied()
            .unwrap_or(f64::INFINITY)
    }
}

fn quantile_cuts(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    let mut distinct = sorted.clone();
    distinct.dedup();
    if distinct.len() <= 1 {
        return Vec::new();
    }

    let max_cuts = MAX_BINS - 2;
    if distinct.len() - 1 <= max_cuts {
        distinct.pop();
        return distinct;
    }

    let max = distinct[distinct.len() - 1];
    let mut cuts: Vec<f64> = (1..=max_cuts)
        .map(|k| sorted[k * (sorted.len() - 1) / (max_cuts + 1)])
        .filter(|c| *c < max)
        .collect();
    cuts.dedup();
    cuts
}

fn bin_of(cuts: &[f64], value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        (1 + cuts.partition_point(|c| *c < value)) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        bin: u8,
        default_left: bool,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    default_left,
                    left,
                    right,
                    ..
                } => {
                    let v = row.get(*feature).copied().unwrap_or(f64::NAN);
                    let go_left = if v.is_nan() {
                        *default_left
                    } else {
                        v <= *threshold
                    };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }

    fn predict_binned(&self, binned: &BinnedMatrix, row: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    bin,
                    default_left,
                    left,
                    right,
                    ..
                } => {
                    let b = binned.bins[*feature][row];
                    idx = if goes_left(b, *bin, *default_left) {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

fn goes_left(row_bin: u8, split_bin: u8, default_left: bool) -> bool {
    if row_bin == 0 {
        default_left
    } else {
        row_bin <= split_bin
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    gain: f64,
    feature: usize,
    bin: u8,
    default_left: bool,
}

struct TreeBuilder<'a> {
    binned: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoosterParams,
    features: &'a [usize],
}

impl TreeBuilder<'_> {
    fn build(&self, rows: Vec<usize>) -> Tree {
        let mut nodes = Vec::new();
        self.grow(&mut nodes, rows, 0);
        Tree { nodes }
    }

    fn grow(&self, nodes: &mut Vec<Node>, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| self.hess[r]).sum();
        let idx = nodes.len();
        nodes.push(Node::Leaf {
            value: self.params.leaf_value(g, h),
        });
        if depth >= self.params.max_depth || rows.len() < 2 {
            return idx;
        }

        // Collected in feature order so ties resolve the same way on every run.
        let candidates: Vec<Option<SplitCandidate>> = self
            .features
            .par_iter()
            .map(|&f| self.best_split(f, &rows, g, h))
            .collect();
        let mut best: Option<SplitCandidate> = None;
        for candidate in candidates.into_iter().flatten() {
            if best.as_ref().is_none_or(|b| candidate.gain > b.gain) {
                best = Some(candidate);
            }
        }
        let Some(split) = best else {
            return idx;
        };

        let column = &self.binned.bins[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| goes_left(column[r], split.bin, split.default_left));
        let left = self.grow(nodes, left_rows, depth + 1);
        let right = self.grow(nodes, right_rows, depth + 1);
        nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: self.binned.threshold(split.feature, split.bin),
            bin: split.bin,
            default_left: split.default_left,
            left,
            right,
        };
        idx
    }

    fn best_split(&self, feature: usize, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let params = self.params;
        let n_bins = self.binned.n_bins(feature);
        let column = &self.binned.bins[feature];
        let mut hist = vec![(0.0_f64, 0.0_f64); n_bins];
        for &r in rows {
            let slot = &mut hist[column[r] as usize];
            slot.0 += self.grad[r];
            slot.1 += self.hess[r];
        }

        let (missing_g, missing_h) = hist[0];
        let parent = params.score(g, h);
        let mut best: Option<SplitCandidate> = None;
        let (mut gl, mut hl) = (0.0_f64, 0.0_f64);
        for (bin, &(bg, bh)) in hist.iter().enumerate().skip(1) {
            gl += bg;
            hl += bh;
            for default_left in [true, false] {
                let (lg, lh) = if default_left {
                    (gl + missing_g, hl + missing_h)
                } else {
                    (gl, hl)
                };
                let (rg, rh) = (g - lg, h - lh);
                if lh < params.min_child_weight || rh < params.min_child_weight {
                    continue;
                }
                let gain =
                    0.5 * (params.score(lg, lh) + params.score(rg, rh) - parent) - params.gamma;
                if gain > MIN_SPLIT_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        gain,
                        feature,
                        bin: bin as u8,
                        default_left,
                    });
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    base_score: f64,
    trees: Vec<Tree>,
}

impl GradientBoostedRegressor {
    /// Fits on a row-major matrix. NaN cells are treated as missing.
    /// Deterministic for a given `params.seed`.
    pub fn fit(params: &BoosterParams, x: &[Vec<f64>], y: &[f64]) -> PipelineResult<Self> {
        if x.len() != y.len() {
            return Err(PipelineError::RowCountMismatch {
                expected: x.len(),
                found: y.len(),
            });
        }
        let n_features = x.first().map_or(0, Vec::len);
        if let Some(row) = x.iter().find(|row| row.len() != n_features) {
            return Err(PipelineError::RowCountMismatch {
                expected: n_features,
                found: row.len(),
            });
        }
        let n = y.len();
        if n == 0 {
            return Ok(Self {
                base_score: 0.0,
                trees: Vec::new(),
            });
        }

        let base_score = y.iter().sum::<f64>() / n as f64;
        let binned = BinnedMatrix::build(x, n_features);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let subsample = params.subsample.clamp(0.0, 1.0);
        let n_cols = params.columns_per_tree(n_features);

        let hess = vec![1.0; n];
        let mut grad = vec![0.0; n];
        let mut preds = vec![base_score; n];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            for ((g, p), target) in grad.iter_mut().zip(&preds).zip(y) {
                *g = p - target;
            }

            let mut rows: Vec<usize> = if subsample >= 1.0 {
                (0..n).collect()
            } else {
                (0..n).filter(|_| rng.gen_bool(subsample)).collect()
            };
            if rows.is_empty() {
                rows = (0..n).collect();
            }
            let mut features: Vec<usize> = if n_cols >= n_features {
                (0..n_features).collect()
            } else {
                index::sample(&mut rng, n_features, n_cols).into_vec()
            };
            features.sort_unstable();

            let tree = TreeBuilder {
                binned: &binned,
                grad: &grad,
                hess: &hess,
                params,
                features: &features,
            }
            .build(rows);
            for (row, p) in preds.iter_mut().enumerate() {
                *p += tree.predict_binned(&binned, row);
            }
            trees.push(tree);
        }

        debug!(rows = n, features = n_features, trees = trees.len(), "booster fitted");
        Ok(Self { base_score, trees })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.par_iter().map(|row| self.predict_row(row)).collect()
    }
}
