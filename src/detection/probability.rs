//! # Probability-of-Detection Tables
//!
//! Empirical lookup of a detection probability from measured sample points.
//!
//! A table has one or two input variables and is classified once at
//! construction:
//!
//! - **Profile**: one variable, piecewise linear between sorted samples
//! - **Grid**: two variables whose samples form a full rectilinear grid,
//!   bilinear interpolation
//! - **Scattered**: two variables without grid structure, inverse distance
//!   weighting on range-normalised axes
//!
//! Queries exactly matching a sample return that sample's probability. Queries
//! outside the sampled bounds are clamped to the nearest boundary, and every
//! result is clamped into `[0, 1]`.

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Raw table data as supplied by a data collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityTableData {
    /// Sample points, each with one value per detection variable
    pub points: Vec<Vec<f64>>,
    /// Measured detection probability at each point
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
enum TableKind {
    Profile {
        xs: Vec<f64>,
        ps: Vec<f64>,
    },
    Grid {
        xs: Vec<f64>,
        ys: Vec<f64>,
        /// Row-major, `values[ix * ys.len() + iy]`
        values: Vec<f64>,
    },
    Scattered {
        lower: [f64; 2],
        upper: [f64; 2],
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityTable {
    points: Vec<Vec<f64>>,
    probabilities: Vec<f64>,
    kind: TableKind,
}

fn sorted_axis(values: impl Iterator<Item = f64>) -> Vec<f64> {
    values
        .map(OrderedFloat)
        .sorted()
        .dedup()
        .map(|v| v.into_inner())
        .collect()
}

fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

/// Index `i` such that `axis[i] <= x <= axis[i + 1]`, with `x` already clamped
fn bracket(axis: &[f64], x: f64) -> usize {
    let idx = axis.partition_point(|&a| a <= x);
    idx.saturating_sub(1).min(axis.len().saturating_sub(2))
}

fn lerp(x0: f64, x1: f64, v0: f64, v1: f64, x: f64) -> f64 {
    if (x1 - x0).abs() < f64::EPSILON {
        v0
    } else {
        v0 + (x - x0) / (x1 - x0) * (v1 - v0)
    }
}

impl ProbabilityTable {
    pub fn new(points: Vec<Vec<f64>>, probabilities: Vec<f64>) -> SimResult<Self> {
        if points.is_empty() {
            return Err(SimError::config("probability table has no points"));
        }
        if points.len() != probabilities.len() {
            return Err(SimError::config(format!(
                "probability table has {} points but {} probabilities",
                points.len(),
                probabilities.len()
            )));
        }
        let dim = points[0].len();
        if !(1..=2).contains(&dim) {
            return Err(SimError::config(format!(
                "probability tables take one or two variables, got {}",
                dim
            )));
        }
        if points.iter().any(|p| p.len() != dim) {
            return Err(SimError::config(
                "probability table points have inconsistent dimensions",
            ));
        }
        if points.iter().flatten().chain(&probabilities).any(|v| !v.is_finite()) {
            return Err(SimError::config("probability table contains non-finite values"));
        }

        let kind = if dim == 1 {
            Self::profile(&points, &probabilities)
        } else {
            Self::grid(&points, &probabilities).unwrap_or_else(|| Self::scattered(&points))
        };

        Ok(Self {
            points,
            probabilities,
            kind,
        })
    }

    pub fn from_data(data: ProbabilityTableData) -> SimResult<Self> {
        Self::new(data.points, data.probabilities)
    }

    /// Table returning `p` everywhere
    pub fn constant(p: f64) -> Self {
        Self {
            points: vec![vec![0.0]],
            probabilities: vec![p],
            kind: TableKind::Profile {
                xs: vec![0.0],
                ps: vec![p],
            },
        }
    }

    /// Repeated x values are averaged
    fn profile(points: &[Vec<f64>], probabilities: &[f64]) -> TableKind {
        let mut xs = Vec::new();
        let mut ps = Vec::new();
        let samples = points
            .iter()
            .zip(probabilities)
            .map(|(p, &prob)| (OrderedFloat(p[0]), prob))
            .sorted_by_key(|(x, _)| *x);
        for (x, group) in &samples.chunk_by(|(x, _)| *x) {
            let values: Vec<f64> = group.map(|(_, p)| p).collect();
            xs.push(x.into_inner());
            ps.push(values.iter().sum::<f64>() / values.len() as f64);
        }
        TableKind::Profile { xs, ps }
    }

    /// Grid when every (x, y) combination appears exactly once
    fn grid(points: &[Vec<f64>], probabilities: &[f64]) -> Option<TableKind> {
        let xs = sorted_axis(points.iter().map(|p| p[0]));
        let ys = sorted_axis(points.iter().map(|p| p[1]));
        if xs.len() < 2 || ys.len() < 2 || xs.len() * ys.len() != points.len() {
            return None;
        }

        let mut values = vec![f64::NAN; xs.len() * ys.len()];
        for (point, &p) in points.iter().zip(probabilities) {
            let ix = xs.binary_search_by(|x| x.total_cmp(&point[0])).ok()?;
            let iy = ys.binary_search_by(|y| y.total_cmp(&point[1])).ok()?;
            let slot = &mut values[ix * ys.len() + iy];
            if !slot.is_nan() {
                return None;
            }
            *slot = p;
        }
        Some(TableKind::Grid { xs, ys, values })
    }

    fn scattered(points: &[Vec<f64>]) -> TableKind {
        let mut lower = [f64::INFINITY; 2];
        let mut upper = [f64::NEG_INFINITY; 2];
        for point in points {
            for axis in 0..2 {
                lower[axis] = lower[axis].min(point[axis]);
                upper[axis] = upper[axis].max(point[axis]);
            }
        }
        TableKind::Scattered { lower, upper }
    }

    /// Number of input variables
    pub fn dimension(&self) -> usize {
        self.points[0].len()
    }

    pub fn is_grid(&self) -> bool {
        matches!(self.kind, TableKind::Grid { .. })
    }

    /// Detection probability at `query`, always within `[0, 1]`
    pub fn probability(&self, query: &[f64]) -> SimResult<f64> {
        if query.len() != self.dimension() {
            return Err(SimError::config(format!(
                "probability query has {} values, table expects {}",
                query.len(),
                self.dimension()
            )));
        }

        if let Some(pos) = self.points.iter().position(|p| p.as_slice() == query) {
            return Ok(clamp_probability(self.probabilities[pos]));
        }

        let p = match &self.kind {
            TableKind::Profile { xs, ps } => {
                if xs.len() == 1 {
                    ps[0]
                } else {
                    let x = query[0].clamp(xs[0], xs[xs.len() - 1]);
                    let i = bracket(xs, x);
                    lerp(xs[i], xs[i + 1], ps[i], ps[i + 1], x)
                }
            }
            TableKind::Grid { xs, ys, values } => {
                let x = query[0].clamp(xs[0], xs[xs.len() - 1]);
                let y = query[1].clamp(ys[0], ys[ys.len() - 1]);
                let (i, j) = (bracket(xs, x), bracket(ys, y));
                let at = |ix: usize, iy: usize| values[ix * ys.len() + iy];
                let low = lerp(ys[j], ys[j + 1], at(i, j), at(i, j + 1), y);
                let high = lerp(ys[j], ys[j + 1], at(i + 1, j), at(i + 1, j + 1), y);
                lerp(xs[i], xs[i + 1], low, high, x)
            }
            TableKind::Scattered { lower, upper } => self.inverse_distance(query, lower, upper),
        };

        Ok(clamp_probability(p))
    }

    fn inverse_distance(&self, query: &[f64], lower: &[f64; 2], upper: &[f64; 2]) -> f64 {
        let scale = |axis: usize| {
            let span = upper[axis] - lower[axis];
            if span > 0.0 {
                span
            } else {
                1.0
            }
        };
        let q = [
            query[0].clamp(lower[0], upper[0]),
            query[1].clamp(lower[1], upper[1]),
        ];

        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for (point, &p) in self.points.iter().zip(&self.probabilities) {
            let dx = (point[0] - q[0]) / scale(0);
            let dy = (point[1] - q[1]) / scale(1);
            let d2 = dx * dx + dy * dy;
            if d2 < 1e-24 {
                return p;
            }
            weighted += p / d2;
            total_weight += 1.0 / d2;
        }
        weighted / total_weight
    }
}

/// One-shot lookup of `query` in the table `(points, probabilities)`
pub fn empirical_interpolator(
    points: &[Vec<f64>],
    probabilities: &[f64],
    query: &[f64],
) -> SimResult<f64> {
    ProbabilityTable::new(points.to_vec(), probabilities.to_vec())?.probability(query)
}
