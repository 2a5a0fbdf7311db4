//! Descriptive statistics and histogram binning.

use std::cmp::Ordering;

use serde::Serialize;

/// Upper bound on Freedman–Diaconis bins, for heavy-tailed data with a tiny IQR
pub const MAX_AUTO_BINS: usize = 10_000;
pub const MIN_AUTO_BINS: usize = 10;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than two values
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Quantile with linear interpolation between closest ranks, `q` in `[0, 1]`
pub fn quantile(values: &[f64], q: f64) -> f64 {
    quantile_sorted(&sorted(values), q)
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub fn iqr(values: &[f64]) -> f64 {
    let s = sorted(values);
    quantile_sorted(&s, 0.75) - quantile_sorted(&s, 0.25)
}

/// The usual count/mean/std/min/quartiles/max summary
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

pub fn describe(values: &[f64]) -> Describe {
    let s = sorted(values);
    if s.is_empty() {
        return Describe::default();
    }
    Describe {
        count: s.len(),
        mean: mean(&s),
        std: std_dev(&s),
        min: s[0],
        q25: quantile_sorted(&s, 0.25),
        median: quantile_sorted(&s, 0.5),
        q75: quantile_sorted(&s, 0.75),
        max: s[s.len() - 1],
    }
}

/// Keep values within `mean ± k·std`; returns the input unchanged when std is 0
pub fn within_sigma(values: &[f64], k: f64) -> Vec<f64> {
    let (lo, hi) = sigma_bounds(values, k);
    values.iter().copied().filter(|v| *v >= lo && *v <= hi).collect()
}

pub fn sigma_bounds(values: &[f64], k: f64) -> (f64, f64) {
    let m = mean(values);
    let s = std_dev(values);
    (m - k * s, m + k * s)
}

/// Freedman–Diaconis bin count, at least [`MIN_AUTO_BINS`]
pub fn freedman_diaconis_bins(values: &[f64]) -> usize {
    let s = sorted(values);
    if s.len() < 2 {
        return MIN_AUTO_BINS;
    }
    let width = 2.0 * (quantile_sorted(&s, 0.75) - quantile_sorted(&s, 0.25))
        / (s.len() as f64).cbrt();
    let range = s[s.len() - 1] - s[0];
    if width <= 0.0 || range <= 0.0 {
        return MIN_AUTO_BINS;
    }
    ((range / width) as usize).clamp(MIN_AUTO_BINS, MAX_AUTO_BINS)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` edges
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Equal-width bins over `[min, max]`, the last bin closed on the right
    pub fn new(values: &[f64], bins: usize) -> Option<Self> {
        let s = sorted(values);
        if s.is_empty() || bins == 0 {
            return None;
        }
        let (mut lo, mut hi) = (s[0], s[s.len() - 1]);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();
        let mut counts = vec![0u64; bins];
        for v in &s {
            let idx = (((v - lo) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }
        Some(Self { edges, counts })
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn width(&self) -> f64 {
        self.edges[1] - self.edges[0]
    }

    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
    }

    /// Counts normalised so the histogram integrates to 1
    pub fn density(&self) -> Vec<f64> {
        let norm = self.total() as f64 * self.width();
        if norm == 0.0 {
            return vec![0.0; self.bins()];
        }
        self.counts.iter().map(|c| *c as f64 / norm).collect()
    }

    /// Center of the fullest bin (first one on ties)
    pub fn mode_center(&self) -> f64 {
        let mut best = 0;
        for (i, c) in self.counts.iter().enumerate() {
            if *c > self.counts[best] {
                best = i;
            }
        }
        (self.edges[best] + self.edges[best + 1]) / 2.0
    }
}
