//! Parametric delay-distribution fits.
//!
//! Gumbel, Fréchet and Normal densities are fitted to a density histogram by
//! bounded Levenberg–Marquardt least squares on the bin centers, and ranked
//! by `AIC = n·ln(RSS/n) + 2k`.

use std::f64::consts::PI;

use serde::Serialize;

use super::stats::{self, Histogram};

pub const DEFAULT_BINS: usize = 500;
pub const MAX_EVALUATIONS: usize = 10_000;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const MIN_SCALE: f64 = 1e-9;
const MIN_SHAPE: f64 = 0.1;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum FitError {
    #[error("need at least {needed} histogram bins, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("initial guess gives a non-finite residual")]
    NonFiniteStart,
    #[error("normal equations are singular")]
    Singular,
    #[error("no convergence within {0} function evaluations")]
    NoConvergence(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Gumbel,
    Frechet,
    Normal,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::Gumbel, Family::Frechet, Family::Normal];

    pub fn name(&self) -> &'static str {
        match self {
            Family::Gumbel => "gumbel",
            Family::Frechet => "frechet",
            Family::Normal => "normal",
        }
    }

    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            Family::Gumbel => &["mu", "eta"],
            Family::Frechet => &["mu", "eta", "alpha"],
            Family::Normal => &["mu", "sigma"],
        }
    }

    pub fn pdf(&self, x: f64, p: &[f64]) -> f64 {
        match self {
            Family::Gumbel => gumbel_pdf(x, p[0], p[1]),
            Family::Frechet => frechet_pdf(x, p[0], p[1], p[2]),
            Family::Normal => normal_pdf(x, p[0], p[1]),
        }
    }

    fn lower_bounds(&self) -> &'static [f64] {
        match self {
            Family::Gumbel => &[f64::NEG_INFINITY, MIN_SCALE],
            Family::Frechet => &[0.0, MIN_SCALE, MIN_SHAPE],
            Family::Normal => &[0.0, MIN_SCALE],
        }
    }

    /// Starting point derived from the data and its histogram
    pub fn initial_guess(&self, values: &[f64], hist: &Histogram) -> Vec<f64> {
        let spread = stats::std_dev(values).max(MIN_SCALE);
        match self {
            Family::Gumbel => vec![hist.mode_center(), spread],
            Family::Frechet => {
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                vec![min.max(0.0), stats::iqr(values).max(MIN_SCALE), 4.5]
            }
            Family::Normal => vec![hist.mode_center().max(0.0), spread],
        }
    }

    /// Mean and variance of the fitted distribution, where they exist
    pub fn moments(&self, p: &[f64]) -> (Option<f64>, Option<f64>) {
        match self {
            Family::Gumbel => (
                Some(p[0] + EULER_GAMMA * p[1]),
                Some(PI * PI * p[1] * p[1] / 6.0),
            ),
            Family::Frechet => {
                let (mu, eta, alpha) = (p[0], p[1], p[2]);
                let mean = (alpha > 1.0).then(|| mu + eta * gamma(1.0 - 1.0 / alpha));
                let variance = (alpha > 2.0).then(|| {
                    let g1 = gamma(1.0 - 1.0 / alpha);
                    eta * eta * (gamma(1.0 - 2.0 / alpha) - g1 * g1)
                });
                (mean, variance)
            }
            Family::Normal => (Some(p[0]), Some(p[1] * p[1])),
        }
    }
}

pub fn gumbel_pdf(x: f64, mu: f64, eta: f64) -> f64 {
    let z = (x - mu) / eta;
    (-z - (-z).exp()).exp() / eta
}

/// Zero at and below the location parameter
pub fn frechet_pdf(x: f64, mu: f64, eta: f64, alpha: f64) -> f64 {
    if x <= mu {
        return 0.0;
    }
    let z = (x - mu) / eta;
    (alpha / eta) * z.powf(-1.0 - alpha) * (-z.powf(-alpha)).exp()
}

pub fn normal_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    (-0.5 * z * z).exp() / ((2.0 * PI).sqrt() * sigma)
}

/// Gamma function by the Lanczos approximation (g = 7), reflected below 0.5
pub fn gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        return PI / ((PI * x).sin() * gamma(1.0 - x));
    }
    let x = x - 1.0;
    let mut a = COEFFS[0];
    let t = x + 7.5;
    for (i, c) in COEFFS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    (2.0 * PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * a
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub family: Family,
    pub params: Vec<(String, f64)>,
    pub rss: f64,
    pub aic: f64,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub evaluations: usize,
}

impl FitResult {
    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|(_, v)| *v).collect()
    }

    pub fn pdf(&self, x: f64) -> f64 {
        self.family.pdf(x, &self.values())
    }
}

pub fn aic(rss: f64, n: usize, k: usize) -> f64 {
    let n = n as f64;
    n * (rss.max(f64::MIN_POSITIVE) / n).ln() + 2.0 * k as f64
}

fn rss(family: Family, xs: &[f64], ys: &[f64], p: &[f64]) -> f64 {
    let total: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| {
            let r = y - family.pdf(*x, p);
            r * r
        })
        .sum();
    if total.is_finite() {
        total
    } else {
        f64::INFINITY
    }
}

fn project(family: Family, p: &mut [f64]) {
    for (v, lo) in p.iter_mut().zip(family.lower_bounds()) {
        if *v < *lo {
            *v = *lo;
        }
    }
}

/// Solve the k×k system `a·x = b` by Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let k = b.len();
    for col in 0..k {
        let pivot = (col..k).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..k {
            let factor = a[row][col] / a[col][col];
            for c in col..k {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; k];
    for row in (0..k).rev() {
        let s: f64 = (row + 1..k).map(|c| a[row][c] * x[c]).sum();
        x[row] = (b[row] - s) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Least-squares fit of `family` to the points `(xs, ys)` from `initial`
pub fn fit_curve(
    family: Family,
    xs: &[f64],
    ys: &[f64],
    initial: &[f64],
) -> Result<FitResult, FitError> {
    let k = initial.len();
    let n = xs.len();
    if n <= k {
        return Err(FitError::TooFewPoints { needed: k + 1, got: n });
    }

    let mut p = initial.to_vec();
    project(family, &mut p);
    let mut current = rss(family, xs, ys, &p);
    let mut evaluations = 1;
    if !current.is_finite() {
        return Err(FitError::NonFiniteStart);
    }

    let mut lambda = 1e-3;
    let mut converged = false;
    while evaluations < MAX_EVALUATIONS {
        // forward-difference Jacobian of the model
        let model: Vec<f64> = xs.iter().map(|x| family.pdf(*x, &p)).collect();
        let mut jac = vec![vec![0.0; k]; n];
        for j in 0..k {
            let h = 1e-7 * p[j].abs().max(1e-3);
            let mut shifted = p.clone();
            shifted[j] += h;
            for (i, x) in xs.iter().enumerate() {
                jac[i][j] = (family.pdf(*x, &shifted) - model[i]) / h;
            }
        }
        evaluations += k;

        let mut jtj = vec![vec![0.0; k]; k];
        let mut jtr = vec![0.0; k];
        for i in 0..n {
            let r = ys[i] - model[i];
            for a in 0..k {
                jtr[a] += jac[i][a] * r;
                for b in 0..k {
                    jtj[a][b] += jac[i][a] * jac[i][b];
                }
            }
        }

        let mut improved = false;
        while evaluations < MAX_EVALUATIONS && lambda < 1e16 {
            let mut damped = jtj.clone();
            for (d, row) in damped.iter_mut().enumerate() {
                row[d] += lambda * jtj[d][d].max(1e-12);
            }
            let Some(step) = solve(damped, jtr.clone()) else {
                lambda *= 10.0;
                continue;
            };

            let mut candidate: Vec<f64> = p.iter().zip(&step).map(|(v, s)| v + s).collect();
            project(family, &mut candidate);
            let next = rss(family, xs, ys, &candidate);
            evaluations += 1;

            if next < current {
                let reduction = (current - next) / current.max(f64::MIN_POSITIVE);
                let moved = candidate
                    .iter()
                    .zip(&p)
                    .map(|(a, b)| (a - b).abs() / b.abs().max(1e-12))
                    .fold(0.0, f64::max);
                p = candidate;
                current = next;
                lambda = (lambda / 10.0).max(1e-12);
                improved = true;
                if reduction < 1e-12 || moved < 1e-10 {
                    converged = true;
                }
                break;
            }
            lambda *= 10.0;
        }

        if converged || !improved {
            // no downhill step exists at any damping: a (local) minimum
            converged = converged || lambda >= 1e16;
            break;
        }
    }

    if !converged {
        return Err(FitError::NoConvergence(MAX_EVALUATIONS));
    }

    let (mean, variance) = family.moments(&p);
    Ok(FitResult {
        family,
        params: family
            .param_names()
            .iter()
            .zip(&p)
            .map(|(name, v)| (name.to_string(), *v))
            .collect(),
        rss: current,
        aic: aic(current, n, k),
        mean,
        variance,
        evaluations,
    })
}

/// Fit `family` to the density histogram of `values`
pub fn fit_histogram(
    family: Family,
    values: &[f64],
    hist: &Histogram,
) -> Result<FitResult, FitError> {
    let initial = family.initial_guess(values, hist);
    fit_curve(family, &hist.centers(), &hist.density(), &initial)
}

#[derive(Debug, Clone, Serialize)]
pub struct FitOutcome {
    pub family: Family,
    pub result: Option<FitResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    pub n_values: usize,
    pub n_excluded: usize,
    pub bins: usize,
    pub outcomes: Vec<FitOutcome>,
    /// Family with the lowest AIC among successful fits
    pub best: Option<Family>,
    #[serde(skip)]
    pub histogram: Option<Histogram>,
}

impl FitReport {
    pub fn successful(&self) -> impl Iterator<Item = &FitResult> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref())
    }
}

/// Fit every family in `families`, optionally dropping values beyond 3σ first
pub fn fit_families(
    values: &[f64],
    bins: usize,
    exclude_outliers: bool,
    families: &[Family],
) -> FitReport {
    let data = if exclude_outliers {
        stats::within_sigma(values, 3.0)
    } else {
        values.to_vec()
    };
    let histogram = Histogram::new(&data, bins);

    let outcomes = families
        .iter()
        .map(|&family| {
            let result = match &histogram {
                Some(hist) => fit_histogram(family, &data, hist),
                None => Err(FitError::TooFewPoints { needed: 1, got: 0 }),
            };
            match result {
                Ok(fit) => {
                    log::info!("{} fit: AIC {:.3}, params {:?}", family.name(), fit.aic, fit.params);
                    FitOutcome {
                        family,
                        result: Some(fit),
                        error: None,
                    }
                }
                Err(e) => {
                    log::warn!("{} fit failed: {}", family.name(), e);
                    FitOutcome {
                        family,
                        result: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect::<Vec<_>>();

    let best = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref())
        .min_by(|a, b| a.aic.total_cmp(&b.aic))
        .map(|r| r.family);

    FitReport {
        n_values: data.len(),
        n_excluded: values.len() - data.len(),
        bins,
        outcomes,
        best,
        histogram,
    }
}
