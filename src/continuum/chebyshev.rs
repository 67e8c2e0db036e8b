//! Weighted least-squares fitting in the Chebyshev basis.
//!
//! The abscissa is mapped linearly from its data range onto `[-1, 1]`
//! before the basis is built, which keeps the design matrix well
//! conditioned over wide wavelength ranges where a raw power basis is not.

use nalgebra::{DMatrix, DVector};

/// A Chebyshev series together with the domain it was fit on.
#[derive(Debug, Clone, PartialEq)]
pub struct ChebyshevSeries {
    /// Coefficients of `T_0 .. T_n`.
    pub coeffs: Vec<f64>,
    /// Data range mapped onto `[-1, 1]`.
    pub domain: (f64, f64),
}

/// Why a fit could not be produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FitFailure {
    /// No sample had finite data and a finite positive weight.
    NoUsableSamples,
    /// The least-squares solve itself failed.
    Solver(String),
}

impl ChebyshevSeries {
    /// Degree of the series.
    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// Evaluate at `x` (Clenshaw recurrence).
    pub fn eval(&self, x: f64) -> f64 {
        let t = map_to_window(x, self.domain);
        let mut b1 = 0.0;
        let mut b2 = 0.0;
        for &c in self.coeffs.iter().skip(1).rev() {
            let b0 = 2.0 * t * b1 - b2 + c;
            b2 = b1;
            b1 = b0;
        }
        let c0 = self.coeffs.first().copied().unwrap_or(0.0);
        t * b1 - b2 + c0
    }

    /// Evaluate at every point of `xs`.
    pub fn eval_all(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x)).collect()
    }
}

/// Fit `y ≈ Σ c_k T_k(x)` by weighted least squares.
///
/// Each row of the system is multiplied by its weight. Samples with a
/// non-finite `x`/`y` or a weight that is not finite and positive are left
/// out. The degree is lowered to `distinct usable x - 1` when there are too
/// few samples to pin down the requested one, so a single good sample
/// yields a constant.
pub fn fit_weighted(
    x: &[f64],
    y: &[f64],
    w: &[f64],
    degree: usize,
) -> Result<ChebyshevSeries, FitFailure> {
    debug_assert!(x.len() == y.len() && x.len() == w.len());

    let domain = x
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .ok_or(FitFailure::NoUsableSamples)?;

    let rows: Vec<(f64, f64, f64)> = x
        .iter()
        .zip(y)
        .zip(w)
        .filter(|((xi, yi), wi)| {
            xi.is_finite() && yi.is_finite() && wi.is_finite() && **wi > 0.0
        })
        .map(|((&xi, &yi), &wi)| (map_to_window(xi, domain), yi, wi))
        .collect();

    if rows.is_empty() {
        return Err(FitFailure::NoUsableSamples);
    }

    let mut distinct: Vec<f64> = rows.iter().map(|r| r.0).collect();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();
    let degree = degree.min(distinct.len() - 1);
    let ncoef = degree + 1;

    let mut a_mat = DMatrix::<f64>::zeros(rows.len(), ncoef);
    let mut b_vec = DVector::<f64>::zeros(rows.len());
    for (row, &(t, yi, wi)) in rows.iter().enumerate() {
        let mut t_prev = 1.0;
        let mut t_cur = t;
        for k in 0..ncoef {
            let basis = match k {
                0 => 1.0,
                1 => t,
                _ => {
                    let t_next = 2.0 * t * t_cur - t_prev;
                    t_prev = t_cur;
                    t_cur = t_next;
                    t_next
                }
            };
            a_mat[(row, k)] = basis * wi;
        }
        b_vec[row] = yi * wi;
    }

    // Column scaling; undone on the solution.
    let scales: Vec<f64> = (0..ncoef)
        .map(|k| {
            let norm = a_mat.column(k).norm();
            if norm > 0.0 {
                norm
            } else {
                1.0
            }
        })
        .collect();
    for (k, &s) in scales.iter().enumerate() {
        for row in 0..rows.len() {
            a_mat[(row, k)] /= s;
        }
    }

    let eps = rows.len() as f64 * f64::EPSILON;
    let svd = a_mat.svd(true, true);
    let solution = svd
        .solve(&b_vec, eps)
        .map_err(|e| FitFailure::Solver(e.to_string()))?;

    let coeffs: Vec<f64> = solution
        .iter()
        .zip(&scales)
        .map(|(c, s)| c / s)
        .collect();

    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(FitFailure::Solver("non-finite coefficients".to_string()));
    }

    Ok(ChebyshevSeries { coeffs, domain })
}

fn map_to_window(x: f64, (lo, hi): (f64, f64)) -> f64 {
    let span = hi - lo;
    if span == 0.0 {
        0.0
    } else {
        (2.0 * x - (lo + hi)) / span
    }
}
