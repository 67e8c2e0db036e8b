use serde::{Deserialize, Serialize};

use crate::error::NormalizeError;

/// Thresholds that decide whether a wavelength position is continuum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuumThresholds {
    /// Maximum distance of the ensemble median from 1.0.
    pub f_cut: f64,
    /// Upper bound (exclusive) on the ensemble flux variance.
    pub sigma_cut: f64,
}

impl Default for ContinuumThresholds {
    fn default() -> Self {
        Self {
            f_cut: 1e-4,
            sigma_cut: 5e-3,
        }
    }
}

/// Classify every wavelength position of an ensemble as continuum or not.
///
/// `fluxes` holds one spectrum per star, all on the same axis. At each
/// position the median and population variance are taken over the finite
/// values only; a position with no finite value is never continuum.
/// Identical values give zero variance, so flat unit-flux columns pass.
pub fn continuum_mask(
    fluxes: &[Vec<f64>],
    thresholds: &ContinuumThresholds,
) -> Result<Vec<bool>, NormalizeError> {
    if fluxes.len() < 2 {
        return Err(NormalizeError::DegenerateEnsemble {
            stars: fluxes.len(),
        });
    }
    let npix = fluxes[0].len();
    if let Some((i, row)) = fluxes.iter().enumerate().find(|(_, r)| r.len() != npix) {
        return Err(NormalizeError::malformed(format!(
            "star {i} has {} pixels, expected {npix}",
            row.len()
        )));
    }

    let mut column = Vec::with_capacity(fluxes.len());
    let mask = (0..npix)
        .map(|pix| {
            column.clear();
            column.extend(fluxes.iter().map(|row| row[pix]).filter(|f| f.is_finite()));
            match (median(&mut column), variance(&column)) {
                (Some(f_bar), Some(sigma_f)) => {
                    (f_bar - 1.0).abs() < thresholds.f_cut && sigma_f < thresholds.sigma_cut
                }
                _ => false,
            }
        })
        .collect();
    Ok(mask)
}

/// Median of finite values; reorders `values` in place.
pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(0.5 * (values[mid - 1] + values[mid]))
    } else {
        Some(values[mid])
    }
}

/// Population variance (divides by n).
fn variance(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    Some(values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n)
}
