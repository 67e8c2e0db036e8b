use crate::error::NormalizeError;

/// Whether a single (flux, error) sample is unusable.
///
/// A sample is bad when the flux is non-finite or exactly zero, or the
/// error is non-finite or not strictly positive.
#[inline]
pub fn is_bad_pixel(flux: f64, flux_err: f64) -> bool {
    let bad_flux = !flux.is_finite() || flux == 0.0;
    let bad_err = !flux_err.is_finite() || flux_err <= 0.0;
    bad_flux || bad_err
}

/// Bad-pixel mask for one spectrum: `true` where the sample is unusable.
///
/// Inputs are not modified. All-bad and all-good spectra are both fine.
pub fn bad_pixel_mask(flux: &[f64], flux_err: &[f64]) -> Result<Vec<bool>, NormalizeError> {
    if flux.len() != flux_err.len() {
        return Err(NormalizeError::malformed(format!(
            "flux has {} samples but flux_err has {}",
            flux.len(),
            flux_err.len()
        )));
    }
    Ok(flux
        .iter()
        .zip(flux_err)
        .map(|(&f, &e)| is_bad_pixel(f, e))
        .collect())
}
