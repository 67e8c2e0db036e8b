//! Continuum normalization core.
//!
//! ```text
//!  raw flux / error / ivar (stars × pixels)
//!        │
//!        ├──► pixmask   bad samples per star
//!        │
//!        ├──► contmask  ensemble median + variance → continuum pixels
//!        │
//!        ▼
//!   ┌──────────┐
//!   │   fit    │  per star, per segment: weighted Chebyshev fit,
//!   └──────────┘  divide, floor ivar, refill masked pixels
//!        │
//!        ▼
//!  continuum, normalized flux, normalized ivar
//! ```
//!
//! Nothing in here touches the filesystem.

pub mod chebyshev;
pub mod contmask;
pub mod fit;
pub mod pixmask;
pub mod segments;

use crate::error::NormalizeError;

/// Check that a wavelength axis is finite and strictly monotonic.
pub fn check_wavelength_axis(wavelength: &[f64]) -> Result<(), NormalizeError> {
    if let Some(i) = wavelength.iter().position(|v| !v.is_finite()) {
        return Err(NormalizeError::malformed(format!(
            "wavelength[{i}] is not finite"
        )));
    }
    let increasing = wavelength.windows(2).all(|w| w[1] > w[0]);
    let decreasing = wavelength.windows(2).all(|w| w[1] < w[0]);
    if !(increasing || decreasing) {
        return Err(NormalizeError::malformed(
            "wavelength axis is not strictly monotonic",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wavelength_axis_checks() {
        assert!(check_wavelength_axis(&[1.0, 2.0, 3.5]).is_ok());
        assert!(check_wavelength_axis(&[3.0, 2.0, 1.0]).is_ok());
        assert!(check_wavelength_axis(&[1.0]).is_ok());
        assert!(check_wavelength_axis(&[1.0, 1.0, 2.0]).is_err());
        assert!(check_wavelength_axis(&[1.0, 3.0, 2.0]).is_err());
        assert!(check_wavelength_axis(&[1.0, f64::NAN]).is_err());
    }
}
