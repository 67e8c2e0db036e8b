//! Turns loaded spectra into the normalized dataset.
//!
//! Raw pixels are masked and filled, the wavelength axis comes from the
//! first star's header, continuum pixels are picked across the ensemble,
//! and every star is fit segment by segment.

use log::warn;

use crate::config::NormalizationConfig;
use crate::continuum::contmask::{self, median};
use crate::continuum::fit::{ContinuumFitter, StarArrays, StarContinuum};
use crate::continuum::pixmask::bad_pixel_mask;
use crate::data::model::{SpectrumBatch, StarSpectrum, WavelengthAxis};
use crate::error::{NormalizeError, StarFailure};
use crate::progress::{NormalizeEvent, Progress};

// ---------------------------------------------------------------------------
// Per-star preparation
// ---------------------------------------------------------------------------

/// Raw arrays of one star with bad pixels filled.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStar {
    /// Flux, 0.0 at bad pixels.
    pub flux: Vec<f64>,
    /// Uncertainty, `error_fill` at bad pixels.
    pub flux_err: Vec<f64>,
    /// `1 / err²`, 0.0 at bad pixels.
    pub ivar: Vec<f64>,
    pub bad: Vec<bool>,
    pub snr: f64,
}

impl PreparedStar {
    pub fn arrays(&self) -> StarArrays<'_> {
        StarArrays {
            flux: &self.flux,
            flux_err: &self.flux_err,
            ivar: &self.ivar,
        }
    }

    /// Flux with bad pixels as NaN, the form the continuum selector reads.
    pub fn masked_flux(&self) -> Vec<f64> {
        self.flux
            .iter()
            .zip(&self.bad)
            .map(|(&f, &bad)| if bad { f64::NAN } else { f })
            .collect()
    }
}

/// Mask and fill one raw spectrum.
pub fn prepare_star(
    spectrum: &StarSpectrum,
    error_fill: f64,
) -> Result<PreparedStar, NormalizeError> {
    let bad = bad_pixel_mask(&spectrum.flux, &spectrum.flux_err)?;
    let snr = signal_to_noise(&spectrum.flux, &spectrum.flux_err, &bad);
    if snr.is_nan() {
        warn!("Star '{}' has no usable pixels", spectrum.id);
    }

    let mut flux = spectrum.flux.clone();
    let mut flux_err = spectrum.flux_err.clone();
    let mut ivar = vec![0.0; flux.len()];
    for (i, &is_bad) in bad.iter().enumerate() {
        if is_bad {
            flux[i] = 0.0;
            flux_err[i] = error_fill;
        } else {
            ivar[i] = 1.0 / (flux_err[i] * flux_err[i]);
        }
    }

    Ok(PreparedStar {
        flux,
        flux_err,
        ivar,
        bad,
        snr,
    })
}

/// Median of `flux / err` over good pixels; NaN when there are none.
pub fn signal_to_noise(flux: &[f64], flux_err: &[f64], bad: &[bool]) -> f64 {
    let mut ratios: Vec<f64> = flux
        .iter()
        .zip(flux_err)
        .zip(bad)
        .filter(|(_, &is_bad)| !is_bad)
        .map(|((f, e), _)| f / e)
        .collect();
    median(&mut ratios).unwrap_or(f64::NAN)
}

// ---------------------------------------------------------------------------
// Normalized dataset
// ---------------------------------------------------------------------------

/// Everything downstream label fitting needs. Row `i` of every per-star
/// array belongs to the `i`-th input star.
#[derive(Debug, Clone)]
pub struct NormalizedDataset {
    pub wavelength: WavelengthAxis,
    /// `true` at continuum pixels.
    pub contmask: Vec<bool>,
    pub ids: Vec<String>,
    pub snr: Vec<f64>,
    pub norm_fluxes: Vec<Vec<f64>>,
    pub norm_ivars: Vec<Vec<f64>>,
    pub continua: Vec<Vec<f64>>,
    /// Stars whose fit failed; their rows carry zero weight.
    pub failures: Vec<StarFailure>,
}

impl NormalizedDataset {
    pub fn n_stars(&self) -> usize {
        self.ids.len()
    }

    pub fn n_pixels(&self) -> usize {
        self.wavelength.len()
    }

    pub fn n_continuum(&self) -> usize {
        self.contmask.iter().filter(|&&c| c).count()
    }

    /// Whether star `index` was normalized.
    pub fn is_ok(&self, index: usize) -> bool {
        index < self.n_stars() && !self.failures.iter().any(|f| f.index == index)
    }
}

// ---------------------------------------------------------------------------
// SpectrumAssembler
// ---------------------------------------------------------------------------

/// Runs masking, continuum selection and fitting over a batch of stars.
pub struct SpectrumAssembler<'p> {
    config: NormalizationConfig,
    progress: &'p dyn Progress,
}

impl<'p> SpectrumAssembler<'p> {
    pub fn new(config: NormalizationConfig, progress: &'p dyn Progress) -> Self {
        Self { config, progress }
    }

    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    /// Normalize a batch.
    ///
    /// Fails as a whole on malformed input or a degenerate ensemble; a star
    /// whose fit fails is recorded in `failures` and the rest carry on.
    pub fn assemble(&self, batch: &SpectrumBatch) -> Result<NormalizedDataset, NormalizeError> {
        let first = batch
            .spectra
            .first()
            .ok_or(NormalizeError::DegenerateEnsemble { stars: 0 })?;
        let wavelength = WavelengthAxis::from_header(first, self.config.wavelength_scale)?;
        let npix = wavelength.len();
        self.config.segments.check_bounds(npix)?;

        let prepared = batch
            .spectra
            .iter()
            .map(|spectrum| {
                if spectrum.len() != npix {
                    return Err(NormalizeError::malformed(format!(
                        "star '{}' has {} pixels, expected {npix}",
                        spectrum.id,
                        spectrum.len()
                    )));
                }
                prepare_star(spectrum, self.config.error_fill)
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.progress.report(NormalizeEvent::Loaded {
            stars: prepared.len(),
            pixels: npix,
        });

        let masked: Vec<Vec<f64>> = prepared.iter().map(PreparedStar::masked_flux).collect();
        let contmask = contmask::continuum_mask(&masked, &self.config.thresholds)?;
        self.progress.report(NormalizeEvent::ContinuumSelected {
            continuum: contmask.iter().filter(|&&c| c).count(),
            pixels: npix,
        });

        let fitter = ContinuumFitter::new(self.config.segments.clone(), self.config.degree)
            .with_parallel(self.config.parallel);
        let arrays: Vec<StarArrays<'_>> = prepared.iter().map(PreparedStar::arrays).collect();
        let results = fitter.normalize_all(wavelength.values(), &arrays, &contmask, self.progress);

        let n = prepared.len();
        let mut norm_fluxes = Vec::with_capacity(n);
        let mut norm_ivars = Vec::with_capacity(n);
        let mut continua = Vec::with_capacity(n);
        let mut failures = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            let star = result.unwrap_or_else(|error| {
                failures.push(StarFailure {
                    index,
                    id: batch.spectra[index].id.clone(),
                    error,
                });
                StarContinuum::unweighted(npix)
            });
            norm_fluxes.push(star.norm_flux);
            norm_ivars.push(star.norm_ivar);
            continua.push(star.continuum);
        }

        self.progress.report(NormalizeEvent::Finished {
            normalized: n - failures.len(),
            failed: failures.len(),
        });

        Ok(NormalizedDataset {
            wavelength,
            contmask,
            ids: batch.ids(),
            snr: prepared.iter().map(|p| p.snr).collect(),
            norm_fluxes,
            norm_ivars,
            continua,
            failures,
        })
    }
}
