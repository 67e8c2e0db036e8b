use log::debug;
use rayon::prelude::*;

use super::chebyshev::{self, ChebyshevSeries, FitFailure};
use super::pixmask::is_bad_pixel;
use super::segments::{Segment, SegmentRanges};
use super::check_wavelength_axis;
use crate::error::NormalizeError;
use crate::progress::{NormalizeEvent, Progress};

/// Normalized flux written wherever a pixel is masked or not covered.
pub const FLUX_FILL: f64 = 1.0;
/// Normalized inverse variance written wherever a pixel is masked or not covered.
pub const IVAR_FILL: f64 = 0.0;
/// Non-finite or non-positive normalized inverse variances are replaced by
/// the smallest positive one in the segment times this factor.
pub const IVAR_FLOOR_FACTOR: f64 = 1e-2;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Borrowed per-star arrays, all aligned to the wavelength axis.
#[derive(Debug, Clone, Copy)]
pub struct StarArrays<'a> {
    pub flux: &'a [f64],
    pub flux_err: &'a [f64],
    pub ivar: &'a [f64],
}

/// Fit and normalization of one segment of one star.
#[derive(Debug, Clone)]
pub struct SegmentFit {
    pub segment: Segment,
    pub series: ChebyshevSeries,
    pub continuum: Vec<f64>,
    pub norm_flux: Vec<f64>,
    pub norm_ivar: Vec<f64>,
}

/// Continuum and normalized arrays for one star over the full axis.
#[derive(Debug, Clone, PartialEq)]
pub struct StarContinuum {
    /// Fitted continuum; 0.0 outside every segment.
    pub continuum: Vec<f64>,
    pub norm_flux: Vec<f64>,
    pub norm_ivar: Vec<f64>,
    /// One series per segment, in segment order.
    pub series: Vec<ChebyshevSeries>,
}

impl StarContinuum {
    /// A row carrying no weight, used for uncovered pixels and failed stars.
    pub fn unweighted(npix: usize) -> Self {
        Self {
            continuum: vec![0.0; npix],
            norm_flux: vec![FLUX_FILL; npix],
            norm_ivar: vec![IVAR_FILL; npix],
            series: Vec::new(),
        }
    }

    fn merge(&mut self, fit: SegmentFit) {
        let Segment { start, stop } = fit.segment;
        self.continuum[start..stop].copy_from_slice(&fit.continuum);
        self.norm_flux[start..stop].copy_from_slice(&fit.norm_flux);
        self.norm_ivar[start..stop].copy_from_slice(&fit.norm_ivar);
        self.series.push(fit.series);
    }
}

// ---------------------------------------------------------------------------
// Single segment
// ---------------------------------------------------------------------------

/// Fit a Chebyshev continuum to one segment and normalize by it.
pub fn normalize_segment(
    wavelength: &[f64],
    star: &StarArrays<'_>,
    segment: Segment,
    degree: usize,
) -> Result<SegmentFit, NormalizeError> {
    let Segment { start, stop } = segment;
    let ill_posed = |reason: String| NormalizeError::IllPosedFit { start, stop, reason };

    if segment.is_empty() {
        return Err(ill_posed("segment is empty".to_string()));
    }
    let lens = [
        ("wavelength", wavelength.len()),
        ("flux", star.flux.len()),
        ("flux_err", star.flux_err.len()),
        ("ivar", star.ivar.len()),
    ];
    if let Some((name, len)) = lens.into_iter().find(|(_, len)| stop > *len) {
        return Err(NormalizeError::malformed(format!(
            "segment [{start}, {stop}) exceeds {name} of {len} pixels"
        )));
    }

    let wl = &wavelength[start..stop];
    let flux = &star.flux[start..stop];
    let flux_err = &star.flux_err[start..stop];
    let ivar = &star.ivar[start..stop];

    let series = chebyshev::fit_weighted(wl, flux, ivar, degree).map_err(|f| match f {
        FitFailure::NoUsableSamples => {
            ill_posed("no sample with finite flux and positive weight".to_string())
        }
        FitFailure::Solver(msg) => ill_posed(format!("least-squares solve failed: {msg}")),
    })?;
    if series.degree() < degree {
        debug!(
            "Segment [{start}, {stop}): degree lowered from {degree} to {}",
            series.degree()
        );
    }

    let continuum = series.eval_all(wl);
    let mut norm_flux: Vec<f64> = flux.iter().zip(&continuum).map(|(f, c)| f / c).collect();
    let norm_err: Vec<f64> = flux_err.iter().zip(&continuum).map(|(e, c)| e / c).collect();
    let mut norm_ivar: Vec<f64> = norm_err.iter().map(|e| 1.0 / (e * e)).collect();

    let floor = norm_ivar
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .reduce(f64::min)
        .ok_or_else(|| ill_posed("no finite positive normalized inverse variance".to_string()))?
        * IVAR_FLOOR_FACTOR;
    for v in norm_ivar.iter_mut().filter(|v| !v.is_finite() || **v <= 0.0) {
        *v = floor;
    }

    for ((f, iv), &e) in norm_flux.iter_mut().zip(norm_ivar.iter_mut()).zip(&norm_err) {
        if is_bad_pixel(*f, e) {
            *f = FLUX_FILL;
            *iv = IVAR_FILL;
        }
    }

    Ok(SegmentFit {
        segment,
        series,
        continuum,
        norm_flux,
        norm_ivar,
    })
}

// ---------------------------------------------------------------------------
// Whole stars
// ---------------------------------------------------------------------------

/// Piecewise continuum fitter over fixed segments of the wavelength axis.
#[derive(Debug, Clone)]
pub struct ContinuumFitter {
    segments: SegmentRanges,
    degree: usize,
    parallel: bool,
}

impl ContinuumFitter {
    pub fn new(segments: SegmentRanges, degree: usize) -> Self {
        Self {
            segments,
            degree,
            parallel: true,
        }
    }

    /// Toggle the parallel map over stars. Output order does not depend on it.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn segments(&self) -> &SegmentRanges {
        &self.segments
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Normalize one star across every segment.
    ///
    /// Continuum-mask pixels get zero inverse variance once all segments
    /// are done, whatever the fit produced there.
    pub fn normalize_star(
        &self,
        wavelength: &[f64],
        star: &StarArrays<'_>,
        contmask: &[bool],
    ) -> Result<StarContinuum, NormalizeError> {
        check_wavelength_axis(wavelength)?;
        let npix = wavelength.len();
        check_lengths(npix, star, contmask)?;
        self.segments.check_bounds(npix)?;

        let mut out = StarContinuum::unweighted(npix);
        for &segment in self.segments.iter() {
            let fit = normalize_segment(wavelength, star, segment, self.degree)?;
            out.merge(fit);
        }
        for (iv, _) in out.norm_ivar.iter_mut().zip(contmask).filter(|(_, c)| **c) {
            *iv = 0.0;
        }
        Ok(out)
    }

    /// Normalize every star. One result per star, in input order; a failed
    /// star does not stop the others.
    pub fn normalize_all(
        &self,
        wavelength: &[f64],
        stars: &[StarArrays<'_>],
        contmask: &[bool],
        progress: &dyn Progress,
    ) -> Vec<Result<StarContinuum, NormalizeError>> {
        let total = stars.len();
        let run = |index: usize, star: &StarArrays<'_>| {
            let result = self.normalize_star(wavelength, star, contmask);
            match &result {
                Ok(_) => progress.report(NormalizeEvent::StarNormalized { index, stars: total }),
                Err(error) => progress.report(NormalizeEvent::StarFailed { index, error }),
            }
            result
        };

        if self.parallel {
            stars
                .par_iter()
                .enumerate()
                .map(|(index, star)| run(index, star))
                .collect()
        } else {
            stars
                .iter()
                .enumerate()
                .map(|(index, star)| run(index, star))
                .collect()
        }
    }
}

fn check_lengths(
    npix: usize,
    star: &StarArrays<'_>,
    contmask: &[bool],
) -> Result<(), NormalizeError> {
    let lens = [
        ("flux", star.flux.len()),
        ("flux_err", star.flux_err.len()),
        ("ivar", star.ivar.len()),
        ("continuum mask", contmask.len()),
    ];
    for (name, len) in lens {
        if len != npix {
            return Err(NormalizeError::malformed(format!(
                "{name} has {len} pixels but the wavelength axis has {npix}"
            )));
        }
    }
    Ok(())
}
