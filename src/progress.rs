use log::{debug, info, warn};

use crate::error::NormalizeError;

/// Milestones of a normalization run.
#[derive(Debug, Clone, Copy)]
pub enum NormalizeEvent<'a> {
    /// Raw spectra are prepared and about to be normalized.
    Loaded { stars: usize, pixels: usize },
    /// Continuum pixels were identified across the ensemble.
    ContinuumSelected { continuum: usize, pixels: usize },
    /// One star was normalized.
    StarNormalized { index: usize, stars: usize },
    /// One star could not be normalized; the run carries on.
    StarFailed {
        index: usize,
        error: &'a NormalizeError,
    },
    /// All stars processed.
    Finished { normalized: usize, failed: usize },
}

/// Receives progress events. Shared across worker threads, hence `Sync`.
pub trait Progress: Sync {
    fn report(&self, event: NormalizeEvent<'_>);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn report(&self, event: NormalizeEvent<'_>) {
        match event {
            NormalizeEvent::Loaded { stars, pixels } => {
                info!("Loaded {stars} stellar spectra ({pixels} pixels each)")
            }
            NormalizeEvent::ContinuumSelected { continuum, pixels } => {
                info!("{continuum} of {pixels} pixels identified as continuum")
            }
            NormalizeEvent::StarNormalized { index, stars } => {
                debug!("Normalized star {} / {stars}", index + 1)
            }
            NormalizeEvent::StarFailed { index, error } => {
                warn!("Star {index} not normalized: {error}")
            }
            NormalizeEvent::Finished { normalized, failed } => {
                info!("Continuum normalization done: {normalized} ok, {failed} failed")
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Progress for Silent {
    fn report(&self, _event: NormalizeEvent<'_>) {}
}
