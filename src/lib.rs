//! Continuum normalization of stellar spectra.
//!
//! Raw flux/error arrays go in; a continuum mask, normalized flux and
//! normalized inverse variance come out, ready for label fitting.

pub mod assemble;
pub mod config;
pub mod continuum;
pub mod data;
pub mod error;
pub mod progress;

pub use assemble::{NormalizedDataset, SpectrumAssembler};
pub use config::NormalizationConfig;
pub use continuum::contmask::{ContinuumThresholds, continuum_mask};
pub use continuum::fit::{ContinuumFitter, StarArrays, StarContinuum};
pub use continuum::pixmask::bad_pixel_mask;
pub use continuum::segments::{Segment, SegmentRanges};
pub use data::model::{SpectrumBatch, StarSpectrum, WavelengthAxis, WavelengthScale};
pub use error::{NormalizeError, StarFailure};
pub use progress::{LogProgress, NormalizeEvent, Progress, Silent};
