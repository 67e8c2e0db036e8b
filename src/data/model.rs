use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::continuum::check_wavelength_axis;
use crate::error::NormalizeError;

// ---------------------------------------------------------------------------
// HeaderValue – one header card / metadata cell of a spectrum
// ---------------------------------------------------------------------------

/// A dynamically-typed header value attached to a spectrum.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::String(s) => write!(f, "{s}"),
            HeaderValue::Integer(i) => write!(f, "{i}"),
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::Bool(b) => write!(f, "{b}"),
            HeaderValue::Null => write!(f, "<null>"),
        }
    }
}

impl HeaderValue {
    /// Numeric value, if any. Strings are parsed so CSV headers work too.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Integer(i) => Some(*i as f64),
            HeaderValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// StarSpectrum – one star as read from disk
// ---------------------------------------------------------------------------

/// Raw spectrum of a single star.
#[derive(Debug, Clone)]
pub struct StarSpectrum {
    pub id: String,
    pub flux: Vec<f64>,
    /// Flux uncertainty, same length as `flux`.
    pub flux_err: Vec<f64>,
    /// Remaining columns of the source row (`CRVAL1`, `CDELT1`, ...).
    pub header: BTreeMap<String, HeaderValue>,
}

impl StarSpectrum {
    /// Case-insensitive header lookup.
    pub fn header_value(&self, key: &str) -> Option<&HeaderValue> {
        self.header
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flux.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SpectrumBatch – every star of one dataset
// ---------------------------------------------------------------------------

/// All stars of one dataset, in load order.
#[derive(Debug, Clone, Default)]
pub struct SpectrumBatch {
    pub spectra: Vec<StarSpectrum>,
}

impl SpectrumBatch {
    pub fn from_spectra(spectra: Vec<StarSpectrum>) -> Self {
        SpectrumBatch { spectra }
    }

    /// Append another batch, keeping order.
    pub fn extend(&mut self, other: SpectrumBatch) {
        self.spectra.extend(other.spectra);
    }

    pub fn ids(&self) -> Vec<String> {
        self.spectra.iter().map(|s| s.id.clone()).collect()
    }

    /// Number of stars.
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}

// ---------------------------------------------------------------------------
// WavelengthAxis – common grid shared by every star
// ---------------------------------------------------------------------------

/// How header start/step values relate to wavelength.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WavelengthScale {
    /// `λ = start + i·step`
    Linear,
    /// `λ = 10^(start + i·step)`, the APOGEE convention.
    #[default]
    Log10,
}

/// Header key for the first pixel's (log) wavelength.
pub const START_KEY: &str = "CRVAL1";
/// Header key for the per-pixel (log) wavelength step.
pub const STEP_KEY: &str = "CDELT1";

/// Finite, strictly monotonic wavelength grid.
#[derive(Debug, Clone, PartialEq)]
pub struct WavelengthAxis(Vec<f64>);

impl WavelengthAxis {
    pub fn new(values: Vec<f64>) -> Result<Self, NormalizeError> {
        check_wavelength_axis(&values)?;
        Ok(WavelengthAxis(values))
    }

    /// Build `npix` samples from a start value and step.
    pub fn from_grid(
        start: f64,
        step: f64,
        npix: usize,
        scale: WavelengthScale,
    ) -> Result<Self, NormalizeError> {
        let values = (0..npix)
            .map(|i| {
                let v = start + step * i as f64;
                match scale {
                    WavelengthScale::Linear => v,
                    WavelengthScale::Log10 => 10f64.powf(v),
                }
            })
            .collect();
        Self::new(values)
    }

    /// Axis described by a spectrum's `CRVAL1`/`CDELT1` header, one sample
    /// per flux pixel.
    pub fn from_header(
        spectrum: &StarSpectrum,
        scale: WavelengthScale,
    ) -> Result<Self, NormalizeError> {
        let lookup = |key: &str| {
            spectrum
                .header_value(key)
                .and_then(HeaderValue::as_f64)
                .ok_or_else(|| {
                    NormalizeError::malformed(format!(
                        "star '{}' has no numeric {key} header",
                        spectrum.id
                    ))
                })
        };
        let start = lookup(START_KEY)?;
        let step = lookup(STEP_KEY)?;
        Self::from_grid(start, step, spectrum.len(), scale)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star_with_header(start: HeaderValue, step: HeaderValue, npix: usize) -> StarSpectrum {
        let mut header = BTreeMap::new();
        header.insert("crval1".to_string(), start);
        header.insert("CDelt1".to_string(), step);
        StarSpectrum {
            id: "s1".to_string(),
            flux: vec![1.0; npix],
            flux_err: vec![0.1; npix],
            header,
        }
    }

    #[test]
    fn test_log_axis_from_header() {
        let star = star_with_header(HeaderValue::Float(4.179), HeaderValue::Float(6e-6), 5);
        let axis = WavelengthAxis::from_header(&star, WavelengthScale::Log10).unwrap();
        assert_eq!(axis.len(), 5);
        assert!((axis.values()[0] - 10f64.powf(4.179)).abs() < 1e-8);
        assert!((axis.values()[4] - 10f64.powf(4.179 + 4.0 * 6e-6)).abs() < 1e-8);
    }

    #[test]
    fn test_linear_axis_accepts_string_headers() {
        let star = star_with_header(
            HeaderValue::String("3900.0".into()),
            HeaderValue::Integer(2),
            3,
        );
        let axis = WavelengthAxis::from_header(&star, WavelengthScale::Linear).unwrap();
        assert_eq!(axis.values(), &[3900.0, 3902.0, 3904.0]);
    }

    #[test]
    fn test_missing_or_flat_header_is_malformed() {
        let mut star = star_with_header(HeaderValue::Float(1.0), HeaderValue::Float(0.0), 3);
        assert!(matches!(
            WavelengthAxis::from_header(&star, WavelengthScale::Linear),
            Err(NormalizeError::MalformedInput(_))
        ));
        star.header.remove("crval1");
        assert!(WavelengthAxis::from_header(&star, WavelengthScale::Linear).is_err());
    }

    #[test]
    fn test_scale_serde_names() {
        let scale: WavelengthScale = serde_json::from_str("\"linear\"").unwrap();
        assert_eq!(scale, WavelengthScale::Linear);
        assert_eq!(WavelengthScale::default(), WavelengthScale::Log10);
    }
}
