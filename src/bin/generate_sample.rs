use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Float64Builder, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;

use cannon_norm::{NormalizationConfig, SegmentRanges};

const N_STARS: usize = 24;
const N_PIXELS: usize = 600;
/// log10 of the first wavelength (≈ 15100 Å) and the per-pixel step.
const CRVAL1: f64 = 4.179;
const CDELT1: f64 = 6e-6;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        let u = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        lo + (hi - lo) * u
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.uniform(0.0, 1.0).max(1e-15);
        let u2 = self.uniform(0.0, 1.0);
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

struct SyntheticStar {
    id: String,
    teff: f64,
    feh: f64,
    flux: Vec<f64>,
    flux_err: Vec<f64>,
}

/// Smooth cubic continuum times Gaussian absorption lines whose depth
/// scales with metallicity, plus noise and a few dead pixels.
fn synthesize(index: usize, wavelength: &[f64], lines: &[(f64, f64)], rng: &mut SimpleRng) -> SyntheticStar {
    let teff = rng.uniform(4000.0, 5500.0);
    let feh = rng.uniform(-1.0, 0.4);
    let snr = rng.uniform(60.0, 250.0);
    let tilt = [rng.uniform(0.9, 1.1), rng.uniform(-0.05, 0.05), rng.uniform(-0.02, 0.02), rng.uniform(-0.01, 0.01)];

    let mid = 0.5 * (wavelength[0] + wavelength[wavelength.len() - 1]);
    let half = 0.5 * (wavelength[wavelength.len() - 1] - wavelength[0]);
    let depth_scale = 0.3 * 10f64.powf(0.5 * feh) * (5500.0 / teff);

    let mut flux = Vec::with_capacity(wavelength.len());
    let mut flux_err = Vec::with_capacity(wavelength.len());
    for &lambda in wavelength {
        let u = (lambda - mid) / half;
        let continuum = tilt[0] + tilt[1] * u + tilt[2] * u * u + tilt[3] * u * u * u;
        let absorption: f64 = lines
            .iter()
            .map(|&(center, width)| {
                depth_scale * (-(lambda - center).powi(2) / (2.0 * width * width)).exp()
            })
            .sum();
        let clean = continuum * (1.0 - absorption.min(0.95));
        let sigma = clean / snr;
        flux.push(clean + rng.gauss(0.0, sigma));
        flux_err.push(sigma);
    }

    for _ in 0..3 {
        let pix = (rng.uniform(0.0, wavelength.len() as f64) as usize).min(wavelength.len() - 1);
        flux[pix] = f64::NAN;
    }
    let pix = (rng.uniform(0.0, wavelength.len() as f64) as usize).min(wavelength.len() - 1);
    flux_err[pix] = 0.0;

    SyntheticStar {
        id: format!("2M{:08}", 1000 + index),
        teff,
        feh,
        flux,
        flux_err,
    }
}

fn list_array(rows: &[&[f64]]) -> arrow::array::ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    builder.finish()
}

fn write_spectra(stars: &[SyntheticStar], path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("flux", DataType::List(Arc::new(Field::new("item", DataType::Float64, true))), false),
        Field::new("flux_err", DataType::List(Arc::new(Field::new("item", DataType::Float64, true))), false),
        Field::new("CRVAL1", DataType::Float64, false),
        Field::new("CDELT1", DataType::Float64, false),
    ]));

    let ids = StringArray::from(stars.iter().map(|s| s.id.as_str()).collect::<Vec<_>>());
    let flux: Vec<&[f64]> = stars.iter().map(|s| s.flux.as_slice()).collect();
    let flux_err: Vec<&[f64]> = stars.iter().map(|s| s.flux_err.as_slice()).collect();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(ids),
            Arc::new(list_array(&flux)),
            Arc::new(list_array(&flux_err)),
            Arc::new(Float64Array::from(vec![CRVAL1; stars.len()])),
            Arc::new(Float64Array::from(vec![CDELT1; stars.len()])),
        ],
    )
    .context("Failed to create RecordBatch")?;

    let file = std::fs::File::create(path).context("Failed to create output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("Failed to create writer")?;
    writer.write(&batch).context("Failed to write batch")?;
    writer.close().context("Failed to close writer")?;
    Ok(())
}

fn write_labels(stars: &[SyntheticStar], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("Failed to create label file")?;
    writer.write_record(["#id", "teff", "feh"])?;
    for star in stars {
        writer.write_record([star.id.clone(), format!("{:.1}", star.teff), format!("{:.3}", star.feh)])?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    let wavelength: Vec<f64> = (0..N_PIXELS)
        .map(|i| 10f64.powf(CRVAL1 + CDELT1 * i as f64))
        .collect();
    let lines: Vec<(f64, f64)> = (0..25)
        .map(|_| {
            let center = rng.uniform(wavelength[0], wavelength[N_PIXELS - 1]);
            (center, rng.uniform(0.3, 0.9))
        })
        .collect();

    let stars: Vec<SyntheticStar> = (0..N_STARS)
        .map(|i| synthesize(i, &wavelength, &lines, &mut rng))
        .collect();

    write_spectra(&stars, Path::new("sample_spectra.parquet"))?;
    write_labels(&stars, Path::new("sample_labels.csv"))?;

    // Two "chips" with their edge pixels dropped.
    let segments = SegmentRanges::new(&[(20, 285), (315, 580)])?;
    NormalizationConfig::with_segments(segments).save(Path::new("sample_config.json"))?;

    info!("Wrote {N_STARS} spectra ({N_PIXELS} pixels each) to sample_spectra.parquet");
    println!(
        "Wrote {N_STARS} spectra ({N_PIXELS} pixels each) to sample_spectra.parquet, \
         labels to sample_labels.csv, config to sample_config.json"
    );
    Ok(())
}
