//! End-to-end scenarios: raw spectra in, normalized dataset out.

use std::collections::BTreeMap;

use cannon_norm::data::model::HeaderValue;
use cannon_norm::data::{loader, writer};
use cannon_norm::{
    ContinuumFitter, NormalizationConfig, SegmentRanges, Silent, SpectrumAssembler,
    SpectrumBatch, StarArrays, StarSpectrum, WavelengthScale, continuum_mask,
};

fn star(id: &str, flux: Vec<f64>, flux_err: Vec<f64>) -> StarSpectrum {
    let mut header = BTreeMap::new();
    header.insert("CRVAL1".to_string(), HeaderValue::Float(15_100.0));
    header.insert("CDELT1".to_string(), HeaderValue::Float(0.5));
    StarSpectrum {
        id: id.to_string(),
        flux,
        flux_err,
        header,
    }
}

fn linear_config(segments: &[(usize, usize)], parallel: bool) -> NormalizationConfig {
    let mut cfg = NormalizationConfig::with_segments(SegmentRanges::new(segments).unwrap());
    cfg.wavelength_scale = WavelengthScale::Linear;
    cfg.parallel = parallel;
    cfg
}

#[test]
fn test_constant_unit_column_is_continuum_and_gets_zero_weight() {
    let stars: Vec<StarSpectrum> = (0..3)
        .map(|k| {
            let flux = (0..10)
                .map(|i| if i == 5 { 1.0 } else { 1.3 + 0.1 * k as f64 + 0.01 * i as f64 })
                .collect();
            star(&format!("s{k}"), flux, vec![0.02; 10])
        })
        .collect();
    let batch = SpectrumBatch::from_spectra(stars);

    let dataset = SpectrumAssembler::new(linear_config(&[(0, 10)], false), &Silent)
        .assemble(&batch)
        .unwrap();

    let mut expected = vec![false; 10];
    expected[5] = true;
    assert_eq!(dataset.contmask, expected);
    assert!(dataset.failures.is_empty());
    for k in 0..3 {
        assert_eq!(dataset.norm_ivars[k][5], 0.0, "star {k}");
        for i in (0..10).filter(|&i| i != 5) {
            assert!(dataset.norm_ivars[k][i] > 0.0, "star {k} pixel {i}");
        }
    }
}

#[test]
fn test_single_nan_pixel_is_filled_and_neighbours_untouched() {
    let clean: Vec<f64> = (0..12).map(|i| 0.8 + 0.02 * i as f64).collect();
    let mut broken = clean.clone();
    broken[4] = f64::NAN;
    let batch = SpectrumBatch::from_spectra(vec![
        star("broken", broken, vec![0.01; 12]),
        star("clean", clean.iter().map(|f| f * 1.5).collect(), vec![0.01; 12]),
    ]);

    let dataset = SpectrumAssembler::new(linear_config(&[(0, 12)], true), &Silent)
        .assemble(&batch)
        .unwrap();

    assert_eq!(dataset.norm_fluxes[0][4], 1.0);
    assert_eq!(dataset.norm_ivars[0][4], 0.0);
    for i in [3usize, 5] {
        assert!((dataset.norm_fluxes[0][i] - 1.0).abs() < 1e-9);
        let expected_ivar = (clean[i] / 0.01).powi(2);
        assert!((dataset.norm_ivars[0][i] - expected_ivar).abs() < 1e-6 * expected_ivar);
    }
    assert!((dataset.continua[0][4] - clean[4]).abs() < 1e-9);
}

#[test]
fn test_cubic_segments_recovered_on_log_axis() {
    // Two segments with a gap; each holds a different cubic in wavelength.
    let npix = 120;
    let wavelength: Vec<f64> = (0..npix).map(|i| 10f64.powf(4.18 + 6e-6 * i as f64)).collect();
    let cubic = |l: f64, a: f64| {
        let u = (l - 15_150.0) / 10.0;
        a + 0.02 * u - 0.003 * u * u + 0.0004 * u * u * u
    };
    let flux: Vec<f64> = wavelength
        .iter()
        .enumerate()
        .map(|(i, &l)| if i < 60 { cubic(l, 1.2) } else { cubic(l, 0.7) })
        .collect();
    let flux_err = vec![0.01; npix];
    let ivar = vec![1e4; npix];
    let star = StarArrays {
        flux: &flux,
        flux_err: &flux_err,
        ivar: &ivar,
    };

    let fitter = ContinuumFitter::new(SegmentRanges::new(&[(5, 58), (62, 115)]).unwrap(), 3);
    let out = fitter
        .normalize_star(&wavelength, &star, &vec![false; npix])
        .unwrap();

    for i in (5..58).chain(62..115) {
        assert!((out.norm_flux[i] - 1.0).abs() < 1e-8, "pixel {i}: {}", out.norm_flux[i]);
        assert!((out.continuum[i] - flux[i]).abs() < 1e-8);
    }
    for i in (0..5).chain(58..62).chain(115..npix) {
        assert_eq!(out.norm_flux[i], 1.0);
        assert_eq!(out.norm_ivar[i], 0.0);
    }
}

#[test]
fn test_star_order_only_permutes_rows() {
    let make = |k: usize| {
        let flux: Vec<f64> = (0..16)
            .map(|i| 1.0 + 0.05 * k as f64 + 0.1 * ((i + k) as f64 * 0.9).sin())
            .collect();
        star(&format!("s{k}"), flux, vec![0.02; 16])
    };
    let forward = SpectrumBatch::from_spectra((0..4).map(make).collect());
    let backward = SpectrumBatch::from_spectra((0..4).rev().map(make).collect());

    let cfg = linear_config(&[(0, 8), (8, 16)], true);
    let a = SpectrumAssembler::new(cfg.clone(), &Silent).assemble(&forward).unwrap();
    let b = SpectrumAssembler::new(cfg, &Silent).assemble(&backward).unwrap();

    assert_eq!(a.contmask, b.contmask);
    for k in 0..4 {
        assert_eq!(a.ids[k], b.ids[3 - k]);
        assert_eq!(a.norm_fluxes[k], b.norm_fluxes[3 - k]);
        assert_eq!(a.norm_ivars[k], b.norm_ivars[3 - k]);
    }

    let fluxes: Vec<Vec<f64>> = forward.spectra.iter().map(|s| s.flux.clone()).collect();
    let mut reversed = fluxes.clone();
    reversed.reverse();
    let thresholds = loose_thresholds();
    assert_eq!(
        continuum_mask(&fluxes, &thresholds).unwrap(),
        continuum_mask(&reversed, &thresholds).unwrap()
    );
}

fn loose_thresholds() -> cannon_norm::ContinuumThresholds {
    cannon_norm::ContinuumThresholds {
        f_cut: 0.2,
        sigma_cut: 0.01,
    }
}

#[test]
fn test_json_file_through_to_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("stars.json");
    std::fs::write(
        &input,
        r#"[
            {"id": "a", "flux": [1.0, 1.1, 1.2, 1.3, 1.4, 1.5], "flux_err": [0.1, 0.1, 0.1, 0.1, 0.1, 0.1], "CRVAL1": 3.7, "CDELT1": 0.0001},
            {"id": "b", "flux": [2.0, 2.1, null, 2.3, 2.4, 2.5], "flux_err": [0.1, 0.1, 0.1, 0.1, 0.1, 0.1]},
            {"id": "c", "flux": [0.5, 0.5, 0.5, 0.5, 0.5, 0.5], "flux_err": [0.1, 0.1, 0.1, 0.1, 0.1, 0.1]}
        ]"#,
    )
    .unwrap();

    let batch = loader::load_path(&input).unwrap();
    let cfg = NormalizationConfig::with_segments(SegmentRanges::new(&[(0, 6)]).unwrap());
    let dataset = SpectrumAssembler::new(cfg, &Silent).assemble(&batch).unwrap();

    assert_eq!(dataset.ids, vec!["a", "b", "c"]);
    assert_eq!(dataset.n_pixels(), 6);
    assert!((dataset.wavelength.values()[0] - 10f64.powf(3.7)).abs() < 1e-9);
    assert_eq!(dataset.norm_fluxes[1][2], 1.0);
    assert_eq!(dataset.norm_ivars[1][2], 0.0);

    let out = dir.path().join("normalized.parquet");
    writer::write_parquet(&dataset, &out).unwrap();
    writer::write_axis_json(&dataset, &dir.path().join("normalized.axis.json")).unwrap();
    assert!(out.exists());
}
