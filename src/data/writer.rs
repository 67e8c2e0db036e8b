use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{BooleanArray, Float64Array, Float64Builder, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

use crate::assemble::NormalizedDataset;

// ---------------------------------------------------------------------------
// Parquet: one row per star
// ---------------------------------------------------------------------------

fn list_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        false,
    )
}

fn list_array(rows: &[Vec<f64>]) -> arrow::array::ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    builder.finish()
}

/// Write per-star results to Parquet.
///
/// Columns: `id`, `snr`, `fit_ok`, `norm_flux`, `norm_ivar`, `continuum`.
pub fn write_parquet(dataset: &NormalizedDataset, path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("snr", DataType::Float64, false),
        Field::new("fit_ok", DataType::Boolean, false),
        list_field("norm_flux"),
        list_field("norm_ivar"),
        list_field("continuum"),
    ]));

    let ids = StringArray::from(dataset.ids.iter().map(String::as_str).collect::<Vec<_>>());
    let snr = Float64Array::from(dataset.snr.clone());
    let fit_ok = BooleanArray::from(
        (0..dataset.n_stars())
            .map(|i| dataset.is_ok(i))
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(ids),
            Arc::new(snr),
            Arc::new(fit_ok),
            Arc::new(list_array(&dataset.norm_fluxes)),
            Arc::new(list_array(&dataset.norm_ivars)),
            Arc::new(list_array(&dataset.continua)),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;

    info!("Wrote {} normalized spectra to {}", dataset.n_stars(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON sidecar: the shared axis and run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct FailureRecord<'a> {
    index: usize,
    id: &'a str,
    error: String,
}

#[derive(Debug, Serialize)]
struct AxisSummary<'a> {
    wavelength: &'a [f64],
    continuum_mask: &'a [bool],
    n_continuum: usize,
    failures: Vec<FailureRecord<'a>>,
}

/// Write the wavelength axis, continuum mask and failure list as JSON.
pub fn write_axis_json(dataset: &NormalizedDataset, path: &Path) -> Result<()> {
    let summary = AxisSummary {
        wavelength: dataset.wavelength.values(),
        continuum_mask: &dataset.contmask,
        n_continuum: dataset.n_continuum(),
        failures: dataset
            .failures
            .iter()
            .map(|f| FailureRecord {
                index: f.index,
                id: &f.id,
                error: f.error.to_string(),
            })
            .collect(),
    };
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &summary)
        .context("writing axis summary")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::WavelengthAxis;
    use crate::error::{NormalizeError, StarFailure};
    use arrow::array::AsArray;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn dataset() -> NormalizedDataset {
        NormalizedDataset {
            wavelength: WavelengthAxis::new(vec![1.0, 2.0, 3.0]).unwrap(),
            contmask: vec![false, true, false],
            ids: vec!["a".into(), "b".into()],
            snr: vec![50.0, f64::NAN],
            norm_fluxes: vec![vec![1.0, 0.9, 1.1], vec![1.0; 3]],
            norm_ivars: vec![vec![10.0, 0.0, 12.0], vec![0.0; 3]],
            continua: vec![vec![2.0, 2.0, 2.0], vec![0.0; 3]],
            failures: vec![StarFailure {
                index: 1,
                id: "b".into(),
                error: NormalizeError::IllPosedFit {
                    start: 0,
                    stop: 3,
                    reason: "no weight".into(),
                },
            }],
        }
    }

    #[test]
    fn test_parquet_rows_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        write_parquet(&dataset(), &path).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);

        let batch = &batches[0];
        let fit_ok = batch.column_by_name("fit_ok").unwrap().as_boolean();
        assert!(fit_ok.value(0));
        assert!(!fit_ok.value(1));

        let flux = batch.column_by_name("norm_flux").unwrap().as_list::<i32>();
        let first = flux.value(0);
        let first = first.as_primitive::<arrow::datatypes::Float64Type>();
        assert_eq!(first.len(), 3);
        assert_eq!(first.value(1), 0.9);
    }

    #[test]
    fn test_axis_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.axis.json");
        write_axis_json(&dataset(), &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["n_continuum"], 1);
        assert_eq!(value["continuum_mask"][1], true);
        assert_eq!(value["failures"][0]["id"], "b");
        assert_eq!(value["wavelength"].as_array().unwrap().len(), 3);
    }
}
