use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeListArray, ListArray, StringArray,
};
use arrow::datatypes::DataType;
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{HeaderValue, SpectrumBatch, StarSpectrum};

/// Column holding the flux samples.
pub const FLUX_COLUMN: &str = "flux";
/// Column holding the flux uncertainties.
pub const ERR_COLUMN: &str = "flux_err";
/// Optional column naming each star.
pub const ID_COLUMN: &str = "id";

const SUPPORTED_EXTENSIONS: &[&str] = &["parquet", "pq", "json", "csv"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load spectra from a file, or from every supported file in a directory.
///
/// Directory entries are read in file-name order, so star order is stable
/// across runs.
pub fn load_path(path: &Path) -> Result<SpectrumBatch> {
    if !path.is_dir() {
        return load_file(path);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("listing {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && SUPPORTED_EXTENSIONS.contains(&extension(p).as_str()))
        .collect();
    files.sort();

    if files.is_empty() {
        bail!("No spectrum files found in {}", path.display());
    }

    let mut batch = SpectrumBatch::default();
    for file in &files {
        let part = load_file(file)?;
        debug!("{}: {} star(s)", file.display(), part.len());
        batch.extend(part);
    }
    info!(
        "Read {} star(s) from {} file(s) in {}",
        batch.len(),
        files.len(),
        path.display()
    );
    Ok(batch)
}

/// Load spectra from a single file.  Dispatch by extension.
///
/// Supported formats (one star per row):
/// * `.parquet` – `flux` and `flux_err` list columns (recommended)
/// * `.json`    – `[{ "flux": [...], "flux_err": [...], ...header }, ...]`
/// * `.csv`     – `flux` and `flux_err` columns of semicolon-separated floats
///
/// Every other column becomes a header value.
pub fn load_file(path: &Path) -> Result<SpectrumBatch> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("star")
        .to_string();

    let batch = match extension(path).as_str() {
        "parquet" | "pq" => load_parquet(path, &stem),
        "json" => load_json(path, &stem),
        "csv" => load_csv(path, &stem),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;
    Ok(batch)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Build a star from one parsed row, pulling the id out of the header.
fn make_star(
    stem: &str,
    row: usize,
    flux: Vec<f64>,
    flux_err: Vec<f64>,
    mut header: BTreeMap<String, HeaderValue>,
) -> Result<StarSpectrum> {
    if flux.len() != flux_err.len() {
        bail!(
            "Row {row}: flux has {} values but flux_err has {}",
            flux.len(),
            flux_err.len()
        );
    }
    let id = match header.remove(ID_COLUMN) {
        Some(HeaderValue::Null) | None => format!("{stem}:{row}"),
        Some(value) => value.to_string(),
    };
    Ok(StarSpectrum {
        id,
        flux,
        flux_err,
        header,
    })
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented JSON:
///
/// ```json
/// [
///   {
///     "id": "2M00000002+7417074",
///     "flux":     [0.98, 1.01, null, ...],
///     "flux_err": [0.02, 0.02, 0.03, ...],
///     "CRVAL1": 4.179,
///     "CDELT1": 6e-6
///   },
///   ...
/// ]
/// ```
///
/// JSON has no NaN, so `null` samples are read as NaN.
fn load_json(path: &Path, stem: &str) -> Result<SpectrumBatch> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut spectra = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let flux = json_array_to_f64(obj.get(FLUX_COLUMN), i, FLUX_COLUMN)?;
        let flux_err = json_array_to_f64(obj.get(ERR_COLUMN), i, ERR_COLUMN)?;

        let header = obj
            .iter()
            .filter(|(key, _)| key.as_str() != FLUX_COLUMN && key.as_str() != ERR_COLUMN)
            .map(|(key, val)| (key.clone(), json_to_header(val)))
            .collect();

        spectra.push(make_star(stem, i, flux, flux_err, header)?);
    }

    Ok(SpectrumBatch::from_spectra(spectra))
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| match v {
            JsonValue::Null => Ok(f64::NAN),
            _ => v
                .as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number")),
        })
        .collect()
}

fn json_to_header(val: &JsonValue) -> HeaderValue {
    match val {
        JsonValue::String(s) => HeaderValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                HeaderValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                HeaderValue::Float(f)
            } else {
                HeaderValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => HeaderValue::Bool(*b),
        JsonValue::Null => HeaderValue::Null,
        other => HeaderValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names.
/// `flux` and `flux_err` hold semicolon-separated floats (`nan` allowed):
///   `"0.98;1.01;nan"`, `"0.02;0.02;0.03"`
/// All other columns are header values.
fn load_csv(path: &Path, stem: &str) -> Result<SpectrumBatch> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let flux_idx = headers
        .iter()
        .position(|h| h == FLUX_COLUMN)
        .context("CSV missing 'flux' column")?;
    let err_idx = headers
        .iter()
        .position(|h| h == ERR_COLUMN)
        .context("CSV missing 'flux_err' column")?;

    let mut spectra = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let flux = parse_semicolon_floats(record.get(flux_idx).unwrap_or(""), row_no, FLUX_COLUMN)?;
        let flux_err = parse_semicolon_floats(record.get(err_idx).unwrap_or(""), row_no, ERR_COLUMN)?;

        let header = record
            .iter()
            .enumerate()
            .filter(|(col_idx, _)| *col_idx != flux_idx && *col_idx != err_idx)
            .map(|(col_idx, value)| (headers[col_idx].clone(), guess_header_type(value)))
            .collect();

        spectra.push(make_star(stem, row_no, flux, flux_err, header)?);
    }

    Ok(SpectrumBatch::from_spectra(spectra))
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

fn guess_header_type(s: &str) -> HeaderValue {
    let s = s.trim();
    if s.is_empty() {
        return HeaderValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return HeaderValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return HeaderValue::Float(f);
    }
    if s == "true" || s == "false" {
        return HeaderValue::Bool(s == "true");
    }
    HeaderValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file of spectra.
///
/// Expected schema:
/// - `flux`:     List<Float64|Float32> or LargeList – one spectrum per row
/// - `flux_err`: same shape as `flux`
/// - any other columns are header values (strings, ints, floats, bools)
///
/// Null list items become NaN and are masked downstream.
fn load_parquet(path: &Path, stem: &str) -> Result<SpectrumBatch> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut spectra = Vec::new();
    let mut row_offset = 0usize;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let n_rows = batch.num_rows();

        let flux_idx = schema
            .index_of(FLUX_COLUMN)
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'flux' column"))?;
        let err_idx = schema
            .index_of(ERR_COLUMN)
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'flux_err' column"))?;

        let flux_col = batch.column(flux_idx);
        let err_col = batch.column(err_idx);

        let header_cols: Vec<(usize, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != flux_idx && *i != err_idx)
            .map(|(i, f)| (i, f.name().clone()))
            .collect();

        for row in 0..n_rows {
            let global_row = row_offset + row;
            let flux = extract_f64_list(flux_col, row)
                .with_context(|| format!("Row {global_row}: failed to read 'flux'"))?;
            let flux_err = extract_f64_list(err_col, row)
                .with_context(|| format!("Row {global_row}: failed to read 'flux_err'"))?;

            let header = header_cols
                .iter()
                .map(|(col_idx, name)| (name.clone(), extract_header_value(batch.column(*col_idx), row)))
                .collect();

            spectra.push(make_star(stem, global_row, flux, flux_err, header)?);
        }
        row_offset += n_rows;
    }

    Ok(SpectrumBatch::from_spectra(spectra))
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.map_or(f64::NAN, f64::from)).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Extract a single header value from an Arrow column at a given row.
fn extract_header_value(col: &Arc<dyn Array>, row: usize) -> HeaderValue {
    if col.is_null(row) {
        return HeaderValue::Null;
    }
    let any = col.as_any();
    let value = match col.data_type() {
        DataType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map(|a| HeaderValue::String(a.value(row).to_string())),
        DataType::LargeUtf8 => Some(HeaderValue::String(
            col.as_string::<i64>().value(row).to_string(),
        )),
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map(|a| HeaderValue::Integer(i64::from(a.value(row)))),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| HeaderValue::Integer(a.value(row))),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map(|a| HeaderValue::Float(f64::from(a.value(row)))),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| HeaderValue::Float(a.value(row))),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map(|a| HeaderValue::Bool(a.value(row))),
        other => Some(HeaderValue::String(format!("{other:?}"))),
    };
    value.unwrap_or(HeaderValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_json_records_with_null_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "stars.json",
            r#"[
                {"id": "a", "flux": [1.0, null, 0.9], "flux_err": [0.1, 0.1, 0.1], "CRVAL1": 4.179},
                {"flux": [1.1, 1.2, 1.3], "flux_err": [0.2, 0.2, 0.2], "CDELT1": 6e-6}
            ]"#,
        );
        let batch = load_file(&path).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.spectra[0].id, "a");
        assert!(batch.spectra[0].flux[1].is_nan());
        assert_eq!(batch.spectra[1].id, "stars:1");
        assert_eq!(
            batch.spectra[0].header_value("crval1"),
            Some(&HeaderValue::Float(4.179))
        );
        assert!(!batch.spectra[0].header.contains_key("flux"));
    }

    #[test]
    fn test_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "stars.csv",
            "id,flux,flux_err,CRVAL1,CDELT1\n\
             s1,1.0;nan;0.5,0.1;0.1;0.1,4.179,0.000006\n\
             s2,0.9;0.8;0.7,0.1;0.1;-1,4.179,0.000006\n",
        );
        let batch = load_file(&path).unwrap();
        assert_eq!(batch.ids(), vec!["s1".to_string(), "s2".to_string()]);
        assert!(batch.spectra[0].flux[1].is_nan());
        assert_eq!(batch.spectra[1].flux_err[2], -1.0);
        assert_eq!(
            batch.spectra[1].header_value("CDELT1").and_then(HeaderValue::as_f64),
            Some(0.000006)
        );
    }

    #[test]
    fn test_length_mismatch_and_bad_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "bad.json",
            r#"[{"flux": [1.0, 2.0], "flux_err": [0.1]}]"#,
        );
        assert!(load_file(&path).is_err());

        let path = write(dir.path(), "stars.fits", "SIMPLE");
        assert!(load_file(&path).is_err());
    }

    #[test]
    fn test_directory_is_read_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "b.json",
            r#"[{"id": "second", "flux": [1.0], "flux_err": [0.1]}]"#,
        );
        write(
            dir.path(),
            "a.json",
            r#"[{"id": "first", "flux": [1.0], "flux_err": [0.1]}]"#,
        );
        write(dir.path(), "notes.txt", "ignored");

        let batch = load_path(dir.path()).unwrap();
        assert_eq!(batch.ids(), vec!["first".to_string(), "second".to_string()]);
    }
}
