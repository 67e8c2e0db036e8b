use std::path::Path;

use anyhow::{Context, Result, bail};
use log::info;

/// Reference labels (Teff, log g, [Fe/H], ...) keyed by star id.
///
/// Rows are kept sorted by id.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    pub label_names: Vec<String>,
    pub ids: Vec<String>,
    /// One row per id, one column per label.
    pub values: Vec<Vec<f64>>,
}

impl LabelTable {
    /// Read a label CSV.
    ///
    /// The header row may start with `#`; its first column names the ids
    /// and the remaining columns are label names. Every label cell must be
    /// a float (`nan` allowed).
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("opening label file {}", path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .context("reading label header")?
            .iter()
            .map(|h| h.trim_start_matches('#').trim().to_string())
            .collect();
        if headers.len() < 2 {
            bail!("Label file needs an id column and at least one label column");
        }
        let label_names = headers[1..].to_vec();

        let mut rows: Vec<(String, Vec<f64>)> = Vec::new();
        for (row_no, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("label row {row_no}"))?;
            let id = record
                .get(0)
                .with_context(|| format!("label row {row_no}: missing id"))?
                .to_string();
            let values = record
                .iter()
                .skip(1)
                .enumerate()
                .map(|(j, cell)| {
                    cell.parse::<f64>().with_context(|| {
                        format!("label row {row_no}, '{}': '{cell}' is not a number", label_names[j])
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            if values.len() != label_names.len() {
                bail!(
                    "label row {row_no}: {} values for {} labels",
                    values.len(),
                    label_names.len()
                );
            }
            rows.push((id, values));
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let (ids, values): (Vec<String>, Vec<Vec<f64>>) = rows.into_iter().unzip();
        info!("Loaded {} labels for {} stars: {label_names:?}", label_names.len(), ids.len());
        Ok(LabelTable {
            label_names,
            ids,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Labels of one star.
    pub fn get(&self, id: &str) -> Option<&[f64]> {
        self.ids
            .binary_search_by(|probe| probe.as_str().cmp(id))
            .ok()
            .map(|i| self.values[i].as_slice())
    }

    /// Ids from `ids` that have no labels, in the given order.
    pub fn missing<'a>(&self, ids: &'a [String]) -> Vec<&'a str> {
        ids.iter()
            .filter(|id| self.get(id).is_none())
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(contents: &str) -> Result<LabelTable> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, contents).unwrap();
        LabelTable::load(&path)
    }

    #[test]
    fn test_loads_and_sorts_by_id() {
        let labels = table("#id, teff, logg, feh\nstar_b, 4800, 2.5, -0.1\nstar_a, 5100, 3.1, 0.2\n")
            .unwrap();
        assert_eq!(labels.label_names, vec!["teff", "logg", "feh"]);
        assert_eq!(labels.ids, vec!["star_a", "star_b"]);
        assert_eq!(labels.get("star_b"), Some(&[4800.0, 2.5, -0.1][..]));
        assert_eq!(labels.get("star_c"), None);

        let loaded = vec!["star_a".to_string(), "star_z".to_string()];
        assert_eq!(labels.missing(&loaded), vec!["star_z"]);
    }

    #[test]
    fn test_rejects_non_numeric_labels() {
        assert!(table("id,teff\ns1,hot\n").is_err());
        assert!(table("id\ns1\n").is_err());
    }
}
