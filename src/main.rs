use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::{info, warn};

use cannon_norm::data::labels::LabelTable;
use cannon_norm::data::{loader, writer};
use cannon_norm::{LogProgress, NormalizationConfig, SpectrumAssembler};

const USAGE: &str =
    "usage: cannon-norm <spectra file or dir> --config <config.json> [--labels <labels.csv>] [--out <prefix>]";

struct Args {
    spectra: PathBuf,
    config: PathBuf,
    labels: Option<PathBuf>,
    out: PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut spectra = None;
    let mut config = None;
    let mut labels = None;
    let mut out = PathBuf::from("normalized");

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .map(PathBuf::from)
                .with_context(|| format!("{flag} needs a value\n{USAGE}"))
        };
        match arg.as_str() {
            "--config" => config = Some(value("--config")?),
            "--labels" => labels = Some(value("--labels")?),
            "--out" => out = value("--out")?,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => bail!("unknown option {flag}\n{USAGE}"),
            path if spectra.is_none() => spectra = Some(PathBuf::from(path)),
            extra => bail!("unexpected argument {extra}\n{USAGE}"),
        }
    }

    Ok(Args {
        spectra: spectra.with_context(|| format!("missing spectra path\n{USAGE}"))?,
        config: config.with_context(|| format!("missing --config\n{USAGE}"))?,
        labels,
        out,
    })
}

/// `<prefix>.parquet` and `<prefix>.axis.json`, keeping any dots already in the prefix.
fn output_paths(prefix: &Path) -> (PathBuf, PathBuf) {
    let with_suffix = |suffix: &str| {
        let mut name = OsString::from(prefix.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    };
    (with_suffix(".parquet"), with_suffix(".axis.json"))
}

fn main() -> Result<()> {
    env_logger::init();

    let args = parse_args()?;
    let config = NormalizationConfig::load(&args.config)?;
    let batch = loader::load_path(&args.spectra)?;

    if let Some(path) = &args.labels {
        let labels = LabelTable::load(path)?;
        let ids = batch.ids();
        let missing = labels.missing(&ids);
        if !missing.is_empty() {
            warn!("{} of {} stars have no reference labels", missing.len(), ids.len());
        }
    }

    let progress = LogProgress;
    let dataset = SpectrumAssembler::new(config, &progress)
        .assemble(&batch)
        .context("continuum normalization failed")?;

    for failure in &dataset.failures {
        warn!("{} ({}): {}", failure.id, failure.index, failure.error);
    }

    let (parquet_path, axis_path) = output_paths(&args.out);
    writer::write_parquet(&dataset, &parquet_path)?;
    writer::write_axis_json(&dataset, &axis_path)?;

    info!(
        "{} stars, {} pixels, {} continuum pixels → {}",
        dataset.n_stars(),
        dataset.n_pixels(),
        dataset.n_continuum(),
        parquet_path.display()
    );
    Ok(())
}
