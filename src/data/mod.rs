/// Data layer: spectrum files in, normalized tables out.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv  (file or directory)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse rows → SpectrumBatch
///   └──────────┘
///        │
///        ▼
///   ┌───────────────┐
///   │ SpectrumBatch  │  Vec<StarSpectrum>, header values
///   └───────────────┘
///        │   (assemble + continuum)
///        ▼
///   ┌──────────┐
///   │  writer   │  NormalizedDataset → .parquet + .axis.json
///   └──────────┘
/// ```
///
/// `labels` reads the reference label table that accompanies a dataset.

pub mod labels;
pub mod loader;
pub mod model;
pub mod writer;
