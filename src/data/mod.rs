/// Data layer: spectrum types, file readers and log-log regridding.
///
/// Architecture:
/// ```text
///  .txt / .xml(.gz)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → RawSpectrumSample
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ resample  │  log-log interpolation → FrequencySeries
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod resample;
