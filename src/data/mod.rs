/// Data layer: the spectrum container, reddening, and file loading.
///
/// Architecture:
/// ```text
///  .txt / .json / .csv / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Spectrum (wavelength + flux rows)
///   └──────────┘
///        │
///        ▼
///   ┌──────────────────────┐
///   │ Observation / Model   │  Spectrum + reddening or age grid
///   └──────────────────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ reddening │  observation → one row per reddening value
///   └───────────┘
/// ```

pub mod loader;
pub mod model;
pub mod reddening;
