//! PSD ingestion and time-varying PSD selection for gravitational-wave
//! strain analysis.
//!
//! ```text
//!  ASCII / XML file ──► loader ──► resample ──► FrequencySeries
//!
//!  PsdStore ──► PrecomputedTimeVaryingPsd ──► get_psd ──► SpectralOps::truncate
//!                                                                  │
//!                                                                  ▼
//!                                                           FrequencySeries
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod selector;
pub mod spectral;
pub mod store;

pub use config::{InverseTruncation, PsdOptions};
pub use data::loader::{from_txt, from_xml};
pub use data::model::{FrequencySeries, RawSpectrumSample, TimeSegment};
pub use data::resample::from_arrays;
pub use error::PsdError;
pub use selector::PrecomputedTimeVaryingPsd;
pub use spectral::{FftSpectralOps, SpectralOps, TruncationMethod};
pub use store::{MemoryPsdStore, ParquetPsdStore, PsdStore, StoreEntry};
