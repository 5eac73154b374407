use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PsdError, Result};
use crate::spectral::TruncationMethod;

// ---------------------------------------------------------------------------
// Options consumed by the time-varying PSD selector
// ---------------------------------------------------------------------------

/// PSD options, usually read from a JSON file:
///
/// ```json
/// {
///   "precomputed_psd_file": "H1-PSDS.parquet",
///   "low_frequency_cutoff": 20.0,
///   "psd_inverse_length": 16.0,
///   "invpsd_trunc_method": "hann"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsdOptions {
    /// Parquet store of precomputed PSDs.
    pub precomputed_psd_file: PathBuf,
    /// Frequency (Hz) below which the analysis ignores the data.
    #[serde(default)]
    pub low_frequency_cutoff: Option<f64>,
    /// Length (s) of the inverse-PSD filter; absent or zero disables
    /// inverse spectrum truncation.
    #[serde(default)]
    pub psd_inverse_length: Option<f64>,
    #[serde(default)]
    pub invpsd_trunc_method: TruncationMethod,
}

/// Inverse spectrum truncation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseTruncation {
    pub length_seconds: f64,
    pub method: TruncationMethod,
}

impl InverseTruncation {
    /// Filter length in samples at `sample_rate`.
    pub fn length_samples(&self, sample_rate: f64) -> usize {
        (self.length_seconds * sample_rate) as usize
    }
}

impl PsdOptions {
    pub fn new(precomputed_psd_file: impl Into<PathBuf>) -> Self {
        PsdOptions {
            precomputed_psd_file: precomputed_psd_file.into(),
            low_frequency_cutoff: None,
            psd_inverse_length: None,
            invpsd_trunc_method: TruncationMethod::default(),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let options: PsdOptions = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(f) = self.low_frequency_cutoff {
            if !(f.is_finite() && f >= 0.0) {
                return Err(PsdError::InvalidParameter(format!(
                    "low_frequency_cutoff must be finite and non-negative, got {f}"
                )));
            }
        }
        if let Some(t) = self.psd_inverse_length {
            if !(t.is_finite() && t >= 0.0) {
                return Err(PsdError::InvalidParameter(format!(
                    "psd_inverse_length must be finite and non-negative, got {t}"
                )));
            }
        }
        Ok(())
    }

    /// Truncation settings, `None` when disabled.
    pub fn inverse_truncation(&self) -> Option<InverseTruncation> {
        self.psd_inverse_length
            .filter(|&t| t > 0.0)
            .map(|length_seconds| InverseTruncation {
                length_seconds,
                method: self.invpsd_trunc_method,
            })
    }
}
