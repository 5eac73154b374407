use crate::data::model::TimeSegment;

/// Errors returned by the PSD readers, the store and the selector.
#[derive(thiserror::Error, Debug)]
pub enum PsdError {
    // -- input validation --
    #[error("Invalid data in {source_name}: {reason}")]
    InvalidData { source_name: String, reason: String },
    #[error(
        "Lowest frequency in input data ({lowest_frequency} Hz) is higher than \
         requested low-frequency cutoff {low_frequency_cutoff} Hz"
    )]
    CutoffBelowData {
        lowest_frequency: f64,
        low_frequency_cutoff: f64,
    },
    #[error(
        "No ifo string given and input XML file contains not exactly one PSD \
         (found: {available:?}). Specify which PSD you want to use."
    )]
    AmbiguousInstrument { available: Vec<String> },
    #[error("No PSD for instrument '{instrument}' (found: {available:?})")]
    UnknownInstrument {
        instrument: String,
        available: Vec<String>,
    },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // -- time ranges --
    #[error(
        "PSD file doesn't contain required times {segment}. \
         PSDs are within range ({begin}, {end})"
    )]
    SegmentOutOfRange {
        segment: TimeSegment,
        begin: f64,
        end: f64,
    },
    #[error("No PSDs found intersecting segment {0}")]
    NoIntersectingPsd(TimeSegment),

    // -- backing store --
    #[error("Malformed PSD store: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("CSV error")]
    Csv(#[from] csv::Error),
    #[error("Parquet error")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow error")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("XML error")]
    Xml(#[from] roxmltree::Error),
    #[error("JSON error")]
    Json(#[from] serde_json::Error),
    #[error("FFT error: {0}")]
    Fft(#[from] realfft::FftError),
}

impl PsdError {
    /// True for errors raised because a requested time segment is not
    /// covered by the store.
    pub fn is_range_error(&self) -> bool {
        matches!(
            self,
            PsdError::SegmentOutOfRange { .. } | PsdError::NoIntersectingPsd(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PsdError>;
