use std::fmt;
use std::ops::{Index, IndexMut};

use crate::error::{PsdError, Result};

// ---------------------------------------------------------------------------
// FrequencySeries – uniformly gridded spectrum
// ---------------------------------------------------------------------------

/// A one-sided spectrum sampled on a uniform frequency grid.
///
/// Bin `k` sits at frequency `k * delta_f`. The number of bins and the
/// spacing are fixed once the series is built; only the bin values can be
/// changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencySeries {
    data: Vec<f64>,
    delta_f: f64,
}

impl FrequencySeries {
    /// Wrap `data` with bin spacing `delta_f` (Hz).
    pub fn new(data: Vec<f64>, delta_f: f64) -> Result<Self> {
        if !(delta_f.is_finite() && delta_f > 0.0) {
            return Err(PsdError::InvalidParameter(format!(
                "delta_f must be finite and positive, got {delta_f}"
            )));
        }
        Ok(FrequencySeries { data, delta_f })
    }

    /// A series of `len` zero bins.
    pub fn zeros(len: usize, delta_f: f64) -> Result<Self> {
        Self::filled(len, 0.0, delta_f)
    }

    /// A series of `len` bins all set to `value`.
    pub fn filled(len: usize, value: f64, delta_f: f64) -> Result<Self> {
        Self::new(vec![value; len], delta_f)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bin spacing in Hz.
    pub fn delta_f(&self) -> f64 {
        self.delta_f
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable view on the bin values. The length cannot change through it.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Frequency of bin `k`.
    pub fn frequency(&self, k: usize) -> f64 {
        k as f64 * self.delta_f
    }

    /// Frequencies of every bin, in order.
    pub fn sample_frequencies(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(move |k| self.frequency(k))
    }

    /// Return a series of exactly `length` bins with the same spacing:
    /// the first `length` bins when shrinking, the original bins followed
    /// by `fill` when growing.
    pub fn resized(self, length: usize, fill: f64) -> Self {
        let mut data = self.data;
        data.resize(length, fill);
        FrequencySeries {
            data,
            delta_f: self.delta_f,
        }
    }

    /// Set every bin below `frequency` (bins `0..floor(frequency / delta_f)`)
    /// to `value`.
    pub fn mask_below(&mut self, frequency: f64, value: f64) {
        let k = ((frequency / self.delta_f) as usize).min(self.len());
        self.data[..k].fill(value);
    }
}

impl Index<usize> for FrequencySeries {
    type Output = f64;

    fn index(&self, k: usize) -> &f64 {
        &self.data[k]
    }
}

impl IndexMut<usize> for FrequencySeries {
    fn index_mut(&mut self, k: usize) -> &mut f64 {
        &mut self.data[k]
    }
}

// ---------------------------------------------------------------------------
// RawSpectrumSample – frequency / value pairs straight from a file
// ---------------------------------------------------------------------------

/// Parallel frequency and value sequences as read from an input file,
/// before any regridding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSpectrumSample {
    frequencies: Vec<f64>,
    values: Vec<f64>,
}

impl RawSpectrumSample {
    /// Pair `frequencies` (Hz, strictly increasing) with `values`.
    pub fn new(frequencies: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if frequencies.is_empty() {
            return Err(PsdError::InvalidParameter(
                "spectrum sample has no points".into(),
            ));
        }
        if frequencies.len() != values.len() {
            return Err(PsdError::InvalidParameter(format!(
                "{} frequencies but {} values",
                frequencies.len(),
                values.len()
            )));
        }
        if let Some(k) = frequencies.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(PsdError::InvalidParameter(format!(
                "frequencies must be strictly increasing (index {}: {} then {})",
                k,
                frequencies[k],
                frequencies[k + 1]
            )));
        }
        Ok(RawSpectrumSample {
            frequencies,
            values,
        })
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Reject negative, infinite or NaN entries on either axis.
    pub fn validate_finite_non_negative(&self, source_name: &str) -> Result<()> {
        let bad = self
            .frequencies
            .iter()
            .chain(self.values.iter())
            .find(|v| !(v.is_finite() && **v >= 0.0));
        match bad {
            Some(v) => Err(PsdError::InvalidData {
                source_name: source_name.to_string(),
                reason: format!("value {v} is negative or not finite"),
            }),
            None => Ok(()),
        }
    }

    /// Square the values, turning an amplitude spectral density into a
    /// power spectral density.
    pub fn into_power(self) -> Self {
        RawSpectrumSample {
            values: self.values.into_iter().map(|v| v * v).collect(),
            frequencies: self.frequencies,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeSegment – GPS interval
// ---------------------------------------------------------------------------

/// A GPS time interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSegment {
    pub start: f64,
    pub end: f64,
}

impl TimeSegment {
    /// Build a segment; endpoints given in reverse order are swapped.
    pub fn new(start: f64, end: f64) -> Self {
        if start > end {
            TimeSegment {
                start: end,
                end: start,
            }
        } else {
            TimeSegment { start, end }
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether the two segments share more than a boundary point.
    pub fn intersects(&self, other: &TimeSegment) -> bool {
        self.end > other.start && self.start < other.end
    }

    pub fn intersection(&self, other: &TimeSegment) -> Option<TimeSegment> {
        if !self.intersects(other) {
            return None;
        }
        Some(TimeSegment {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    /// Duration of the intersection, zero when the segments are disjoint.
    pub fn overlap(&self, other: &TimeSegment) -> f64 {
        self.intersection(other)
            .map(|seg| seg.duration())
            .unwrap_or(0.0)
    }
}

impl fmt::Display for TimeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_spacing() {
        assert!(FrequencySeries::zeros(4, 0.0).is_err());
        assert!(FrequencySeries::zeros(4, f64::NAN).is_err());
        assert!(FrequencySeries::zeros(4, -1.0).is_err());
    }

    #[test]
    fn resize_pads_and_truncates() {
        let fs = FrequencySeries::new(vec![1.0, 2.0, 3.0], 0.5).unwrap();
        let longer = fs.clone().resized(5, f64::INFINITY);
        assert_eq!(longer.data(), &[1.0, 2.0, 3.0, f64::INFINITY, f64::INFINITY]);
        assert_eq!(longer.delta_f(), 0.5);
        let shorter = fs.resized(2, f64::INFINITY);
        assert_eq!(shorter.data(), &[1.0, 2.0]);
    }

    #[test]
    fn mask_below_is_clamped() {
        let mut fs = FrequencySeries::filled(4, 1.0, 2.0).unwrap();
        fs.mask_below(5.0, f64::INFINITY);
        assert_eq!(fs.data(), &[f64::INFINITY, f64::INFINITY, 1.0, 1.0]);
        fs.mask_below(100.0, 0.0);
        assert!(fs.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn sample_frequencies_follow_bins() {
        let fs = FrequencySeries::zeros(3, 0.25).unwrap();
        let f: Vec<f64> = fs.sample_frequencies().collect();
        assert_eq!(f, vec![0.0, 0.25, 0.5]);
    }

    #[test]
    fn raw_sample_requires_increasing_frequencies() {
        assert!(RawSpectrumSample::new(vec![1.0, 1.0], vec![1.0, 2.0]).is_err());
        assert!(RawSpectrumSample::new(vec![1.0, 2.0], vec![1.0]).is_err());
        assert!(RawSpectrumSample::new(vec![], vec![]).is_err());
        assert!(RawSpectrumSample::new(vec![1.0, 2.0], vec![1.0, 2.0]).is_ok());
    }

    #[test]
    fn raw_sample_validation_and_power() {
        let sample = RawSpectrumSample::new(vec![1.0, 2.0], vec![3.0, -1.0]).unwrap();
        assert!(matches!(
            sample.validate_finite_non_negative("mem"),
            Err(PsdError::InvalidData { .. })
        ));
        let sample = RawSpectrumSample::new(vec![1.0, 2.0], vec![3.0, 4.0]).unwrap();
        assert!(sample.validate_finite_non_negative("mem").is_ok());
        assert_eq!(sample.into_power().values(), &[9.0, 16.0]);
    }

    #[test]
    fn segment_overlap() {
        let a = TimeSegment::new(0.0, 100.0);
        let b = TimeSegment::new(100.0, 200.0);
        let q = TimeSegment::new(150.0, 50.0);
        assert_eq!(q, TimeSegment::new(50.0, 150.0));
        assert!(!a.intersects(&b));
        assert!(q.intersects(&a) && q.intersects(&b));
        assert_eq!(q.overlap(&a), 50.0);
        assert_eq!(q.overlap(&b), 50.0);
        assert_eq!(a.overlap(&b), 0.0);
        assert_eq!(a.intersection(&b), None);
    }
}
