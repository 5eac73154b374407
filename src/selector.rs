use crate::config::{InverseTruncation, PsdOptions};
use crate::data::model::{FrequencySeries, TimeSegment};
use crate::error::{PsdError, Result};
use crate::spectral::{FftSpectralOps, SpectralOps, TruncationMethod};
use crate::store::{ParquetPsdStore, PsdStore};

// ---------------------------------------------------------------------------
// Time-varying PSD selector
// ---------------------------------------------------------------------------

/// Picks, for an analysis segment, the precomputed PSD whose validity
/// interval overlaps it most, and conditions it for matched filtering.
pub struct PrecomputedTimeVaryingPsd<
    S: PsdStore = ParquetPsdStore,
    O: SpectralOps = FftSpectralOps,
> {
    /// Backing PSD store.
    store: S,

    /// Truncation and regridding collaborator.
    ops: O,

    /// Earliest start time in the store.
    begin: f64,

    /// Latest end time in the store.
    end: f64,

    /// Number of bins of every returned PSD.
    length: usize,

    /// Bin spacing the analysis works at (Hz).
    delta_f: f64,

    /// Sample rate of the strain data (Hz).
    sample_rate: f64,

    /// Analysis low-frequency cutoff (Hz).
    low_frequency_cutoff: Option<f64>,

    /// Inverse spectrum truncation, disabled when `None`.
    inverse_truncation: Option<InverseTruncation>,
}

impl PrecomputedTimeVaryingPsd<ParquetPsdStore, FftSpectralOps> {
    /// Open `options.precomputed_psd_file` and configure cutoff and
    /// truncation from `options`.
    pub fn from_options(
        options: &PsdOptions,
        length: usize,
        delta_f: f64,
        sample_rate: f64,
    ) -> Result<Self> {
        options.validate()?;
        let store = ParquetPsdStore::open(&options.precomputed_psd_file)?;
        let mut selector = Self::new(store, length, delta_f, sample_rate)?;
        selector.low_frequency_cutoff = options.low_frequency_cutoff;
        selector.inverse_truncation = options.inverse_truncation();
        Ok(selector)
    }
}

impl<S: PsdStore> PrecomputedTimeVaryingPsd<S, FftSpectralOps> {
    pub fn new(store: S, length: usize, delta_f: f64, sample_rate: f64) -> Result<Self> {
        if store.is_empty() {
            return Err(PsdError::Store(format!("no PSDs stored for {}", store.detector())));
        }
        if store.start_times().len() != store.end_times().len() {
            return Err(PsdError::Store(format!(
                "{} start times but {} end times",
                store.start_times().len(),
                store.end_times().len()
            )));
        }
        let begin = store.start_times().iter().copied().fold(f64::INFINITY, f64::min);
        let end = store.end_times().iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Ok(PrecomputedTimeVaryingPsd {
            store,
            ops: FftSpectralOps,
            begin,
            end,
            length,
            delta_f,
            sample_rate,
            low_frequency_cutoff: None,
            inverse_truncation: None,
        })
    }
}

impl<S: PsdStore, O: SpectralOps> PrecomputedTimeVaryingPsd<S, O> {
    pub fn low_frequency_cutoff(self, low_frequency_cutoff: f64) -> Self {
        Self {
            low_frequency_cutoff: Some(low_frequency_cutoff),
            ..self
        }
    }

    pub fn inverse_truncation(self, length_seconds: f64, method: TruncationMethod) -> Self {
        Self {
            inverse_truncation: Some(InverseTruncation {
                length_seconds,
                method,
            }),
            ..self
        }
    }

    /// Swap the spectral collaborator.
    pub fn with_spectral_ops<P: SpectralOps>(self, ops: P) -> PrecomputedTimeVaryingPsd<S, P> {
        PrecomputedTimeVaryingPsd {
            store: self.store,
            ops,
            begin: self.begin,
            end: self.end,
            length: self.length,
            delta_f: self.delta_f,
            sample_rate: self.sample_rate,
            low_frequency_cutoff: self.low_frequency_cutoff,
            inverse_truncation: self.inverse_truncation,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn detector(&self) -> &str {
        self.store.detector()
    }

    /// Time span covered by the store, `[min(start), max(end)]`.
    pub fn span(&self) -> TimeSegment {
        TimeSegment::new(self.begin, self.end)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn delta_f(&self) -> f64 {
        self.delta_f
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Find the two PSDs whose start times are closest to the segment and
    /// return the one overlapping the segment most, conditioned by
    /// [`Self::get_psd`] and inverse-spectrum truncated when configured with
    /// a positive length.
    pub fn associate_psd_to_inspiral_segment(
        &self,
        segment: TimeSegment,
        delta_f: Option<f64>,
    ) -> Result<FrequencySeries> {
        let index = self.best_index(&segment)?;
        let psd = self.get_psd(index, delta_f)?;

        match self.inverse_truncation {
            Some(trunc) if trunc.length_seconds > 0.0 => self.ops.truncate(
                &psd,
                trunc.length_samples(self.sample_rate),
                self.low_frequency_cutoff,
                trunc.method,
            ),
            _ => Ok(psd),
        }
    }

    /// Index of the stored PSD to use for `segment`.
    ///
    /// Only the two entries nearest by start time are considered. The
    /// nearest wins if it intersects the segment; the runner-up replaces it
    /// only with a strictly larger overlap.
    pub fn best_index(&self, segment: &TimeSegment) -> Result<usize> {
        if segment.start > self.end || segment.end < self.begin {
            return Err(PsdError::SegmentOutOfRange {
                segment: *segment,
                begin: self.begin,
                end: self.end,
            });
        }

        let mut best = None;
        let mut best_overlap = 0.0;
        for (rank, index) in self.nearest_entries(segment.start).into_iter().enumerate() {
            let entry = self.store.segment(index);
            if !segment.intersects(&entry) {
                continue;
            }
            let overlap = segment.overlap(&entry);
            if rank == 0 || best_overlap < overlap {
                best = Some(index);
                best_overlap = overlap;
            }
        }

        let index = best.ok_or(PsdError::NoIntersectingPsd(*segment))?;
        log::debug!(
            "{}: segment {segment} -> PSD {index} {} (overlap {best_overlap} s)",
            self.detector(),
            self.store.segment(index)
        );
        Ok(index)
    }

    /// Indices of the (up to) two entries whose start time is closest to
    /// `time`, nearest first. Equal distances keep store order.
    pub fn nearest_entries(&self, time: f64) -> Vec<usize> {
        let starts = self.store.start_times();
        let mut order: Vec<usize> = (0..starts.len()).collect();
        order.sort_by(|&a, &b| (starts[a] - time).abs().total_cmp(&(starts[b] - time).abs()));
        order.truncate(2);
        order
    }

    /// Load stored PSD `index` and bring it to the analysis grid.
    ///
    /// Regrids to `delta_f` when given and different, pads with `+inf` or
    /// truncates to the configured length, and marks bins below the store's
    /// own low-frequency cutoff as `+inf` when the analysis cutoff is lower.
    /// Nothing is cached: every call reads the store again.
    pub fn get_psd(&self, index: usize, delta_f: Option<f64>) -> Result<FrequencySeries> {
        let mut psd = self.store.load_psd(index)?;

        if let Some(delta_f) = delta_f {
            if psd.delta_f() != delta_f {
                psd = self.ops.resample(&psd, delta_f)?;
            }
        }

        if self.length != psd.len() {
            psd = psd.resized(self.length, f64::INFINITY);
        }

        let file_f_low = self.store.low_frequency_cutoff();
        if let Some(f_low) = self.low_frequency_cutoff {
            if f_low < file_f_low {
                // avoid using the PSD below the cutoff recorded in the store
                psd.mask_below(file_f_low, f64::INFINITY);
            }
        }

        Ok(psd)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::store::{MemoryPsdStore, StoreEntry};

    fn entry(start: f64, end: f64, level: f64) -> StoreEntry {
        StoreEntry {
            segment: TimeSegment::new(start, end),
            psd: FrequencySeries::filled(8, level, 1.0).unwrap(),
        }
    }

    fn selector(entries: Vec<StoreEntry>) -> PrecomputedTimeVaryingPsd<MemoryPsdStore> {
        let store = MemoryPsdStore::new("H1", 4.0, entries);
        PrecomputedTimeVaryingPsd::new(store, 8, 1.0, 16.0).unwrap()
    }

    /// Records truncation calls and returns the input unchanged.
    #[derive(Default)]
    struct RecordingOps {
        truncations: RefCell<Vec<(usize, Option<f64>, TruncationMethod)>>,
    }

    impl SpectralOps for &RecordingOps {
        fn truncate(
            &self,
            psd: &FrequencySeries,
            max_filter_len: usize,
            low_frequency_cutoff: Option<f64>,
            method: TruncationMethod,
        ) -> Result<FrequencySeries> {
            self.truncations
                .borrow_mut()
                .push((max_filter_len, low_frequency_cutoff, method));
            Ok(psd.clone())
        }

        fn resample(&self, psd: &FrequencySeries, delta_f: f64) -> Result<FrequencySeries> {
            FftSpectralOps.resample(psd, delta_f)
        }
    }

    #[test]
    fn equal_overlap_keeps_the_first_candidate() {
        let sel = selector(vec![entry(0.0, 100.0, 1.0), entry(100.0, 200.0, 2.0)]);
        let seg = TimeSegment::new(50.0, 150.0);
        assert_eq!(sel.nearest_entries(seg.start), vec![0, 1]);
        assert_eq!(sel.best_index(&seg).unwrap(), 0);
    }

    #[test]
    fn larger_overlap_wins() {
        let sel = selector(vec![
            entry(0.0, 100.0, 1.0),
            entry(100.0, 200.0, 2.0),
            entry(200.0, 300.0, 3.0),
        ]);
        // nearest start is 100 (distance 10) which overlaps 90 s
        assert_eq!(sel.best_index(&TimeSegment::new(90.0, 190.0)).unwrap(), 1);
        // nearest start is 100 (distance 45) overlapping 5 s, runner-up 0 overlaps 40 s
        assert_eq!(sel.best_index(&TimeSegment::new(60.0, 105.0)).unwrap(), 0);
        let psd = sel
            .associate_psd_to_inspiral_segment(TimeSegment::new(250.0, 260.0), None)
            .unwrap();
        assert_eq!(psd[7], 3.0);
    }

    #[test]
    fn only_the_two_nearest_starts_are_considered() {
        // long entry 0 covers everything but its start is far away
        let sel = selector(vec![
            entry(0.0, 1000.0, 1.0),
            entry(500.0, 510.0, 2.0),
            entry(520.0, 522.0, 3.0),
        ]);
        assert_eq!(sel.nearest_entries(505.0), vec![1, 2]);
        assert_eq!(sel.best_index(&TimeSegment::new(505.0, 600.0)).unwrap(), 1);
    }

    #[test]
    fn segments_outside_the_store_are_range_errors() {
        let sel = selector(vec![entry(100.0, 200.0, 1.0), entry(200.0, 300.0, 2.0)]);
        for seg in [TimeSegment::new(0.0, 50.0), TimeSegment::new(350.0, 400.0)] {
            let err = sel.best_index(&seg).unwrap_err();
            assert!(matches!(
                err,
                PsdError::SegmentOutOfRange { begin, end, .. } if begin == 100.0 && end == 300.0
            ));
            assert!(err.is_range_error());
        }
    }

    #[test]
    fn gap_between_entries_is_an_error() {
        let sel = selector(vec![
            entry(0.0, 100.0, 1.0),
            entry(200.0, 300.0, 2.0),
            entry(400.0, 500.0, 3.0),
        ]);
        let err = sel.best_index(&TimeSegment::new(120.0, 180.0)).unwrap_err();
        assert!(matches!(err, PsdError::NoIntersectingPsd(_)));
    }

    #[test]
    fn single_entry_store() {
        let sel = selector(vec![entry(0.0, 100.0, 1.0)]);
        assert_eq!(sel.nearest_entries(30.0), vec![0]);
        assert_eq!(sel.best_index(&TimeSegment::new(30.0, 40.0)).unwrap(), 0);
    }

    #[test]
    fn empty_store_is_rejected() {
        let store = MemoryPsdStore::new("H1", 4.0, Vec::new());
        assert!(matches!(
            PrecomputedTimeVaryingPsd::new(store, 8, 1.0, 16.0),
            Err(PsdError::Store(_))
        ));
    }

    #[test]
    fn longer_target_is_padded_with_infinity() {
        let store = MemoryPsdStore::new("H1", 0.0, vec![entry(0.0, 100.0, 1.0)]);
        let sel = PrecomputedTimeVaryingPsd::new(store, 12, 1.0, 16.0).unwrap();
        let psd = sel.get_psd(0, None).unwrap();
        assert_eq!(psd.len(), 12);
        assert!(psd.data()[..8].iter().all(|&v| v == 1.0));
        assert!(psd.data()[8..].iter().all(|&v| v == f64::INFINITY));
    }

    #[test]
    fn shorter_target_is_truncated() {
        let store = MemoryPsdStore::new("H1", 0.0, vec![entry(0.0, 100.0, 1.0)]);
        let sel = PrecomputedTimeVaryingPsd::new(store, 5, 1.0, 16.0).unwrap();
        assert_eq!(sel.get_psd(0, None).unwrap().data(), &[1.0; 5]);
    }

    #[test]
    fn bins_below_store_cutoff_are_masked() {
        let sel = selector(vec![entry(0.0, 100.0, 1.0)]).low_frequency_cutoff(2.0);
        let psd = sel.get_psd(0, None).unwrap();
        assert!(psd.data()[..4].iter().all(|&v| v == f64::INFINITY));
        assert!(psd.data()[4..].iter().all(|&v| v == 1.0));

        // an analysis cutoff at or above the store's leaves the PSD alone
        let sel = selector(vec![entry(0.0, 100.0, 1.0)]).low_frequency_cutoff(6.0);
        assert!(sel.get_psd(0, None).unwrap().data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn every_call_reloads() {
        let sel = selector(vec![entry(0.0, 100.0, 1.0)]);
        sel.get_psd(0, None).unwrap();
        sel.get_psd(0, None).unwrap();
        assert_eq!(sel.store().loads(), 2);
    }

    #[test]
    fn override_delta_f_regrids() {
        let sel = selector(vec![entry(0.0, 100.0, 1.0)]);
        let psd = sel.get_psd(0, Some(0.5)).unwrap();
        assert_eq!(psd.delta_f(), 0.5);
        // 15 bins at 0.5 Hz, cut back to the configured 8
        assert_eq!(psd.len(), 8);
        assert!(psd.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn truncation_uses_configured_length_in_samples() {
        let ops = RecordingOps::default();
        let sel = selector(vec![entry(0.0, 100.0, 1.0)])
            .low_frequency_cutoff(5.0)
            .inverse_truncation(0.25, TruncationMethod::Hann)
            .with_spectral_ops(&ops);
        sel.associate_psd_to_inspiral_segment(TimeSegment::new(10.0, 20.0), None)
            .unwrap();
        assert_eq!(*ops.truncations.borrow(), vec![(4, Some(5.0), TruncationMethod::Hann)]);
    }

    #[test]
    fn truncation_is_skipped_when_disabled() {
        let ops = RecordingOps::default();
        let sel = selector(vec![entry(0.0, 100.0, 1.0)]).with_spectral_ops(&ops);
        sel.associate_psd_to_inspiral_segment(TimeSegment::new(10.0, 20.0), None)
            .unwrap();
        assert!(ops.truncations.borrow().is_empty());
    }

    #[test]
    fn zero_inverse_length_disables_truncation() {
        let ops = RecordingOps::default();
        let sel = selector(vec![entry(0.0, 100.0, 1.0)])
            .inverse_truncation(0.0, TruncationMethod::Rectangular)
            .with_spectral_ops(&ops);
        let psd = sel
            .associate_psd_to_inspiral_segment(TimeSegment::new(10.0, 20.0), None)
            .unwrap();
        assert!(ops.truncations.borrow().is_empty());
        assert!(psd.data().iter().all(|&v| v == 1.0));

        // same with the FFT collaborator: the PSD must come back untouched
        let sel =
            selector(vec![entry(0.0, 100.0, 1.0)]).inverse_truncation(0.0, TruncationMethod::Hann);
        let psd = sel
            .associate_psd_to_inspiral_segment(TimeSegment::new(10.0, 20.0), None)
            .unwrap();
        assert!(psd.data().iter().all(|&v| v == 1.0));
    }
}
