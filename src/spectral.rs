use realfft::num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

use crate::data::model::FrequencySeries;
use crate::data::resample::interp;
use crate::error::{PsdError, Result};

// ---------------------------------------------------------------------------
// Collaborator interface
// ---------------------------------------------------------------------------

/// Taper applied to the retained part of the inverse-PSD filter during
/// inverse spectrum truncation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationMethod {
    /// Hard cut, no taper.
    #[default]
    Rectangular,
    /// Taper the retained edges with a Hann window.
    Hann,
}

/// Spectral operations the selector delegates to.
pub trait SpectralOps {
    /// Limit the time-domain length of the inverse-PSD filter to
    /// `max_filter_len` samples.
    fn truncate(
        &self,
        psd: &FrequencySeries,
        max_filter_len: usize,
        low_frequency_cutoff: Option<f64>,
        method: TruncationMethod,
    ) -> Result<FrequencySeries>;

    /// Regrid `psd` onto bins spaced by `delta_f`.
    fn resample(&self, psd: &FrequencySeries, delta_f: f64) -> Result<FrequencySeries>;
}

// ---------------------------------------------------------------------------
// FFT-based implementation
// ---------------------------------------------------------------------------

/// Default [`SpectralOps`] built on real-to-complex FFTs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FftSpectralOps;

impl SpectralOps for FftSpectralOps {
    fn truncate(
        &self,
        psd: &FrequencySeries,
        max_filter_len: usize,
        low_frequency_cutoff: Option<f64>,
        method: TruncationMethod,
    ) -> Result<FrequencySeries> {
        inverse_spectrum_truncation(psd, max_filter_len, low_frequency_cutoff, method)
    }

    fn resample(&self, psd: &FrequencySeries, delta_f: f64) -> Result<FrequencySeries> {
        interpolate(psd, delta_f)
    }
}

/// Modify a PSD so that its inverse has a time-domain support of at most
/// `max_filter_len` samples.
///
/// Bins below `low_frequency_cutoff` (or the DC bin when no cutoff is
/// given) and the Nyquist bin are excluded from the inverse ASD; bins left
/// without support come back as `+inf`.
pub fn inverse_spectrum_truncation(
    psd: &FrequencySeries,
    max_filter_len: usize,
    low_frequency_cutoff: Option<f64>,
    method: TruncationMethod,
) -> Result<FrequencySeries> {
    if let Some(f) = low_frequency_cutoff {
        if !(f >= 0.0) {
            return Err(PsdError::InvalidParameter(format!(
                "low-frequency cutoff must be non-negative, got {f}"
            )));
        }
    }
    if psd.len() < 2 {
        return Err(PsdError::InvalidParameter(format!(
            "cannot truncate a PSD of {} bins",
            psd.len()
        )));
    }

    let n = (psd.len() - 1) * 2;
    let kmin = match low_frequency_cutoff {
        Some(f) if f > 0.0 => (f / psd.delta_f()) as usize,
        _ => 1,
    };

    let trunc_start = max_filter_len / 2;
    let trunc_end = n.checked_sub(max_filter_len / 2).ok_or_else(|| {
        PsdError::InvalidParameter(format!(
            "filter length {max_filter_len} is longer than the {n}-sample inverse PSD"
        ))
    })?;
    if trunc_end < trunc_start {
        return Err(PsdError::InvalidParameter(format!(
            "filter length {max_filter_len} is longer than the {n}-sample inverse PSD"
        )));
    }

    let mut planner = RealFftPlanner::<f64>::new();
    let c2r = planner.plan_fft_inverse(n);
    let r2c = planner.plan_fft_forward(n);

    let mut spectrum = c2r.make_input_vec();
    for k in kmin..n / 2 {
        spectrum[k] = Complex::new((1.0 / psd[k]).sqrt(), 0.0);
    }
    let mut q = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut q)?;
    let norm = 1.0 / n as f64;
    q.iter_mut().for_each(|v| *v *= norm);

    if method == TruncationMethod::Hann {
        let window = hann_window(max_filter_len);
        let tail = &window[max_filter_len - trunc_start..];
        q[..trunc_start]
            .iter_mut()
            .zip(tail)
            .for_each(|(v, w)| *v *= w);
        let head = &window[..max_filter_len / 2];
        q[trunc_end..]
            .iter_mut()
            .zip(head)
            .for_each(|(v, w)| *v *= w);
    }
    q[trunc_start..trunc_end].fill(0.0);

    let mut out = r2c.make_output_vec();
    r2c.process(&mut q, &mut out)?;

    let data = out.iter().map(|c| 1.0 / c.norm_sqr()).collect();
    FrequencySeries::new(data, psd.delta_f())
}

/// Linearly interpolate `series` onto bins spaced by `delta_f`, covering the
/// same frequency range.
pub fn interpolate(series: &FrequencySeries, delta_f: f64) -> Result<FrequencySeries> {
    if !(delta_f.is_finite() && delta_f > 0.0) {
        return Err(PsdError::InvalidParameter(format!(
            "delta_f must be finite and positive, got {delta_f}"
        )));
    }
    if series.is_empty() {
        return FrequencySeries::new(Vec::new(), delta_f);
    }
    let new_n =
        ((series.len() - 1) as f64 * series.delta_f() / delta_f + 1.0).round_ties_even() as usize;
    let samples: Vec<f64> = (0..new_n).map(|k| k as f64 * delta_f).collect();
    let freqs: Vec<f64> = series.sample_frequencies().collect();
    FrequencySeries::new(interp(&samples, &freqs, series.data()), delta_f)
}

/// Symmetric Hann window of `len` points (zero at both ends).
fn hann_window(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let m = (len - 1) as f64;
            (0..len)
                .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / m).cos())
                .collect()
        }
    }
}
