use crate::error::{PsdError, Result};

use super::model::{FrequencySeries, RawSpectrumSample};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Interpolate a PSD given as two parallel arrays (frequency, power) onto a
/// grid of `length` bins spaced by `delta_f`.
///
/// Bins below `low_freq_cutoff` are zero. Above it the power is
/// interpolated linearly in log-log space, clamping to the first/last input
/// value outside the available frequency range.
///
/// If the grid would extend past the highest input frequency, a warning is
/// logged and the output is shortened to `floor(max_freq / delta_f) + 1`
/// bins instead of failing.
pub fn from_arrays(
    freq_data: &[f64],
    noise_data: &[f64],
    length: usize,
    delta_f: f64,
    low_freq_cutoff: f64,
) -> Result<FrequencySeries> {
    let sample = RawSpectrumSample::new(freq_data.to_vec(), noise_data.to_vec())?;
    from_sample(&sample, length, delta_f, low_freq_cutoff)
}

/// Same as [`from_arrays`], starting from an already validated sample.
pub fn from_sample(
    sample: &RawSpectrumSample,
    length: usize,
    delta_f: f64,
    low_freq_cutoff: f64,
) -> Result<FrequencySeries> {
    if length == 0 {
        return Err(PsdError::InvalidParameter("length must be at least 1".into()));
    }
    if !(delta_f.is_finite() && delta_f > 0.0) {
        return Err(PsdError::InvalidParameter(format!(
            "delta_f must be finite and positive, got {delta_f}"
        )));
    }
    if !(low_freq_cutoff.is_finite() && low_freq_cutoff >= 0.0) {
        return Err(PsdError::InvalidParameter(format!(
            "low-frequency cutoff must be finite and non-negative, got {low_freq_cutoff}"
        )));
    }

    let freq_data = sample.frequencies();
    let noise_data = sample.values();

    // Only include points above the low frequency cutoff
    if freq_data[0] > low_freq_cutoff {
        return Err(PsdError::CutoffBelowData {
            lowest_frequency: freq_data[0],
            low_frequency_cutoff: low_freq_cutoff,
        });
    }

    let kmin = (low_freq_cutoff / delta_f) as usize;
    let flow = kmin as f64 * delta_f;

    let mut data_start = if freq_data[0] == low_freq_cutoff {
        0
    } else {
        freq_data.partition_point(|&f| f < flow).saturating_sub(1)
    };
    // If the cutoff is exactly in the data, start there
    if freq_data.get(data_start + 1) == Some(&low_freq_cutoff) {
        data_start += 1;
    }
    let freq_data = &freq_data[data_start..];
    let noise_data = &noise_data[data_start..];

    let max_freq = freq_data[freq_data.len() - 1];
    let mut length = length;
    if (length - 1) as f64 * delta_f > max_freq {
        log::warn!(
            "Requested number of samples exceeds the highest available frequency in the \
             input data, will use max available frequency instead. \
             (requested {:.6} Hz, available {:.6} Hz)",
            (length - 1) as f64 * delta_f,
            max_freq
        );
        length = (max_freq / delta_f + 1.0) as usize;
    }

    let flog: Vec<f64> = freq_data.iter().map(|f| f.ln()).collect();
    let slog: Vec<f64> = noise_data.iter().map(|s| s.ln()).collect();

    let mut psd = vec![0.0; length];
    for (k, bin) in psd.iter_mut().enumerate().skip(kmin) {
        let f = k as f64 * delta_f;
        *bin = interp_one(f.ln(), &flog, &slog).exp();
    }

    FrequencySeries::new(psd, delta_f)
}

// ---------------------------------------------------------------------------
// Linear interpolation helpers
// ---------------------------------------------------------------------------

/// Piecewise-linear interpolation of `(xp, fp)` at every point of `x`.
///
/// `xp` must be increasing. Points outside `[xp[0], xp[last]]` take the
/// boundary value.
pub fn interp(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    x.iter().map(|&xi| interp_one(xi, xp, fp)).collect()
}

/// Interpolate a single value; see [`interp`].
pub fn interp_one(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let last = xp.len() - 1;
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[last] {
        return fp[last];
    }

    let idx = xp.partition_point(|&v| v < x);
    if xp[idx] == x {
        return fp[idx];
    }
    let lo = idx - 1;
    let t = (x - xp[lo]) / (xp[idx] - xp[lo]);
    fp[lo] + t * (fp[idx] - fp[lo])
}
