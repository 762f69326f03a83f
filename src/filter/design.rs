//! FIR filter design matching MNE / `scipy.signal.firwin`.
//!
//! Band edges follow `mne.filter.create_filter(fir_design='firwin',
//! fir_window='hamming', phase='zero')`:
//!   • low transition  = min(max(0.25 * l_freq, 2.0), l_freq)
//!   • high transition = min(max(0.25 * h_freq, 2.0), nyquist - h_freq)
//!   • filter length N = ceil(3.3 / min(transition) * sfreq), rounded to odd
//!   • firwin cutoffs sit at the middle of each transition band
//!
//! Band-pass and band-stop kernels are built from two unit-DC lowpasses:
//! `bp = lp(high) - lp(low)`, `bs = delta - bp`.
use std::f64::consts::PI;

/// Hamming window main-lobe factor used for the automatic filter length.
const HAMMING_LENGTH_FACTOR: f64 = 3.3;

/// MNE transition bandwidth below the lower pass edge.
///
/// Rule: `min(max(0.25 * l_freq, 2.0), l_freq)`
pub fn auto_trans_bandwidth(l_freq: f64) -> f64 {
    (0.25 * l_freq).max(2.0).min(l_freq)
}

/// MNE transition bandwidth above the upper pass edge.
///
/// Rule: `min(max(0.25 * h_freq, 2.0), sfreq / 2 - h_freq)`
pub fn auto_trans_bandwidth_high(h_freq: f64, sfreq: f64) -> f64 {
    (0.25 * h_freq).max(2.0).min(sfreq / 2.0 - h_freq)
}

/// Number of FIR taps for a given transition bandwidth.
/// Returns an odd integer (required for zero-phase linear-phase FIR).
///
/// Formula: `ceil(3.3 / trans_bw * sfreq)` rounded up to odd.
pub fn auto_filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n_raw = (HAMMING_LENGTH_FACTOR / trans_bw * sfreq).ceil() as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Zero-phase band-pass FIR retaining `[l_freq, h_freq]`.
///
/// Callers validate `0 < l_freq < h_freq < sfreq / 2`.
pub fn design_bandpass(l_freq: f64, h_freq: f64, sfreq: f64) -> Vec<f64> {
    let l_trans = auto_trans_bandwidth(l_freq);
    let h_trans = auto_trans_bandwidth_high(h_freq, sfreq);
    let n = auto_filter_length(l_trans.min(h_trans), sfreq);

    let low_cut = l_freq - l_trans / 2.0;
    let high_cut = h_freq + h_trans / 2.0;
    log::debug!(
        "band-pass {l_freq}-{h_freq} Hz: {n} taps, cutoffs {low_cut:.3}/{high_cut:.3} Hz"
    );

    let lp_high = firwin(n, high_cut, sfreq, true);
    let lp_low = firwin(n, low_cut, sfreq, true);
    lp_high.iter().zip(&lp_low).map(|(a, b)| a - b).collect()
}

/// Zero-phase band-stop FIR centred on `freq`.
///
/// `width` is the stop-band width (MNE notch default `freq / 200`) and
/// `trans_bw` the total transition on each side (MNE notch default 1 Hz).
pub fn design_bandstop(freq: f64, width: f64, trans_bw: f64, sfreq: f64) -> Vec<f64> {
    let half_trans = trans_bw / 2.0;
    let n = auto_filter_length(half_trans, sfreq);

    let low_cut = freq - width / 2.0 - half_trans / 2.0;
    let high_cut = freq + width / 2.0 + half_trans / 2.0;
    log::debug!("notch {freq} Hz: {n} taps, cutoffs {low_cut:.3}/{high_cut:.3} Hz");

    let lp_high = firwin(n, high_cut, sfreq, true);
    let lp_low = firwin(n, low_cut, sfreq, true);
    let mut h: Vec<f64> = lp_high.iter().zip(&lp_low).map(|(a, b)| b - a).collect();
    h[n / 2] += 1.0;
    h
}

/// Hamming-windowed sinc lowpass (or highpass with `pass_zero = false`).
///
/// `cutoff_hz` is the -6 dB point.  The lowpass is normalised to unit DC gain.
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64, pass_zero: bool) -> Vec<f64> {
    assert!(n % 2 == 1, "firwin requires odd N for linear-phase filter");
    let alpha = (n - 1) as f64 / 2.0;
    let nyq = sfreq / 2.0;
    let fc = cutoff_hz / nyq;

    let win = hamming(n);

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            // sin(π·fc·x) / (π·x) → fc as x → 0
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }

    h
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

/// Magnitude of the frequency response of `h` at `freq` Hz.
pub fn gain_at(h: &[f64], freq: f64, sfreq: f64) -> f64 {
    let w = 2.0 * PI * freq / sfreq;
    let (re, im) = h.iter().enumerate().fold((0.0, 0.0), |(re, im), (k, &c)| {
        let phase = w * k as f64;
        (re + c * phase.cos(), im - c * phase.sin())
    });
    (re * re + im * im).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_length_is_odd() {
        for l_freq in [0.1_f64, 0.5, 1.0, 2.0, 5.0] {
            let tb = auto_trans_bandwidth(l_freq);
            let n = auto_filter_length(tb, 256.0);
            assert!(n % 2 == 1, "N={n} is even for l_freq={l_freq}");
        }
    }

    #[test]
    fn mne_transition_rules() {
        approx::assert_abs_diff_eq!(auto_trans_bandwidth(0.1), 0.1);
        approx::assert_abs_diff_eq!(auto_trans_bandwidth(40.0), 10.0);
        approx::assert_abs_diff_eq!(auto_trans_bandwidth_high(40.0, 512.0), 10.0);
        // Clipped by the distance to Nyquist.
        approx::assert_abs_diff_eq!(auto_trans_bandwidth_high(127.0, 256.0), 1.0);
        // 0.5 Hz highpass at 256 Hz: MNE produces 1691 taps.
        assert_eq!(auto_filter_length(auto_trans_bandwidth(0.5), 256.0), 1691);
    }

    #[test]
    fn bandpass_is_symmetric_and_rejects_dc() {
        let h = design_bandpass(1.0, 40.0, 256.0);
        let n = h.len();
        for i in 0..n / 2 {
            approx::assert_abs_diff_eq!(h[i], h[n - 1 - i], epsilon = 1e-12);
        }
        let dc: f64 = h.iter().sum();
        assert!(dc.abs() < 1e-9, "DC gain {dc}");
    }

    #[test]
    fn bandpass_passband_and_stopband() {
        let sfreq = 256.0;
        let h = design_bandpass(1.0, 40.0, sfreq);
        approx::assert_abs_diff_eq!(gain_at(&h, 10.0, sfreq), 1.0, epsilon = 5e-3);
        assert!(gain_at(&h, 70.0, sfreq) < 1e-2);
    }

    #[test]
    fn bandstop_kills_line_frequency() {
        let sfreq = 256.0;
        let h = design_bandstop(50.0, 0.25, 1.0, sfreq);
        assert!(gain_at(&h, 50.0, sfreq) < 1e-2);
        approx::assert_abs_diff_eq!(gain_at(&h, 10.0, sfreq), 1.0, epsilon = 5e-3);
        approx::assert_abs_diff_eq!(h.iter().sum::<f64>(), 1.0, epsilon = 5e-3);
    }

    #[test]
    fn lowpass_dc_gain_unity() {
        let h = firwin(101, 10.0, 256.0, true);
        let dc: f64 = h.iter().sum();
        approx::assert_abs_diff_eq!(dc, 1.0, epsilon = 1e-9);
    }
}
