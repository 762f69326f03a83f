mod common;
use common::{recording, SFREQ};
use erp::filter::{design_bandpass, gain_at};
use erp::{condition, ContinuousSignal, ErpError};
use ndarray::{s, Array2, Axis};
use std::f64::consts::PI;

/// Four EEG channels of in-band sines, 20 s.
fn in_band() -> ContinuousSignal {
    let n_t = (20.0 * SFREQ) as usize;
    let data = Array2::from_shape_fn((4, n_t), |(c, t)| {
        let tt = t as f64 / SFREQ;
        (2.0 * PI * 10.0 * tt).sin() * (c + 1) as f64 + (2.0 * PI * 6.0 * tt + c as f64).cos()
    });
    ContinuousSignal::from_eeg(data, SFREQ, &["Oz", "O1", "O2", "POz"]).unwrap()
}

#[test]
fn idempotent_on_in_band_content() {
    let sig = in_band();
    let once = condition(&sig, 1.0, 40.0, &[50.0]).unwrap();
    let twice = condition(&once, 1.0, 40.0, &[50.0]).unwrap();

    // Compare away from the edges.
    let lo = (2.0 * SFREQ) as usize;
    let hi = sig.n_samples() - lo;
    let a = once.data().slice(s![.., lo..hi]).to_owned();
    let b = twice.data().slice(s![.., lo..hi]).to_owned();
    let max_err = common::max_abs_diff(&a, &b);
    assert!(max_err < 2e-3, "second pass changed data by {max_err:.2e}");
}

#[test]
fn line_noise_removed() {
    let n_t = (20.0 * SFREQ) as usize;
    let data = Array2::from_shape_fn((2, n_t), |(c, t)| {
        let tt = t as f64 / SFREQ;
        let line = (2.0 * PI * 50.0 * tt).sin();
        if c == 0 { line + (2.0 * PI * 10.0 * tt).sin() } else { -line }
    });
    let sig = ContinuousSignal::from_eeg(data, SFREQ, &["Oz", "Fz"]).unwrap();
    let out = condition(&sig, 1.0, 100.0, &[50.0]).unwrap();

    // Oz - Fz is unaffected by the reference: 2·line + alpha before, alpha after.
    let lo = (2.0 * SFREQ) as usize;
    let hi = n_t - lo;
    let mut worst: f64 = 0.0;
    for t in lo..hi {
        let tt = t as f64 / SFREQ;
        let diff = out.data()[[0, t]] - out.data()[[1, t]];
        worst = worst.max((diff - (2.0 * PI * 10.0 * tt).sin()).abs());
    }
    assert!(worst < 0.05, "residual after notch {worst:.3}");
}

#[test]
fn eeg_sums_to_zero_and_stim_untouched() {
    let rec = recording(10.0, &[(1.0, 1), (3.0, 3)]);
    let out = condition(&rec.signal, 0.1, 40.0, &[50.0]).unwrap();
    let eeg = out.data().slice(s![..6, ..]).to_owned();
    for &v in eeg.sum_axis(Axis(0)).iter() {
        approx::assert_abs_diff_eq!(v, 0.0, epsilon = 1e-9);
    }
    assert_eq!(out.data().row(6), rec.signal.data().row(6));
    assert_eq!(out.ch_names(), rec.signal.ch_names());
}

#[test]
fn band_edges_validated_against_nyquist() {
    let sig = in_band();
    for (lo, hi, notch) in [(1.0, 128.0, vec![]), (40.0, 1.0, vec![]), (1.0, 40.0, vec![200.0])] {
        assert!(matches!(
            condition(&sig, lo, hi, &notch),
            Err(ErpError::InvalidBand(_))
        ));
    }
}

#[test]
fn default_band_keeps_erp_range() {
    let h = design_bandpass(0.1, 40.0, SFREQ);
    for f in [1.0, 5.0, 10.0, 20.0, 30.0] {
        let g = gain_at(&h, f, SFREQ);
        assert!((g - 1.0).abs() < 0.01, "gain at {f} Hz = {g}");
    }
    assert!(gain_at(&h, 60.0, SFREQ) < 0.01);
}
