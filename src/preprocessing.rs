//! Signal conditioning: band-pass, line-noise notch, average reference.
//!
//! The three steps always run in this order.  Re-referencing last keeps
//! out-of-band noise from leaking back in through the reference average.
use crate::error::{ErpError, Result};
use crate::filter::{apply_fir_zero_phase, design_bandpass, design_bandstop};
use crate::reference::average_reference_inplace;
use crate::signal::{ChannelKind, ContinuousSignal};

/// MNE `notch_filter` default transition bandwidth (Hz).
pub const NOTCH_TRANS_BANDWIDTH: f64 = 1.0;

/// MNE `notch_filter` default stop-band width for a line frequency.
pub fn notch_width(freq: f64) -> f64 {
    freq / 200.0
}

/// Check band edges and notch frequencies against the sample rate.
pub fn validate_band(low_cut: f64, high_cut: f64, notch_freqs: &[f64], sfreq: f64) -> Result<()> {
    let nyquist = sfreq / 2.0;
    if !(low_cut.is_finite() && high_cut.is_finite()) || low_cut <= 0.0 || high_cut <= 0.0 {
        return Err(ErpError::InvalidBand(format!(
            "cutoffs must be positive, got low={low_cut} high={high_cut}"
        )));
    }
    if low_cut >= high_cut {
        return Err(ErpError::InvalidBand(format!(
            "low cut {low_cut} Hz must be below high cut {high_cut} Hz"
        )));
    }
    if high_cut >= nyquist {
        return Err(ErpError::InvalidBand(format!(
            "high cut {high_cut} Hz must be below Nyquist ({nyquist} Hz)"
        )));
    }
    if let Some(&f) = notch_freqs.iter().find(|&&f| !(f > 0.0 && f < nyquist)) {
        return Err(ErpError::InvalidBand(format!(
            "notch frequency {f} Hz outside (0, {nyquist}) Hz"
        )));
    }
    // The stop band plus its transition must fit below Nyquist, otherwise
    // the upper cutoff folds away and the notch removes nothing.
    for &f in notch_freqs {
        let reach = notch_width(f) / 2.0 + NOTCH_TRANS_BANDWIDTH / 2.0;
        if f + reach >= nyquist {
            return Err(ErpError::InvalidBand(format!(
                "effective notch stop band {f} Hz + {reach} Hz reaches Nyquist ({nyquist} Hz)"
            )));
        }
        if f - reach <= 0.0 {
            return Err(ErpError::InvalidBand(format!(
                "effective notch stop band {f} Hz - {reach} Hz reaches 0 Hz"
            )));
        }
    }
    Ok(())
}

/// Band-pass, notch and average-reference `signal`, returning a new signal.
///
/// Filters run over every data (non-stim) channel; the average reference is
/// computed over and applied to EEG channels only.  An empty `notch_freqs`
/// disables the notch step.
pub fn condition(
    signal: &ContinuousSignal,
    low_cut: f64,
    high_cut: f64,
    notch_freqs: &[f64],
) -> Result<ContinuousSignal> {
    let sfreq = signal.sfreq();
    validate_band(low_cut, high_cut, notch_freqs, sfreq)?;

    let picks = signal.data_picks();
    let mut data = signal.data().to_owned();

    log::info!(
        "Band-pass {low_cut}-{high_cut} Hz on {} channels ({} samples @ {sfreq} Hz)",
        picks.len(),
        signal.n_samples()
    );
    let h = design_bandpass(low_cut, high_cut, sfreq);
    apply_fir_zero_phase(&mut data, &picks, &h);

    for &freq in notch_freqs {
        log::info!("Notch filter at {freq} Hz");
        let h = design_bandstop(freq, notch_width(freq), NOTCH_TRANS_BANDWIDTH, sfreq);
        apply_fir_zero_phase(&mut data, &picks, &h);
    }

    let eeg = signal.picks(ChannelKind::Eeg);
    log::info!("Average reference over {} EEG channels", eeg.len());
    average_reference_inplace(&mut data, &eeg);

    Ok(signal.with_data(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Channel;
    use ndarray::Array2;

    fn sig(n_ch: usize, n_t: usize) -> ContinuousSignal {
        let data = Array2::from_shape_fn((n_ch, n_t), |(c, t)| ((c + 1) as f64 * t as f64 * 0.01).sin());
        let channels = (0..n_ch).map(|c| Channel::eeg(format!("E{c}"))).collect();
        ContinuousSignal::new(data, 256.0, channels).unwrap()
    }

    #[test]
    fn band_validation() {
        assert!(validate_band(1.0, 40.0, &[50.0], 256.0).is_ok());
        for (lo, hi) in [(40.0, 1.0), (1.0, 1.0), (0.0, 40.0), (-1.0, 40.0), (1.0, 128.0)] {
            assert!(
                matches!(validate_band(lo, hi, &[], 256.0), Err(ErpError::InvalidBand(_))),
                "({lo}, {hi}) should be rejected"
            );
        }
        assert!(validate_band(1.0, 40.0, &[130.0], 256.0).is_err());
        assert!(validate_band(1.0, 40.0, &[0.0], 256.0).is_err());
    }

    #[test]
    fn notch_too_close_to_nyquist_rejected() {
        // 127.9 + 0.32 + 0.5 and 127 + 0.635 + 0.5 both pass 128 Hz.
        for f in [127.9, 127.0] {
            assert!(
                matches!(validate_band(1.0, 40.0, &[f], 256.0), Err(ErpError::InvalidBand(_))),
                "{f} Hz notch should be rejected"
            );
        }
        assert!(validate_band(1.0, 40.0, &[100.0, 120.0], 256.0).is_ok());
        assert!(validate_band(1.0, 40.0, &[0.4], 256.0).is_err());

        let s = sig(3, 512);
        assert!(matches!(condition(&s, 1.0, 40.0, &[127.9]), Err(ErpError::InvalidBand(_))));
    }

    #[test]
    fn invalid_band_leaves_input_alone() {
        let s = sig(3, 512);
        let before = s.clone();
        assert!(condition(&s, 40.0, 1.0, &[]).is_err());
        assert_eq!(s, before);
    }

    #[test]
    fn output_keeps_layout_and_input_is_unchanged() {
        let s = sig(4, 2048);
        let before = s.clone();
        let out = condition(&s, 1.0, 40.0, &[50.0]).unwrap();
        assert_eq!(out.data().dim(), s.data().dim());
        assert_eq!(out.channels(), s.channels());
        assert_eq!(out.sfreq(), s.sfreq());
        assert_eq!(s, before);
    }

    #[test]
    fn stim_channel_passes_through() {
        let mut channels: Vec<Channel> = (0..3).map(|c| Channel::eeg(format!("E{c}"))).collect();
        channels.push(Channel::new("Status", ChannelKind::Stim));
        let data = Array2::from_shape_fn((4, 1024), |(c, t)| if c == 3 { (t % 100) as f64 } else { (t as f64 * 0.3).sin() });
        let s = ContinuousSignal::new(data, 256.0, channels).unwrap();
        let out = condition(&s, 1.0, 40.0, &[]).unwrap();
        assert_eq!(out.data().row(3), s.data().row(3));
    }
}
