/// Shared synthetic-recording helpers.
///
/// A recording is four independent sources mixed into six scalp channels
/// plus a `Status` trigger channel:
///   0  10 Hz alpha          (occipital)
///   1  blinks every 1.3 s   (frontal)
///   2  3 Hz sawtooth        (everywhere)
///   3  ERP bump 150 ms after each event, amplitude by event code
use erp::{Channel, ChannelKind, ContinuousSignal, EventLog};
use ndarray::{Array1, Array2, ArrayView1};

#[allow(unused)]
pub const SFREQ: f64 = 256.0;

#[allow(unused)]
pub const EEG: [&str; 6] = ["Oz", "O1", "O2", "POz", "Fz", "Fp1"];

#[allow(unused)]
pub struct Recording {
    pub signal: ContinuousSignal,
    /// [4, T] ground-truth sources.
    pub sources: Array2<f64>,
    /// Event samples and codes, in log order.
    pub events: Vec<(usize, i64)>,
}

fn hann(t: usize, center: usize, half_width: usize) -> f64 {
    let d = (t as f64 - center as f64).abs();
    let hw = half_width as f64;
    if d < hw {
        0.5 * (1.0 + (std::f64::consts::PI * d / hw).cos())
    } else {
        0.0
    }
}

#[allow(unused)]
pub fn erp_amplitude(code: i64) -> f64 {
    match code {
        1 => 1.0,
        3 => 2.0,
        _ => 0.0,
    }
}

#[allow(unused)]
pub fn mixing() -> Array2<f64> {
    ndarray::array![
        [1.0, 0.05, 0.3, 1.0],
        [0.9, 0.05, 0.4, 0.8],
        [0.8, 0.1, 0.2, 0.9],
        [0.6, 0.2, 0.5, 0.7],
        [0.2, 0.8, 0.6, 0.2],
        [0.1, 1.0, 0.3, 0.05],
    ]
}

#[allow(unused)]
pub fn sources(n_t: usize, events: &[(usize, i64)]) -> Array2<f64> {
    let mut s = Array2::<f64>::zeros((4, n_t));
    let blink_hw = (0.15 * SFREQ).round() as usize;
    let blinks: Vec<usize> = (0..)
        .map(|i| ((0.4 + 1.3 * i as f64) * SFREQ).round() as usize)
        .take_while(|&c| c < n_t)
        .collect();
    for t in 0..n_t {
        let tt = t as f64 / SFREQ;
        s[[0, t]] = (2.0 * std::f64::consts::PI * 10.0 * tt).sin();
        s[[1, t]] = blinks.iter().map(|&c| 4.0 * hann(t, c, blink_hw)).sum();
        s[[2, t]] = 2.0 * ((tt * 3.0) % 1.0) - 1.0;
    }
    let erp_hw = (0.05 * SFREQ).round() as usize;
    let lag = (0.15 * SFREQ).round() as usize;
    for &(sample, code) in events {
        let c = sample + lag;
        for t in c.saturating_sub(erp_hw)..(c + erp_hw).min(n_t) {
            s[[3, t]] += erp_amplitude(code) * hann(t, c, erp_hw);
        }
    }
    s
}

/// `duration` seconds at [`SFREQ`], events given as (seconds, code).
#[allow(unused)]
pub fn recording(duration: f64, events: &[(f64, i64)]) -> Recording {
    let n_t = (duration * SFREQ).round() as usize;
    let events: Vec<(usize, i64)> = events
        .iter()
        .map(|&(t, code)| ((t * SFREQ).round() as usize, code))
        .collect();
    let sources = sources(n_t, &events);
    let eeg = mixing().dot(&sources);

    let mut data = Array2::<f64>::zeros((EEG.len() + 1, n_t));
    data.slice_mut(ndarray::s![..EEG.len(), ..]).assign(&eeg);
    for &(sample, code) in &events {
        if sample < n_t {
            data[[EEG.len(), sample]] = code as f64;
        }
    }
    let mut channels: Vec<Channel> = EEG.iter().map(|n| Channel::eeg(*n)).collect();
    channels.push(Channel::new("Status", ChannelKind::Stim));

    Recording {
        signal: ContinuousSignal::new(data, SFREQ, channels).unwrap(),
        sources,
        events,
    }
}

/// BIDS-style events.tsv text.
#[allow(unused)]
pub fn events_tsv(events: &[(usize, i64)]) -> String {
    let mut s = String::from("onset\tduration\tsample\tvalue\ttrial_type\n");
    for &(sample, code) in events {
        s.push_str(&format!(
            "{:.4}\tn/a\t{sample}\t{code}\tstim\n",
            sample as f64 / SFREQ
        ));
    }
    s
}

#[allow(unused)]
pub fn event_log(events: &[(usize, i64)]) -> EventLog {
    EventLog::from_reader(events_tsv(events).as_bytes()).unwrap()
}

/// Absolute Pearson correlation.
#[allow(unused)]
pub fn abs_corr(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let a = &a - a.mean().unwrap();
    let b = &b - b.mean().unwrap();
    (a.dot(&b) / (a.dot(&a) * b.dot(&b)).sqrt()).abs()
}

#[allow(unused)]
/// Maximum absolute difference between two arrays.
pub fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0_f64, f64::max)
}

#[allow(unused)]
pub fn rms(x: &Array1<f64>) -> f64 {
    (x.dot(x) / x.len() as f64).sqrt()
}
