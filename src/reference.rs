//! Average reference: subtract the mean across channels at each time point.
//!
//! Matches `raw.set_eeg_reference('average', projection=False)`: the mean is
//! taken over the picked (EEG) rows only, and only those rows are changed.
//!
//! `data`: [C, T]  →  `data[c, t] -= mean(data[picks, t])` for `c` in `picks`
use ndarray::{Array1, Array2};

pub fn average_reference_inplace(data: &mut Array2<f64>, picks: &[usize]) {
    if picks.is_empty() {
        return;
    }
    let mut means = Array1::<f64>::zeros(data.ncols());
    for &ch in picks {
        means += &data.row(ch);
    }
    means /= picks.len() as f64;
    for &ch in picks {
        let mut row = data.row_mut(ch);
        row -= &means;
    }
}
