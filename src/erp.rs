//! Condition averaging.
//!
//! `average` reduces an [`EpochSet`] to one [`Evoked`] per condition: the
//! element-wise mean over that condition's epochs (`[E, C, T] → [C, T]`) plus
//! the number of epochs that went into it (`nave`).
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::collections::BTreeMap;

use crate::epochs::{epoch_times, ConditionMap, EpochSet};
use crate::error::{ErpError, Result};
use crate::signal::Channel;

/// Averaged response for one condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Evoked {
    condition: String,
    data: Array2<f64>,
    nave: usize,
    tmin: f64,
    sfreq: f64,
    channels: Vec<Channel>,
}

/// Extreme value of a channel inside a latency window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Seconds relative to the event.
    pub latency: f64,
    pub amplitude: f64,
}

impl Evoked {
    pub(crate) fn from_parts(
        condition: String,
        data: Array2<f64>,
        nave: usize,
        tmin: f64,
        sfreq: f64,
        channels: Vec<Channel>,
    ) -> Result<Self> {
        if data.nrows() != channels.len() {
            return Err(ErpError::Checkpoint(format!(
                "evoked '{condition}' has {} rows but {} channels",
                data.nrows(),
                channels.len()
            )));
        }
        Ok(Self {
            condition,
            data,
            nave,
            tmin,
            sfreq,
            channels,
        })
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    /// `[C, T]`
    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Number of epochs averaged.
    pub fn nave(&self) -> usize {
        self.nave
    }

    pub fn tmin(&self) -> f64 {
        self.tmin
    }

    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    pub fn times(&self) -> Vec<f64> {
        epoch_times(self.tmin, self.sfreq, self.n_times())
    }

    /// Waveform of one channel.
    pub fn channel(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.channels.iter().position(|c| c.name == name)?;
        Some(self.data.row(idx))
    }

    /// Largest absolute deflection of `channel` within `[tmin, tmax]` seconds.
    pub fn peak(&self, channel: &str, tmin: f64, tmax: f64) -> Result<Peak> {
        let wave = self.channel(channel).ok_or_else(|| {
            ErpError::ChannelMismatch(format!("no channel '{channel}' in evoked '{}'", self.condition))
        })?;
        let times = self.times();
        let mut best: Option<Peak> = None;
        for (&t, &v) in times.iter().zip(wave.iter()) {
            if t < tmin - 1e-9 || t > tmax + 1e-9 {
                continue;
            }
            if best.map_or(true, |p| v.abs() > p.amplitude.abs()) {
                best = Some(Peak {
                    latency: t,
                    amplitude: v,
                });
            }
        }
        best.ok_or_else(|| ErpError::EmptyPeakWindow {
            condition: self.condition.clone(),
            tmin,
            tmax,
        })
    }
}

/// Average each condition in `conditions` order.
///
/// Conditions with no epochs are skipped with a warning; an empty result is
/// not an error.
pub fn average(epochs: &EpochSet, conditions: &ConditionMap) -> BTreeMap<String, Evoked> {
    let mut out = BTreeMap::new();
    for name in conditions.names() {
        let Some(subset) = epochs.condition(name) else {
            log::warn!("No epochs for condition '{name}'; skipping");
            continue;
        };
        let nave = subset.len();
        let Some(mean) = subset.data().mean_axis(Axis(0)) else {
            continue;
        };
        log::info!("Averaged {nave} epochs for '{name}'");
        out.insert(
            name.to_string(),
            Evoked {
                condition: name.to_string(),
                data: mean,
                nave,
                tmin: epochs.tmin(),
                sfreq: epochs.sfreq(),
                channels: epochs.channels().to_vec(),
            },
        );
    }
    out
}
