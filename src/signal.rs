//! Continuous multichannel recordings.
//!
//! A [`ContinuousSignal`] is an immutable `[C, T]` array plus its sample rate
//! and channel layout.  Every processing stage takes `&ContinuousSignal` and
//! returns a new one built with [`ContinuousSignal::with_data`], so earlier
//! stages stay available for before/after comparison.
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{ErpError, Result};

/// Role of a channel in the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Eeg,
    Eog,
    Misc,
    Stim,
}

impl ChannelKind {
    /// Best-effort role from a channel name (BioSemi / BIDS conventions).
    ///
    /// `EXG*` and `EOG*` are ocular, `Status`, `STI*` and `TRIG*` carry
    /// triggers, anything else is treated as scalp EEG.
    pub fn from_name(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        if upper.starts_with("EXG") || upper.starts_with("EOG") {
            ChannelKind::Eog
        } else if upper == "STATUS" || upper.starts_with("STI") || upper.starts_with("TRIG") {
            ChannelKind::Stim
        } else {
            ChannelKind::Eeg
        }
    }

    /// Parse a BIDS `channels.tsv` type string (`EEG`, `EOG`, `MISC`, `TRIG`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eeg" => Some(ChannelKind::Eeg),
            "eog" | "heog" | "veog" => Some(ChannelKind::Eog),
            "misc" | "ecg" | "emg" | "resp" | "temp" => Some(ChannelKind::Misc),
            "stim" | "trig" | "status" => Some(ChannelKind::Stim),
            _ => None,
        }
    }

    /// Data channels are filtered and decomposed; stim channels are not.
    pub fn is_data(self) -> bool {
        self != ChannelKind::Stim
    }
}

/// Name and role of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub kind: ChannelKind,
}

impl Channel {
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self { name: name.into(), kind }
    }

    pub fn eeg(name: impl Into<String>) -> Self {
        Self::new(name, ChannelKind::Eeg)
    }
}

/// Dense `[C, T]` recording with a fixed channel layout and sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousSignal {
    data: Array2<f64>,
    sfreq: f64,
    channels: Vec<Channel>,
}

impl ContinuousSignal {
    /// Build a signal, checking that the channel list matches the data rows.
    pub fn new(data: Array2<f64>, sfreq: f64, channels: Vec<Channel>) -> Result<Self> {
        if data.nrows() != channels.len() {
            return Err(ErpError::ChannelMismatch(format!(
                "{} data rows but {} channel descriptions",
                data.nrows(),
                channels.len()
            )));
        }
        if sfreq <= 0.0 || !sfreq.is_finite() {
            return Err(ErpError::ChannelMismatch(format!("invalid sample rate {sfreq}")));
        }
        Ok(Self { data, sfreq, channels })
    }

    /// Convenience constructor: every channel is EEG.
    pub fn from_eeg(data: Array2<f64>, sfreq: f64, names: &[&str]) -> Result<Self> {
        let channels = names.iter().map(|n| Channel::eeg(*n)).collect();
        Self::new(data, sfreq, channels)
    }

    /// A new signal with the same layout and sample rate but different data.
    ///
    /// Panics if the shape differs; stages only call this with arrays derived
    /// from `self.data()`.
    pub(crate) fn with_data(&self, data: Array2<f64>) -> Self {
        assert_eq!(data.dim(), self.data.dim(), "derived signal must keep its shape");
        Self {
            data,
            sfreq: self.sfreq,
            channels: self.channels.clone(),
        }
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn ch_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn duration(&self) -> f64 {
        self.n_samples() as f64 / self.sfreq
    }

    /// Row indices of channels of the given kind.
    pub fn picks(&self, kind: ChannelKind) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    /// Row indices of every non-stim channel.
    pub fn data_picks(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind.is_data())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }
}
