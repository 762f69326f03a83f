//! Event-locked epoching with baseline correction.
//!
//! For every event whose code belongs to a condition, a fixed window
//! `[tmin, tmax]` (seconds, relative to the event) is cut from the continuous
//! signal.  Sample offsets are `round(tmin · sfreq)` and `round(tmax · sfreq)`
//! and both ends are inclusive, so every epoch has
//! `round(tmax · sfreq) − round(tmin · sfreq) + 1` samples, as in `mne.Epochs`.
//!
//! Windows that would run past either end of the recording are dropped.
//!
//! Output: [`EpochSet`] with data `[E, C, T]`, in chronological order.
use ndarray::{s, Array3, ArrayView3, Axis};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ErpError, Result};
use crate::events::{EventRecord, EventTable};
use crate::signal::{Channel, ContinuousSignal};

/// Tolerance (in seconds) when comparing baseline bounds with sample times.
const TIME_EPS: f64 = 1e-9;

// ── Condition map ─────────────────────────────────────────────────────────────

/// Ordered `name → event code` mapping.
///
/// Names and codes are both unique, so every epoch gets exactly one label.
/// Serialises as a JSON object in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConditionMap {
    entries: Vec<(String, i64)>,
}

impl ConditionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut map = Self::new();
        for (name, code) in pairs {
            map.insert(name, code)?;
        }
        Ok(map)
    }

    /// Append a condition.  Duplicate names or codes are rejected, as are
    /// names that would not stay a single path component in
    /// `sub-XXX_evoked-<name>` files.
    pub fn insert(&mut self, name: impl Into<String>, code: i64) -> Result<()> {
        let name = name.into();
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.chars().any(|c| matches!(c, '/' | '\\' | '\0'))
        {
            return Err(ErpError::InvalidConditionName(name));
        }
        if self.code(&name).is_some() {
            return Err(ErpError::DuplicateCondition(format!(
                "condition '{name}' defined twice"
            )));
        }
        if let Some(other) = self.name_for(code) {
            return Err(ErpError::DuplicateCondition(format!(
                "code {code} already mapped to '{other}'"
            )));
        }
        self.entries.push((name, code));
        Ok(())
    }

    pub fn code(&self, name: &str) -> Option<i64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, c)| *c)
    }

    pub fn name_for(&self, code: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(n, _)| n.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ConditionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, code) in &self.entries {
            map.serialize_entry(name, code)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ConditionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> Visitor<'de> for MapVisitor {
            type Value = ConditionMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of condition name to integer event code")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut map = ConditionMap::new();
                while let Some((name, code)) = access.next_entry::<String, i64>()? {
                    map.insert(name, code).map_err(serde::de::Error::custom)?;
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

// ── Epoch set ─────────────────────────────────────────────────────────────────

/// Baseline-corrected epochs `[E, C, T]` with their triggering events.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSet {
    data: Array3<f64>,
    events: Vec<EventRecord>,
    labels: Vec<String>,
    tmin: f64,
    tmax: f64,
    baseline: Option<(f64, f64)>,
    sfreq: f64,
    channels: Vec<Channel>,
}

impl EpochSet {
    /// Reassemble from persisted parts, checking that the pieces agree.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        data: Array3<f64>,
        events: Vec<EventRecord>,
        labels: Vec<String>,
        tmin: f64,
        tmax: f64,
        baseline: Option<(f64, f64)>,
        sfreq: f64,
        channels: Vec<Channel>,
    ) -> Result<Self> {
        let (n_e, n_ch, _) = data.dim();
        if events.len() != n_e || labels.len() != n_e || channels.len() != n_ch {
            return Err(ErpError::Checkpoint(format!(
                "epoch data {:?} does not match {} events, {} labels, {} channels",
                data.dim(),
                events.len(),
                labels.len(),
                channels.len()
            )));
        }
        Ok(Self {
            data,
            events,
            labels,
            tmin,
            tmax,
            baseline,
            sfreq,
            channels,
        })
    }

    pub fn data(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Condition name of each epoch.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_times(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn tmin(&self) -> f64 {
        self.tmin
    }

    pub fn tmax(&self) -> f64 {
        self.tmax
    }

    pub fn baseline(&self) -> Option<(f64, f64)> {
        self.baseline
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

    /// Time of each sample relative to the event (seconds).
    pub fn times(&self) -> Vec<f64> {
        epoch_times(self.tmin, self.sfreq, self.n_times())
    }

    /// Epochs labelled `name`, or `None` if there are none.
    pub fn condition(&self, name: &str) -> Option<EpochSet> {
        let idx: Vec<usize> = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.as_str() == name)
            .map(|(i, _)| i)
            .collect();
        if idx.is_empty() {
            return None;
        }
        Some(EpochSet {
            data: self.data.select(Axis(0), &idx),
            events: idx.iter().map(|&i| self.events[i]).collect(),
            labels: idx.iter().map(|&i| self.labels[i].clone()).collect(),
            tmin: self.tmin,
            tmax: self.tmax,
            baseline: self.baseline,
            sfreq: self.sfreq,
            channels: self.channels.clone(),
        })
    }

    /// Epoch count per condition present in the set.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Conditions present in the set, in order of first appearance.
    pub fn conditions(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for label in &self.labels {
            if !seen.contains(label) {
                seen.push(label.clone());
            }
        }
        seen
    }
}

/// `tmin` snapped to the sample grid, then one step per sample.
pub(crate) fn epoch_times(tmin: f64, sfreq: f64, n_times: usize) -> Vec<f64> {
    let first = (tmin * sfreq).round();
    (0..n_times).map(|i| (first + i as f64) / sfreq).collect()
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Check the window and baseline before any data is touched.
pub fn validate_window(tmin: f64, tmax: f64, baseline: Option<(f64, f64)>) -> Result<()> {
    if !(tmin.is_finite() && tmax.is_finite()) || tmin >= tmax {
        return Err(ErpError::InvalidWindow { tmin, tmax });
    }
    if let Some((start, end)) = baseline {
        let inside = start.is_finite()
            && end.is_finite()
            && start <= end
            && start >= tmin - TIME_EPS
            && end <= tmax + TIME_EPS;
        if !inside {
            return Err(ErpError::InvalidBaseline {
                start,
                end,
                tmin,
                tmax,
            });
        }
    }
    Ok(())
}

/// Cut one epoch per mapped event and baseline-correct it.
///
/// Events whose code is not in `conditions` are skipped.  Windows that start
/// before sample 0 or end at or past the last sample are dropped silently;
/// the number dropped is reported once at debug level.  The baseline mean is
/// removed from every data (non-stim) channel of each epoch.
pub fn extract(
    signal: &ContinuousSignal,
    events: &EventTable,
    conditions: &ConditionMap,
    tmin: f64,
    tmax: f64,
    baseline: Option<(f64, f64)>,
) -> Result<EpochSet> {
    validate_window(tmin, tmax, baseline)?;

    let sfreq = signal.sfreq();
    let start_off = (tmin * sfreq).round() as i64;
    let stop_off = (tmax * sfreq).round() as i64;
    let n_times = (stop_off - start_off + 1) as usize;
    let n_samples = signal.n_samples() as i64;

    let baseline_idx = match baseline {
        Some((b0, b1)) => {
            let idx: Vec<usize> = epoch_times(tmin, sfreq, n_times)
                .iter()
                .enumerate()
                .filter(|(_, &t)| t >= b0 - TIME_EPS && t <= b1 + TIME_EPS)
                .map(|(i, _)| i)
                .collect();
            if idx.is_empty() {
                return Err(ErpError::InvalidBaseline {
                    start: b0,
                    end: b1,
                    tmin,
                    tmax,
                });
            }
            Some(idx)
        }
        None => None,
    };

    let mut kept: Vec<(EventRecord, String, usize)> = Vec::new();
    let mut n_dropped = 0usize;
    for ev in events.iter() {
        let Some(name) = conditions.name_for(ev.code) else {
            continue;
        };
        let start = ev.sample as i64 + start_off;
        let stop = ev.sample as i64 + stop_off;
        if start < 0 || stop >= n_samples {
            n_dropped += 1;
            continue;
        }
        kept.push((*ev, name.to_string(), start as usize));
    }
    if n_dropped > 0 {
        log::debug!("Dropped {n_dropped} epoch(s) extending past the recording");
    }
    if kept.is_empty() {
        return Err(ErpError::NoEpochs);
    }

    let n_ch = signal.n_channels();
    let data_picks = signal.data_picks();
    let source = signal.data();
    let mut data = Array3::<f64>::zeros((kept.len(), n_ch, n_times));
    for (e, (_, _, start)) in kept.iter().enumerate() {
        let mut epoch = data.index_axis_mut(Axis(0), e);
        epoch.assign(&source.slice(s![.., *start..*start + n_times]));
        if let Some(idx) = &baseline_idx {
            for &ch in &data_picks {
                let mut row = epoch.row_mut(ch);
                let mean = idx.iter().map(|&i| row[i]).sum::<f64>() / idx.len() as f64;
                row -= mean;
            }
        }
    }

    log::info!(
        "Extracted {} epochs ({} channels x {n_times} samples, {tmin}..{tmax} s, baseline {:?})",
        kept.len(),
        n_ch,
        baseline
    );

    let (events, labels): (Vec<EventRecord>, Vec<String>) =
        kept.into_iter().map(|(ev, name, _)| (ev, name)).unzip();
    Ok(EpochSet {
        data,
        events,
        labels,
        tmin,
        tmax,
        baseline,
        sfreq,
        channels: signal.channels().to_vec(),
    })
}
