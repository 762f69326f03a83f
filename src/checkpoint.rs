//! Per-subject derivative files.
//!
//! Every stage result is stored as a safetensors file under one derivatives
//! directory, named after the subject:
//!
//! ```text
//! sub-001_ica.safetensors             mixing / unmixing / mean + fit metadata
//! sub-001_epo.safetensors             [E, C, T] epochs, events, labels
//! sub-001_evoked-random.safetensors   one file per condition
//! sub-001_ica-sources.safetensors     component time courses for inspection
//! ```
//!
//! Writes go through [`StWriter::write`], which renames a finished file into
//! place, so a stage that fails leaves the previous checkpoint intact.
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::epochs::EpochSet;
use crate::erp::Evoked;
use crate::error::{ErpError, Result};
use crate::events::EventRecord;
use crate::ica::{Contrast, IcaMethod, IcaModel};
use crate::io::{StReader, StWriter};
use crate::signal::{Channel, ChannelKind};

const META_KEY: &str = "erp";

#[derive(Serialize, Deserialize)]
struct IcaMeta {
    method: IcaMethod,
    contrast: Contrast,
    seed: u64,
    n_iter: usize,
    total_variance: f64,
}

#[derive(Serialize, Deserialize)]
struct EpochsMeta {
    tmin: f64,
    tmax: f64,
    baseline: Option<(f64, f64)>,
    sfreq: f64,
}

#[derive(Serialize, Deserialize)]
struct EvokedMeta {
    condition: String,
    nave: usize,
    tmin: f64,
    sfreq: f64,
}

/// Derivatives directory for one or more subjects.
#[derive(Debug, Clone)]
pub struct Derivatives {
    root: PathBuf,
}

impl Derivatives {
    /// Open (creating if needed) a derivatives directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ica_path(&self, subject: &str) -> PathBuf {
        self.root.join(format!("sub-{subject}_ica.safetensors"))
    }

    pub fn epochs_path(&self, subject: &str) -> PathBuf {
        self.root.join(format!("sub-{subject}_epo.safetensors"))
    }

    pub fn evoked_path(&self, subject: &str, condition: &str) -> PathBuf {
        self.root
            .join(format!("sub-{subject}_evoked-{condition}.safetensors"))
    }

    pub fn sources_path(&self, subject: &str) -> PathBuf {
        self.root.join(format!("sub-{subject}_ica-sources.safetensors"))
    }

    // ── ICA ───────────────────────────────────────────────────────────────

    pub fn save_ica(&self, subject: &str, model: &IcaModel) -> Result<PathBuf> {
        let meta = IcaMeta {
            method: model.method(),
            contrast: model.contrast(),
            seed: model.seed(),
            n_iter: model.n_iter(),
            total_variance: model.total_variance(),
        };
        let mut w = StWriter::new();
        w.set_metadata(META_KEY, serde_json::to_string(&meta)?);
        w.add_str_list("ch_names", model.ch_names());
        w.add_array("mean", model.mean());
        w.add_array("mixing", model.mixing());
        w.add_array("unmixing", model.unmixing());

        let path = self.ica_path(subject);
        w.write(&path)?;
        log::info!("Saved ICA for sub-{subject} to {}", path.display());
        Ok(path)
    }

    pub fn load_ica(&self, subject: &str) -> Result<IcaModel> {
        let st = StReader::open(&self.ica_path(subject))?;
        let meta: IcaMeta = serde_json::from_str(&st.meta(META_KEY)?)?;
        IcaModel::from_parts(
            meta.method,
            meta.contrast,
            meta.seed,
            meta.n_iter,
            st.string_list("ch_names")?,
            st.array1("mean")?,
            st.array2("mixing")?,
            st.array2("unmixing")?,
            meta.total_variance,
        )
    }

    /// Component time courses `[K, T]` plus the sample rate.
    pub fn save_sources(
        &self,
        subject: &str,
        sources: &ndarray::Array2<f64>,
        sfreq: f64,
        explained_variance: &Array1<f64>,
    ) -> Result<PathBuf> {
        let mut w = StWriter::new();
        w.add_array("sources", sources);
        w.add_array("explained_variance", explained_variance);
        w.add_f64("sfreq", &[sfreq], &[1]);
        let path = self.sources_path(subject);
        w.write(&path)?;
        log::info!("Saved ICA sources for sub-{subject} to {}", path.display());
        Ok(path)
    }

    // ── Epochs ────────────────────────────────────────────────────────────

    pub fn save_epochs(&self, subject: &str, epochs: &EpochSet) -> Result<PathBuf> {
        let meta = EpochsMeta {
            tmin: epochs.tmin(),
            tmax: epochs.tmax(),
            baseline: epochs.baseline(),
            sfreq: epochs.sfreq(),
        };
        let n = epochs.len();
        let samples: Vec<i64> = epochs.events().iter().map(|e| e.sample as i64).collect();
        let codes: Vec<i64> = epochs.events().iter().map(|e| e.code).collect();

        let mut w = StWriter::new();
        w.set_metadata(META_KEY, serde_json::to_string(&meta)?);
        w.add_array("data", &epochs.data().to_owned());
        w.add_i64("event_samples", &samples, &[n]);
        w.add_i64("event_codes", &codes, &[n]);
        w.add_str_list("labels", epochs.labels());
        add_channels(&mut w, epochs.channels());

        let path = self.epochs_path(subject);
        w.write(&path)?;
        log::info!("Saved {n} epochs for sub-{subject} to {}", path.display());
        Ok(path)
    }

    pub fn load_epochs(&self, subject: &str) -> Result<EpochSet> {
        let st = StReader::open(&self.epochs_path(subject))?;
        let meta: EpochsMeta = serde_json::from_str(&st.meta(META_KEY)?)?;
        let (samples, _) = st.i64_tensor("event_samples")?;
        let (codes, _) = st.i64_tensor("event_codes")?;
        let events = samples
            .into_iter()
            .zip(codes)
            .map(|(s, code)| {
                let sample = usize::try_from(s)
                    .map_err(|_| ErpError::Checkpoint(format!("negative event sample {s}")))?;
                Ok(EventRecord { sample, code })
            })
            .collect::<Result<Vec<_>>>()?;
        EpochSet::from_parts(
            st.array3("data")?,
            events,
            st.string_list("labels")?,
            meta.tmin,
            meta.tmax,
            meta.baseline,
            meta.sfreq,
            read_channels(&st)?,
        )
    }

    // ── Evoked ────────────────────────────────────────────────────────────

    pub fn save_evoked(&self, subject: &str, evoked: &Evoked) -> Result<PathBuf> {
        let meta = EvokedMeta {
            condition: evoked.condition().to_string(),
            nave: evoked.nave(),
            tmin: evoked.tmin(),
            sfreq: evoked.sfreq(),
        };
        let mut w = StWriter::new();
        w.set_metadata(META_KEY, serde_json::to_string(&meta)?);
        w.add_array("data", &evoked.data().to_owned());
        add_channels(&mut w, evoked.channels());

        let path = self.evoked_path(subject, evoked.condition());
        w.write(&path)?;
        log::info!(
            "Saved evoked '{}' for sub-{subject} to {}",
            evoked.condition(),
            path.display()
        );
        Ok(path)
    }

    pub fn save_evokeds(&self, subject: &str, evokeds: &BTreeMap<String, Evoked>) -> Result<Vec<PathBuf>> {
        evokeds
            .values()
            .map(|ev| self.save_evoked(subject, ev))
            .collect()
    }

    pub fn load_evoked(&self, subject: &str, condition: &str) -> Result<Evoked> {
        let st = StReader::open(&self.evoked_path(subject, condition))?;
        let meta: EvokedMeta = serde_json::from_str(&st.meta(META_KEY)?)?;
        Evoked::from_parts(
            meta.condition,
            st.array2("data")?,
            meta.nave,
            meta.tmin,
            meta.sfreq,
            read_channels(&st)?,
        )
    }
}

fn add_channels(w: &mut StWriter, channels: &[Channel]) {
    let names: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
    let kinds: Vec<String> = channels
        .iter()
        .map(|c| format!("{:?}", c.kind).to_ascii_lowercase())
        .collect();
    w.add_str_list("ch_names", &names);
    w.add_str_list("ch_types", &kinds);
}

fn read_channels(st: &StReader) -> Result<Vec<Channel>> {
    let names = st.string_list("ch_names")?;
    let kinds = st.string_list("ch_types")?;
    if names.len() != kinds.len() {
        return Err(ErpError::Checkpoint(format!(
            "{} channel names but {} channel types",
            names.len(),
            kinds.len()
        )));
    }
    names
        .into_iter()
        .zip(kinds)
        .map(|(name, kind)| {
            let kind = ChannelKind::parse(&kind)
                .ok_or_else(|| ErpError::Checkpoint(format!("unknown channel type '{kind}'")))?;
            Ok(Channel::new(name, kind))
        })
        .collect()
}
