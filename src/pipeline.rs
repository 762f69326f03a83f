//! One-subject orchestration.
//!
//! ```text
//! raw + events.tsv
//!   ├─ EventTable::build     drop ignored codes, sort by sample
//!   ├─ condition             band-pass → notch → average reference
//!   ├─ ica::fit              (or reload a saved model)      → sub-XXX_ica
//!   ├─ ica::apply            remove excluded components
//!   ├─ epochs::extract       windows + baseline             → sub-XXX_epo
//!   └─ erp::average          one evoked per condition       → sub-XXX_evoked-*
//! ```
//!
//! Each checkpoint is written only after its stage succeeds.
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::checkpoint::Derivatives;
use crate::config::PipelineConfig;
use crate::epochs::{extract, EpochSet};
use crate::erp::{average, Evoked, Peak};
use crate::error::Result;
use crate::events::{EventLog, EventTable};
use crate::ica::{self, IcaModel};
use crate::preprocessing::condition;
use crate::signal::ContinuousSignal;

/// Per-run switches that are not analysis parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Load `sub-XXX_ica` instead of fitting, e.g. after choosing components
    /// to exclude from the first run's sources.
    pub reuse_ica: bool,
}

/// Everything one run produced.  Intermediate signals are kept so callers can
/// compare before/after each stage.
#[derive(Debug, Clone)]
pub struct SubjectReport {
    pub subject: String,
    pub events: EventTable,
    pub conditioned: ContinuousSignal,
    pub cleaned: ContinuousSignal,
    pub model: IcaModel,
    pub epochs: EpochSet,
    pub evokeds: BTreeMap<String, Evoked>,
    /// Checkpoint files written by this run.
    pub files: Vec<PathBuf>,
}

impl SubjectReport {
    /// Peak of every available ERP channel in every condition, within
    /// `[tmin, tmax]` seconds.  Channels absent from the recording are skipped.
    pub fn peaks(&self, channels: &[String], tmin: f64, tmax: f64) -> Vec<(String, String, Peak)> {
        erp_peaks(&self.evokeds, channels, tmin, tmax)
    }
}

/// `(condition, channel, peak)` for each pair that exists.
pub fn erp_peaks(
    evokeds: &BTreeMap<String, Evoked>,
    channels: &[String],
    tmin: f64,
    tmax: f64,
) -> Vec<(String, String, Peak)> {
    let mut out = Vec::new();
    for (name, ev) in evokeds {
        for ch in channels {
            match ev.peak(ch, tmin, tmax) {
                Ok(p) => out.push((name.clone(), ch.clone(), p)),
                Err(e) => log::debug!("No peak for {name}/{ch}: {e}"),
            }
        }
    }
    out
}

/// Run every stage for one subject.
pub fn run_subject(
    raw: &ContinuousSignal,
    events: &EventLog,
    cfg: &PipelineConfig,
    store: &Derivatives,
    subject: &str,
    opts: RunOptions,
) -> Result<SubjectReport> {
    cfg.validate()?;
    log::info!("Running pipeline for sub-{subject}");

    let events = EventTable::build(events, &cfg.ignore_codes)?;
    let conditioned = condition(raw, cfg.low_cut, cfg.high_cut, &cfg.notch_freqs)?;

    let mut files = Vec::new();
    let model = if opts.reuse_ica {
        log::info!("Reusing saved ICA for sub-{subject}");
        store.load_ica(subject)?
    } else {
        let model = ica::fit_with_params(&conditioned, &cfg.ica_params())?;
        // Rank reduction can leave fewer components than requested.
        model.check_excluded(&cfg.excluded_components)?;
        files.push(store.save_ica(subject, &model)?);
        model
    };

    let cleaned = ica::apply(&conditioned, &model, &cfg.excluded_components)?;

    let epochs = extract(
        &cleaned,
        &events,
        &cfg.condition_map,
        cfg.tmin,
        cfg.tmax,
        cfg.baseline,
    )?;
    files.push(store.save_epochs(subject, &epochs)?);

    let evokeds = average(&epochs, &cfg.condition_map);
    files.extend(store.save_evokeds(subject, &evokeds)?);

    log::info!("Finished pipeline for sub-{subject}");
    Ok(SubjectReport {
        subject: subject.to_string(),
        events,
        conditioned,
        cleaned,
        model,
        epochs,
        evokeds,
        files,
    })
}
