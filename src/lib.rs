//! # erp - single-subject EEG event-related potentials in pure Rust
//!
//! `erp` turns a continuous EEG recording and its event log into
//! condition-averaged ERPs.  The DSP follows
//! [MNE-Python](https://mne.tools): Hamming-window FIR filters with MNE's
//! automatic transition bandwidths, average reference, FastICA with PCA
//! whitening, `mne.Epochs`-style windows and baseline correction.
//!
//! _No Python, no BLAS, no C libraries: Rust + [RustFFT](https://crates.io/crates/rustfft)
//! + [ndarray](https://crates.io/crates/ndarray)._
//!
//! ## Pipeline overview
//!
//! ```text
//! raw.safetensors + events.tsv
//!   │
//!   ├─ events::EventTable      (sample, value) rows, ignored codes removed
//!   ├─ preprocessing::condition
//!   │    ├─ band-pass          0.1–40 Hz zero-phase FIR
//!   │    ├─ notch              50 Hz band-stop
//!   │    └─ reference          per-timepoint EEG mean removed
//!   ├─ ica::fit                FastICA model (persisted, inspected by a human)
//!   ├─ ica::apply              excluded components removed
//!   ├─ epochs::extract         [-0.2, 0.8] s windows, (-0.2, 0) s baseline
//!   └─ erp::average            one Evoked per condition
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use erp::{run_subject, Derivatives, EventLog, PipelineConfig, RawData, RunOptions};
//! use std::path::Path;
//!
//! let raw    = RawData::load(Path::new("sub-001_raw.safetensors"))?.into_signal()?;
//! let events = EventLog::from_path(Path::new("sub-001_task-jacobsen_events.tsv"))?;
//! let store  = Derivatives::new("derivatives")?;
//!
//! let report = run_subject(&raw, &events, &PipelineConfig::default(), &store, "001", RunOptions::default())?;
//! for (name, ev) in &report.evokeds {
//!     println!("{name}: {} epochs", ev.nave());
//! }
//! # Ok::<(), erp::ErpError>(())
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use erp::{condition, epochs, ica, ConditionMap, ContinuousSignal, EventRecord, EventTable, IcaMethod};
//! use ndarray::Array2;
//!
//! let raw = ContinuousSignal::from_eeg(Array2::zeros((4, 10_000)), 512.0, &["Oz", "O1", "O2", "POz"])?;
//! let filtered = condition(&raw, 0.1, 40.0, &[50.0])?;
//! let model    = ica::fit(&filtered, Some(3), IcaMethod::FastIca, 97)?;
//! let cleaned  = ica::apply(&filtered, &model, &[0])?;
//! let events   = EventTable::from_records(vec![EventRecord { sample: 2048, code: 1 }])?;
//! let map      = ConditionMap::from_pairs([("random", 1), ("symmetry", 3)])?;
//! let epoch_set = epochs::extract(&cleaned, &events, &map, -0.2, 0.8, Some((-0.2, 0.0)))?;
//! # Ok::<(), erp::ErpError>(())
//! ```

pub mod checkpoint;
pub mod config;
pub mod epochs;
pub mod erp;
pub mod error;
pub mod events;
pub mod filter;
pub mod ica;
pub mod io;
pub mod pipeline;
pub mod preprocessing;
pub mod reference;
pub mod signal;

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use checkpoint::Derivatives;
pub use config::PipelineConfig;
pub use epochs::{extract, ConditionMap, EpochSet};
pub use erp::{average, Evoked, Peak};
pub use error::{ErpError, Result};
pub use events::{EventLog, EventRecord, EventTable};
pub use filter::{apply_fir_zero_phase, design_bandpass, design_bandstop, firwin, hamming};
pub use ica::{Contrast, IcaMethod, IcaModel, IcaParams};
pub use io::{RawData, StReader, StWriter};
pub use pipeline::{erp_peaks, run_subject, RunOptions, SubjectReport};
pub use preprocessing::condition;
pub use reference::average_reference_inplace;
pub use signal::{Channel, ChannelKind, ContinuousSignal};
