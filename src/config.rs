//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter for one subject run.  All
//! fields have defaults matching the visual-symmetry ERP analysis, and every
//! field may be omitted from a JSON config file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::epochs::{validate_window, ConditionMap};
use crate::error::{ErpError, Result};
use crate::ica::{Contrast, IcaMethod, IcaParams};

/// Configuration for the full ERP pipeline.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use erp::PipelineConfig;
///
/// let cfg = PipelineConfig {
///     high_cut: 30.0,          // stronger low-pass
///     notch_freqs: vec![60.0], // US mains
///     ..PipelineConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Lower edge of the band-pass in Hz.
    ///
    /// Default: `0.1` Hz.
    pub low_cut: f64,

    /// Upper edge of the band-pass in Hz.  Must be below Nyquist.
    ///
    /// Default: `40.0` Hz.
    pub high_cut: f64,

    /// Line-noise frequencies to notch out.  Empty disables the notch.
    ///
    /// Default: `[50.0]`.
    pub notch_freqs: Vec<f64>,

    /// Number of ICA components; `None` uses every data channel.
    ///
    /// Default: `Some(30)`.
    pub n_components: Option<usize>,

    /// Default: FastICA.
    pub ica_method: IcaMethod,

    /// FastICA non-linearity.  Default: logcosh.
    pub contrast: Contrast,

    /// Seed for the ICA initialisation.  Same seed, same model.
    ///
    /// Default: `97`.
    pub seed: u64,

    /// FastICA iteration limit.  Default: `1000`.
    pub max_iter: usize,

    /// FastICA convergence tolerance.  Default: `1e-4`.
    pub tolerance: f64,

    /// Components to remove, chosen after inspecting the fitted model.
    ///
    /// Default: `[]`.
    pub excluded_components: Vec<usize>,

    /// Epoch start relative to the event, seconds.  Default: `-0.2`.
    pub tmin: f64,

    /// Epoch end relative to the event, seconds.  Default: `0.8`.
    pub tmax: f64,

    /// Baseline interval in seconds; `None` disables baseline correction.
    ///
    /// Default: `Some((-0.2, 0.0))`.
    pub baseline: Option<(f64, f64)>,

    /// Condition name → event code.  Default: `{random: 1, symmetry: 3}`.
    pub condition_map: ConditionMap,

    /// Event codes dropped from the event log.  Default: `[255]`.
    pub ignore_codes: Vec<i64>,

    /// Channels reported in the ERP summary.  Default: `[Oz, O1, O2, POz]`.
    pub erp_channels: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let condition_map =
            ConditionMap::from_pairs([("random", 1), ("symmetry", 3)]).unwrap_or_default();
        Self {
            low_cut: 0.1,
            high_cut: 40.0,
            notch_freqs: vec![50.0],
            n_components: Some(30),
            ica_method: IcaMethod::FastIca,
            contrast: Contrast::Logcosh,
            seed: 97,
            max_iter: 1000,
            tolerance: 1e-4,
            excluded_components: vec![],
            tmin: -0.2,
            tmax: 0.8,
            baseline: Some((-0.2, 0.0)),
            condition_map,
            ignore_codes: vec![255],
            erp_channels: ["Oz", "O1", "O2", "POz"].map(String::from).to_vec(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file; missing fields take their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&text)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(cfg)
    }

    /// Check everything that does not depend on the recording.
    ///
    /// Band edges against Nyquist and component counts against the channel
    /// count are checked by the stages themselves.
    pub fn validate(&self) -> Result<()> {
        if !(self.low_cut > 0.0 && self.high_cut > self.low_cut && self.high_cut.is_finite()) {
            return Err(ErpError::InvalidBand(format!(
                "need 0 < low_cut < high_cut, got {} and {}",
                self.low_cut, self.high_cut
            )));
        }
        if self.n_components == Some(0) {
            return Err(ErpError::Config("n_components must be at least 1".into()));
        }
        if let Some(k) = self.n_components {
            if let Some(&index) = self.excluded_components.iter().find(|&&i| i >= k) {
                return Err(ErpError::InvalidComponentIndex {
                    index,
                    n_components: k,
                });
            }
        }
        if self.max_iter == 0 {
            return Err(ErpError::Config("max_iter must be at least 1".into()));
        }
        if !(self.tolerance > 0.0) {
            return Err(ErpError::Config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.condition_map.is_empty() {
            return Err(ErpError::Config("condition_map is empty".into()));
        }
        validate_window(self.tmin, self.tmax, self.baseline)
    }

    /// ICA fit parameters drawn from this config.
    pub fn ica_params(&self) -> IcaParams {
        IcaParams {
            n_components: self.n_components,
            method: self.ica_method,
            contrast: self.contrast,
            max_iter: self.max_iter,
            tolerance: self.tolerance,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.condition_map.code("symmetry"), Some(3));
        assert_eq!(cfg.ica_params().seed, 97);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"high_cut": 30.0, "excluded_components": [0, 2]}"#).unwrap();
        assert_eq!(cfg.high_cut, 30.0);
        assert_eq!(cfg.excluded_components, vec![0, 2]);
        assert_eq!(cfg.low_cut, 0.1);
        assert_eq!(cfg.baseline, Some((-0.2, 0.0)));
    }

    #[test]
    fn json_round_trip() {
        let cfg = PipelineConfig {
            baseline: None,
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn rejects_bad_values() {
        let bad_band = PipelineConfig { low_cut: 40.0, high_cut: 1.0, ..Default::default() };
        assert!(matches!(bad_band.validate(), Err(ErpError::InvalidBand(_))));
        let bad_window = PipelineConfig { tmin: 1.0, tmax: 0.0, ..Default::default() };
        assert!(matches!(bad_window.validate(), Err(ErpError::InvalidWindow { .. })));
        let bad_ica = PipelineConfig { n_components: Some(0), ..Default::default() };
        assert!(matches!(bad_ica.validate(), Err(ErpError::Config(_))));
    }

    #[test]
    fn exclusion_beyond_component_count_rejected() {
        let cfg = PipelineConfig {
            n_components: Some(4),
            excluded_components: vec![0, 4],
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ErpError::InvalidComponentIndex { index: 4, n_components: 4 })
        ));
        // Without a fixed count the check waits for the fitted model.
        let open = PipelineConfig { n_components: None, ..cfg };
        assert!(open.validate().is_ok());
    }
}
