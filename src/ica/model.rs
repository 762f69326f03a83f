//! FastICA fit and the pure apply step.
//!
//! Follows `mne.preprocessing.ICA(method='fastica')`:
//!   1. centre each data channel,
//!   2. PCA-whiten to `n_components` (eigendecomposition of the covariance),
//!   3. parallel FastICA with symmetric decorrelation (sklearn `_ica_par`),
//!   4. sort components by explained variance.
//!
//! The unmixing matrix maps centred channels to unit-variance sources and the
//! mixing matrix maps them back: `unmixing · mixing = I`.
use ndarray::{s, Array1, Array2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::linalg::{symmetric_decorrelation, symmetric_eigen};
use crate::error::{ErpError, Result};
use crate::signal::ContinuousSignal;

/// Eigenvalues below `RANK_TOLERANCE * max` are treated as null directions
/// (e.g. the one removed by average referencing).
const RANK_TOLERANCE: f64 = 1e-10;

/// Decomposition algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IcaMethod {
    #[default]
    #[serde(rename = "fastica")]
    FastIca,
}

impl IcaMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            IcaMethod::FastIca => "fastica",
        }
    }
}

impl fmt::Display for IcaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IcaMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fastica" | "fast_ica" => Ok(IcaMethod::FastIca),
            other => Err(format!("unknown ICA method '{other}' (supported: fastica)")),
        }
    }
}

/// FastICA non-linearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contrast {
    #[default]
    Logcosh,
    Exp,
    Cube,
}

impl Contrast {
    /// `(g(u), g'(u))`
    #[inline]
    fn eval(self, u: f64) -> (f64, f64) {
        match self {
            Contrast::Logcosh => {
                let g = u.tanh();
                (g, 1.0 - g * g)
            }
            Contrast::Exp => {
                let e = (-0.5 * u * u).exp();
                (u * e, (1.0 - u * u) * e)
            }
            Contrast::Cube => (u * u * u, 3.0 * u * u),
        }
    }
}

/// Fit parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcaParams {
    /// `None` uses every data channel.
    pub n_components: Option<usize>,
    pub method: IcaMethod,
    pub contrast: Contrast,
    pub max_iter: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for IcaParams {
    /// MNE defaults: `max_iter='auto'` (1000 for FastICA), tol 1e-4.
    fn default() -> Self {
        Self {
            n_components: None,
            method: IcaMethod::FastIca,
            contrast: Contrast::Logcosh,
            max_iter: 1000,
            tolerance: 1e-4,
            seed: 97,
        }
    }
}

/// A fitted decomposition.  Immutable once returned by [`fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcaModel {
    method: IcaMethod,
    contrast: Contrast,
    seed: u64,
    n_iter: usize,
    /// Names of the data channels the model was fitted on, in row order.
    ch_names: Vec<String>,
    mean: Array1<f64>,
    /// `[C_data, K]`
    mixing: Array2<f64>,
    /// `[K, C_data]`
    unmixing: Array2<f64>,
    total_variance: f64,
}

impl IcaModel {
    /// Reassemble a model from persisted parts, checking shapes.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        method: IcaMethod,
        contrast: Contrast,
        seed: u64,
        n_iter: usize,
        ch_names: Vec<String>,
        mean: Array1<f64>,
        mixing: Array2<f64>,
        unmixing: Array2<f64>,
        total_variance: f64,
    ) -> Result<Self> {
        let n_ch = ch_names.len();
        let k = unmixing.nrows();
        if mean.len() != n_ch || mixing.dim() != (n_ch, k) || unmixing.ncols() != n_ch {
            return Err(ErpError::Checkpoint(format!(
                "inconsistent ICA shapes: {n_ch} channels, mean {}, mixing {:?}, unmixing {:?}",
                mean.len(),
                mixing.dim(),
                unmixing.dim()
            )));
        }
        Ok(Self {
            method,
            contrast,
            seed,
            n_iter,
            ch_names,
            mean,
            mixing,
            unmixing,
            total_variance,
        })
    }

    pub fn n_components(&self) -> usize {
        self.unmixing.nrows()
    }

    pub fn method(&self) -> IcaMethod {
        self.method
    }

    pub fn contrast(&self) -> Contrast {
        self.contrast
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// FastICA iterations used to converge.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn ch_names(&self) -> &[String] {
        &self.ch_names
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn mixing(&self) -> &Array2<f64> {
        &self.mixing
    }

    pub fn unmixing(&self) -> &Array2<f64> {
        &self.unmixing
    }

    pub fn total_variance(&self) -> f64 {
        self.total_variance
    }

    /// Fraction of the fitted data variance carried by each component.
    pub fn explained_variance(&self) -> Array1<f64> {
        let per_component = self.mixing.map_axis(Axis(0), |col| col.dot(&col));
        if self.total_variance > 0.0 {
            per_component / self.total_variance
        } else {
            per_component
        }
    }

    /// Component time courses `[K, T]` for `signal`.
    pub fn sources(&self, signal: &ContinuousSignal) -> Result<Array2<f64>> {
        let picks = self.check_layout(signal)?;
        let x = signal.data().select(Axis(0), &picks);
        let xc = &x - &self.mean.view().insert_axis(Axis(1));
        Ok(self.unmixing.dot(&xc))
    }

    /// Every index in `excluded` must name one of this model's components.
    pub fn check_excluded(&self, excluded: &[usize]) -> Result<()> {
        let k = self.n_components();
        match excluded.iter().find(|&&i| i >= k) {
            Some(&index) => Err(ErpError::InvalidComponentIndex {
                index,
                n_components: k,
            }),
            None => Ok(()),
        }
    }

    /// Row indices of the fitted channels in `signal`, or a mismatch error.
    fn check_layout(&self, signal: &ContinuousSignal) -> Result<Vec<usize>> {
        let picks = signal.data_picks();
        let names: Vec<&str> = picks
            .iter()
            .map(|&i| signal.channels()[i].name.as_str())
            .collect();
        if names.len() != self.ch_names.len()
            || names.iter().zip(&self.ch_names).any(|(a, b)| *a != b.as_str())
        {
            return Err(ErpError::ChannelMismatch(format!(
                "model fitted on {:?}, signal has {:?}",
                self.ch_names, names
            )));
        }
        Ok(picks)
    }
}

/// Fit with default iteration limits.
pub fn fit(
    signal: &ContinuousSignal,
    n_components: Option<usize>,
    method: IcaMethod,
    seed: u64,
) -> Result<IcaModel> {
    let params = IcaParams {
        n_components,
        method,
        seed,
        ..IcaParams::default()
    };
    fit_with_params(signal, &params)
}

/// Fit an ICA model on the data channels of `signal`.
///
/// The component count is checked before any numeric work.  If the data rank
/// is below the requested count (average-referenced EEG loses one
/// dimension), the model keeps only the non-null directions.
pub fn fit_with_params(signal: &ContinuousSignal, params: &IcaParams) -> Result<IcaModel> {
    let picks = signal.data_picks();
    let n_ch = picks.len();
    let requested = params.n_components.unwrap_or(n_ch);
    if requested == 0 || requested > n_ch {
        return Err(ErpError::InvalidComponentCount {
            requested,
            n_channels: n_ch,
        });
    }
    let n_t = signal.n_samples();
    if n_t < 2 {
        return Err(ErpError::RankDeficient(format!("{n_t} samples")));
    }

    log::info!(
        "Fitting ICA ({}) with {requested} components on {n_ch} channels x {n_t} samples, seed {}",
        params.method,
        params.seed
    );

    let ch_names: Vec<String> = picks
        .iter()
        .map(|&i| signal.channels()[i].name.clone())
        .collect();
    let x = signal.data().select(Axis(0), &picks);
    let mean = x
        .mean_axis(Axis(1))
        .ok_or_else(|| ErpError::RankDeficient("empty signal".into()))?;
    let xc = &x - &mean.view().insert_axis(Axis(1));

    let cov = xc.dot(&xc.t()) / n_t as f64;
    let total_variance = cov.diag().sum();
    let (eigvals, eigvecs) = symmetric_eigen(&cov);
    let max_ev = eigvals[0];
    if max_ev <= 0.0 || !max_ev.is_finite() {
        return Err(ErpError::RankDeficient("signal has no variance".into()));
    }
    let rank = eigvals
        .iter()
        .take_while(|&&v| v > RANK_TOLERANCE * max_ev)
        .count();
    let k = requested.min(rank);
    if k < requested {
        log::warn!("Data rank is {rank}; fitting {k} of {requested} requested components");
    }

    // Whitening K = D^-1/2 Eᵀ, dewhitening K⁺ = E D^1/2.
    let sqrt_d = eigvals.slice(s![..k]).mapv(f64::sqrt).insert_axis(Axis(0));
    let e = eigvecs.slice(s![.., ..k]).to_owned();
    let whitening = (&e / &sqrt_d).reversed_axes();
    let dewhitening = &e * &sqrt_d;

    let z = whitening.dot(&xc);
    let (w, n_iter) = fast_ica(&z, params)?;
    log::info!("FastICA converged after {n_iter} iterations");

    let mixing = dewhitening.dot(&w.t());
    let unmixing = w.dot(&whitening);

    let var = mixing.map_axis(Axis(0), |col| col.dot(&col));
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| var[b].total_cmp(&var[a]));
    let mut mixing = mixing.select(Axis(1), &order);
    let mut unmixing = unmixing.select(Axis(0), &order);

    // Sign convention: largest-magnitude spatial weight is positive.
    for j in 0..k {
        let peak = mixing
            .column(j)
            .iter()
            .copied()
            .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if peak < 0.0 {
            mixing.column_mut(j).mapv_inplace(|v| -v);
            unmixing.row_mut(j).mapv_inplace(|v| -v);
        }
    }

    Ok(IcaModel {
        method: params.method,
        contrast: params.contrast,
        seed: params.seed,
        n_iter,
        ch_names,
        mean,
        mixing,
        unmixing,
        total_variance,
    })
}

/// Parallel FastICA on whitened data `z` ([K, T]).  Returns `(W, iterations)`.
fn fast_ica(z: &Array2<f64>, params: &IcaParams) -> Result<(Array2<f64>, usize)> {
    let k = z.nrows();
    let n_t = z.ncols() as f64;

    let mut rng = StdRng::seed_from_u64(params.seed);
    let w_init = Array2::from_shape_fn((k, k), |_| rng.gen_range(-1.0..1.0));
    let mut w = symmetric_decorrelation(&w_init);

    for it in 0..params.max_iter {
        let mut gy = w.dot(z);
        let mut g_prime = Array1::<f64>::zeros(k);
        for (i, mut row) in gy.rows_mut().into_iter().enumerate() {
            let mut acc = 0.0;
            row.mapv_inplace(|u| {
                let (g, dg) = params.contrast.eval(u);
                acc += dg;
                g
            });
            g_prime[i] = acc / n_t;
        }

        let w_new = gy.dot(&z.t()) / n_t - &w * &g_prime.view().insert_axis(Axis(1));
        let w_new = symmetric_decorrelation(&w_new);

        let lim = w_new
            .outer_iter()
            .zip(w.outer_iter())
            .map(|(a, b)| (a.dot(&b).abs() - 1.0).abs())
            .fold(0.0_f64, f64::max);
        w = w_new;
        if lim < params.tolerance {
            return Ok((w, it + 1));
        }
    }

    Err(ErpError::Convergence {
        iterations: params.max_iter,
        tolerance: params.tolerance,
    })
}

/// Remove the `excluded` components from `signal`.
///
/// Projects the data channels into component space, keeps only the excluded
/// components, maps them back through the mixing matrix and subtracts them.
/// This equals "zero the excluded sources and back-project" while keeping
/// any variance outside the fitted subspace, so an empty exclusion list
/// returns the input unchanged.  Non-data channels are copied as-is.
pub fn apply(
    signal: &ContinuousSignal,
    model: &IcaModel,
    excluded: &[usize],
) -> Result<ContinuousSignal> {
    model.check_excluded(excluded)?;
    let picks = model.check_layout(signal)?;

    let mut excl = excluded.to_vec();
    excl.sort_unstable();
    excl.dedup();
    log::info!("Applying ICA, excluding components {excl:?}");

    let mut data = signal.data().to_owned();
    if excl.is_empty() {
        return Ok(signal.with_data(data));
    }

    let x = signal.data().select(Axis(0), &picks);
    let xc = &x - &model.mean.view().insert_axis(Axis(1));
    let sources = model.unmixing.select(Axis(0), &excl).dot(&xc);
    let artifact = model.mixing.select(Axis(1), &excl).dot(&sources);
    for (r, &ch) in picks.iter().enumerate() {
        let mut row = data.row_mut(ch);
        row -= &artifact.row(r);
    }
    Ok(signal.with_data(data))
}
