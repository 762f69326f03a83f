mod common;
use common::{abs_corr, recording, Recording, SFREQ};
use erp::filter::{design_bandpass, filter_1d};
use erp::ica::{apply, fit, fit_with_params, IcaParams};
use erp::{condition, ContinuousSignal, ErpError, IcaMethod};
use ndarray::{Array1, Axis};

const EVENTS: [(f64, i64); 5] = [(1.0, 1), (3.0, 1), (5.0, 3), (6.0, 255), (7.0, 1)];

fn conditioned() -> (Recording, ContinuousSignal) {
    let rec = recording(10.0, &EVENTS);
    let sig = condition(&rec.signal, 1.0, 40.0, &[]).unwrap();
    (rec, sig)
}

/// Blink source passed through the same band-pass as the channels.
fn filtered_blink(rec: &Recording) -> Array1<f64> {
    let h = design_bandpass(1.0, 40.0, SFREQ);
    let x: Vec<f64> = rec.sources.row(1).to_vec();
    Array1::from(filter_1d(&x, &h))
}

#[test]
fn component_count_limited_by_rank() {
    // Six referenced channels carrying four sources.
    let (_, sig) = conditioned();
    let model = fit(&sig, None, IcaMethod::FastIca, 97).unwrap();
    assert_eq!(model.n_components(), 4);
    assert_eq!(model.ch_names().len(), 6);
    assert_eq!(model.sources(&sig).unwrap().dim(), (4, sig.n_samples()));
    approx::assert_abs_diff_eq!(model.explained_variance().sum(), 1.0, epsilon = 1e-6);
}

#[test]
fn too_many_components_fail_before_fitting() {
    let (_, sig) = conditioned();
    // Stim channel does not count.
    let err = fit(&sig, Some(7), IcaMethod::FastIca, 97).unwrap_err();
    assert!(matches!(
        err,
        ErpError::InvalidComponentCount { requested: 7, n_channels: 6 }
    ));
}

#[test]
fn empty_exclusion_reproduces_input() {
    let (_, sig) = conditioned();
    let model = fit(&sig, Some(4), IcaMethod::FastIca, 97).unwrap();
    let out = apply(&sig, &model, &[]).unwrap();
    let diff = common::max_abs_diff(&out.data().to_owned(), &sig.data().to_owned());
    assert!(diff < 1e-9, "max diff {diff:.2e}");
}

#[test]
fn fit_and_apply_are_deterministic() {
    let (_, sig) = conditioned();
    let a = fit(&sig, Some(4), IcaMethod::FastIca, 97).unwrap();
    let b = fit(&sig, Some(4), IcaMethod::FastIca, 97).unwrap();
    assert_eq!(a, b);
    assert_eq!(apply(&sig, &a, &[2]).unwrap(), apply(&sig, &b, &[2]).unwrap());
}

#[test]
fn blink_component_removed() {
    let (rec, sig) = conditioned();
    let blink = filtered_blink(&rec);
    let model = fit(&sig, Some(4), IcaMethod::FastIca, 97).unwrap();
    let sources = model.sources(&sig).unwrap();

    let (idx, r) = sources
        .axis_iter(Axis(0))
        .map(|s| abs_corr(s, blink.view()))
        .enumerate()
        .fold((0, 0.0_f64), |best, (i, r)| if r > best.1 { (i, r) } else { best });
    assert!(r > 0.95, "no component tracks the blink (best |r| = {r:.3})");

    let fp1 = sig.channel_index("Fp1").unwrap();
    assert!(abs_corr(sig.data().row(fp1), blink.view()) > 0.5);

    let cleaned = apply(&sig, &model, &[idx]).unwrap();
    for ch in 0..6 {
        let r = abs_corr(cleaned.data().row(ch), blink.view());
        assert!(r < 0.1, "channel {ch} still correlates with blink: {r:.3}");
    }
    // Trigger channel copied through.
    assert_eq!(cleaned.data().row(6), sig.data().row(6));
}

#[test]
fn out_of_range_exclusion_rejected() {
    let (_, sig) = conditioned();
    let model = fit(&sig, Some(4), IcaMethod::FastIca, 97).unwrap();
    let snapshot = model.clone();
    assert!(matches!(
        apply(&sig, &model, &[1, 4]),
        Err(ErpError::InvalidComponentIndex { index: 4, n_components: 4 })
    ));
    assert_eq!(model, snapshot);
}

#[test]
fn iteration_budget_exhausted() {
    let (_, sig) = conditioned();
    let params = IcaParams {
        n_components: Some(4),
        max_iter: 2,
        tolerance: 1e-15,
        ..IcaParams::default()
    };
    assert!(matches!(
        fit_with_params(&sig, &params),
        Err(ErpError::Convergence { iterations: 2, .. })
    ));
}
