//! Independent component decomposition for artifact removal.
//!
//! - [`fit`] learns an [`IcaModel`] (mixing / unmixing over the data
//!   channels) with PCA whitening followed by parallel FastICA.
//! - [`apply`] removes a caller-chosen set of components from a signal.  It
//!   never touches the model, so the same fit can be re-applied with a new
//!   exclusion list after the components have been inspected.

pub mod linalg;
pub mod model;

pub use model::{apply, fit, fit_with_params, Contrast, IcaMethod, IcaModel, IcaParams};
