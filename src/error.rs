use thiserror::Error;

/// Every failure the pipeline can raise.
///
/// All variants are fatal for the current subject. Missing conditions during
/// averaging are not errors; they are logged and skipped.
#[derive(Error, Debug)]
pub enum ErpError {
    #[error("event log is missing the '{0}' column")]
    MissingColumn(String),

    #[error("no events left after dropping ignored codes")]
    EmptyEvents,

    #[error("event row {row}: cannot read '{column}' value {value:?}")]
    MalformedEvent {
        row: usize,
        column: String,
        value: String,
    },

    #[error("invalid filter band: {0}")]
    InvalidBand(String),

    #[error("invalid number of components {requested} for {n_channels} data channels")]
    InvalidComponentCount { requested: usize, n_channels: usize },

    #[error("component index {index} out of range (model has {n_components} components)")]
    InvalidComponentIndex { index: usize, n_components: usize },

    #[error("channel layout does not match: {0}")]
    ChannelMismatch(String),

    #[error("FastICA did not converge after {iterations} iterations (tol = {tolerance:e})")]
    Convergence { iterations: usize, tolerance: f64 },

    #[error("signal is rank deficient: {0}")]
    RankDeficient(String),

    #[error("invalid epoch window: tmin={tmin}, tmax={tmax}")]
    InvalidWindow { tmin: f64, tmax: f64 },

    #[error("peak window [{tmin}, {tmax}] s holds no samples of '{condition}'")]
    EmptyPeakWindow {
        condition: String,
        tmin: f64,
        tmax: f64,
    },

    #[error("invalid baseline ({start}, {end}) for window [{tmin}, {tmax}]")]
    InvalidBaseline {
        start: f64,
        end: f64,
        tmin: f64,
        tmax: f64,
    },

    #[error("condition map: {0}")]
    DuplicateCondition(String),

    #[error("condition name {0:?} cannot be used in a file name")]
    InvalidConditionName(String),

    #[error("no epochs survived windowing")]
    NoEpochs,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

pub type Result<T> = std::result::Result<T, ErpError>;
