/// erp: run the single-subject ERP pipeline, export ICA sources for
/// inspection, or summarise saved evoked responses.
///
/// Typical loop:
///   1. `erp run ...`               fits and saves ICA, epochs, evokeds
///   2. `erp ica-sources ...`       writes component time courses to inspect
///   3. `erp run --reuse-ica --exclude 0,3 ...`
///   4. `erp summary ...`           per-condition counts and ERP peaks
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use erp::{
    condition, erp_peaks, run_subject, Derivatives, EventLog, PipelineConfig, RawData, RunOptions,
};

#[derive(Parser, Debug)]
#[command(name = "erp", about = "Single-subject EEG ERP pipeline")]
struct Cli {
    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter, ICA, epoch and average one subject.
    Run(RunArgs),
    /// Write ICA component time courses for a subject.
    IcaSources(SourcesArgs),
    /// Print epoch counts and ERP peaks from saved derivatives.
    Summary(SummaryArgs),
}

#[derive(Args, Debug)]
struct Common {
    /// Subject label, e.g. 001.
    #[arg(long)]
    subject: String,

    /// Derivatives directory.
    #[arg(long)]
    deriv: PathBuf,

    /// JSON config; defaults are used for missing fields.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    common: Common,

    /// raw.safetensors (data, sfreq, ch_names, ch_types).
    #[arg(long)]
    raw: PathBuf,

    /// BIDS events.tsv with `sample` and `value` columns.
    #[arg(long)]
    events: PathBuf,

    /// Components to exclude (comma-separated), overrides the config.
    #[arg(long, value_delimiter = ',')]
    exclude: Option<Vec<usize>>,

    /// Number of ICA components, overrides the config.
    #[arg(long)]
    n_components: Option<usize>,

    /// ICA seed, overrides the config.
    #[arg(long)]
    seed: Option<u64>,

    /// Load the saved ICA instead of fitting a new one.
    #[arg(long)]
    reuse_ica: bool,
}

#[derive(Args, Debug)]
struct SourcesArgs {
    #[command(flatten)]
    common: Common,

    #[arg(long)]
    raw: PathBuf,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    #[command(flatten)]
    common: Common,

    /// Peak search window start (s).
    #[arg(long, default_value_t = 0.0)]
    peak_tmin: f64,

    /// Peak search window end (s); defaults to the epoch end.
    #[arg(long)]
    peak_tmax: Option<f64>,
}

fn load_config(common: &Common) -> Result<PipelineConfig> {
    let cfg = match &common.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    Ok(cfg)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    match cli.command {
        Command::Run(args) => run(args),
        Command::IcaSources(args) => sources(args),
        Command::Summary(args) => summary(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut cfg = load_config(&args.common)?;
    if let Some(exclude) = args.exclude {
        cfg.excluded_components = exclude;
    }
    if let Some(n) = args.n_components {
        cfg.n_components = Some(n);
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }

    let raw = RawData::load(&args.raw)
        .with_context(|| format!("loading {}", args.raw.display()))?
        .into_signal()?;
    let events = EventLog::from_path(&args.events)
        .with_context(|| format!("reading {}", args.events.display()))?;
    let store = Derivatives::new(&args.common.deriv)?;

    let opts = RunOptions {
        reuse_ica: args.reuse_ica,
    };
    let report = run_subject(&raw, &events, &cfg, &store, &args.common.subject, opts)
        .with_context(|| format!("sub-{}", args.common.subject))?;

    println!(
        "sub-{}: {} events, {} ICA components ({} excluded), {} epochs",
        report.subject,
        report.events.len(),
        report.model.n_components(),
        cfg.excluded_components.len(),
        report.epochs.len()
    );
    for (name, ev) in &report.evokeds {
        println!("  {name:<12} nave = {}", ev.nave());
    }
    for path in &report.files {
        println!("  wrote {}", path.display());
    }
    Ok(())
}

fn sources(args: SourcesArgs) -> Result<()> {
    let cfg = load_config(&args.common)?;
    let store = Derivatives::new(&args.common.deriv)?;
    let subject = &args.common.subject;

    let model = store
        .load_ica(subject)
        .with_context(|| format!("no saved ICA for sub-{subject}; run `erp run` first"))?;
    let raw = RawData::load(&args.raw)?.into_signal()?;
    let conditioned = condition(&raw, cfg.low_cut, cfg.high_cut, &cfg.notch_freqs)?;

    let sources = model.sources(&conditioned)?;
    let explained = model.explained_variance();
    let path = store.save_sources(subject, &sources, conditioned.sfreq(), &explained)?;

    for (i, ev) in explained.iter().enumerate() {
        println!("  IC{i:03}  {:6.2} %", ev * 100.0);
    }
    println!("Written → {}", path.display());
    Ok(())
}

fn summary(args: SummaryArgs) -> Result<()> {
    let cfg = load_config(&args.common)?;
    let store = Derivatives::new(&args.common.deriv)?;
    let subject = &args.common.subject;

    let epochs = store
        .load_epochs(subject)
        .with_context(|| format!("no saved epochs for sub-{subject}"))?;
    println!(
        "sub-{subject}: {} epochs, {} samples each @ {} Hz",
        epochs.len(),
        epochs.n_times(),
        epochs.sfreq()
    );
    for (name, n) in epochs.counts() {
        println!("  {name:<12} {n}");
    }

    let mut evokeds = std::collections::BTreeMap::new();
    for name in cfg.condition_map.names() {
        match store.load_evoked(subject, name) {
            Ok(ev) => {
                evokeds.insert(name.to_string(), ev);
            }
            Err(e) => log::warn!("No evoked '{name}' for sub-{subject}: {e}"),
        }
    }

    let tmax = args.peak_tmax.unwrap_or(epochs.tmax());
    for (cond, ch, peak) in erp_peaks(&evokeds, &cfg.erp_channels, args.peak_tmin, tmax) {
        println!(
            "  {cond:<12} {ch:<5} peak {:+.3e} at {:.0} ms",
            peak.amplitude,
            peak.latency * 1000.0
        );
    }
    Ok(())
}
