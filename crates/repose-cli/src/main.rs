use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use repose_lib::{
    detectors::{correct_artifacts, ArtifactFlag, ArtifactSummary, CorrectionMethod},
    io as rr_io,
    metrics::{frequency_domain, nonlinear, time_domain, ReadinessContext},
    window::{SelectionMethod, SleepAnchors},
    AnalysisConfig, Analyzer, Outcome, RRPoint, RRSeries, SessionInput,
};
use serde::Serialize;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "repose",
    version,
    about = "Repose: overnight RR recovery-window analysis"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Input and configuration shared by every subcommand.
#[derive(Args)]
struct Source {
    /// RR file: one interval (ms) per line, or CSV with `timestamp_ms,rr_ms[,hr_bpm]`.
    /// Read from stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,
    /// TOML file overriding analysis defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Correction {
    None,
    Deletion,
    Linear,
    Spline,
    Median,
}

impl From<Correction> for CorrectionMethod {
    fn from(value: Correction) -> Self {
        match value {
            Correction::None => CorrectionMethod::None,
            Correction::Deletion => CorrectionMethod::Deletion,
            Correction::Linear => CorrectionMethod::LinearInterpolation,
            Correction::Spline => CorrectionMethod::CubicSpline,
            Correction::Median => CorrectionMethod::Median,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Method {
    Recovery,
    PeakRmssd,
    PeakSdnn,
    PowerProxy,
    Stable,
    Manual,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a recording is fit for analysis
    Verify {
        #[command(flatten)]
        source: Source,
        /// Sensor name as reported by the device
        #[arg(long)]
        device: Option<String>,
    },
    /// Flag artifacts and optionally correct them
    Artifacts {
        #[command(flatten)]
        source: Source,
        /// Overrides the configured correction method
        #[arg(long)]
        correction: Option<Correction>,
    },
    /// Time-domain HRV over the whole recording
    HrvTime {
        #[command(flatten)]
        source: Source,
    },
    /// Frequency-domain HRV (Welch PSD) over the whole recording
    HrvPsd {
        #[command(flatten)]
        source: Source,
        /// Overrides the configured resampling rate
        #[arg(long)]
        interp_fs: Option<f64>,
    },
    /// Nonlinear HRV metrics (Poincaré, entropy, DFA)
    HrvNonlinear {
        #[command(flatten)]
        source: Source,
    },
    /// Verify, select the recovery window and compute its metrics
    Analyze {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        sleep_start_ms: Option<i64>,
        #[arg(long)]
        wake_ms: Option<i64>,
        #[arg(long, value_enum, default_value = "recovery")]
        method: Method,
        /// Window centre for `--method manual`
        #[arg(long)]
        at_ms: Option<i64>,
        #[arg(long)]
        baseline_rmssd: Option<f64>,
        #[arg(long)]
        vo2max: Option<f64>,
        #[arg(long)]
        acute_chronic_ratio: Option<f64>,
        /// Include per-beat artifact flags in the output
        #[arg(long)]
        with_flags: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Verify { source, device } => cmd_verify(&source, device.as_deref())?,
        Commands::Artifacts { source, correction } => cmd_artifacts(&source, correction)?,
        Commands::HrvTime { source } => cmd_hrv_time(&source)?,
        Commands::HrvPsd { source, interp_fs } => cmd_hrv_psd(&source, interp_fs)?,
        Commands::HrvNonlinear { source } => cmd_hrv_nonlinear(&source)?,
        Commands::Analyze {
            source,
            device,
            sleep_start_ms,
            wake_ms,
            method,
            at_ms,
            baseline_rmssd,
            vo2max,
            acute_chronic_ratio,
            with_flags,
        } => {
            let method = match (method, at_ms) {
                (Method::Recovery, _) => SelectionMethod::Recovery,
                (Method::PeakRmssd, _) => SelectionMethod::PeakRmssd,
                (Method::PeakSdnn, _) => SelectionMethod::PeakSdnn,
                (Method::PowerProxy, _) => SelectionMethod::PowerProxy,
                (Method::Stable, _) => SelectionMethod::Stable,
                (Method::Manual, Some(timestamp_ms)) => SelectionMethod::Manual { timestamp_ms },
                (Method::Manual, None) => bail!("--method manual needs --at-ms"),
            };
            let input = |series| SessionInput {
                series,
                anchors: SleepAnchors {
                    sleep_start_ms,
                    wake_ms,
                },
                device,
                readiness: ReadinessContext {
                    baseline_rmssd,
                    vo2max,
                    acute_chronic_ratio,
                },
                method,
            };
            cmd_analyze(&source, input, with_flags)?
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

fn read_series(input: Option<&Path>) -> Result<RRSeries> {
    let series = match input {
        Some(path) => rr_io::load_rr_series(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            rr_io::parse_rr_input(&buf)?
        }
    };
    log::info!(
        "loaded {} beats spanning {:.1} min",
        series.len(),
        series.duration_ms() as f64 / 60_000.0
    );
    Ok(series)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn cmd_verify(source: &Source, device: Option<&str>) -> Result<()> {
    let analyzer = Analyzer::new(load_config(source.config.as_deref())?)?;
    let series = read_series(source.input.as_deref())?;
    print_json(&analyzer.verify(&series, device))
}

#[derive(Serialize)]
struct ArtifactReport {
    summary: ArtifactSummary,
    method: CorrectionMethod,
    flags: Vec<ArtifactFlag>,
    corrected: Vec<f64>,
    source_index: Vec<usize>,
}

fn cmd_artifacts(source: &Source, correction: Option<Correction>) -> Result<()> {
    let config = load_config(source.config.as_deref())?;
    let analyzer = Analyzer::new(config)?;
    let series = read_series(source.input.as_deref())?;
    let flags = analyzer.detect_artifacts(&series);
    let method = correction
        .map(CorrectionMethod::from)
        .unwrap_or(analyzer.config().correction.method);
    let corrected = correct_artifacts(
        &series.values(),
        &flags,
        method,
        &analyzer.config().correction,
    )?;
    print_json(&ArtifactReport {
        summary: ArtifactSummary::from_flags(&flags),
        method,
        flags: corrected.flags,
        corrected: corrected.values,
        source_index: corrected.source_index,
    })
}

/// Whole-recording beats after detection and the configured correction.
fn clean_points(analyzer: &Analyzer, series: &RRSeries) -> Result<Vec<RRPoint>> {
    let flags = analyzer.detect_artifacts(series);
    match analyzer.corrected_points(series, &flags, 0, series.len())? {
        Outcome::Found(points) => Ok(points),
        Outcome::Insufficient(reason) => bail!("no usable beats: {reason}"),
    }
}

fn cmd_hrv_time(source: &Source) -> Result<()> {
    let analyzer = Analyzer::new(load_config(source.config.as_deref())?)?;
    let series = read_series(source.input.as_deref())?;
    let clean = clean_points(&analyzer, &series)?;
    print_json(&time_domain(&clean, &analyzer.config().time))
}

fn cmd_hrv_psd(source: &Source, interp_fs: Option<f64>) -> Result<()> {
    let mut config = load_config(source.config.as_deref())?;
    if let Some(fs) = interp_fs {
        config.frequency.resample_hz = fs;
    }
    let analyzer = Analyzer::new(config)?;
    let series = read_series(source.input.as_deref())?;
    let clean = clean_points(&analyzer, &series)?;
    let psd = frequency_domain(&clean, &analyzer.config().frequency, analyzer.plan_cache())?;
    print_json(&psd)
}

fn cmd_hrv_nonlinear(source: &Source) -> Result<()> {
    let analyzer = Analyzer::new(load_config(source.config.as_deref())?)?;
    let series = read_series(source.input.as_deref())?;
    let values: Vec<f64> = clean_points(&analyzer, &series)?
        .iter()
        .map(RRPoint::value)
        .collect();
    print_json(&nonlinear(&values, &analyzer.config().nonlinear))
}

fn cmd_analyze(
    source: &Source,
    input: impl FnOnce(RRSeries) -> SessionInput,
    with_flags: bool,
) -> Result<()> {
    let analyzer = Analyzer::new(load_config(source.config.as_deref())?)?;
    let input = input(read_series(source.input.as_deref())?);
    let mut analysis = analyzer.analyze(&input)?;
    if !with_flags {
        analysis.flags.clear();
    }
    print_json(&analysis)
}
