//! Main entry point for the `spo2-pipeline` binary
//!
//! Wires the real service implementations into the orchestrator and exposes
//! the full pipeline, each stage on its own, the directory ODI report and
//! single-channel export of EDF recordings.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use oximetry::{DesaturationCounter, SignalCleaner};
use shared::{logging, PipelineConfig, RawFormat};

use orchestrator::{
    export, report,
    services::{EnvConfigSource, FileSignalSource, FsArtifactStore, HttpFetcher, StatisticalBiomarkerEngine},
    BatchSettings, BiomarkerEngine, ConfigSource, Orchestrator, OrchestratorError, OrchestratorResult, RunMode,
    SubjectSelection,
};

/// Population-scale SpO2 desaturation biomarker extraction
#[derive(Parser)]
#[command(name = "spo2-pipeline")]
#[command(about = "Downloads, cleans and scores overnight SpO2 recordings")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Env file to load instead of the nearest `.env`
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Download raw recordings only
    Download(BatchArgs),
    /// fetch → clean → evict → features
    Run(BatchArgs),
    /// Clean downloaded recordings
    Clean(BatchArgs),
    /// Delete raw recordings that have been cleaned
    Evict(BatchArgs),
    /// Compute feature rows from cleaned series
    Features(BatchArgs),
    /// Score every CSV recording under a directory
    Odi(OdiArgs),
    /// Convert every EDF under a directory to a single-channel CSV or Parquet file
    Export(ExportArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct BatchArgs {
    /// Dataset name on the archive, e.g. `shhs`
    #[arg(long)]
    pub dataset: String,

    /// Recording name prefix, e.g. `shhs1`
    #[arg(long)]
    pub prefix: String,

    /// Archive sub-path; also the local directory under the dataset
    #[arg(long)]
    pub download_from: String,

    /// Local root for every artifact
    #[arg(long, default_value = "./data")]
    pub download_to: PathBuf,

    /// First subject id of an inclusive range
    #[arg(long, requires = "end", conflicts_with = "list")]
    pub start: Option<u64>,

    /// Last subject id of an inclusive range
    #[arg(long, requires = "start", conflicts_with = "list")]
    pub end: Option<u64>,

    /// Explicit subject ids separated by spaces or commas
    #[arg(long)]
    pub list: Option<String>,

    /// Subjects processed concurrently (overrides MAX_THREADS)
    #[arg(long)]
    pub max_threads: Option<usize>,

    /// Preferred SpO2 channel name
    #[arg(long, default_value = "SaO2")]
    pub channel: String,

    /// Add the desaturation and variability features to the panel
    #[arg(long)]
    pub complex_features: bool,

    /// Container format of raw recordings (edf, csv, parquet)
    #[arg(long, default_value = "edf", value_parser = parse_raw_format)]
    pub raw_format: RawFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct OdiArgs {
    /// Directory searched recursively for CSV recordings
    #[arg(long)]
    pub path: PathBuf,

    /// Report file stem
    #[arg(long)]
    pub name: String,

    /// Output directory for the report
    #[arg(long)]
    pub save: PathBuf,

    /// Preferred SpO2 channel name
    #[arg(long, default_value = "SaO2")]
    pub channel: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExportArgs {
    /// Directory searched recursively for EDF recordings
    #[arg(long)]
    pub path: PathBuf,

    /// Output format (csv, parquet)
    #[arg(long, default_value = "csv", value_parser = parse_export_format)]
    pub format: RawFormat,

    /// Preferred SpO2 channel name
    #[arg(long, default_value = "SaO2")]
    pub channel: String,

    /// Delete each EDF once its copy is written
    #[arg(long)]
    pub remove_edf: bool,
}

fn parse_export_format(value: &str) -> Result<RawFormat, String> {
    match RawFormat::from_extension(value) {
        Some(RawFormat::Edf) => Err("EDF is the export source, not a target".to_string()),
        Some(format) => Ok(format),
        None => Err(format!("unknown export format '{value}' (expected csv or parquet)")),
    }
}

fn parse_raw_format(value: &str) -> Result<RawFormat, String> {
    RawFormat::from_extension(value).ok_or_else(|| format!("unknown raw format '{value}' (expected edf, csv or parquet)"))
}

#[tokio::main]
async fn main() -> OrchestratorResult<()> {
    // Parse command line arguments
    let args = Args::parse();

    logging::init_tracing(Some(&args.log_level));

    let config_source = match &args.env_file {
        Some(path) => EnvConfigSource::with_env_file(path),
        None => EnvConfigSource::new(),
    };
    let config = config_source.load()?;

    let result = match args.command {
        Command::Download(batch) => run_batch(RunMode::Download, batch, config).await,
        Command::Run(batch) => run_batch(RunMode::Full, batch, config).await,
        Command::Clean(batch) => run_batch(RunMode::Clean, batch, config).await,
        Command::Evict(batch) => run_batch(RunMode::Evict, batch, config).await,
        Command::Features(batch) => run_batch(RunMode::Features, batch, config).await,
        Command::Odi(odi) => run_odi(odi).await,
        Command::Export(export) => run_export(export).await,
    };

    if let Err(e) = &result {
        logging::log_error("spo2-pipeline", e);
    }
    result
}

async fn run_batch(mode: RunMode, batch: BatchArgs, mut config: PipelineConfig) -> OrchestratorResult<()> {
    if let Some(workers) = batch.max_threads {
        config = config.with_max_workers(workers);
    }
    config.validate()?;
    if mode.fetches() {
        config.require_token()?;
    }

    let selection = SubjectSelection::from_args(batch.start, batch.end, batch.list.as_deref())?;
    let recordings = selection.recordings(&batch.prefix)?;

    let engine = StatisticalBiomarkerEngine::new(batch.complex_features);
    let columns = engine.feature_names().len() + 1;
    let store = FsArtifactStore::new(
        &batch.download_to,
        &batch.dataset,
        &batch.download_from,
        batch.raw_format,
        columns,
        &config,
    );
    let fetcher = HttpFetcher::new(&config)?;
    let settings = BatchSettings::new(&batch.dataset, &batch.download_from, &batch.channel);

    // Create orchestrator with dependency injection
    let orchestrator = Orchestrator::new(fetcher, FileSignalSource::new(), engine, store, settings, config)?;

    let summary = orchestrator.run(mode, &recordings).await?;
    println!("{summary}");
    Ok(())
}

async fn run_odi(args: OdiArgs) -> OrchestratorResult<()> {
    let output = args.save.join(format!("{}.csv", args.name));
    logging::log_startup(&format!("ODI report for {}", args.path.display()));

    let (written, output) = tokio::task::spawn_blocking(move || {
        let rows = report::desaturation_report(
            &FileSignalSource::new(),
            &SignalCleaner::default(),
            &DesaturationCounter::default(),
            &args.path,
            &args.channel,
        )?;
        report::write_report(&output, &rows)?;
        Ok::<_, OrchestratorError>((rows.len(), output))
    })
    .await
    .map_err(|e| OrchestratorError::WorkerPoolError { reason: e.to_string() })??;

    logging::log_success(&format!("Wrote {} subject(s) to {}", written, output.display()));
    Ok(())
}

async fn run_export(args: ExportArgs) -> OrchestratorResult<()> {
    logging::log_startup(&format!("{} export of {}", args.format, args.path.display()));

    let exported = tokio::task::spawn_blocking(move || {
        export::export_directory(&FileSignalSource::new(), &args.path, args.format, &args.channel, args.remove_edf)
    })
    .await
    .map_err(|e| OrchestratorError::WorkerPoolError { reason: e.to_string() })??;

    let samples: usize = exported.iter().map(|e| e.samples).sum();
    logging::log_success(&format!("Exported {} recording(s), {} samples", exported.len(), samples));
    Ok(())
}
