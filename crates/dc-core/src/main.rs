//! Drive Cycles Core - activity cycle detection CLI
//!
//! Reads per-vehicle telemetry series, detects trips or charging sessions
//! with a configured detector and writes cycle points as JSON lines.

use clap::{Args, Parser, Subcommand};
use dc_common::{format_error_human, OutputFormat, StructuredError, TimeEpoch, SCHEMA_VERSION};
use dc_config::{list_presets, load_detector, ConfigError, PresetName, CONFIG_SCHEMA_VERSION};
use dc_core::events::{JsonlWriter, ProgressEmitter};
use dc_core::exit_codes::ExitCode;
use dc_core::log_event;
use dc_core::logging::{event_names, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage};
use dc_core::pipeline::{run_pipeline, PipelineOptions, PipelineSummary};
use dc_core::sink::{CycleSink, JsonlSink};
use dc_core::source::{jsonl_files, JsonlSource, Prefetch, SampleSource, DEFAULT_BATCH_SIZE};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

/// Drive Cycles Core - detect trips and charging sessions in vehicle telemetry
#[derive(Parser)]
#[command(name = "dc-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Log level (overrides DC_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format on stderr: human or jsonl (overrides DC_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect cycles in one or more series
    Detect(DetectArgs),

    /// List built-in detector presets
    Presets,

    /// Inspect the effective detector configuration
    Config(ConfigArgs),

    /// Show version information
    Version,
}

#[derive(Args, Debug)]
struct DetectorSelection {
    /// Detector configuration file (.toml or .json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Preset used when no configuration file is found
    #[arg(long, short = 'p', default_value = "trip")]
    preset: PresetName,

    /// Unit of the sample time attribute (h, m, s, ms, u, n)
    #[arg(long)]
    epoch: Option<TimeEpoch>,
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Series files (JSON lines) or directories of them
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    detector: DetectorSelection,

    /// Where to write cycle points (JSON lines)
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Series processed in parallel (default: available cores)
    #[arg(long, short = 'j')]
    workers: Option<usize>,

    /// Write per-series diagnostic histograms into this directory
    #[arg(long)]
    diagnostics_dir: Option<PathBuf>,

    /// Lines parsed per read batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Read series on the calling thread instead of prefetching
    #[arg(long)]
    no_prefetch: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show(DetectorSelection),

    /// Load and validate the configuration
    Validate(DetectorSelection),
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Run(#[from] dc_common::Error),

    #[error("invalid arguments: {0}")]
    Args(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Config(_) => ExitCode::ConfigError,
            CliError::Run(err) => ExitCode::from_error(err),
            CliError::Args(_) => ExitCode::ArgsError,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let result = match &cli.command {
        Commands::Detect(args) => run_detect(&cli.global, args),
        Commands::Presets => run_presets(&cli.global),
        Commands::Config(args) => run_config(&cli.global, args),
        Commands::Version => {
            print_version(&cli.global);
            Ok(ExitCode::Clean)
        }
    };

    let exit_code = result.unwrap_or_else(|err| report_error(&cli.global, err));
    std::process::exit(exit_code.as_i32());
}

fn report_error(global: &GlobalOpts, err: CliError) -> ExitCode {
    let exit_code = err.exit_code();
    if let CliError::Config(inner) = &err {
        tracing::error!(event = event_names::CONFIG_ERROR, error = %inner, "configuration rejected");
    }
    let err = match err {
        CliError::Config(inner) => dc_common::Error::from(inner),
        CliError::Run(inner) => inner,
        CliError::Args(message) => dc_common::Error::Config(message),
    };

    if global.format.is_machine() {
        let structured = StructuredError::from(&err).with_context("exit_code", exit_code.code_name());
        println!("{}", structured.to_json());
    } else {
        eprintln!("{}", format_error_human(&err, std::io::stderr().is_terminal()));
    }
    exit_code
}

fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, CliError> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            paths.extend(jsonl_files(input)?);
        } else {
            paths.push(input.clone());
        }
    }
    if paths.is_empty() {
        return Err(CliError::Args("no input series found".to_string()));
    }
    Ok(paths)
}

fn progress_emitter(global: &GlobalOpts) -> Option<Arc<dyn ProgressEmitter>> {
    match global.format {
        OutputFormat::Jsonl => Some(Arc::new(JsonlWriter::new(std::io::stderr()))),
        _ => None,
    }
}

#[derive(Serialize)]
struct DetectReport<'a> {
    schema_version: &'static str,
    exit_code: &'static str,
    config: dc_config::ConfigSnapshot,
    summary: &'a PipelineSummary,
}

fn run_detect(global: &GlobalOpts, args: &DetectArgs) -> Result<ExitCode, CliError> {
    let selection = &args.detector;
    let resolved = load_detector(selection.config.as_deref(), selection.preset, selection.epoch)?;
    let snapshot = resolved.snapshot();

    let mut options = PipelineOptions::default();
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(CliError::Args("--workers must be at least 1".to_string()));
        }
        options = options.with_workers(workers);
    }
    if let Some(dir) = &args.diagnostics_dir {
        options = options.with_diagnostics_dir(dir.clone());
    }
    if let Some(progress) = progress_emitter(global) {
        options = options.with_progress(progress);
    }

    let ctx = LogContext::new(options.run_id.clone());
    log_event!(
        ctx,
        INFO,
        event_names::CONFIG_LOADED,
        Stage::Init,
        "detector configuration loaded",
        detector = resolved.config.name.as_str(),
        source = resolved.source.to_string().as_str(),
        config_hash = snapshot.short_id()
    );

    let paths = expand_inputs(&args.inputs)?;
    let source = JsonlSource::new(paths).with_batch_size(args.batch_size);
    let mut source: Box<dyn SampleSource> = if args.no_prefetch {
        Box::new(source)
    } else {
        Box::new(Prefetch::with_batch_size(source, args.batch_size))
    };

    let mut sink = JsonlSink::create(&args.output)?;
    let summary = run_pipeline(source.as_mut(), &resolved.config, &mut sink, &options)?;
    sink.close()?;

    let exit_code = summary.exit_code();
    match global.format {
        OutputFormat::Json => {
            let report = DetectReport {
                schema_version: SCHEMA_VERSION,
                exit_code: exit_code.code_name(),
                config: snapshot,
                summary: &summary,
            };
            println!("{}", to_pretty_json(&report)?);
        }
        OutputFormat::Jsonl => {
            for outcome in &summary.series {
                println!("{}", serde_json::to_string(outcome).map_err(dc_common::Error::from)?);
            }
        }
        OutputFormat::Summary => {
            println!(
                "[{}] {}: {} series, {} accepted, {} discarded, {} failed",
                summary.run_id,
                summary.detector,
                summary.series.len(),
                summary.accepted(),
                summary.discarded(),
                summary.failures().count()
            );
        }
        OutputFormat::Exitcode => {}
    }
    Ok(exit_code)
}

fn to_pretty_json(value: &impl Serialize) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value).map_err(dc_common::Error::from)?)
}

fn run_presets(global: &GlobalOpts) -> Result<ExitCode, CliError> {
    let presets = list_presets();
    match global.format {
        OutputFormat::Json => println!("{}", to_pretty_json(&presets)?),
        OutputFormat::Jsonl => {
            for preset in &presets {
                println!("{}", serde_json::to_string(preset).map_err(dc_common::Error::from)?);
            }
        }
        OutputFormat::Summary => {
            for preset in &presets {
                println!("{:<18} {}", preset.name, preset.description);
            }
        }
        OutputFormat::Exitcode => {}
    }
    Ok(ExitCode::Clean)
}

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> Result<ExitCode, CliError> {
    match &args.action {
        ConfigAction::Show(selection) => {
            let resolved = load_detector(selection.config.as_deref(), selection.preset, selection.epoch)?;
            match global.format {
                OutputFormat::Json | OutputFormat::Jsonl => {
                    let output = serde_json::json!({
                        "source": resolved.source.to_string(),
                        "path": resolved.path,
                        "snapshot": resolved.snapshot(),
                        "config": resolved.config,
                    });
                    println!("{}", to_pretty_json(&output)?);
                }
                OutputFormat::Summary => print!("{}", resolved.config.to_toml()?),
                OutputFormat::Exitcode => {}
            }
            Ok(ExitCode::Clean)
        }
        ConfigAction::Validate(selection) => {
            let resolved = load_detector(selection.config.as_deref(), selection.preset, selection.epoch)?;
            let snapshot = resolved.snapshot();
            match global.format {
                OutputFormat::Json | OutputFormat::Jsonl => {
                    let output = serde_json::json!({
                        "valid": true,
                        "source": resolved.source.to_string(),
                        "detector": resolved.config.name,
                        "config_hash": snapshot.config_hash,
                    });
                    println!("{}", to_pretty_json(&output)?);
                }
                OutputFormat::Summary => {
                    println!("valid: {} ({})", resolved.config.name, resolved.source);
                }
                OutputFormat::Exitcode => {}
            }
            Ok(ExitCode::Clean)
        }
    }
}

fn print_version(global: &GlobalOpts) {
    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            let output = serde_json::json!({
                "name": "dc-core",
                "version": env!("CARGO_PKG_VERSION"),
                "schema_version": SCHEMA_VERSION,
                "config_schema_version": CONFIG_SCHEMA_VERSION,
            });
            println!("{}", output);
        }
        OutputFormat::Summary => println!("dc-core {}", env!("CARGO_PKG_VERSION")),
        OutputFormat::Exitcode => {}
    }
}
