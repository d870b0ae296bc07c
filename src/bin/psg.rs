//! PSG CLI - Command-line interface for Synheart PSG
//!
//! Commands:
//! - analyze: Analyze decoded recordings (one report per file)
//! - config: Print the default configuration
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use synheart_psg::batch::{BatchProcessor, FileOutcome};
use synheart_psg::config::AnalysisConfig;
use synheart_psg::{AnalysisError, PRODUCER_NAME, PSG_VERSION};

/// PSG - Deterministic polysomnography analysis
#[derive(Parser)]
#[command(name = "psg")]
#[command(author = "Synheart AI Inc")]
#[command(version = PSG_VERSION)]
#[command(about = "Analyze overnight PSG recordings into sleep reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze decoded recordings (JSON)
    Analyze {
        /// Recording files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Configuration file (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Worker threads (overrides the configuration)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Directory for `<input stem>.report.json` files (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        format: OutputFormat,
    },

    /// Print the default configuration
    Config {
        #[arg(long, default_value = "toml")]
        format: ConfigFormat,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Configuration file to check
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one outcome per line)
    Ndjson,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum ConfigFormat {
    Toml,
    Json,
}

fn main() -> ExitCode {
    // Logs go to stderr so reports on stdout stay machine readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PsgCliError> {
    match cli.command {
        Commands::Analyze {
            files,
            config,
            workers,
            output,
            format,
        } => cmd_analyze(&files, config.as_deref(), workers, output.as_deref(), format),
        Commands::Config { format } => cmd_config(format),
        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, PsgCliError> {
    match path {
        Some(path) => Ok(AnalysisConfig::load(path)?),
        None => Ok(AnalysisConfig::default()),
    }
}

fn cmd_analyze(
    files: &[PathBuf],
    config_path: Option<&Path>,
    workers: Option<usize>,
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<(), PsgCliError> {
    let mut config = load_config(config_path)?;
    if let Some(workers) = workers {
        config.batch.workers = workers;
    }

    // Resolve report names up front so a collision fails before any work
    let names = match output {
        Some(_) => report_file_names(files)?,
        None => Vec::new(),
    };

    let batch = BatchProcessor::new(config)?;
    let outcomes = batch.process_files(files);

    match output {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            for (outcome, name) in outcomes.iter().zip(names) {
                fs::write(dir.join(name), format_outcome(outcome, &OutputFormat::JsonPretty)?)?;
            }
        }
        None => {
            for outcome in &outcomes {
                println!("{}", format_outcome(outcome, &format)?);
            }
        }
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        Err(PsgCliError::FilesFailed(failed, outcomes.len()))
    } else {
        Ok(())
    }
}

/// `<input stem>.report.json` per input file.
///
/// Names come from the input path, never from the recording id inside the
/// file. Two inputs mapping to the same name are an error.
fn report_file_names(files: &[PathBuf]) -> Result<Vec<String>, PsgCliError> {
    let mut seen: HashMap<String, &Path> = HashMap::new();
    let mut names = Vec::with_capacity(files.len());

    for path in files {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| PsgCliError::OutputName(path.display().to_string()))?;
        let name = format!("{stem}.report.json");
        if let Some(previous) = seen.insert(name.clone(), path) {
            return Err(PsgCliError::OutputCollision {
                name,
                first: previous.display().to_string(),
                second: path.display().to_string(),
            });
        }
        names.push(name);
    }
    Ok(names)
}

fn format_outcome(outcome: &FileOutcome, format: &OutputFormat) -> Result<String, PsgCliError> {
    let text = match format {
        OutputFormat::Ndjson => serde_json::to_string(outcome)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(outcome)?,
    };
    Ok(text)
}

fn cmd_config(format: ConfigFormat) -> Result<(), PsgCliError> {
    let config = AnalysisConfig::default();
    match format {
        ConfigFormat::Toml => print!("{}", config.to_toml()?),
        ConfigFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), PsgCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "psg_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("PSG version {}", PSG_VERSION),
    });

    let config = match config_path {
        Some(path) if !path.exists() => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Config file {} does not exist", path.display()),
            });
            None
        }
        Some(path) => match AnalysisConfig::load(path) {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Config file {} is valid", path.display()),
                });
                Some(config)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                });
                None
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "Using built-in defaults".to_string(),
            });
            Some(AnalysisConfig::default())
        }
    };

    if let Some(config) = config {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let status = if config.batch.workers > available {
            CheckStatus::Warning
        } else {
            CheckStatus::Ok
        };
        checks.push(DoctorCheck {
            name: "workers".to_string(),
            status,
            message: format!(
                "{} workers configured, {} CPUs available",
                config.batch.workers, available
            ),
        });
    }

    let stdout_check = if atty::is(atty::Stream::Stdout) {
        "stdout is a TTY (reports print to the terminal)"
    } else {
        "stdout is a pipe (NDJSON reports ready for downstream tools)"
    };
    checks.push(DoctorCheck {
        name: "stdout".to_string(),
        status: CheckStatus::Ok,
        message: stdout_check.to_string(),
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PSG_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("PSG Doctor Report");
        println!("=================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PsgCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum PsgCliError {
    Io(io::Error),
    Analysis(AnalysisError),
    Json(serde_json::Error),
    FilesFailed(usize, usize),
    OutputName(String),
    OutputCollision {
        name: String,
        first: String,
        second: String,
    },
    DoctorFailed,
}

impl From<io::Error> for PsgCliError {
    fn from(e: io::Error) -> Self {
        PsgCliError::Io(e)
    }
}

impl From<AnalysisError> for PsgCliError {
    fn from(e: AnalysisError) -> Self {
        PsgCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for PsgCliError {
    fn from(e: serde_json::Error) -> Self {
        PsgCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PsgCliError> for CliError {
    fn from(e: PsgCliError) -> Self {
        match e {
            PsgCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PsgCliError::Analysis(e @ AnalysisError::Configuration(_))
            | PsgCliError::Analysis(e @ AnalysisError::TomlError(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'psg config' for a valid starting point".to_string()),
            },
            PsgCliError::Analysis(e) => CliError {
                code: "ANALYSIS_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            PsgCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PsgCliError::FilesFailed(failed, total) => CliError {
                code: "FILES_FAILED".to_string(),
                message: format!("{} of {} recordings failed", failed, total),
                hint: Some("See the error field of each failed outcome".to_string()),
            },
            PsgCliError::OutputName(path) => CliError {
                code: "OUTPUT_NAME".to_string(),
                message: format!("Cannot derive a report file name from {}", path),
                hint: Some("Pass recording files with a regular file name".to_string()),
            },
            PsgCliError::OutputCollision { name, first, second } => CliError {
                code: "OUTPUT_COLLISION".to_string(),
                message: format!("{} and {} would both write {}", first, second, name),
                hint: Some("Rename one input or analyze them in separate runs".to_string()),
            },
            PsgCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
