//! Glucoscope CLI - Command-line interface for Glucoscope
//!
//! Commands:
//! - analyze: Run the pipeline and print the report
//! - export: Write the per-event combination table as CSV
//! - explore: Step through the high/low combinations and print band curves
//! - top: Rank foods by carbohydrate or sugar content
//! - validate: Report malformed rows and excluded events
//! - doctor: Diagnose configuration and environment
//! - config: Print the effective configuration

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use glucoscope::cohort::SpikeDistribution;
use glucoscope::export::write_combination_table;
use glucoscope::ranking::{top_foods_by, RankedFood};
use glucoscope::types::{BandCurve, CohortGroup, GlucoseReport, Nutrient};
use glucoscope::{logging, ComputeError, GlucoseProcessor, LoadedDataset, PipelineConfig, RecordLoader};
use glucoscope::{GLUCOSCOPE_VERSION, PRODUCER_NAME};

/// Glucoscope - Post-meal glucose response analysis
#[derive(Parser)]
#[command(name = "glucoscope")]
#[command(version = GLUCOSCOPE_VERSION)]
#[command(about = "Analyze glucose responses to logged meals", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides config; RUST_LOG overrides both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and print the report
    Analyze {
        #[command(flatten)]
        input: InputArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Write the per-event combination table as CSV
    Export {
        #[command(flatten)]
        input: InputArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Step through the high/low combinations and print band curves
    Explore {
        #[command(flatten)]
        input: InputArgs,

        /// Number of combinations to step through (default: all)
        #[arg(long)]
        steps: Option<usize>,

        /// Histogram bin width for member spikes (mg/dL)
        #[arg(long, default_value = "10")]
        bin_width: f64,
    },

    /// Rank foods by carbohydrate or sugar content
    Top {
        #[command(flatten)]
        input: InputArgs,

        /// Nutrient to rank by
        #[arg(long, default_value = "carb")]
        by: RankBy,

        /// Number of foods to list
        #[arg(long, default_value = "5")]
        limit: usize,
    },

    /// Report malformed rows and excluded events
    Validate {
        #[command(flatten)]
        input: InputArgs,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
struct InputArgs {
    /// Input file path (use - for stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Separate food log; `input` is then the CGM export
    #[arg(long)]
    food: Option<PathBuf>,

    /// Input format
    #[arg(long, default_value = "csv")]
    input_format: InputFormat,

    /// Leading data rows to strip (overrides config)
    #[arg(long)]
    header_rows: Option<usize>,
}

/// Smallest accepted histogram bin width (mg/dL)
const MIN_BIN_WIDTH: f64 = 0.1;

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// CSV with glucose and/or food columns
    Csv,
    /// Newline-delimited typed records
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Single-line JSON followed by a newline
    Ndjson,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum RankBy {
    Carb,
    Sugar,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), GlucoscopeCliError> {
    if let Commands::Doctor { json } = cli.command {
        return cmd_doctor(cli.config.as_deref(), json);
    }

    let mut config = PipelineConfig::load_or_default(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    logging::init(&config.logging);

    match cli.command {
        Commands::Analyze {
            input,
            output,
            output_format,
        } => cmd_analyze(config, &input, &output, output_format),

        Commands::Export { input, output } => cmd_export(config, &input, &output),

        Commands::Explore {
            input,
            steps,
            bin_width,
        } => cmd_explore(config, &input, steps, bin_width),

        Commands::Top { input, by, limit } => cmd_top(config, &input, by, limit),

        Commands::Validate { input, json } => cmd_validate(config, &input, json),

        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }

        Commands::Doctor { .. } => unreachable!("handled before config load"),
    }
}

fn cmd_analyze(
    config: PipelineConfig,
    input: &InputArgs,
    output: &Path,
    output_format: OutputFormat,
) -> Result<(), GlucoscopeCliError> {
    let (processor, dataset) = prepare(config, input)?;
    let report = processor.process_dataset(&dataset, &dataset_name(&input.input));
    let output_data = format_output(&report, &output_format)?;
    write_output(output, output_data.as_bytes())
}

fn cmd_export(
    config: PipelineConfig,
    input: &InputArgs,
    output: &Path,
) -> Result<(), GlucoscopeCliError> {
    let (processor, dataset) = prepare(config, input)?;
    let (summarized, _) = processor.summarize(&dataset.series, &dataset.events);

    let mut buffer = Vec::new();
    write_combination_table(&summarized, &mut buffer)?;
    write_output(output, &buffer)
}

fn cmd_explore(
    config: PipelineConfig,
    input: &InputArgs,
    steps: Option<usize>,
    bin_width: f64,
) -> Result<(), GlucoscopeCliError> {
    if !(bin_width.is_finite() && bin_width >= MIN_BIN_WIDTH) {
        return Err(GlucoscopeCliError::InvalidArgument(format!(
            "--bin-width must be a finite number of at least {}, got {}",
            MIN_BIN_WIDTH, bin_width
        )));
    }
    let (processor, dataset) = prepare(config, input)?;
    let (summarized, _) = processor.summarize(&dataset.series, &dataset.events);
    let mut explorer = processor.explorer(summarized);

    let mut stdout = io::stdout();
    let limit = steps.unwrap_or(usize::MAX);
    let mut taken = 0;

    while taken < limit {
        let Some(group) = explorer.step() else {
            break;
        };
        taken += 1;

        let distribution = processor
            .aggregator()
            .distribution(explorer.summarized(), &group.key, bin_width);
        let line = ExploreStep {
            step: taken,
            combination: group.key.label(),
            explored: explorer.history().len(),
            group: &group,
            distribution,
            bands: explorer.band_curves(),
        };
        writeln!(stdout, "{}", serde_json::to_string(&line)?)?;
    }

    stdout.flush()?;
    Ok(())
}

fn cmd_top(
    config: PipelineConfig,
    input: &InputArgs,
    by: RankBy,
    limit: usize,
) -> Result<(), GlucoscopeCliError> {
    let (processor, dataset) = prepare(config, input)?;
    let (summarized, _) = processor.summarize(&dataset.series, &dataset.events);

    let nutrient = match by {
        RankBy::Carb => Nutrient::Carb,
        RankBy::Sugar => Nutrient::Sugar,
    };
    let ranked: Vec<RankedFood> = top_foods_by(&summarized, nutrient, limit);
    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}

fn cmd_validate(
    config: PipelineConfig,
    input: &InputArgs,
    json: bool,
) -> Result<(), GlucoscopeCliError> {
    let (processor, dataset) = prepare(config, input)?;
    let (_, alignment) = processor.summarize(&dataset.series, &dataset.events);

    let report = ValidationReport {
        rows_read: dataset.report.rows_read,
        header_rows_skipped: dataset.report.header_rows_skipped,
        readings: dataset.report.readings,
        food_events: dataset.report.food_events,
        duplicate_timestamps: dataset.report.duplicate_timestamps,
        malformed_rows: dataset
            .report
            .malformed
            .iter()
            .map(|m| m.to_string())
            .collect(),
        excluded_events: alignment
            .excluded
            .iter()
            .map(|e| format!("{} at {}", e.event.label, e.event.timestamp.to_rfc3339()))
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Rows read:            {}", report.rows_read);
        println!("Header rows skipped:  {}", report.header_rows_skipped);
        println!("Glucose readings:     {}", report.readings);
        println!("Food events:          {}", report.food_events);
        println!("Duplicate timestamps: {}", report.duplicate_timestamps);
        println!("Malformed rows:       {}", report.malformed_rows.len());
        println!("Excluded events:      {}", report.excluded_events.len());

        if !report.malformed_rows.is_empty() {
            println!("\nMalformed rows:");
            for row in &report.malformed_rows {
                println!("  - {}", row);
            }
        }
        if !report.excluded_events.is_empty() {
            println!("\nExcluded (no baseline reading):");
            for event in &report.excluded_events {
                println!("  - {}", event);
            }
        }
    }

    if report.malformed_rows.is_empty() {
        Ok(())
    } else {
        Err(GlucoscopeCliError::ValidationFailed(
            report.malformed_rows.len(),
        ))
    }
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), GlucoscopeCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "glucoscope_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Glucoscope version {}", GLUCOSCOPE_VERSION),
    });

    // Check config file if provided
    let config_check = match config_path {
        None => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "No config file given, using defaults".to_string(),
        },
        Some(path) if !path.exists() => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Config file does not exist".to_string(),
        },
        Some(path) => match PipelineConfig::load_from(path) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid ({} buckets of {} min, spike horizon {} min)",
                    config.windows.bucket_count(),
                    config.windows.bucket_width_minutes,
                    config.windows.spike_horizon_minutes
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        },
    };
    checks.push(config_check);

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (use -i - to read it)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: GLUCOSCOPE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Glucoscope Doctor Report");
        println!("========================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(GlucoscopeCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn prepare(
    mut config: PipelineConfig,
    input: &InputArgs,
) -> Result<(GlucoseProcessor, LoadedDataset), GlucoscopeCliError> {
    if let Some(rows) = input.header_rows {
        config.input.header_rows = rows;
    }
    let processor = GlucoseProcessor::with_config(config)?;
    let dataset = load_dataset(processor.config(), input)?;

    if dataset.series.is_empty() {
        return Err(GlucoscopeCliError::NoReadings);
    }
    if dataset.events.is_empty() {
        return Err(GlucoscopeCliError::NoEvents);
    }
    Ok((processor, dataset))
}

fn load_dataset(
    config: &PipelineConfig,
    input: &InputArgs,
) -> Result<LoadedDataset, GlucoscopeCliError> {
    let input_data = read_input(&input.input)?;
    let header_rows = config.input.header_rows;

    let dataset = match (&input.food, &input.input_format) {
        (Some(food_path), _) => {
            let food_data = read_input(food_path)?;
            RecordLoader::load_separate(&input_data, &food_data, &config.columns, header_rows)?
        }
        (None, InputFormat::Csv) => {
            RecordLoader::parse_csv(&input_data, &config.columns, header_rows)?
        }
        (None, InputFormat::Ndjson) => RecordLoader::parse_ndjson(&input_data)?,
    };
    Ok(dataset)
}

fn read_input(path: &Path) -> Result<String, GlucoscopeCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn write_output(path: &Path, data: &[u8]) -> Result<(), GlucoscopeCliError> {
    if path.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(data)?;
        stdout.flush()?;
    } else {
        fs::write(path, data)?;
    }
    Ok(())
}

fn dataset_name(path: &Path) -> String {
    if path.to_string_lossy() == "-" {
        "stdin".to_string()
    } else {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }
}

fn format_output(
    report: &GlucoseReport,
    format: &OutputFormat,
) -> Result<String, GlucoscopeCliError> {
    match format {
        OutputFormat::Ndjson => Ok(serde_json::to_string(report)? + "\n"),
        OutputFormat::Json => Ok(serde_json::to_string(report)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(report)? + "\n"),
    }
}

// Error types

#[derive(Debug)]
enum GlucoscopeCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoReadings,
    NoEvents,
    InvalidArgument(String),
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for GlucoscopeCliError {
    fn from(e: io::Error) -> Self {
        GlucoscopeCliError::Io(e)
    }
}

impl From<ComputeError> for GlucoscopeCliError {
    fn from(e: ComputeError) -> Self {
        GlucoscopeCliError::Compute(e)
    }
}

impl From<serde_json::Error> for GlucoscopeCliError {
    fn from(e: serde_json::Error) -> Self {
        GlucoscopeCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<GlucoscopeCliError> for CliError {
    fn from(e: GlucoscopeCliError) -> Self {
        match e {
            GlucoscopeCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            GlucoscopeCliError::Compute(e @ ComputeError::MissingColumn(_)) => CliError {
                code: "MISSING_COLUMN".to_string(),
                message: e.to_string(),
                hint: Some("Map the column names in the [columns] config section".to_string()),
            },
            GlucoscopeCliError::Compute(
                e @ (ComputeError::ConfigError(_) | ComputeError::InvalidConfig(_)),
            ) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'glucoscope doctor --config <file>' for details".to_string()),
            },
            GlucoscopeCliError::Compute(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the input format and column names".to_string()),
            },
            GlucoscopeCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            GlucoscopeCliError::NoReadings => CliError {
                code: "NO_READINGS".to_string(),
                message: "No glucose readings found in input".to_string(),
                hint: Some("Check the glucose column name and --header-rows".to_string()),
            },
            GlucoscopeCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No food events found in input".to_string(),
                hint: Some("Pass the food log with --food if it is a separate file".to_string()),
            },
            GlucoscopeCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: Some("Run 'glucoscope --help' for accepted values".to_string()),
            },
            GlucoscopeCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} rows are malformed", count),
                hint: Some("Fix or remove the listed rows and retry".to_string()),
            },
            GlucoscopeCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ExploreStep<'a> {
    step: usize,
    combination: String,
    explored: usize,
    group: &'a CohortGroup,
    distribution: SpikeDistribution,
    bands: Vec<BandCurve>,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    rows_read: usize,
    header_rows_skipped: usize,
    readings: usize,
    food_events: usize,
    duplicate_timestamps: usize,
    malformed_rows: Vec<String>,
    excluded_events: Vec<String>,
}

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
