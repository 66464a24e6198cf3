//! MoodLens CLI - Command-line interface for MoodLens
//!
//! Commands:
//! - classify: Continuous detection over recorded landmark frames (streaming)
//! - capture: Discrete capture from a recorded frame sequence
//! - history: Show the stored mood history and its weekly summary
//! - doctor: Diagnose history file and configuration
//! - schema: Print input and output layouts

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{mpsc, Arc};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use moodlens::analytics::{summarize, MoodSummary};
use moodlens::capability::ReplayProvider;
use moodlens::history::{FileBackend, MemoryBackend, MoodHistoryStore, HISTORY_SLOT};
use moodlens::pipeline::{CaptureOutcome, CapturePipeline, FrameClassification, FrameOutcome, PipelineEvent};
use moodlens::types::{DailyMoodEntry, FrameRecord, LandmarkFrame};
use moodlens::{ComputeError, PipelineConfig, MOODLENS_VERSION, PRODUCER_NAME};

/// MoodLens - On-device emotion estimation from facial landmarks
#[derive(Parser)]
#[command(name = "moodlens")]
#[command(version = MOODLENS_VERSION)]
#[command(about = "Classify facial landmark frames into moods and track daily history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that run a capture session
#[derive(clap::Args)]
struct SessionArgs {
    /// Pipeline config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mood history file; counts are kept in memory when omitted
    #[arg(long)]
    history: Option<PathBuf>,

    /// Frames in the smoothing window
    #[arg(long)]
    smoothing_window: Option<usize>,

    /// Offset from UTC in minutes used for day buckets
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<i32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every frame and record throttled history (continuous mode)
    Classify {
        /// Input file of NDJSON frame records (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        #[command(flatten)]
        session: SessionArgs,

        /// Minimum seconds between history writes
        #[arg(long)]
        write_interval: Option<u64>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Capture a single mood from recorded frames (discrete mode)
    Capture {
        /// Input file of NDJSON frame records (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        #[command(flatten)]
        session: SessionArgs,

        /// Snapshots to try before giving up when no face is found
        #[arg(long, default_value = "10")]
        attempts: usize,
    },

    /// Show the stored mood history
    History {
        /// Mood history file
        #[arg(long)]
        history: PathBuf,

        /// Calendar days kept in the history
        #[arg(long, default_value = "7")]
        days: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose history file and configuration
    Doctor {
        /// Check mood history file
        #[arg(long)]
        history: Option<PathBuf>,

        /// Check pipeline config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one outcome per line)
    Ndjson,
    /// JSON array of outcomes
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Frame record input
    Input,
    /// Per-frame outcome output
    Output,
    /// Persisted mood history
    History,
}

fn main() -> ExitCode {
    init_logging();
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

/// Logs go to stderr so stdout stays machine-readable. Level from `RUST_LOG`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), MoodCliError> {
    match cli.command {
        Commands::Classify {
            input,
            session,
            write_interval,
            output_format,
            flush,
        } => {
            let mut config = load_config(&session)?;
            if let Some(secs) = write_interval {
                config.write_interval_secs = secs;
            }
            cmd_classify(&input, &session, config, output_format, flush)
        }

        Commands::Capture {
            input,
            session,
            attempts,
        } => {
            let config = load_config(&session)?;
            cmd_capture(&input, &session, config, attempts)
        }

        Commands::History {
            history,
            days,
            json,
        } => cmd_history(&history, days, json),

        Commands::Doctor {
            history,
            config,
            json,
        } => cmd_doctor(history.as_deref(), config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_classify(
    input: &Path,
    session: &SessionArgs,
    config: PipelineConfig,
    output_format: OutputFormat,
    flush: bool,
) -> Result<(), MoodCliError> {
    let store = open_store(session.history.as_deref(), config.history_days);
    let mut pipeline = CapturePipeline::with_config(ReplayProvider::new(Vec::new()), store, config)?;
    start_session(&mut pipeline)?;
    info!(session = %pipeline.session_id(), "continuous detection started");

    let mut stdout = io::stdout();
    let mut reports: Vec<FrameReport> = Vec::new();
    let mut frames = 0usize;

    for (index, record) in read_frame_records(input)?.enumerate() {
        let record = record?;
        let at = record.timestamp.unwrap_or_else(Utc::now);
        let outcome = pipeline.on_frame_at(&record.landmarks, at)?;
        frames += 1;

        let report = FrameReport {
            index,
            timestamp: at.to_rfc3339(),
            outcome,
        };

        match output_format {
            OutputFormat::Ndjson => {
                writeln!(stdout, "{}", serde_json::to_string(&report)?)?;
                if flush {
                    stdout.flush()?;
                }
            }
            OutputFormat::Json | OutputFormat::JsonPretty => reports.push(report),
        }
    }

    if frames == 0 {
        return Err(MoodCliError::NoFrames);
    }

    match output_format {
        OutputFormat::Ndjson => {}
        OutputFormat::Json => writeln!(stdout, "{}", serde_json::to_string(&reports)?)?,
        OutputFormat::JsonPretty => writeln!(stdout, "{}", serde_json::to_string_pretty(&reports)?)?,
    }
    stdout.flush()?;

    pipeline.stop();
    Ok(())
}

fn cmd_capture(
    input: &Path,
    session: &SessionArgs,
    config: PipelineConfig,
    attempts: usize,
) -> Result<(), MoodCliError> {
    let frames: Vec<LandmarkFrame> = read_frame_records(input)?
        .map(|record| record.map(|r| r.landmarks))
        .collect::<Result<_, _>>()?;
    if frames.is_empty() {
        return Err(MoodCliError::NoFrames);
    }

    let store = open_store(session.history.as_deref(), config.history_days);
    let (tx, rx) = mpsc::channel();
    let mut pipeline =
        CapturePipeline::with_config(ReplayProvider::new(frames), store, config)?.with_event_channel(tx);
    start_session(&mut pipeline)?;

    let mut captured: Option<FrameClassification> = None;
    let mut tried = 0usize;
    while tried < attempts.max(1) {
        tried += 1;
        match pipeline.capture()? {
            CaptureOutcome::Captured(classification) => {
                captured = Some(classification);
                break;
            }
            CaptureOutcome::NoFace => debug!(attempt = tried, "no face detected, retrying"),
            CaptureOutcome::Skipped { reason } => debug!(attempt = tried, %reason, "snapshot skipped, retrying"),
        }
    }

    let classification = captured.ok_or(MoodCliError::NoFaceDetected(tried))?;
    let report = CaptureReport {
        session_id: pipeline.session_id().to_string(),
        attempts: tried,
        label: classification.smoothed.to_string(),
        classification,
        events: rx.try_iter().collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    pipeline.reset()?;
    Ok(())
}

fn cmd_history(path: &Path, days: usize, json: bool) -> Result<(), MoodCliError> {
    if days == 0 {
        return Err(MoodCliError::Compute(ComputeError::ConfigError(
            "days must be at least 1".to_string(),
        )));
    }
    // An absent file loads as an empty history
    let store = MoodHistoryStore::with_window(FileBackend::new(path), days);
    let history = store.load();
    let summary = summarize(&history);

    if json {
        let report = HistoryReport {
            entries: history.entries().cloned().collect(),
            summary,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Mood History");
    println!("============");
    if summary.is_empty() {
        println!("No moods recorded yet");
        return Ok(());
    }

    println!(
        "{:<12} {:>6} {:>6} {:>6} {:>9} {:>8}  {}",
        "date", "happy", "sad", "angry", "surprised", "neutral", "dominant"
    );
    for entry in history.entries() {
        let c = &entry.counts;
        println!(
            "{:<12} {:>6} {:>6} {:>6} {:>9} {:>8}  {}",
            entry.date.to_string(),
            c.happy,
            c.sad,
            c.angry,
            c.surprised,
            c.neutral,
            c.dominant().map(|l| l.as_str()).unwrap_or("-")
        );
    }

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &MoodSummary) {
    println!();
    println!("Total captures: {} over {} days", summary.total, summary.days);
    if let Some(dominant) = summary.dominant {
        println!("Most frequent:  {}", dominant);
    }
    for share in &summary.shares {
        println!("  {:<10} {:>5.1}%", share.label.as_str(), share.share * 100.0);
    }
}

fn cmd_doctor(history: Option<&Path>, config: Option<&Path>, json: bool) -> Result<(), MoodCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "moodlens_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("MoodLens version {}", MOODLENS_VERSION),
    });

    if let Some(config_path) = config {
        let check = match fs::read_to_string(config_path) {
            Ok(content) => match PipelineConfig::from_json(&content) {
                Ok(config) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (window {}, {} days, writes every {}s)",
                        config.smoothing_window, config.history_days, config.write_interval_secs
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid config: {}", e),
                },
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read config file: {}", e),
            },
        };
        checks.push(check);
    }

    if let Some(history_path) = history {
        checks.push(check_history(history_path));
    }

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
            message: "stdin is a pipe (frame streaming ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: MOODLENS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("MoodLens Doctor Report");
        println!("======================");
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
        Err(MoodCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

/// Corrupt history is a warning: the store starts over rather than failing
fn check_history(path: &Path) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: "history".to_string(),
            status: CheckStatus::Warning,
            message: "History file does not exist (starts empty)".to_string(),
        };
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Vec<DailyMoodEntry>>(&content) {
            Ok(entries) => DoctorCheck {
                name: "history".to_string(),
                status: CheckStatus::Ok,
                message: format!("History file valid ({} days recorded)", entries.len()),
            },
            Err(e) => DoctorCheck {
                name: "history".to_string(),
                status: CheckStatus::Warning,
                message: format!("History unreadable, will be replaced on next write: {}", e),
            },
        },
        Err(e) => DoctorCheck {
            name: "history".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read history file: {}", e),
        },
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), MoodCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input: one frame record per line (NDJSON)");
                println!();
                println!("- timestamp: RFC 3339 capture time (optional, defaults to now)");
                println!("- landmarks: array of {{ x, y, z }} normalized face-mesh points");
                println!("  - empty array means no face was detected");
                println!("  - indices 13, 14, 61, 70, 145, 159, 291, 300, 374, 386 are read");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output: one outcome per input frame");
                println!();
                println!("- index, timestamp");
                println!("- outcome.outcome: classified | no_face | skipped");
                println!("- classified frames carry:");
                println!("  - features: {{ mouth_ratio, eye_openness, brow_raised, is_smiling }}");
                println!("  - rule: the classification rule that fired");
                println!("  - raw: label for this frame, smoothed: majority over the window");
                println!("  - changed: smoothed label differs from the last one");
                println!("  - persisted: frame was counted in the history");
            }
        }
        SchemaType::History => {
            if json_schema {
                println!("{}", get_history_json_schema());
            } else {
                println!("History slot: {}", HISTORY_SLOT);
                println!();
                println!("JSON array, oldest day first, at most 7 entries, one per date:");
                println!("- date: YYYY-MM-DD");
                println!("- happy, sad, angry, surprised, neutral: capture counts");
            }
        }
    }

    Ok(())
}

// Helper functions

fn load_config(session: &SessionArgs) -> Result<PipelineConfig, MoodCliError> {
    let mut config = match &session.config {
        Some(path) => PipelineConfig::from_json(&fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };
    if let Some(window) = session.smoothing_window {
        config.smoothing_window = window;
    }
    if let Some(offset) = session.utc_offset {
        config.utc_offset_minutes = offset;
    }
    config.validate()?;
    Ok(config)
}

fn open_store(history: Option<&Path>, days: usize) -> Arc<MoodHistoryStore> {
    let store = match history {
        Some(path) => MoodHistoryStore::with_window(FileBackend::new(path), days),
        None => MoodHistoryStore::with_window(MemoryBackend::new(), days),
    };
    Arc::new(store)
}

/// Acquire the replay capability on a single-threaded runtime
fn start_session(pipeline: &mut CapturePipeline<ReplayProvider>) -> Result<(), MoodCliError> {
    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    runtime.block_on(pipeline.start())?;
    Ok(())
}

fn read_frame_records(
    input: &Path,
) -> Result<impl Iterator<Item = Result<FrameRecord, MoodCliError>>, MoodCliError> {
    let reader: Box<dyn BufRead> = if input.to_string_lossy() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(fs::File::open(input)?))
    };

    Ok(reader.lines().enumerate().filter_map(|(line_no, line)| {
        let line = match line {
            Ok(line) => line,
            Err(e) => return Some(Err(MoodCliError::Io(e))),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(serde_json::from_str::<FrameRecord>(trimmed).map_err(|e| {
            MoodCliError::ParseError(format!("Failed to parse frame on line {}: {}", line_no + 1, e))
        }))
    }))
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "moodlens.frame_record",
        "description": "One face-mesh landmark frame",
        "type": "object",
        "properties": {
            "timestamp": { "type": "string", "format": "date-time" },
            "landmarks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["x", "y"],
                    "properties": {
                        "x": { "type": "number" },
                        "y": { "type": "number" },
                        "z": { "type": "number" }
                    }
                }
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    let label = serde_json::json!({
        "type": "string",
        "enum": ["happy", "sad", "angry", "surprised", "neutral"]
    });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "moodlens.frame_report",
        "type": "object",
        "required": ["index", "timestamp", "outcome"],
        "properties": {
            "index": { "type": "integer" },
            "timestamp": { "type": "string", "format": "date-time" },
            "outcome": {
                "type": "object",
                "required": ["outcome"],
                "properties": {
                    "outcome": { "type": "string", "enum": ["classified", "no_face", "skipped"] },
                    "reason": { "type": "string" },
                    "features": {
                        "type": "object",
                        "properties": {
                            "mouth_ratio": { "type": "number" },
                            "eye_openness": { "type": "number" },
                            "brow_raised": { "type": "boolean" },
                            "is_smiling": { "type": "boolean" }
                        }
                    },
                    "rule": { "type": "string" },
                    "raw": label,
                    "smoothed": label,
                    "changed": { "type": "boolean" },
                    "persisted": { "type": "boolean" }
                }
            }
        }
    })
    .to_string()
}

fn get_history_json_schema() -> String {
    let count = serde_json::json!({ "type": "integer", "minimum": 0 });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "moodlens.mood_history",
        "type": "array",
        "maxItems": 7,
        "items": {
            "type": "object",
            "required": ["date", "happy", "sad", "angry", "surprised", "neutral"],
            "properties": {
                "date": { "type": "string", "format": "date" },
                "happy": count,
                "sad": count,
                "angry": count,
                "surprised": count,
                "neutral": count
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum MoodCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoFrames,
    NoFaceDetected(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for MoodCliError {
    fn from(e: io::Error) -> Self {
        MoodCliError::Io(e)
    }
}

impl From<ComputeError> for MoodCliError {
    fn from(e: ComputeError) -> Self {
        MoodCliError::Compute(e)
    }
}

impl From<serde_json::Error> for MoodCliError {
    fn from(e: serde_json::Error) -> Self {
        MoodCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<MoodCliError> for CliError {
    fn from(e: MoodCliError) -> Self {
        match e {
            MoodCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            MoodCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::CapabilityAcquisition(_) | ComputeError::Capability(_) => {
                        ("CAPABILITY_ERROR", "Check camera access and the landmark model")
                    }
                    ComputeError::ConfigError(_) => ("CONFIG_ERROR", "Run 'moodlens doctor --config <file>'"),
                    ComputeError::Persistence(_) => ("PERSISTENCE_ERROR", "Check the history file location"),
                    _ => ("COMPUTE_ERROR", "Run 'moodlens schema input' for the frame layout"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            MoodCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            MoodCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            MoodCliError::NoFaceDetected(attempts) => CliError {
                code: "NO_FACE".to_string(),
                message: format!("No face detected after {} attempts", attempts),
                hint: Some("Face the camera in good lighting and retry".to_string()),
            },
            MoodCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            MoodCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'moodlens schema input' for the frame layout".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct FrameReport {
    index: usize,
    timestamp: String,
    outcome: FrameOutcome,
}

#[derive(Serialize)]
struct CaptureReport {
    session_id: String,
    attempts: usize,
    label: String,
    classification: FrameClassification,
    events: Vec<PipelineEvent>,
}

#[derive(Serialize)]
struct HistoryReport {
    entries: Vec<DailyMoodEntry>,
    summary: MoodSummary,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
