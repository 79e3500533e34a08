// livesheet - operator front-end for live workbook sessions

mod exit_codes;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use livesheet_config::Settings;
use livesheet_core::preview;
use livesheet_core::remote::{self, RemoteDirectory};
use livesheet_core::{
    classify, ErrorRecorder, LiveSheetError, MatchMode, Resolution, ScriptOutcome, Session,
    StructureConfig, TableStructure, WorkbookConnector,
};

use exit_codes::{
    core_exit_code, EXIT_COLUMN_AMBIGUOUS, EXIT_COLUMN_NOT_FOUND, EXIT_ERROR, EXIT_SUCCESS,
    EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "livesheet")]
#[command(about = "Inspect and drive workbooks open in a live spreadsheet application")]
#[command(version)]
struct Cli {
    /// Settings file to use instead of the platform default
    #[arg(long, global = true, env = "LIVESHEET_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List running live sessions
    Sessions {
        #[arg(long)]
        json: bool,
    },

    /// Structure preview of every sheet in a live workbook
    #[command(after_help = "\
Examples:
  livesheet peek report.xlsx
  livesheet peek 'C:\\data\\report.xlsx' --json")]
    Peek {
        /// Workbook file name or full path
        file: String,
        #[arg(long)]
        json: bool,
    },

    /// Inferred header layout of one sheet
    #[command(after_help = "\
Examples:
  livesheet structure grades.xlsx
  livesheet structure grades.xlsx --config '{\"header_count\": 2}'
  livesheet structure grades.xlsx --config @plan.json --sheet Q2")]
    Structure {
        file: String,
        /// Sheet name (default: the active sheet)
        #[arg(long)]
        sheet: Option<String>,
        /// Structure config as inline JSON or @path
        #[arg(long)]
        config: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Resolve a logical column name against a sheet's header labels
    #[command(after_help = "\
Exit codes: 0 found, 30 ambiguous, 31 not found.")]
    Resolve {
        file: String,
        name: String,
        /// exact | suffix | contains
        #[arg(long, default_value = "suffix")]
        mode: MatchMode,
        #[arg(long)]
        sheet: Option<String>,
        #[arg(long)]
        config: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Classify a script's captured output for a retry loop
    #[command(name = "check-output")]
    #[command(after_help = "\
Exit codes: 0 the script succeeded, 1 it failed.")]
    CheckOutput {
        /// File holding the script's stdout
        #[arg(long)]
        stdout: PathBuf,
        /// File holding the script's stderr
        #[arg(long)]
        stderr: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Sessions { .. } => "sessions",
            Commands::Peek { .. } => "peek",
            Commands::Structure { .. } => "structure",
            Commands::Resolve { .. } => "resolve",
            Commands::CheckOutput { .. } => "check-output",
        }
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // `init` also routes `log` records from the library crates into tracing.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let settings = match load_settings(cli.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => return report(&Settings::default(), cli.command.name(), e),
    };

    let command = cli.command.name();
    let result = match cli.command {
        Commands::Sessions { json } => cmd_sessions(&settings, json),
        Commands::Peek { file, json } => cmd_peek(&settings, &file, json),
        Commands::Structure { file, sheet, config, json } => {
            cmd_structure(&settings, &file, sheet.as_deref(), config.as_deref(), json)
        }
        Commands::Resolve { file, name, mode, sheet, config, json } => {
            cmd_resolve(&settings, &file, &name, mode, sheet.as_deref(), config.as_deref(), json)
        }
        Commands::CheckOutput { stdout, stderr, json } => {
            cmd_check_output(&settings, &stdout, stderr.as_deref(), json)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => report(&settings, command, e),
    }
}

/// Print the error, its hint and the failure marker line on stderr.
fn report(settings: &Settings, command: &str, err: CliError) -> ExitCode {
    if !err.message.is_empty() {
        eprintln!("error: {}", err.message);
    }
    if let Some(hint) = &err.hint {
        eprintln!("hint:  {}", hint);
    }
    eprintln!("{}", ErrorRecorder::detached(&settings.failure_marker, command, &err.message));
    ExitCode::from(err.code)
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }
}

impl From<LiveSheetError> for CliError {
    fn from(err: LiveSheetError) -> Self {
        let hint = match &err {
            LiveSheetError::NotFound { .. } => {
                Some("open the workbook in the spreadsheet application with its session server enabled".to_string())
            }
            LiveSheetError::Bridge(_) => {
                Some("check the session token environment variable and that the application is still running".to_string())
            }
            LiveSheetError::AmbiguousColumn { .. } => {
                Some("use the full flattened label or --mode exact".to_string())
            }
            _ => None,
        };
        Self { code: core_exit_code(&err), message: err.to_string(), hint }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, CliError> {
    match path {
        Some(path) => Settings::load_from(path)
            .map_err(|e| CliError::usage(format!("settings {}: {}", path.display(), e))),
        None => Ok(Settings::load()),
    }
}

/// Inline JSON, or `@path` to read it from a file.
fn parse_structure_config(arg: Option<&str>) -> Result<Option<StructureConfig>, CliError> {
    let Some(arg) = arg else {
        return Ok(None);
    };
    let json = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).map_err(|e| CliError::usage(format!("{path}: {e}")))?,
        None => arg.to_string(),
    };
    StructureConfig::from_json(&json)
        .map(Some)
        .map_err(|e| CliError::usage(e.to_string()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let output = serde_json::to_string_pretty(value).map_err(|e| CliError::general(e.to_string()))?;
    println!("{output}");
    Ok(())
}

// ============================================================================
// sessions
// ============================================================================

fn cmd_sessions(settings: &Settings, json: bool) -> Result<u8, CliError> {
    let sessions = remote::list_sessions(settings)
        .map_err(|e| CliError::general(format!("failed to list sessions: {e}")))?;

    if json {
        print_json(&sessions)?;
        return Ok(EXIT_SUCCESS);
    }
    if sessions.is_empty() {
        eprintln!("No running live sessions found.");
        return Ok(EXIT_SUCCESS);
    }

    println!("{:<12} {:>6} {:>8} {:<20} WORKBOOK", "SESSION", "PORT", "PID", "CREATED");
    println!("{}", "-".repeat(72));
    for s in &sessions {
        let id = s.session_id.simple().to_string();
        let workbook = s
            .workbook_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| s.workbook_title.clone());
        println!(
            "{:<12} {:>6} {:>8} {:<20} {}",
            &id[..8],
            s.port,
            s.pid,
            s.created_at.format("%Y-%m-%d %H:%M:%S"),
            workbook
        );
    }
    eprintln!();
    eprintln!("{} session(s) found", sessions.len());
    Ok(EXIT_SUCCESS)
}

// ============================================================================
// peek / structure / resolve
// ============================================================================

fn cmd_peek(settings: &Settings, file: &str, json: bool) -> Result<u8, CliError> {
    let directory = RemoteDirectory::from_settings(settings);
    let mut workbook = WorkbookConnector::new(&directory).resolve(file)?;
    let preview = preview::peek(&mut workbook, settings)?;

    if json {
        println!("{}", preview.to_json()?);
    } else {
        print!("{}", preview.to_text());
    }
    Ok(EXIT_SUCCESS)
}

#[derive(serde::Serialize)]
struct StructureOutput<'a> {
    #[serde(flatten)]
    structure: &'a TableStructure,
    columns_of_interest: Vec<InterestOutput>,
}

#[derive(serde::Serialize)]
struct InterestOutput {
    name: String,
    resolution: Resolution,
}

fn print_candidates(resolution: &Resolution) {
    match resolution {
        Resolution::Found(column) => println!("    found: [{}] {}", column.index, column.label),
        Resolution::Ambiguous(candidates) => {
            println!("    ambiguous:");
            for column in candidates {
                println!("      [{}] {}", column.index, column.label);
            }
        }
        Resolution::NotFound => println!("    not found"),
    }
}

fn cmd_structure(
    settings: &Settings,
    file: &str,
    sheet: Option<&str>,
    config: Option<&str>,
    json: bool,
) -> Result<u8, CliError> {
    let config = parse_structure_config(config)?;
    let directory = RemoteDirectory::from_settings(settings);
    let (session, table) = Session::open_sheet(&directory, file, sheet, config.as_ref(), settings)?;
    let structure = session.structure();
    let interest = session.columns_of_interest();

    if json {
        let columns_of_interest = interest
            .into_iter()
            .map(|(name, resolution)| InterestOutput { name, resolution })
            .collect();
        print_json(&StructureOutput { structure, columns_of_interest })?;
        return Ok(EXIT_SUCCESS);
    }

    println!("sheet:          {}", session.sheet());
    println!("header rows:    {}", structure.header_count);
    println!("data start row: {}", structure.data_start_row);
    println!("data rows:      {}", table.len());
    println!("source:         {:?}", structure.source);
    println!("columns:");
    for column in &structure.columns {
        println!("  [{}] {}", column.index, column.label);
    }
    if !interest.is_empty() {
        println!("columns of interest:");
        for (name, resolution) in &interest {
            println!("  {name}");
            print_candidates(resolution);
        }
    }
    for warning in &structure.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(EXIT_SUCCESS)
}

fn cmd_resolve(
    settings: &Settings,
    file: &str,
    name: &str,
    mode: MatchMode,
    sheet: Option<&str>,
    config: Option<&str>,
    json: bool,
) -> Result<u8, CliError> {
    let config = parse_structure_config(config)?;
    let directory = RemoteDirectory::from_settings(settings);
    let (session, _) = Session::open_sheet(&directory, file, sheet, config.as_ref(), settings)?;
    let resolution = session.resolve(name, mode);

    if json {
        print_json(&resolution)?;
    } else {
        match &resolution {
            Resolution::Found(column) => println!("found: [{}] {}", column.index, column.label),
            Resolution::Ambiguous(candidates) => {
                println!("ambiguous:");
                for column in candidates {
                    println!("  [{}] {}", column.index, column.label);
                }
            }
            Resolution::NotFound => {
                println!("not found; available: {}", session.structure().labels().join(", "));
            }
        }
    }

    Ok(match resolution {
        Resolution::Found(_) => EXIT_SUCCESS,
        Resolution::Ambiguous(_) => EXIT_COLUMN_AMBIGUOUS,
        Resolution::NotFound => EXIT_COLUMN_NOT_FOUND,
    })
}

// ============================================================================
// check-output
// ============================================================================

fn cmd_check_output(settings: &Settings, stdout: &Path, stderr: Option<&Path>, json: bool) -> Result<u8, CliError> {
    let read = |path: &Path| {
        fs::read_to_string(path).map_err(|e| CliError::usage(format!("{}: {}", path.display(), e)))
    };
    let out = read(stdout)?;
    let err = match stderr {
        Some(path) => read(path)?,
        None => String::new(),
    };

    let outcome = classify(&out, &err, &settings.failure_marker);
    if json {
        print_json(&outcome)?;
    } else {
        match &outcome {
            ScriptOutcome::Succeeded => println!("succeeded"),
            ScriptOutcome::Failed(message) => {
                println!("failed");
                if let Some(first) = message.lines().next() {
                    println!("  {first}");
                }
            }
        }
    }

    Ok(if outcome.is_failure() { EXIT_ERROR } else { EXIT_SUCCESS })
}
