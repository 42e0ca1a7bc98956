use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use glob::glob;
use postshark_core::{
    CaptureProcessor, DEFAULT_REGION, DEFAULT_WORK_DIR, DissectorConfig, IdlePolicy,
    PipelineConfig, SourceConfig, SourceMode, build_source, run,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("POSTSHARK_BUILD_COMMIT"),
    " ",
    env!("POSTSHARK_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "postshark")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Extract HTTP POST requests from packet captures into Parquet files.",
    long_about = None,
    after_help = "Examples:\n  postshark --input /captures/edge.pcap --output /captures\n  postshark --input '/captures/*.pcap' --output /captures\n  postshark --source queue --input capture-events --output s3://artifacts/http --follow"
)]
struct Cli {
    /// Where jobs come from
    #[arg(long, value_enum, default_value_t = SourceArg::File)]
    source: SourceArg,

    /// Capture paths or glob patterns in file mode; the queue name in queue mode
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    inputs: Vec<String>,

    /// Output directory, or s3://bucket/prefix in queue mode
    #[arg(short = 'o', long)]
    output: String,

    /// Working directory for downloaded captures
    #[arg(long, default_value = DEFAULT_WORK_DIR)]
    tempdir: PathBuf,

    /// Path to the tshark executable
    #[arg(long, env = "POSTSHARK_TSHARK", default_value = "tshark")]
    tshark: PathBuf,

    /// AWS region for the queue and bucket
    #[arg(long, env = "POSTSHARK_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// Queue long-poll wait in seconds (SQS caps it at 20)
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u64).range(0..=20))]
    wait_seconds: u64,

    /// Keep polling when the queue is empty instead of exiting
    #[arg(long)]
    follow: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SourceArg {
    /// Local capture files
    File,
    /// S3 notifications from an SQS queue
    Queue,
}

impl From<SourceArg> for SourceMode {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::File => SourceMode::File,
            SourceArg::Queue => SourceMode::Queue,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cmd_run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{:#}", err), None)
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed when embedded; keep the existing one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn cmd_run(cli: Cli) -> Result<(), CliError> {
    let config = pipeline_config(&cli)?;

    let mut source = build_source(&config.source)
        .with_context(|| format!("failed to set up {} source", config.source.mode))
        .map_err(|err| {
            let hint = match config.source.mode {
                SourceMode::File => None,
                SourceMode::Queue => Some(
                    "check the queue name, --region, and the AWS credentials in the environment"
                        .to_string(),
                ),
            };
            CliError::new(format!("{:#}", err), hint)
        })?;

    let processor = CaptureProcessor::new(config.dissector);
    let summary = run(source.as_mut(), &processor, config.idle).map_err(|err| {
        CliError::new(
            format!("{:#}", anyhow::Error::new(err)),
            Some("the failed capture was not acknowledged; fix the cause and rerun".to_string()),
        )
    })?;

    info!(
        jobs = summary.jobs,
        records = summary.records,
        rows = summary.rows,
        "done"
    );
    Ok(())
}

fn pipeline_config(cli: &Cli) -> Result<PipelineConfig, CliError> {
    let mode = SourceMode::from(cli.source);

    let inputs = match mode {
        SourceMode::File => resolve_file_inputs(&cli.inputs, &cli.output)?,
        SourceMode::Queue => {
            if cli.inputs.len() > 1 {
                return Err(CliError::new(
                    format!("queue mode takes one queue name, got {}", cli.inputs.len()),
                    Some("pass a single --input <QUEUE>".to_string()),
                ));
            }
            cli.inputs.clone()
        }
    };

    if cli.follow && mode == SourceMode::File {
        return Err(CliError::new(
            "--follow only applies to queue mode",
            Some("drop --follow or use --source queue".to_string()),
        ));
    }

    let source = SourceConfig::new(mode, inputs, cli.output.clone())
        .with_work_dir(&cli.tempdir)
        .with_region(&cli.region)
        .with_wait_time(Duration::from_secs(cli.wait_seconds));
    Ok(PipelineConfig {
        source,
        dissector: DissectorConfig::new(&cli.tshark),
        idle: if cli.follow {
            IdlePolicy::Poll
        } else {
            IdlePolicy::Exit
        },
    })
}

/// Expand glob patterns and check that each capture sits in the output
/// directory, where file mode processes it.
fn resolve_file_inputs(inputs: &[String], output: &str) -> Result<Vec<String>, CliError> {
    let output_dir = Path::new(output);
    if !output_dir.is_dir() {
        return Err(CliError::new(
            format!("output directory not found: {}", output),
            Some("file mode writes artifacts next to the captures in --output".to_string()),
        ));
    }

    let mut resolved = Vec::new();
    for input in inputs {
        for path in resolve_input_path(input)? {
            let Some(name) = path.file_name() else {
                return Err(CliError::new(
                    format!("input is not a file: {}", path.display()),
                    Some("use a .pcap or .pcapng file".to_string()),
                ));
            };
            let in_place = output_dir.join(name);
            if !in_place.is_file() {
                return Err(CliError::new(
                    format!("capture not found in output directory: {}", in_place.display()),
                    Some("file mode processes captures in place; set --output to their directory".to_string()),
                ));
            }
            resolved.push(path.to_string_lossy().into_owned());
        }
    }
    Ok(resolved)
}

fn resolve_input_path(input: &str) -> Result<Vec<PathBuf>, CliError> {
    if !is_glob_pattern(input) {
        let path = PathBuf::from(input);
        if !path.exists() {
            return Err(CliError::new(
                format!("input file not found: {}", input),
                Some("use a .pcap or .pcapng file".to_string()),
            ));
        }
        return Ok(vec![path]);
    }

    let mut matches = Vec::new();
    let paths = glob(input).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", input),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", input),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() && !is_artifact(&path) {
            matches.push(path);
        }
    }

    if matches.is_empty() {
        return Err(CliError::new(
            format!("no files match pattern '{}'", input),
            Some("check the path or quote the pattern; expected .pcap or .pcapng".to_string()),
        ));
    }
    Ok(matches)
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}

// Broad patterns like `dir/*` would otherwise pick up earlier output.
fn is_artifact(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet") || ext.eq_ignore_ascii_case("partial"))
}
