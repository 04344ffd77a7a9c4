//! Command-line front end: reads a role policy, validates it and reports
//! whether any statement targets the wildcard resource.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use iam_role_policy_parsing::{parse_role_policy, RolePolicy};
use log::{debug, info, LevelFilter};
use serde::Serialize;

/// Exit code for unreadable or invalid policy files.
const EXIT_INVALID_POLICY: u8 = 1;

#[derive(Parser, Debug)]
#[command(name = "iam-role-policy")]
#[command(version, about = "Validate an IAM role policy and report wildcard resources", long_about = None)]
struct Cli {
    /// Path to the role policy JSON file (`-` or omitted reads stdin)
    file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, env = "IAM_ROLE_POLICY_FORMAT")]
    format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// `true` or `false`
    Text,
    /// A JSON summary object
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary<'a> {
    policy_name: Option<&'a str>,
    statement_count: usize,
    has_wildcard_resource_statement: bool,
}

impl<'a> Summary<'a> {
    fn new(policy: &'a RolePolicy) -> Self {
        Self {
            policy_name: policy.policy_name(),
            statement_count: policy
                .policy_document()
                .and_then(|document| document.statements())
                .map_or(0, <[_]>::len),
            has_wildcard_resource_statement: policy.has_wildcard_resource_statement(),
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG, when set, takes precedence over the -v flags.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) if path.as_os_str() != "-" => {
            debug!("Reading policy from {}", path.display());
            fs::read(path).with_context(|| format!("Error reading file: {}", path.display()))
        }
        _ => {
            debug!("Reading policy from stdin");
            let mut buffer = Vec::new();
            io::stdin()
                .read_to_end(&mut buffer)
                .context("Error reading file: stdin")?;
            Ok(buffer)
        }
    }
}

fn render(policy: &RolePolicy, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(policy.has_wildcard_resource_statement().to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(&Summary::new(policy))
            .context("Failed to serialize summary"),
    }
}

fn run(cli: &Cli) -> Result<String> {
    let data = read_input(cli.file.as_ref())?;
    let policy = parse_role_policy(&data).context("Error parsing file")?;
    info!(
        "Validated role policy '{}'",
        policy.policy_name().unwrap_or_default()
    );
    render(&policy, cli.format)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::from(EXIT_INVALID_POLICY)
        }
    }
}
