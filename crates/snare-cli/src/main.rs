//! Snare command line
//!
//! Matches an actual document against an expected pattern, or runs every
//! assertion of an assertion file against one document.
//!
//! Usage:
//!   snare check <expected> <actual> [OPTIONS]
//!   snare run <assertions.yaml> <actual>

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use snare_match::{Assertion, AssertionFile, AssertionKind, Captures, Condition, PollSettings, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Parser, Debug)]
#[command(name = "snare")]
#[command(
    author,
    version,
    about = "Match text, JSON, XML and HTTP responses against placeholder patterns"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format: text (default), json
    #[arg(short, long, default_value = "text", global = true)]
    output: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match one actual file against one expected file
    Check(CheckArgs),
    /// Evaluate every assertion of an assertion file against an actual file
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// File holding the expected pattern
    expected: PathBuf,

    /// File holding the actual document
    actual: PathBuf,

    /// Matcher: text, json, xml, any, http-response
    #[arg(short, long, default_value = "any")]
    kind: AssertionKind,

    /// Matching condition, repeatable (e.g. -c object-closed -c invert)
    #[arg(short, long = "condition")]
    conditions: Vec<Condition>,

    /// Label prefixed onto the failure message
    #[arg(short, long)]
    message: Option<String>,

    /// Keep re-reading the actual file for this many milliseconds
    #[arg(long, env = "SNARE_POLL_MS")]
    poll_ms: Option<u64>,

    /// Initial delay between attempts when polling
    #[arg(long, default_value_t = 3000)]
    interval_ms: u64,

    /// Delay multiplier applied after every attempt
    #[arg(long, default_value_t = 1.0)]
    backoff: f64,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// YAML or JSON assertion file
    assertions: PathBuf,

    /// File holding the actual document
    actual: PathBuf,
}

/// Outcome of one evaluated assertion.
struct Report {
    label: String,
    outcome: Result<Captures, snare_match::MatchError>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let reports = match execute(&cli) {
        Ok(reports) => reports,
        Err(e) => {
            eprintln!("{RED}{BOLD}error:{RESET} {e:#}");
            return ExitCode::from(2);
        }
    };

    if cli.output == "json" {
        print_reports_json(&reports);
    } else {
        print_reports(&reports);
    }

    if reports.iter().all(|r| r.outcome.is_ok()) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn execute(cli: &Cli) -> anyhow::Result<Vec<Report>> {
    match &cli.command {
        Command::Check(args) => {
            let assertion = assertion_from_args(args)?;
            assertion.validate()?;
            info!(kind = ?assertion.kind, conditions = %assertion.conditions, "checking");
            let outcome = assertion.evaluate_with(|| read_actual(&args.actual));
            Ok(vec![Report {
                label: args.actual.display().to_string(),
                outcome,
            }])
        }
        Command::Run(args) => {
            let file = AssertionFile::from_file(&args.assertions)
                .with_context(|| format!("failed to load {}", args.assertions.display()))?;
            // Fail early on an unreadable document rather than polling on it
            read_document(&args.actual)?;
            info!(count = file.assertions.len(), "running assertions");
            Ok(file
                .assertions
                .iter()
                .enumerate()
                .map(|(index, assertion)| Report {
                    label: assertion.label(index),
                    outcome: assertion.evaluate_with(|| read_actual(&args.actual)),
                })
                .collect())
        }
    }
}

fn assertion_from_args(args: &CheckArgs) -> anyhow::Result<Assertion> {
    let text = read_document(&args.expected)?;
    let expected = match args.kind {
        AssertionKind::HttpResponse => serde_json::from_str(&text).with_context(|| {
            format!(
                "{} is not a JSON response description",
                args.expected.display()
            )
        })?,
        _ => serde_json::Value::String(text),
    };
    Ok(Assertion {
        name: None,
        message: args.message.clone(),
        kind: args.kind,
        expected,
        conditions: args.conditions.iter().copied().collect(),
        poll: args.poll_ms.map(|duration_ms| PollSettings {
            duration_ms,
            interval_ms: args.interval_ms,
            backoff: args.backoff,
        }),
    })
}

/// Read a document, dropping the trailing line break editors add.
fn read_document(path: &Path) -> anyhow::Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(content.trim_end_matches(['\n', '\r']).to_string())
}

fn read_actual(path: &Path) -> Value {
    match read_document(path) {
        Ok(text) => Value::Text(text),
        Err(e) => {
            warn!("{e:#}");
            Value::Null
        }
    }
}

fn sorted(captures: &Captures) -> BTreeMap<&str, &Value> {
    captures.iter().map(|(k, v)| (k.as_str(), v)).collect()
}

fn print_reports(reports: &[Report]) {
    for report in reports {
        match &report.outcome {
            Ok(captures) => {
                println!("{GREEN}✓{RESET} {BOLD}{}{RESET}", report.label);
                for (name, value) in sorted(captures) {
                    println!("    {CYAN}{name}{RESET} = {value}");
                }
            }
            Err(e) => {
                println!("{RED}✗{RESET} {BOLD}{}{RESET}", report.label);
                for line in e.to_string().lines() {
                    println!("    {DIM}│{RESET} {line}");
                }
            }
        }
    }

    let failed = reports.iter().filter(|r| r.outcome.is_err()).count();
    println!();
    if failed == 0 {
        println!("{GREEN}{BOLD}{} matched{RESET}", reports.len());
    } else {
        println!(
            "{RED}{BOLD}{failed} of {} did not match{RESET}",
            reports.len()
        );
    }
}

fn print_reports_json(reports: &[Report]) {
    let output: Vec<serde_json::Value> = reports
        .iter()
        .map(|report| match &report.outcome {
            Ok(captures) => serde_json::json!({
                "name": report.label,
                "matched": true,
                "captures": sorted(captures),
            }),
            Err(e) => serde_json::json!({
                "name": report.label,
                "matched": false,
                "error": e.to_string(),
            }),
        })
        .collect();
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("{RED}error:{RESET} failed to render results: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn check_args(expected: &NamedTempFile, actual: &NamedTempFile, kind: AssertionKind) -> CheckArgs {
        CheckArgs {
            expected: expected.path().to_path_buf(),
            actual: actual.path().to_path_buf(),
            kind,
            conditions: vec![],
            message: None,
            poll_ms: None,
            interval_ms: 3000,
            backoff: 1.0,
        }
    }

    #[test]
    fn test_read_document_trims_final_newline() {
        let f = file("line one\nline two\r\n");
        assert_eq!(read_document(f.path()).unwrap(), "line one\nline two");
    }

    #[test]
    fn test_check_captures() {
        let expected = file("{\"id\": \"~[id]\"}\n");
        let actual = file("{\"id\": 7, \"name\": \"x\"}\n");
        let args = check_args(&expected, &actual, AssertionKind::Any);
        let assertion = assertion_from_args(&args).unwrap();
        let captures = assertion.evaluate_with(|| read_actual(&args.actual)).unwrap();
        assert_eq!(captures["id"], Value::from("7"));
    }

    #[test]
    fn test_check_http_response_requires_json() {
        let expected = file("status 200");
        let actual = file("{}");
        let args = check_args(&expected, &actual, AssertionKind::HttpResponse);
        assert!(assertion_from_args(&args).is_err());
    }

    #[test]
    fn test_missing_actual_is_null() {
        assert_eq!(read_actual(Path::new("/nonexistent/snare/actual")), Value::Null);
    }

    #[test]
    fn test_cli_parses_conditions() {
        let cli = Cli::try_parse_from([
            "snare", "check", "e.json", "a.json", "-k", "json", "-c", "object-closed", "-c",
            "invert", "--poll-ms", "500",
        ])
        .unwrap();
        match cli.command {
            Command::Check(args) => {
                assert_eq!(args.kind, AssertionKind::Json);
                assert_eq!(args.conditions, vec![Condition::ObjectClosed, Condition::Invert]);
                assert_eq!(args.poll_ms, Some(500));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
