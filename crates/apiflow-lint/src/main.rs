//! `apiflow-lint` binary: run the `notxread` check over source trees.
//!
//! Exits 1 when any finding is reported, 2 on I/O or parse errors.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use apiflow_lint::{LintConfig, check_paths};

/// Reject non-transactional reads inside SQLite write transactions.
#[derive(Parser)]
#[command(name = "apiflow-lint", version, about, long_about = None)]
struct Cli {
    /// Files or directories to check.
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// Output findings as a JSON array.
    #[arg(long)]
    json: bool,

    /// Receiver names whose `.begin()` opens a write transaction.
    #[arg(long = "writer", default_value = "writer")]
    writers: Vec<String>,

    /// Extra method names to treat as reads, on top of the built-in list.
    #[arg(long = "read")]
    reads: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<usize> {
    let mut config = LintConfig {
        writer_names: cli.writers.clone(),
        ..LintConfig::default()
    };
    config.read_methods.extend(cli.reads.iter().cloned());
    let findings = check_paths(&cli.paths, &config)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&findings)?);
    } else {
        for finding in &findings {
            println!("{finding}");
        }
        if !findings.is_empty() {
            eprintln!("notxread: {} finding(s)", findings.len());
        }
    }
    Ok(findings.len())
}
