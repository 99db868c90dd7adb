//! symex CLI - symbolic execution of PHP programs
//!
//! Runs each root file once for all inputs and writes the merged output
//! model as ifdef text, XML or a JSON report.

mod config;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use symex_core::env::Limits;
use symex_php::{logging, ExecutionResult};

use config::Config;
use output::{plan_artifacts, render, OutputFormat, Reporter};

#[derive(Parser)]
#[command(name = "symex")]
#[command(version = "0.1.0")]
#[command(about = "Symbolic execution of PHP programs into a conditional output model")]
struct Cli {
    /// Root files, or directories to search for .php files
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Output format: ifdef, xml, json
    #[arg(long, value_name = "FORMAT")]
    format: Option<String>,

    /// Write one artifact per root file into this directory
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Iterations explored per loop before approximating
    #[arg(long, value_name = "N")]
    max_loop_iterations: Option<usize>,

    /// Nested user function calls before approximating
    #[arg(long, value_name = "N")]
    max_call_depth: Option<usize>,

    /// Nested includes before approximating
    #[arg(long, value_name = "N")]
    max_include_depth: Option<usize>,

    /// Write a run log to this file
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// Exit with status 1 when any completion error was recorded
    #[arg(long)]
    strict: bool,

    /// Only print renderings and fatal errors
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Path to config file (default: auto-detect .symex.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Ignore config files
    #[arg(long)]
    no_config: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red(), e);
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = if cli.no_config {
        Config::default()
    } else if let Some(config_path) = &cli.config {
        Config::load_path(config_path)?
    } else {
        match Config::load()? {
            Some((cfg, path)) => {
                if !cli.quiet {
                    eprintln!("{}: {}", "Using config".bold(), path.display());
                }
                cfg
            }
            None => Config::default(),
        }
    };

    let format_name = cli
        .format
        .as_deref()
        .or(config.output.format.as_deref())
        .unwrap_or("ifdef");
    let format = OutputFormat::from_str(format_name).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid output format '{}'. Valid options: ifdef, xml, json",
            format_name
        )
    })?;
    let limits = config.effective_limits(
        cli.max_loop_iterations,
        cli.max_call_depth,
        cli.max_include_depth,
    );
    let output_dir = cli.output_dir.clone().or_else(|| config.output.directory.clone());

    if let Some(log_path) = cli.log.as_ref().or(config.log_file.as_ref()) {
        let path = logging::init_logger(Some(log_path.as_path()))
            .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
        if !cli.quiet {
            eprintln!("{}: {}", "Logging to".bold(), path.display());
        }
    }

    let (roots, missing) = collect_roots(&cli.paths, &config);
    let mut reporter = Reporter::new(cli.quiet);
    for path in &missing {
        reporter.report_failure(path, "Path does not exist");
    }

    let targets = match &output_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            plan_artifacts(dir, &roots, format)?
        }
        None => HashMap::new(),
    };

    // Every root gets its own environment; nothing is shared across runs
    let mut results: Vec<(PathBuf, Result<ExecutionResult, String>)> = roots
        .par_iter()
        .map(|(root, _)| (root.clone(), run_root(root, limits)))
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));

    for (root, result) in results {
        match result {
            Ok(result) => {
                let rendered = render(&result, format)?;
                match targets.get(&root) {
                    Some(target) => {
                        write_artifact(target, &rendered)?;
                        reporter.report_written(target);
                    }
                    None => println!("{}", rendered),
                }
                reporter.report_run(&result);
            }
            Err(message) => reporter.report_failure(&root, &message),
        }
    }

    reporter.finish();
    logging::shutdown_logger();

    let summary = reporter.summary();
    let code = if summary.failures > 0 {
        ExitCode::from(2)
    } else if cli.strict && summary.completion_errors > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    };
    Ok(code)
}

/// Root files named directly plus every .php file under named directories
///
/// Each root is paired with its path below the directory it was found in,
/// or its file name when it was named directly.
fn collect_roots(paths: &[PathBuf], config: &Config) -> (Vec<(PathBuf, PathBuf)>, Vec<PathBuf>) {
    let mut roots = Vec::new();
    let mut missing = Vec::new();

    for path in paths {
        if path.is_file() {
            let name = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.clone());
            roots.push((path.clone(), name));
        } else if path.is_dir() {
            for entry in walkdir::WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "php"))
            {
                if !config.should_exclude(entry.path()) {
                    let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
                    roots.push((entry.path().to_path_buf(), relative.to_path_buf()));
                }
            }
        } else {
            missing.push(path.clone());
        }
    }

    (roots, missing)
}

fn run_root(root: &Path, limits: Limits) -> Result<ExecutionResult, String> {
    symex_php::execute(root, limits).map_err(|e| e.to_string())
}

fn write_artifact(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}
