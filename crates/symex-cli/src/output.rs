//! Output formatting for symex
//!
//! Renders a data model as ifdef text, XML or a JSON report, and lists
//! completion errors on the terminal.

use anyhow::{bail, Result};
use colored::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use symex_core::{CompletionError, CompletionErrors, DataModel, DataNode};
use symex_php::ExecutionResult;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Ifdef,
    Xml,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<OutputFormat> {
        match s.to_lowercase().as_str() {
            "ifdef" => Some(OutputFormat::Ifdef),
            "xml" => Some(OutputFormat::Xml),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }

    /// Suffix of the artifact written per root file
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Ifdef => "ifdef.txt",
            OutputFormat::Xml => "xml",
            OutputFormat::Json => "json",
        }
    }
}

/// One root file's run, as reported in JSON
#[derive(Debug, Serialize)]
pub struct FileReport<'a> {
    pub path: String,
    pub model: &'a DataModel,
    pub result: &'a DataNode,
    pub exited: bool,
    pub units: usize,
    pub elapsed_ms: u128,
    pub errors: &'a CompletionErrors,
}

impl<'a> FileReport<'a> {
    pub fn new(result: &'a ExecutionResult) -> Self {
        Self {
            path: result.root.display().to_string(),
            model: &result.model,
            result: &result.value,
            exited: result.exited,
            units: result.units,
            elapsed_ms: result.elapsed.as_millis(),
            errors: &result.errors,
        }
    }
}

/// Render one run in the chosen format
pub fn render(result: &ExecutionResult, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Ifdef => result.model.to_ifdef_string(),
        OutputFormat::Xml => result.model.to_xml()?,
        OutputFormat::Json => serde_json::to_string_pretty(&FileReport::new(result))?,
    })
}

/// Where the artifact for a root goes inside `dir`; `relative` is the
/// root's path below the directory it was collected from
fn artifact_path(dir: &Path, relative: &Path, format: OutputFormat) -> PathBuf {
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    let parent = relative.parent().unwrap_or_else(|| Path::new(""));
    dir.join(parent).join(format!("{}.{}", stem, format.extension()))
}

/// Artifact target of every `(root, relative)` pair, keyed by root
///
/// Fails when two roots would be written to the same file.
pub fn plan_artifacts(
    dir: &Path,
    roots: &[(PathBuf, PathBuf)],
    format: OutputFormat,
) -> Result<HashMap<PathBuf, PathBuf>> {
    let mut owners: HashMap<PathBuf, &Path> = HashMap::new();
    let mut targets = HashMap::with_capacity(roots.len());
    for (root, relative) in roots {
        let target = artifact_path(dir, relative, format);
        if let Some(previous) = owners.insert(target.clone(), root) {
            bail!(
                "{} and {} would both be written to {}",
                previous.display(),
                root.display(),
                target.display()
            );
        }
        targets.insert(root.clone(), target);
    }
    Ok(targets)
}

/// Summary statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub files_processed: usize,
    pub files_exited: usize,
    pub completion_errors: usize,
    pub failures: usize,
}

/// Accumulates per-file outcomes and prints the closing line
pub struct Reporter {
    quiet: bool,
    summary: Summary,
}

impl Reporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            summary: Summary::default(),
        }
    }

    /// Account for a finished run and list its completion errors
    pub fn report_run(&mut self, result: &ExecutionResult) {
        self.summary.files_processed += 1;
        self.summary.completion_errors += result.errors.len();
        if result.exited {
            self.summary.files_exited += 1;
        }

        if self.quiet || result.errors.is_empty() {
            return;
        }
        eprintln!("{}", result.root.display().to_string().bold());
        for error in result.errors.iter() {
            eprintln!("  {}", format_error(error));
        }
    }

    /// A root that could not be run at all
    pub fn report_failure(&mut self, path: &Path, message: &str) {
        self.summary.failures += 1;
        eprintln!("{}: {}: {}", "Error".red(), path.display(), message);
    }

    pub fn report_written(&self, path: &Path) {
        if !self.quiet {
            eprintln!("{} {}", "Wrote".green(), path.display());
        }
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn finish(&self) {
        if self.quiet {
            return;
        }
        let s = &self.summary;
        let errors = if s.completion_errors > 0 {
            s.completion_errors.to_string().yellow()
        } else {
            s.completion_errors.to_string().green()
        };
        eprintln!(
            "{} {} file(s), {} completion error(s), {} exited",
            "Done:".bold(),
            s.files_processed,
            errors,
            s.files_exited
        );
        if s.failures > 0 {
            eprintln!("{} {} file(s) failed", "Failed:".red().bold(), s.failures);
        }
    }
}

fn format_error(error: &CompletionError) -> String {
    let location = match (&error.file, error.line) {
        (Some(file), 0) => format!("{}", file.display()),
        (Some(file), line) => format!("{}:{}", file.display(), line),
        (None, _) => String::new(),
    };
    format!(
        "{} {} {}",
        error.kind.as_str().yellow(),
        location.dimmed(),
        error.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!(OutputFormat::from_str("IFDEF"), Some(OutputFormat::Ifdef));
        assert_eq!(OutputFormat::from_str("xml"), Some(OutputFormat::Xml));
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("text"), None);
    }

    #[test]
    fn test_artifact_path() {
        let dir = Path::new("out");
        assert_eq!(
            artifact_path(dir, Path::new("index.php"), OutputFormat::Ifdef),
            PathBuf::from("out/index.ifdef.txt")
        );
        assert_eq!(
            artifact_path(dir, Path::new("admin/login.php"), OutputFormat::Json),
            PathBuf::from("out/admin/login.json")
        );
    }

    #[test]
    fn test_same_name_in_different_directories() {
        let dir = Path::new("out");
        let roots = vec![
            (PathBuf::from("site/a/index.php"), PathBuf::from("a/index.php")),
            (PathBuf::from("site/b/index.php"), PathBuf::from("b/index.php")),
        ];
        let targets = plan_artifacts(dir, &roots, OutputFormat::Xml).unwrap();
        assert_eq!(targets[&roots[0].0], PathBuf::from("out/a/index.xml"));
        assert_eq!(targets[&roots[1].0], PathBuf::from("out/b/index.xml"));
    }

    #[test]
    fn test_colliding_artifacts_are_an_error() {
        let roots = vec![
            (PathBuf::from("a/index.php"), PathBuf::from("index.php")),
            (PathBuf::from("b/index.php"), PathBuf::from("index.php")),
        ];
        let err = plan_artifacts(Path::new("out"), &roots, OutputFormat::Ifdef).unwrap_err();
        assert!(err.to_string().contains("a/index.php and b/index.php"));
    }
}
