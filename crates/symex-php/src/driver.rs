//! Top-level run: one root unit, one environment, one data model

use crate::error::{PhpError, Result};
use crate::interpreter::Interpreter;
use crate::logging;
use crate::parser::{MagoParser, UnitParser};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use symex_core::env::{with_frame, FrameKind, Limits};
use symex_core::{CompletionErrors, DataModel, DataNode};

/// Everything a run produced
#[derive(Debug)]
pub struct ExecutionResult {
    /// Root file, canonicalized
    pub root: PathBuf,
    /// The merged output of every path, exiting ones included
    pub model: DataModel,
    /// The root unit's return value, or `Control(Exit)` when every path exited
    pub value: DataNode,
    /// Every path through the program exited
    pub exited: bool,
    /// Recoverable problems, sorted by file and line
    pub errors: CompletionErrors,
    /// Distinct units parsed
    pub units: usize,
    pub elapsed: Duration,
}

/// Symbolically execute the program rooted at `root`
pub fn execute(root: &Path, limits: Limits) -> Result<ExecutionResult> {
    execute_with(root, limits, MagoParser)
}

pub fn execute_with<P: UnitParser>(root: &Path, limits: Limits, parser: P) -> Result<ExecutionResult> {
    let start = Instant::now();
    let root = root.canonicalize().map_err(|e| PhpError::io(root, e))?;
    logging::log_run_start(&root);

    let mut interpreter = Interpreter::new(parser, limits);
    let (value, outcome) = with_frame(&mut interpreter, FrameKind::Program, "main", |h| {
        h.execute_unit(&root)
    })?;

    let mut env = interpreter.into_env();
    let mut errors = env.take_errors();
    errors.sort();
    let units = env.files().parse_count();
    let elapsed = start.elapsed();
    logging::log_run_finished(&root, elapsed, units, errors.len());

    let model = DataModel::new(outcome.output).with_source(root.display().to_string());
    Ok(ExecutionResult {
        root,
        model,
        exited: value.is_exit(),
        value,
        errors,
        units,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_root_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let result = execute(&dir.path().join("absent.php"), Limits::default());
        assert!(matches!(result, Err(PhpError::Io { .. })));
    }

    #[test]
    fn test_model_carries_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("index.php");
        fs::write(&root, "<?php echo 'hi';").unwrap();

        let result = execute(&root, Limits::default()).unwrap();
        assert_eq!(result.model.root(), &DataNode::string("hi"));
        assert_eq!(result.model.source(), Some(root.canonicalize().unwrap().display().to_string().as_str()));
        assert_eq!(result.value, DataNode::Unset);
        assert!(!result.exited);
        assert_eq!(result.units, 1);
    }
}
