//! Running source units and resolving includes
//!
//! A unit runs in its own File frame: returns inside it end the unit, not
//! the caller, and paths that exit inside it stay exited in the caller.
//! Each unit is parsed once per run however often it is included.

use crate::include::resolve_include;
use crate::interpreter::Interpreter;
use crate::ir::{Expr, IncludeKind};
use crate::logging;
use crate::parser::UnitParser;
use std::path::Path;
use symex_core::env::{with_branch, with_file, with_frame, FrameKind, UnitEntry};
use symex_core::{
    CompletionError, CompletionKind, Condition, ControlSignal, DataNode, Result, SymexError,
};

impl<P: UnitParser> Interpreter<P> {
    /// Execute the unit at `path` within the current environment
    ///
    /// Yields `Control(Exit)` when every path through the unit exited,
    /// otherwise the unit's merged return value (`Unset` where it did not
    /// return).
    pub fn execute_unit(&mut self, path: &Path) -> Result<DataNode> {
        let parsed_before = self.env.files().parse_count();
        let mut failure = None;
        let parser = &self.parser;
        let entry = self.env.files_mut().register(path, |p| {
            parser.parse_file(p).map_err(|e| {
                let message = e.message.clone();
                failure = Some(e);
                message
            })
        });
        let fresh = self.env.files().parse_count() > parsed_before;

        let unit = match entry {
            UnitEntry::Parsed(unit) => {
                if fresh {
                    logging::log_unit_parsed(path, Ok(unit.statements.len()));
                }
                unit
            }
            UnitEntry::Failed(message) => {
                if fresh {
                    logging::log_unit_parsed(path, Err(message.as_ref()));
                }
                let line = failure.map_or(0, |f| f.line);
                let error = CompletionError::new(CompletionKind::ParseFailure, message.as_ref())
                    .with_file(path)
                    .with_line(line);
                if self.env.is_live() {
                    logging::log_completion_error(&error);
                    self.env.record_error(error);
                }
                return Ok(DataNode::Unset);
            }
        };

        self.env.files_mut().mark_executed(path);
        let depth = self.env.file_stack().len();
        logging::log_unit_enter(path, depth);

        let name = path.display().to_string();
        let (flow, outcome) = with_frame(self, FrameKind::File, &name, |h| {
            with_file(h, path.to_path_buf(), |h| {
                h.hoist(&unit);
                h.exec_body(&unit.statements)
            })
        })?;

        logging::log_unit_exit(path, depth, &flow);
        if flow.is_exit() != outcome.exited {
            return Err(SymexError::invariant(format!(
                "unit {} finished with {:?} but its frame reports exited={}",
                name, flow, outcome.exited
            )));
        }
        if flow.is_exit() {
            return Ok(DataNode::Control(ControlSignal::Exit));
        }
        Ok(outcome.value)
    }

    /// `include`/`require` and their `_once` forms
    pub(crate) fn include(&mut self, kind: IncludeKind, target: &Expr) -> Result<DataNode> {
        match self.eval(target)? {
            DataNode::Conditional(alternatives) => {
                let guards: Vec<Condition> =
                    alternatives.iter().map(|alt| alt.condition.clone()).collect();
                let results = with_branch(self, &guards, |h, arm| {
                    h.include_target(kind, &alternatives[arm].node, &target.text)
                })?;
                Ok(DataNode::merge(results))
            }
            leaf => self.include_target(kind, &leaf, &target.text),
        }
    }

    fn include_target(&mut self, kind: IncludeKind, target: &DataNode, text: &str) -> Result<DataNode> {
        let Some(name) = target.to_php_string().filter(|name| !name.is_empty()) else {
            self.note(
                CompletionKind::UnboundReference,
                format!("{}: cannot resolve target {}", kind.keyword(), text),
            );
            return Ok(DataNode::bool(false));
        };

        let path = resolve_include(&name, self.env.current_file());
        if kind.is_once() && self.env.files().was_executed(&path) {
            return Ok(DataNode::bool(true));
        }
        if !self.env.files().contains(&path) && !path.is_file() {
            self.note(
                CompletionKind::UnboundReference,
                format!(
                    "{}({}): Failed to open stream: No such file or directory",
                    kind.keyword(),
                    name
                ),
            );
            return Ok(DataNode::bool(false));
        }

        let max = self.env.limits().max_include_depth;
        if self.env.file_stack().len() >= max {
            let reason = format!("include depth limit {} reached at {}", max, path.display());
            self.approximate(reason.clone());
            return Ok(DataNode::Approximate(reason));
        }

        self.execute_unit(&path)
    }
}
