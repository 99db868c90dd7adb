//! Statement execution against the environment
//!
//! The interpreter walks the owned IR of a unit. Every branch point goes
//! through the environment's branch protocol, and `return`, `break`,
//! `continue` and `exit` park the current path in the matching
//! accumulator, so statements after them keep running for the sibling
//! paths that are still live.

mod builtins;
mod calls;
mod expr;
mod loops;
pub mod ops;

use crate::ir::{Expr, FunctionDecl, Program, Stmt, StmtKind};
use crate::logging;
use crate::parser::{MagoParser, UnitParser};
use std::rc::Rc;
use symex_core::env::{with_branch, Env, EnvHost, Limits};
use symex_core::{CompletionKind, Condition, DataNode, Flow, Result, Satisfiability, Solver};

/// Executes PHP units symbolically within one environment
pub struct Interpreter<P = MagoParser> {
    pub(crate) env: Env<Program, FunctionDecl>,
    pub(crate) parser: P,
    /// Nesting of `isset`/`empty`/`??` operands, where undefined reads are silent
    quiet: usize,
}

impl<P: UnitParser> EnvHost for Interpreter<P> {
    type Unit = Program;
    type Function = FunctionDecl;

    fn env(&mut self) -> &mut Env<Program, FunctionDecl> {
        &mut self.env
    }
}

impl Interpreter<MagoParser> {
    pub fn with_limits(limits: Limits) -> Self {
        Self::new(MagoParser, limits)
    }
}

impl<P: UnitParser> Interpreter<P> {
    pub fn new(parser: P, limits: Limits) -> Self {
        Self {
            env: Env::new(limits),
            parser,
            quiet: 0,
        }
    }

    /// Use a different decision procedure for pruning branches
    pub fn with_solver(mut self, solver: Box<dyn Solver>) -> Self {
        self.env = self.env.with_solver(solver);
        self
    }

    pub fn env_ref(&self) -> &Env<Program, FunctionDecl> {
        &self.env
    }

    pub fn into_env(self) -> Env<Program, FunctionDecl> {
        self.env
    }

    /// Record a recoverable problem, unless the current path is dead
    pub(crate) fn note(&mut self, kind: CompletionKind, message: impl Into<String>) {
        if !self.env.is_live() {
            return;
        }
        if kind == CompletionKind::UnboundReference && self.quiet > 0 {
            return;
        }
        self.env.record(kind, message);
        if let Some(error) = self.env.errors().errors().last() {
            logging::log_completion_error(error);
        }
    }

    /// Declare the functions a unit defines at its top level
    pub(crate) fn hoist(&mut self, unit: &Program) {
        for decl in &unit.functions {
            self.declare(decl);
        }
    }

    fn declare(&mut self, decl: &Rc<FunctionDecl>) {
        let key = decl.name.to_ascii_lowercase();
        if let Some(existing) = self.env.function(&key) {
            if !Rc::ptr_eq(&existing, decl) {
                self.note(
                    CompletionKind::Unsupported,
                    format!("Cannot redeclare function {}()", decl.name),
                );
            }
            return;
        }
        self.env.declare_function(&key, Rc::clone(decl));
    }

    // ==================== Statements ====================

    /// Execute a unit or function body and report how its paths finished
    ///
    /// Must run directly inside the body's own frame: the flow is read from
    /// that frame's return, exit and loop accumulators.
    pub fn exec_body(&mut self, statements: &[Stmt]) -> Result<Flow> {
        let mark = self.env.flow_mark();
        self.exec_block(statements)?;
        Ok(self.env.flow_since(&mark))
    }

    /// Execute statements in order while the current path is live
    pub fn exec_block(&mut self, statements: &[Stmt]) -> Result<()> {
        for stmt in statements {
            if !self.env.is_live() {
                break;
            }
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        self.env.set_line(stmt.line);
        match &stmt.kind {
            StmtKind::Inline(text) => self.env.emit(DataNode::string(text.as_str())),
            StmtKind::Echo(values) => {
                for value in values {
                    let value = self.eval(value)?;
                    self.env.emit(ops::to_output(&value));
                }
            }
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Block(statements) => {
                self.exec_block(statements)?;
            }
            StmtKind::If { branches, otherwise } => self.exec_if(branches, otherwise.as_deref())?,
            StmtKind::While { condition, body } => self.exec_while(condition, body)?,
            StmtKind::DoWhile { body, condition } => self.exec_do_while(body, condition)?,
            StmtKind::For {
                init,
                conditions,
                step,
                body,
            } => self.exec_for(init, conditions, step, body)?,
            StmtKind::Foreach {
                subject,
                key,
                value,
                body,
            } => self.exec_foreach(subject, key.as_ref(), value, body)?,
            StmtKind::Switch { subject, cases } => self.exec_switch(subject, cases)?,
            StmtKind::Break(levels) => {
                if !self.env.record_break(*levels) {
                    self.stray_jump("break", *levels)?;
                }
            }
            StmtKind::Continue(levels) => {
                if !self.env.record_continue(*levels) {
                    self.stray_jump("continue", *levels)?;
                }
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => DataNode::null(),
                };
                self.env.record_return(value)?;
            }
            StmtKind::Function(decl) => self.declare(decl),
            StmtKind::Global(names) => {
                if self.env.in_function_scope() {
                    for name in names {
                        self.env.import_global(name);
                    }
                }
            }
            StmtKind::Static(items) => {
                // runs as a plain initialization on first reach within the call
                for (name, initializer) in items {
                    if self.env.get_variable(name).is_some() {
                        continue;
                    }
                    let value = match initializer {
                        Some(expr) => self.eval(expr)?,
                        None => DataNode::null(),
                    };
                    self.env.set_variable(name, value);
                }
            }
            StmtKind::Unset(targets) => {
                for target in targets {
                    self.unset(target)?;
                }
            }
            StmtKind::Const(items) => {
                for (name, value) in items {
                    let value = self.eval(value)?;
                    self.env.define_constant(name, value);
                }
            }
            StmtKind::Try { body, finally } => {
                let mark = self.env.flow_mark();
                self.exec_block(body)?;
                if let Some(finally) = finally {
                    // paths that returned inside the body still run `finally`
                    let returned = self.env.take_returns_since(&mark);
                    self.exec_block(finally)?;
                    for (state, value) in returned {
                        let live = self.env.resume(state);
                        self.exec_block(finally)?;
                        self.env.record_return(value)?;
                        self.env.resume(live);
                    }
                }
            }
            StmtKind::Nop => {}
            StmtKind::Unsupported(text) => {
                self.note(CompletionKind::Unsupported, format!("Unsupported statement: {}", text));
            }
        }
        Ok(())
    }

    /// `break`/`continue` outside of any loop ends the path like a bare return
    fn stray_jump(&mut self, keyword: &str, levels: u32) -> Result<()> {
        self.note(
            CompletionKind::Unsupported,
            format!("'{} {}' not in the 'loop' or 'switch' context", keyword, levels),
        );
        self.env.record_return(DataNode::Unset)
    }

    fn exec_if(
        &mut self,
        branches: &[(Expr, Vec<Stmt>)],
        otherwise: Option<&[Stmt]>,
    ) -> Result<()> {
        if !self.env.is_live() {
            return Ok(());
        }
        let Some(((test, body), rest)) = branches.split_first() else {
            if let Some(statements) = otherwise {
                self.exec_block(statements)?;
            }
            return Ok(());
        };

        let condition = self.eval_condition(test)?;
        match self.env.decide(&condition) {
            Satisfiability::Yes => {
                self.exec_block(body)?;
            }
            Satisfiability::No => self.exec_if(rest, otherwise)?,
            Satisfiability::Maybe => {
                let guards = [condition.clone(), Condition::not(condition)];
                with_branch(self, &guards, |h, arm| {
                    if arm == 0 {
                        h.exec_block(body)
                    } else {
                        h.exec_if(rest, otherwise)
                    }
                })?;
            }
        }
        Ok(())
    }

    /// Record that exploration stopped early on the current path
    pub(crate) fn approximate(&mut self, reason: String) {
        self.note(CompletionKind::IterationBoundExceeded, reason.clone());
        self.env.emit(DataNode::Approximate(reason));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parser::MagoParser;
    use std::path::{Path, PathBuf};
    use symex_core::env::{with_file, with_frame, FrameKind, FrameOutcome};
    use symex_core::ControlSignal;

    /// Run a snippet as a unit without touching the file system
    pub(crate) fn run(source: &str) -> (FrameOutcome, Interpreter) {
        run_with(source, Limits::default())
    }

    pub(crate) fn run_with(source: &str, limits: Limits) -> (FrameOutcome, Interpreter) {
        let path = PathBuf::from("/app/test.php");
        let unit = MagoParser.parse(&path, source).expect("snippet parses");
        let mut interpreter = Interpreter::with_limits(limits);
        let (_, outcome) = with_frame(&mut interpreter, FrameKind::File, "test.php", |h| {
            with_file(h, path.clone(), |h| {
                h.hoist(&unit);
                h.exec_block(&unit.statements)
            })
        })
        .expect("no invariant violation");
        (outcome, interpreter)
    }

    /// The text a request sees when exactly the atoms in `world` hold
    pub(crate) fn text_in(node: &DataNode, world: &[&str]) -> String {
        match node {
            DataNode::Conditional(alternatives) => alternatives
                .iter()
                .find(|alt| holds(&alt.condition, world))
                .map_or_else(String::new, |alt| text_in(&alt.node, world)),
            DataNode::Concat(parts) => parts.iter().map(|p| text_in(p, world)).collect(),
            DataNode::Control(ControlSignal::Exit) => "#exit".to_string(),
            other => other.to_php_string().unwrap_or_else(|| other.describe()),
        }
    }

    fn holds(condition: &Condition, world: &[&str]) -> bool {
        match condition {
            Condition::True => true,
            Condition::False => false,
            Condition::Atom(text) => world.contains(&text.as_str()),
            Condition::Not(inner) => !holds(inner, world),
            Condition::And(items) => items.iter().all(|c| holds(c, world)),
            Condition::Or(items) => items.iter().any(|c| holds(c, world)),
        }
    }

    fn s(text: &str) -> DataNode {
        DataNode::string(text)
    }

    fn atom(text: &str) -> Condition {
        Condition::atom(text)
    }

    #[test]
    fn test_if_else_on_symbolic_constant() {
        let (outcome, _) = run("<?php if (cond) { echo \"A\"; } else { echo \"B\"; }");
        assert_eq!(
            outcome.output,
            DataNode::merge(vec![
                (atom("cond"), s("A")),
                (Condition::not(atom("cond")), s("B")),
            ])
        );
    }

    #[test]
    fn test_concrete_if_does_not_fork() {
        let (outcome, _) = run("<?php $x = 2; if ($x > 1) { echo 'big'; } else { echo 'small'; }");
        assert_eq!(outcome.output, s("big"));
    }

    #[test]
    fn test_conditional_return_in_unit() {
        let (outcome, _) = run("<?php if (cond) { return 1; } echo \"X\";");
        let c = atom("cond");
        assert_eq!(
            outcome.value,
            DataNode::merge(vec![
                (c.clone(), DataNode::int(1)),
                (Condition::not(c.clone()), DataNode::Unset),
            ])
        );
        assert_eq!(
            outcome.output,
            DataNode::merge(vec![(c.clone(), s("")), (Condition::not(c), s("X"))])
        );
    }

    #[test]
    fn test_elseif_chain_nests() {
        let (outcome, _) = run(
            "<?php if ($_GET['p'] == 'a') { echo 'A'; } elseif ($_GET['p'] == 'b') { echo 'B'; } else { echo 'C'; }",
        );
        let a = atom("$_GET['p'] == 'a'");
        let b = atom("$_GET['p'] == 'b'");
        assert_eq!(
            outcome.output,
            DataNode::merge(vec![
                (a.clone(), s("A")),
                (
                    Condition::not(a),
                    DataNode::merge(vec![(b.clone(), s("B")), (Condition::not(b), s("C"))]),
                ),
            ])
        );
    }

    #[test]
    fn test_variables_merge_after_branch() {
        let (outcome, interpreter) = run("<?php if (flag) { $x = 'on'; } else { $x = 'off'; } echo $x;");
        let f = atom("flag");
        let expected = DataNode::merge(vec![(f.clone(), s("on")), (Condition::not(f), s("off"))]);
        assert_eq!(outcome.output, expected);
        assert_eq!(interpreter.env_ref().get_variable("x"), Some(expected));
    }

    #[test]
    fn test_inline_html_and_echo() {
        let (outcome, _) = run("<h1><?php echo 'Title'; ?></h1>\n");
        assert_eq!(outcome.output, s("<h1>Title</h1>\n"));
    }

    #[test]
    fn test_undefined_variable_is_recorded() {
        let (outcome, interpreter) = run("<?php echo $missing;");
        assert_eq!(outcome.output, s(""));
        let errors = interpreter.env_ref().errors();
        assert_eq!(errors.count_of(CompletionKind::UnboundReference), 1);
        assert_eq!(errors.errors()[0].file.as_deref(), Some(Path::new("/app/test.php")));
    }

    #[test]
    fn test_isset_is_silent() {
        let (_, interpreter) = run("<?php if (isset($missing)) { echo 'x'; }");
        assert!(interpreter.env_ref().errors().is_empty());
    }

    #[test]
    fn test_function_call_and_return_isolation() {
        let source = "<?php
            function pick($v) {
                if ($v) { return 'yes'; }
                return 'no';
            }
            echo pick(flag);
            echo '!';
        ";
        let (outcome, _) = run(source);
        let f = atom("flag");
        assert_eq!(
            outcome.output,
            DataNode::concat(vec![
                DataNode::merge(vec![(f.clone(), s("yes")), (Condition::not(f), s("no"))]),
                s("!"),
            ])
        );
        assert_eq!(outcome.value, DataNode::Unset);
    }

    #[test]
    fn test_exit_in_branch_keeps_other_path() {
        let (outcome, _) = run("<?php if (stop) { echo 'bye'; exit; } echo 'rest';");
        assert!(!outcome.exited);
        assert_eq!(outcome.exit_condition, atom("stop"));
        assert_eq!(outcome.output, s("rest"));
    }

    #[test]
    fn test_break_outside_loop_is_unsupported() {
        let (outcome, interpreter) = run("<?php echo 'a'; break; echo 'b';");
        assert_eq!(outcome.output, s("a"));
        assert_eq!(
            interpreter.env_ref().errors().count_of(CompletionKind::Unsupported),
            1
        );
    }

    #[test]
    fn test_globals_in_functions() {
        let source = "<?php
            $count = 1;
            function bump() { global $count; $count = $count + 1; }
            bump();
            echo $count;
        ";
        let (outcome, _) = run(source);
        assert_eq!(outcome.output, s("2"));
    }

    #[test]
    fn test_unsupported_statement_is_skipped() {
        let (outcome, interpreter) = run("<?php class A {} echo 'after';");
        assert_eq!(outcome.output, s("after"));
        assert_eq!(
            interpreter.env_ref().errors().count_of(CompletionKind::Unsupported),
            1
        );
    }
}
