//! Loops and `switch`
//!
//! Loops are unrolled. Each iteration splits the current path at the loop
//! test: the part where the test fails is parked with the loop's breaks
//! and the rest runs the body again. A path still iterating when the
//! iteration bound is reached is cut off with an approximation marker.

use super::{ops, Interpreter};
use crate::ir::{BinaryOp, Expr, Stmt, SwitchCase};
use crate::parser::UnitParser;
use symex_core::env::{with_branch, with_loop, LoopKind};
use symex_core::{ArrayKey, CompletionKind, Condition, DataNode, Literal, Result};

impl<P: UnitParser> Interpreter<P> {
    /// Stop iterating once the bound is hit; true when the path was cut off
    fn iteration_bound(&mut self, iterations: usize, what: &str, line: u32) -> Result<bool> {
        let max = self.env.limits().max_loop_iterations;
        if iterations < max {
            return Ok(false);
        }
        self.approximate(format!(
            "{} at line {} still running after {} iterations",
            what, line, max
        ));
        self.env.leave_loop()?;
        Ok(true)
    }

    /// Run one iteration of a loop body, rejoining the paths that hit `continue`
    fn run_iteration(&mut self, body: &[Stmt]) -> Result<()> {
        let base = self.env.path().clone();
        self.exec_block(body)?;
        self.env.end_iteration(&base)
    }

    pub(crate) fn exec_while(&mut self, condition: &Expr, body: &[Stmt]) -> Result<()> {
        let line = self.env.line();
        with_loop(self, LoopKind::Loop, |h| {
            let mut iterations = 0;
            while h.env.is_live() {
                let stay = h.eval_condition(condition)?;
                h.env.leave_loop_unless(&stay)?;
                if !h.env.is_live() || h.iteration_bound(iterations, "while loop", line)? {
                    break;
                }
                iterations += 1;
                h.run_iteration(body)?;
            }
            Ok(())
        })
    }

    pub(crate) fn exec_do_while(&mut self, body: &[Stmt], condition: &Expr) -> Result<()> {
        let line = self.env.line();
        with_loop(self, LoopKind::Loop, |h| {
            let mut iterations = 0;
            while h.env.is_live() {
                if h.iteration_bound(iterations, "do-while loop", line)? {
                    break;
                }
                iterations += 1;
                h.run_iteration(body)?;
                if !h.env.is_live() {
                    break;
                }
                let stay = h.eval_condition(condition)?;
                h.env.leave_loop_unless(&stay)?;
            }
            Ok(())
        })
    }

    pub(crate) fn exec_for(
        &mut self,
        init: &[Expr],
        conditions: &[Expr],
        step: &[Expr],
        body: &[Stmt],
    ) -> Result<()> {
        let line = self.env.line();
        for expr in init {
            self.eval(expr)?;
        }
        with_loop(self, LoopKind::Loop, |h| {
            let mut iterations = 0;
            while h.env.is_live() {
                // every test runs, the last one decides
                let mut stay = Condition::True;
                for test in conditions {
                    stay = h.eval_condition(test)?;
                }
                h.env.leave_loop_unless(&stay)?;
                if !h.env.is_live() || h.iteration_bound(iterations, "for loop", line)? {
                    break;
                }
                iterations += 1;
                h.run_iteration(body)?;
                for expr in step {
                    if !h.env.is_live() {
                        break;
                    }
                    h.eval(expr)?;
                }
            }
            Ok(())
        })
    }

    pub(crate) fn exec_foreach(
        &mut self,
        subject: &Expr,
        key: Option<&Expr>,
        value: &Expr,
        body: &[Stmt],
    ) -> Result<()> {
        let iterable = self.eval(subject)?;
        match iterable {
            DataNode::Conditional(alternatives) => {
                let guards: Vec<Condition> =
                    alternatives.iter().map(|alt| alt.condition.clone()).collect();
                with_branch(self, &guards, |h, arm| {
                    h.foreach_leaf(&alternatives[arm].node, &subject.text, key, value, body)
                })?;
                Ok(())
            }
            leaf => self.foreach_leaf(&leaf, &subject.text, key, value, body),
        }
    }

    fn foreach_leaf(
        &mut self,
        iterable: &DataNode,
        text: &str,
        key: Option<&Expr>,
        value: &Expr,
        body: &[Stmt],
    ) -> Result<()> {
        let line = self.env.line();
        match iterable {
            DataNode::Concrete(Literal::Array(entries)) => with_loop(self, LoopKind::Loop, |h| {
                for (iterations, (k, v)) in entries.iter().enumerate() {
                    if !h.env.is_live() || h.iteration_bound(iterations, "foreach loop", line)? {
                        break;
                    }
                    h.bind_foreach(key, value, array_key_value(k), v.clone())?;
                    h.run_iteration(body)?;
                }
                Ok(())
            }),
            DataNode::Concrete(lit) => {
                self.note(
                    CompletionKind::Unsupported,
                    format!(
                        "foreach() argument must be of type array, {} given: {}",
                        lit.type_name(),
                        text
                    ),
                );
                Ok(())
            }
            DataNode::Unset | DataNode::Control(_) => Ok(()),
            other => {
                // unknown length: iteration k runs where the input has more than k elements
                let description = other.describe();
                with_loop(self, LoopKind::Loop, |h| {
                    let mut iterations = 0;
                    while h.env.is_live() {
                        let stay = Condition::atom(format!("count({}) > {}", description, iterations));
                        h.env.leave_loop_unless(&stay)?;
                        if !h.env.is_live() || h.iteration_bound(iterations, "foreach loop", line)? {
                            break;
                        }
                        let element = DataNode::symbolic(format!("{}[{}]", description, iterations));
                        h.bind_foreach(key, value, DataNode::int(iterations as i64), element)?;
                        iterations += 1;
                        h.run_iteration(body)?;
                    }
                    Ok(())
                })
            }
        }
    }

    fn bind_foreach(
        &mut self,
        key: Option<&Expr>,
        value: &Expr,
        key_value: DataNode,
        element: DataNode,
    ) -> Result<()> {
        if let Some(key) = key {
            self.assign(key, key_value)?;
        }
        self.assign(value, element)
    }

    pub(crate) fn exec_switch(&mut self, subject: &Expr, cases: &[SwitchCase]) -> Result<()> {
        let subject = self.eval(subject)?;
        with_loop(self, LoopKind::Switch, |h| {
            // a case is entered where it matches and no earlier case did
            let mut earlier: Vec<Condition> = Vec::new();
            let mut entries: Vec<(Condition, Option<usize>)> = Vec::new();
            for (i, case) in cases.iter().enumerate() {
                let Some(test) = &case.test else {
                    continue;
                };
                let test = h.eval(test)?;
                let matches = ops::binary(BinaryOp::Equal, &subject, &test).truth();
                let guard = Condition::and(
                    matches.clone(),
                    Condition::not(Condition::or_all(earlier.iter().cloned())),
                );
                earlier.push(matches);
                entries.push((guard, Some(i)));
            }
            let default = cases.iter().position(|case| case.test.is_none());
            entries.push((Condition::not(Condition::or_all(earlier)), default));

            let guards: Vec<Condition> = entries.iter().map(|(guard, _)| guard.clone()).collect();
            with_branch(h, &guards, |h, arm| {
                let Some(start) = entries[arm].1 else {
                    return Ok(());
                };
                for case in &cases[start..] {
                    if !h.env.is_live() {
                        break;
                    }
                    h.exec_block(&case.body)?;
                }
                Ok(())
            })?;
            Ok(())
        })
    }
}

fn array_key_value(key: &ArrayKey) -> DataNode {
    match key {
        ArrayKey::Int(n) => DataNode::int(*n),
        ArrayKey::Str(s) => DataNode::string(s.as_str()),
    }
}
