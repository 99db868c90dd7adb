//! Expression evaluation
//!
//! Expressions evaluate to a DataNode. Short-circuiting operators and the
//! ternary fork the current path like an `if` does, and their result is
//! the merge of what each arm produced.

use super::{ops, Interpreter};
use crate::ir::{ArrayItem, BinaryOp, Expr, ExprKind, InterpolatedPart};
use crate::parser::UnitParser;
use symex_core::env::with_branch;
use symex_core::{ArrayKey, CompletionKind, Condition, DataNode, Literal, Result, Satisfiability};

/// Request variables whose content comes from outside the program
const SUPERGLOBALS: &[&str] = &[
    "_GET", "_POST", "_REQUEST", "_COOKIE", "_SERVER", "_SESSION", "_FILES", "_ENV", "GLOBALS",
];

impl<P: UnitParser> Interpreter<P> {
    /// The condition under which `expr` is truthy
    pub(crate) fn eval_condition(&mut self, expr: &Expr) -> Result<Condition> {
        Ok(self.eval(expr)?.truth())
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<DataNode> {
        let value = match &expr.kind {
            ExprKind::Null => DataNode::null(),
            ExprKind::Bool(b) => DataNode::bool(*b),
            ExprKind::Int(n) => DataNode::int(*n),
            ExprKind::Float(f) => DataNode::float(*f),
            ExprKind::Str(s) => DataNode::string(s.as_str()),
            ExprKind::Interpolated(parts) => {
                let mut pieces = Vec::with_capacity(parts.len());
                for part in parts {
                    pieces.push(match part {
                        InterpolatedPart::Text(text) => DataNode::string(text.as_str()),
                        InterpolatedPart::Expr(inner) => self.eval(inner)?,
                    });
                }
                pieces
                    .iter()
                    .fold(DataNode::string(""), |acc, piece| ops::binary(BinaryOp::Concat, &acc, piece))
            }
            ExprKind::Array(items) => self.eval_array(items)?,
            ExprKind::Variable(name) => self.read_variable(name),
            ExprKind::ArrayAccess { array, index } => {
                let container = self.eval(array)?;
                match index {
                    Some(index) => {
                        let key = self.eval(index)?;
                        let mut missing = false;
                        let value = ops::index(&container, &key, &mut missing);
                        if missing {
                            self.note(
                                CompletionKind::UnboundReference,
                                format!("Undefined array key {}", index.text),
                            );
                        }
                        value
                    }
                    None => {
                        self.note(
                            CompletionKind::Unsupported,
                            format!("Cannot use [] for reading: {}", expr.text),
                        );
                        DataNode::null()
                    }
                }
            }
            ExprKind::Constant(name) => self.read_constant(name),
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::And => self.eval_logical(lhs, rhs, true)?,
                BinaryOp::Or => self.eval_logical(lhs, rhs, false)?,
                BinaryOp::Coalesce => self.eval_coalesce(lhs, rhs)?,
                op => {
                    let left = self.eval(lhs)?;
                    let right = self.eval(rhs)?;
                    ops::binary(*op, &left, &right)
                }
            },
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                ops::unary(*op, &value)
            }
            ExprKind::Cast { kind, operand } => {
                let value = self.eval(operand)?;
                ops::cast(*kind, &value)
            }
            ExprKind::IncDec {
                increment,
                prefix,
                target,
            } => {
                let old = self.eval_quiet(target)?;
                let new = ops::increment(&old, *increment);
                self.assign(target, new.clone())?;
                if *prefix {
                    new
                } else {
                    old
                }
            }
            ExprKind::Assign { target, op, value } => match op {
                None => {
                    let value = self.eval(value)?;
                    self.assign(target, value.clone())?;
                    value
                }
                Some(BinaryOp::Coalesce) => {
                    let result = self.eval_coalesce(target, value)?;
                    self.assign(target, result.clone())?;
                    result
                }
                Some(op) => {
                    let current = self.eval(target)?;
                    let operand = self.eval(value)?;
                    let result = ops::binary(*op, &current, &operand);
                    self.assign(target, result.clone())?;
                    result
                }
            },
            ExprKind::Ternary {
                condition,
                then,
                otherwise,
            } => self.eval_ternary(condition, then.as_deref(), otherwise)?,
            ExprKind::Isset(values) => {
                let mut conditions = Vec::with_capacity(values.len());
                for value in values {
                    let value = self.eval_quiet(value)?;
                    conditions.push(ops::isset_condition(&value));
                }
                DataNode::from_condition(Condition::and_all(conditions))
            }
            ExprKind::Empty(value) => {
                let value = self.eval_quiet(value)?;
                DataNode::from_condition(Condition::not(value.truth()))
            }
            ExprKind::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.call(name, values, &expr.text)?
            }
            ExprKind::Include { kind, target } => self.include(*kind, target)?,
            ExprKind::Exit(argument) => {
                if let Some(argument) = argument {
                    let value = self.eval(argument)?;
                    // an integer argument is the exit status, anything else is printed
                    let printed = value.map(&mut |leaf: &DataNode| match leaf {
                        DataNode::Concrete(Literal::Int(_)) => DataNode::string(""),
                        other => ops::string_value(other),
                    });
                    self.env.emit(printed);
                }
                self.env.record_exit()?;
                DataNode::null()
            }
            ExprKind::Print(value) => {
                let value = self.eval(value)?;
                self.env.emit(ops::to_output(&value));
                DataNode::int(1)
            }
            ExprKind::Unsupported => {
                self.note(
                    CompletionKind::Unsupported,
                    format!("Unsupported expression: {}", expr.text),
                );
                DataNode::symbolic(expr.text.as_str())
            }
        };
        Ok(value)
    }

    /// Evaluate without reporting undefined variables or keys
    fn eval_quiet(&mut self, expr: &Expr) -> Result<DataNode> {
        self.quiet += 1;
        let value = self.eval(expr);
        self.quiet -= 1;
        value
    }

    fn read_variable(&mut self, name: &str) -> DataNode {
        if let Some(value) = self.env.get_variable(name) {
            return value;
        }
        if SUPERGLOBALS.contains(&name) || name == "this" {
            return DataNode::symbolic(format!("${}", name));
        }
        self.note(
            CompletionKind::UnboundReference,
            format!("Undefined variable ${}", name),
        );
        DataNode::null()
    }

    fn read_constant(&mut self, name: &str) -> DataNode {
        match name.to_ascii_lowercase().as_str() {
            "true" => return DataNode::bool(true),
            "false" => return DataNode::bool(false),
            "null" => return DataNode::null(),
            "__function__" => {
                return DataNode::string(self.env.current_function().unwrap_or_default().to_string())
            }
            "__class__" | "__method__" | "__namespace__" | "__trait__" => return DataNode::string(""),
            _ => {}
        }
        if let Some(value) = self.env.get_constant(name) {
            return value;
        }
        match name {
            "PHP_EOL" => DataNode::string("\n"),
            "DIRECTORY_SEPARATOR" => DataNode::string("/"),
            "PHP_INT_MAX" => DataNode::int(i64::MAX),
            "PHP_INT_MIN" => DataNode::int(i64::MIN),
            "PHP_INT_SIZE" => DataNode::int(8),
            "E_ALL" => DataNode::int(32767),
            // configuration and feature flags the program reads from its environment
            _ => DataNode::symbolic(name),
        }
    }

    fn eval_array(&mut self, items: &[ArrayItem]) -> Result<DataNode> {
        let mut entries: Vec<(ArrayKey, DataNode)> = Vec::with_capacity(items.len());
        for item in items {
            let key = match &item.key {
                Some(key_expr) => {
                    let key = self.eval(key_expr)?;
                    match ops::known(&key).as_ref().and_then(ops::array_key) {
                        Some(key) => key,
                        None => {
                            self.note(
                                CompletionKind::Unsupported,
                                format!("Array key is not known: {}", key_expr.text),
                            );
                            ArrayKey::Str(key.describe())
                        }
                    }
                }
                None => ops::next_index(&entries),
            };
            let value = self.eval(&item.value)?;
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }
        }
        Ok(DataNode::array(entries))
    }

    /// `a && b` (`and_op`) or `a || b`, evaluating `b` only where it is reached
    fn eval_logical(&mut self, lhs: &Expr, rhs: &Expr, and_op: bool) -> Result<DataNode> {
        let left = self.eval_condition(lhs)?;
        let reaches_rhs = if and_op {
            left.clone()
        } else {
            Condition::not(left.clone())
        };
        match self.env.decide(&reaches_rhs) {
            Satisfiability::No => Ok(DataNode::bool(!and_op)),
            Satisfiability::Yes => {
                let right = self.eval_condition(rhs)?;
                Ok(DataNode::from_condition(right))
            }
            Satisfiability::Maybe => {
                let guards = [reaches_rhs.clone(), Condition::not(reaches_rhs)];
                let results = with_branch(self, &guards, |h, arm| {
                    if arm == 0 {
                        h.eval_condition(rhs)
                    } else {
                        Ok(Condition::from_bool(!and_op))
                    }
                })?;
                Ok(DataNode::from_condition(Condition::or_all(
                    results.into_iter().map(|(guard, truth)| Condition::and(guard, truth)),
                )))
            }
        }
    }

    fn eval_coalesce(&mut self, lhs: &Expr, rhs: &Expr) -> Result<DataNode> {
        let left = self.eval_quiet(lhs)?;
        let defined = ops::isset_condition(&left);
        match self.env.decide(&defined) {
            Satisfiability::Yes => Ok(left),
            Satisfiability::No => self.eval(rhs),
            Satisfiability::Maybe => {
                let guards = [defined.clone(), Condition::not(defined)];
                let results = with_branch(self, &guards, |h, arm| {
                    if arm == 0 {
                        let path = h.env.path().clone();
                        Ok(left.restrict(&path, h.env.solver()))
                    } else {
                        h.eval(rhs)
                    }
                })?;
                Ok(DataNode::merge(results))
            }
        }
    }

    fn eval_ternary(&mut self, condition: &Expr, then: Option<&Expr>, otherwise: &Expr) -> Result<DataNode> {
        let value = self.eval(condition)?;
        let test = value.truth();
        let pick = |h: &mut Self, take_then: bool| -> Result<DataNode> {
            match (take_then, then) {
                (true, Some(then)) => h.eval(then),
                (true, None) => Ok(value.clone()),
                (false, _) => h.eval(otherwise),
            }
        };
        match self.env.decide(&test) {
            Satisfiability::Yes => pick(self, true),
            Satisfiability::No => pick(self, false),
            Satisfiability::Maybe => {
                let guards = [test.clone(), Condition::not(test)];
                let results = with_branch(self, &guards, |h, arm| pick(h, arm == 0))?;
                Ok(DataNode::merge(results))
            }
        }
    }

    // ==================== Writes ====================

    /// Store `value` into an assignable expression
    pub(crate) fn assign(&mut self, target: &Expr, value: DataNode) -> Result<()> {
        match &target.kind {
            ExprKind::Variable(name) => {
                self.env.set_variable(name, value);
                Ok(())
            }
            ExprKind::ArrayAccess { .. } => {
                let Some((name, keys)) = self.element_path(target)? else {
                    return Ok(());
                };
                let current = self.env.get_variable(&name).unwrap_or(DataNode::Unset);
                let mut blocked = false;
                let updated = ops::assign_index(&current, &keys, &value, &mut blocked);
                if blocked {
                    self.note(
                        CompletionKind::Unsupported,
                        format!("Cannot write an element of ${}", name),
                    );
                }
                self.env.set_variable(&name, updated);
                Ok(())
            }
            _ => {
                self.note(
                    CompletionKind::Unsupported,
                    format!("Cannot assign to {}", target.text),
                );
                Ok(())
            }
        }
    }

    pub(crate) fn unset(&mut self, target: &Expr) -> Result<()> {
        match &target.kind {
            ExprKind::Variable(name) => self.env.unset_variable(name),
            ExprKind::ArrayAccess { .. } => {
                let Some((name, keys)) = self.element_path(target)? else {
                    return Ok(());
                };
                let Some(keys) = keys.into_iter().collect::<Option<Vec<ArrayKey>>>() else {
                    self.note(CompletionKind::Unsupported, format!("Cannot unset {}", target.text));
                    return Ok(());
                };
                if let Some(current) = self.env.get_variable(&name) {
                    self.env.set_variable(&name, ops::unset_index(&current, &keys));
                }
            }
            _ => self.note(CompletionKind::Unsupported, format!("Cannot unset {}", target.text)),
        }
        Ok(())
    }

    /// Base variable and keys of `$a[k1][k2]...`; `None` keys are appends
    fn element_path(&mut self, target: &Expr) -> Result<Option<(String, Vec<Option<ArrayKey>>)>> {
        let mut indexes = Vec::new();
        let mut base = target;
        while let ExprKind::ArrayAccess { array, index } = &base.kind {
            indexes.push(index.as_deref());
            base = &**array;
        }
        let ExprKind::Variable(name) = &base.kind else {
            self.note(
                CompletionKind::Unsupported,
                format!("Cannot write an element of {}", base.text),
            );
            return Ok(None);
        };

        let mut keys = Vec::with_capacity(indexes.len());
        for index in indexes.into_iter().rev() {
            let Some(index) = index else {
                keys.push(None);
                continue;
            };
            let key = self.eval(index)?;
            match ops::known(&key).as_ref().and_then(ops::array_key) {
                Some(key) => keys.push(Some(key)),
                None => {
                    self.note(
                        CompletionKind::Unsupported,
                        format!("Array key is not known: {}", index.text),
                    );
                    return Ok(None);
                }
            }
        }
        Ok(Some((name.clone(), keys)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{run, run_with};
    use symex_core::env::Limits;
    use symex_core::{CompletionKind, Condition, DataNode};

    fn s(text: &str) -> DataNode {
        DataNode::string(text)
    }

    #[test]
    fn test_interpolation_with_symbolic_input() {
        let (outcome, _) = run("<?php $name = $_GET['name']; echo \"Hi $name!\";");
        assert_eq!(
            outcome.output,
            DataNode::Concat(vec![s("Hi "), DataNode::symbolic("$_GET['name']"), s("!")])
        );
    }

    #[test]
    fn test_ternary_merges_values() {
        let (outcome, _) = run("<?php echo debug ? 'on' : 'off';");
        let d = Condition::atom("debug");
        assert_eq!(
            outcome.output,
            DataNode::merge(vec![(d.clone(), s("on")), (Condition::not(d), s("off"))])
        );
    }

    #[test]
    fn test_short_circuit_skips_side_effects() {
        let (outcome, _) = run("<?php $x = 0; false && ($x = 1); true || ($x = 2); echo $x;");
        assert_eq!(outcome.output, s("0"));
    }

    #[test]
    fn test_logical_and_builds_condition() {
        let (outcome, _) = run("<?php if (a && b) { echo 'both'; }");
        let both = Condition::and(Condition::atom("a"), Condition::atom("b"));
        assert_eq!(
            outcome.output,
            DataNode::merge(vec![(both.clone(), s("both")), (Condition::not(both), s(""))])
        );
    }

    #[test]
    fn test_coalesce_on_request_input() {
        let (outcome, _) = run("<?php echo $_GET['page'] ?? 'home';");
        let set = Condition::atom("isset($_GET['page'])");
        assert_eq!(
            outcome.output,
            DataNode::merge(vec![
                (set.clone(), DataNode::symbolic("$_GET['page']")),
                (Condition::not(set), s("home")),
            ])
        );
    }

    #[test]
    fn test_array_writes_and_reads() {
        let (outcome, _) = run(
            "<?php $a = ['x' => 1]; $a['y'] = 2; $a[] = 3; $a['x'] += 10; echo $a['x'], '-', $a['y'], '-', $a[0], '-', count($a);",
        );
        assert_eq!(outcome.output, s("11-2-3-3"));
    }

    #[test]
    fn test_increments() {
        let (outcome, _) = run("<?php $i = 1; $j = $i++; $k = ++$i; echo $i, $j, $k;");
        assert_eq!(outcome.output, s("313"));
    }

    #[test]
    fn test_string_concat_assignment() {
        let (outcome, _) = run("<?php $out = 'a'; $out .= 'b'; $out .= 1 + 2; echo $out;");
        assert_eq!(outcome.output, s("ab3"));
    }

    #[test]
    fn test_constants() {
        let (outcome, interpreter) = run("<?php define('GREETING', 'hello'); const NAME = 'world'; echo GREETING, ' ', NAME, PHP_EOL;");
        assert_eq!(outcome.output, s("hello world\n"));
        assert!(interpreter.env_ref().errors().is_empty());
    }

    #[test]
    fn test_unknown_constant_is_symbolic() {
        let (outcome, interpreter) = run("<?php echo SITE_NAME;");
        assert_eq!(outcome.output, DataNode::symbolic("SITE_NAME"));
        assert!(interpreter.env_ref().errors().is_empty());
    }

    #[test]
    fn test_exit_with_message() {
        let (outcome, _) = run("<?php echo 'a'; die('stop');");
        assert!(outcome.exited);
        assert_eq!(outcome.exit_condition, Condition::True);
    }

    #[test]
    fn test_unknown_function_is_symbolic() {
        let (outcome, interpreter) = run_with("<?php echo get_title(1);", Limits::default());
        assert_eq!(outcome.output, DataNode::symbolic("get_title(1)"));
        assert_eq!(
            interpreter.env_ref().errors().count_of(CompletionKind::UnboundReference),
            1
        );
    }

    #[test]
    fn test_unset_variable_and_element() {
        let (outcome, _) = run("<?php $a = [1, 2]; unset($a[0]); $b = 1; unset($b); echo count($a), isset($b) ? 'set' : 'gone';");
        assert_eq!(outcome.output, s("1gone"));
    }
}
