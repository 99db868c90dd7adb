//! Built-in functions the interpreter folds
//!
//! Known arguments are computed with PHP semantics. Unknown arguments give
//! a symbolic value that reads like the call.

use super::{ops, Interpreter};
use crate::parser::UnitParser;
use std::path::Path;
use symex_core::{CompletionKind, Condition, DataNode, Literal};

fn symbolic_call(name: &str, args: &[DataNode]) -> DataNode {
    let described: Vec<String> = args.iter().map(DataNode::describe).collect();
    DataNode::symbolic(format!("{}({})", name, described.join(", ")))
}

/// Apply a string function to every leaf of the first argument
fn map_string<F>(name: &str, args: &[DataNode], f: F) -> DataNode
where
    F: Fn(&str) -> DataNode,
{
    let Some(first) = args.first() else {
        return symbolic_call(name, args);
    };
    first.map(&mut |leaf: &DataNode| match ops::known(leaf) {
        Some(Literal::Array(_)) | None => symbolic_call(name, std::slice::from_ref(leaf)),
        Some(lit) => f(&lit.to_php_string()),
    })
}

fn known_string(value: Option<&DataNode>) -> Option<String> {
    match ops::known(value?)? {
        Literal::Array(_) => None,
        lit => Some(lit.to_php_string()),
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn implode(name: &str, args: &[DataNode]) -> DataNode {
    // implode($pieces, $glue) is the legacy argument order
    let (glue, pieces) = match (args.first(), args.get(1)) {
        (Some(DataNode::Concrete(Literal::Array(_))), Some(glue)) => (Some(glue), &args[0]),
        (Some(glue), Some(pieces)) => (Some(glue), pieces),
        (Some(pieces), None) => (None, pieces),
        _ => return symbolic_call(name, args),
    };
    let glue = match glue {
        Some(glue) => known_string(Some(glue)),
        None => Some(String::new()),
    };
    match (glue, pieces) {
        (Some(glue), DataNode::Concrete(Literal::Array(entries))) => {
            let mut parts = Vec::with_capacity(entries.len() * 2);
            for (i, (_, value)) in entries.iter().enumerate() {
                if i > 0 {
                    parts.push(DataNode::string(glue.as_str()));
                }
                parts.push(ops::to_output(value));
            }
            DataNode::concat(parts)
        }
        _ => symbolic_call(name, args),
    }
}

impl<P: UnitParser> Interpreter<P> {
    /// Evaluate a built-in function; `None` when `name` is not one
    pub(crate) fn call_builtin(&mut self, name: &str, args: &[DataNode]) -> Option<DataNode> {
        let lower = name.to_ascii_lowercase();
        let value = match lower.as_str() {
            "strlen" => map_string(&lower, args, |s| DataNode::int(s.len() as i64)),
            "strtoupper" => map_string(&lower, args, |s| DataNode::string(s.to_uppercase())),
            "strtolower" => map_string(&lower, args, |s| DataNode::string(s.to_lowercase())),
            "ucfirst" => map_string(&lower, args, |s| DataNode::string(ucfirst(s))),
            "trim" => map_string(&lower, args, |s| DataNode::string(s.trim())),
            "ltrim" => map_string(&lower, args, |s| DataNode::string(s.trim_start())),
            "rtrim" | "chop" => map_string(&lower, args, |s| DataNode::string(s.trim_end())),
            "htmlspecialchars" | "htmlentities" => {
                map_string(&lower, args, |s| DataNode::string(escape_html(s)))
            }
            "nl2br" => map_string(&lower, args, |s| DataNode::string(s.replace('\n', "<br />\n"))),
            "strval" => map_string(&lower, args, |s| DataNode::string(s)),
            "intval" => args.first().map_or(DataNode::int(0), |v| {
                v.map(&mut |leaf: &DataNode| match ops::known(leaf) {
                    Some(lit) => DataNode::int(ops::to_int(&lit)),
                    None => symbolic_call("intval", std::slice::from_ref(leaf)),
                })
            }),
            "count" | "sizeof" => args.first().map_or(DataNode::int(0), ops::count),
            "is_array" => args.first().map_or(DataNode::bool(false), |v| {
                v.map(&mut |leaf: &DataNode| match leaf {
                    DataNode::Concrete(lit) => DataNode::bool(matches!(lit, Literal::Array(_))),
                    DataNode::Unset => DataNode::bool(false),
                    other => symbolic_call("is_array", std::slice::from_ref(other)),
                })
            }),
            "is_null" => args.first().map_or(DataNode::bool(true), |v| {
                DataNode::from_condition(Condition::not(ops::isset_condition(v)))
            }),
            "str_repeat" => match (known_string(args.first()), args.get(1).and_then(ops::known)) {
                (Some(s), Some(times)) => {
                    let times = usize::try_from(ops::to_int(&times)).unwrap_or(0);
                    let max = self.env.limits().max_string_length;
                    match s.len().checked_mul(times).filter(|len| *len <= max) {
                        Some(_) => DataNode::string(s.repeat(times)),
                        None => {
                            let reason = format!("str_repeat result longer than {} bytes", max);
                            self.note(CompletionKind::IterationBoundExceeded, reason.clone());
                            DataNode::Approximate(reason)
                        }
                    }
                }
                _ => symbolic_call(&lower, args),
            },
            "implode" | "join" => implode(&lower, args),
            "dirname" => map_string(&lower, args, |s| {
                let parent = Path::new(s)
                    .parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| ".".to_string());
                DataNode::string(parent)
            }),
            "basename" => map_string(&lower, args, |s| {
                let base = Path::new(s)
                    .file_name()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                DataNode::string(base)
            }),
            "define" => match known_string(args.first()) {
                Some(constant) => {
                    let value = args.get(1).cloned().unwrap_or_else(DataNode::null);
                    self.env.define_constant(&constant, value);
                    DataNode::bool(true)
                }
                None => {
                    self.note(
                        CompletionKind::Unsupported,
                        format!("define() with an unknown name: {}", symbolic_call(&lower, args).describe()),
                    );
                    DataNode::bool(false)
                }
            },
            "defined" => match known_string(args.first()) {
                Some(constant) => DataNode::from_condition(match self.env.get_constant(&constant) {
                    Some(_) => Condition::True,
                    None => Condition::atom(format!("defined('{}')", constant)),
                }),
                None => symbolic_call(&lower, args),
            },
            "function_exists" => match known_string(args.first()) {
                Some(function) => {
                    let key = function.trim_start_matches('\\').to_ascii_lowercase();
                    DataNode::bool(self.env.function(&key).is_some())
                }
                None => symbolic_call(&lower, args),
            },
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::run;
    use symex_core::{CompletionKind, Condition, DataNode};

    #[test]
    fn test_string_functions_fold() {
        let (outcome, _) = run("<?php echo strlen('abc'), strtoupper('x'), trim('  y '), ucfirst('zed');");
        assert_eq!(outcome.output, DataNode::string("3XyZed"));
    }

    #[test]
    fn test_repeat_is_bounded() {
        let (outcome, interpreter) = run("<?php echo str_repeat('ab', 3), '|', str_repeat('ab', PHP_INT_MAX);");
        let reason = "str_repeat result longer than 1048576 bytes".to_string();
        assert_eq!(
            outcome.output,
            DataNode::concat(vec![DataNode::string("ababab|"), DataNode::Approximate(reason)])
        );
        assert_eq!(
            interpreter
                .env_ref()
                .errors()
                .count_of(CompletionKind::IterationBoundExceeded),
            1
        );

        let (outcome, _) = run("<?php echo str_repeat('x', 10000000000);");
        assert!(matches!(outcome.output, DataNode::Approximate(_)));
        let (outcome, _) = run("<?php echo str_repeat('x', -2), 'end';");
        assert_eq!(outcome.output, DataNode::string("end"));
    }

    #[test]
    fn test_html_escaping() {
        let (outcome, _) = run("<?php echo htmlspecialchars('<a href=\"x\">&</a>');");
        assert_eq!(
            outcome.output,
            DataNode::string("&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;")
        );
    }

    #[test]
    fn test_symbolic_argument() {
        let (outcome, _) = run("<?php echo htmlspecialchars($_GET['q']);");
        assert_eq!(
            outcome.output,
            DataNode::symbolic("htmlspecialchars($_GET['q'])")
        );
    }

    #[test]
    fn test_implode_keeps_symbolic_items() {
        let (outcome, _) = run("<?php echo implode(', ', ['a', $_GET['b'], 'c']);");
        assert_eq!(
            outcome.output,
            DataNode::Concat(vec![
                DataNode::string("a, "),
                DataNode::symbolic("$_GET['b']"),
                DataNode::string(", c"),
            ])
        );
    }

    #[test]
    fn test_defined_checks() {
        let (outcome, _) = run("<?php define('A', 1); if (defined('A')) { echo 'a'; } if (defined('B')) { echo 'b'; }");
        let b = Condition::atom("defined('B')");
        assert_eq!(
            outcome.output,
            DataNode::concat(vec![
                DataNode::string("a"),
                DataNode::merge(vec![(b.clone(), DataNode::string("b")), (Condition::not(b), DataNode::string(""))]),
            ])
        );
    }

    #[test]
    fn test_dirname_and_basename() {
        let (outcome, _) = run("<?php echo dirname('/var/www/index.php'), ' ', basename('/var/www/index.php');");
        assert_eq!(outcome.output, DataNode::string("/var/www index.php"));
    }
}
