//! The conditional output tree node

use crate::condition::{Condition, Solver};
use crate::control::ControlSignal;
use serde::{Deserialize, Serialize};

/// A unit of the conditional output tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataNode {
    /// A known value
    Concrete(Literal),
    /// A value known only by the expression that produced it
    Symbolic(String),
    /// Output text mixing concrete and symbolic parts
    Concat(Vec<DataNode>),
    /// Alternatives in evaluation order, read first-match-wins
    Conditional(Vec<Alternative>),
    Control(ControlSignal),
    /// No value
    Unset,
    /// Exploration was cut short here
    Approximate(String),
}

/// One guarded alternative of a Conditional node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub condition: Condition,
    pub node: DataNode,
}

impl Alternative {
    pub fn new(condition: Condition, node: DataNode) -> Self {
        Self { condition, node }
    }
}

/// A concrete PHP value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<(ArrayKey, DataNode)>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArrayKey {
    Int(i64),
    Str(String),
}

impl ArrayKey {
    /// Normalize a key the way PHP does: integer-like strings become ints
    pub fn from_string(key: &str) -> ArrayKey {
        match key.parse::<i64>() {
            Ok(n) if n.to_string() == key => ArrayKey::Int(n),
            _ => ArrayKey::Str(key.to_string()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ArrayKey::Int(n) => n.to_string(),
            ArrayKey::Str(s) => quote(s),
        }
    }
}

impl std::fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrayKey::Int(n) => write!(f, "{}", n),
            ArrayKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl Literal {
    /// PHP truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Literal::Null => false,
            Literal::Bool(b) => *b,
            Literal::Int(n) => *n != 0,
            Literal::Float(f) => *f != 0.0,
            Literal::Str(s) => !s.is_empty() && s != "0",
            Literal::Array(entries) => !entries.is_empty(),
        }
    }

    /// PHP string conversion
    pub fn to_php_string(&self) -> String {
        match self {
            Literal::Null => String::new(),
            Literal::Bool(true) => "1".to_string(),
            Literal::Bool(false) => String::new(),
            Literal::Int(n) => n.to_string(),
            Literal::Float(f) => format_float(*f),
            Literal::Str(s) => s.clone(),
            Literal::Array(_) => "Array".to_string(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Literal::Array(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Bool(_) => "bool",
            Literal::Int(_) => "int",
            Literal::Float(_) => "float",
            Literal::Str(_) => "string",
            Literal::Array(_) => "array",
        }
    }
}

/// Format a float the way PHP's `echo` does (`precision = 14`, `%.14G`)
pub fn format_float(f: f64) -> String {
    const PRECISION: i32 = 14;
    if f.is_nan() {
        return "NAN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, f);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -5 || exponent >= PRECISION {
        let mantissa = trim_fraction(mantissa);
        let mantissa = if mantissa.contains('.') {
            mantissa.to_string()
        } else {
            format!("{}.0", mantissa)
        };
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}E{}{}", mantissa, sign, exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, f)).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl DataNode {
    pub fn null() -> DataNode {
        DataNode::Concrete(Literal::Null)
    }

    pub fn bool(value: bool) -> DataNode {
        DataNode::Concrete(Literal::Bool(value))
    }

    pub fn int(value: i64) -> DataNode {
        DataNode::Concrete(Literal::Int(value))
    }

    pub fn float(value: f64) -> DataNode {
        DataNode::Concrete(Literal::Float(value))
    }

    pub fn string(value: impl Into<String>) -> DataNode {
        DataNode::Concrete(Literal::Str(value.into()))
    }

    pub fn symbolic(description: impl Into<String>) -> DataNode {
        DataNode::Symbolic(description.into())
    }

    pub fn array(entries: Vec<(ArrayKey, DataNode)>) -> DataNode {
        DataNode::Concrete(Literal::Array(entries))
    }

    /// The boolean `c` as a value: `true` where `c` holds, `false` elsewhere
    pub fn from_condition(condition: Condition) -> DataNode {
        match condition {
            Condition::True => DataNode::bool(true),
            Condition::False => DataNode::bool(false),
            c => {
                let negated = Condition::not(c.clone());
                DataNode::Conditional(vec![
                    Alternative::new(c, DataNode::bool(true)),
                    Alternative::new(negated, DataNode::bool(false)),
                ])
            }
        }
    }

    /// Merge sibling alternatives into one node
    ///
    /// Alternatives keep their order. Those under `False` are dropped and
    /// anything after a `True` guard is unreachable. If every remaining
    /// alternative carries a structurally equal node, that node is returned
    /// with its condition elided.
    pub fn merge(alternatives: Vec<(Condition, DataNode)>) -> DataNode {
        let mut kept: Vec<Alternative> = Vec::with_capacity(alternatives.len());
        for (condition, node) in alternatives {
            if condition.is_false() {
                continue;
            }
            let last = condition.is_true();
            kept.push(Alternative::new(condition, node));
            if last {
                break;
            }
        }

        if kept.is_empty() {
            return DataNode::Unset;
        }
        if kept.iter().all(|alt| alt.node == kept[0].node) {
            return kept.swap_remove(0).node;
        }
        DataNode::Conditional(kept)
    }

    /// Drop alternatives that cannot hold under `context`
    ///
    /// An alternative whose guard is implied by the context becomes
    /// unconditional, which also cuts the alternatives after it.
    pub fn restrict(&self, context: &Condition, solver: &dyn Solver) -> DataNode {
        match self {
            DataNode::Conditional(alternatives) => {
                let mut kept = Vec::with_capacity(alternatives.len());
                for alt in alternatives {
                    let inner = Condition::and(context.clone(), alt.condition.clone());
                    if solver.check(&inner).no() {
                        continue;
                    }
                    let guard = if &inner == context {
                        Condition::True
                    } else {
                        alt.condition.clone()
                    };
                    kept.push((guard, alt.node.restrict(&inner, solver)));
                }
                DataNode::merge(kept)
            }
            DataNode::Concat(parts) => {
                DataNode::concat(parts.iter().map(|p| p.restrict(context, solver)))
            }
            DataNode::Concrete(Literal::Array(entries)) => DataNode::array(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.restrict(context, solver)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Join output fragments, fusing adjacent literal text
    pub fn concat(parts: impl IntoIterator<Item = DataNode>) -> DataNode {
        let mut out: Vec<DataNode> = Vec::new();
        for part in parts {
            match part {
                DataNode::Concat(inner) => {
                    for p in inner {
                        push_output(&mut out, p);
                    }
                }
                other => push_output(&mut out, other),
            }
        }

        match out.len() {
            0 => DataNode::string(""),
            1 => out.remove(0),
            _ => DataNode::Concat(out),
        }
    }

    /// Apply `f` to every leaf value, distributing over alternatives
    pub fn map<F>(&self, f: &mut F) -> DataNode
    where
        F: FnMut(&DataNode) -> DataNode,
    {
        match self {
            DataNode::Conditional(alternatives) => DataNode::merge(
                alternatives
                    .iter()
                    .map(|alt| (alt.condition.clone(), alt.node.map(f)))
                    .collect(),
            ),
            other => f(other),
        }
    }

    /// The condition under which this value is truthy
    ///
    /// Alternatives produced by the engine are disjoint, so each one
    /// contributes `guard && truthy` independently.
    pub fn truth(&self) -> Condition {
        match self {
            DataNode::Concrete(lit) => Condition::from_bool(lit.is_truthy()),
            DataNode::Symbolic(description) => Condition::atom(description.clone()),
            DataNode::Concat(parts) => {
                let has_text = parts.iter().any(|p| match p {
                    DataNode::Concrete(lit) => lit.is_truthy(),
                    _ => false,
                });
                if has_text {
                    Condition::True
                } else {
                    Condition::atom(self.describe())
                }
            }
            DataNode::Conditional(alternatives) => Condition::or_all(
                alternatives
                    .iter()
                    .map(|alt| Condition::and(alt.condition.clone(), alt.node.truth())),
            ),
            DataNode::Control(_) | DataNode::Unset => Condition::False,
            DataNode::Approximate(reason) => Condition::atom(reason.clone()),
        }
    }

    /// PHP-like source text describing this value
    pub fn describe(&self) -> String {
        match self {
            DataNode::Concrete(lit) => match lit {
                Literal::Null => "null".to_string(),
                Literal::Bool(b) => b.to_string(),
                Literal::Int(n) => n.to_string(),
                Literal::Float(f) => format_float(*f),
                Literal::Str(s) => quote(s),
                Literal::Array(entries) => {
                    let items: Vec<String> = entries
                        .iter()
                        .map(|(k, v)| format!("{} => {}", k.describe(), v.describe()))
                        .collect();
                    format!("[{}]", items.join(", "))
                }
            },
            DataNode::Symbolic(description) => description.clone(),
            DataNode::Concat(parts) => parts
                .iter()
                .map(DataNode::describe)
                .collect::<Vec<_>>()
                .join(" . "),
            DataNode::Conditional(alternatives) => {
                let mut text = String::new();
                for (i, alt) in alternatives.iter().enumerate().rev() {
                    text = if i + 1 == alternatives.len() {
                        alt.node.describe()
                    } else {
                        format!("({} ? {} : {})", alt.condition, alt.node.describe(), text)
                    };
                }
                text
            }
            DataNode::Control(signal) => signal.name().to_string(),
            DataNode::Unset => "null".to_string(),
            DataNode::Approximate(reason) => reason.clone(),
        }
    }

    /// String conversion when the value is fully known
    pub fn to_php_string(&self) -> Option<String> {
        match self {
            DataNode::Concrete(lit) => Some(lit.to_php_string()),
            DataNode::Unset => Some(String::new()),
            DataNode::Concat(parts) => {
                let mut text = String::new();
                for part in parts {
                    text.push_str(&part.to_php_string()?);
                }
                Some(text)
            }
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            DataNode::Concrete(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, DataNode::Concrete(_))
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, DataNode::Unset)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, DataNode::Control(ControlSignal::Exit))
    }

    /// Whether this node renders to no output at all
    pub fn is_empty_output(&self) -> bool {
        match self {
            DataNode::Unset => true,
            DataNode::Concrete(lit) => lit.is_scalar() && lit.to_php_string().is_empty(),
            DataNode::Concat(parts) => parts.iter().all(DataNode::is_empty_output),
            _ => false,
        }
    }
}

fn push_output(out: &mut Vec<DataNode>, part: DataNode) {
    match part {
        DataNode::Unset => {}
        DataNode::Concrete(lit) => {
            let text = lit.to_php_string();
            if text.is_empty() {
                return;
            }
            if let Some(DataNode::Concrete(Literal::Str(prev))) = out.last_mut() {
                prev.push_str(&text);
                return;
            }
            out.push(DataNode::string(text));
        }
        other => out.push(other),
    }
}

impl Default for DataNode {
    fn default() -> Self {
        DataNode::Unset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConservativeSolver;

    fn cond(name: &str) -> Condition {
        Condition::atom(name)
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(3.5), "3.5");
        assert_eq!(format_float(3.0), "3");
        assert_eq!(format_float(-0.25), "-0.25");
        assert_eq!(format_float(0.1 + 0.2), "0.3");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(1e-6), "1.0E-6");
        assert_eq!(format_float(1e15), "1.0E+15");
        assert_eq!(format_float(i64::MAX as f64 + 1.0), "9.2233720368548E+18");
        assert_eq!(format_float(f64::INFINITY), "INF");
    }

    #[test]
    fn test_merge_keeps_every_alternative_in_order() {
        let merged = DataNode::merge(vec![
            (cond("a"), DataNode::string("A")),
            (cond("b"), DataNode::string("B")),
            (cond("c"), DataNode::string("C")),
        ]);
        let DataNode::Conditional(alternatives) = merged else {
            panic!("expected conditional");
        };
        let pairs: Vec<(String, DataNode)> = alternatives
            .into_iter()
            .map(|alt| (alt.condition.to_string(), alt.node))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), DataNode::string("A")),
                ("b".to_string(), DataNode::string("B")),
                ("c".to_string(), DataNode::string("C")),
            ]
        );
    }

    #[test]
    fn test_collapse_law() {
        for n in 1..5 {
            let alternatives = (0..n)
                .map(|i| (cond(&format!("c{}", i)), DataNode::string("same")))
                .collect();
            assert_eq!(DataNode::merge(alternatives), DataNode::string("same"));
        }
    }

    #[test]
    fn test_merge_drops_false_and_stops_at_true() {
        let merged = DataNode::merge(vec![
            (Condition::False, DataNode::string("never")),
            (Condition::True, DataNode::string("always")),
            (cond("b"), DataNode::string("unreachable")),
        ]);
        assert_eq!(merged, DataNode::string("always"));
        assert_eq!(DataNode::merge(Vec::new()), DataNode::Unset);
    }

    #[test]
    fn test_restrict_under_context() {
        let value = DataNode::merge(vec![
            (cond("a"), DataNode::string("A")),
            (Condition::not(cond("a")), DataNode::string("B")),
        ]);
        let solver = ConservativeSolver;
        assert_eq!(value.restrict(&cond("a"), &solver), DataNode::string("A"));
        assert_eq!(
            value.restrict(&Condition::not(cond("a")), &solver),
            DataNode::string("B")
        );
        assert_eq!(value.restrict(&cond("z"), &solver), value);
    }

    #[test]
    fn test_concat_fuses_text() {
        let joined = DataNode::concat(vec![
            DataNode::string("a"),
            DataNode::int(1),
            DataNode::Unset,
            DataNode::symbolic("$x"),
            DataNode::string("b"),
            DataNode::string("c"),
        ]);
        assert_eq!(
            joined,
            DataNode::Concat(vec![
                DataNode::string("a1"),
                DataNode::symbolic("$x"),
                DataNode::string("bc"),
            ])
        );
        assert_eq!(DataNode::concat(Vec::new()), DataNode::string(""));
    }

    #[test]
    fn test_truth() {
        assert_eq!(DataNode::string("0").truth(), Condition::False);
        assert_eq!(DataNode::int(3).truth(), Condition::True);
        assert_eq!(DataNode::symbolic("cond").truth(), cond("cond"));
        let value = DataNode::from_condition(cond("a"));
        assert_eq!(value.truth(), cond("a"));
    }

    #[test]
    fn test_describe() {
        assert_eq!(DataNode::string("it's").describe(), "'it\\'s'");
        let value = DataNode::merge(vec![
            (cond("a"), DataNode::int(1)),
            (Condition::not(cond("a")), DataNode::int(2)),
        ]);
        assert_eq!(value.describe(), "(a ? 1 : 2)");
    }

    #[test]
    fn test_map_distributes() {
        let value = DataNode::merge(vec![
            (cond("a"), DataNode::int(1)),
            (Condition::not(cond("a")), DataNode::int(2)),
        ]);
        let mapped = value.map(&mut |_| DataNode::string("x"));
        assert_eq!(mapped, DataNode::string("x"));
    }

    #[test]
    fn test_array_key_normalization() {
        assert_eq!(ArrayKey::from_string("12"), ArrayKey::Int(12));
        assert_eq!(ArrayKey::from_string("012"), ArrayKey::Str("012".to_string()));
        assert_eq!(format_float(2.0), "2");
        assert_eq!(format_float(2.5), "2.5");
    }
}
