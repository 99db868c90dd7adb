//! PHP operators over values that may be symbolic or conditional
//!
//! Every operator distributes over Conditional operands, so it only ever
//! sees leaves. Two known leaves are folded with PHP semantics; anything
//! else becomes a symbolic value described by the operation, and
//! comparisons become condition atoms.

use crate::ir::{BinaryOp, CastKind, UnaryOp};
use std::cmp::Ordering;
use symex_core::{ArrayKey, Condition, DataNode, Literal};

/// Apply `f` to every combination of the leaves of `a` and `b`
pub fn lift2<F>(a: &DataNode, b: &DataNode, f: &mut F) -> DataNode
where
    F: FnMut(&DataNode, &DataNode) -> DataNode,
{
    a.map(&mut |x: &DataNode| b.map(&mut |y: &DataNode| f(x, y)))
}

/// The literal a leaf stands for, if it is fully known
pub fn known(node: &DataNode) -> Option<Literal> {
    match node {
        DataNode::Concrete(lit) => Some(lit.clone()),
        DataNode::Unset => Some(Literal::Null),
        DataNode::Concat(_) => node.to_php_string().map(Literal::Str),
        _ => None,
    }
}

/// Array key for a known value, the way PHP coerces keys
pub fn array_key(lit: &Literal) -> Option<ArrayKey> {
    match lit {
        Literal::Int(n) => Some(ArrayKey::Int(*n)),
        Literal::Str(s) => Some(ArrayKey::from_string(s)),
        Literal::Bool(b) => Some(ArrayKey::Int(i64::from(*b))),
        Literal::Null => Some(ArrayKey::Str(String::new())),
        Literal::Float(f) if f.is_finite() => Some(ArrayKey::Int(f.trunc() as i64)),
        _ => None,
    }
}

/// The key `$a[] = ...` appends at
pub fn next_index(entries: &[(ArrayKey, DataNode)]) -> ArrayKey {
    let next = entries
        .iter()
        .filter_map(|(k, _)| match k {
            ArrayKey::Int(n) => Some(n.saturating_add(1)),
            ArrayKey::Str(_) => None,
        })
        .max()
        .unwrap_or(0);
    ArrayKey::Int(next.max(0))
}

// ==================== Strings ====================

/// A leaf converted for output or concatenation
pub fn string_value(node: &DataNode) -> DataNode {
    match node {
        DataNode::Concrete(lit) => DataNode::string(lit.to_php_string()),
        DataNode::Unset | DataNode::Control(_) => DataNode::string(""),
        DataNode::Conditional(_) => node.map(&mut |leaf: &DataNode| string_value(leaf)),
        other => other.clone(),
    }
}

/// A value as it appears when echoed
pub fn to_output(node: &DataNode) -> DataNode {
    node.map(&mut |leaf: &DataNode| string_value(leaf))
}

fn concat_values(x: &DataNode, y: &DataNode) -> DataNode {
    DataNode::concat([string_value(x), string_value(y)])
}

// ==================== Numbers ====================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    fn as_int(self) -> i64 {
        match self {
            Number::Int(n) => n,
            Number::Float(f) if f.is_finite() => f.trunc() as i64,
            Number::Float(_) => 0,
        }
    }

    fn into_literal(self) -> Literal {
        match self {
            Number::Int(n) => Literal::Int(n),
            Number::Float(f) => Literal::Float(f),
        }
    }
}

/// Leading numeric part of a string; `None` when there is none
fn numeric_prefix(s: &str) -> Option<(Number, usize)> {
    let t = s.trim_start();
    let skipped = s.len() - t.len();
    let bytes = t.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    let mut is_float = false;
    if end < bytes.len() && bytes[end] == b'.' {
        let mut j = end + 1;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if digits > 0 || j > end + 1 {
            digits += j - end - 1;
            is_float = true;
            end = j;
        }
    }
    if digits == 0 {
        return None;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut j = end + 1;
        if matches!(bytes.get(j), Some(b'+') | Some(b'-')) {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            is_float = true;
            end = j;
        }
    }
    let text = &t[..end];
    let number = if is_float {
        Number::Float(text.parse().ok()?)
    } else {
        match text.parse::<i64>() {
            Ok(n) => Number::Int(n),
            Err(_) => Number::Float(text.parse().ok()?),
        }
    };
    Some((number, skipped + end))
}

/// Whether the whole string is numeric, allowing surrounding whitespace
fn numeric_string(s: &str) -> Option<Number> {
    let (number, end) = numeric_prefix(s)?;
    s[end..].trim().is_empty().then_some(number)
}

fn to_number(lit: &Literal) -> Option<Number> {
    match lit {
        Literal::Null => Some(Number::Int(0)),
        Literal::Bool(b) => Some(Number::Int(i64::from(*b))),
        Literal::Int(n) => Some(Number::Int(*n)),
        Literal::Float(f) => Some(Number::Float(*f)),
        Literal::Str(s) => Some(numeric_prefix(s).map_or(Number::Int(0), |(n, _)| n)),
        Literal::Array(_) => None,
    }
}

/// PHP `(int)` conversion
pub fn to_int(lit: &Literal) -> i64 {
    match lit {
        Literal::Array(entries) => i64::from(!entries.is_empty()),
        other => to_number(other).map_or(0, Number::as_int),
    }
}

fn arithmetic(op: BinaryOp, a: Number, b: Number) -> Option<Literal> {
    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div => {
                if y == 0 {
                    return None;
                }
                // i64::MIN / -1 has no exact quotient and falls through to float
                match x.checked_rem(y) {
                    Some(0) => x.checked_div(y),
                    Some(_) => return Some(Literal::Float(x as f64 / y as f64)),
                    None => None,
                }
            }
            BinaryOp::Mod => {
                if y == 0 {
                    return None;
                }
                return Some(Literal::Int(x.wrapping_rem(y)));
            }
            BinaryOp::Pow => u32::try_from(y).ok().and_then(|e| x.checked_pow(e)),
            _ => return None,
        };
        if let Some(n) = exact {
            return Some(Literal::Int(n));
        }
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let value = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return None;
            }
            x / y
        }
        BinaryOp::Mod => {
            let (xi, yi) = (a.as_int(), b.as_int());
            if yi == 0 {
                return None;
            }
            return Some(Literal::Int(xi.wrapping_rem(yi)));
        }
        BinaryOp::Pow => x.powf(y),
        _ => return None,
    };
    Some(Literal::Float(value))
}

fn bitwise(op: BinaryOp, x: i64, y: i64) -> Option<i64> {
    match op {
        BinaryOp::BitAnd => Some(x & y),
        BinaryOp::BitOr => Some(x | y),
        BinaryOp::BitXor => Some(x ^ y),
        BinaryOp::ShiftLeft => u32::try_from(y).ok().map(|s| x.checked_shl(s).unwrap_or(0)),
        BinaryOp::ShiftRight => u32::try_from(y)
            .ok()
            .map(|s| x.checked_shr(s).unwrap_or(if x < 0 { -1 } else { 0 })),
        _ => None,
    }
}

// ==================== Comparison ====================

fn compare_numbers(a: Number, b: Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
        _ => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

/// PHP 8 loose comparison of two known values
fn compare_loose(a: &Literal, b: &Literal) -> Option<Ordering> {
    use Literal::*;
    match (a, b) {
        (Null, Str(s)) => Some(String::new().cmp(s)),
        (Str(s), Null) => Some(s.as_str().cmp("")),
        (Bool(_), _) | (_, Bool(_)) | (Null, _) | (_, Null) => {
            Some(a.is_truthy().cmp(&b.is_truthy()))
        }
        (Str(x), Str(y)) => match (numeric_string(x), numeric_string(y)) {
            (Some(n), Some(m)) => compare_numbers(n, m),
            _ => Some(x.cmp(y)),
        },
        (Int(_) | Float(_), Str(s)) => match numeric_string(s) {
            Some(m) => compare_numbers(to_number(a)?, m),
            None => Some(a.to_php_string().cmp(s)),
        },
        (Str(s), Int(_) | Float(_)) => match numeric_string(s) {
            Some(n) => compare_numbers(n, to_number(b)?),
            None => Some(s.cmp(&b.to_php_string())),
        },
        (Array(x), Array(y)) => Some(x.len().cmp(&y.len())),
        (Array(_), _) => Some(Ordering::Greater),
        (_, Array(_)) => Some(Ordering::Less),
        _ => compare_numbers(to_number(a)?, to_number(b)?),
    }
}

fn loose_equal(a: &Literal, b: &Literal) -> bool {
    match (a, b) {
        (Literal::Array(x), Literal::Array(y)) => x == y,
        (Literal::Array(_), _) | (_, Literal::Array(_)) => false,
        _ => compare_loose(a, b) == Some(Ordering::Equal),
    }
}

fn identical(a: &Literal, b: &Literal) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b) && a == b
}

// ==================== Operators ====================

/// Evaluate a binary operator; `&&`, `||` and `??` without short-circuit
pub fn binary(op: BinaryOp, a: &DataNode, b: &DataNode) -> DataNode {
    lift2(a, b, &mut |x, y| binary_leaf(op, x, y))
}

fn binary_leaf(op: BinaryOp, x: &DataNode, y: &DataNode) -> DataNode {
    match op {
        BinaryOp::Concat => return concat_values(x, y),
        BinaryOp::And => return DataNode::from_condition(Condition::and(x.truth(), y.truth())),
        BinaryOp::Or => return DataNode::from_condition(Condition::or(x.truth(), y.truth())),
        BinaryOp::Xor => {
            let (l, r) = (x.truth(), y.truth());
            return DataNode::from_condition(Condition::or(
                Condition::and(l.clone(), Condition::not(r.clone())),
                Condition::and(Condition::not(l), r),
            ));
        }
        BinaryOp::Coalesce => {
            return match known(x) {
                Some(Literal::Null) => y.clone(),
                _ => x.clone(),
            };
        }
        _ => {}
    }

    match (known(x), known(y)) {
        (Some(l), Some(r)) => fold(op, &l, &r).unwrap_or_else(|| symbolic_binary(op, x, y)),
        _ => symbolic_binary(op, x, y),
    }
}

fn fold(op: BinaryOp, l: &Literal, r: &Literal) -> Option<DataNode> {
    let node = match op {
        BinaryOp::Equal => DataNode::bool(loose_equal(l, r)),
        BinaryOp::NotEqual => DataNode::bool(!loose_equal(l, r)),
        BinaryOp::Identical => DataNode::bool(identical(l, r)),
        BinaryOp::NotIdentical => DataNode::bool(!identical(l, r)),
        BinaryOp::Less => DataNode::bool(compare_loose(l, r)? == Ordering::Less),
        BinaryOp::LessEqual => DataNode::bool(compare_loose(l, r)? != Ordering::Greater),
        BinaryOp::Greater => DataNode::bool(compare_loose(l, r)? == Ordering::Greater),
        BinaryOp::GreaterEqual => DataNode::bool(compare_loose(l, r)? != Ordering::Less),
        BinaryOp::Spaceship => DataNode::int(match compare_loose(l, r)? {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }),
        BinaryOp::Add if matches!((l, r), (Literal::Array(_), Literal::Array(_))) => {
            let (Literal::Array(left), Literal::Array(right)) = (l, r) else {
                return None;
            };
            let mut entries = left.clone();
            for (k, v) in right {
                if !entries.iter().any(|(existing, _)| existing == k) {
                    entries.push((k.clone(), v.clone()));
                }
            }
            DataNode::array(entries)
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Pow => {
            DataNode::Concrete(arithmetic(op, to_number(l)?, to_number(r)?)?)
        }
        BinaryOp::BitAnd
        | BinaryOp::BitOr
        | BinaryOp::BitXor
        | BinaryOp::ShiftLeft
        | BinaryOp::ShiftRight => DataNode::int(bitwise(op, to_int(l), to_int(r))?),
        BinaryOp::Concat | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Coalesce => {
            return None
        }
    };
    Some(node)
}

fn symbolic_binary(op: BinaryOp, x: &DataNode, y: &DataNode) -> DataNode {
    let atom = |symbol: &str| Condition::atom(format!("{} {} {}", x.describe(), symbol, y.describe()));
    match op {
        BinaryOp::NotEqual => DataNode::from_condition(Condition::not(atom("=="))),
        BinaryOp::NotIdentical => DataNode::from_condition(Condition::not(atom("==="))),
        op if op.is_comparison() => DataNode::from_condition(atom(op.symbol())),
        op => DataNode::symbolic(format!("{} {} {}", x.describe(), op.symbol(), y.describe())),
    }
}

pub fn unary(op: UnaryOp, value: &DataNode) -> DataNode {
    if op == UnaryOp::Not {
        return DataNode::from_condition(Condition::not(value.truth()));
    }
    value.map(&mut |leaf: &DataNode| {
        let number = known(leaf).as_ref().and_then(to_number);
        match (op, number) {
            (UnaryOp::Negate, Some(Number::Int(n))) => match n.checked_neg() {
                Some(m) => DataNode::int(m),
                None => DataNode::float(-(n as f64)),
            },
            (UnaryOp::Negate, Some(Number::Float(f))) => DataNode::float(-f),
            (UnaryOp::Plus, Some(n)) => DataNode::Concrete(n.into_literal()),
            (UnaryOp::BitNot, Some(n)) => DataNode::int(!n.as_int()),
            (UnaryOp::Negate, None) => DataNode::symbolic(format!("-{}", leaf.describe())),
            (UnaryOp::Plus, None) => DataNode::symbolic(format!("+{}", leaf.describe())),
            (UnaryOp::BitNot, None) => DataNode::symbolic(format!("~{}", leaf.describe())),
            (UnaryOp::Not, _) => DataNode::from_condition(Condition::not(leaf.truth())),
        }
    })
}

pub fn cast(kind: CastKind, value: &DataNode) -> DataNode {
    if kind == CastKind::Bool {
        return DataNode::from_condition(value.truth());
    }
    value.map(&mut |leaf: &DataNode| match (kind, known(leaf)) {
        (CastKind::Int, Some(lit)) => DataNode::int(to_int(&lit)),
        (CastKind::Float, Some(Literal::Array(entries))) => {
            DataNode::float(if entries.is_empty() { 0.0 } else { 1.0 })
        }
        (CastKind::Float, Some(lit)) => {
            DataNode::float(to_number(&lit).map_or(0.0, Number::as_f64))
        }
        (CastKind::String, Some(_)) => string_value(leaf),
        (CastKind::Array, Some(Literal::Null)) => DataNode::array(Vec::new()),
        (CastKind::Array, Some(Literal::Array(entries))) => DataNode::array(entries),
        (CastKind::Array, Some(lit)) => DataNode::array(vec![(ArrayKey::Int(0), DataNode::Concrete(lit))]),
        (CastKind::String, None) => leaf.clone(),
        (CastKind::Int, None) => DataNode::symbolic(format!("(int){}", leaf.describe())),
        (CastKind::Float, None) => DataNode::symbolic(format!("(float){}", leaf.describe())),
        (CastKind::Array, None) => DataNode::symbolic(format!("(array){}", leaf.describe())),
        (CastKind::Bool, _) => DataNode::from_condition(leaf.truth()),
    })
}

/// `++` and `--`, with PHP's handling of null
pub fn increment(value: &DataNode, up: bool) -> DataNode {
    value.map(&mut |leaf: &DataNode| match known(leaf) {
        Some(Literal::Null) if up => DataNode::int(1),
        Some(Literal::Null) | Some(Literal::Bool(_)) | Some(Literal::Array(_)) => leaf.clone(),
        Some(Literal::Str(s)) if numeric_string(&s).is_none() => {
            DataNode::symbolic(format!("{}{}", leaf.describe(), if up { "++" } else { "--" }))
        }
        Some(lit) => {
            let one = Number::Int(1);
            let op = if up { BinaryOp::Add } else { BinaryOp::Sub };
            to_number(&lit)
                .and_then(|n| arithmetic(op, n, one))
                .map_or_else(|| leaf.clone(), DataNode::Concrete)
        }
        None => DataNode::symbolic(format!("{} {} 1", leaf.describe(), if up { "+" } else { "-" })),
    })
}

/// Condition under which a value is set and not null
pub fn isset_condition(value: &DataNode) -> Condition {
    match value {
        DataNode::Concrete(Literal::Null) | DataNode::Unset | DataNode::Control(_) => Condition::False,
        DataNode::Concrete(_) | DataNode::Concat(_) => Condition::True,
        DataNode::Symbolic(description) | DataNode::Approximate(description) => {
            Condition::atom(format!("isset({})", description))
        }
        DataNode::Conditional(alternatives) => Condition::or_all(
            alternatives
                .iter()
                .map(|alt| Condition::and(alt.condition.clone(), isset_condition(&alt.node))),
        ),
    }
}

// ==================== Arrays ====================

/// Read `container[key]`; sets `missing` when a known array lacks the key
pub fn index(container: &DataNode, key: &DataNode, missing: &mut bool) -> DataNode {
    lift2(container, key, &mut |c, k| index_leaf(c, k, missing))
}

fn index_leaf(container: &DataNode, key: &DataNode, missing: &mut bool) -> DataNode {
    let symbolic = || DataNode::symbolic(format!("{}[{}]", container.describe(), key.describe()));
    match container {
        DataNode::Concrete(Literal::Array(entries)) => {
            match known(key).as_ref().and_then(array_key) {
                Some(k) => match entries.iter().find(|(existing, _)| *existing == k) {
                    Some((_, value)) => value.clone(),
                    None => {
                        *missing = true;
                        DataNode::null()
                    }
                },
                None => symbolic(),
            }
        }
        DataNode::Concrete(Literal::Str(s)) => match known(key).as_ref().map(to_int) {
            Some(offset) => {
                let len = s.len() as i64;
                let at = if offset < 0 { len + offset } else { offset };
                match usize::try_from(at).ok().and_then(|i| s.get(i..i + 1)) {
                    Some(ch) => DataNode::string(ch),
                    None => {
                        *missing = true;
                        DataNode::string("")
                    }
                }
            }
            None => symbolic(),
        },
        DataNode::Concrete(_) | DataNode::Unset | DataNode::Control(_) => DataNode::null(),
        _ => symbolic(),
    }
}

/// Write `value` at the key path inside `container`; `None` keys append
///
/// Leaves that cannot hold elements are left as they are and flag `blocked`.
pub fn assign_index(
    container: &DataNode,
    keys: &[Option<ArrayKey>],
    value: &DataNode,
    blocked: &mut bool,
) -> DataNode {
    let Some((first, rest)) = keys.split_first() else {
        return value.clone();
    };
    container.map(&mut |leaf: &DataNode| {
        let mut entries = match leaf {
            DataNode::Concrete(Literal::Array(entries)) => entries.clone(),
            DataNode::Concrete(Literal::Null) | DataNode::Unset => Vec::new(),
            _ => {
                *blocked = true;
                return leaf.clone();
            }
        };
        let key = first.clone().unwrap_or_else(|| next_index(&entries));
        let current = entries
            .iter()
            .find(|(k, _)| *k == key)
            .map_or(DataNode::Unset, |(_, v)| v.clone());
        let updated = assign_index(&current, rest, value, blocked);
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = updated,
            None => entries.push((key, updated)),
        }
        DataNode::array(entries)
    })
}

/// Remove the element at the key path, if present
pub fn unset_index(container: &DataNode, keys: &[ArrayKey]) -> DataNode {
    let Some((first, rest)) = keys.split_first() else {
        return container.clone();
    };
    container.map(&mut |leaf: &DataNode| match leaf {
        DataNode::Concrete(Literal::Array(entries)) => {
            let entries = entries
                .iter()
                .filter_map(|(k, v)| match (k == first, rest.is_empty()) {
                    (true, true) => None,
                    (true, false) => Some((k.clone(), unset_index(v, rest))),
                    (false, _) => Some((k.clone(), v.clone())),
                })
                .collect();
            DataNode::array(entries)
        }
        other => other.clone(),
    })
}

/// `count()` of a value
pub fn count(value: &DataNode) -> DataNode {
    value.map(&mut |leaf: &DataNode| match leaf {
        DataNode::Concrete(Literal::Array(entries)) => DataNode::int(entries.len() as i64),
        DataNode::Concrete(Literal::Null) | DataNode::Unset => DataNode::int(0),
        DataNode::Concrete(_) => DataNode::int(1),
        other => DataNode::symbolic(format!("count({})", other.describe())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> DataNode {
        DataNode::string(text)
    }

    #[test]
    fn test_arithmetic_folds() {
        assert_eq!(binary(BinaryOp::Add, &DataNode::int(2), &s("3")), DataNode::int(5));
        assert_eq!(binary(BinaryOp::Div, &DataNode::int(7), &DataNode::int(2)), DataNode::float(3.5));
        assert_eq!(binary(BinaryOp::Div, &DataNode::int(8), &DataNode::int(2)), DataNode::int(4));
        assert_eq!(binary(BinaryOp::Pow, &DataNode::int(2), &DataNode::int(10)), DataNode::int(1024));
        assert_eq!(
            binary(BinaryOp::Add, &DataNode::int(i64::MAX), &DataNode::int(1)),
            DataNode::float(i64::MAX as f64 + 1.0)
        );
        assert_eq!(binary(BinaryOp::Mod, &DataNode::int(7), &DataNode::int(3)), DataNode::int(1));
    }

    #[test]
    fn test_division_by_zero_stays_symbolic() {
        let result = binary(BinaryOp::Div, &DataNode::int(1), &DataNode::int(0));
        assert_eq!(result, DataNode::symbolic("1 / 0"));
    }

    #[test]
    fn test_integer_overflow_promotes_to_float() {
        assert_eq!(
            binary(BinaryOp::Div, &DataNode::int(i64::MIN), &DataNode::int(-1)),
            DataNode::float(-(i64::MIN as f64))
        );
        assert_eq!(
            binary(BinaryOp::Mod, &DataNode::int(i64::MIN), &DataNode::int(-1)),
            DataNode::int(0)
        );
        assert_eq!(
            binary(BinaryOp::Mul, &DataNode::int(i64::MAX), &DataNode::int(2)),
            DataNode::float(i64::MAX as f64 * 2.0)
        );
        assert_eq!(
            binary(BinaryOp::Sub, &DataNode::int(i64::MIN), &DataNode::int(1)),
            DataNode::float(i64::MIN as f64 - 1.0)
        );
    }

    #[test]
    fn test_loose_comparison() {
        let eq = |a: DataNode, b: DataNode| binary(BinaryOp::Equal, &a, &b);
        assert_eq!(eq(DataNode::int(1), s("1")), DataNode::bool(true));
        assert_eq!(eq(s("abc"), DataNode::int(0)), DataNode::bool(false));
        assert_eq!(eq(DataNode::null(), s("")), DataNode::bool(true));
        assert_eq!(eq(DataNode::null(), s("0")), DataNode::bool(false));
        assert_eq!(eq(s("1e1"), s("10")), DataNode::bool(true));
        assert_eq!(
            binary(BinaryOp::Identical, &DataNode::int(1), &DataNode::float(1.0)),
            DataNode::bool(false)
        );
        assert_eq!(
            binary(BinaryOp::Less, &s("apple"), &s("banana")),
            DataNode::bool(true)
        );
    }

    #[test]
    fn test_symbolic_comparison_is_an_atom() {
        let input = DataNode::symbolic("$_GET['a']");
        let eq = binary(BinaryOp::Equal, &input, &s("x"));
        assert_eq!(eq.truth(), Condition::atom("$_GET['a'] == 'x'"));

        let ne = binary(BinaryOp::NotEqual, &input, &s("x"));
        assert_eq!(ne.truth(), Condition::not(Condition::atom("$_GET['a'] == 'x'")));
    }

    #[test]
    fn test_concat_keeps_symbolic_parts() {
        let name = DataNode::symbolic("$_GET['name']");
        let greeting = binary(BinaryOp::Concat, &s("Hi "), &name);
        assert_eq!(greeting, DataNode::Concat(vec![s("Hi "), name]));
        assert_eq!(binary(BinaryOp::Concat, &s("a"), &DataNode::int(1)), s("a1"));
    }

    #[test]
    fn test_operators_distribute_over_alternatives() {
        let c = Condition::atom("c");
        let value = DataNode::merge(vec![
            (c.clone(), DataNode::int(1)),
            (Condition::not(c.clone()), DataNode::int(2)),
        ]);
        let doubled = binary(BinaryOp::Mul, &value, &DataNode::int(2));
        assert_eq!(
            doubled,
            DataNode::merge(vec![
                (c.clone(), DataNode::int(2)),
                (Condition::not(c), DataNode::int(4)),
            ])
        );
    }

    #[test]
    fn test_numeric_prefix() {
        assert_eq!(numeric_prefix("  42abc"), Some((Number::Int(42), 4)));
        assert_eq!(numeric_prefix("1.5e3"), Some((Number::Float(1500.0), 5)));
        assert_eq!(numeric_prefix(".5"), Some((Number::Float(0.5), 2)));
        assert_eq!(numeric_prefix("abc"), None);
        assert_eq!(numeric_string(" 12 "), Some(Number::Int(12)));
        assert_eq!(numeric_string("12px"), None);
    }

    #[test]
    fn test_casts_and_unary() {
        assert_eq!(cast(CastKind::Int, &s("12px")), DataNode::int(12));
        assert_eq!(cast(CastKind::String, &DataNode::float(1.5)), s("1.5"));
        assert_eq!(cast(CastKind::Bool, &s("0")), DataNode::bool(false));
        assert_eq!(unary(UnaryOp::Negate, &DataNode::int(3)), DataNode::int(-3));
        assert_eq!(
            unary(UnaryOp::Not, &DataNode::symbolic("$x")),
            DataNode::from_condition(Condition::not(Condition::atom("$x")))
        );
        assert_eq!(increment(&DataNode::null(), true), DataNode::int(1));
        assert_eq!(increment(&DataNode::null(), false), DataNode::null());
    }

    #[test]
    fn test_index_and_assign() {
        let mut blocked = false;
        let array = assign_index(
            &DataNode::Unset,
            &[Some(ArrayKey::Str("a".into())), None],
            &DataNode::int(1),
            &mut blocked,
        );
        assert!(!blocked);

        let mut missing = false;
        let inner = index(&array, &s("a"), &mut missing);
        assert_eq!(inner, DataNode::array(vec![(ArrayKey::Int(0), DataNode::int(1))]));
        assert_eq!(index(&inner, &s("0"), &mut missing), DataNode::int(1));
        assert!(!missing);
        assert_eq!(index(&inner, &DataNode::int(5), &mut missing), DataNode::null());
        assert!(missing);

        let removed = unset_index(&array, &[ArrayKey::Str("a".into())]);
        assert_eq!(removed, DataNode::array(Vec::new()));
    }

    #[test]
    fn test_symbolic_index() {
        let mut missing = false;
        let get = DataNode::symbolic("$_GET");
        assert_eq!(
            index(&get, &s("page"), &mut missing),
            DataNode::symbolic("$_GET['page']")
        );
        let mut blocked = false;
        let unchanged = assign_index(&get, &[Some(ArrayKey::Int(0))], &DataNode::int(1), &mut blocked);
        assert!(blocked);
        assert_eq!(unchanged, get);
    }

    #[test]
    fn test_isset_condition() {
        assert_eq!(isset_condition(&DataNode::null()), Condition::False);
        assert_eq!(isset_condition(&s("")), Condition::True);
        assert_eq!(
            isset_condition(&DataNode::symbolic("$_GET['a']")),
            Condition::atom("isset($_GET['a'])")
        );
        let c = Condition::atom("c");
        let partly = DataNode::merge(vec![
            (c.clone(), DataNode::int(1)),
            (Condition::not(c.clone()), DataNode::Unset),
        ]);
        assert_eq!(isset_condition(&partly), c);
    }
}
