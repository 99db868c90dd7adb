//! Boolean conditions over symbolic inputs
//!
//! Conditions are never mutated. Every value is built through the
//! simplifying constructors (`and`, `or`, `not` and their `_all` forms),
//! which keep the tree small enough that sibling branches can be compared
//! structurally and joined paths fold back to the path they came from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A boolean expression over symbolic predicates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    True,
    False,
    /// An opaque predicate such as `isset($_GET['page'])`
    Atom(String),
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn atom(text: impl Into<String>) -> Condition {
        Condition::Atom(text.into())
    }

    pub fn from_bool(value: bool) -> Condition {
        if value {
            Condition::True
        } else {
            Condition::False
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Condition::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Condition::False)
    }

    /// Logical negation
    pub fn not(c: Condition) -> Condition {
        match c {
            Condition::True => Condition::False,
            Condition::False => Condition::True,
            Condition::Not(inner) => *inner,
            other => Condition::Not(Box::new(other)),
        }
    }

    /// Logical conjunction of two conditions
    pub fn and(a: Condition, b: Condition) -> Condition {
        Condition::and_all([a, b])
    }

    /// Logical disjunction of two conditions
    pub fn or(a: Condition, b: Condition) -> Condition {
        Condition::or_all([a, b])
    }

    /// Conjunction of any number of conditions
    pub fn and_all(items: impl IntoIterator<Item = Condition>) -> Condition {
        let mut operands: Vec<Condition> = Vec::new();
        for item in items {
            match item {
                Condition::True => {}
                Condition::False => return Condition::False,
                Condition::And(inner) => {
                    for c in inner {
                        push_unique(&mut operands, c);
                    }
                }
                other => push_unique(&mut operands, other),
            }
        }

        if has_complementary_pair(&operands) {
            return Condition::False;
        }

        // x && (x || y) == x
        let snapshot = operands.clone();
        operands.retain(|op| match op {
            Condition::Or(disjuncts) => !disjuncts.iter().any(|d| snapshot.contains(d)),
            _ => true,
        });

        match operands.len() {
            0 => Condition::True,
            1 => operands.remove(0),
            _ => Condition::And(operands),
        }
    }

    /// Disjunction of any number of conditions
    ///
    /// Besides the usual identities this folds `(X && c) || (X && !c)` into
    /// `X` and absorbs `X || (X && y)` into `X`, until no pair changes.
    pub fn or_all(items: impl IntoIterator<Item = Condition>) -> Condition {
        let mut operands: Vec<Condition> = Vec::new();
        let mut pending: Vec<Condition> = items.into_iter().collect();
        pending.reverse();

        while let Some(item) = pending.pop() {
            match item {
                Condition::False => {}
                Condition::True => return Condition::True,
                Condition::Or(inner) => {
                    for c in inner.into_iter().rev() {
                        pending.push(c);
                    }
                }
                other => push_unique(&mut operands, other),
            }
        }

        loop {
            if has_complementary_pair(&operands) {
                return Condition::True;
            }
            match reduce_pair(&operands) {
                Some(Reduction::Absorb(index)) => {
                    operands.remove(index);
                }
                Some(Reduction::Resolve(keep, drop, merged)) => {
                    operands.remove(drop);
                    let keep = if drop < keep { keep - 1 } else { keep };
                    operands.remove(keep);
                    match merged {
                        Condition::True => return Condition::True,
                        Condition::False => {}
                        Condition::Or(inner) => {
                            for c in inner {
                                push_unique(&mut operands, c);
                            }
                        }
                        other => {
                            let at = keep.min(operands.len());
                            if !operands.contains(&other) {
                                operands.insert(at, other);
                            }
                        }
                    }
                }
                None => break,
            }
        }

        match operands.len() {
            0 => Condition::False,
            1 => operands.remove(0),
            _ => Condition::Or(operands),
        }
    }

    /// The conjuncts of this condition (`True` has none)
    pub fn conjuncts(&self) -> Vec<Condition> {
        match self {
            Condition::True => Vec::new(),
            Condition::And(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// Remove the conjuncts already implied by `base`
    ///
    /// A branch arm reached under `base && c` is described relative to the
    /// branch entry as just `c`.
    pub fn relative_to(&self, base: &Condition) -> Condition {
        if base.is_true() {
            return self.clone();
        }
        if self == base {
            return Condition::True;
        }
        let known = base.conjuncts();
        Condition::and_all(self.conjuncts().into_iter().filter(|c| !known.contains(c)))
    }

    fn precedence(&self) -> u8 {
        match self {
            Condition::Or(_) => 1,
            Condition::And(_) => 2,
            _ => 3,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        if self.precedence() < parent {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

enum Reduction {
    /// Drop the operand at this index, it is implied by another one
    Absorb(usize),
    /// Replace the operands at both indices with the merged condition
    Resolve(usize, usize, Condition),
}

fn reduce_pair(operands: &[Condition]) -> Option<Reduction> {
    for i in 0..operands.len() {
        let a = operands[i].conjuncts();
        for (j, other) in operands.iter().enumerate() {
            if i == j {
                continue;
            }
            let b = other.conjuncts();
            if a.iter().all(|x| b.contains(x)) {
                return Some(Reduction::Absorb(j));
            }
            if a.len() == b.len() {
                let a_only: Vec<&Condition> = a.iter().filter(|x| !b.contains(x)).collect();
                let b_only: Vec<&Condition> = b.iter().filter(|x| !a.contains(x)).collect();
                if a_only.len() == 1
                    && b_only.len() == 1
                    && *a_only[0] == Condition::not(b_only[0].clone())
                {
                    let common = a.iter().filter(|x| *x != a_only[0]).cloned();
                    return Some(Reduction::Resolve(i, j, Condition::and_all(common)));
                }
            }
        }
    }
    None
}

fn push_unique(operands: &mut Vec<Condition>, c: Condition) {
    if !operands.contains(&c) {
        operands.push(c);
    }
}

fn has_complementary_pair(operands: &[Condition]) -> bool {
    operands.iter().any(|op| match op {
        Condition::Not(inner) => operands.contains(inner),
        _ => false,
    })
}

impl Default for Condition {
    fn default() -> Self {
        Condition::True
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Condition::from_bool(value)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::True => write!(f, "1"),
            Condition::False => write!(f, "0"),
            Condition::Atom(text) => write!(f, "{}", text),
            Condition::Not(inner) => match inner.as_ref() {
                Condition::Atom(text) if text.contains(char::is_whitespace) => {
                    write!(f, "!({})", text)
                }
                other => {
                    write!(f, "!")?;
                    other.fmt_operand(f, 3)
                }
            },
            Condition::And(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " && ")?;
                    }
                    item.fmt_operand(f, 2)?;
                }
                Ok(())
            }
            Condition::Or(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " || ")?;
                    }
                    item.fmt_operand(f, 1)?;
                }
                Ok(())
            }
        }
    }
}

/// Three-valued answer to "can this condition hold?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Satisfiability {
    /// Holds on every input
    Yes,
    /// Unknown
    Maybe,
    /// Holds on no input
    No,
}

impl Satisfiability {
    pub fn yes(&self) -> bool {
        matches!(self, Satisfiability::Yes)
    }

    pub fn no(&self) -> bool {
        matches!(self, Satisfiability::No)
    }

    pub fn maybe(&self) -> bool {
        matches!(self, Satisfiability::Maybe)
    }

    pub fn and(self, other: Satisfiability) -> Satisfiability {
        match (self, other) {
            (Satisfiability::No, _) | (_, Satisfiability::No) => Satisfiability::No,
            (Satisfiability::Yes, Satisfiability::Yes) => Satisfiability::Yes,
            _ => Satisfiability::Maybe,
        }
    }

    pub fn or(self, other: Satisfiability) -> Satisfiability {
        match (self, other) {
            (Satisfiability::Yes, _) | (_, Satisfiability::Yes) => Satisfiability::Yes,
            (Satisfiability::No, Satisfiability::No) => Satisfiability::No,
            _ => Satisfiability::Maybe,
        }
    }

    pub fn not(self) -> Satisfiability {
        match self {
            Satisfiability::Yes => Satisfiability::No,
            Satisfiability::No => Satisfiability::Yes,
            Satisfiability::Maybe => Satisfiability::Maybe,
        }
    }

    pub fn from_bool(value: bool) -> Satisfiability {
        if value {
            Satisfiability::Yes
        } else {
            Satisfiability::No
        }
    }

    pub fn and_all(results: impl IntoIterator<Item = Satisfiability>) -> Satisfiability {
        let mut result = Satisfiability::Yes;
        for r in results {
            result = result.and(r);
            if result.no() {
                break;
            }
        }
        result
    }

    pub fn or_all(results: impl IntoIterator<Item = Satisfiability>) -> Satisfiability {
        let mut result = Satisfiability::No;
        for r in results {
            result = result.or(r);
            if result.yes() {
                break;
            }
        }
        result
    }
}

impl Default for Satisfiability {
    fn default() -> Self {
        Satisfiability::Maybe
    }
}

/// Decision procedure consulted as a black box before exploring a branch
///
/// Only a `No` answer prunes anything, so an imprecise solver costs
/// exploration time but never changes the merged tree's meaning.
pub trait Solver {
    fn check(&self, condition: &Condition) -> Satisfiability;
}

/// Answers from the shape of the condition alone
#[derive(Debug, Clone, Copy, Default)]
pub struct ConservativeSolver;

impl Solver for ConservativeSolver {
    fn check(&self, condition: &Condition) -> Satisfiability {
        match condition {
            Condition::True => Satisfiability::Yes,
            Condition::False => Satisfiability::No,
            _ => Satisfiability::Maybe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a() -> Condition {
        Condition::atom("a")
    }

    fn b() -> Condition {
        Condition::atom("b")
    }

    fn c() -> Condition {
        Condition::atom("c")
    }

    #[test]
    fn test_identities() {
        assert_eq!(Condition::and(Condition::True, a()), a());
        assert_eq!(Condition::and(Condition::False, a()), Condition::False);
        assert_eq!(Condition::or(Condition::False, a()), a());
        assert_eq!(Condition::or(Condition::True, a()), Condition::True);
        assert_eq!(Condition::and_all(Vec::new()), Condition::True);
        assert_eq!(Condition::or_all(Vec::new()), Condition::False);
    }

    #[test]
    fn test_double_negation() {
        assert_eq!(Condition::not(Condition::not(a())), a());
        assert_eq!(Condition::not(Condition::True), Condition::False);
    }

    #[test]
    fn test_contradiction_and_tautology() {
        assert_eq!(Condition::and(a(), Condition::not(a())), Condition::False);
        assert_eq!(Condition::or(a(), Condition::not(a())), Condition::True);
    }

    #[test]
    fn test_flatten_and_dedupe() {
        let nested = Condition::and(Condition::and(a(), b()), Condition::and(b(), c()));
        assert_eq!(nested, Condition::And(vec![a(), b(), c()]));
    }

    #[test]
    fn test_branch_paths_fold_back() {
        let entry = Condition::and(a(), b());
        let then_path = Condition::and(entry.clone(), c());
        let else_path = Condition::and(entry.clone(), Condition::not(c()));
        assert_eq!(Condition::or(then_path, else_path), entry);
    }

    #[test]
    fn test_elseif_chain_folds_back() {
        let first = a();
        let second = Condition::and(Condition::not(a()), b());
        let third = Condition::and_all([Condition::not(a()), Condition::not(b())]);
        assert_eq!(Condition::or_all([first, second, third]), Condition::True);
    }

    #[test]
    fn test_absorption() {
        let joined = Condition::or(a(), Condition::and(a(), b()));
        assert_eq!(joined, a());
        let met = Condition::and(a(), Condition::or(a(), b()));
        assert_eq!(met, a());
    }

    #[test]
    fn test_relative_to() {
        let entry = Condition::and(a(), b());
        let arm = Condition::and(entry.clone(), c());
        assert_eq!(arm.relative_to(&entry), c());
        assert_eq!(entry.relative_to(&entry), Condition::True);
        assert_eq!(arm.relative_to(&Condition::True), arm);
    }

    #[test]
    fn test_display() {
        assert_eq!(a().to_string(), "a");
        assert_eq!(Condition::not(a()).to_string(), "!a");
        assert_eq!(Condition::and(a(), b()).to_string(), "a && b");
        let mixed = Condition::and(Condition::or(a(), b()), c());
        assert_eq!(mixed.to_string(), "(a || b) && c");
        let negated = Condition::not(Condition::atom("$x == 1"));
        assert_eq!(negated.to_string(), "!($x == 1)");
        assert_eq!(Condition::True.to_string(), "1");
    }

    #[test]
    fn test_satisfiability_logic() {
        assert_eq!(Satisfiability::Yes.and(Satisfiability::Maybe), Satisfiability::Maybe);
        assert_eq!(Satisfiability::No.or(Satisfiability::Maybe), Satisfiability::Maybe);
        assert_eq!(Satisfiability::Maybe.not(), Satisfiability::Maybe);
        assert_eq!(
            Satisfiability::or_all([Satisfiability::No, Satisfiability::Yes]),
            Satisfiability::Yes
        );
    }

    #[test]
    fn test_conservative_solver() {
        let solver = ConservativeSolver;
        assert!(solver.check(&Condition::False).no());
        assert!(solver.check(&Condition::True).yes());
        assert!(solver.check(&a()).maybe());
        assert!(solver.check(&Condition::and(a(), Condition::not(a()))).no());
    }
}
