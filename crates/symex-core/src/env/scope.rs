//! Variable bindings of one scope
//!
//! Bindings are shared between forked branch states until one of them
//! writes, so forking a state does not copy its variables.

use crate::condition::Condition;
use crate::datamodel::DataNode;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// A scope in the interpreter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    /// Variables defined in this scope: name (without `$`) -> value
    variables: Rc<BTreeMap<String, DataNode>>,
    /// Names bound to the global scope by a `global` statement
    imported: Rc<BTreeSet<String>>,
}

impl Scope {
    /// Create an empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of a variable
    pub fn get_variable(&self, name: &str) -> Option<&DataNode> {
        self.variables.get(name)
    }

    /// Set a variable's value
    pub fn set_variable(&mut self, name: impl Into<String>, value: DataNode) {
        Rc::make_mut(&mut self.variables).insert(name.into(), value);
    }

    pub fn remove_variable(&mut self, name: &str) {
        if self.variables.contains_key(name) {
            Rc::make_mut(&mut self.variables).remove(name);
        }
    }

    /// Check if a variable is defined
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Get all defined variable names
    pub fn defined_variables(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Bind `name` to the global scope from now on
    pub fn import_global(&mut self, name: impl Into<String>) {
        Rc::make_mut(&mut self.imported).insert(name.into());
    }

    pub fn is_global_alias(&self, name: &str) -> bool {
        self.imported.contains(name)
    }

    fn shares_storage(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.variables, &other.variables) && Rc::ptr_eq(&self.imported, &other.imported)
    }

    /// Merge the scopes of sibling paths
    ///
    /// Each variable becomes the merge of its per-path values, `Unset` where
    /// a path never defined it. Variables unset on every path are dropped.
    pub fn join(alternatives: &[(Condition, &Scope)]) -> Scope {
        let Some((_, first)) = alternatives.first() else {
            return Scope::new();
        };
        if alternatives.iter().all(|(_, s)| s.shares_storage(first)) {
            return (*first).clone();
        }

        let names: BTreeSet<&String> = alternatives
            .iter()
            .flat_map(|(_, s)| s.variables.keys())
            .collect();

        let mut variables = BTreeMap::new();
        for name in names {
            let merged = DataNode::merge(
                alternatives
                    .iter()
                    .map(|(c, s)| (c.clone(), s.variables.get(name).cloned().unwrap_or_default()))
                    .collect(),
            );
            if !merged.is_unset() {
                variables.insert(name.clone(), merged);
            }
        }

        let imported: BTreeSet<String> = alternatives
            .iter()
            .flat_map(|(_, s)| s.imported.iter().cloned())
            .collect();

        Scope {
            variables: Rc::new(variables),
            imported: Rc::new(imported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut scope = Scope::new();
        scope.set_variable("x", DataNode::int(1));
        assert_eq!(scope.get_variable("x"), Some(&DataNode::int(1)));
        assert!(scope.has_variable("x"));
        scope.remove_variable("x");
        assert!(!scope.has_variable("x"));
    }

    #[test]
    fn test_fork_does_not_leak_writes() {
        let mut original = Scope::new();
        original.set_variable("x", DataNode::int(1));
        let mut fork = original.clone();
        fork.set_variable("x", DataNode::int(2));
        assert_eq!(original.get_variable("x"), Some(&DataNode::int(1)));
        assert_eq!(fork.get_variable("x"), Some(&DataNode::int(2)));
    }

    #[test]
    fn test_join_merges_per_variable() {
        let a = Condition::atom("a");
        let mut base = Scope::new();
        base.set_variable("same", DataNode::string("s"));

        let mut left = base.clone();
        left.set_variable("x", DataNode::int(1));
        let mut right = base.clone();
        right.set_variable("x", DataNode::int(2));
        right.set_variable("only_right", DataNode::bool(true));

        let joined = Scope::join(&[(a.clone(), &left), (Condition::not(a.clone()), &right)]);
        assert_eq!(joined.get_variable("same"), Some(&DataNode::string("s")));
        assert_eq!(
            joined.get_variable("x"),
            Some(&DataNode::merge(vec![
                (a.clone(), DataNode::int(1)),
                (Condition::not(a.clone()), DataNode::int(2)),
            ]))
        );
        assert_eq!(
            joined.get_variable("only_right"),
            Some(&DataNode::merge(vec![
                (a.clone(), DataNode::Unset),
                (Condition::not(a), DataNode::bool(true)),
            ]))
        );
    }

    #[test]
    fn test_global_alias() {
        let mut scope = Scope::new();
        scope.import_global("config");
        assert!(scope.is_global_alias("config"));
        assert!(!scope.is_global_alias("other"));
    }
}
