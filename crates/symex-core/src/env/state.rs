//! Per-path interpreter state and the join of sibling paths

use super::scope::Scope;
use crate::condition::Condition;
use crate::datamodel::DataNode;
use std::rc::Rc;

/// Output emitted along one path, oldest first
///
/// Fragments are reference counted so that forked states share the output
/// they had at the fork point.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    parts: Vec<Rc<DataNode>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: DataNode) {
        self.parts.push(Rc::new(node));
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.parts.truncate(len);
    }

    /// The fragments from `start` on as a single node
    pub fn to_node(&self, start: usize) -> DataNode {
        DataNode::concat(self.parts.iter().skip(start).map(|p| p.as_ref().clone()))
    }

    /// Number of leading fragments all buffers have in common
    pub fn common_prefix_len(buffers: &[&OutputBuffer]) -> usize {
        let Some(first) = buffers.first() else {
            return 0;
        };
        let mut len = 0;
        while len < first.parts.len() {
            let fragment = &first.parts[len];
            let shared = buffers.iter().all(|b| {
                b.parts
                    .get(len)
                    .is_some_and(|p| Rc::ptr_eq(p, fragment) || p == fragment)
            });
            if !shared {
                break;
            }
            len += 1;
        }
        len
    }
}

/// Interpreter state along one path
#[derive(Debug, Clone, Default)]
pub struct State {
    /// Condition under which this path runs, relative to the current frame
    pub path: Condition,
    pub output: OutputBuffer,
    /// Function-local variables; `None` when locals are the globals
    pub locals: Option<Scope>,
    pub globals: Scope,
    pub constants: Scope,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this path can still execute
    pub fn is_live(&self) -> bool {
        !self.path.is_false()
    }

    /// Stop this path; nothing it does afterwards is merged anywhere
    pub fn kill(&mut self) {
        self.path = Condition::False;
    }

    fn scope_for(&self, name: &str) -> &Scope {
        match &self.locals {
            Some(locals) if !locals.is_global_alias(name) => locals,
            _ => &self.globals,
        }
    }

    fn scope_for_mut(&mut self, name: &str) -> &mut Scope {
        match &mut self.locals {
            Some(locals) if !locals.is_global_alias(name) => locals,
            _ => &mut self.globals,
        }
    }

    pub fn get_variable(&self, name: &str) -> Option<&DataNode> {
        self.scope_for(name).get_variable(name)
    }

    pub fn set_variable(&mut self, name: &str, value: DataNode) {
        self.scope_for_mut(name).set_variable(name, value);
    }

    pub fn unset_variable(&mut self, name: &str) {
        self.scope_for_mut(name).remove_variable(name);
    }

    /// Make `name` refer to the global variable inside the current function
    pub fn import_global(&mut self, name: &str) {
        if let Some(locals) = &mut self.locals {
            locals.import_global(name);
        }
    }

    /// Merge live sibling states into one
    ///
    /// Output common to every state stays as is; the divergent remainder
    /// becomes one Conditional node guarded by each state's path relative
    /// to `base`. A single live state is returned unchanged. Returns `None`
    /// when no state is live.
    pub fn join(base: &Condition, states: Vec<State>) -> Option<State> {
        let mut live: Vec<State> = states.into_iter().filter(State::is_live).collect();
        match live.len() {
            0 => return None,
            1 => return live.pop(),
            _ => {}
        }

        let guards: Vec<Condition> = live.iter().map(|s| s.path.relative_to(base)).collect();
        let path = Condition::or_all(live.iter().map(|s| s.path.clone()));

        let buffers: Vec<&OutputBuffer> = live.iter().map(|s| &s.output).collect();
        let prefix = OutputBuffer::common_prefix_len(&buffers);
        let divergent = DataNode::merge(
            guards
                .iter()
                .zip(&live)
                .map(|(g, s)| (g.clone(), s.output.to_node(prefix)))
                .collect(),
        );
        let mut output = live[0].output.clone();
        output.truncate(prefix);
        if !divergent.is_empty_output() {
            output.push(divergent);
        }

        let locals = if live.iter().all(|s| s.locals.is_none()) {
            None
        } else {
            let empty = Scope::new();
            let scopes: Vec<(Condition, &Scope)> = guards
                .iter()
                .zip(&live)
                .map(|(g, s)| (g.clone(), s.locals.as_ref().unwrap_or(&empty)))
                .collect();
            Some(Scope::join(&scopes))
        };
        let globals = Scope::join(
            &guards
                .iter()
                .zip(&live)
                .map(|(g, s)| (g.clone(), &s.globals))
                .collect::<Vec<_>>(),
        );
        let constants = Scope::join(
            &guards
                .iter()
                .zip(&live)
                .map(|(g, s)| (g.clone(), &s.constants))
                .collect::<Vec<_>>(),
        );

        Some(State {
            path,
            output,
            locals,
            globals,
            constants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm(entry: &State, guard: &Condition, text: &str) -> State {
        let mut state = entry.clone();
        state.path = Condition::and(entry.path.clone(), guard.clone());
        state.output.push(DataNode::string(text));
        state
    }

    #[test]
    fn test_join_keeps_common_prefix() {
        let mut entry = State::new();
        entry.output.push(DataNode::string("head"));
        let c = Condition::atom("c");

        let joined = State::join(
            &entry.path,
            vec![arm(&entry, &c, "A"), arm(&entry, &Condition::not(c.clone()), "B")],
        )
        .unwrap();

        assert_eq!(joined.path, Condition::True);
        assert_eq!(
            joined.output.to_node(0),
            DataNode::concat(vec![
                DataNode::string("head"),
                DataNode::merge(vec![
                    (c.clone(), DataNode::string("A")),
                    (Condition::not(c), DataNode::string("B")),
                ]),
            ])
        );
    }

    #[test]
    fn test_join_identical_arms_collapse() {
        let entry = State::new();
        let c = Condition::atom("c");
        let joined = State::join(
            &entry.path,
            vec![arm(&entry, &c, "same"), arm(&entry, &Condition::not(c), "same")],
        )
        .unwrap();
        assert_eq!(joined.output.to_node(0), DataNode::string("same"));
    }

    #[test]
    fn test_join_single_live_state_is_unchanged() {
        let entry = State::new();
        let c = Condition::atom("c");
        let mut dead = arm(&entry, &Condition::not(c.clone()), "dead");
        dead.kill();
        let joined = State::join(&entry.path, vec![arm(&entry, &c, "A"), dead]).unwrap();
        assert_eq!(joined.path, c);
        assert_eq!(joined.output.to_node(0), DataNode::string("A"));
    }

    #[test]
    fn test_join_of_nothing() {
        let mut dead = State::new();
        dead.kill();
        assert!(State::join(&Condition::True, vec![dead]).is_none());
    }

    #[test]
    fn test_guards_are_relative_to_base() {
        let mut entry = State::new();
        entry.path = Condition::atom("outer");
        let c = Condition::atom("c");
        let joined = State::join(
            &entry.path,
            vec![arm(&entry, &c, "A"), arm(&entry, &Condition::not(c.clone()), "B")],
        )
        .unwrap();
        assert_eq!(joined.path, Condition::atom("outer"));
        let DataNode::Conditional(alternatives) = joined.output.to_node(0) else {
            panic!("expected conditional output");
        };
        assert_eq!(alternatives[0].condition, c);
    }

    #[test]
    fn test_locals_and_globals() {
        let mut state = State::new();
        state.set_variable("g", DataNode::int(1));
        assert_eq!(state.globals.get_variable("g"), Some(&DataNode::int(1)));

        state.locals = Some(Scope::new());
        state.set_variable("l", DataNode::int(2));
        assert!(state.globals.get_variable("l").is_none());
        assert!(state.get_variable("g").is_none());

        state.import_global("g");
        assert_eq!(state.get_variable("g"), Some(&DataNode::int(1)));
    }
}
