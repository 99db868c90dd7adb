//! Non-local control outcomes of executing a construct

use crate::condition::Condition;
use crate::datamodel::DataNode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a construct finished along one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlSignal {
    /// Fall through to the next statement
    Ok,
    /// Leave the current function or file; the value lives in the frame
    Return,
    /// Leave the n-th enclosing loop or switch
    Break(u32),
    /// Skip to the next iteration of the n-th enclosing loop
    Continue(u32),
    /// Terminate the whole run
    Exit,
}

impl ControlSignal {
    pub fn is_ok(&self) -> bool {
        matches!(self, ControlSignal::Ok)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlSignal::Ok => "ok",
            ControlSignal::Return => "return",
            ControlSignal::Break(_) => "break",
            ControlSignal::Continue(_) => "continue",
            ControlSignal::Exit => "exit",
        }
    }

    /// Loop levels carried by break/continue
    pub fn levels(&self) -> Option<u32> {
        match self {
            ControlSignal::Break(n) | ControlSignal::Continue(n) => Some(*n),
            ControlSignal::Ok | ControlSignal::Return | ControlSignal::Exit => None,
        }
    }

    /// Parse the name and optional level count written by `name`/`levels`
    pub fn from_parts(name: &str, levels: Option<u32>) -> Option<ControlSignal> {
        let levels = levels.unwrap_or(1);
        match name {
            "ok" => Some(ControlSignal::Ok),
            "return" => Some(ControlSignal::Return),
            "break" => Some(ControlSignal::Break(levels)),
            "continue" => Some(ControlSignal::Continue(levels)),
            "exit" => Some(ControlSignal::Exit),
            _ => None,
        }
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlSignal::Break(n) | ControlSignal::Continue(n) if *n > 1 => {
                write!(f, "{} {}", self.name(), n)
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// The outcome of executing a construct, possibly different per path
///
/// Conditions are the frame-relative path conditions under which each
/// signal was produced. The `Ok` alternative, if any, is the path that
/// keeps executing the following statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Signal(ControlSignal),
    Conditional(Vec<(Condition, ControlSignal)>),
}

impl Flow {
    pub fn ok() -> Flow {
        Flow::Signal(ControlSignal::Ok)
    }

    /// Build a flow from per-path outcomes
    ///
    /// Outcomes under `False` are dropped and outcomes sharing a signal are
    /// joined; a single remaining signal is reported unconditionally.
    pub fn from_outcomes(outcomes: Vec<(Condition, ControlSignal)>) -> Flow {
        let mut grouped: Vec<(Vec<Condition>, ControlSignal)> = Vec::new();
        for (condition, signal) in outcomes {
            if condition.is_false() {
                continue;
            }
            match grouped.iter_mut().find(|(_, s)| *s == signal) {
                Some((conditions, _)) => conditions.push(condition),
                None => grouped.push((vec![condition], signal)),
            }
        }

        match grouped.len() {
            0 => Flow::ok(),
            1 => Flow::Signal(grouped[0].1),
            _ => Flow::Conditional(
                grouped
                    .into_iter()
                    .map(|(conditions, signal)| (Condition::or_all(conditions), signal))
                    .collect(),
            ),
        }
    }

    /// Whether some path falls through to the next statement
    pub fn continues(&self) -> bool {
        match self {
            Flow::Signal(signal) => signal.is_ok(),
            Flow::Conditional(outcomes) => outcomes.iter().any(|(_, s)| s.is_ok()),
        }
    }

    /// Whether every path terminated the run
    pub fn is_exit(&self) -> bool {
        matches!(self, Flow::Signal(ControlSignal::Exit))
    }

    /// The condition under which the run terminates, `False` if never
    pub fn exit_condition(&self) -> Condition {
        match self {
            Flow::Signal(ControlSignal::Exit) => Condition::True,
            Flow::Signal(_) => Condition::False,
            Flow::Conditional(outcomes) => Condition::or_all(
                outcomes
                    .iter()
                    .filter(|(_, s)| *s == ControlSignal::Exit)
                    .map(|(c, _)| c.clone()),
            ),
        }
    }

    /// The flow as a Control data node
    pub fn to_node(&self) -> DataNode {
        match self {
            Flow::Signal(signal) => DataNode::Control(*signal),
            Flow::Conditional(outcomes) => DataNode::merge(
                outcomes
                    .iter()
                    .map(|(c, s)| (c.clone(), DataNode::Control(*s)))
                    .collect(),
            ),
        }
    }
}

impl Default for Flow {
    fn default() -> Self {
        Flow::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_signal_is_unconditioned() {
        let flow = Flow::from_outcomes(vec![
            (Condition::atom("a"), ControlSignal::Return),
            (Condition::not(Condition::atom("a")), ControlSignal::Return),
        ]);
        assert_eq!(flow, Flow::Signal(ControlSignal::Return));
        assert!(!flow.continues());
    }

    #[test]
    fn test_conditional_flow_continues() {
        let flow = Flow::from_outcomes(vec![
            (Condition::atom("a"), ControlSignal::Exit),
            (Condition::not(Condition::atom("a")), ControlSignal::Ok),
        ]);
        assert!(flow.continues());
        assert!(!flow.is_exit());
        assert_eq!(flow.exit_condition(), Condition::atom("a"));
    }

    #[test]
    fn test_false_outcomes_are_dropped() {
        let flow = Flow::from_outcomes(vec![
            (Condition::False, ControlSignal::Exit),
            (Condition::True, ControlSignal::Ok),
        ]);
        assert_eq!(flow, Flow::ok());
    }

    #[test]
    fn test_to_node() {
        let flow = Flow::from_outcomes(vec![
            (Condition::atom("a"), ControlSignal::Break(2)),
            (Condition::not(Condition::atom("a")), ControlSignal::Ok),
        ]);
        match flow.to_node() {
            DataNode::Conditional(alternatives) => {
                assert_eq!(alternatives.len(), 2);
                assert_eq!(alternatives[0].node, DataNode::Control(ControlSignal::Break(2)));
            }
            other => panic!("expected conditional node, got {:?}", other),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ControlSignal::Break(1).to_string(), "break");
        assert_eq!(ControlSignal::Continue(2).to_string(), "continue 2");
        assert_eq!(ControlSignal::from_parts("break", Some(3)), Some(ControlSignal::Break(3)));
    }
}
