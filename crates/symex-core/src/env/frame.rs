//! Call, file and loop frames and their accumulators

use super::state::State;
use crate::condition::Condition;
use crate::datamodel::DataNode;

/// What opened a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// The whole run
    Program,
    /// An executed source unit (the root file or an include)
    File,
    /// A user function call
    Function,
}

impl FrameKind {
    /// Value of a path that finishes the frame without `return`
    pub fn fall_through_value(&self) -> DataNode {
        match self {
            FrameKind::Function => DataNode::null(),
            FrameKind::Program | FrameKind::File => DataNode::Unset,
        }
    }
}

/// A path that left its frame through `return`
#[derive(Debug, Clone)]
pub(crate) struct ReturnPath {
    pub state: State,
    pub value: DataNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Loop,
    /// `switch` takes `break` and treats `continue` as `break`
    Switch,
}

/// Paths that left a loop body early, waiting to be rejoined
#[derive(Debug)]
pub(crate) struct LoopContext {
    pub kind: LoopKind,
    /// Path on entry to the loop, the base for the exit join
    pub entry_path: Condition,
    pub breaks: Vec<State>,
    pub continues: Vec<State>,
}

impl LoopContext {
    pub fn new(kind: LoopKind, entry_path: Condition) -> Self {
        Self {
            kind,
            entry_path,
            breaks: Vec::new(),
            continues: Vec::new(),
        }
    }
}

/// Accumulator context of one function call, unit or the program
///
/// Holds the paths that already returned ("output/value at returns") and
/// those that exited, so siblings keep executing while they wait for the
/// frame to close.
#[derive(Debug)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    pub name: String,
    /// The caller's state when the frame was entered, restored on close
    pub caller: State,
    pub returns: Vec<ReturnPath>,
    pub exits: Vec<State>,
    pub loops: Vec<LoopContext>,
    /// Branch stack depth when the frame was entered
    pub branch_depth: usize,
}

impl Frame {
    pub fn new(kind: FrameKind, name: String, caller: State, branch_depth: usize) -> Self {
        Self {
            kind,
            name,
            caller,
            returns: Vec::new(),
            exits: Vec::new(),
            loops: Vec::new(),
            branch_depth,
        }
    }
}

/// What a closed frame hands back to its caller
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    /// Merged return value, conditions relative to the frame
    pub value: DataNode,
    /// Merged output of the frame's non-exiting paths
    pub output: DataNode,
    /// Condition (relative to the frame) under which the run exited inside it
    pub exit_condition: Condition,
    /// Every path through the frame exited
    pub exited: bool,
}
