//! The interpreter environment
//!
//! `Env` holds the state of the path currently executing plus every
//! accumulator that lets sibling paths be merged later:
//!
//! - branch contexts, one per open `if`/`switch`/ternary, holding the
//!   entry state and the finished arms
//! - frames (program, unit, function call), holding the paths that
//!   returned or exited inside them
//! - loop contexts inside a frame, holding the paths that hit
//!   `break`/`continue`
//!
//! A path that returns, exits, breaks or continues is parked in the
//! matching accumulator and the current state is killed. Execution then
//! resumes with whatever sibling path is still live, and the parked paths
//! are joined back when their frame or loop closes.
//!
//! Frames, loops and branches are opened and closed through the scoped
//! helpers at the bottom of this module, which close on every exit path.

mod files;
mod frame;
mod scope;
mod state;

pub use files::{FileTable, UnitEntry};
pub use frame::{FrameKind, FrameOutcome, LoopKind};
pub use scope::Scope;
pub use state::{OutputBuffer, State};

use crate::completion::{CompletionError, CompletionErrors, CompletionKind};
use crate::condition::{Condition, ConservativeSolver, Satisfiability, Solver};
use crate::control::{ControlSignal, Flow};
use crate::datamodel::DataNode;
use crate::error::{Result, SymexError};
use frame::{Frame, LoopContext, ReturnPath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Exploration bounds supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Iterations unrolled per loop before the rest is approximated
    pub max_loop_iterations: usize,
    /// Nested user function calls
    pub max_call_depth: usize,
    /// Nested includes
    pub max_include_depth: usize,
    /// Longest string a builtin may build, in bytes
    pub max_string_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_loop_iterations: 8,
            max_call_depth: 32,
            max_include_depth: 32,
            max_string_length: 1 << 20,
        }
    }
}

/// Stack depths, compared before and after a construct runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Depth {
    pub frames: usize,
    pub files: usize,
    pub loops: usize,
    pub branches: usize,
}

#[derive(Debug)]
struct BranchContext {
    entry: State,
    arms: Vec<State>,
}

#[must_use]
#[derive(Debug)]
pub struct FrameToken {
    depth: usize,
}

#[must_use]
#[derive(Debug)]
pub struct LoopToken {
    frame_depth: usize,
    loop_depth: usize,
}

#[must_use]
#[derive(Debug)]
pub struct BranchToken {
    depth: usize,
}

/// Accumulator sizes at some point, for computing a construct's flow
#[derive(Debug, Clone)]
pub struct FlowMark {
    frame_depth: usize,
    returns: usize,
    exits: usize,
    loops: Vec<(usize, usize)>,
}

/// Interpreter environment of one run, generic over the parsed unit type
/// `U` and the user function type `F`
pub struct Env<U, F> {
    state: State,
    frames: Vec<Frame>,
    branches: Vec<BranchContext>,
    files: FileTable<U>,
    file_stack: Vec<PathBuf>,
    functions: BTreeMap<String, Rc<F>>,
    errors: CompletionErrors,
    limits: Limits,
    solver: Box<dyn Solver>,
    line: u32,
}

impl<U, F> Default for Env<U, F> {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl<U, F> Env<U, F> {
    pub fn new(limits: Limits) -> Self {
        Self {
            state: State::new(),
            frames: Vec::new(),
            branches: Vec::new(),
            files: FileTable::new(),
            file_stack: Vec::new(),
            functions: BTreeMap::new(),
            errors: CompletionErrors::new(),
            limits,
            solver: Box::new(ConservativeSolver),
            line: 0,
        }
    }

    /// Use a different decision procedure for pruning branches
    pub fn with_solver(mut self, solver: Box<dyn Solver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn solver(&self) -> &dyn Solver {
        self.solver.as_ref()
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn path(&self) -> &Condition {
        &self.state.path
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    pub fn depth(&self) -> Depth {
        Depth {
            frames: self.frames.len(),
            files: self.file_stack.len(),
            loops: self.frames.last().map_or(0, |f| f.loops.len()),
            branches: self.branches.len(),
        }
    }

    /// Number of user function calls currently open
    pub fn call_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| f.kind == FrameKind::Function)
            .count()
    }

    /// Name of the innermost open function, if any
    pub fn current_function(&self) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.kind == FrameKind::Function)
            .map(|f| f.name.as_str())
    }

    /// Whether `condition` holds on the current path: always, never or maybe
    pub fn decide(&self, condition: &Condition) -> Satisfiability {
        let holds = Condition::and(self.state.path.clone(), condition.clone());
        if self.solver.check(&holds).no() {
            return Satisfiability::No;
        }
        let fails = Condition::and(self.state.path.clone(), Condition::not(condition.clone()));
        if self.solver.check(&fails).no() {
            return Satisfiability::Yes;
        }
        Satisfiability::Maybe
    }

    // ==================== Variables and output ====================

    /// Read a variable, simplified for the current path
    pub fn get_variable(&self, name: &str) -> Option<DataNode> {
        self.state
            .get_variable(name)
            .map(|v| v.restrict(&self.state.path, self.solver.as_ref()))
    }

    pub fn set_variable(&mut self, name: &str, value: DataNode) {
        if self.state.is_live() {
            self.state.set_variable(name, value);
        }
    }

    pub fn unset_variable(&mut self, name: &str) {
        if self.state.is_live() {
            self.state.unset_variable(name);
        }
    }

    pub fn import_global(&mut self, name: &str) {
        self.state.import_global(name);
    }

    /// Whether the current code runs with function-local variables
    pub fn in_function_scope(&self) -> bool {
        self.state.locals.is_some()
    }

    pub fn get_constant(&self, name: &str) -> Option<DataNode> {
        self.state.constants.get_variable(name).cloned()
    }

    pub fn define_constant(&mut self, name: &str, value: DataNode) {
        if self.state.is_live() {
            self.state.constants.set_variable(name, value);
        }
    }

    /// Append output on the current path
    pub fn emit(&mut self, node: DataNode) {
        if !self.state.is_live() {
            return;
        }
        let node = node.restrict(&self.state.path, self.solver.as_ref());
        if !node.is_empty_output() {
            self.state.output.push(node);
        }
    }

    // ==================== Functions and units ====================

    /// Declare a user function; false if the name was already taken
    pub fn declare_function(&mut self, name: &str, function: Rc<F>) -> bool {
        let key = name.to_ascii_lowercase();
        if self.functions.contains_key(&key) {
            return false;
        }
        self.functions.insert(key, function);
        true
    }

    pub fn function(&self, name: &str) -> Option<Rc<F>> {
        self.functions.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn files(&self) -> &FileTable<U> {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileTable<U> {
        &mut self.files
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.file_stack.last().map(PathBuf::as_path)
    }

    pub fn file_stack(&self) -> &[PathBuf] {
        &self.file_stack
    }

    pub fn push_file(&mut self, path: PathBuf) {
        self.file_stack.push(path);
    }

    pub fn pop_file(&mut self) -> Result<PathBuf> {
        self.file_stack
            .pop()
            .ok_or_else(|| SymexError::invariant("file stack underflow"))
    }

    // ==================== Completion errors ====================

    /// Source line of the construct being executed, for error locations
    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Record a recoverable problem at the current location
    pub fn record(&mut self, kind: CompletionKind, message: impl Into<String>) {
        let mut error = CompletionError::new(kind, message).with_line(self.line);
        if let Some(file) = self.file_stack.last() {
            error = error.with_file(file.clone());
        }
        self.errors.add(error);
    }

    /// Record a problem that carries its own location
    pub fn record_error(&mut self, error: CompletionError) {
        self.errors.add(error);
    }

    pub fn errors(&self) -> &CompletionErrors {
        &self.errors
    }

    pub fn take_errors(&mut self) -> CompletionErrors {
        std::mem::take(&mut self.errors)
    }

    // ==================== Branches ====================

    /// Open a branch point at the current state
    pub fn begin_branch(&mut self) -> BranchToken {
        self.branches.push(BranchContext {
            entry: self.state.clone(),
            arms: Vec::new(),
        });
        BranchToken {
            depth: self.branches.len(),
        }
    }

    /// Start executing the arm guarded by `guard`
    ///
    /// Returns false, leaving a dead state, when the arm cannot be reached.
    pub fn enter_arm(&mut self, guard: &Condition) -> bool {
        let Some(ctx) = self.branches.last() else {
            self.state.kill();
            return false;
        };
        self.state = ctx.entry.clone();
        self.state.path = Condition::and(ctx.entry.path.clone(), guard.clone());
        if self.solver.check(&self.state.path).no() {
            self.state.kill();
            return false;
        }
        true
    }

    /// Park the current arm's state if it is still live
    pub fn finish_arm(&mut self) {
        if !self.state.is_live() {
            return;
        }
        if let Some(ctx) = self.branches.last_mut() {
            ctx.arms.push(self.state.clone());
        }
    }

    /// Join the finished arms into the current state
    pub fn merge_branch(&mut self, token: BranchToken) -> Result<()> {
        if self.branches.len() != token.depth {
            return Err(SymexError::invariant(format!(
                "branch stack at depth {} while closing branch {}",
                self.branches.len(),
                token.depth
            )));
        }
        let ctx = self
            .branches
            .pop()
            .ok_or_else(|| SymexError::invariant("branch stack underflow"))?;
        self.state = match State::join(&ctx.entry.path, ctx.arms) {
            Some(joined) => joined,
            None => {
                let mut dead = ctx.entry;
                dead.kill();
                dead
            }
        };
        Ok(())
    }

    // ==================== Frames ====================

    /// Open a frame with fresh return/exit accumulators
    ///
    /// Unit frames share the caller's variables; function frames start
    /// with an empty local scope.
    pub fn enter_frame(&mut self, kind: FrameKind, name: impl Into<String>) -> FrameToken {
        let caller = self.state.clone();
        self.state.path = Condition::True;
        self.state.output = OutputBuffer::new();
        match kind {
            FrameKind::Function => self.state.locals = Some(Scope::new()),
            FrameKind::Program => self.state.locals = None,
            FrameKind::File => {}
        }
        self.frames
            .push(Frame::new(kind, name.into(), caller, self.branches.len()));
        FrameToken {
            depth: self.frames.len(),
        }
    }

    /// Close a frame and hand its merged result to the caller
    ///
    /// The frame's output is the join of every returned path with the path
    /// still running. Paths that exited are lifted into the caller frame
    /// unchanged; when the program frame closes they are joined into its
    /// output. The caller continues on the paths that did not exit.
    pub fn exit_frame(&mut self, token: FrameToken) -> Result<FrameOutcome> {
        if self.frames.len() != token.depth {
            return Err(SymexError::invariant(format!(
                "frame stack at depth {} while closing frame {}",
                self.frames.len(),
                token.depth
            )));
        }
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| SymexError::invariant("frame stack underflow"))?;
        if !frame.loops.is_empty() {
            return Err(SymexError::invariant(format!(
                "{} loop context(s) left open in frame '{}'",
                frame.loops.len(),
                frame.name
            )));
        }
        if self.branches.len() != frame.branch_depth {
            return Err(SymexError::invariant(format!(
                "{} branch(es) left open in frame '{}'",
                self.branches.len().saturating_sub(frame.branch_depth),
                frame.name
            )));
        }

        let residual = std::mem::take(&mut self.state);
        let fall_through = frame.kind.fall_through_value();

        let mut value_alternatives: Vec<(Condition, DataNode)> = frame
            .returns
            .iter()
            .map(|r| (r.state.path.clone(), r.value.clone()))
            .collect();
        value_alternatives.push((residual.path.clone(), fall_through));
        let value = DataNode::merge(value_alternatives);

        let exit_condition = Condition::or_all(frame.exits.iter().map(|s| s.path.clone()));
        let survives = residual.is_live() || frame.returns.iter().any(|r| r.state.is_live());

        let mut finishing: Vec<State> = Vec::new();
        if frame.kind == FrameKind::Program {
            finishing.extend(frame.exits.iter().cloned());
        }
        finishing.extend(frame.returns.into_iter().map(|r| r.state));
        finishing.push(residual);

        // the frame ran under the caller's path, so guards it implies are dropped
        let caller = frame.caller;
        let solver = self.solver.as_ref();
        let value = value.restrict(&caller.path, solver);
        let joined = State::join(&Condition::True, finishing);
        let output = joined.as_ref().map_or_else(
            || DataNode::string(""),
            |s| s.output.to_node(0).restrict(&caller.path, solver),
        );

        let mut next = caller.clone();
        match &joined {
            Some(state) => {
                next.path = Condition::and(caller.path.clone(), state.path.clone());
                if !output.is_empty_output() {
                    next.output.push(output.clone());
                }
                next.globals = state.globals.clone();
                next.constants = state.constants.clone();
                if frame.kind == FrameKind::File {
                    next.locals = state.locals.clone();
                }
            }
            None => next.kill(),
        }

        if frame.kind != FrameKind::Program {
            if let Some(parent) = self.frames.last_mut() {
                for exit in frame.exits {
                    let mut lifted = caller.clone();
                    lifted.path = Condition::and(caller.path.clone(), exit.path.clone());
                    lifted.output.push(exit.output.to_node(0).restrict(&caller.path, solver));
                    lifted.globals = exit.globals;
                    parent.exits.push(lifted);
                }
            }
        }

        self.state = next;
        Ok(FrameOutcome {
            value,
            output,
            exited: !survives && !exit_condition.is_false(),
            exit_condition,
        })
    }

    /// Park the current path as having returned `value`
    pub fn record_return(&mut self, value: DataNode) -> Result<()> {
        if !self.state.is_live() {
            return Ok(());
        }
        let value = value.restrict(&self.state.path, self.solver.as_ref());
        let state = self.state.clone();
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| SymexError::invariant("return outside of any frame"))?;
        frame.returns.push(ReturnPath { state, value });
        self.state.kill();
        Ok(())
    }

    /// Park the current path as having terminated the run
    pub fn record_exit(&mut self) -> Result<()> {
        if !self.state.is_live() {
            return Ok(());
        }
        self.state.output.push(DataNode::Control(ControlSignal::Exit));
        let state = self.state.clone();
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| SymexError::invariant("exit outside of any frame"))?;
        frame.exits.push(state);
        self.state.kill();
        Ok(())
    }

    // ==================== Loops ====================

    pub fn enter_loop(&mut self, kind: LoopKind) -> Result<LoopToken> {
        let entry_path = self.state.path.clone();
        let frame_depth = self.frames.len();
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| SymexError::invariant("loop outside of any frame"))?;
        frame.loops.push(LoopContext::new(kind, entry_path));
        Ok(LoopToken {
            frame_depth,
            loop_depth: frame.loops.len(),
        })
    }

    /// Close a loop, joining the paths that left it
    pub fn exit_loop(&mut self, token: LoopToken) -> Result<()> {
        if self.frames.len() != token.frame_depth {
            return Err(SymexError::invariant(
                "loop closed in a different frame than it was opened in",
            ));
        }
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| SymexError::invariant("loop outside of any frame"))?;
        if frame.loops.len() != token.loop_depth {
            return Err(SymexError::invariant(format!(
                "loop stack at depth {} while closing loop {}",
                frame.loops.len(),
                token.loop_depth
            )));
        }
        let ctx = frame
            .loops
            .pop()
            .ok_or_else(|| SymexError::invariant("loop stack underflow"))?;

        let mut leaving = ctx.breaks;
        leaving.extend(ctx.continues);
        leaving.push(std::mem::take(&mut self.state));
        self.state = match State::join(&ctx.entry_path, leaving) {
            Some(joined) => joined,
            None => {
                let mut dead = State::new();
                dead.kill();
                dead
            }
        };
        Ok(())
    }

    /// Split the current path at a loop test
    ///
    /// The part where `stay` fails leaves the loop; the current path keeps
    /// iterating under `stay`.
    pub fn leave_loop_unless(&mut self, stay: &Condition) -> Result<()> {
        if !self.state.is_live() {
            return Ok(());
        }
        let mut leaving = self.state.clone();
        leaving.path = Condition::and(self.state.path.clone(), Condition::not(stay.clone()));
        let leaves = !self.solver.check(&leaving.path).no();

        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| SymexError::invariant("loop test outside of any frame"))?;
        let ctx = frame
            .loops
            .last_mut()
            .ok_or_else(|| SymexError::invariant("loop test outside of any loop"))?;
        if leaves {
            ctx.breaks.push(leaving);
        }

        self.state.path = Condition::and(self.state.path.clone(), stay.clone());
        if self.solver.check(&self.state.path).no() {
            self.state.kill();
        }
        Ok(())
    }

    /// Park the current path as leaving the innermost loop
    pub fn leave_loop(&mut self) -> Result<()> {
        if !self.record_jump(1, false) {
            return Err(SymexError::invariant("loop exit outside of any loop"));
        }
        Ok(())
    }

    /// Rejoin the paths that hit `continue` with the end of the body
    pub fn end_iteration(&mut self, base: &Condition) -> Result<()> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| SymexError::invariant("iteration outside of any frame"))?;
        let ctx = frame
            .loops
            .last_mut()
            .ok_or_else(|| SymexError::invariant("iteration outside of any loop"))?;
        let mut arms = std::mem::take(&mut ctx.continues);
        if arms.is_empty() {
            return Ok(());
        }
        arms.push(std::mem::take(&mut self.state));
        self.state = match State::join(base, arms) {
            Some(joined) => joined,
            None => {
                let mut dead = State::new();
                dead.kill();
                dead
            }
        };
        Ok(())
    }

    /// `break levels`; false when there is no such enclosing loop
    pub fn record_break(&mut self, levels: u32) -> bool {
        self.record_jump(levels, false)
    }

    /// `continue levels`; false when there is no such enclosing loop
    pub fn record_continue(&mut self, levels: u32) -> bool {
        self.record_jump(levels, true)
    }

    fn record_jump(&mut self, levels: u32, is_continue: bool) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        let count = frame.loops.len();
        let levels = levels as usize;
        if levels == 0 || levels > count {
            return false;
        }
        if !self.state.is_live() {
            return true;
        }
        let ctx = &mut frame.loops[count - levels];
        let parked = self.state.clone();
        if is_continue && ctx.kind == LoopKind::Loop {
            ctx.continues.push(parked);
        } else {
            ctx.breaks.push(parked);
        }
        self.state.kill();
        true
    }

    // ==================== Flow ====================

    pub fn flow_mark(&self) -> FlowMark {
        match self.frames.last() {
            Some(frame) => FlowMark {
                frame_depth: self.frames.len(),
                returns: frame.returns.len(),
                exits: frame.exits.len(),
                loops: frame
                    .loops
                    .iter()
                    .map(|l| (l.breaks.len(), l.continues.len()))
                    .collect(),
            },
            None => FlowMark {
                frame_depth: 0,
                returns: 0,
                exits: 0,
                loops: Vec::new(),
            },
        }
    }

    /// How the paths that were live at `mark` have finished since
    pub fn flow_since(&self, mark: &FlowMark) -> Flow {
        let mut outcomes: Vec<(Condition, ControlSignal)> = Vec::new();

        if mark.frame_depth > 0 && mark.frame_depth == self.frames.len() {
            if let Some(frame) = self.frames.last() {
                for r in frame.returns.iter().skip(mark.returns) {
                    outcomes.push((r.state.path.clone(), ControlSignal::Return));
                }
                for e in frame.exits.iter().skip(mark.exits) {
                    outcomes.push((e.path.clone(), ControlSignal::Exit));
                }
                let open = mark.loops.len().min(frame.loops.len());
                for (i, ctx) in frame.loops.iter().enumerate().take(open) {
                    let levels = (open - i) as u32;
                    let (breaks, continues) = mark.loops[i];
                    for s in ctx.breaks.iter().skip(breaks) {
                        outcomes.push((s.path.clone(), ControlSignal::Break(levels)));
                    }
                    for s in ctx.continues.iter().skip(continues) {
                        outcomes.push((s.path.clone(), ControlSignal::Continue(levels)));
                    }
                }
            }
        }

        if self.state.is_live() {
            outcomes.push((self.state.path.clone(), ControlSignal::Ok));
        }
        Flow::from_outcomes(outcomes)
    }

    /// Unpark the paths that returned since `mark`, with their values
    ///
    /// Used to run a `finally` block on them before they return again.
    pub fn take_returns_since(&mut self, mark: &FlowMark) -> Vec<(State, DataNode)> {
        if mark.frame_depth == 0 || mark.frame_depth != self.frames.len() {
            return Vec::new();
        }
        match self.frames.last_mut() {
            Some(frame) if frame.returns.len() > mark.returns => frame
                .returns
                .split_off(mark.returns)
                .into_iter()
                .map(|r| (r.state, r.value))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Continue executing on `state`, handing back the state it replaces
    pub fn resume(&mut self, state: State) -> State {
        std::mem::replace(&mut self.state, state)
    }
}

/// Something that owns an [`Env`] and executes code against it
///
/// The scoped helpers below take the host rather than the environment so
/// that the body can keep executing statements while a frame, loop or
/// branch is open.
pub trait EnvHost {
    type Unit;
    type Function;

    fn env(&mut self) -> &mut Env<Self::Unit, Self::Function>;
}

fn settle<T, S>(body: Result<T>, close: Result<S>) -> Result<(T, S)> {
    match (body, close) {
        (Ok(value), Ok(closed)) => Ok((value, closed)),
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
    }
}

/// Run `body` inside a fresh frame, closing it on every exit path
pub fn with_frame<H, T, B>(
    host: &mut H,
    kind: FrameKind,
    name: &str,
    body: B,
) -> Result<(T, FrameOutcome)>
where
    H: EnvHost,
    B: FnOnce(&mut H) -> Result<T>,
{
    let token = host.env().enter_frame(kind, name);
    let result = body(host);
    let outcome = host.env().exit_frame(token);
    settle(result, outcome)
}

/// Run `body` with `path` on top of the file stack, popping it on every exit path
pub fn with_file<H, T, B>(host: &mut H, path: PathBuf, body: B) -> Result<T>
where
    H: EnvHost,
    B: FnOnce(&mut H) -> Result<T>,
{
    let depth = host.env().file_stack.len();
    host.env().push_file(path);
    let result = body(host);
    let popped = host.env().pop_file().and_then(|_| {
        if host.env().file_stack.len() == depth {
            Ok(())
        } else {
            Err(SymexError::invariant("file stack imbalance"))
        }
    });
    settle(result, popped).map(|(value, _)| value)
}

/// Run `body` inside a loop context, joining the paths that left it at the end
pub fn with_loop<H, T, B>(host: &mut H, kind: LoopKind, body: B) -> Result<T>
where
    H: EnvHost,
    B: FnOnce(&mut H) -> Result<T>,
{
    let token = host.env().enter_loop(kind)?;
    let result = body(host);
    let closed = host.env().exit_loop(token);
    settle(result, closed).map(|(value, _)| value)
}

/// Execute each arm under its guard and join the arms that fall through
///
/// `arm` is called once per reachable guard with the guard's index, and
/// its results are returned with the guard they were produced under.
pub fn with_branch<H, T, A>(
    host: &mut H,
    guards: &[Condition],
    mut arm: A,
) -> Result<Vec<(Condition, T)>>
where
    H: EnvHost,
    A: FnMut(&mut H, usize) -> Result<T>,
{
    let token = host.env().begin_branch();
    let mut results = Vec::with_capacity(guards.len());
    let mut failure = None;
    for (i, guard) in guards.iter().enumerate() {
        if !host.env().enter_arm(guard) {
            continue;
        }
        match arm(host, i) {
            Ok(value) => {
                if host.env().is_live() {
                    results.push((guard.clone(), value));
                }
                host.env().finish_arm();
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    let merged = host.env().merge_branch(token);
    match failure {
        Some(e) => Err(e),
        None => merged.map(|_| results),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Host {
        env: Env<(), ()>,
    }

    impl EnvHost for Host {
        type Unit = ();
        type Function = ();

        fn env(&mut self) -> &mut Env<(), ()> {
            &mut self.env
        }
    }

    fn host() -> Host {
        Host { env: Env::default() }
    }

    fn cond(name: &str) -> Condition {
        Condition::atom(name)
    }

    fn echo(host: &mut Host, text: &str) {
        host.env.emit(DataNode::string(text));
    }

    fn output(host: &Host) -> DataNode {
        host.env.state().output.to_node(0)
    }

    #[test]
    fn test_if_else_merges_output() {
        let mut h = host();
        let c = cond("cond");
        let guards = [c.clone(), Condition::not(c.clone())];
        with_branch(&mut h, &guards, |h, i| {
            echo(h, if i == 0 { "A" } else { "B" });
            Ok(())
        })
        .unwrap();

        assert_eq!(h.env.path(), &Condition::True);
        assert_eq!(
            output(&h),
            DataNode::merge(vec![
                (c.clone(), DataNode::string("A")),
                (Condition::not(c), DataNode::string("B")),
            ])
        );
    }

    #[test]
    fn test_unreachable_arm_is_skipped() {
        let mut h = host();
        let c = cond("c");
        h.env.state.path = c.clone();
        let guards = [Condition::not(c.clone()), c.clone()];
        let results = with_branch(&mut h, &guards, |h, i| {
            echo(h, "ran");
            Ok(i)
        })
        .unwrap();
        assert_eq!(results, vec![(c, 1)]);
        assert_eq!(output(&h), DataNode::string("ran"));
    }

    #[test]
    fn test_conditional_return_in_file_frame() {
        // if (cond) { return 1; } echo "X";
        let mut h = host();
        let c = cond("cond");
        let (_, outcome) = with_frame(&mut h, FrameKind::File, "unit.php", |h| {
            let guards = [c.clone(), Condition::not(c.clone())];
            with_branch(h, &guards, |h, i| {
                if i == 0 {
                    h.env.record_return(DataNode::int(1))?;
                }
                Ok(())
            })?;
            echo(h, "X");
            Ok(())
        })
        .unwrap();

        assert_eq!(
            outcome.value,
            DataNode::merge(vec![
                (c.clone(), DataNode::int(1)),
                (Condition::not(c.clone()), DataNode::Unset),
            ])
        );
        assert_eq!(
            outcome.output,
            DataNode::merge(vec![
                (c.clone(), DataNode::string("")),
                (Condition::not(c), DataNode::string("X")),
            ])
        );
        assert!(!outcome.exited);
        assert_eq!(h.env.path(), &Condition::True);
    }

    #[test]
    fn test_nested_return_does_not_leak_into_caller() {
        let mut h = host();
        let c = cond("c");
        let (_, outer) = with_frame(&mut h, FrameKind::Function, "outer", |h| {
            let mark = h.env.flow_mark();
            let (_, inner) = with_frame(h, FrameKind::Function, "inner", |h| {
                let guards = [c.clone(), Condition::not(c.clone())];
                with_branch(h, &guards, |h, i| {
                    if i == 0 {
                        h.env.record_return(DataNode::string("early"))?;
                    }
                    Ok(())
                })?;
                Ok(())
            })?;
            assert!(matches!(inner.value, DataNode::Conditional(_)));
            assert_eq!(h.env.flow_since(&mark), Flow::ok());
            assert_eq!(h.env.path(), &Condition::True);
            echo(h, "after");
            h.env.record_return(DataNode::string("outer"))?;
            Ok(())
        })
        .unwrap();

        assert_eq!(outer.value, DataNode::string("outer"));
        assert_eq!(outer.output, DataNode::string("after"));
    }

    #[test]
    fn test_unconditional_exit_kills_caller() {
        let mut h = host();
        let (_, program) = with_frame(&mut h, FrameKind::Program, "program", |h| {
            let (_, unit) = with_frame(h, FrameKind::File, "a.php", |h| {
                let (_, nested) = with_frame(h, FrameKind::File, "b.php", |h| {
                    echo(h, "bye");
                    h.env.record_exit()
                })?;
                assert!(nested.exited);
                assert!(!h.env.is_live());
                echo(h, "never");
                Ok(())
            })?;
            assert!(unit.exited);
            Ok(())
        })
        .unwrap();

        assert!(program.exited);
        assert_eq!(
            program.output,
            DataNode::concat(vec![
                DataNode::string("bye"),
                DataNode::Control(ControlSignal::Exit),
            ])
        );
    }

    #[test]
    fn test_conditional_exit_keeps_other_paths() {
        let mut h = host();
        let c = cond("c");
        let (_, program) = with_frame(&mut h, FrameKind::Program, "program", |h| {
            let guards = [c.clone(), Condition::not(c.clone())];
            with_branch(h, &guards, |h, i| {
                if i == 0 {
                    h.env.record_exit()?;
                }
                Ok(())
            })?;
            echo(h, "rest");
            Ok(())
        })
        .unwrap();

        assert!(!program.exited);
        assert_eq!(program.exit_condition, c);
        assert_eq!(
            program.output,
            DataNode::merge(vec![
                (c.clone(), DataNode::Control(ControlSignal::Exit)),
                (Condition::not(c), DataNode::string("rest")),
            ])
        );
    }

    #[test]
    fn test_frame_balance_on_error() {
        let mut h = host();
        let before = h.env.depth();
        let result: Result<((), FrameOutcome)> = with_frame(&mut h, FrameKind::Function, "f", |h| {
            with_file(h, PathBuf::from("/x.php"), |h| {
                with_loop(h, LoopKind::Loop, |h| {
                    let guards = [cond("a"), Condition::not(cond("a"))];
                    with_branch(h, &guards, |_, _| -> Result<()> {
                        Err(SymexError::invariant("boom"))
                    })?;
                    Ok(())
                })
            })
        });
        assert!(result.is_err());
        assert_eq!(h.env.depth(), before);
    }

    #[test]
    fn test_loop_break_and_flow() {
        let mut h = host();
        let c = cond("c");
        with_frame(&mut h, FrameKind::File, "loop.php", |h| {
            with_loop(h, LoopKind::Loop, |h| {
                let mark = h.env.flow_mark();
                let guards = [c.clone(), Condition::not(c.clone())];
                with_branch(h, &guards, |h, i| {
                    if i == 0 {
                        assert!(h.env.record_break(1));
                    }
                    Ok(())
                })?;
                let flow = h.env.flow_since(&mark);
                assert!(flow.continues());
                assert_eq!(
                    flow,
                    Flow::Conditional(vec![
                        (c.clone(), ControlSignal::Break(1)),
                        (Condition::not(c.clone()), ControlSignal::Ok),
                    ])
                );
                echo(h, "body");
                Ok(())
            })?;
            assert_eq!(h.env.path(), &Condition::True);
            assert!(!h.env.record_break(1));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_continue_rejoins_at_end_of_iteration() {
        let mut h = host();
        let c = cond("c");
        with_frame(&mut h, FrameKind::File, "loop.php", |h| {
            with_loop(h, LoopKind::Loop, |h| {
                let base = h.env.path().clone();
                let guards = [c.clone(), Condition::not(c.clone())];
                with_branch(h, &guards, |h, i| {
                    if i == 0 {
                        assert!(h.env.record_continue(1));
                    }
                    Ok(())
                })?;
                echo(h, "tail");
                h.env.end_iteration(&base)?;
                assert_eq!(h.env.path(), &Condition::True);
                h.env.leave_loop()?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_continue_in_switch_acts_as_break() {
        let mut h = host();
        with_frame(&mut h, FrameKind::File, "switch.php", |h| {
            with_loop(h, LoopKind::Switch, |h| {
                let mark = h.env.flow_mark();
                assert!(h.env.record_continue(1));
                assert_eq!(h.env.flow_since(&mark), Flow::Signal(ControlSignal::Break(1)));
                Ok(())
            })?;
            assert!(h.env.is_live());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_loop_test_split() {
        let mut h = host();
        let stay = cond("$i < $n");
        with_frame(&mut h, FrameKind::File, "loop.php", |h| {
            with_loop(h, LoopKind::Loop, |h| {
                h.env.leave_loop_unless(&stay)?;
                assert_eq!(h.env.path(), &stay);
                echo(h, "x");
                h.env.leave_loop()?;
                Ok(())
            })?;
            assert_eq!(h.env.path(), &Condition::True);
            assert_eq!(
                h.env.state().output.to_node(0),
                DataNode::merge(vec![
                    (Condition::not(stay.clone()), DataNode::string("")),
                    (stay.clone(), DataNode::string("x")),
                ])
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_record_uses_current_location() {
        let mut h = host();
        with_file(&mut h, PathBuf::from("/app/a.php"), |h| {
            h.env.set_line(7);
            h.env.record(CompletionKind::Unsupported, "goto");
            Ok(())
        })
        .unwrap();
        let error = &h.env.errors().errors()[0];
        assert_eq!(error.file.as_deref(), Some(Path::new("/app/a.php")));
        assert_eq!(error.line, 7);
    }

    #[test]
    fn test_returned_paths_can_be_resumed() {
        let mut h = host();
        let (_, outcome) = with_frame(&mut h, FrameKind::Function, "f", |h| {
            let mark = h.env.flow_mark();
            h.env.record_return(DataNode::string("v"))?;
            assert!(!h.env.is_live());

            let returned = h.env.take_returns_since(&mark);
            assert_eq!(returned.len(), 1);
            assert_eq!(h.env.flow_since(&mark), Flow::from_outcomes(Vec::new()));
            for (state, value) in returned {
                let live = h.env.resume(state);
                echo(h, "cleanup");
                h.env.record_return(value)?;
                h.env.resume(live);
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(outcome.value, DataNode::string("v"));
        assert_eq!(outcome.output, DataNode::string("cleanup"));
    }
}
