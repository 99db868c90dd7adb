//! symex-core: conditional values and the execution environment for
//! symbolic evaluation of PHP programs
//!
//! This crate provides:
//! - `Condition`: Boolean conditions over opaque predicates, kept simplified
//! - `DataNode` / `DataModel`: The conditional output tree and its exports
//! - `ControlSignal` / `Flow`: How a statement finished, per path
//! - `Env`: Per-path state with the frame, loop and branch merge protocol
//! - `CompletionError`: Recoverable problems reported alongside a result

pub mod completion;
pub mod condition;
pub mod control;
pub mod datamodel;
pub mod env;
pub mod error;

pub use completion::{CompletionError, CompletionErrors, CompletionKind};
pub use condition::{Condition, ConservativeSolver, Satisfiability, Solver};
pub use control::{ControlSignal, Flow};
pub use datamodel::{render_ifdef, Alternative, ArrayKey, DataModel, DataNode, Literal};
pub use env::{Env, EnvHost, FrameKind, FrameOutcome, Limits, LoopKind};
pub use error::{Result, SymexError};
