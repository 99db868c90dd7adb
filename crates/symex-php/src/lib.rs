//! symex-php: symbolic execution of PHP programs
//!
//! Runs a PHP program once for all inputs. Request data and unknown
//! constants stay symbolic, branches on them are explored side by side,
//! and the output of every path is merged into one conditional
//! [`DataModel`](symex_core::DataModel).
//!
//! This crate provides:
//!
//! - The parser seam and the mago-based front-end lowering to an owned IR
//! - The statement/expression interpreter
//! - The unit orchestrator handling `include`/`require`
//! - The `execute(root)` driver and the run logger
//!
//! # Example
//!
//! ```no_run
//! use symex_core::env::Limits;
//! use std::path::Path;
//!
//! let result = symex_php::execute(Path::new("index.php"), Limits::default()).unwrap();
//! println!("{}", result.model.to_ifdef_string());
//! for error in result.errors.iter() {
//!     eprintln!("{}", error);
//! }
//! ```

pub mod driver;
pub mod error;
pub mod include;
pub mod interpreter;
pub mod ir;
pub mod logging;
mod lower;
pub mod orchestrator;
pub mod parser;

pub use driver::{execute, execute_with, ExecutionResult};
pub use error::{ParseFailure, PhpError};
pub use interpreter::Interpreter;
pub use parser::{MagoParser, UnitParser};
