//! Function calls
//!
//! A user function runs inside its own frame, so its returns and the
//! paths that exit inside it are merged before the caller continues.

use super::Interpreter;
use crate::ir::FunctionDecl;
use crate::parser::UnitParser;
use std::rc::Rc;
use symex_core::env::{with_frame, FrameKind};
use symex_core::{CompletionKind, DataNode, Result};

impl<P: UnitParser> Interpreter<P> {
    /// Call `name` with already evaluated arguments; `text` is the call's source
    pub(crate) fn call(&mut self, name: &str, args: Vec<DataNode>, text: &str) -> Result<DataNode> {
        let name = name.trim_start_matches('\\');
        if let Some(decl) = self.env.function(&name.to_ascii_lowercase()) {
            return self.call_user(decl, args);
        }
        if let Some(value) = self.call_builtin(name, &args) {
            return Ok(value);
        }
        self.note(
            CompletionKind::UnboundReference,
            format!("Call to undefined function {}()", name),
        );
        Ok(DataNode::symbolic(text))
    }

    fn call_user(&mut self, decl: Rc<FunctionDecl>, args: Vec<DataNode>) -> Result<DataNode> {
        let max = self.env.limits().max_call_depth;
        if self.env.call_depth() >= max {
            let reason = format!("call depth limit {} reached at {}()", max, decl.name);
            self.note(CompletionKind::IterationBoundExceeded, reason.clone());
            return Ok(DataNode::Approximate(reason));
        }

        let (flow, outcome) = with_frame(self, FrameKind::Function, &decl.name, |h| {
            for (i, param) in decl.params.iter().enumerate() {
                let value = match (args.get(i), &param.default) {
                    (Some(value), _) => value.clone(),
                    (None, Some(default)) => h.eval(default)?,
                    (None, None) => {
                        h.note(
                            CompletionKind::UnboundReference,
                            format!(
                                "Too few arguments to function {}(), {} passed and at least {} expected",
                                decl.name,
                                args.len(),
                                i + 1
                            ),
                        );
                        DataNode::null()
                    }
                };
                h.env.set_variable(&param.name, value);
            }
            h.exec_body(&decl.body)
        })?;

        // the caller sees the exit through the lifted frame exits
        if flow.is_exit() {
            return Ok(DataNode::null());
        }
        Ok(outcome.value)
    }
}
