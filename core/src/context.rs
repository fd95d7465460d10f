//! Execution contexts
//!
//! An [`ExecutionContext`] is one logical thread of cooperative script
//! execution: an ordered stack of activations (innermost last) and the loop
//! that drives them.
//!
//! ## Resume loop
//!
//! 1. Resume the top activation
//! 2. **Returned**: pop it; if the stack is empty the context is finished and
//!    the value goes back to whoever drove the loop, otherwise the value is
//!    delivered into the new top activation and the loop continues
//! 3. **Deferred**: stop and hand back the top activation's current result,
//!    leaving the stack intact for a later resume
//! 4. **Called**: push the nested activation; it runs on the next iteration
//!
//! A fault raised by any activation aborts the whole context: the call
//! frames are rendered to the runtime's diagnostic sink and the stack is
//! dropped. The context then reads as returned with null.

use std::sync::atomic::{AtomicU64, Ordering};
use std::fmt;

use tracing::{debug, trace, warn};

use crate::error::{ProcResult, RuntimeError};
use crate::procs::{ProcState, ProcStatus, Wait};
use crate::runtime::Runtime;
use crate::value::Value;

/// Default limit on activations per context
pub const DEFAULT_MAX_STACK_DEPTH: usize = 256;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Where a context stands between resumes
#[derive(Debug, Clone, PartialEq)]
pub enum ContextState {
    /// Not resumed yet
    Ready,
    /// Stopped on a deferral, stack intact
    Deferred(Wait),
    /// Stack emptied normally
    Returned,
    /// Aborted by a fault; permanently returned with null
    Faulted(RuntimeError),
}

#[derive(Debug)]
pub struct ExecutionContext {
    id: ContextId,
    stack: Vec<Box<dyn ProcState>>,
    max_depth: usize,
    state: ContextState,
}

impl ExecutionContext {
    pub fn new(max_depth: usize) -> Self {
        Self {
            id: ContextId::next(),
            stack: Vec::new(),
            max_depth,
            state: ContextState::Ready,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn state(&self) -> &ContextState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, ContextState::Returned | ContextState::Faulted(_))
    }

    /// The innermost activation
    pub fn current(&self) -> Option<&dyn ProcState> {
        self.stack.last().map(|s| s.as_ref())
    }

    /// Push an activation created for this context.
    ///
    /// # Panics
    ///
    /// If the activation was created for a different context.
    pub fn push(&mut self, state: Box<dyn ProcState>) -> ProcResult<()> {
        assert_eq!(
            state.activation().context,
            self.id,
            "activation of '{}' was created for another context",
            state.activation().proc.header().name()
        );

        if self.stack.len() >= self.max_depth {
            return Err(RuntimeError::StackOverflow { depth: self.max_depth });
        }

        debug!(context = %self.id, depth = self.stack.len() + 1, proc = state.activation().proc.header().name(), "push");
        self.stack.push(state);
        Ok(())
    }

    /// Drive the loop until the stack empties or the top activation defers.
    ///
    /// Returns the final value, or the current (placeholder) result of the
    /// deferred activation. A context that already finished returns null.
    ///
    /// # Panics
    ///
    /// If called off the runtime's worker thread, or if the stack runs out
    /// without any activation having returned a final value.
    pub fn resume(&mut self, rt: &mut Runtime) -> Value {
        rt.assert_worker_thread();

        if self.is_finished() {
            return Value::Null;
        }

        loop {
            let depth = self.stack.len();
            let Some(top) = self.stack.last_mut() else {
                panic!("{}: resumed with an empty stack and no final value", self.id);
            };

            trace!(context = %self.id, depth, "resume");
            let status = match top.resume(rt) {
                Ok(status) => status,
                Err(err) => return self.abort(rt, err),
            };

            match status {
                ProcStatus::Returned => {
                    let returned = top.result().clone();
                    self.stack.pop();
                    debug!(context = %self.id, depth = self.stack.len(), "pop");

                    match self.stack.last_mut() {
                        Some(caller) => caller.returned_into(returned),
                        None => {
                            self.state = ContextState::Returned;
                            return returned;
                        }
                    }
                }
                ProcStatus::Deferred(wait) => {
                    debug!(context = %self.id, depth, ?wait, "deferred");
                    let current = top.result().clone();
                    self.state = ContextState::Deferred(wait);
                    return current;
                }
                ProcStatus::Called(callee) => {
                    if let Err(err) = self.push(callee) {
                        return self.abort(rt, err);
                    }
                }
            }
        }
    }

    /// Abort on a fault: report it with every call frame, then drop the stack.
    pub(crate) fn abort(&mut self, rt: &mut Runtime, err: RuntimeError) -> Value {
        warn!(context = %self.id, depth = self.stack.len(), error = %err, "context aborted");

        let trace = self.stack_trace();
        rt.report_fault(self.id, &err, &trace);

        self.stack.clear();
        self.state = ContextState::Faulted(err);
        Value::Null
    }

    /// One line per call frame, innermost first
    pub fn stack_trace(&self) -> String {
        let mut out = String::new();
        for frame in self.stack.iter().rev() {
            out.push_str("   ");
            frame.append_stack_frame(&mut out);
            out.push('\n');
        }
        out
    }

    /// Proc names of the call frames, innermost first
    pub fn frame_names(&self) -> Vec<String> {
        self.stack
            .iter()
            .rev()
            .map(|s| s.activation().proc.header().name().to_string())
            .collect()
    }
}
