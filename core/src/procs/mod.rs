//! # Procs and Activations
//!
//! A [`Proc`] is an immutable callable definition. Calling it never runs
//! anything directly: [`Proc::create_state`] builds a [`ProcState`]
//! (one activation), which is pushed onto an
//! [`ExecutionContext`](crate::context::ExecutionContext) and advanced by the
//! context's resume loop.
//!
//! Each resume of an activation reports one [`ProcStatus`]:
//!
//! - **Returned**: finished, `result` holds its value
//! - **Deferred**: cannot progress now, the context stops with its stack intact
//! - **Called**: a nested activation must be pushed and resumed next

pub mod arguments;
pub mod async_native;
pub mod native;
pub mod script;

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use crate::context::ContextId;
use crate::error::{ProcResult, RuntimeError};
use crate::runtime::Runtime;
use crate::value::{KindSet, ObjectRef, Value};

pub use arguments::Arguments;
pub use async_native::{AsyncNativeProc, NativeRoutine, NativeStep, RoutineCx};
pub use native::NativeProc;
pub use script::{Instr, ScriptProc};

/* ===================== Status ===================== */

/// Why a deferred activation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Resume after this many scheduler ticks
    Ticks(u64),
    /// Resume when an external event wakes the context
    External,
}

/// Outcome of one resume step
#[derive(Debug)]
pub enum ProcStatus {
    Returned,
    Deferred(Wait),
    Called(Box<dyn ProcState>),
}

/* ===================== Definitions ===================== */

/// Identity and signature shared by every proc implementation
pub struct ProcHeader {
    name: String,
    super_proc: OnceCell<Rc<dyn Proc>>,
    argument_names: Vec<String>,
    argument_types: Vec<KindSet>,
}

impl ProcHeader {
    pub fn new(name: impl Into<String>, argument_names: Vec<String>, argument_types: Vec<KindSet>) -> Self {
        Self {
            name: name.into(),
            super_proc: OnceCell::new(),
            argument_names,
            argument_types,
        }
    }

    /// Header for a proc that takes no declared parameters
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_proc(&self) -> Option<&Rc<dyn Proc>> {
        self.super_proc.get()
    }

    /// Backpatch the overridden proc. Loading may create an override before
    /// its parent exists, so this is settable exactly once after construction.
    ///
    /// Returns false if a super link was already set.
    pub fn set_super(&self, super_proc: Rc<dyn Proc>) -> bool {
        self.super_proc.set(super_proc).is_ok()
    }

    pub fn argument_names(&self) -> &[String] {
        &self.argument_names
    }

    pub fn argument_types(&self) -> &[KindSet] {
        &self.argument_types
    }
}

impl fmt::Debug for ProcHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcHeader")
            .field("name", &self.name)
            .field("super_proc", &self.super_proc().map(|p| p.header().name().to_string()))
            .field("argument_names", &self.argument_names)
            .finish()
    }
}

/// Callable definition. Created at load time and never mutated afterwards,
/// except for the one-time super backpatch on its header.
pub trait Proc: fmt::Debug {
    fn header(&self) -> &ProcHeader;

    /// Build a fresh activation bound to `context`. Must not execute
    /// anything; argument validation waits for the first resume.
    fn create_state(
        self: Rc<Self>,
        context: ContextId,
        src: Option<ObjectRef>,
        usr: Option<ObjectRef>,
        arguments: Arguments,
    ) -> Box<dyn ProcState>;
}

/* ===================== Activations ===================== */

/// Data every activation carries regardless of implementation
#[derive(Debug)]
pub struct Activation {
    pub context: ContextId,
    pub proc: Rc<dyn Proc>,
    pub src: Option<ObjectRef>,
    pub usr: Option<ObjectRef>,
    pub arguments: Arguments,
    /// Output so far. Exposed as-is when the context defers.
    pub result: Value,
}

impl Activation {
    pub fn new(
        context: ContextId,
        proc: Rc<dyn Proc>,
        src: Option<ObjectRef>,
        usr: Option<ObjectRef>,
        arguments: Arguments,
    ) -> Self {
        Self {
            context,
            proc,
            src,
            usr,
            arguments,
            result: Value::Null,
        }
    }

    /// Validate and bind arguments against the proc's formal parameters.
    pub fn bind_arguments(&self) -> ProcResult<Vec<Value>> {
        self.arguments.bind(self.proc.header())
    }

    /// Build an activation for a nested call on the same context.
    pub fn call(
        &self,
        proc: Rc<dyn Proc>,
        src: Option<ObjectRef>,
        usr: Option<ObjectRef>,
        arguments: Arguments,
    ) -> ProcStatus {
        ProcStatus::Called(proc.create_state(self.context, src, usr, arguments))
    }
}

/// One suspendable execution of a proc
pub trait ProcState: fmt::Debug {
    fn activation(&self) -> &Activation;

    /// Advance to the next suspension point, nested call or return.
    fn resume(&mut self, rt: &mut Runtime) -> ProcResult<ProcStatus>;

    /// A nested call made by this activation returned `value`.
    fn returned_into(&mut self, _value: Value) {}

    /// One human-readable line for the call-frame dump
    fn append_stack_frame(&self, out: &mut String) {
        out.push_str(self.activation().proc.header().name());
    }

    fn result(&self) -> &Value {
        &self.activation().result
    }
}

/* ===================== Entry Points ===================== */

/// Run `proc` in a fresh context until it returns or defers.
///
/// If the activation defers, the caller gets the activation's current
/// result, which is only a placeholder. The context itself keeps running in
/// the background: it is detached onto the runtime and the next
/// [`Scheduler`](crate::scheduler::Scheduler) tick adopts it.
pub fn run(
    rt: &mut Runtime,
    proc: &Rc<dyn Proc>,
    src: Option<ObjectRef>,
    arguments: Arguments,
    usr: Option<ObjectRef>,
) -> Value {
    let mut context = rt.new_context();
    let state = Rc::clone(proc).create_state(context.id(), src, usr, arguments);
    if let Err(err) = context.push(state) {
        return context.abort(rt, err);
    }

    let value = context.resume(rt);
    if !context.is_finished() {
        rt.detach(context);
    }
    value
}

/// Resolve `name` on `object` and run it.
pub fn call_on(
    rt: &mut Runtime,
    object: ObjectRef,
    name: &str,
    arguments: Arguments,
    usr: Option<ObjectRef>,
) -> ProcResult<Value> {
    let proc = rt.objects().get_proc(object, name)?;
    Ok(run(rt, &proc, Some(object), arguments, usr))
}

pub(crate) fn unknown_super(activation: &Activation) -> RuntimeError {
    RuntimeError::UnknownProc {
        owner: activation.proc.header().name().to_string(),
        name: "..".to_string(),
    }
}
