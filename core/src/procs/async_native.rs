//! Suspending native procs
//!
//! A host routine is an explicit state machine driven one step per resume.
//! Each step either asks for a nested proc call (threaded through the same
//! context as any script call), defers, or finishes:
//!
//! | Step              | Reported status       |
//! |-------------------|-----------------------|
//! | `Call`            | Called                |
//! | `Sleep` / `Wait`  | Deferred              |
//! | `Done`            | Returned              |
//!
//! The value returned by a nested call is handed to the next step through
//! [`RoutineCx::take_returned`].
//!
//! Arguments are bound against the declared parameters on the first resume,
//! so a routine reads them in parameter order whether they were passed by
//! position or by name. A pass-through proc skips binding and sees the
//! arguments exactly as passed.

use std::fmt;
use std::rc::Rc;

use crate::context::ContextId;
use crate::error::ProcResult;
use crate::runtime::Runtime;
use crate::value::{ObjectRef, Value};

use super::{Activation, Arguments, Proc, ProcHeader, ProcState, ProcStatus, Wait};

/// What a routine wants next
#[derive(Debug)]
pub enum NativeStep {
    /// Call `proc` on the current context and resume with its return value
    Call {
        proc: Rc<dyn Proc>,
        src: Option<ObjectRef>,
        usr: Option<ObjectRef>,
        arguments: Arguments,
    },
    /// Defer for a number of scheduler ticks
    Sleep(u64),
    /// Defer until woken externally
    Wait,
    Done(Value),
}

/// Per-step view of the activation driving a routine
pub struct RoutineCx<'a> {
    activation: &'a Activation,
    arguments: &'a Arguments,
    returned: Option<Value>,
}

impl RoutineCx<'_> {
    pub fn src(&self) -> Option<ObjectRef> {
        self.activation.src
    }

    pub fn usr(&self) -> Option<ObjectRef> {
        self.activation.usr
    }

    pub fn arguments(&self) -> &Arguments {
        self.arguments
    }

    /// Value returned by the call requested in the previous step
    pub fn take_returned(&mut self) -> Value {
        self.returned.take().unwrap_or_default()
    }
}

/// Host routine that may suspend between steps
pub trait NativeRoutine: fmt::Debug {
    fn step(&mut self, rt: &mut Runtime, cx: &mut RoutineCx<'_>) -> ProcResult<NativeStep>;
}

/// Builds a fresh routine for each activation
pub type RoutineFactory = dyn Fn() -> Box<dyn NativeRoutine>;

pub struct AsyncNativeProc {
    header: ProcHeader,
    factory: Rc<RoutineFactory>,
    pass_through: bool,
}

impl AsyncNativeProc {
    pub fn new<F>(header: ProcHeader, factory: F) -> Self
    where
        F: Fn() -> Box<dyn NativeRoutine> + 'static,
    {
        Self::from_factory(header, Rc::new(factory))
    }

    pub fn from_factory(header: ProcHeader, factory: Rc<RoutineFactory>) -> Self {
        Self {
            header,
            factory,
            pass_through: false,
        }
    }

    /// A routine that forwards its arguments untouched, leaving validation
    /// to whatever proc it hands them to.
    pub fn pass_through<F>(header: ProcHeader, factory: F) -> Self
    where
        F: Fn() -> Box<dyn NativeRoutine> + 'static,
    {
        Self {
            pass_through: true,
            ..Self::new(header, factory)
        }
    }
}

impl fmt::Debug for AsyncNativeProc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncNativeProc").field("header", &self.header).finish_non_exhaustive()
    }
}

impl Proc for AsyncNativeProc {
    fn header(&self) -> &ProcHeader {
        &self.header
    }

    fn create_state(
        self: Rc<Self>,
        context: ContextId,
        src: Option<ObjectRef>,
        usr: Option<ObjectRef>,
        arguments: Arguments,
    ) -> Box<dyn ProcState> {
        Box::new(AsyncNativeState {
            routine: (self.factory)(),
            pass_through: self.pass_through,
            activation: Activation::new(context, self, src, usr, arguments),
            bound: None,
            returned: None,
        })
    }
}

#[derive(Debug)]
struct AsyncNativeState {
    activation: Activation,
    routine: Box<dyn NativeRoutine>,
    pass_through: bool,
    /// Set on the first resume
    bound: Option<Arguments>,
    returned: Option<Value>,
}

impl ProcState for AsyncNativeState {
    fn activation(&self) -> &Activation {
        &self.activation
    }

    fn resume(&mut self, rt: &mut Runtime) -> ProcResult<ProcStatus> {
        if self.bound.is_none() {
            let bound = if self.pass_through {
                self.activation.arguments.clone()
            } else {
                Arguments::new(self.activation.bind_arguments()?)
            };
            self.bound = Some(bound);
        }
        let arguments = self.bound.get_or_insert_with(Arguments::default);

        let mut cx = RoutineCx {
            activation: &self.activation,
            arguments,
            returned: self.returned.take(),
        };

        match self.routine.step(rt, &mut cx)? {
            NativeStep::Call {
                proc,
                src,
                usr,
                arguments,
            } => Ok(self.activation.call(proc, src, usr, arguments)),
            NativeStep::Sleep(ticks) => Ok(ProcStatus::Deferred(Wait::Ticks(ticks))),
            NativeStep::Wait => Ok(ProcStatus::Deferred(Wait::External)),
            NativeStep::Done(value) => {
                self.activation.result = value;
                Ok(ProcStatus::Returned)
            }
        }
    }

    fn returned_into(&mut self, value: Value) {
        self.returned = Some(value);
    }

    fn append_stack_frame(&self, out: &mut String) {
        out.push_str(self.activation.proc.header().name());
        out.push_str(" (native, suspendable)");
    }
}
