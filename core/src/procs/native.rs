//! Synchronous native procs
//!
//! A native activation resumes exactly once: it calls the host handler,
//! stores its value and reports Returned. It can never defer.

use std::fmt;
use std::rc::Rc;

use crate::context::ContextId;
use crate::error::ProcResult;
use crate::runtime::Runtime;
use crate::value::{ObjectRef, Value};

use super::{Activation, Arguments, Proc, ProcHeader, ProcState, ProcStatus};

/// Host function backing a native proc: `(runtime, src, usr, arguments)`
pub type NativeHandler =
    dyn Fn(&mut Runtime, Option<ObjectRef>, Option<ObjectRef>, &Arguments) -> ProcResult<Value>;

pub struct NativeProc {
    header: ProcHeader,
    handler: Rc<NativeHandler>,
}

impl NativeProc {
    pub fn new<F>(header: ProcHeader, handler: F) -> Self
    where
        F: Fn(&mut Runtime, Option<ObjectRef>, Option<ObjectRef>, &Arguments) -> ProcResult<Value> + 'static,
    {
        Self::from_handler(header, Rc::new(handler))
    }

    pub fn from_handler(header: ProcHeader, handler: Rc<NativeHandler>) -> Self {
        Self { header, handler }
    }
}

impl fmt::Debug for NativeProc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeProc").field("header", &self.header).finish_non_exhaustive()
    }
}

impl Proc for NativeProc {
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
        Box::new(NativeProcState {
            handler: Rc::clone(&self.handler),
            activation: Activation::new(context, self, src, usr, arguments),
        })
    }
}

struct NativeProcState {
    activation: Activation,
    handler: Rc<NativeHandler>,
}

impl fmt::Debug for NativeProcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeProcState").field("activation", &self.activation).finish_non_exhaustive()
    }
}

impl ProcState for NativeProcState {
    fn activation(&self) -> &Activation {
        &self.activation
    }

    fn resume(&mut self, rt: &mut Runtime) -> ProcResult<ProcStatus> {
        // Handlers see parameters in declared order, named ones included
        let bound = Arguments::new(self.activation.bind_arguments()?);
        let activation = &mut self.activation;
        activation.result = (self.handler)(rt, activation.src, activation.usr, &bound)?;

        Ok(ProcStatus::Returned)
    }

    fn append_stack_frame(&self, out: &mut String) {
        out.push_str(self.activation.proc.header().name());
        out.push_str(" (native)");
    }
}
