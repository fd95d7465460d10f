//! Object construction chain
//!
//! Construction is an ordinary proc invocation: the `(init)` suspendable
//! native runs the type's initializer proc, then the `on_object_created`
//! hook, then `New` when the meta object asks for it, and returns the
//! object. Each nested call goes through the caller's context like any
//! other call.

use std::rc::Rc;

use crate::error::{ProcResult, RuntimeError};
use crate::procs::{AsyncNativeProc, NativeRoutine, NativeStep, Proc, ProcHeader, RoutineCx};
use crate::runtime::Runtime;
use crate::value::Value;

pub const INIT_PROC_NAME: &str = "(init)";
pub const CONSTRUCTOR_NAME: &str = "New";

/// Construction arguments are forwarded to `New` as passed; `New` binds them.
pub fn init_proc() -> Rc<dyn Proc> {
    Rc::new(AsyncNativeProc::pass_through(ProcHeader::named(INIT_PROC_NAME), || {
        Box::new(ObjectInit::default())
    }))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum InitPhase {
    #[default]
    Initializer,
    Created,
    Constructed,
}

#[derive(Debug, Default)]
struct ObjectInit {
    phase: InitPhase,
}

impl NativeRoutine for ObjectInit {
    fn step(&mut self, rt: &mut Runtime, cx: &mut RoutineCx<'_>) -> ProcResult<NativeStep> {
        let object = cx.src().ok_or(RuntimeError::NotAnObject("null"))?;

        loop {
            match self.phase {
                InitPhase::Initializer => {
                    self.phase = InitPhase::Created;
                    if let Some(init) = rt.objects().definition(object)?.init_proc().cloned() {
                        return Ok(NativeStep::Call {
                            proc: init,
                            src: Some(object),
                            usr: None,
                            arguments: Default::default(),
                        });
                    }
                }
                InitPhase::Created => {
                    self.phase = InitPhase::Constructed;
                    let meta = rt.objects().definition(object)?.meta().cloned();

                    if let Some(meta) = &meta {
                        meta.on_object_created(rt.objects_mut(), object, cx.arguments())?;
                    }

                    if meta.map_or(true, |m| m.should_call_new()) {
                        if let Some(new) = rt.objects().try_get_proc(object, CONSTRUCTOR_NAME)? {
                            return Ok(NativeStep::Call {
                                proc: new,
                                src: Some(object),
                                usr: cx.usr(),
                                arguments: cx.arguments().clone(),
                            });
                        }
                    }
                }
                InitPhase::Constructed => return Ok(NativeStep::Done(Value::Object(object))),
            }
        }
    }
}
