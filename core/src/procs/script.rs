//! Script procs
//!
//! The compiler hands the engine a flat instruction list per proc. An
//! activation is plain data: instruction pointer, operand stack and locals,
//! so suspending is just returning from `resume` and resuming is calling it
//! again.
//!
//! Locals start with the bound parameters, followed by `locals` extra slots.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::context::ContextId;
use crate::error::{ProcResult, RuntimeError};
use crate::runtime::Runtime;
use crate::value::{Constant, ObjectRef, Value};

use super::{unknown_super, Activation, Arguments, Proc, ProcHeader, ProcState, ProcStatus, Wait};

/* ===================== Instructions ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Instr {
    Push { v: Constant },
    GetLocal { slot: usize },
    SetLocal { slot: usize },
    /// Push the receiver (or null)
    Src,
    /// Push the acting user (or null)
    Usr,
    /// Pop an object, push its variable
    GetVar { name: String },
    /// Pop a value then an object, assign the variable
    SetVar { name: String },
    Add,
    Sub,
    Mul,
    Eq,
    Lt,
    Not,
    Jump { to: usize },
    JumpIfFalse { to: usize },
    Pop,
    /// Pop into `.`, the value returned when the proc falls off the end
    SetResult,
    /// Call a global proc with `argc` arguments from the stack
    Call { name: String, argc: usize },
    /// Call a proc on the object found below the `argc` arguments
    CallMethod { name: String, argc: usize },
    /// Call the overridden proc with the same receiver
    CallSuper { argc: usize },
    /// Construct an object, passing `argc` arguments to its constructor
    New { path: String, argc: usize },
    Del,
    /// Pop a tick count and defer
    Sleep,
    /// Pop a message and fail
    Crash,
    Return,
}

/* ===================== Definition ===================== */

#[derive(Debug)]
pub struct ScriptProc {
    header: ProcHeader,
    code: Rc<[Instr]>,
    locals: usize,
}

impl ScriptProc {
    pub fn new(header: ProcHeader, code: Vec<Instr>, locals: usize) -> Self {
        Self {
            header,
            code: code.into(),
            locals,
        }
    }

    pub fn code(&self) -> &[Instr] {
        &self.code
    }
}

impl Proc for ScriptProc {
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
        Box::new(ScriptProcState {
            code: Rc::clone(&self.code),
            extra_locals: self.locals,
            activation: Activation::new(context, self, src, usr, arguments),
            ip: 0,
            stack: Vec::new(),
            locals: Vec::new(),
            started: false,
        })
    }
}

/* ===================== Activation ===================== */

#[derive(Debug)]
struct ScriptProcState {
    activation: Activation,
    code: Rc<[Instr]>,
    extra_locals: usize,
    ip: usize,
    stack: Vec<Value>,
    locals: Vec<Value>,
    started: bool,
}

impl ScriptProcState {
    fn pop(&mut self) -> ProcResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::MalformedCode(format!("operand stack underflow at {}", self.ip - 1)))
    }

    fn pop_arguments(&mut self, argc: usize) -> ProcResult<Arguments> {
        if argc > self.stack.len() {
            return Err(RuntimeError::MalformedCode(format!(
                "call with {argc} arguments but only {} on the stack",
                self.stack.len()
            )));
        }
        let args = self.stack.split_off(self.stack.len() - argc);
        Ok(Arguments::new(args))
    }

    fn local(&mut self, slot: usize) -> ProcResult<&mut Value> {
        self.locals
            .get_mut(slot)
            .ok_or_else(|| RuntimeError::MalformedCode(format!("local slot {slot} out of range")))
    }

    fn binary(&mut self, op: impl Fn(&Value, &Value) -> ProcResult<Value>) -> ProcResult<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        self.stack.push(op(&lhs, &rhs)?);
        Ok(())
    }
}

impl ProcState for ScriptProcState {
    fn activation(&self) -> &Activation {
        &self.activation
    }

    fn resume(&mut self, rt: &mut Runtime) -> ProcResult<ProcStatus> {
        if !self.started {
            self.locals = self.activation.bind_arguments()?;
            self.locals.resize(self.locals.len() + self.extra_locals, Value::Null);
            self.started = true;
        }

        let code = Rc::clone(&self.code);
        while let Some(instr) = code.get(self.ip) {
            self.ip += 1;

            match instr {
                Instr::Push { v } => self.stack.push(v.into()),
                Instr::GetLocal { slot } => {
                    let value = self.local(*slot)?.clone();
                    self.stack.push(value);
                }
                Instr::SetLocal { slot } => {
                    let value = self.pop()?;
                    *self.local(*slot)? = value;
                }
                Instr::Src => self.stack.push(self.activation.src.map_or(Value::Null, Value::Object)),
                Instr::Usr => self.stack.push(self.activation.usr.map_or(Value::Null, Value::Object)),
                Instr::GetVar { name } => {
                    let object = self.pop()?.as_object()?;
                    let value = rt.objects().get_variable(object, name)?;
                    self.stack.push(value);
                }
                Instr::SetVar { name } => {
                    let value = self.pop()?;
                    let object = self.pop()?.as_object()?;
                    rt.objects_mut().set_variable(object, name, value)?;
                }
                Instr::Add => self.binary(Value::add)?,
                Instr::Sub => self.binary(Value::sub)?,
                Instr::Mul => self.binary(Value::mul)?,
                Instr::Eq => self.binary(|a, b| Ok(Value::Int((a == b) as i64)))?,
                Instr::Lt => self.binary(|a, b| Ok(Value::Int(a.less_than(b)? as i64)))?,
                Instr::Not => {
                    let value = self.pop()?;
                    self.stack.push(Value::Int(!value.is_truthy() as i64));
                }
                Instr::Jump { to } => self.ip = *to,
                Instr::JumpIfFalse { to } => {
                    if !self.pop()?.is_truthy() {
                        self.ip = *to;
                    }
                }
                Instr::Pop => {
                    self.pop()?;
                }
                Instr::SetResult => self.activation.result = self.pop()?,
                Instr::Call { name, argc } => {
                    let arguments = self.pop_arguments(*argc)?;
                    let proc = rt.global_proc(name)?;
                    return Ok(self.activation.call(proc, None, self.activation.usr, arguments));
                }
                Instr::CallMethod { name, argc } => {
                    let arguments = self.pop_arguments(*argc)?;
                    let object = self.pop()?.as_object()?;
                    let proc = rt.objects().get_proc(object, name)?;
                    return Ok(self.activation.call(proc, Some(object), self.activation.usr, arguments));
                }
                Instr::CallSuper { argc } => {
                    let arguments = self.pop_arguments(*argc)?;
                    let proc = self
                        .activation
                        .proc
                        .header()
                        .super_proc()
                        .cloned()
                        .ok_or_else(|| unknown_super(&self.activation))?;
                    return Ok(self.activation.call(proc, self.activation.src, self.activation.usr, arguments));
                }
                Instr::New { path, argc } => {
                    let arguments = self.pop_arguments(*argc)?;
                    let object = rt.objects_mut().allocate(path)?;
                    let init = rt.init_proc();
                    return Ok(self.activation.call(init, Some(object), self.activation.usr, arguments));
                }
                Instr::Del => {
                    let object = self.pop()?.as_object()?;
                    rt.objects_mut().delete(object)?;
                }
                Instr::Sleep => {
                    let ticks = self.pop()?.as_int()?;
                    return Ok(ProcStatus::Deferred(Wait::Ticks(ticks.max(0) as u64)));
                }
                Instr::Crash => {
                    let message = self.pop()?;
                    return Err(RuntimeError::Script(message.to_string()));
                }
                Instr::Return => {
                    self.activation.result = self.stack.pop().unwrap_or_default();
                    return Ok(ProcStatus::Returned);
                }
            }
        }

        Ok(ProcStatus::Returned)
    }

    fn returned_into(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn append_stack_frame(&self, out: &mut String) {
        out.push_str(self.activation.proc.header().name());
        out.push_str(&format!(" (instruction {})", self.ip.saturating_sub(1)));
    }
}
