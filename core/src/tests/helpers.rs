//! Test helpers for engine tests
//!
//! Script procs are written as JSON instruction lists, the same form the
//! compiler hands to the engine.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Config;
use crate::diagnostics::DiagnosticSink;
use crate::error::ProcResult;
use crate::procs::{Arguments, Instr, NativeProc, Proc, ProcHeader, ScriptProc};
use crate::runtime::Runtime;
use crate::value::{ObjectRef, Value};

/// One report received by the diagnostic sink
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub message: String,
    pub dump: String,
}

impl Fault {
    /// Proc names in the call-frame section of the dump, innermost first
    pub fn frames(&self) -> Vec<String> {
        let stack = self
            .dump
            .strip_prefix("=proc stack=\n")
            .expect("dump starts with the proc stack");
        stack
            .lines()
            .take_while(|line| !line.is_empty())
            .map(|line| line.trim().split(" (").next().unwrap().to_string())
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink(pub Rc<RefCell<Vec<Fault>>>);

impl DiagnosticSink for RecordingSink {
    fn report(&mut self, message: &str, dump: &str) {
        self.0.borrow_mut().push(Fault {
            message: message.to_string(),
            dump: dump.to_string(),
        });
    }
}

pub type Faults = Rc<RefCell<Vec<Fault>>>;

/// Runtime with the default stack depth and a recording sink
pub fn runtime() -> (Runtime, Faults) {
    runtime_with_depth(Config::default().max_stack_depth)
}

pub fn runtime_with_depth(max_stack_depth: usize) -> (Runtime, Faults) {
    let config = Config {
        max_stack_depth,
        ..Config::default()
    };
    let mut rt = Runtime::new(&config);
    let sink = RecordingSink::default();
    let faults = Rc::clone(&sink.0);
    rt.set_diagnostic_sink(Box::new(sink));
    (rt, faults)
}

/// Build a script proc from a JSON instruction list
pub fn script(name: &str, params: &[&str], code_json: &str) -> Rc<dyn Proc> {
    script_with_locals(name, params, 0, code_json)
}

pub fn script_with_locals(name: &str, params: &[&str], locals: usize, code_json: &str) -> Rc<dyn Proc> {
    let code: Vec<Instr> = serde_json::from_str(code_json).expect("Instruction JSON should parse");
    let params = params.iter().map(|p| p.to_string()).collect();
    Rc::new(ScriptProc::new(ProcHeader::new(name, params, Vec::new()), code, locals))
}

pub fn native<F>(name: &str, handler: F) -> Rc<dyn Proc>
where
    F: Fn(&mut Runtime, Option<ObjectRef>, Option<ObjectRef>, &Arguments) -> ProcResult<Value> + 'static,
{
    Rc::new(NativeProc::new(ProcHeader::named(name), handler))
}
