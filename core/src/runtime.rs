//! Process-wide runtime state
//!
//! The [`Runtime`] owns everything shared by every execution context: the
//! object table, global procs and the diagnostic sink. It also holds
//! contexts that deferred during a synchronous call until the
//! [`Scheduler`](crate::scheduler::Scheduler) adopts them. Script execution is
//! confined to the thread that created it; `Runtime` is `!Send`, and
//! resuming a context checks the thread again.

use std::collections::HashMap;
use std::rc::Rc;
use std::thread::{self, ThreadId};

use tracing::debug;

use crate::config::Config;
use crate::context::{ContextId, ExecutionContext};
use crate::diagnostics::{self, DiagnosticSink, TracingSink};
use crate::error::{ProcResult, RuntimeError};
use crate::objects::{init, ObjectTable};
use crate::procs::{self, Arguments, Proc};
use crate::value::{ObjectRef, Value};

pub struct Runtime {
    objects: ObjectTable,
    globals: HashMap<String, Rc<dyn Proc>>,
    init_proc: Rc<dyn Proc>,
    sink: Box<dyn DiagnosticSink>,
    max_stack_depth: usize,
    detached: Vec<ExecutionContext>,
    worker: ThreadId,
}

impl Runtime {
    pub fn new(config: &Config) -> Self {
        Self {
            objects: ObjectTable::new(),
            globals: HashMap::new(),
            init_proc: init::init_proc(),
            sink: Box::new(TracingSink),
            max_stack_depth: config.max_stack_depth,
            detached: Vec::new(),
            worker: thread::current().id(),
        }
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectTable {
        &mut self.objects
    }

    pub fn set_diagnostic_sink(&mut self, sink: Box<dyn DiagnosticSink>) {
        self.sink = sink;
    }

    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    /// Fresh, empty context bounded by the configured depth
    pub fn new_context(&self) -> ExecutionContext {
        ExecutionContext::new(self.max_stack_depth)
    }

    /* ===================== Procs ===================== */

    pub fn define_global(&mut self, name: impl Into<String>, proc: Rc<dyn Proc>) {
        self.globals.insert(name.into(), proc);
    }

    pub fn global_proc(&self, name: &str) -> ProcResult<Rc<dyn Proc>> {
        self.globals.get(name).cloned().ok_or_else(|| RuntimeError::UnknownProc {
            owner: "world".to_string(),
            name: name.to_string(),
        })
    }

    pub fn global_procs(&self) -> impl Iterator<Item = (&str, &Rc<dyn Proc>)> {
        self.globals.iter().map(|(name, proc)| (name.as_str(), proc))
    }

    /// The `(init)` proc that runs object construction
    pub fn init_proc(&self) -> Rc<dyn Proc> {
        Rc::clone(&self.init_proc)
    }

    /// Run `proc` in a fresh context. See [`procs::run`] for what happens
    /// when it defers.
    pub fn call(&mut self, proc: &Rc<dyn Proc>, src: Option<ObjectRef>, arguments: Arguments, usr: Option<ObjectRef>) -> Value {
        procs::run(self, proc, src, arguments, usr)
    }

    /// Create and construct an object in a fresh context.
    ///
    /// A fault during construction is reported like any other and does not
    /// fail this call; the object stays allocated. If construction defers,
    /// the object is returned right away and construction finishes in the
    /// background once a scheduler adopts the context.
    pub fn new_object(&mut self, type_path: &str, arguments: Arguments, usr: Option<ObjectRef>) -> ProcResult<ObjectRef> {
        let object = self.objects.allocate(type_path)?;
        let init = self.init_proc();
        procs::run(self, &init, Some(object), arguments, usr);
        Ok(object)
    }

    /* ===================== Detached Contexts ===================== */

    /// Keep a context that deferred with no owner to resume it.
    pub(crate) fn detach(&mut self, context: ExecutionContext) {
        debug!(context = %context.id(), state = ?context.state(), "detached");
        self.detached.push(context);
    }

    /// Number of deferred contexts waiting for a scheduler
    pub fn detached(&self) -> usize {
        self.detached.len()
    }

    pub(crate) fn take_detached(&mut self) -> Vec<ExecutionContext> {
        std::mem::take(&mut self.detached)
    }

    /* ===================== Execution Support ===================== */

    /// # Panics
    ///
    /// When called from any thread but the one that created the runtime.
    pub(crate) fn assert_worker_thread(&self) {
        assert_eq!(
            thread::current().id(),
            self.worker,
            "execution contexts may only be resumed on the runtime's worker thread"
        );
    }

    pub(crate) fn report_fault(&mut self, context: ContextId, err: &RuntimeError, stack_trace: &str) {
        let dump = diagnostics::render_dump(err, stack_trace);
        self.sink.report(&format!("{context}: {err}"), &dump);
    }
}
