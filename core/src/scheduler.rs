//! Cooperative scheduler
//!
//! Owns every context that deferred and decides when each one is resumed.
//! Only one activation runs at a time; "concurrency" is contexts taking
//! turns between ticks.
//!
//! - `Sleep(n)` parks a context until `n` ticks have passed (at least one)
//! - `Wait` parks it until [`Scheduler::wake`] is called with its id
//! - sleepers waking on the same tick resume in the order they went to sleep
//! - contexts that deferred under a synchronous call are detached onto the
//!   runtime; the scheduler adopts them after every resume and at the start
//!   of every tick, counting their sleep from the moment of adoption

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::context::{ContextId, ContextState, ExecutionContext};
use crate::procs::{Arguments, Proc, Wait};
use crate::runtime::Runtime;
use crate::value::{ObjectRef, Value};

/// Receives the final value of a call; null if the call faulted
pub type Completion = Box<dyn FnOnce(&mut Runtime, Value)>;

struct Parked {
    context: ExecutionContext,
    on_complete: Option<Completion>,
}

#[derive(Default)]
pub struct Scheduler {
    tick: u64,
    seq: u64,
    parked: HashMap<ContextId, Parked>,
    sleepers: BinaryHeap<Reverse<(u64, u64, ContextId)>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tick", &self.tick)
            .field("parked", &self.parked.len())
            .field("sleepers", &self.sleepers.len())
            .finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Number of parked contexts
    pub fn pending(&self) -> usize {
        self.parked.len()
    }

    pub fn is_idle(&self) -> bool {
        self.parked.is_empty()
    }

    pub fn is_parked(&self, id: ContextId) -> bool {
        self.parked.contains_key(&id)
    }

    /// Whether any parked context will be resumed by a future tick.
    /// When false, only [`Scheduler::wake`] can make progress.
    pub fn has_sleepers(&self) -> bool {
        !self.sleepers.is_empty()
    }

    /// Start `proc` in a new context without waiting for it.
    pub fn spawn(
        &mut self,
        rt: &mut Runtime,
        proc: &Rc<dyn Proc>,
        src: Option<ObjectRef>,
        arguments: Arguments,
        usr: Option<ObjectRef>,
    ) -> ContextId {
        self.call_async(rt, proc, src, arguments, usr, None)
    }

    /// Start `proc` in a new context and run `on_complete` with its final
    /// value once it returns. If the proc never defers, the callback runs
    /// before this returns.
    pub fn call_async(
        &mut self,
        rt: &mut Runtime,
        proc: &Rc<dyn Proc>,
        src: Option<ObjectRef>,
        arguments: Arguments,
        usr: Option<ObjectRef>,
        on_complete: Option<Completion>,
    ) -> ContextId {
        let mut context = rt.new_context();
        let state = Rc::clone(proc).create_state(context.id(), src, usr, arguments);

        if let Err(err) = context.push(state) {
            let value = context.abort(rt, err);
            if let Some(callback) = on_complete {
                callback(rt, value);
            }
            return context.id();
        }

        self.drive(rt, Parked { context, on_complete })
    }

    /// Advance time by one tick and resume every sleeper that is due.
    /// Returns how many contexts were resumed.
    pub fn tick(&mut self, rt: &mut Runtime) -> usize {
        self.adopt(rt);
        self.tick += 1;
        let mut resumed = 0;

        while let Some(Reverse((wake_at, _, id))) = self.sleepers.peek().copied() {
            if wake_at > self.tick {
                break;
            }
            self.sleepers.pop();

            if let Some(parked) = self.parked.remove(&id) {
                self.drive(rt, parked);
                resumed += 1;
            }
        }

        resumed
    }

    /// Resume a context parked on an external wait.
    /// Returns false if no such context is waiting.
    pub fn wake(&mut self, rt: &mut Runtime, id: ContextId) -> bool {
        let waiting = self
            .parked
            .get(&id)
            .is_some_and(|p| *p.context.state() == ContextState::Deferred(Wait::External));
        if !waiting {
            return false;
        }

        if let Some(parked) = self.parked.remove(&id) {
            self.drive(rt, parked);
        }
        true
    }

    fn drive(&mut self, rt: &mut Runtime, mut parked: Parked) -> ContextId {
        let value = parked.context.resume(rt);
        let id = self.park(rt, parked, value);
        self.adopt(rt);
        id
    }

    /// Take over contexts that deferred inside a synchronous call.
    fn adopt(&mut self, rt: &mut Runtime) {
        for context in rt.take_detached() {
            debug!(context = %context.id(), "adopted");
            let parked = Parked {
                context,
                on_complete: None,
            };
            self.park(rt, parked, Value::Null);
        }
    }

    /// File a context by its state after a resume. `value` is what the
    /// resume returned, delivered to the callback if the context finished.
    fn park(&mut self, rt: &mut Runtime, parked: Parked, value: Value) -> ContextId {
        let id = parked.context.id();

        match parked.context.state().clone() {
            ContextState::Deferred(Wait::Ticks(ticks)) => {
                let wake_at = self.tick + ticks.max(1);
                debug!(context = %id, wake_at, "sleeping");
                self.seq += 1;
                self.sleepers.push(Reverse((wake_at, self.seq, id)));
                self.parked.insert(id, parked);
            }
            ContextState::Deferred(Wait::External) => {
                debug!(context = %id, "waiting");
                self.parked.insert(id, parked);
            }
            _ => {
                debug!(context = %id, "finished");
                if let Some(callback) = parked.on_complete {
                    callback(rt, value);
                }
            }
        }

        id
    }
}
