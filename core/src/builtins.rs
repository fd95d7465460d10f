//! Host procs available to every world

use std::rc::Rc;

use tracing::info;

use crate::error::ProcResult;
use crate::loader::NativeRegistry;
use crate::procs::{Arguments, AsyncNativeProc, NativeProc, NativeRoutine, NativeStep, ProcHeader, RoutineCx};
use crate::runtime::Runtime;
use crate::value::{KindSet, ObjectRef, Value, ValueKind};

pub const WORLD_LOG: &str = "world_log";
pub const SLEEP: &str = "sleep";

/// Define the builtins as global procs.
pub fn install(rt: &mut Runtime) {
    rt.define_global(WORLD_LOG, Rc::new(NativeProc::new(ProcHeader::named(WORLD_LOG), world_log)));
    rt.define_global(
        SLEEP,
        Rc::new(AsyncNativeProc::new(sleep_header(), || Box::new(Sleep::default()))),
    );
}

/// Make the builtins bindable by name from compiled worlds.
pub fn register(natives: &mut NativeRegistry) {
    natives
        .register(WORLD_LOG, world_log)
        .register_suspendable(SLEEP, || Box::new(Sleep::default()));
}

fn sleep_header() -> ProcHeader {
    ProcHeader::new(SLEEP, vec!["ticks".to_string()], vec![KindSet::of(&[ValueKind::Num])])
}

fn world_log(_rt: &mut Runtime, src: Option<ObjectRef>, _usr: Option<ObjectRef>, arguments: &Arguments) -> ProcResult<Value> {
    let line = arguments
        .positional()
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    match src {
        Some(src) => info!(target: "world", %src, "{line}"),
        None => info!(target: "world", "{line}"),
    }
    Ok(Value::Null)
}

/// Defers once for the requested number of ticks, then returns null.
#[derive(Debug, Default)]
struct Sleep {
    slept: bool,
}

impl NativeRoutine for Sleep {
    fn step(&mut self, _rt: &mut Runtime, cx: &mut RoutineCx<'_>) -> ProcResult<NativeStep> {
        if self.slept {
            return Ok(NativeStep::Done(Value::Null));
        }
        self.slept = true;
        let ticks = cx.arguments().get(0).as_int()?;
        Ok(NativeStep::Sleep(ticks.max(0) as u64))
    }
}
