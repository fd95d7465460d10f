//! Tests for object construction, method dispatch and deletion

use std::cell::RefCell;
use std::rc::Rc;

use maplit::hashmap;

use super::helpers::{native, runtime, script};
use crate::error::{ProcResult, RuntimeError};
use crate::objects::{MetaObject, ObjectDefinition, ObjectTable};
use crate::procs::{self, Arguments, Proc};
use crate::runtime::Runtime;
use crate::value::{ObjectRef, Value};

type Log = Rc<RefCell<Vec<String>>>;

#[derive(Debug)]
struct LoggingMeta {
    log: Log,
    call_new: bool,
}

impl MetaObject for LoggingMeta {
    fn should_call_new(&self) -> bool {
        self.call_new
    }

    fn on_object_created(&self, _objects: &mut ObjectTable, _object: ObjectRef, arguments: &Arguments) -> ProcResult<()> {
        self.log.borrow_mut().push(format!("created({})", arguments.len()));
        Ok(())
    }
}

fn logging_native(name: &str, log: &Log, entry: &'static str) -> Rc<dyn Proc> {
    let log = Rc::clone(log);
    native(name, move |_, _, _, _| {
        log.borrow_mut().push(entry.to_string());
        Ok(Value::Null)
    })
}

/// `/mob` with an initializer, a `New` that stores its argument in `hp`,
/// and a logging meta object
fn define_mob(rt: &mut Runtime, log: &Log, call_new: bool) {
    let log_new = Rc::clone(log);
    let new = native("/mob/proc/New", move |rt, src, _, args| {
        log_new.borrow_mut().push("New".to_string());
        let mob = src.ok_or(RuntimeError::NotAnObject("null"))?;
        rt.objects_mut().set_variable(mob, "hp", args.get(0))?;
        Ok(Value::Null)
    });

    let mob = ObjectDefinition::builder("/mob")
        .variable("hp", Value::Int(10))
        .init_proc(logging_native("/mob/(init)", log, "init"))
        .proc("New", new)
        .meta(Rc::new(LoggingMeta {
            log: Rc::clone(log),
            call_new,
        }))
        .build();
    rt.objects_mut().register_type(mob);
}

#[test]
fn test_construction_order() {
    let (mut rt, faults) = runtime();
    let log = Log::default();
    define_mob(&mut rt, &log, true);

    let mob = rt.new_object("/mob", Arguments::new(vec![Value::Int(99)]), None).unwrap();

    assert_eq!(*log.borrow(), vec!["init", "created(1)", "New"]);
    assert_eq!(rt.objects().get_variable(mob, "hp").unwrap(), Value::Int(99));
    assert!(faults.borrow().is_empty());
}

#[test]
fn test_meta_can_skip_new() {
    let (mut rt, _faults) = runtime();
    let log = Log::default();
    define_mob(&mut rt, &log, false);

    let mob = rt.new_object("/mob", Arguments::new(vec![Value::Int(99)]), None).unwrap();

    assert_eq!(*log.borrow(), vec!["init", "created(1)"]);
    assert_eq!(rt.objects().get_variable(mob, "hp").unwrap(), Value::Int(10));
}

#[test]
fn test_type_without_new_or_meta() {
    let (mut rt, _faults) = runtime();
    rt.objects_mut()
        .register_type(ObjectDefinition::builder("/obj").variable("name", Value::text("rock")).build());

    let object = rt.new_object("/obj", Arguments::default(), None).unwrap();
    assert_eq!(rt.objects().get_variable(object, "name").unwrap(), Value::text("rock"));
}

#[test]
fn test_new_instruction_returns_constructed_object() {
    let (mut rt, _faults) = runtime();
    let log = Log::default();
    define_mob(&mut rt, &log, true);
    let spawn = script(
        "/proc/spawn",
        &[],
        r#"[
            {"op": "Push", "v": {"t": "Int", "v": 5}},
            {"op": "New", "path": "/mob", "argc": 1},
            {"op": "GetVar", "name": "hp"},
            {"op": "Return"}
        ]"#,
    );

    let result = procs::run(&mut rt, &spawn, None, Arguments::default(), None);

    assert_eq!(result, Value::Int(5));
    assert_eq!(*log.borrow(), vec!["init", "created(1)", "New"]);
}

#[test]
fn test_construction_fault_shows_init_frames() {
    let (mut rt, faults) = runtime();
    let new = script(
        "/mob/proc/New",
        &[],
        r#"[{"op": "Push", "v": {"t": "Text", "v": "cannot spawn"}}, {"op": "Crash"}]"#,
    );
    rt.objects_mut()
        .register_type(ObjectDefinition::builder("/mob").proc("New", new).build());
    let spawn = script(
        "/proc/spawn",
        &[],
        r#"[{"op": "New", "path": "/mob", "argc": 0}, {"op": "Return"}]"#,
    );

    assert_eq!(procs::run(&mut rt, &spawn, None, Arguments::default(), None), Value::Null);

    let faults = faults.borrow();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].frames(), vec!["/mob/proc/New", "(init)", "/proc/spawn"]);
}

#[test]
fn test_new_object_survives_construction_fault() {
    let (mut rt, faults) = runtime();
    let new = script(
        "/mob/proc/New",
        &[],
        r#"[{"op": "Push", "v": {"t": "Text", "v": "cannot spawn"}}, {"op": "Crash"}]"#,
    );
    rt.objects_mut()
        .register_type(ObjectDefinition::builder("/mob").proc("New", new).build());

    let mob = rt.new_object("/mob", Arguments::default(), None).unwrap();

    assert!(rt.objects().is_alive(mob));
    assert_eq!(faults.borrow().len(), 1);
}

#[test]
fn test_new_object_of_unknown_type() {
    let (mut rt, _faults) = runtime();
    assert_eq!(
        rt.new_object("/nope", Arguments::default(), None),
        Err(RuntimeError::UnknownType("/nope".to_string()))
    );
}

#[test]
fn test_call_on_dispatches_with_src() {
    let (mut rt, _faults) = runtime();
    let describe = script(
        "/obj/proc/describe",
        &[],
        r#"[{"op": "Src"}, {"op": "GetVar", "name": "name"}, {"op": "Return"}]"#,
    );
    rt.objects_mut().register_type(
        ObjectDefinition::builder("/obj")
            .variable("name", Value::text("rock"))
            .proc("describe", describe)
            .build(),
    );
    let rock = rt.new_object("/obj", Arguments::default(), None).unwrap();

    assert_eq!(
        procs::call_on(&mut rt, rock, "describe", Arguments::default(), None),
        Ok(Value::text("rock"))
    );
    assert_eq!(
        procs::call_on(&mut rt, rock, "missing", Arguments::default(), None),
        Err(RuntimeError::UnknownProc {
            owner: "/obj".to_string(),
            name: "missing".to_string(),
        })
    );
}

#[test]
fn test_override_calls_super() {
    let (mut rt, _faults) = runtime();
    let base = script(
        "/mob/proc/damage",
        &["n"],
        r#"[{"op": "GetLocal", "slot": 0}, {"op": "Return"}]"#,
    );
    let doubled = script(
        "/mob/player/proc/damage",
        &["n"],
        r#"[
            {"op": "GetLocal", "slot": 0},
            {"op": "CallSuper", "argc": 1},
            {"op": "Push", "v": {"t": "Int", "v": 2}},
            {"op": "Mul"},
            {"op": "Return"}
        ]"#,
    );
    let mob = ObjectDefinition::builder("/mob").proc("damage", base).build();
    let player = ObjectDefinition::builder("/mob/player")
        .parent(Rc::clone(&mob))
        .proc("damage", doubled)
        .build();
    rt.objects_mut().register_type(mob);
    rt.objects_mut().register_type(player);

    let hitter = script(
        "/proc/hit",
        &["target"],
        r#"[
            {"op": "GetLocal", "slot": 0},
            {"op": "Push", "v": {"t": "Int", "v": 4}},
            {"op": "CallMethod", "name": "damage", "argc": 1},
            {"op": "Return"}
        ]"#,
    );

    let player = rt.new_object("/mob/player", Arguments::default(), None).unwrap();
    let plain = rt.new_object("/mob", Arguments::default(), None).unwrap();

    let args = |o| Arguments::new(vec![Value::Object(o)]);
    assert_eq!(procs::run(&mut rt, &hitter, None, args(player), None), Value::Int(8));
    assert_eq!(procs::run(&mut rt, &hitter, None, args(plain), None), Value::Int(4));
}

#[test]
fn test_super_without_parent_faults() {
    let (mut rt, faults) = runtime();
    let lonely = script("/proc/lonely", &[], r#"[{"op": "CallSuper", "argc": 0}, {"op": "Return"}]"#);

    procs::run(&mut rt, &lonely, None, Arguments::default(), None);

    assert!(faults.borrow()[0].message.contains("undefined proc '..' on /proc/lonely"));
}

#[test]
fn test_deleted_object_in_deferred_context() {
    let (mut rt, faults) = runtime();
    rt.objects_mut().register_type(
        ObjectDefinition::builder("/obj")
            .variable("name", Value::text("rock"))
            .build(),
    );
    let rock = rt.new_object("/obj", Arguments::default(), None).unwrap();

    // Sleep, then read a variable of the argument
    let later = script(
        "/proc/later",
        &["thing"],
        r#"[
            {"op": "Push", "v": {"t": "Int", "v": 1}},
            {"op": "Sleep"},
            {"op": "GetLocal", "slot": 0},
            {"op": "GetVar", "name": "name"},
            {"op": "Return"}
        ]"#,
    );
    let mut context = rt.new_context();
    context
        .push(later.create_state(context.id(), None, None, Arguments::new(vec![Value::Object(rock)])))
        .unwrap();
    context.resume(&mut rt);

    rt.objects_mut().delete(rock).unwrap();
    // A new object may reuse the slot; the stale handle must not reach it
    let other = rt.new_object("/obj", Arguments::default(), None).unwrap();
    assert_eq!(other.index(), rock.index());

    assert_eq!(context.resume(&mut rt), Value::Null);
    assert!(faults.borrow()[0].message.contains("reference to deleted object"));
}

#[test]
fn test_del_instruction() {
    let (mut rt, _faults) = runtime();
    rt.objects_mut().register_type(ObjectDefinition::builder("/obj").build());
    let rock = rt.new_object("/obj", Arguments::default(), None).unwrap();
    let del = script(
        "/proc/del",
        &["thing"],
        r#"[
            {"op": "GetLocal", "slot": 0},
            {"op": "Del"},
            {"op": "GetLocal", "slot": 0},
            {"op": "Del"}
        ]"#,
    );

    procs::run(&mut rt, &del, None, Arguments::new(vec![Value::Object(rock)]), None);

    assert!(!rt.objects().is_alive(rock));
    assert!(rt.objects().is_empty());
}

#[test]
fn test_set_var_runs_through_table() {
    let (mut rt, faults) = runtime();
    rt.objects_mut()
        .register_type(ObjectDefinition::builder("/obj").variable("count", Value::Int(0)).build());
    let rock = rt.new_object("/obj", Arguments::default(), None).unwrap();
    let bump = script(
        "/proc/bump",
        &["thing"],
        r#"[
            {"op": "GetLocal", "slot": 0},
            {"op": "GetLocal", "slot": 0},
            {"op": "GetVar", "name": "count"},
            {"op": "Push", "v": {"t": "Int", "v": 1}},
            {"op": "Add"},
            {"op": "SetVar", "name": "count"},
            {"op": "GetLocal", "slot": 0},
            {"op": "Push", "v": {"t": "Int", "v": 1}},
            {"op": "SetVar", "name": "undeclared"}
        ]"#,
    );

    procs::run(&mut rt, &bump, None, Arguments::new(vec![Value::Object(rock)]), None);

    assert_eq!(rt.objects().get_variable(rock, "count").unwrap(), Value::Int(1));
    assert!(faults.borrow()[0].message.contains("undefined variable 'undeclared' on /obj"));
}

#[derive(Debug)]
struct Refuse;

impl MetaObject for Refuse {
    fn on_object_created(&self, _objects: &mut ObjectTable, object: ObjectRef, _arguments: &Arguments) -> ProcResult<()> {
        Err(RuntimeError::Hook(format!("{object} refused to exist")))
    }
}

#[test]
fn test_hook_failure_is_a_script_fault() {
    let (mut rt, faults) = runtime();
    rt.objects_mut()
        .register_type(ObjectDefinition::builder("/obj").meta(Rc::new(Refuse)).build());
    let spawn = script(
        "/proc/spawn",
        &[],
        r#"[{"op": "New", "path": "/obj", "argc": 0}, {"op": "Return"}]"#,
    );
    let survivor = script(
        "/proc/survivor",
        &[],
        r#"[{"op": "Push", "v": {"t": "Int", "v": 1}}, {"op": "Return"}]"#,
    );

    assert_eq!(procs::run(&mut rt, &spawn, None, Arguments::default(), None), Value::Null);
    assert_eq!(procs::run(&mut rt, &survivor, None, Arguments::default(), None), Value::Int(1));

    let faults = faults.borrow();
    assert_eq!(faults.len(), 1);
    assert!(faults[0].message.contains("meta object hook failed"));
    assert_eq!(faults[0].frames(), vec!["(init)", "/proc/spawn"]);
}

#[test]
fn test_named_construction_arguments_reach_new() {
    let (mut rt, faults) = runtime();
    let new = script(
        "/obj/proc/New",
        &["hp"],
        r#"[
            {"op": "Src"},
            {"op": "GetLocal", "slot": 0},
            {"op": "SetVar", "name": "hp"}
        ]"#,
    );
    rt.objects_mut().register_type(
        ObjectDefinition::builder("/obj")
            .variable("hp", Value::Int(0))
            .proc("New", new)
            .build(),
    );
    let arguments = Arguments::with_named(Vec::new(), hashmap! { "hp".to_string() => Value::Int(7) });

    let object = rt.new_object("/obj", arguments, None).unwrap();

    assert_eq!(rt.objects().get_variable(object, "hp").unwrap(), Value::Int(7));
    assert!(faults.borrow().is_empty());
}

#[test]
fn test_unknown_construction_argument_is_reported_by_new() {
    let (mut rt, faults) = runtime();
    let new = script("/obj/proc/New", &["hp"], "[]");
    rt.objects_mut()
        .register_type(ObjectDefinition::builder("/obj").proc("New", new).build());
    let arguments = Arguments::with_named(Vec::new(), hashmap! { "mp".to_string() => Value::Int(7) });

    rt.new_object("/obj", arguments, None).unwrap();

    let faults = faults.borrow();
    assert!(faults[0].message.contains("proc '/obj/proc/New' has no argument named 'mp'"));
    assert_eq!(faults[0].frames(), vec!["/obj/proc/New", "(init)"]);
}
