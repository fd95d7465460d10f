//! Compiled world loading
//!
//! The compiler emits a JSON document describing every object type and
//! global proc. Script procs arrive as ready-to-run instruction lists;
//! native procs name a host binding from a [`NativeRegistry`].
//!
//! Types may appear in any order, so loading runs in two passes: every proc
//! is built first, then definitions are assembled parents-first, which is
//! where overriding procs get their super links backpatched.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::objects::{MetaObject, ObjectDefinition, ObjectTable};
use crate::procs::async_native::RoutineFactory;
use crate::procs::native::NativeHandler;
use crate::procs::{Arguments, AsyncNativeProc, NativeProc, NativeRoutine, Proc, ProcHeader, ScriptProc};
use crate::procs::script::Instr;
use crate::error::ProcResult;
use crate::runtime::Runtime;
use crate::value::{Constant, KindSet, ObjectRef, Value, ValueKind};

/* ===================== Compiled Form ===================== */

#[derive(Debug, Deserialize)]
pub struct CompiledWorld {
    #[serde(default)]
    pub types: Vec<CompiledType>,
    #[serde(default)]
    pub procs: BTreeMap<String, CompiledProc>,
}

#[derive(Debug, Deserialize)]
pub struct CompiledType {
    pub path: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, Constant>,
    #[serde(default)]
    pub procs: BTreeMap<String, CompiledProc>,
    #[serde(default)]
    pub init: Option<CompiledProc>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CompiledProc {
    Native {
        native: String,
        #[serde(default)]
        params: Vec<String>,
        #[serde(default)]
        kinds: Vec<Vec<ValueKind>>,
    },
    Script {
        #[serde(default)]
        params: Vec<String>,
        #[serde(default)]
        kinds: Vec<Vec<ValueKind>>,
        #[serde(default)]
        locals: usize,
        code: Vec<Instr>,
    },
}

/* ===================== Native Bindings ===================== */

enum NativeBinding {
    Sync(Rc<NativeHandler>),
    Suspendable(Rc<RoutineFactory>),
}

/// Host implementations that compiled worlds refer to by name, plus
/// meta objects to attach to types by path.
#[derive(Default)]
pub struct NativeRegistry {
    bindings: HashMap<String, NativeBinding>,
    metas: HashMap<String, Rc<dyn MetaObject>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut Runtime, Option<ObjectRef>, Option<ObjectRef>, &Arguments) -> ProcResult<Value> + 'static,
    {
        self.bindings.insert(name.into(), NativeBinding::Sync(Rc::new(handler)));
        self
    }

    pub fn register_suspendable<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn NativeRoutine> + 'static,
    {
        self.bindings.insert(name.into(), NativeBinding::Suspendable(Rc::new(factory)));
        self
    }

    pub fn register_meta(&mut self, type_path: impl Into<String>, meta: Rc<dyn MetaObject>) -> &mut Self {
        self.metas.insert(type_path.into(), meta);
        self
    }

    fn bind(&self, name: &str, header: ProcHeader) -> Option<Rc<dyn Proc>> {
        match self.bindings.get(name)? {
            NativeBinding::Sync(handler) => Some(Rc::new(NativeProc::from_handler(header, Rc::clone(handler)))),
            NativeBinding::Suspendable(factory) => {
                Some(Rc::new(AsyncNativeProc::from_factory(header, Rc::clone(factory))))
            }
        }
    }
}

/* ===================== Loading ===================== */

pub fn load_world_file(rt: &mut Runtime, path: &Path, natives: &NativeRegistry) -> Result<()> {
    let source = fs::read_to_string(path).with_context(|| format!("Failed to read world {}", path.display()))?;
    load_world(rt, &source, natives).with_context(|| format!("Failed to load world {}", path.display()))
}

/// Load a compiled world into `rt`. Parents may also be types the host
/// registered on the runtime beforehand.
pub fn load_world(rt: &mut Runtime, json: &str, natives: &NativeRegistry) -> Result<()> {
    let world: CompiledWorld = serde_json::from_str(json).context("Failed to parse compiled world")?;

    let mut pending = HashMap::new();
    for ty in world.types {
        let path = ty.path.clone();
        let loaded = build_type_procs(ty, natives)?;
        if pending.insert(path.clone(), loaded).is_some() {
            bail!("Type {path} is defined twice");
        }
    }

    let mut paths: Vec<String> = pending.keys().cloned().collect();
    paths.sort();

    let mut built = HashMap::new();
    for path in &paths {
        build_definition(path, &mut pending, &mut built, rt.objects(), natives, &mut Vec::new())?;
    }

    let type_count = built.len();
    for (_, definition) in built {
        rt.objects_mut().register_type(definition);
    }

    let proc_count = world.procs.len();
    for (name, compiled) in world.procs {
        let proc = build_proc(&format!("/proc/{name}"), compiled, natives)?;
        rt.define_global(name, proc);
    }

    info!(types = type_count, procs = proc_count, "world loaded");
    Ok(())
}

/// A type whose procs exist but whose definition is not assembled yet
struct PendingType {
    parent: Option<String>,
    vars: BTreeMap<String, Constant>,
    procs: Vec<(String, Rc<dyn Proc>)>,
    init: Option<Rc<dyn Proc>>,
}

fn build_type_procs(ty: CompiledType, natives: &NativeRegistry) -> Result<PendingType> {
    let mut procs = Vec::with_capacity(ty.procs.len());
    for (name, compiled) in ty.procs {
        let proc = build_proc(&format!("{}/proc/{name}", ty.path), compiled, natives)?;
        procs.push((name, proc));
    }

    let init = ty
        .init
        .map(|compiled| build_proc(&format!("{}/(init)", ty.path), compiled, natives))
        .transpose()?;

    Ok(PendingType {
        parent: ty.parent,
        vars: ty.vars,
        procs,
        init,
    })
}

fn build_definition(
    path: &str,
    pending: &mut HashMap<String, PendingType>,
    built: &mut HashMap<String, Rc<ObjectDefinition>>,
    existing: &ObjectTable,
    natives: &NativeRegistry,
    visiting: &mut Vec<String>,
) -> Result<Rc<ObjectDefinition>> {
    if let Some(definition) = built.get(path) {
        return Ok(Rc::clone(definition));
    }
    if visiting.iter().any(|p| p == path) {
        bail!("Type inheritance cycle through {path}");
    }
    let Some(ty) = pending.remove(path) else {
        return existing
            .get_type(path)
            .cloned()
            .with_context(|| format!("Unknown parent type {path}"));
    };

    visiting.push(path.to_string());
    let parent = match &ty.parent {
        Some(parent) => Some(build_definition(parent, pending, built, existing, natives, visiting)?),
        None => None,
    };
    visiting.pop();

    let mut builder = ObjectDefinition::builder(path);
    if let Some(parent) = parent {
        builder = builder.parent(parent);
    }
    for (name, default) in &ty.vars {
        builder = builder.variable(name.clone(), default.into());
    }
    for (name, proc) in ty.procs {
        builder = builder.proc(name, proc);
    }
    if let Some(init) = ty.init {
        builder = builder.init_proc(init);
    }
    if let Some(meta) = natives.metas.get(path) {
        builder = builder.meta(Rc::clone(meta));
    }

    let definition = builder.build();
    built.insert(path.to_string(), Rc::clone(&definition));
    Ok(definition)
}

fn build_proc(name: &str, compiled: CompiledProc, natives: &NativeRegistry) -> Result<Rc<dyn Proc>> {
    match compiled {
        CompiledProc::Native { native, params, kinds } => {
            let header = header(name, params, kinds);
            natives
                .bind(&native, header)
                .with_context(|| format!("No native binding '{native}' for {name}"))
        }
        CompiledProc::Script {
            params,
            kinds,
            locals,
            code,
        } => Ok(Rc::new(ScriptProc::new(header(name, params, kinds), code, locals))),
    }
}

fn header(name: &str, params: Vec<String>, kinds: Vec<Vec<ValueKind>>) -> ProcHeader {
    let mut types: Vec<KindSet> = kinds.iter().map(|k| KindSet::of(k)).collect();
    types.resize(params.len().max(types.len()), KindSet::ANY);
    ProcHeader::new(name, params, types)
}
