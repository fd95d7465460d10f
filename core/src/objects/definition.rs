//! Object type definitions and meta-object hooks

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::ProcResult;
use crate::procs::{Arguments, Proc};
use crate::value::{ObjectRef, Value};

use super::ObjectTable;

/// Per-type hooks the object table runs around object lifecycle and
/// variable access. All hooks are synchronous; none may call procs.
pub trait MetaObject: fmt::Debug {
    /// Whether construction ends by calling the type's `New` proc
    fn should_call_new(&self) -> bool {
        true
    }

    fn on_object_created(&self, _objects: &mut ObjectTable, _object: ObjectRef, _arguments: &Arguments) -> ProcResult<()> {
        Ok(())
    }

    /// May replace the value read
    fn on_variable_get(&self, _objects: &ObjectTable, _object: ObjectRef, _name: &str, value: Value) -> ProcResult<Value> {
        Ok(value)
    }

    fn on_variable_set(
        &self,
        _objects: &mut ObjectTable,
        _object: ObjectRef,
        _name: &str,
        _value: &Value,
        _old: &Value,
    ) -> ProcResult<()> {
        Ok(())
    }

    fn on_object_deleted(&self, _objects: &mut ObjectTable, _object: ObjectRef) -> ProcResult<()> {
        Ok(())
    }
}

/// Shared, immutable description of one object type.
///
/// Variables and procs are already merged with the parent's, so lookups
/// never walk the type chain.
pub struct ObjectDefinition {
    type_path: String,
    parent: Option<Rc<ObjectDefinition>>,
    variables: HashMap<String, Value>,
    procs: HashMap<String, Rc<dyn Proc>>,
    init_proc: Option<Rc<dyn Proc>>,
    meta: Option<Rc<dyn MetaObject>>,
}

impl ObjectDefinition {
    pub fn builder(type_path: impl Into<String>) -> DefinitionBuilder {
        DefinitionBuilder {
            type_path: type_path.into(),
            parent: None,
            variables: HashMap::new(),
            procs: Vec::new(),
            init_proc: None,
            meta: None,
        }
    }

    pub fn type_path(&self) -> &str {
        &self.type_path
    }

    pub fn parent(&self) -> Option<&Rc<ObjectDefinition>> {
        self.parent.as_ref()
    }

    /// Declared default for `name`
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn proc(&self, name: &str) -> Option<&Rc<dyn Proc>> {
        self.procs.get(name)
    }

    pub fn init_proc(&self) -> Option<&Rc<dyn Proc>> {
        self.init_proc.as_ref()
    }

    pub fn meta(&self) -> Option<&Rc<dyn MetaObject>> {
        self.meta.as_ref()
    }

    pub fn is_subtype_of(&self, type_path: &str) -> bool {
        let mut current = Some(self);
        while let Some(def) = current {
            if def.type_path == type_path {
                return true;
            }
            current = def.parent.as_deref();
        }
        false
    }
}

impl fmt::Debug for ObjectDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut procs: Vec<_> = self.procs.keys().collect();
        procs.sort();
        f.debug_struct("ObjectDefinition")
            .field("type_path", &self.type_path)
            .field("parent", &self.parent.as_ref().map(|p| p.type_path.as_str()))
            .field("procs", &procs)
            .finish_non_exhaustive()
    }
}

pub struct DefinitionBuilder {
    type_path: String,
    parent: Option<Rc<ObjectDefinition>>,
    variables: HashMap<String, Value>,
    procs: Vec<(String, Rc<dyn Proc>)>,
    init_proc: Option<Rc<dyn Proc>>,
    meta: Option<Rc<dyn MetaObject>>,
}

impl DefinitionBuilder {
    pub fn parent(mut self, parent: Rc<ObjectDefinition>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn variable(mut self, name: impl Into<String>, default: Value) -> Self {
        self.variables.insert(name.into(), default);
        self
    }

    pub fn proc(mut self, name: impl Into<String>, proc: Rc<dyn Proc>) -> Self {
        self.procs.push((name.into(), proc));
        self
    }

    pub fn init_proc(mut self, proc: Rc<dyn Proc>) -> Self {
        self.init_proc = Some(proc);
        self
    }

    pub fn meta(mut self, meta: Rc<dyn MetaObject>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Merge with the parent and link every override to the proc it replaces.
    pub fn build(self) -> Rc<ObjectDefinition> {
        let parent = self.parent;

        let mut variables = parent.as_ref().map(|p| p.variables.clone()).unwrap_or_default();
        variables.extend(self.variables);

        let mut procs = parent.as_ref().map(|p| p.procs.clone()).unwrap_or_default();
        for (name, proc) in self.procs {
            if let Some(overridden) = procs.get(&name) {
                if !proc.header().set_super(Rc::clone(overridden)) {
                    debug!(proc = proc.header().name(), "super already linked");
                }
            }
            procs.insert(name, proc);
        }

        let meta = self.meta.or_else(|| parent.as_ref().and_then(|p| p.meta.clone()));

        Rc::new(ObjectDefinition {
            type_path: self.type_path,
            parent,
            variables,
            procs,
            init_proc: self.init_proc,
            meta,
        })
    }
}
