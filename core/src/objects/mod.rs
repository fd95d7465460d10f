//! # Object Model
//!
//! The process-wide object graph shared by every execution context.
//!
//! - Objects live in a generational arena. Freeing a slot bumps its
//!   generation, so a stale [`ObjectRef`] fails with `DeletedObject` instead
//!   of reaching whatever reuses the slot.
//! - Variables use a two-tier lookup: the instance's sparse overrides first,
//!   then the type's declared defaults.
//! - Reference IDs are small integers handed out monotonically for external
//!   addressing and are dropped when the object is deleted.

pub mod definition;
pub mod init;

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::error::{ProcResult, RuntimeError};
use crate::procs::Proc;
use crate::value::{ObjectRef, Value};

pub use definition::{DefinitionBuilder, MetaObject, ObjectDefinition};

#[derive(Debug)]
pub struct DreamObject {
    definition: Rc<ObjectDefinition>,
    /// Only the variables that differ from the type's defaults
    variables: HashMap<String, Value>,
}

impl DreamObject {
    pub fn definition(&self) -> &Rc<ObjectDefinition> {
        &self.definition
    }

    /// Names of instance-level overrides
    pub fn overridden_variables(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    object: Option<DreamObject>,
}

#[derive(Debug, Default)]
pub struct ObjectTable {
    types: HashMap<String, Rc<ObjectDefinition>>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    ref_ids: HashMap<ObjectRef, u32>,
    by_ref_id: HashMap<u32, ObjectRef>,
    next_ref_id: u32,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /* ===================== Types ===================== */

    pub fn register_type(&mut self, definition: Rc<ObjectDefinition>) {
        debug!(type_path = definition.type_path(), "register type");
        self.types.insert(definition.type_path().to_string(), definition);
    }

    pub fn get_type(&self, type_path: &str) -> ProcResult<&Rc<ObjectDefinition>> {
        self.types
            .get(type_path)
            .ok_or_else(|| RuntimeError::UnknownType(type_path.to_string()))
    }

    pub fn types(&self) -> impl Iterator<Item = &Rc<ObjectDefinition>> {
        self.types.values()
    }

    /* ===================== Lifetime ===================== */

    /// Allocate an uninitialised object of a registered type.
    ///
    /// Construction proper (initializer, hooks, `New`) is a proc chain run
    /// by [`init`].
    pub fn allocate(&mut self, type_path: &str) -> ProcResult<ObjectRef> {
        let definition = Rc::clone(self.get_type(type_path)?);
        Ok(self.allocate_definition(definition))
    }

    pub fn allocate_definition(&mut self, definition: Rc<ObjectDefinition>) -> ObjectRef {
        let object = DreamObject {
            definition,
            variables: HashMap::new(),
        };

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    object: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.object = Some(object);
        ObjectRef::new(index, slot.generation)
    }

    pub fn is_alive(&self, object: ObjectRef) -> bool {
        self.get(object).is_ok()
    }

    pub fn get(&self, object: ObjectRef) -> ProcResult<&DreamObject> {
        self.slots
            .get(object.index())
            .filter(|slot| slot.generation == object.generation())
            .and_then(|slot| slot.object.as_ref())
            .ok_or(RuntimeError::DeletedObject(object))
    }

    fn get_mut(&mut self, object: ObjectRef) -> ProcResult<&mut DreamObject> {
        self.slots
            .get_mut(object.index())
            .filter(|slot| slot.generation == object.generation())
            .and_then(|slot| slot.object.as_mut())
            .ok_or(RuntimeError::DeletedObject(object))
    }

    pub fn definition(&self, object: ObjectRef) -> ProcResult<Rc<ObjectDefinition>> {
        Ok(Rc::clone(&self.get(object)?.definition))
    }

    /// Run the delete hook, drop the reference ID and free the slot.
    /// Deleting an already-deleted object does nothing.
    pub fn delete(&mut self, object: ObjectRef) -> ProcResult<()> {
        let Ok(target) = self.get(object) else {
            return Ok(());
        };

        if let Some(meta) = target.definition.meta().cloned() {
            meta.on_object_deleted(self, object)?;
        }

        if let Some(id) = self.ref_ids.remove(&object) {
            self.by_ref_id.remove(&id);
        }

        let slot = &mut self.slots[object.index()];
        slot.object = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(object.index() as u32);

        debug!(%object, "deleted");
        Ok(())
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /* ===================== Variables ===================== */

    pub fn get_variable(&self, object: ObjectRef, name: &str) -> ProcResult<Value> {
        let target = self.get(object)?;
        let value = target
            .variables
            .get(name)
            .or_else(|| target.definition.variable(name))
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownVariable {
                owner: target.definition.type_path().to_string(),
                name: name.to_string(),
            })?;

        match target.definition.meta() {
            Some(meta) => meta.on_variable_get(self, object, name, value),
            None => Ok(value),
        }
    }

    /// Assign a declared variable. Only the instance override is written.
    pub fn set_variable(&mut self, object: ObjectRef, name: &str, value: Value) -> ProcResult<()> {
        let target = self.get_mut(object)?;
        let old = match target.variables.get(name).or_else(|| target.definition.variable(name)) {
            Some(old) => old.clone(),
            None => {
                return Err(RuntimeError::UnknownVariable {
                    owner: target.definition.type_path().to_string(),
                    name: name.to_string(),
                })
            }
        };

        target.variables.insert(name.to_string(), value.clone());

        if let Some(meta) = target.definition.meta().cloned() {
            meta.on_variable_set(self, object, name, &value, &old)?;
        }
        Ok(())
    }

    /* ===================== Procs ===================== */

    pub fn get_proc(&self, object: ObjectRef, name: &str) -> ProcResult<Rc<dyn Proc>> {
        let definition = &self.get(object)?.definition;
        definition.proc(name).cloned().ok_or_else(|| RuntimeError::UnknownProc {
            owner: definition.type_path().to_string(),
            name: name.to_string(),
        })
    }

    pub fn try_get_proc(&self, object: ObjectRef, name: &str) -> ProcResult<Option<Rc<dyn Proc>>> {
        Ok(self.get(object)?.definition.proc(name).cloned())
    }

    /* ===================== Reference IDs ===================== */

    /// Stable small integer for `object`, assigned on first request.
    /// IDs are never reused.
    pub fn reference_id(&mut self, object: ObjectRef) -> ProcResult<u32> {
        self.get(object)?;

        if let Some(id) = self.ref_ids.get(&object) {
            return Ok(*id);
        }

        let id = self.next_ref_id;
        self.next_ref_id += 1;
        self.ref_ids.insert(object, id);
        self.by_ref_id.insert(id, object);
        Ok(id)
    }

    pub fn from_reference_id(&self, id: u32) -> Option<ObjectRef> {
        self.by_ref_id.get(&id).copied()
    }
}
