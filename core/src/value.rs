//! Runtime value types

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{ProcResult, RuntimeError};
use crate::procs::Proc;

/* ===================== Object Handles ===================== */

/// Non-owning handle into the object table.
///
/// The generation is bumped whenever a slot is freed, so a handle to a
/// deleted object never silently aliases a newer object in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    index: u32,
    generation: u32,
}

impl ObjectRef {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:x}:{}]", self.index, self.generation)
    }
}

/* ===================== Values ===================== */

/// Runtime value
///
/// Cloning is cheap: text is shared, objects and procs are references.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(Rc<str>),
    Object(ObjectRef),
    Proc(Rc<dyn Proc>),
}

impl Value {
    pub fn text(s: impl AsRef<str>) -> Self {
        Value::Text(Rc::from(s.as_ref()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, zero and the empty string are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Object(_) | Value::Proc(_) => true,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Object(_) => "object",
            Value::Proc(_) => "proc",
        }
    }

    pub fn as_object(&self) -> ProcResult<ObjectRef> {
        match self {
            Value::Object(obj) => Ok(*obj),
            other => Err(RuntimeError::NotAnObject(other.kind_name())),
        }
    }

    pub fn as_int(&self) -> ProcResult<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(f) => Ok(*f as i64),
            Value::Null => Ok(0),
            other => Err(RuntimeError::TypeMismatch(format!(
                "expected a number, got {}",
                other.kind_name()
            ))),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Null => Some(0.0),
            _ => None,
        }
    }

    /// Numeric addition with int/float promotion, or text concatenation.
    pub fn add(&self, rhs: &Value) -> ProcResult<Value> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            (Value::Text(a), Value::Text(b)) => Ok(Value::text(format!("{a}{b}"))),
            (Value::Text(a), Value::Null) => Ok(Value::Text(Rc::clone(a))),
            _ => self.float_op(rhs, "+", |a, b| a + b),
        }
    }

    pub fn sub(&self, rhs: &Value) -> ProcResult<Value> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
            _ => self.float_op(rhs, "-", |a, b| a - b),
        }
    }

    pub fn mul(&self, rhs: &Value) -> ProcResult<Value> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
            _ => self.float_op(rhs, "*", |a, b| a * b),
        }
    }

    fn float_op(&self, rhs: &Value, op: &str, f: impl Fn(f64, f64) -> f64) -> ProcResult<Value> {
        match (self, rhs) {
            (Value::Null, Value::Null) => Ok(Value::Int(0)),
            (Value::Int(_) | Value::Null, Value::Int(_) | Value::Null) => {
                Ok(Value::Int(f(self.as_f64().unwrap_or(0.0), rhs.as_f64().unwrap_or(0.0)) as i64))
            }
            _ => match (self.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => Ok(Value::Float(f(a, b))),
                _ => Err(RuntimeError::TypeMismatch(format!(
                    "invalid operation: {} {op} {}",
                    self.kind_name(),
                    rhs.kind_name()
                ))),
            },
        }
    }

    pub fn less_than(&self, rhs: &Value) -> ProcResult<bool> {
        match (self, rhs) {
            (Value::Text(a), Value::Text(b)) => Ok(a < b),
            _ => match (self.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => Ok(a < b),
                _ => Err(RuntimeError::TypeMismatch(format!(
                    "cannot compare {} with {}",
                    self.kind_name(),
                    rhs.kind_name()
                ))),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Proc(a), Value::Proc(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Object(obj) => write!(f, "{obj}"),
            Value::Proc(proc) => write!(f, "{}", proc.header().name()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::text(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

/* ===================== Constants ===================== */

/// Data-only value as it appears in compiled code and world files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Constant {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&Constant> for Value {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Null => Value::Null,
            Constant::Int(i) => Value::Int(*i),
            Constant::Float(f) => Value::Float(*f),
            Constant::Text(s) => Value::text(s),
        }
    }
}

/* ===================== Declared Kinds ===================== */

/// Value kind a parameter may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Num,
    Text,
    Obj,
    Proc,
}

impl ValueKind {
    fn bit(self) -> u8 {
        match self {
            ValueKind::Num => 1 << 0,
            ValueKind::Text => 1 << 1,
            ValueKind::Obj => 1 << 2,
            ValueKind::Proc => 1 << 3,
        }
    }
}

/// Set of kinds accepted by one parameter. The empty set accepts anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KindSet(u8);

impl KindSet {
    pub const ANY: KindSet = KindSet(0);

    pub fn of(kinds: &[ValueKind]) -> Self {
        KindSet(kinds.iter().fold(0, |acc, k| acc | k.bit()))
    }

    /// Null is accepted by every parameter.
    pub fn accepts(self, value: &Value) -> bool {
        let bit = match value {
            Value::Null => return true,
            Value::Int(_) | Value::Float(_) => ValueKind::Num.bit(),
            Value::Text(_) => ValueKind::Text.bit(),
            Value::Object(_) => ValueKind::Obj.bit(),
            Value::Proc(_) => ValueKind::Proc.bit(),
        };
        self.0 == 0 || self.0 & bit != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::text("").is_truthy());
        assert!(Value::Float(0.5).is_truthy());
        assert!(Value::Object(ObjectRef::new(0, 0)).is_truthy());
    }

    #[test]
    fn test_arithmetic_promotion() {
        assert_eq!(Value::Int(2).add(&Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(Value::Int(2).add(&Value::Float(0.5)).unwrap(), Value::Float(2.5));
        assert_eq!(Value::Null.add(&Value::Int(1)).unwrap(), Value::Int(1));
        assert_eq!(
            Value::text("ab").add(&Value::text("cd")).unwrap(),
            Value::text("abcd")
        );

        let err = Value::text("a").sub(&Value::Int(1)).unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch(_)));
    }

    #[test]
    fn test_kind_set_accepts_null() {
        let nums = KindSet::of(&[ValueKind::Num]);
        assert!(nums.accepts(&Value::Null));
        assert!(nums.accepts(&Value::Int(4)));
        assert!(!nums.accepts(&Value::text("x")));
        assert!(KindSet::ANY.accepts(&Value::text("x")));
    }
}
