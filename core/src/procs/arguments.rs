//! Proc invocation arguments

use std::collections::HashMap;

use crate::error::{ProcResult, RuntimeError};
use crate::value::Value;

use super::ProcHeader;

/// Positional values plus values passed by parameter name.
///
/// Immutable once built; an activation keeps its arguments for its whole
/// lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    positional: Vec<Value>,
    named: HashMap<String, Value>,
}

impl Arguments {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: HashMap::new(),
        }
    }

    pub fn with_named(positional: Vec<Value>, named: HashMap<String, Value>) -> Self {
        Self { positional, named }
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn named(&self) -> &HashMap<String, Value> {
        &self.named
    }

    /// Positional argument `index`, or null when not passed
    pub fn get(&self, index: usize) -> Value {
        self.positional.get(index).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind against formal parameters.
    ///
    /// Positional values fill parameters in order; extra positional values
    /// are kept after the declared ones. Named values fill the parameter of
    /// that name. Every bound value must be accepted by the parameter's
    /// declared kinds.
    pub(crate) fn bind(&self, header: &ProcHeader) -> ProcResult<Vec<Value>> {
        let names = header.argument_names();
        let mut bound = vec![Value::Null; names.len().max(self.positional.len())];
        bound[..self.positional.len()].clone_from_slice(&self.positional);

        for (name, value) in &self.named {
            let Some(index) = names.iter().position(|n| n == name) else {
                return Err(RuntimeError::UnknownArgument {
                    proc_name: header.name().to_string(),
                    name: name.clone(),
                });
            };
            bound[index] = value.clone();
        }

        for (index, (kinds, value)) in header.argument_types().iter().zip(&bound).enumerate() {
            if !kinds.accepts(value) {
                return Err(RuntimeError::TypeMismatch(format!(
                    "argument '{}' of '{}' does not accept {}",
                    names.get(index).map(String::as_str).unwrap_or("?"),
                    header.name(),
                    value.kind_name()
                )));
            }
        }

        Ok(bound)
    }
}

impl From<Vec<Value>> for Arguments {
    fn from(positional: Vec<Value>) -> Self {
        Self::new(positional)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{KindSet, ValueKind};
    use maplit::hashmap;

    fn header() -> ProcHeader {
        ProcHeader::new(
            "/proc/move",
            vec!["x".to_string(), "y".to_string()],
            vec![KindSet::of(&[ValueKind::Num]), KindSet::ANY],
        )
    }

    #[test]
    fn test_bind_positional_and_named() {
        let args = Arguments::with_named(vec![Value::Int(1)], hashmap! { "y".to_string() => Value::text("up") });
        let bound = args.bind(&header()).unwrap();
        assert_eq!(bound, vec![Value::Int(1), Value::text("up")]);
    }

    #[test]
    fn test_bind_keeps_extra_positional() {
        let args = Arguments::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(args.bind(&header()).unwrap().len(), 3);
    }

    #[test]
    fn test_bind_unknown_name() {
        let args = Arguments::with_named(vec![], hashmap! { "z".to_string() => Value::Int(0) });
        let err = args.bind(&header()).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::UnknownArgument {
                proc_name: "/proc/move".to_string(),
                name: "z".to_string()
            }
        );
    }

    #[test]
    fn test_bind_rejects_wrong_kind() {
        let args = Arguments::new(vec![Value::text("left")]);
        assert!(matches!(args.bind(&header()), Err(RuntimeError::TypeMismatch(_))));
    }
}
