//! Script-level runtime faults
//!
//! Every fault raised while resuming an activation is one of these. They are
//! caught at the execution context boundary and never reach the host as a
//! value; scheduler invariant violations panic instead.

use thiserror::Error;

use crate::value::ObjectRef;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("undefined variable '{name}' on {owner}")]
    UnknownVariable { owner: String, name: String },

    #[error("undefined proc '{name}' on {owner}")]
    UnknownProc { owner: String, name: String },

    #[error("undefined type '{0}'")]
    UnknownType(String),

    #[error("proc '{proc_name}' has no argument named '{name}'")]
    UnknownArgument { proc_name: String, name: String },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("stack overflow: call depth exceeded {depth}")]
    StackOverflow { depth: usize },

    #[error("reference to deleted object {0}")]
    DeletedObject(ObjectRef),

    #[error("expected an object, got {0}")]
    NotAnObject(&'static str),

    #[error("malformed proc code: {0}")]
    MalformedCode(String),

    #[error("meta object hook failed: {0}")]
    Hook(String),

    #[error("native proc '{proc_name}' failed: {message}")]
    Native { proc_name: String, message: String },

    /// Raised explicitly by script code
    #[error("{0}")]
    Script(String),
}

pub type ProcResult<T> = Result<T, RuntimeError>;
