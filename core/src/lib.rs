pub mod builtins;
pub mod cli;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod loader;
pub mod objects;
pub mod procs;
pub mod runtime;
pub mod scheduler;
pub mod value;

#[cfg(test)]
mod tests;

// Re-export main types
pub use config::Config;
pub use context::{ContextId, ContextState, ExecutionContext};
pub use error::{ProcResult, RuntimeError};
pub use procs::{Arguments, Proc, ProcState, ProcStatus, Wait};
pub use runtime::Runtime;
pub use scheduler::Scheduler;
pub use value::{ObjectRef, Value};
