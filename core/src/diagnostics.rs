//! Fault reporting
//!
//! When a context aborts, the runtime renders the fault with the context's
//! call frames and hands it to a [`DiagnosticSink`]. Where the text ends up
//! is the sink's business.

use std::backtrace::Backtrace;

use tracing::error;

use crate::error::RuntimeError;

pub trait DiagnosticSink {
    /// `message` is the fault itself, `dump` the rendered call frames and
    /// host-level fault information.
    fn report(&mut self, message: &str, dump: &str);
}

/// Default sink: emits each report as a `tracing` error event.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&mut self, message: &str, dump: &str) {
        error!("Exception occurred: {message}\n{dump}");
    }
}

/// Render the dump passed to a sink
pub fn render_dump(err: &RuntimeError, stack_trace: &str) -> String {
    let mut out = String::new();
    out.push_str("=proc stack=\n");
    out.push_str(stack_trace);
    out.push('\n');
    out.push_str("=host=\n");
    out.push_str(&format!("{err:?}\n"));
    out.push_str(&Backtrace::capture().to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_dump_sections() {
        let err = RuntimeError::Script("boom".to_string());
        let dump = render_dump(&err, "   /proc/b\n   /proc/a\n");

        let stack = dump.split("=host=").next().unwrap();
        assert!(stack.starts_with("=proc stack=\n   /proc/b\n   /proc/a\n"));
        assert!(dump.contains("Script(\"boom\")"));
    }
}
