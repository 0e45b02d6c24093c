//! Per-compilation diagnostics sink.
//!
//! The assembler reports through an explicit sink owned by the caller;
//! nothing in the pipeline depends on process-wide logger state.

use std::fmt;
use std::sync::Mutex;

use crate::graph::NodeId;

/// Pipeline stage a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Externals,
    Lower,
    Validate,
    Encode,
}

/// Single diagnostic message tied to an optional node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub node: Option<NodeId>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, node: Option<NodeId>, message: impl Into<String>) -> Self {
        Self {
            stage,
            node,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            Some(node) => write!(f, "[{:?}] node {}: {}", self.stage, node.0, self.message),
            None => write!(f, "[{:?}] {}", self.stage, self.message),
        }
    }
}

/// Receiver for compilation diagnostics. Implementations must be usable
/// behind a shared reference; use interior mutability to accumulate.
pub trait DiagnosticsSink {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn emit(&self, _diagnostic: Diagnostic) {}
}

/// Sink that records diagnostics in memory, mainly for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().expect("diagnostics sink poisoned").clone()
    }
}

impl DiagnosticsSink for MemorySink {
    fn emit(&self, diagnostic: Diagnostic) {
        self.entries
            .lock()
            .expect("diagnostics sink poisoned")
            .push(diagnostic);
    }
}
