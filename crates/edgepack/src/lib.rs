//! Lowers traced edge-dialect tensor graphs into a delegate backend IR and
//! packs them into an immutable binary artifact for the runtime.

pub mod diagnostics;
pub mod graph;
pub mod lower;
pub mod schema;
pub mod serialize;

pub use diagnostics::{Diagnostic, DiagnosticsSink, MemorySink, NullSink};
pub use graph::{EdgeGraph, GraphBuilder, TensorLiteral, TensorSpec};
pub use lower::{
    assemble, preprocess, CompileSpec, LowerError, PreprocessResult, DEFAULT_DEBUG_HANDLE,
};
pub use schema::{BackendGraph, DType};
