//! Human-readable and JSON views of how values were computed.
pub mod trace;

pub use trace::{format_trace, trace_to_json, Origin, Trace, TraceEntry};
