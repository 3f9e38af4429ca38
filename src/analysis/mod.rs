//! Static analysis of a registry's declared dependencies.
pub mod topology;

pub use topology::{dependency_graph, downstream_of, evaluation_order, input_requirements, static_cycles, upstream_of};
