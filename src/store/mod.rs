//! Variable definitions and the registry that holds them.
pub mod registry;
pub mod types;

pub use registry::{Registry, RegistryBuilder};
pub use types::{Entity, FormulaFn, FormulaVersion, ValueType, Variable, VariableId};
