//! Evaluates variables: formula selection, the resolver and its cache, and
//! the vectorized algebra formulas are written in.
pub mod engine;
pub mod kernel;
pub mod ledger;
pub mod scenario;
pub mod selector;

pub use engine::{EvaluationContext, Scope};
pub use ledger::{ComputationError, InputTable, Key, Ledger, Value};
pub use scenario::{run_scenarios, Scenario};
pub use selector::Inactive;
