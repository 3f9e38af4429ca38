//! Rule evaluation engine for benefit eligibility.
//!
//! Variables are registered once into an immutable [`store::Registry`]. Each
//! request builds a [`compute::EvaluationContext`] holding a batch of people,
//! their known inputs and a pinned "current date", then asks for variables at
//! a [`period::Period`]. The resolver selects the legislatively active formula
//! version, computes dependencies recursively, memoizes every
//! `(variable, period)` pair and returns one array per variable, aligned by
//! person index.
//!
//! The CERB and Employment Insurance rules live in [`legislation`] and are
//! plain configuration on top of the engine.

pub mod analysis;
pub mod compute;
pub mod display;
pub mod error;
pub mod legislation;
pub mod parameters;
pub mod period;
pub mod store;

pub use compute::{run_scenarios, ComputationError, EvaluationContext, InputTable, Scenario, Scope, Value};
pub use error::LoadError;
pub use parameters::{ParameterTree, ParameterView, Parameters};
pub use period::{OffsetUnit, Period, PeriodUnit};
pub use store::{FormulaVersion, Registry, RegistryBuilder, ValueType, Variable, VariableId};
