//! Canadian COVID-19 income-support rules, registered on top of the engine.
//!
//! Two benefits are modelled: the Canada Emergency Response Benefit
//! ([`cerb`]) and regular or sickness Employment Insurance
//! ([`employment_insurance`]). Legislative constants come from
//! `parameters/canada.json`, embedded at build time.
use crate::compute::ComputationError;
use crate::error::LoadError;
use crate::parameters::ParameterTree;
use crate::store::{Registry, RegistryBuilder};

pub mod cerb;
pub mod employment_insurance;

const CANADA_PARAMETERS: &str = include_str!("../../parameters/canada.json");

/// Adds every benefit variable to `builder`.
pub fn register(builder: &mut RegistryBuilder) -> Result<(), ComputationError> {
    cerb::register(builder)?;
    employment_insurance::register(builder)
}

pub fn build_registry() -> Result<Registry, ComputationError> {
    let mut builder = RegistryBuilder::new();
    register(&mut builder)?;
    builder.finish()
}

/// The parameter tree shipped with the crate.
pub fn default_parameters() -> Result<ParameterTree, LoadError> {
    ParameterTree::from_json_str(CANADA_PARAMETERS)
}
