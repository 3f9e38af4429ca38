//! Parallel evaluation of independent requests.
use crate::compute::engine::EvaluationContext;
use crate::compute::ledger::{ComputationError, InputTable, Value};
use crate::parameters::Parameters;
use crate::period::Period;
use crate::store::Registry;
use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::debug;

/// One request: a batch of people, what is known about them and "today".
#[derive(Debug, Clone)]
pub struct Scenario {
    pub batch_size: usize,
    pub current_date: NaiveDate,
    pub inputs: InputTable,
}

impl Scenario {
    pub fn new(batch_size: usize, current_date: NaiveDate, inputs: InputTable) -> Self {
        Self { batch_size, current_date, inputs }
    }

    /// Builds a context for this scenario and computes `requests` in order.
    pub fn run(
        self,
        registry: &Registry,
        parameters: &dyn Parameters,
        requests: &[(&str, Period)],
    ) -> Result<Vec<Value>, ComputationError> {
        let mut ctx = EvaluationContext::new(registry, parameters, self.batch_size, self.inputs, self.current_date)?;
        ctx.compute_many(requests)
    }
}

/// Runs every scenario on the rayon pool, one evaluation context each.
///
/// The registry and parameters are shared read-only; results come back in
/// scenario order and a failing scenario does not affect the others.
pub fn run_scenarios(
    registry: &Registry,
    parameters: &dyn Parameters,
    scenarios: Vec<Scenario>,
    requests: &[(&str, Period)],
) -> Vec<Result<Vec<Value>, ComputationError>> {
    debug!(scenarios = scenarios.len(), requests = requests.len(), "running scenarios");
    scenarios
        .into_par_iter()
        .map(|scenario| scenario.run(registry, parameters, requests))
        .collect()
}
