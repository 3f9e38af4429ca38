//! The resolver: computes variables on demand for one batch of people.
use crate::compute::ledger::{conversion_error, ComputationError, InputTable, Key, Ledger, Value};
use crate::compute::selector;
use crate::display::trace::{format_trace, Origin, Trace};
use crate::parameters::{ParameterView, Parameters};
use crate::period::{Period, PeriodUnit};
use crate::store::{FormulaVersion, Registry, Variable, VariableId};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// A formula evaluation in progress, with the keys it has read so far.
struct Frame {
    key: Key,
    reads: Vec<Key>,
}

/// Per-request evaluation state.
///
/// Holds the batch's inputs, the memoization ledger and the pinned current
/// date. A context is driven through `&mut` by a single caller; parallel
/// requests each build their own (see [`crate::compute::scenario`]).
pub struct EvaluationContext<'a> {
    registry: &'a Registry,
    parameters: &'a dyn Parameters,
    batch_size: usize,
    current_date: NaiveDate,
    inputs: HashMap<Key, Value>,
    ledger: Ledger,
    // Formula evaluations in progress, outermost first. Also the cycle check.
    stack: Vec<Frame>,
    tracer: Option<Trace>,
}

impl<'a> EvaluationContext<'a> {
    /// Validates every supplied input against the registry: names must be
    /// registered, and values must carry the declared type and one element
    /// per person.
    pub fn new(
        registry: &'a Registry,
        parameters: &'a dyn Parameters,
        batch_size: usize,
        inputs: InputTable,
        current_date: NaiveDate,
    ) -> Result<Self, ComputationError> {
        let mut validated = HashMap::with_capacity(inputs.len());
        for ((name, period), value) in inputs.into_entries() {
            let id = registry.id_of(&name)?;
            check_shape(registry.get(id), batch_size, &value)?;
            validated.insert((id, period), value);
        }
        debug!(batch_size, inputs = validated.len(), %current_date, "evaluation context created");

        Ok(Self {
            registry,
            parameters,
            batch_size,
            current_date,
            inputs: validated,
            ledger: Ledger::new(),
            stack: Vec::new(),
            tracer: None,
        })
    }

    /// Records the provenance of every value computed from now on.
    pub fn with_trace(mut self) -> Self {
        self.tracer = Some(Trace::default());
        self
    }

    pub fn batch_size(&self) -> usize { self.batch_size }
    pub fn current_date(&self) -> NaiveDate { self.current_date }
    pub fn registry(&self) -> &'a Registry { self.registry }
    pub fn ledger(&self) -> &Ledger { &self.ledger }
    pub fn trace(&self) -> Option<&Trace> { self.tracer.as_ref() }

    pub fn compute(&mut self, name: &str, period: Period) -> Result<Value, ComputationError> {
        let id = self.registry.id_of(name)?;
        self.resolve(id, period)
    }

    /// Computes several requests in order against the same cache.
    pub fn compute_many(&mut self, requests: &[(&str, Period)]) -> Result<Vec<Value>, ComputationError> {
        requests.iter().map(|&(name, period)| self.compute(name, period)).collect()
    }

    /// Computes `name` at `period` and renders the audit tree below it.
    pub fn render_trace(&mut self, name: &str, period: Period) -> Result<String, ComputationError> {
        let id = self.registry.id_of(name)?;
        self.resolve(id, period)?;
        let empty = Trace::default();
        let recorded = self.tracer.as_ref().unwrap_or(&empty);
        Ok(format_trace(self.registry, &self.ledger, recorded, (id, period)))
    }

    fn resolve(&mut self, id: VariableId, period: Period) -> Result<Value, ComputationError> {
        let registry = self.registry;
        let variable = registry.get(id);
        let key = (id, period);

        if let Some(value) = self.ledger.get(&key) {
            trace!(variable = %variable.name, %period, "cache hit");
            return Ok(value.clone());
        }
        if let Some(value) = self.inputs.get(&key).cloned() {
            trace!(variable = %variable.name, %period, "input hit");
            self.store(key, value.clone(), Origin::Input, Vec::new());
            return Ok(value);
        }

        let native = native_period(variable, period)?;
        if native != period {
            let value = self.resolve(id, native)?;
            self.store(key, value.clone(), Origin::Converted { from: native }, vec![(id, native)]);
            return Ok(value);
        }

        if let Some(start) = self.stack.iter().position(|frame| frame.key == key) {
            return Err(self.cycle_error(start, key));
        }

        let date = self.selection_date(period)?;
        let version: &'a FormulaVersion = selector::explain(variable, date).map_err(|reason| {
            ComputationError::NoActiveFormula { variable: variable.name.clone(), date, reason }
        })?;
        debug!(variable = %variable.name, %period, effective_from = ?version.effective_from, "evaluating formula");

        self.stack.push(Frame { key, reads: Vec::new() });
        let parameters = ParameterView::new(self.parameters, date);
        let result = {
            let mut scope = Scope { ctx: &mut *self, variable: id, version };
            (version.body)(&mut scope, period, &parameters)
        };
        let reads = self.stack.pop().map(|frame| frame.reads).unwrap_or_default();

        let value = result?;
        check_shape(variable, self.batch_size, &value)?;
        self.store(key, value.clone(), Origin::Formula { effective_from: version.effective_from }, reads);
        Ok(value)
    }

    fn store(&mut self, key: Key, value: Value, origin: Origin, dependencies: Vec<Key>) {
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.record(key, origin, dependencies);
        }
        self.ledger.insert(key, value);
    }

    /// Eternity formulas are selected at the pinned current date; every other
    /// period at its first day.
    fn selection_date(&self, period: Period) -> Result<NaiveDate, ComputationError> {
        match period {
            Period::Eternity => Ok(self.current_date),
            _ => period.reference_date().ok_or_else(|| ComputationError::UnsupportedPeriodOperation {
                period,
                operation: "select a formula version outside the calendar".to_string(),
            }),
        }
    }

    /// The path from the evaluation at `stack[start]` back to `key` itself.
    fn cycle_error(&self, start: usize, key: Key) -> ComputationError {
        let cycle = self.stack[start..]
            .iter()
            .map(|frame| frame.key)
            .chain(std::iter::once(key))
            .map(|(id, _)| self.registry.get(id).name.clone())
            .collect();
        ComputationError::CycleDetected { cycle }
    }
}

/// The period at which `variable` is actually evaluated when `requested`.
///
/// Eternity values hold for any period, and a yearly value holds for each of
/// its days. Nothing else can be derived.
fn native_period(variable: &Variable, requested: Period) -> Result<Period, ComputationError> {
    match (variable.definition_period, requested) {
        (native, requested) if native == requested.unit() => Ok(requested),
        (PeriodUnit::Eternity, _) => Ok(Period::Eternity),
        (PeriodUnit::Year, Period::Day(date)) => Ok(Period::year(date)),
        (native, requested) => Err(conversion_error(&variable.name, native, requested)),
    }
}

fn check_shape(variable: &Variable, batch_size: usize, value: &Value) -> Result<(), ComputationError> {
    if value.value_type() == variable.value_type && value.len() == batch_size {
        return Ok(());
    }
    Err(ComputationError::TypeMismatch {
        variable: variable.name.clone(),
        expected: format!("{}[{}]", variable.value_type, batch_size),
        actual: value.describe(),
    })
}

/// What a formula body sees: dependency reads, the batch and the clock.
pub struct Scope<'s, 'a> {
    ctx: &'s mut EvaluationContext<'a>,
    variable: VariableId,
    version: &'a FormulaVersion,
}

impl<'s, 'a> Scope<'s, 'a> {
    /// Reads `name` at any period. Only the dependencies declared on the
    /// running formula version may be read.
    pub fn compute(&mut self, name: &str, period: Period) -> Result<Value, ComputationError> {
        if !self.version.depends_on(name) {
            return Err(ComputationError::UndeclaredDependency {
                variable: self.ctx.registry.get(self.variable).name.clone(),
                dependency: name.to_string(),
            });
        }
        let id = self.ctx.registry.id_of(name)?;
        let value = self.ctx.resolve(id, period)?;
        if let Some(frame) = self.ctx.stack.last_mut() {
            frame.reads.push((id, period));
        }
        Ok(value)
    }

    pub fn bools(&mut self, name: &str, period: Period) -> Result<Arc<Vec<bool>>, ComputationError> {
        match self.compute(name, period)? {
            Value::Bool(values) => Ok(values),
            other => Err(self.wrong_type(name, "bool", &other)),
        }
    }

    pub fn numbers(&mut self, name: &str, period: Period) -> Result<Arc<Vec<f64>>, ComputationError> {
        match self.compute(name, period)? {
            Value::Number(values) => Ok(values),
            other => Err(self.wrong_type(name, "number", &other)),
        }
    }

    pub fn dates(&mut self, name: &str, period: Period) -> Result<Arc<Vec<NaiveDate>>, ComputationError> {
        match self.compute(name, period)? {
            Value::Date(values) => Ok(values),
            other => Err(self.wrong_type(name, "date", &other)),
        }
    }

    pub fn batch_size(&self) -> usize { self.ctx.batch_size }

    /// The context's pinned "today".
    pub fn current_date(&self) -> NaiveDate { self.ctx.current_date }

    /// The variable whose formula is running.
    pub fn variable(&self) -> &'a Variable { self.ctx.registry.get(self.variable) }

    /// Parameters at a date other than the one the formula was selected for.
    pub fn parameters_at(&self, date: NaiveDate) -> ParameterView<'a> {
        ParameterView::new(self.ctx.parameters, date)
    }

    fn wrong_type(&self, name: &str, expected: &str, actual: &Value) -> ComputationError {
        ComputationError::TypeMismatch {
            variable: name.to_string(),
            expected: expected.to_string(),
            actual: actual.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::selector::Inactive;
    use crate::parameters::ParameterTree;
    use crate::store::{RegistryBuilder, ValueType};
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn build(variables: Vec<Variable>) -> Registry {
        let mut builder = RegistryBuilder::new();
        for variable in variables {
            builder.register(variable).unwrap();
        }
        builder.finish().unwrap()
    }

    fn counting(name: &str, unit: PeriodUnit, counter: Arc<AtomicUsize>) -> Variable {
        let version = FormulaVersion::always(&[], move |scope, _, _| {
            let calls = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Value::from(vec![calls as f64; scope.batch_size()]))
        });
        Variable::new(name, ValueType::Number, unit).formula(version)
    }

    fn context<'a>(registry: &'a Registry, parameters: &'a ParameterTree, inputs: InputTable) -> EvaluationContext<'a> {
        EvaluationContext::new(registry, parameters, 2, inputs, d(2020, 6, 1)).unwrap()
    }

    #[test]
    fn test_formula_runs_once_per_key() {
        init_tracing();
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = build(vec![counting("counted", PeriodUnit::Day, counter.clone())]);
        let parameters = ParameterTree::new();
        let mut ctx = context(&registry, &parameters, InputTable::new());

        let day = Period::Day(d(2020, 4, 1));
        let first = ctx.compute("counted", day).unwrap();
        let second = ctx.compute("counted", day).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);

        ctx.compute("counted", Period::Day(d(2020, 4, 2))).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_eternity_value_serves_any_period() {
        let registry = build(vec![Variable::new("resident", ValueType::Bool, PeriodUnit::Eternity)]);
        let parameters = ParameterTree::new();
        let inputs = InputTable::new().with("resident", Period::Eternity, vec![true, false]);
        let mut ctx = context(&registry, &parameters, inputs);

        let on_day = ctx.compute("resident", Period::Day(d(2020, 4, 1))).unwrap();
        let in_year = ctx.compute("resident", Period::Year(2021)).unwrap();
        assert_eq!(on_day, Value::from(vec![true, false]));
        assert_eq!(in_year, on_day);
        assert_eq!(ctx.ledger().len(), 3);
    }

    #[test]
    fn test_day_request_reads_enclosing_year() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = build(vec![counting("annual", PeriodUnit::Year, counter.clone())]);
        let parameters = ParameterTree::new();
        let mut ctx = context(&registry, &parameters, InputTable::new());

        ctx.compute("annual", Period::Day(d(2020, 2, 1))).unwrap();
        ctx.compute("annual", Period::Day(d(2020, 11, 30))).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(ctx.ledger().contains(&(registry.id_of("annual").unwrap(), Period::Year(2020))));

        ctx.compute("annual", Period::Day(d(2021, 1, 1))).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    #[case(PeriodUnit::Day, Period::Year(2020))]
    #[case(PeriodUnit::Day, Period::Eternity)]
    #[case(PeriodUnit::Year, Period::Eternity)]
    fn test_unsupported_period_view(#[case] native: PeriodUnit, #[case] requested: Period) {
        let registry = build(vec![counting("x", native, Arc::new(AtomicUsize::new(0)))]);
        let parameters = ParameterTree::new();
        let mut ctx = context(&registry, &parameters, InputTable::new());

        let err = ctx.compute("x", requested).unwrap_err();
        assert_eq!(err, ComputationError::PeriodConversion { variable: "x".into(), native, requested });
    }

    #[test]
    fn test_mutual_references_are_a_cycle() {
        let a = FormulaVersion::always(&["b"], |scope, period, _| scope.compute("b", period));
        let b = FormulaVersion::always(&["a"], |scope, period, _| scope.compute("a", period));
        let registry = build(vec![
            Variable::new("a", ValueType::Bool, PeriodUnit::Day).formula(a),
            Variable::new("b", ValueType::Bool, PeriodUnit::Day).formula(b),
        ]);
        let parameters = ParameterTree::new();
        let mut ctx = context(&registry, &parameters, InputTable::new());

        let err = ctx.compute("a", Period::Day(d(2020, 4, 1))).unwrap_err();
        assert_eq!(err, ComputationError::CycleDetected { cycle: vec!["a".into(), "b".into(), "a".into()] });

        // Nothing stays in progress after a failure.
        let again = ctx.compute("b", Period::Day(d(2020, 4, 1))).unwrap_err();
        assert_eq!(again, ComputationError::CycleDetected { cycle: vec!["b".into(), "a".into(), "b".into()] });
    }

    #[test]
    fn test_self_reference_at_earlier_period_is_not_a_cycle() {
        let running = FormulaVersion::since(d(2020, 1, 1), &["running"], |scope, period, _| {
            let previous = match period.offset(-1, crate::period::OffsetUnit::Year)? {
                Period::Year(y) if y < 2020 => vec![0.0; scope.batch_size()],
                earlier => scope.numbers("running", earlier)?.to_vec(),
            };
            Ok(Value::from(previous.iter().map(|v| v + 1.0).collect::<Vec<_>>()))
        });
        let registry = build(vec![Variable::new("running", ValueType::Number, PeriodUnit::Year).formula(running)]);
        let parameters = ParameterTree::new();
        let mut ctx = context(&registry, &parameters, InputTable::new());

        assert_eq!(ctx.compute("running", Period::Year(2022)).unwrap(), Value::from(vec![3.0, 3.0]));
    }

    #[test]
    fn test_selection_follows_legislative_dates() {
        let relief = FormulaVersion::since(d(2020, 3, 15), &[], |scope, _, _| {
            Ok(Value::from(vec![true; scope.batch_size()]))
        });
        let registry = build(vec![Variable::new("relief", ValueType::Bool, PeriodUnit::Day)
            .formula(relief)
            .ends_on(d(2020, 10, 31))]);
        let parameters = ParameterTree::new();
        let mut ctx = context(&registry, &parameters, InputTable::new());

        let before = ctx.compute("relief", Period::Day(d(2020, 1, 1))).unwrap_err();
        assert!(matches!(before, ComputationError::NoActiveFormula { reason: Inactive::NotYetInForce, .. }));
        assert!(ctx.compute("relief", Period::Day(d(2020, 6, 1))).is_ok());
        let after = ctx.compute("relief", Period::Day(d(2020, 11, 1))).unwrap_err();
        assert_eq!(
            after,
            ComputationError::NoActiveFormula {
                variable: "relief".into(),
                date: d(2020, 11, 1),
                reason: Inactive::Expired { ended: d(2020, 10, 31) },
            }
        );
    }

    #[test]
    fn test_eternity_variable_selects_at_current_date() {
        let pilot =
            FormulaVersion::since(d(2021, 1, 1), &[], |scope, _, _| Ok(Value::from(vec![1.0; scope.batch_size()])));
        let registry = build(vec![Variable::new("pilot", ValueType::Number, PeriodUnit::Eternity).formula(pilot)]);
        let parameters = ParameterTree::new();

        let mut early = context(&registry, &parameters, InputTable::new());
        assert!(matches!(early.compute("pilot", Period::Eternity), Err(ComputationError::NoActiveFormula { .. })));

        let mut late = EvaluationContext::new(&registry, &parameters, 2, InputTable::new(), d(2021, 6, 1)).unwrap();
        assert_eq!(late.compute("pilot", Period::Eternity).unwrap(), Value::from(vec![1.0, 1.0]));
    }

    #[rstest]
    #[case::far_future(300_000)]
    #[case::far_past(-300_000)]
    fn test_year_outside_calendar_is_rejected(#[case] year: i32) {
        let levy =
            FormulaVersion::since(d(2021, 1, 1), &[], |scope, _, _| Ok(Value::from(vec![1.0; scope.batch_size()])));
        let registry = build(vec![Variable::new("levy", ValueType::Number, PeriodUnit::Year).formula(levy)]);
        let parameters = ParameterTree::new();
        let mut ctx = EvaluationContext::new(&registry, &parameters, 2, InputTable::new(), d(2021, 6, 1)).unwrap();

        let err = ctx.compute("levy", Period::Year(year)).unwrap_err();
        assert!(
            matches!(err, ComputationError::UnsupportedPeriodOperation { period: Period::Year(y), .. } if y == year),
            "{err}"
        );
        assert!(ctx.ledger().is_empty());
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let registry = build(vec![Variable::new("resident", ValueType::Bool, PeriodUnit::Eternity)]);
        let parameters = ParameterTree::new();
        let mut ctx = context(&registry, &parameters, InputTable::new());

        let err = ctx.compute("resident", Period::Day(d(2020, 4, 1))).unwrap_err();
        assert!(matches!(
            err,
            ComputationError::NoActiveFormula { reason: Inactive::Input, ref variable, .. } if variable == "resident"
        ));
    }

    #[test]
    fn test_input_at_exact_key_overrides_formula() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = build(vec![counting("age", PeriodUnit::Day, counter.clone())]);
        let parameters = ParameterTree::new();
        let inputs = InputTable::new().with("age", Period::Day(d(2020, 4, 1)), vec![16.0, 40.0]);
        let mut ctx = context(&registry, &parameters, inputs);

        assert_eq!(ctx.compute("age", Period::Day(d(2020, 4, 1))).unwrap(), Value::from(vec![16.0, 40.0]));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        ctx.compute("age", Period::Day(d(2020, 4, 2))).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[case::wrong_length(Value::from(vec![true]), "bool[1]")]
    #[case::wrong_type(Value::from(vec![1.0, 0.0]), "number[2]")]
    fn test_formula_result_must_match_declaration(#[case] result: Value, #[case] actual: &str) {
        let broken = FormulaVersion::always(&[], move |_, _, _| Ok(result.clone()));
        let registry = build(vec![Variable::new("broken", ValueType::Bool, PeriodUnit::Day).formula(broken)]);
        let parameters = ParameterTree::new();
        let mut ctx = context(&registry, &parameters, InputTable::new());

        let err = ctx.compute("broken", Period::Day(d(2020, 4, 1))).unwrap_err();
        assert_eq!(
            err,
            ComputationError::TypeMismatch {
                variable: "broken".into(),
                expected: "bool[2]".into(),
                actual: actual.into(),
            }
        );
        assert!(ctx.ledger().is_empty());
    }

    #[test]
    fn test_undeclared_dependency_is_rejected() {
        let sneaky = FormulaVersion::always(&[], |scope, period, _| scope.compute("resident", period));
        let registry = build(vec![
            Variable::new("resident", ValueType::Bool, PeriodUnit::Eternity),
            Variable::new("sneaky", ValueType::Bool, PeriodUnit::Eternity).formula(sneaky),
        ]);
        let parameters = ParameterTree::new();
        let inputs = InputTable::new().with("resident", Period::Eternity, vec![true, true]);
        let mut ctx = context(&registry, &parameters, inputs);

        let err = ctx.compute("sneaky", Period::Eternity).unwrap_err();
        assert_eq!(
            err,
            ComputationError::UndeclaredDependency { variable: "sneaky".into(), dependency: "resident".into() }
        );
    }

    #[test]
    fn test_typed_read_of_wrong_type() {
        let reader = FormulaVersion::always(&["hours"], |scope, period, _| {
            scope.bools("hours", period)?;
            unreachable!()
        });
        let registry = build(vec![
            Variable::new("hours", ValueType::Number, PeriodUnit::Eternity),
            Variable::new("reader", ValueType::Bool, PeriodUnit::Eternity).formula(reader),
        ]);
        let parameters = ParameterTree::new();
        let inputs = InputTable::new().with("hours", Period::Eternity, vec![1.0, 2.0]);
        let mut ctx = context(&registry, &parameters, inputs);

        let err = ctx.compute("reader", Period::Eternity).unwrap_err();
        assert_eq!(
            err,
            ComputationError::TypeMismatch {
                variable: "hours".into(),
                expected: "bool".into(),
                actual: "number[2]".into(),
            }
        );
    }

    #[rstest]
    #[case::unknown_name(InputTable::new().with("ghost", Period::Eternity, vec![true, true]))]
    #[case::wrong_type(InputTable::new().with("resident", Period::Eternity, vec![1.0, 1.0]))]
    #[case::wrong_length(InputTable::new().with("resident", Period::Eternity, vec![true]))]
    fn test_inputs_are_validated(#[case] inputs: InputTable) {
        let registry = build(vec![Variable::new("resident", ValueType::Bool, PeriodUnit::Eternity)]);
        let parameters = ParameterTree::new();
        let result = EvaluationContext::new(&registry, &parameters, 2, inputs, d(2020, 6, 1));
        assert!(matches!(
            result,
            Err(ComputationError::UnknownVariable { .. }) | Err(ComputationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_formula_reads_parameters_at_selection_date() {
        let capped = FormulaVersion::always(&[], |scope, _, parameters| {
            Ok(Value::from(vec![parameters.get("cap")?; scope.batch_size()]))
        });
        let registry = build(vec![Variable::new("capped", ValueType::Number, PeriodUnit::Day).formula(capped)]);
        let parameters = ParameterTree::new()
            .with("cap", d(2020, 1, 1), 573.0)
            .and_then(|tree| tree.with("cap", d(2021, 1, 1), 595.0))
            .unwrap();
        let mut ctx = context(&registry, &parameters, InputTable::new());

        let values = ctx
            .compute_many(&[("capped", Period::Day(d(2020, 7, 1))), ("capped", Period::Day(d(2021, 7, 1)))])
            .unwrap();
        assert_eq!(values, vec![Value::from(vec![573.0, 573.0]), Value::from(vec![595.0, 595.0])]);

        let missing = ctx.compute("capped", Period::Day(d(2019, 7, 1))).unwrap_err();
        assert_eq!(missing, ComputationError::MissingParameter { path: "cap".into(), date: d(2019, 7, 1) });
    }
}
