//! ledger.rs
//! Typed per-person columns, the memoization cache and caller-supplied inputs.

use crate::error::LoadError;
use crate::period::{Period, PeriodUnit};
use crate::store::{Registry, ValueType, VariableId};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

pub use self::error::ComputationError;
mod error {
    use crate::compute::selector::Inactive;
    use crate::period::{Period, PeriodUnit};
    use chrono::NaiveDate;
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum ComputationError {
        #[error("Variable '{name}' is already registered")]
        DuplicateVariable { name: String },
        #[error("Formula versions of '{variable}' are out of order: {reason}")]
        InvalidFormulaOrdering { variable: String, reason: String },
        #[error("Unknown variable '{name}'")]
        UnknownVariable { name: String },
        #[error("Cycle detected: {}", cycle.join(" -> "))]
        CycleDetected { cycle: Vec<String> },
        #[error("No active formula for '{variable}' on {date}: {reason}")]
        NoActiveFormula { variable: String, date: NaiveDate, reason: Inactive },
        #[error("Cannot derive '{variable}' at {requested} from its {native:?} definition period")]
        PeriodConversion { variable: String, native: PeriodUnit, requested: Period },
        #[error("Type mismatch for '{variable}': expected {expected}, got {actual}")]
        TypeMismatch { variable: String, expected: String, actual: String },
        #[error("Unsupported operation on period {period}: {operation}")]
        UnsupportedPeriodOperation { period: Period, operation: String },
        #[error("Formula of '{variable}' reads undeclared dependency '{dependency}'")]
        UndeclaredDependency { variable: String, dependency: String },
        #[error("Shape mismatch: {msg}")]
        ShapeMismatch { msg: String },
        #[error("Missing parameter '{path}' on {date}")]
        MissingParameter { path: String, date: NaiveDate },
    }
}

/// One column of values, aligned by person index. Clones share storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(Arc<Vec<bool>>),
    Number(Arc<Vec<f64>>),
    Date(Arc<Vec<NaiveDate>>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Number(_) => ValueType::Number,
            Value::Date(_) => ValueType::Date,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Value::Bool(v) => v.len(),
            Value::Number(v) => v.len(),
            Value::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn as_bools(&self) -> Option<&[bool]> {
        match self { Value::Bool(v) => Some(v.as_slice()), _ => None }
    }

    pub fn as_numbers(&self) -> Option<&[f64]> {
        match self { Value::Number(v) => Some(v.as_slice()), _ => None }
    }

    pub fn as_dates(&self) -> Option<&[NaiveDate]> {
        match self { Value::Date(v) => Some(v.as_slice()), _ => None }
    }

    /// Type and length, e.g. `bool[3]`.
    pub fn describe(&self) -> String {
        format!("{}[{}]", self.value_type(), self.len())
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(v) => serde_json::json!(v.as_slice()),
            Value::Number(v) => serde_json::json!(v.as_slice()),
            Value::Date(v) => serde_json::json!(v.iter().map(|d| d.to_string()).collect::<Vec<_>>()),
        }
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self { Value::Bool(Arc::new(v)) }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self { Value::Number(Arc::new(v)) }
}

impl From<Vec<NaiveDate>> for Value {
    fn from(v: Vec<NaiveDate>) -> Self { Value::Date(Arc::new(v)) }
}

pub type Key = (VariableId, Period);

/// Memoized results of one evaluation context.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    values: HashMap<Key, Value>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    #[inline(always)]
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: Key, value: Value) {
        self.values.insert(key, value);
    }

    pub fn contains(&self, key: &Key) -> bool { self.values.contains_key(key) }
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }
}

/// Known values supplied by the caller, keyed by variable name and period.
#[derive(Debug, Clone, Default)]
pub struct InputTable {
    entries: HashMap<(String, Period), Value>,
}

impl InputTable {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, name: impl Into<String>, period: Period, value: impl Into<Value>) {
        self.entries.insert((name.into(), period), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, period: Period, value: impl Into<Value>) -> Self {
        self.insert(name, period, value);
        self
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub(crate) fn into_entries(self) -> impl Iterator<Item = ((String, Period), Value)> {
        self.entries.into_iter()
    }

    /// Parses a situation document:
    /// `{"variable": {"ETERNITY": [true, false], "2020-04-01": [...]}}`.
    /// Element types follow each variable's declared value type; dates are
    /// written `YYYY-MM-DD`.
    pub fn from_json(registry: &Registry, json: &str) -> Result<Self, LoadError> {
        let document: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut table = InputTable::new();

        for (name, by_period) in document {
            let value_type = registry.lookup(&name)?.value_type;
            let by_period = by_period
                .as_object()
                .ok_or_else(|| LoadError::Invalid(format!("'{}' must map periods to arrays", name)))?;

            for (period_text, column) in by_period {
                let period: Period = period_text
                    .parse()
                    .map_err(|e: crate::period::InvalidPeriod| LoadError::Invalid(e.to_string()))?;
                let items = column
                    .as_array()
                    .ok_or_else(|| LoadError::Invalid(format!("'{}' at {} must be an array", name, period)))?;
                let value = parse_column(value_type, items).ok_or_else(|| {
                    LoadError::Invalid(format!("'{}' at {} is not an array of {}", name, period, value_type))
                })?;
                table.insert(name.clone(), period, value);
            }
        }
        Ok(table)
    }
}

fn parse_column(value_type: ValueType, items: &[serde_json::Value]) -> Option<Value> {
    Some(match value_type {
        ValueType::Bool => Value::from(items.iter().map(|i| i.as_bool()).collect::<Option<Vec<_>>>()?),
        ValueType::Number => Value::from(items.iter().map(|i| i.as_f64()).collect::<Option<Vec<_>>>()?),
        ValueType::Date => Value::from(
            items
                .iter()
                .map(|i| i.as_str().and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
                .collect::<Option<Vec<_>>>()?,
        ),
    })
}

/// Used by the resolver to reject a period view it cannot derive.
pub(crate) fn conversion_error(name: &str, native: PeriodUnit, requested: Period) -> ComputationError {
    ComputationError::PeriodConversion { variable: name.to_string(), native, requested }
}
