use crate::compute::{ComputationError, Scope, Value};
use crate::parameters::ParameterView;
use crate::period::{Period, PeriodUnit};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
/// Dense handle issued by [`crate::store::RegistryBuilder::register`].
pub struct VariableId(pub(crate) u32);

impl VariableId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub(crate) fn new(idx: usize) -> Self { Self(idx as u32) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Bool,
    Number,
    Date,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Bool => "bool",
            ValueType::Number => "number",
            ValueType::Date => "date",
        })
    }
}

/// The kind of entity a variable describes. Only individuals are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Entity {
    #[default]
    Person,
}

/// A formula body: reads dependencies through the scope and returns one
/// value per person in the batch.
pub type FormulaFn =
    Arc<dyn Fn(&mut Scope<'_, '_>, Period, &ParameterView<'_>) -> Result<Value, ComputationError> + Send + Sync>;

/// One dated implementation of a variable.
///
/// `effective_from == None` means the version has always applied; only the
/// first version of a variable may omit its start date.
#[derive(Clone)]
pub struct FormulaVersion {
    pub effective_from: Option<NaiveDate>,
    /// Exclusive upper bound. Without it the version runs until its
    /// successor starts or the variable's legislation ends.
    pub effective_until: Option<NaiveDate>,
    pub dependencies: SmallVec<[&'static str; 8]>,
    pub(crate) body: FormulaFn,
}

impl FormulaVersion {
    pub fn always<F>(dependencies: &[&'static str], body: F) -> Self
    where
        F: Fn(&mut Scope<'_, '_>, Period, &ParameterView<'_>) -> Result<Value, ComputationError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            effective_from: None,
            effective_until: None,
            dependencies: SmallVec::from_slice(dependencies),
            body: Arc::new(body),
        }
    }

    pub fn since<F>(effective_from: NaiveDate, dependencies: &[&'static str], body: F) -> Self
    where
        F: Fn(&mut Scope<'_, '_>, Period, &ParameterView<'_>) -> Result<Value, ComputationError>
            + Send
            + Sync
            + 'static,
    {
        Self { effective_from: Some(effective_from), ..Self::always(dependencies, body) }
    }

    pub fn until(mut self, effective_until: NaiveDate) -> Self {
        self.effective_until = Some(effective_until);
        self
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|dep| *dep == name)
    }
}

impl fmt::Debug for FormulaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaVersion")
            .field("effective_from", &self.effective_from)
            .field("effective_until", &self.effective_until)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// A named, typed fact about a person. Without formulas it is an input and
/// must be supplied by the caller.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value_type: ValueType,
    pub entity: Entity,
    pub definition_period: PeriodUnit,
    pub formulas: Vec<FormulaVersion>,
    /// Last day on which the legislation exists (inclusive).
    pub legislative_end_date: Option<NaiveDate>,
}

impl Variable {
    pub fn new(name: impl Into<String>, value_type: ValueType, definition_period: PeriodUnit) -> Self {
        Self {
            name: name.into(),
            value_type,
            entity: Entity::Person,
            definition_period,
            formulas: Vec::new(),
            legislative_end_date: None,
        }
    }

    pub fn formula(mut self, version: FormulaVersion) -> Self {
        self.formulas.push(version);
        self
    }

    pub fn ends_on(mut self, date: NaiveDate) -> Self {
        self.legislative_end_date = Some(date);
        self
    }

    pub fn is_input(&self) -> bool { self.formulas.is_empty() }
}
