use super::types::*;
use crate::compute::ComputationError;
use std::collections::HashMap;
use tracing::info;

/// Collects variable definitions during bootstrap.
///
/// Declared formula dependencies may refer to variables registered later;
/// they are checked once in [`RegistryBuilder::finish`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    variables: Vec<Variable>,
    index: HashMap<String, VariableId>,
}

impl RegistryBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn register(&mut self, variable: Variable) -> Result<VariableId, ComputationError> {
        if self.index.contains_key(&variable.name) {
            return Err(ComputationError::DuplicateVariable { name: variable.name });
        }
        validate_ordering(&variable)?;

        let id = VariableId::new(self.variables.len());
        self.index.insert(variable.name.clone(), id);
        self.variables.push(variable);
        Ok(id)
    }

    /// Ends the registration phase.
    pub fn finish(self) -> Result<Registry, ComputationError> {
        for variable in &self.variables {
            for version in &variable.formulas {
                if let Some(missing) = version.dependencies.iter().find(|dep| !self.index.contains_key(**dep)) {
                    return Err(ComputationError::UnknownVariable { name: missing.to_string() });
                }
            }
        }

        let formulas: usize = self.variables.iter().map(|v| v.formulas.len()).sum();
        info!(variables = self.variables.len(), formulas, "variable registry loaded");

        Ok(Registry { variables: self.variables, index: self.index })
    }
}

/// Immutable catalogue of variables, addressed by name or dense id.
#[derive(Debug, Default)]
pub struct Registry {
    variables: Vec<Variable>,
    index: HashMap<String, VariableId>,
}

impl Registry {
    pub fn len(&self) -> usize { self.variables.len() }
    pub fn is_empty(&self) -> bool { self.variables.is_empty() }

    pub fn id_of(&self, name: &str) -> Result<VariableId, ComputationError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| ComputationError::UnknownVariable { name: name.to_string() })
    }

    pub fn lookup(&self, name: &str) -> Result<&Variable, ComputationError> {
        self.id_of(name).map(|id| self.get(id))
    }

    /// Panics if `id` was issued by another registry; see [`Registry::try_get`].
    #[inline(always)]
    pub fn get(&self, id: VariableId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn try_get(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariableId, &Variable)> {
        self.variables.iter().enumerate().map(|(i, v)| (VariableId::new(i), v))
    }
}

fn validate_ordering(variable: &Variable) -> Result<(), ComputationError> {
    let invalid = |reason: String| ComputationError::InvalidFormulaOrdering {
        variable: variable.name.clone(),
        reason,
    };

    for (i, version) in variable.formulas.iter().enumerate() {
        if let (Some(from), Some(until)) = (version.effective_from, version.effective_until) {
            if until <= from {
                return Err(invalid(format!("version starting {} ends on or before it starts ({})", from, until)));
            }
        }

        let Some(next) = variable.formulas.get(i + 1) else { continue };
        match (version.effective_from, next.effective_from) {
            (_, None) => return Err(invalid("only the first version may omit its start date".into())),
            (Some(current), Some(following)) if following <= current => {
                return Err(invalid(format!("version starting {} follows version starting {}", following, current)));
            }
            _ => {}
        }
        if let (Some(until), Some(following)) = (version.effective_until, next.effective_from) {
            if until > following {
                return Err(invalid(format!("version valid until {} overlaps version starting {}", until, following)));
            }
        }
    }
    Ok(())
}
