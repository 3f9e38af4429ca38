//! Chooses the formula version legislatively in force on a date.
use crate::store::{FormulaVersion, Variable};
use chrono::NaiveDate;
use std::fmt;

/// Why no formula version applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inactive {
    /// The variable has no formula and no value was supplied.
    Input,
    /// The date precedes the first version.
    NotYetInForce,
    /// The date is after the variable's legislative end date.
    Expired { ended: NaiveDate },
    /// The date is past the explicit end of the last version that started.
    Lapsed { until: NaiveDate },
}

impl fmt::Display for Inactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inactive::Input => f.write_str("input variable with no supplied value"),
            Inactive::NotYetInForce => f.write_str("legislation not yet in force"),
            Inactive::Expired { ended } => write!(f, "legislation expired after {}", ended),
            Inactive::Lapsed { until } => write!(f, "formula lapsed on {}", until),
        }
    }
}

pub fn select(variable: &Variable, date: NaiveDate) -> Option<&FormulaVersion> {
    explain(variable, date).ok()
}

/// Like [`select`], but reports why nothing applies.
///
/// Versions are ordered by start date, so only the latest one that has
/// started is a candidate; an earlier version is never reconsidered.
pub fn explain(variable: &Variable, date: NaiveDate) -> Result<&FormulaVersion, Inactive> {
    if variable.is_input() {
        return Err(Inactive::Input);
    }
    if let Some(ended) = variable.legislative_end_date {
        if date > ended {
            return Err(Inactive::Expired { ended });
        }
    }

    let candidate = variable
        .formulas
        .iter()
        .rev()
        .find(|v| v.effective_from.map_or(true, |from| from <= date))
        .ok_or(Inactive::NotYetInForce)?;

    match candidate.effective_until {
        Some(until) if date >= until => Err(Inactive::Lapsed { until }),
        _ => Ok(candidate),
    }
}
