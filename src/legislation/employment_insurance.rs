//! Employment Insurance regular and sickness benefits.
use crate::compute::{kernel, ComputationError, Scope, Value};
use crate::parameters::ParameterView;
use crate::period::{OffsetUnit, Period, PeriodUnit};
use crate::store::{FormulaVersion, RegistryBuilder, ValueType, Variable};

pub const PAID_IN: &str = "has_paid_into_employment_insurance";
pub const HOURS_WORKED: &str = "hours_worked_in_last_52_weeks";
pub const RECORD_OF_EMPLOYMENT: &str = "has_record_of_employment";
pub const MEDICAL_CERTIFICATE: &str = "has_medical_certificate";
pub const UNABLE_TO_WORK: &str = "person_is_unable_to_work_for_medical_reasons";
pub const EARNINGS_DECREASED: &str = "regular_earnings_decreased_by_40_percent_or_more";
pub const CURRENT_EARNINGS: &str = "current_earnings";
pub const LAST_DAY_OF_WORK: &str = "last_day_of_work";

pub const WORKED_MINIMUM_HOURS: &str = "person_has_worked_minimum_hours";
pub const ELIGIBLE: &str = "person_is_eligible_for_EI_benefits";
pub const WEEKLY_BENEFITS: &str = "potential_weekly_benefits";
pub const WORKED_RECENTLY: &str = "worked_within_last_52_weeks";

pub const MINIMUM_HOURS: &str = "employment_insurance.minimum_hours";
pub const BENEFIT_RATE: &str = "employment_insurance.benefit_rate";
pub const MAXIMUM_INSURABLE_EARNINGS: &str = "employment_insurance.maximum_insurable_weekly_earnings";
pub const MAXIMUM_WEEKLY_BENEFIT: &str = "employment_insurance.maximum_weekly_benefit";
pub const PARAMETERS: &[&str] = &[MINIMUM_HOURS, BENEFIT_RATE, MAXIMUM_INSURABLE_EARNINGS, MAXIMUM_WEEKLY_BENEFIT];

/// Weeks of work history the benefit looks back over.
const QUALIFYING_WEEKS: i64 = 52;

// The medical certificate is collected but not currently required.
const INPUTS: [(&str, ValueType); 8] = [
    (PAID_IN, ValueType::Bool),
    (HOURS_WORKED, ValueType::Number),
    (RECORD_OF_EMPLOYMENT, ValueType::Bool),
    (MEDICAL_CERTIFICATE, ValueType::Bool),
    (UNABLE_TO_WORK, ValueType::Bool),
    (EARNINGS_DECREASED, ValueType::Bool),
    (CURRENT_EARNINGS, ValueType::Number),
    (LAST_DAY_OF_WORK, ValueType::Date),
];

pub fn register(builder: &mut RegistryBuilder) -> Result<(), ComputationError> {
    for (name, value_type) in INPUTS {
        builder.register(Variable::new(name, value_type, PeriodUnit::Eternity))?;
    }

    builder.register(
        Variable::new(WORKED_MINIMUM_HOURS, ValueType::Bool, PeriodUnit::Eternity)
            .formula(FormulaVersion::always(&[HOURS_WORKED], worked_minimum_hours)),
    )?;
    builder.register(Variable::new(ELIGIBLE, ValueType::Bool, PeriodUnit::Eternity).formula(FormulaVersion::always(
        &[PAID_IN, UNABLE_TO_WORK, RECORD_OF_EMPLOYMENT, WORKED_MINIMUM_HOURS, EARNINGS_DECREASED],
        eligible,
    )))?;
    builder.register(
        Variable::new(WEEKLY_BENEFITS, ValueType::Number, PeriodUnit::Day)
            .formula(FormulaVersion::always(&[CURRENT_EARNINGS], weekly_benefits)),
    )?;
    builder.register(
        Variable::new(WORKED_RECENTLY, ValueType::Bool, PeriodUnit::Day)
            .formula(FormulaVersion::always(&[LAST_DAY_OF_WORK], worked_recently)),
    )?;
    Ok(())
}

fn worked_minimum_hours(
    scope: &mut Scope<'_, '_>,
    period: Period,
    parameters: &ParameterView<'_>,
) -> Result<Value, ComputationError> {
    let hours = scope.numbers(HOURS_WORKED, period)?;
    Ok(Value::from(kernel::ge(hours.as_slice(), parameters.get(MINIMUM_HOURS)?)?))
}

fn eligible(scope: &mut Scope<'_, '_>, period: Period, _: &ParameterView<'_>) -> Result<Value, ComputationError> {
    let paid_in = scope.bools(PAID_IN, period)?;
    let unable_to_work = scope.bools(UNABLE_TO_WORK, period)?;
    let record = scope.bools(RECORD_OF_EMPLOYMENT, period)?;
    let hours = scope.bools(WORKED_MINIMUM_HOURS, period)?;
    let decreased = scope.bools(EARNINGS_DECREASED, period)?;

    Ok(Value::from(kernel::and_all(&[
        paid_in.as_slice(),
        unable_to_work.as_slice(),
        record.as_slice(),
        hours.as_slice(),
        decreased.as_slice(),
    ])?))
}

/// The maximum benefit once earnings reach the maximum insurable amount,
/// otherwise the benefit rate applied to earnings.
fn weekly_benefits(
    scope: &mut Scope<'_, '_>,
    period: Period,
    parameters: &ParameterView<'_>,
) -> Result<Value, ComputationError> {
    let earnings = scope.numbers(CURRENT_EARNINGS, period)?;
    let at_maximum = kernel::ge(earnings.as_slice(), parameters.get(MAXIMUM_INSURABLE_EARNINGS)?)?;
    let proportional = kernel::mul(earnings.as_slice(), parameters.get(BENEFIT_RATE)?)?;
    Ok(Value::from(kernel::select(&at_maximum, parameters.get(MAXIMUM_WEEKLY_BENEFIT)?, &proportional)?))
}

fn worked_recently(
    scope: &mut Scope<'_, '_>,
    period: Period,
    _: &ParameterView<'_>,
) -> Result<Value, ComputationError> {
    let window_start = period
        .offset(-QUALIFYING_WEEKS, OffsetUnit::Week)?
        .reference_date()
        .ok_or_else(|| ComputationError::UnsupportedPeriodOperation {
            period,
            operation: format!("look back {} weeks", QUALIFYING_WEEKS),
        })?;
    let last_day = scope.dates(LAST_DAY_OF_WORK, period)?;
    Ok(Value::from(kernel::on_or_after(&last_day, window_start)))
}
