//! Canada Emergency Response Benefit.
//!
//! In force from 2020-03-15 until 2020-10-03. From 2020-04-15 applicants who
//! still earn a small income during the four-week period also qualify.
use crate::compute::{kernel, ComputationError, Scope, Value};
use crate::parameters::ParameterView;
use crate::period::{Period, PeriodUnit};
use crate::store::{FormulaVersion, RegistryBuilder, ValueType, Variable};
use chrono::NaiveDate;

pub const RESIDENT: &str = "is_a_resident_of_canada";
pub const OTHER_BENEFITS: &str = "is_receiving_other_benefits";
pub const QUIT_VOLUNTARILY: &str = "has_quit_job_voluntarily";
pub const INCOME_LOSS: &str = "will_lose_income_for_half_of_the_four_week_period";
pub const INCOME_IN_PERIOD: &str = "employment_income_in_four_week_period";
pub const TOTAL_INCOME: &str = "total_income_in_last_12_months";
pub const DATE_OF_BIRTH: &str = "date_of_birth";

pub const AGE: &str = "age";
pub const AT_LEAST_MINIMUM_AGE: &str = "is_at_least_15_years_of_age";
pub const EARNED_MINIMUM: &str = "has_earned_minimum_amount";
pub const ELIGIBLE: &str = "person_is_eligible_for_CERB";

pub const MINIMUM_INCOME: &str = "earnings.CERB_minimum";
pub const MAXIMUM_WHILE_WORKING: &str = "earnings.CERB_maximum_while_working";
pub const MINIMUM_AGE: &str = "eligibility.minimum_age";
pub const PARAMETERS: &[&str] = &[MINIMUM_INCOME, MAXIMUM_WHILE_WORKING, MINIMUM_AGE];

const INPUTS: [(&str, ValueType); 7] = [
    (RESIDENT, ValueType::Bool),
    (OTHER_BENEFITS, ValueType::Bool),
    (QUIT_VOLUNTARILY, ValueType::Bool),
    (INCOME_LOSS, ValueType::Bool),
    (INCOME_IN_PERIOD, ValueType::Number),
    (TOTAL_INCOME, ValueType::Number),
    (DATE_OF_BIRTH, ValueType::Date),
];

const LAUNCHED: NaiveDate = date(2020, 3, 15);
const WORKING_ALLOWED: NaiveDate = date(2020, 4, 15);
const LAST_DAY: NaiveDate = date(2020, 10, 3);

// Only called in const items, so a bad literal fails the build.
const fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(y, m, d) {
        Some(date) => date,
        None => panic!("invalid legislative date"),
    }
}

pub fn register(builder: &mut RegistryBuilder) -> Result<(), ComputationError> {
    for (name, value_type) in INPUTS {
        builder.register(Variable::new(name, value_type, PeriodUnit::Eternity))?;
    }

    builder.register(
        Variable::new(AGE, ValueType::Number, PeriodUnit::Day).formula(FormulaVersion::always(&[DATE_OF_BIRTH], age)),
    )?;
    builder.register(
        Variable::new(AT_LEAST_MINIMUM_AGE, ValueType::Bool, PeriodUnit::Day)
            .formula(FormulaVersion::always(&[AGE], at_least_minimum_age)),
    )?;
    builder.register(
        Variable::new(EARNED_MINIMUM, ValueType::Bool, PeriodUnit::Day)
            .formula(FormulaVersion::always(&[TOTAL_INCOME], earned_minimum)),
    )?;

    let criteria = [RESIDENT, OTHER_BENEFITS, QUIT_VOLUNTARILY, INCOME_LOSS, AT_LEAST_MINIMUM_AGE, EARNED_MINIMUM];
    let mut amended = criteria.to_vec();
    amended.push(INCOME_IN_PERIOD);

    builder.register(
        Variable::new(ELIGIBLE, ValueType::Bool, PeriodUnit::Day)
            .formula(FormulaVersion::since(LAUNCHED, &criteria, eligible_at_launch))
            .formula(FormulaVersion::since(WORKING_ALLOWED, &amended, eligible_while_working))
            .ends_on(LAST_DAY),
    )?;
    Ok(())
}

/// Completed years on the period's date.
fn age(scope: &mut Scope<'_, '_>, period: Period, parameters: &ParameterView<'_>) -> Result<Value, ComputationError> {
    let born = scope.dates(DATE_OF_BIRTH, period)?;
    Ok(Value::from(kernel::years_between(&born, parameters.date())))
}

fn at_least_minimum_age(
    scope: &mut Scope<'_, '_>,
    period: Period,
    parameters: &ParameterView<'_>,
) -> Result<Value, ComputationError> {
    let age = scope.numbers(AGE, period)?;
    Ok(Value::from(kernel::ge(age.as_slice(), parameters.get(MINIMUM_AGE)?)?))
}

fn earned_minimum(
    scope: &mut Scope<'_, '_>,
    period: Period,
    parameters: &ParameterView<'_>,
) -> Result<Value, ComputationError> {
    let income = scope.numbers(TOTAL_INCOME, period)?;
    Ok(Value::from(kernel::ge(income.as_slice(), parameters.get(MINIMUM_INCOME)?)?))
}

fn eligible_at_launch(
    scope: &mut Scope<'_, '_>,
    period: Period,
    _: &ParameterView<'_>,
) -> Result<Value, ComputationError> {
    let income_loss = scope.bools(INCOME_LOSS, period)?;
    eligible_with(scope, period, &income_loss)
}

fn eligible_while_working(
    scope: &mut Scope<'_, '_>,
    period: Period,
    parameters: &ParameterView<'_>,
) -> Result<Value, ComputationError> {
    let income_loss = scope.bools(INCOME_LOSS, period)?;
    let earnings = scope.numbers(INCOME_IN_PERIOD, period)?;
    let earned_little = kernel::le(earnings.as_slice(), parameters.get(MAXIMUM_WHILE_WORKING)?)?;
    let income_criterion = kernel::or(&income_loss, &earned_little)?;
    eligible_with(scope, period, &income_criterion)
}

/// Every criterion must hold; `income_criterion` differs between versions.
fn eligible_with(
    scope: &mut Scope<'_, '_>,
    period: Period,
    income_criterion: &[bool],
) -> Result<Value, ComputationError> {
    let resident = scope.bools(RESIDENT, period)?;
    let no_other_benefits = kernel::not(&scope.bools(OTHER_BENEFITS, period)?);
    let did_not_quit = kernel::not(&scope.bools(QUIT_VOLUNTARILY, period)?);
    let old_enough = scope.bools(AT_LEAST_MINIMUM_AGE, period)?;
    let earned_minimum = scope.bools(EARNED_MINIMUM, period)?;

    Ok(Value::from(kernel::and_all(&[
        resident.as_slice(),
        no_other_benefits.as_slice(),
        did_not_quit.as_slice(),
        income_criterion,
        old_enough.as_slice(),
        earned_minimum.as_slice(),
    ])?))
}
