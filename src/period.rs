//! Time scopes at which variables are supplied, requested and cached.
//!
//! A [`Period`] is either permanent (`Eternity`), a calendar year, or a
//! single day. Its textual form is `ETERNITY`, `2020` or `2020-04-01`.

use crate::compute::ComputationError;
use chrono::{Datelike, Months, NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The granularity a variable is natively defined at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriodUnit {
    Eternity,
    Year,
    Day,
}

/// Step size accepted by [`Period::offset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffsetUnit {
    Day,
    Week,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Period {
    Eternity,
    Year(i32),
    Day(NaiveDate),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid period '{0}': expected ETERNITY, YYYY or YYYY-MM-DD")]
pub struct InvalidPeriod(pub String);

impl Period {
    pub fn eternity() -> Self { Period::Eternity }
    pub fn year(date: NaiveDate) -> Self { Period::Year(date.year()) }
    pub fn day(date: NaiveDate) -> Self { Period::Day(date) }

    pub fn unit(&self) -> PeriodUnit {
        match self {
            Period::Eternity => PeriodUnit::Eternity,
            Period::Year(_) => PeriodUnit::Year,
            Period::Day(_) => PeriodUnit::Day,
        }
    }

    /// First day covered by the period. Eternity has no natural reference.
    pub fn reference_date(&self) -> Option<NaiveDate> {
        match *self {
            Period::Eternity => None,
            Period::Year(year) => NaiveDate::from_ymd_opt(year, 1, 1),
            Period::Day(date) => Some(date),
        }
    }

    /// True iff every instant of `other` lies within `self`.
    pub fn contains(&self, other: &Period) -> bool {
        match (*self, *other) {
            (Period::Eternity, _) => true,
            (Period::Year(a), Period::Year(b)) => a == b,
            (Period::Year(a), Period::Day(d)) => d.year() == a,
            (Period::Day(a), Period::Day(b)) => a == b,
            _ => false,
        }
    }

    /// Shifts the period by `amount` units, keeping its granularity.
    ///
    /// A year shifted by days or weeks becomes the year covering its shifted
    /// January 1st. Shifting a day by years keeps the day of month, clamping
    /// February 29th to the 28th.
    pub fn offset(&self, amount: i64, unit: OffsetUnit) -> Result<Period, ComputationError> {
        let unsupported = || ComputationError::UnsupportedPeriodOperation {
            period: *self,
            operation: format!("offset by {} {:?}", amount, unit),
        };
        match *self {
            Period::Eternity => Err(unsupported()),
            Period::Day(date) => shift(date, amount, unit).map(Period::Day).ok_or_else(unsupported),
            Period::Year(year) => {
                let shifted = match unit {
                    OffsetUnit::Year => i32::try_from(amount)
                        .ok()
                        .and_then(|n| year.checked_add(n))
                        .filter(|y| NaiveDate::from_ymd_opt(*y, 1, 1).is_some()),
                    OffsetUnit::Day | OffsetUnit::Week => NaiveDate::from_ymd_opt(year, 1, 1)
                        .and_then(|start| shift(start, amount, unit))
                        .map(|d| d.year()),
                };
                shifted.map(Period::Year).ok_or_else(unsupported)
            }
        }
    }
}

fn shift(date: NaiveDate, amount: i64, unit: OffsetUnit) -> Option<NaiveDate> {
    match unit {
        OffsetUnit::Day => date.checked_add_signed(TimeDelta::try_days(amount)?),
        OffsetUnit::Week => date.checked_add_signed(TimeDelta::try_weeks(amount)?),
        OffsetUnit::Year => {
            let months = Months::new(u32::try_from(amount.unsigned_abs().checked_mul(12)?).ok()?);
            if amount >= 0 { date.checked_add_months(months) } else { date.checked_sub_months(months) }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Eternity => f.write_str("ETERNITY"),
            Period::Year(year) => write!(f, "{}", year),
            Period::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl FromStr for Period {
    type Err = InvalidPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("eternity") {
            return Ok(Period::Eternity);
        }
        if let Ok(year) = trimmed.parse::<i32>() {
            if NaiveDate::from_ymd_opt(year, 1, 1).is_some() {
                return Ok(Period::Year(year));
            }
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(Period::Day)
            .map_err(|_| InvalidPeriod(s.to_string()))
    }
}

impl TryFrom<String> for Period {
    type Error = InvalidPeriod;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<Period> for String {
    fn from(period: Period) -> Self { period.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[rstest]
    #[case(Period::Eternity, Period::Eternity, true)]
    #[case(Period::Eternity, Period::Year(2020), true)]
    #[case(Period::Eternity, Period::Day(d(2020, 4, 1)), true)]
    #[case(Period::Year(2020), Period::Day(d(2020, 12, 31)), true)]
    #[case(Period::Year(2020), Period::Day(d(2021, 1, 1)), false)]
    #[case(Period::Year(2020), Period::Year(2020), true)]
    #[case(Period::Year(2020), Period::Eternity, false)]
    #[case(Period::Day(d(2020, 4, 1)), Period::Day(d(2020, 4, 1)), true)]
    #[case(Period::Day(d(2020, 4, 1)), Period::Day(d(2020, 4, 2)), false)]
    #[case(Period::Day(d(2020, 4, 1)), Period::Year(2020), false)]
    fn test_containment(#[case] outer: Period, #[case] inner: Period, #[case] expected: bool) {
        assert_eq!(outer.contains(&inner), expected);
    }

    #[test]
    fn test_year_contains_every_day_of_a_leap_year() {
        let year = Period::Year(2020);
        let days = d(2020, 1, 1).iter_days().take_while(|day| day.year() == 2020);
        assert_eq!(days.clone().count(), 366);
        assert!(days.map(Period::Day).all(|day| year.contains(&day)));
    }

    #[rstest]
    #[case(Period::Day(d(2020, 6, 1)), -52, OffsetUnit::Week, Period::Day(d(2019, 6, 3)))]
    #[case(Period::Day(d(2020, 6, 1)), 10, OffsetUnit::Day, Period::Day(d(2020, 6, 11)))]
    #[case(Period::Day(d(2020, 2, 29)), 1, OffsetUnit::Year, Period::Day(d(2021, 2, 28)))]
    #[case(Period::Day(d(2020, 2, 29)), -4, OffsetUnit::Year, Period::Day(d(2016, 2, 29)))]
    #[case(Period::Year(2020), -1, OffsetUnit::Year, Period::Year(2019))]
    #[case(Period::Year(2020), -1, OffsetUnit::Day, Period::Year(2019))]
    #[case(Period::Year(2020), 52, OffsetUnit::Week, Period::Year(2020))]
    fn test_offset(#[case] start: Period, #[case] amount: i64, #[case] unit: OffsetUnit, #[case] expected: Period) {
        assert_eq!(start.offset(amount, unit).unwrap(), expected);
    }

    #[test]
    fn test_offset_eternity_is_unsupported() {
        let err = Period::Eternity.offset(-52, OffsetUnit::Week).unwrap_err();
        assert!(matches!(err, ComputationError::UnsupportedPeriodOperation { period: Period::Eternity, .. }));
    }

    #[test]
    fn test_offset_overflow_is_unsupported() {
        let err = Period::Day(NaiveDate::MAX).offset(1, OffsetUnit::Day).unwrap_err();
        assert!(matches!(err, ComputationError::UnsupportedPeriodOperation { .. }));
    }

    #[test]
    fn test_reference_dates() {
        assert_eq!(Period::Eternity.reference_date(), None);
        assert_eq!(Period::year(d(2020, 7, 14)).reference_date(), Some(d(2020, 1, 1)));
        assert_eq!(Period::day(d(2020, 7, 14)).reference_date(), Some(d(2020, 7, 14)));
    }

    #[rstest]
    #[case("ETERNITY", Period::Eternity)]
    #[case("eternity", Period::Eternity)]
    #[case("2020", Period::Year(2020))]
    #[case("2020-04-01", Period::Day(d(2020, 4, 1)))]
    fn test_parse_and_display(#[case] text: &str, #[case] expected: Period) {
        let parsed: Period = text.parse().unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string().to_uppercase(), text.to_uppercase());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("2020-13-01".parse::<Period>().is_err());
        assert!("last week".parse::<Period>().is_err());
    }

    #[test]
    fn test_serde_uses_textual_form() {
        let json = serde_json::to_string(&vec![Period::Eternity, Period::Day(d(2020, 4, 1))]).unwrap();
        assert_eq!(json, r#"["ETERNITY","2020-04-01"]"#);
        let back: Vec<Period> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Period::Eternity, Period::Day(d(2020, 4, 1))]);
    }
}
