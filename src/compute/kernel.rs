//! Elementwise algebra over per-person columns.
//!
//! Boolean columns compose like 0/1 numbers: conjunction is the elementwise
//! product and negation is `1 - x`. A scalar operand (typically a legislative
//! parameter) broadcasts against an array without changing its length; two
//! arrays must have the same length.
use crate::compute::ledger::ComputationError;
use chrono::{Datelike, NaiveDate};
use wide::f64x4;

const LANES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<'a> {
    Scalar(f64),
    Array(&'a [f64]),
}

impl Operand<'_> {
    fn len(&self) -> Option<usize> {
        match self {
            Operand::Scalar(_) => None,
            Operand::Array(v) => Some(v.len()),
        }
    }

    #[inline(always)]
    fn at(&self, i: usize) -> f64 {
        match self {
            Operand::Scalar(s) => *s,
            Operand::Array(v) => v[i],
        }
    }

    #[inline(always)]
    fn lanes(&self, i: usize) -> f64x4 {
        match self {
            Operand::Scalar(s) => f64x4::splat(*s),
            Operand::Array(v) => f64x4::from([v[i], v[i + 1], v[i + 2], v[i + 3]]),
        }
    }
}

impl From<f64> for Operand<'_> {
    fn from(s: f64) -> Self { Operand::Scalar(s) }
}

impl<'a> From<&'a [f64]> for Operand<'a> {
    fn from(v: &'a [f64]) -> Self { Operand::Array(v) }
}

impl<'a> From<&'a Vec<f64>> for Operand<'a> {
    fn from(v: &'a Vec<f64>) -> Self { Operand::Array(v.as_slice()) }
}

fn broadcast_len(a: Operand<'_>, b: Operand<'_>) -> Result<usize, ComputationError> {
    match (a.len(), b.len()) {
        (Some(l), Some(r)) if l != r => Err(ComputationError::ShapeMismatch {
            msg: format!("cannot combine arrays of length {} and {}", l, r),
        }),
        (Some(len), _) | (None, Some(len)) => Ok(len),
        (None, None) => Ok(1),
    }
}

fn same_len(a: usize, b: usize) -> Result<(), ComputationError> {
    if a != b {
        return Err(ComputationError::ShapeMismatch { msg: format!("cannot combine arrays of length {} and {}", a, b) });
    }
    Ok(())
}

/// Runs full SIMD lanes, then finishes the tail one element at a time.
fn lanewise(
    a: Operand<'_>,
    b: Operand<'_>,
    simd: impl Fn(f64x4, f64x4) -> f64x4,
    scalar: impl Fn(f64, f64) -> f64,
) -> Result<Vec<f64>, ComputationError> {
    let len = broadcast_len(a, b)?;
    let body = len - len % LANES;
    let mut out = Vec::with_capacity(len);

    for i in (0..body).step_by(LANES) {
        out.extend_from_slice(&simd(a.lanes(i), b.lanes(i)).to_array());
    }
    for i in body..len {
        out.push(scalar(a.at(i), b.at(i)));
    }
    Ok(out)
}

pub fn add<'a>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'a>>) -> Result<Vec<f64>, ComputationError> {
    lanewise(a.into(), b.into(), |l, r| l + r, |l, r| l + r)
}

pub fn sub<'a>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'a>>) -> Result<Vec<f64>, ComputationError> {
    lanewise(a.into(), b.into(), |l, r| l - r, |l, r| l - r)
}

pub fn mul<'a>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'a>>) -> Result<Vec<f64>, ComputationError> {
    lanewise(a.into(), b.into(), |l, r| l * r, |l, r| l * r)
}

pub fn min<'a>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'a>>) -> Result<Vec<f64>, ComputationError> {
    lanewise(a.into(), b.into(), |l, r| l.min(r), f64::min)
}

pub fn max<'a>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'a>>) -> Result<Vec<f64>, ComputationError> {
    lanewise(a.into(), b.into(), |l, r| l.max(r), f64::max)
}

/// `min(values * rate, ceiling)`, e.g. a percentage of earnings up to a cap.
pub fn capped_product<'a>(
    values: impl Into<Operand<'a>>,
    rate: f64,
    ceiling: f64,
) -> Result<Vec<f64>, ComputationError> {
    let scaled = mul(values, rate)?;
    min(&scaled, ceiling)
}

fn compare(a: Operand<'_>, b: Operand<'_>, op: impl Fn(f64, f64) -> bool) -> Result<Vec<bool>, ComputationError> {
    let len = broadcast_len(a, b)?;
    Ok((0..len).map(|i| op(a.at(i), b.at(i))).collect())
}

pub fn ge<'a>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'a>>) -> Result<Vec<bool>, ComputationError> {
    compare(a.into(), b.into(), |l, r| l >= r)
}

pub fn gt<'a>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'a>>) -> Result<Vec<bool>, ComputationError> {
    compare(a.into(), b.into(), |l, r| l > r)
}

pub fn le<'a>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'a>>) -> Result<Vec<bool>, ComputationError> {
    compare(a.into(), b.into(), |l, r| l <= r)
}

pub fn lt<'a>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'a>>) -> Result<Vec<bool>, ComputationError> {
    compare(a.into(), b.into(), |l, r| l < r)
}

/// Elementwise product of two boolean columns.
pub fn and(a: &[bool], b: &[bool]) -> Result<Vec<bool>, ComputationError> {
    same_len(a.len(), b.len())?;
    Ok(a.iter().zip(b).map(|(x, y)| x & y).collect())
}

/// Conjunction of any number of criteria: true only where all hold.
pub fn and_all(columns: &[&[bool]]) -> Result<Vec<bool>, ComputationError> {
    let Some((first, rest)) = columns.split_first() else {
        return Err(ComputationError::ShapeMismatch { msg: "conjunction of zero columns".into() });
    };
    let mut acc = first.to_vec();
    for column in rest {
        same_len(acc.len(), column.len())?;
        for (a, b) in acc.iter_mut().zip(column.iter()) {
            *a &= *b;
        }
    }
    Ok(acc)
}

pub fn or(a: &[bool], b: &[bool]) -> Result<Vec<bool>, ComputationError> {
    same_len(a.len(), b.len())?;
    Ok(a.iter().zip(b).map(|(x, y)| x | y).collect())
}

pub fn not(a: &[bool]) -> Vec<bool> {
    a.iter().map(|x| !x).collect()
}

/// true = 1.0, false = 0.0
pub fn to_numbers(a: &[bool]) -> Vec<f64> {
    a.iter().map(|&x| f64::from(u8::from(x))).collect()
}

/// Zeroes `values` wherever `condition` is false.
pub fn gate<'a>(values: impl Into<Operand<'a>>, condition: &[bool]) -> Result<Vec<f64>, ComputationError> {
    let mask = to_numbers(condition);
    lanewise(values.into(), Operand::Array(&mask), |l, r| l * r, |l, r| l * r)
}

/// Branch-free `where(condition, then, otherwise)`.
pub fn select<'a>(
    condition: &[bool],
    then: impl Into<Operand<'a>>,
    otherwise: impl Into<Operand<'a>>,
) -> Result<Vec<f64>, ComputationError> {
    let (then, otherwise) = (then.into(), otherwise.into());
    if then.len().is_some() || otherwise.len().is_some() {
        same_len(condition.len(), broadcast_len(then, otherwise)?)?;
    }
    Ok(condition
        .iter()
        .enumerate()
        .map(|(i, &c)| [otherwise.at(i), then.at(i)][usize::from(c)])
        .collect())
}

/// Completed years between each date and `on` (an age when the dates are
/// birth dates). Dates after `on` give negative values.
pub fn years_between(dates: &[NaiveDate], on: NaiveDate) -> Vec<f64> {
    dates
        .iter()
        .map(|d| {
            let mut years = on.year() - d.year();
            if (on.month(), on.day()) < (d.month(), d.day()) {
                years -= 1;
            }
            f64::from(years)
        })
        .collect()
}

pub fn on_or_after(dates: &[NaiveDate], threshold: NaiveDate) -> Vec<bool> {
    dates.iter().map(|d| *d >= threshold).collect()
}
