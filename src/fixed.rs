//! Fixed-point decimal used for every score, weight, bound and rank.
//!
//! Values are stored as millionths (`1_000_000 == 1.0`) so repeated
//! weighted sums never drift and `.5` tie ranks are exact. Every division
//! rounds half away from zero exactly once.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;
use thiserror::Error;

/// Number of millionths in one whole unit.
pub const SCALE: i64 = 1_000_000;
const FRACTION_DIGITS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFixedError {
    #[error("empty number")]
    Empty,
    #[error("invalid number '{0}'")]
    Invalid(String),
    #[error("'{0}' has more than 6 decimal places")]
    TooPrecise(String),
    #[error("'{0}' is out of range")]
    OutOfRange(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed(i64);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const HUNDRED: Fixed = Fixed(100 * SCALE);

    pub const fn from_millionths(millionths: i64) -> Self {
        Fixed(millionths)
    }

    pub const fn millionths(self) -> i64 {
        self.0
    }

    pub fn from_int(value: i64) -> Self {
        Fixed(value.saturating_mul(SCALE))
    }

    /// Convert a float, rounding to the nearest millionth.
    /// Returns `None` for NaN, infinities and values that do not fit.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let scaled = (value * SCALE as f64).round();
        if scaled.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Fixed(scaled as i64))
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    pub fn is_whole(self) -> bool {
        self.0 % SCALE == 0
    }

    /// Whole part, truncated toward zero.
    pub fn whole(self) -> i64 {
        self.0 / SCALE
    }

    pub fn abs_diff(self, other: Fixed) -> Fixed {
        Fixed(i64::try_from(self.0.abs_diff(other.0)).unwrap_or(i64::MAX))
    }

    pub fn times(self, factor: i64) -> Fixed {
        Fixed(self.0.saturating_mul(factor))
    }

    pub fn checked_add(self, rhs: Fixed) -> Option<Fixed> {
        self.0.checked_add(rhs.0).map(Fixed)
    }

    pub fn checked_times(self, factor: i64) -> Option<Fixed> {
        self.0.checked_mul(factor).map(Fixed)
    }

    /// Sum that reports overflow instead of saturating.
    pub fn checked_sum<I: IntoIterator<Item = Fixed>>(values: I) -> Option<Fixed> {
        values
            .into_iter()
            .try_fold(Fixed::ZERO, |acc, value| acc.checked_add(value))
    }

    /// Arithmetic mean of `count` values summing to `sum`.
    pub fn mean(sum: Fixed, count: usize) -> Fixed {
        if count == 0 {
            return Fixed::ZERO;
        }
        Fixed(round_div(sum.0 as i128, count as i128))
    }

    /// `(sum / count) × (weight_percent / 100)` with a single rounding step.
    pub fn weighted_mean(sum: Fixed, count: usize, weight_percent: Fixed) -> Fixed {
        if count == 0 {
            return Fixed::ZERO;
        }
        let numerator = sum.0 as i128 * weight_percent.0 as i128;
        let denominator = count as i128 * 100 * SCALE as i128;
        Fixed(round_div(numerator, denominator))
    }

    /// `self × (weight_percent / 100)`.
    pub fn percent(self, weight_percent: Fixed) -> Fixed {
        Fixed::weighted_mean(self, 1, weight_percent)
    }

    /// Mid-rank of a tied run spanning 1-based positions `first..=last`.
    pub fn mid_rank(first: usize, last: usize) -> Fixed {
        Fixed((first + last) as i64 * SCALE / 2)
    }

    /// Round to `places` decimal places (half away from zero).
    pub fn round_dp(self, places: usize) -> Fixed {
        if places >= FRACTION_DIGITS {
            return self;
        }
        let step = 10_i64.pow((FRACTION_DIGITS - places) as u32);
        Fixed(round_div(self.0 as i128, step as i128) * step)
    }
}

fn round_div(numerator: i128, denominator: i128) -> i64 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let adjust = if 2 * remainder.abs() >= denominator {
        numerator.signum()
    } else {
        0
    };
    (quotient + adjust) as i64
}

// Operators saturate at the i64 bounds. Tallies go through the checked
// variants and fail instead.
impl Add for Fixed {
    type Output = Fixed;
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Fixed) {
        *self = *self + rhs;
    }
}

impl Sub for Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Fixed {
    type Output = Fixed;
    fn neg(self) -> Fixed {
        Fixed(self.0.saturating_neg())
    }
}

impl Sum for Fixed {
    fn sum<I: Iterator<Item = Fixed>>(iter: I) -> Fixed {
        iter.fold(Fixed::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Fixed> for Fixed {
    fn sum<I: Iterator<Item = &'a Fixed>>(iter: I) -> Fixed {
        iter.copied().sum()
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match f.precision() {
            Some(places) => self.round_dp(places),
            None => *self,
        };
        let sign = if value.0 < 0 { "-" } else { "" };
        let magnitude = value.0.unsigned_abs();
        let whole = magnitude / SCALE as u64;
        let fraction = magnitude % SCALE as u64;

        let digits = format!("{:06}", fraction);
        let text = match f.precision() {
            Some(0) => format!("{}{}", sign, whole),
            Some(places) => {
                let places = places.min(FRACTION_DIGITS);
                let padding = f.precision().unwrap_or(0).saturating_sub(FRACTION_DIGITS);
                format!("{}{}.{}{}", sign, whole, &digits[..places], "0".repeat(padding))
            }
            None if fraction == 0 => format!("{}{}", sign, whole),
            None => format!("{}{}.{}", sign, whole, digits.trim_end_matches('0')),
        };
        f.pad_integral(true, "", &text)
    }
}

impl FromStr for Fixed {
    type Err = ParseFixedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseFixedError::Empty);
        }

        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (whole_part, fraction_part) = body.split_once('.').unwrap_or((body, ""));

        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole_part.is_empty() && fraction_part.is_empty())
            || !all_digits(whole_part)
            || !all_digits(fraction_part)
        {
            return Err(ParseFixedError::Invalid(s.to_string()));
        }
        if fraction_part.len() > FRACTION_DIGITS {
            return Err(ParseFixedError::TooPrecise(s.to_string()));
        }

        let whole: i64 = if whole_part.is_empty() {
            0
        } else {
            whole_part
                .parse()
                .map_err(|_| ParseFixedError::OutOfRange(s.to_string()))?
        };
        let fraction: i64 = format!("{:0<6}", fraction_part)
            .parse()
            .map_err(|_| ParseFixedError::Invalid(s.to_string()))?;

        let magnitude = whole
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(fraction))
            .ok_or_else(|| ParseFixedError::OutOfRange(s.to_string()))?;
        Ok(Fixed(if negative { -magnitude } else { magnitude }))
    }
}

impl Serialize for Fixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct FixedVisitor;

impl<'de> Visitor<'de> for FixedVisitor {
    type Value = Fixed;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal number with at most 6 decimal places")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Fixed, E> {
        v.checked_mul(SCALE)
            .map(Fixed)
            .ok_or_else(|| E::custom(format!("{} is out of range", v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Fixed, E> {
        i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(SCALE))
            .map(Fixed)
            .ok_or_else(|| E::custom(format!("{} is out of range", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Fixed, E> {
        Fixed::from_f64(v).ok_or_else(|| E::custom(format!("{} is not a finite number", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Fixed, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Fixed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FixedVisitor)
    }
}
