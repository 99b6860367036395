//! # Fixed-Point Decimals
//!
//! Monetary amounts and fractions without floating point.
//!
//! - [`Money`] stores integer cents.
//! - [`Ratio`] stores basis points (10_000 = 1.0).
//!
//! Both parse from decimal text. Human-readable formats (JSON, TOML) carry
//! them as decimal strings or numbers; binary formats (postcard) carry the
//! raw integer.

use crate::primitives::{MONEY_SCALE, RATIO_SCALE};
use crate::types::EtlError;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// DECIMAL PARSING
// =============================================================================

/// Parse decimal text into an integer scaled by `10^scale`.
///
/// Accepts an optional sign, an integer part and at most `scale` fractional
/// digits. Exponents are rejected.
pub fn parse_scaled(text: &str, scale: u32) -> Result<i64, EtlError> {
    let invalid = || EtlError::InvalidDecimal(text.to_string());
    let trimmed = text.trim();

    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if fraction.len() > scale as usize {
        return Err(invalid());
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let mut value: i64 = 0;
    for b in whole.bytes() {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(i64::from(b - b'0')))
            .ok_or_else(invalid)?;
    }
    let mut padded = 0u32;
    for b in fraction.bytes() {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(i64::from(b - b'0')))
            .ok_or_else(invalid)?;
        padded += 1;
    }
    while padded < scale {
        value = value.checked_mul(10).ok_or_else(invalid)?;
        padded += 1;
    }

    Ok(if negative { -value } else { value })
}

/// Render a scaled integer as decimal text with exactly `scale` digits.
fn write_scaled(f: &mut fmt::Formatter<'_>, value: i64, scale: u32) -> fmt::Result {
    let divisor = 10i64.pow(scale);
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    let divisor = divisor.unsigned_abs();
    write!(
        f,
        "{}{}.{:0width$}",
        sign,
        magnitude / divisor,
        magnitude % divisor,
        width = scale as usize
    )
}

/// Visitor accepting decimal strings and JSON numbers.
///
/// Floats are converted through their shortest decimal text, so `5000.01`
/// becomes exactly 500001 cents.
struct ScaledVisitor {
    scale: u32,
    expecting: &'static str,
}

impl Visitor<'_> for ScaledVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.expecting)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        parse_scaled(v, self.scale).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        v.checked_mul(10i64.pow(self.scale))
            .ok_or_else(|| E::custom(format!("{} out of range", v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(10i64.pow(self.scale)))
            .ok_or_else(|| E::custom(format!("{} out of range", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
        parse_scaled(&v.to_string(), self.scale).map_err(E::custom)
    }
}

// =============================================================================
// MONEY
// =============================================================================

/// A monetary amount in integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create an amount from cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Raw cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Returns `None` on overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Returns `None` on overflow.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Check whether the amount is below zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Divide by a count, rounding half away from zero to the cent.
    ///
    /// Returns `None` when `count` is zero.
    #[must_use]
    pub fn div_round(self, count: u64) -> Option<Self> {
        if count == 0 {
            return None;
        }
        let count = i128::from(count);
        let value = i128::from(self.0);
        let rounded = if value >= 0 {
            (value * 2 + count) / (count * 2)
        } else {
            (value * 2 - count) / (count * 2)
        };
        i64::try_from(rounded).ok().map(Self)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_scaled(f, self.0, MONEY_SCALE)
    }
}

impl FromStr for Money {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_scaled(s, MONEY_SCALE).map(Self)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_i64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer
                .deserialize_any(ScaledVisitor {
                    scale: MONEY_SCALE,
                    expecting: "a decimal amount with at most 2 fractional digits",
                })
                .map(Self)
        } else {
            i64::deserialize(deserializer).map(Self)
        }
    }
}

// =============================================================================
// RATIO
// =============================================================================

/// A fraction in basis points (10_000 = 1.0).
///
/// Used for order discounts and product margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ratio(i64);

impl Ratio {
    /// 1.0
    pub const ONE: Self = Self(10_000);

    /// Create a ratio from basis points.
    #[must_use]
    pub const fn from_basis_points(bp: i64) -> Self {
        Self(bp)
    }

    /// Raw basis points.
    #[must_use]
    pub const fn basis_points(self) -> i64 {
        self.0
    }

    /// `(price - cost) / price`, truncated to a basis point.
    ///
    /// Returns `None` for a non-positive price.
    #[must_use]
    pub fn margin(price: Money, cost: Money) -> Option<Self> {
        if price.cents() <= 0 {
            return None;
        }
        let spread = i128::from(price.cents()) - i128::from(cost.cents());
        let bp = spread * i128::from(Self::ONE.0) / i128::from(price.cents());
        i64::try_from(bp).ok().map(Self)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_scaled(f, self.0, RATIO_SCALE)
    }
}

impl FromStr for Ratio {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_scaled(s, RATIO_SCALE).map(Self)
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_i64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer
                .deserialize_any(ScaledVisitor {
                    scale: RATIO_SCALE,
                    expecting: "a decimal fraction with at most 4 fractional digits",
                })
                .map(Self)
        } else {
            i64::deserialize(deserializer).map(Self)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
