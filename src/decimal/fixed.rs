use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of fractional digits every stored value carries
pub const SCALE: u32 = 8;

/// Fractional digits kept when parsing text. Half-up rounding at eight places
/// only looks at the ninth digit, so anything past this is noise.
const MAX_PARSED_FRACTION: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecimalError {
    #[error("cannot convert {0:?} to a fixed decimal")]
    Conversion(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("decimal overflow")]
    Overflow,
}

/// Round to eight fractional digits, ties away from zero.
///
/// Stateless and idempotent: `quantize(quantize(x)) == quantize(x)`.
pub fn quantize(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(SCALE);
    rounded
}

// `rescale` quietly drops fractional digits once the mantissa is full
fn quantize_checked(value: Decimal) -> Result<Decimal, DecimalError> {
    let rounded = quantize(value);
    if rounded.scale() != SCALE {
        return Err(DecimalError::Overflow);
    }
    Ok(rounded)
}

/// Signed decimal held at exactly eight fractional digits.
///
/// Every value that enters the accounting core goes through
/// [`FixedDecimal::of`], and every arithmetic result is re-quantized before it
/// is returned, so fees, quantities and P&L are reproducible regardless of
/// whether the caller started from an integer, a float or a string.
///
/// Magnitudes above [`FixedDecimal::MAX`] (about 7.9e20) are rejected by
/// `of` and the `checked_*` methods. The operators panic on them, as
/// `rust_decimal`'s own operators do on overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedDecimal(Decimal);

impl FixedDecimal {
    pub const ZERO: FixedDecimal = FixedDecimal(Decimal::from_parts(0, 0, 0, false, SCALE));
    pub const ONE: FixedDecimal = FixedDecimal(Decimal::from_parts(100_000_000, 0, 0, false, SCALE));
    pub const TEN: FixedDecimal = FixedDecimal(Decimal::from_parts(1_000_000_000, 0, 0, false, SCALE));
    pub const MAX: FixedDecimal = FixedDecimal(Decimal::from_parts(u32::MAX, u32::MAX, u32::MAX, false, SCALE));

    /// Canonical constructor for integers, floats, text and decimals.
    ///
    /// # Example
    /// ```
    /// use spotguard::decimal::FixedDecimal;
    ///
    /// let fee = FixedDecimal::of(0.123456785).unwrap();
    /// assert_eq!(fee.to_string(), "0.12345679");
    /// assert!(FixedDecimal::of(f64::NAN).is_err());
    /// ```
    pub fn of<T: IntoFixed>(value: T) -> Result<Self, DecimalError> {
        value.into_decimal().and_then(quantize_checked).map(Self)
    }

    pub fn inner(&self) -> Decimal {
        self.0
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, DecimalError> {
        Self::settle(self.0.checked_add(rhs.0))
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, DecimalError> {
        Self::settle(self.0.checked_sub(rhs.0))
    }

    pub fn checked_mul(self, rhs: Self) -> Result<Self, DecimalError> {
        Self::settle(self.0.checked_mul(rhs.0))
    }

    pub fn checked_div(self, rhs: Self) -> Result<Self, DecimalError> {
        if rhs.is_zero() {
            return Err(DecimalError::DivisionByZero);
        }
        Self::settle(self.0.checked_div(rhs.0))
    }

    fn settle(raw: Option<Decimal>) -> Result<Self, DecimalError> {
        raw.ok_or(DecimalError::Overflow)
            .and_then(quantize_checked)
            .map(Self)
    }

    fn expect_fits(result: Result<Self, DecimalError>, op: &str) -> Self {
        match result {
            Ok(value) => value,
            Err(e) => panic!("FixedDecimal {}: {}", op, e),
        }
    }

    /// Lossy view for log lines and percentages; never fed back into accounting
    pub fn to_f64(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }
}

impl Default for FixedDecimal {
    fn default() -> Self {
        Self::ZERO
    }
}

/// # Panics
/// If `value` is above [`FixedDecimal::MAX`]; use [`FixedDecimal::of`] for
/// untrusted input.
impl From<Decimal> for FixedDecimal {
    fn from(value: Decimal) -> Self {
        Self::expect_fits(Self::of(value), "conversion")
    }
}

impl From<FixedDecimal> for Decimal {
    fn from(value: FixedDecimal) -> Self {
        value.0
    }
}

impl FromStr for FixedDecimal {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::of(s)
    }
}

impl TryFrom<f64> for FixedDecimal {
    type Error = DecimalError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::of(value)
    }
}

impl fmt::Display for FixedDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Add for FixedDecimal {
    type Output = FixedDecimal;

    fn add(self, rhs: Self) -> Self::Output {
        Self::expect_fits(self.checked_add(rhs), "add")
    }
}

impl Sub for FixedDecimal {
    type Output = FixedDecimal;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::expect_fits(self.checked_sub(rhs), "sub")
    }
}

impl Mul for FixedDecimal {
    type Output = FixedDecimal;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::expect_fits(self.checked_mul(rhs), "mul")
    }
}

impl Neg for FixedDecimal {
    type Output = FixedDecimal;

    fn neg(self) -> Self::Output {
        Self::ZERO - self
    }
}

impl AddAssign for FixedDecimal {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for FixedDecimal {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Sum for FixedDecimal {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, value| acc + value)
    }
}

impl<'a> Sum<&'a FixedDecimal> for FixedDecimal {
    fn sum<I: Iterator<Item = &'a FixedDecimal>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for FixedDecimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FixedDecimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FixedDecimalVisitor)
    }
}

struct FixedDecimalVisitor;

impl<'de> Visitor<'de> for FixedDecimalVisitor {
    type Value = FixedDecimal;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal number or numeric string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        FixedDecimal::of(v).map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        FixedDecimal::of(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        FixedDecimal::of(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        FixedDecimal::of(v).map_err(E::custom)
    }
}

/// Anything [`FixedDecimal::of`] accepts
pub trait IntoFixed {
    fn into_decimal(self) -> Result<Decimal, DecimalError>;
}

impl IntoFixed for FixedDecimal {
    fn into_decimal(self) -> Result<Decimal, DecimalError> {
        Ok(self.0)
    }
}

impl IntoFixed for Decimal {
    fn into_decimal(self) -> Result<Decimal, DecimalError> {
        Ok(self)
    }
}

macro_rules! into_fixed_int {
    ($($t:ty),*) => {
        $(
            impl IntoFixed for $t {
                fn into_decimal(self) -> Result<Decimal, DecimalError> {
                    Ok(Decimal::from(self))
                }
            }
        )*
    };
}

into_fixed_int!(i32, i64, u32, u64, usize);

// Floats go through their shortest round-trip text, the same digits a person
// would have typed, instead of the binary expansion.
impl IntoFixed for f64 {
    fn into_decimal(self) -> Result<Decimal, DecimalError> {
        if !self.is_finite() {
            return Err(DecimalError::Conversion(self.to_string()));
        }
        parse_text(&self.to_string())
    }
}

impl IntoFixed for f32 {
    fn into_decimal(self) -> Result<Decimal, DecimalError> {
        if !self.is_finite() {
            return Err(DecimalError::Conversion(self.to_string()));
        }
        parse_text(&self.to_string())
    }
}

impl IntoFixed for &str {
    fn into_decimal(self) -> Result<Decimal, DecimalError> {
        parse_text(self)
    }
}

impl IntoFixed for String {
    fn into_decimal(self) -> Result<Decimal, DecimalError> {
        parse_text(&self)
    }
}

impl IntoFixed for &String {
    fn into_decimal(self) -> Result<Decimal, DecimalError> {
        parse_text(self)
    }
}

fn parse_text(text: &str) -> Result<Decimal, DecimalError> {
    let conversion = || DecimalError::Conversion(text.to_string());
    let trimmed = text.trim();

    if trimmed.is_empty() || !trimmed.is_ascii() {
        return Err(conversion());
    }

    if trimmed.contains(['e', 'E']) {
        return Decimal::from_scientific(trimmed).map_err(|_| conversion());
    }

    let cut = match trimmed.find('.') {
        Some(dot) if trimmed.len() > dot + 1 + MAX_PARSED_FRACTION => {
            &trimmed[..dot + 1 + MAX_PARSED_FRACTION]
        }
        _ => trimmed,
    };

    Decimal::from_str(cut).map_err(|_| conversion())
}
