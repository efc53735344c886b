//! Monetary amounts with precise decimal arithmetic
//!
//! Expense amounts are always strictly positive and carried in a single
//! implicit currency. They use rust_decimal to avoid floating-point errors
//! and are normalised to two decimal places on construction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;
use thiserror::Error;

/// Number of decimal places kept for every amount
pub const AMOUNT_DECIMAL_PLACES: u32 = 2;

/// Errors that can occur when constructing an amount
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount must be positive, got {0}")]
    NotPositive(String),

    #[error("Invalid amount: {0}")]
    Invalid(String),
}

/// A strictly positive monetary amount
///
/// Zero and negative values are rejected at construction so every
/// `Amount` held by a domain type is a valid claim value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Creates a new amount, rounding to two decimal places
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        let rounded = value.round_dp(AMOUNT_DECIMAL_PLACES);
        if rounded <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value.to_string()));
        }
        Ok(Self(rounded))
    }

    /// Creates an amount from minor units (cents)
    pub fn from_minor(minor_units: i64) -> Result<Self, AmountError> {
        Self::new(Decimal::new(minor_units, AMOUNT_DECIMAL_PLACES))
    }

    /// Returns the decimal value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Sums a collection of amounts
    ///
    /// Returns zero for an empty collection, which is why the result is a
    /// plain `Decimal` rather than an `Amount`.
    pub fn total<'a>(amounts: impl IntoIterator<Item = &'a Amount>) -> Decimal {
        amounts.into_iter().map(|a| a.0).sum()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Decimal {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| AmountError::Invalid(s.to_string()))?;
        Amount::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Amount {
    type Output = Self;

    // Sum of two positive values stays positive.
    fn add(self, other: Self) -> Self {
        Self((self.0 + other.0).round_dp(AMOUNT_DECIMAL_PLACES))
    }
}
