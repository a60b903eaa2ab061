//! Non-negative fixed-point monetary amount.
//!
//! Every amount entering the engine is a `rust_decimal::Decimal`, never a
//! float: the balancing invariant requires exact equality. Signedness lives
//! in journal legs (debit/credit) and running balances, not in amounts.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// A non-negative decimal amount.
///
/// # Invariant
/// The inner value is always >= 0, enforced by the constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new `Amount`, rejecting negative values.
    pub fn new(value: Decimal) -> LedgerResult<Self> {
        if value < Decimal::ZERO {
            Err(LedgerError::validation(format!(
                "amount cannot be negative: {value}"
            )))
        } else {
            Ok(Self(value))
        }
    }

    /// Create a new `Amount`, rejecting zero and negative values.
    ///
    /// Journal legs and fund/loan movements must be strictly positive.
    pub fn positive(value: Decimal) -> LedgerResult<Self> {
        if value <= Decimal::ZERO {
            Err(LedgerError::validation(format!(
                "amount must be positive: {value}"
            )))
        } else {
            Ok(Self(value))
        }
    }

    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Returns `None` if the result would be negative.
    pub fn checked_sub(&self, other: Amount) -> Option<Amount> {
        let result = self.0.checked_sub(other.0)?;
        if result < Decimal::ZERO {
            None
        } else {
            Some(Amount(result))
        }
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
