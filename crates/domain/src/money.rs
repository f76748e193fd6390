//! Currency-aware money and discounts.
//!
//! Amounts are held in minor units (cents) to avoid floating point issues.
//! Arithmetic between different currencies is an error, never a silent
//! conversion.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DomainError;

/// ISO 4217 currency code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    Try,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Try => "TRY",
        }
    }

    pub fn parse(code: &str) -> Result<Self, MoneyError> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "TRY" => Ok(Currency::Try),
            _ => Err(MoneyError::UnknownCurrency(code.to_string())),
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors raised by money arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Currency mismatch: {left} and {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Amount must not be negative: {0}")]
    NegativeAmount(i64),

    #[error("Percentage must be between 0 and 100, got {0}")]
    InvalidPercentage(u8),

    #[error("Amount overflow")]
    Overflow,
}

impl From<MoneyError> for DomainError {
    fn from(e: MoneyError) -> Self {
        DomainError::Validation(e.to_string())
    }
}

/// An amount of money in one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units (e.g., 1000 = 10.00).
    amount_minor: i64,
    currency: Currency,
}

impl Money {
    /// Creates a non-negative amount.
    pub fn new(amount_minor: i64, currency: Currency) -> Result<Self, MoneyError> {
        if amount_minor < 0 {
            return Err(MoneyError::NegativeAmount(amount_minor));
        }
        Ok(Self {
            amount_minor,
            currency,
        })
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount_minor: 0,
            currency,
        }
    }

    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    pub fn is_positive(&self) -> bool {
        self.amount_minor > 0
    }

    fn same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> {
        self.same_currency(&other)?;
        let amount_minor = self
            .amount_minor
            .checked_add(other.amount_minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money {
            amount_minor,
            currency: self.currency,
        })
    }

    /// Subtracts, clamping at zero.
    pub fn saturating_sub(&self, other: Money) -> Result<Money, MoneyError> {
        self.same_currency(&other)?;
        Ok(Money {
            amount_minor: (self.amount_minor - other.amount_minor).max(0),
            currency: self.currency,
        })
    }

    pub fn multiply(&self, quantity: u32) -> Result<Money, MoneyError> {
        let amount_minor = self
            .amount_minor
            .checked_mul(i64::from(quantity))
            .ok_or(MoneyError::Overflow)?;
        Ok(Money {
            amount_minor,
            currency: self.currency,
        })
    }

    /// Sums amounts that must all share `currency`.
    pub fn sum(currency: Currency, amounts: impl IntoIterator<Item = Money>) -> Result<Money, MoneyError> {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), |acc, amount| acc.checked_add(amount))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.amount_minor / 100,
            self.amount_minor % 100,
            self.currency
        )
    }
}

/// A reduction applied to an order subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Whole percent off, 0 to 100.
    Percentage(u8),

    /// A fixed amount off.
    Fixed(Money),
}

impl Discount {
    pub fn percentage(percent: u8) -> Result<Self, MoneyError> {
        if percent > 100 {
            return Err(MoneyError::InvalidPercentage(percent));
        }
        Ok(Discount::Percentage(percent))
    }

    pub fn fixed(amount: Money) -> Self {
        Discount::Fixed(amount)
    }

    /// Returns the discounted amount, never below zero.
    ///
    /// Percentage discounts round the reduction down to the minor unit.
    pub fn apply(&self, subtotal: Money) -> Result<Money, MoneyError> {
        match *self {
            Discount::Percentage(percent) => {
                if percent > 100 {
                    return Err(MoneyError::InvalidPercentage(percent));
                }
                let off = i128::from(subtotal.amount_minor) * i128::from(percent) / 100;
                let off = i64::try_from(off).map_err(|_| MoneyError::Overflow)?;
                Ok(Money {
                    amount_minor: subtotal.amount_minor - off,
                    currency: subtotal.currency,
                })
            }
            Discount::Fixed(amount) => subtotal.saturating_sub(amount),
        }
    }
}
