//! Fixed-scale decimal money, currencies, and basis-point ratios.
//!
//! Spec §4.5 forbids floating point anywhere in the monetary path. We use
//! `rust_decimal::Decimal` (18-digit precision) exactly as the teacher does
//! for payment amounts in `ledger-core::types::LedgerEvent`, scaled to 2
//! decimal places for currency display, with banker's rounding
//! (`RoundingStrategy::MidpointNearestEven`) on the final step of any
//! division — never mid-calculation.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency scale used for all money values (cents).
pub const CURRENCY_SCALE: u32 = 2;

/// ISO 4217-ish currency code.
///
/// `#[non_exhaustive]` so new corridors can be added without breaking
/// downstream matches, mirroring `ledger-core::types::Currency`. Indonesia-
/// based Sharia cooperatives transact primarily in `IDR`; the remaining
/// variants cover the cross-border investors the platform's KYC allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// Indonesian Rupiah — the cooperative's home currency.
    IDR,
    /// US Dollar.
    USD,
    /// Singapore Dollar.
    SGD,
    /// Malaysian Ringgit.
    MYR,
    /// Euro.
    EUR,
}

impl Currency {
    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::IDR => "IDR",
            Currency::USD => "USD",
            Currency::SGD => "SGD",
            Currency::MYR => "MYR",
            Currency::EUR => "EUR",
        }
    }

    /// Parse from an ISO 4217 code.
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "IDR" => Some(Currency::IDR),
            "USD" => Some(Currency::USD),
            "SGD" => Some(Currency::SGD),
            "MYR" => Some(Currency::MYR),
            "EUR" => Some(Currency::EUR),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A monetary amount tagged with its currency.
///
/// Arithmetic between two `Money` values of different currencies panics in
/// debug builds via the `assert_eq!` in `checked_add`/`checked_sub` — the
/// engine never converts currencies mid-calculation (spec §4.5), so a
/// mismatch here is a programming error, not a runtime condition to recover
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Construct a new amount, rescaling to the currency scale.
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointNearestEven),
            currency,
        }
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// The underlying decimal amount.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// The currency this amount is denominated in.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Checked addition; `None` on currency mismatch.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::new(self.amount + other.amount, self.currency))
    }

    /// Checked subtraction; `None` on currency mismatch.
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::new(self.amount - other.amount, self.currency))
    }

    /// Whether this amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// A percentage expressed in basis points (`0..=10_000`), never as a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BasisPoints(u32);

/// Denominator of one basis-point unit (100.00%).
pub const BASIS_POINTS_WHOLE: u32 = 10_000;

impl BasisPoints {
    /// Construct from a raw `0..=10_000` value.
    pub fn new(bps: u32) -> Option<Self> {
        (bps <= BASIS_POINTS_WHOLE).then_some(Self(bps))
    }

    /// The raw basis-point value.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Apply this ratio to a decimal amount without rounding (caller rounds).
    pub fn apply(&self, amount: Decimal) -> Decimal {
        amount * Decimal::from(self.0) / Decimal::from(BASIS_POINTS_WHOLE)
    }
}

/// The three-way profit split from spec §4.4/§4.5: investor / business /
/// cooperative shares as basis points that must sum to exactly 10,000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingRatio {
    /// Share routed to investors, in basis points.
    pub investor_bps: u32,
    /// Share routed to the business owner, in basis points.
    pub business_bps: u32,
    /// Share routed to the cooperative, in basis points.
    pub cooperative_bps: u32,
}

impl SharingRatio {
    /// Construct a ratio, validating it sums to exactly 10,000 bps.
    pub fn new(investor_bps: u32, business_bps: u32, cooperative_bps: u32) -> crate::Result<Self> {
        let ratio = Self { investor_bps, business_bps, cooperative_bps };
        ratio.validate()?;
        Ok(ratio)
    }

    /// Validate the sum-to-one invariant (spec §4.4 step 1).
    pub fn validate(&self) -> crate::Result<()> {
        let total = self.investor_bps as u64 + self.business_bps as u64 + self.cooperative_bps as u64;
        if total != BASIS_POINTS_WHOLE as u64 {
            return Err(crate::Error::RatiosDoNotSumToOne(format!(
                "investor({}) + business({}) + cooperative({}) = {} bps, expected {}",
                self.investor_bps, self.business_bps, self.cooperative_bps, total, BASIS_POINTS_WHOLE
            )));
        }
        Ok(())
    }
}

/// Round a decimal to the currency scale using banker's rounding
/// (round-half-to-even), the only rounding strategy used on the final step
/// of any division in the engine.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharing_ratio_must_sum_to_whole() {
        assert!(SharingRatio::new(6000, 3000, 1000).is_ok());
        assert!(SharingRatio::new(6000, 3000, 500).is_err());
    }

    #[test]
    fn money_rejects_cross_currency_arithmetic() {
        let idr = Money::new(Decimal::from(100), Currency::IDR);
        let usd = Money::new(Decimal::from(100), Currency::USD);
        assert!(idr.checked_add(usd).is_none());
    }

    #[test]
    fn banker_rounding_rounds_half_to_even() {
        // 12.345 sits exactly halfway between 12.34 and 12.35; banker's
        // rounding picks the even neighbor, 12.34.
        assert_eq!(round_currency(Decimal::new(12345, 3)), Decimal::new(1234, 2));
        // 12.335 picks 12.34 (4 is even) over 12.33.
        assert_eq!(round_currency(Decimal::new(12335, 3)), Decimal::new(1234, 2));
    }
}
