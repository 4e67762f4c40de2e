//! Money helpers built on decimal arithmetic.
//!
//! Prices are stored as [`Decimal`] in the currency's standard unit (birr,
//! not santim). Gateways want integer minor units, so conversion happens
//! only at the gateway boundary via [`to_minor_units`].
//!
//! Every stored amount fits `NUMERIC(12, 2)`, i.e. at most [`MAX_AMOUNT`].
//! Arithmetic on amounts is checked and reports overflow as `None`.

use core::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Largest amount a price or order total may hold (`NUMERIC(12, 2)`).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

/// An amount or total left the range [`MAX_AMOUNT`] allows.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("amount is out of range (at most 9999999999.99)")]
pub struct AmountOutOfRange;

/// Whether `amount` is non-negative and fits once rounded to cents.
#[must_use]
pub fn is_storable_amount(amount: Decimal) -> bool {
    amount >= Decimal::ZERO && amount.round_dp(2) <= MAX_AMOUNT
}

/// Currencies the storefront can charge in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// Ethiopian birr.
    #[default]
    Etb,
    /// US dollar.
    Usd,
    /// Indian rupee (Razorpay's settlement currency).
    Inr,
}

impl Currency {
    /// Lower-case ISO 4217 code, as Stripe expects it.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Etb => "etb",
            Self::Usd => "usd",
            Self::Inr => "inr",
        }
    }

    /// Upper-case ISO 4217 code, as Razorpay expects it.
    #[must_use]
    pub const fn upper_code(self) -> &'static str {
        match self {
            Self::Etb => "ETB",
            Self::Usd => "USD",
            Self::Inr => "INR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "etb" | "birr" => Ok(Self::Etb),
            "usd" => Ok(Self::Usd),
            "inr" => Ok(Self::Inr),
            other => Err(format!("unsupported currency '{other}'")),
        }
    }
}

/// Resolve the `original_price` to persist for a price pair.
///
/// A product is on sale only while `original_price` exceeds `price`; in
/// every other case the original price is dropped so the listing never
/// shows a fake or inverted discount.
///
/// ```
/// use rust_decimal::Decimal;
/// use merkato_core::sale_price;
///
/// let price = Decimal::new(80, 0);
/// assert_eq!(sale_price(price, Some(Decimal::new(100, 0))), Some(Decimal::new(100, 0)));
/// assert_eq!(sale_price(price, Some(Decimal::new(80, 0))), None);
/// assert_eq!(sale_price(price, None), None);
/// ```
#[must_use]
pub fn sale_price(price: Decimal, original_price: Option<Decimal>) -> Option<Decimal> {
    original_price.filter(|original| price < *original)
}

/// Price times quantity for one line, `None` on overflow.
#[must_use]
pub fn line_total(price: Decimal, quantity: u32) -> Option<Decimal> {
    price.checked_mul(Decimal::from(quantity))
}

/// Sum of amounts, `None` on overflow.
#[must_use]
pub fn checked_sum<I>(amounts: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, Decimal::checked_add)
}

/// Convert a standard-unit amount to integer minor units (x100, half away
/// from zero).
///
/// Returns `None` if the amount does not fit in an `i64`.
#[must_use]
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}
