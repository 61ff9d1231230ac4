//! Type-safe price representation using decimal arithmetic.
//!
//! Cart totals are kept in the storefront's *major* currency unit (cedis for
//! GHS). The payment gateway works in *minor* units (pesewas), and the only
//! conversion between the two happens at payment submission via
//! [`Price::to_minor_units`].

use core::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Number of minor units in one major unit for every supported currency.
const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., cedis, not pesewas).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// Build a price from an integer amount of minor units.
    #[must_use]
    pub fn from_minor_units(minor: i64, currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::new(minor, 2), currency_code)
    }

    /// Convert to the gateway's integer minor units (`amount × 100`).
    ///
    /// Sub-minor fractions are rounded half-to-even. Returns `None` if the
    /// result does not fit in an `i64`.
    #[must_use]
    pub fn to_minor_units(&self) -> Option<i64> {
        self.amount
            .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))?
            .round()
            .to_i64()
    }

    /// Format for display (e.g., `GH₵1,234.50`).
    #[must_use]
    pub fn display(&self) -> String {
        format_amount(self.amount, self.currency_code)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// ISO 4217 currency codes accepted by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    GHS,
    NGN,
    USD,
    EUR,
    GBP,
}

impl CurrencyCode {
    /// Display symbol, as rendered by the `en-GH` locale.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::GHS => "GH₵",
            Self::NGN => "₦",
            Self::USD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// The three-letter code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::GHS => "GHS",
            Self::NGN => "NGN",
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
        }
    }
}

/// Format a major-unit amount with grouping separators and two decimals.
#[must_use]
pub fn format_amount(amount: Decimal, currency: CurrencyCode) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let digits = format!("{:.2}", rounded.abs());
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}{}{grouped}.{fraction}", currency.symbol())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_to_minor_units() {
        let price = Price::new(Decimal::new(55_050, 2), CurrencyCode::GHS);
        assert_eq!(price.to_minor_units(), Some(55_050));

        let whole = Price::new(Decimal::from(500), CurrencyCode::GHS);
        assert_eq!(whole.to_minor_units(), Some(50_000));
    }

    #[test]
    fn test_to_minor_units_out_of_range() {
        let max = Price::new(Decimal::MAX, CurrencyCode::GHS);
        assert_eq!(max.to_minor_units(), None);

        let too_big = Price::new(Decimal::from(i64::MAX), CurrencyCode::GHS);
        assert_eq!(too_big.to_minor_units(), None);
    }

    #[test]
    fn test_to_minor_units_rounds_sub_pesewa() {
        let price = Price::new(Decimal::new(10_005, 3), CurrencyCode::GHS);
        // 10.005 * 100 = 1000.5, banker's rounding goes to the even 1000
        assert_eq!(price.to_minor_units(), Some(1000));
    }

    #[test]
    fn test_from_minor_units() {
        let price = Price::from_minor_units(12_345, CurrencyCode::GHS);
        assert_eq!(price.amount, Decimal::new(12_345, 2));
    }

    #[test]
    fn test_display_groups_thousands() {
        let price = Price::new(Decimal::new(123_450, 2), CurrencyCode::GHS);
        assert_eq!(price.display(), "GH₵1,234.50");

        let big = Price::new(Decimal::from(1_000_000), CurrencyCode::USD);
        assert_eq!(big.to_string(), "$1,000,000.00");
    }

    #[test]
    fn test_display_small_and_negative() {
        assert_eq!(format_amount(Decimal::ZERO, CurrencyCode::GHS), "GH₵0.00");
        assert_eq!(format_amount(Decimal::new(-505, 1), CurrencyCode::GHS), "-GH₵50.50");
        assert_eq!(format_amount(Decimal::from(999), CurrencyCode::GHS), "GH₵999.00");
    }
}
