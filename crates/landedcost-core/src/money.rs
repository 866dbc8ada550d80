//! Monetary arithmetic helpers
//!
//! All monetary values are fixed-point decimals. Rounding is half-up to
//! 4 decimal places, applied through [`round_money`] so every component
//! quantizes the same way.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::{Error, Result};

/// Number of decimal places every monetary amount is quantized to
pub const MONEY_SCALE: u32 = 4;

/// Round a monetary amount half-up to 4 decimal places
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert an amount with a base→quote FX rate (single multiplication)
pub fn convert(amount: Decimal, rate: Decimal) -> Decimal {
    amount * rate
}

/// Normalize a currency string to uppercase ISO-4217.
///
/// Extractor-side symbols map to their currency codes: `£` → GBP,
/// `€` → EUR, `$` → USD.
pub fn normalize_currency(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let mapped = match trimmed {
        "£" => "GBP",
        "€" => "EUR",
        "$" => "USD",
        other => other,
    };

    let code = mapped.to_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Error::Contract(format!("Unparseable currency: {:?}", raw)));
    }
    Ok(code)
}
