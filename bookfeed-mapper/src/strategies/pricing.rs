//! Territorial pricing
//!
//! `price = round(base × rate, 2)` in the territory's currency. Rendering
//! follows the currency's minor units (JPY has none).

use super::{prerequisite_decimal, ComputationError};
use crate::layers::ComputationSettings;
use crate::record::MetadataRecord;
use crate::types::FieldValue;
use rust_decimal::{Decimal, RoundingStrategy};

/// Field holding the base list price
pub const BASE_PRICE_FIELD: &str = "list_price";

/// Currencies without a minor unit
const ZERO_DECIMAL_CURRENCIES: &[&str] = &["JPY", "KRW", "ISK", "CLP", "VND"];

pub fn currency_minor_units(currency: &str) -> u32 {
    if ZERO_DECIMAL_CURRENCIES
        .iter()
        .any(|c| c.eq_ignore_ascii_case(currency))
    {
        0
    } else {
        2
    }
}

/// Catalog text for an amount in a currency
pub fn format_amount(amount: Decimal, currency: &str) -> String {
    let units = currency_minor_units(currency);
    let rounded = amount.round_dp_with_strategy(units, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", units as usize, rounded)
}

/// Base price converted at the territory's configured rate
pub fn territorial_price(
    record: &MetadataRecord,
    settings: &ComputationSettings,
    territory: &str,
) -> Result<FieldValue, ComputationError> {
    let base = prerequisite_decimal(record, BASE_PRICE_FIELD)?;

    if let Some(FieldValue::Price { currency, .. }) = record.value(BASE_PRICE_FIELD) {
        if !currency.eq_ignore_ascii_case(&settings.base_currency) {
            return Err(ComputationError::InvalidPrerequisite {
                field: BASE_PRICE_FIELD.to_string(),
                reason: format!(
                    "priced in {} but exchange rates are from {}",
                    currency, settings.base_currency
                ),
            });
        }
    }

    let rate = settings
        .territory(territory)
        .ok_or_else(|| ComputationError::UnknownTerritory(territory.to_string()))?;

    let amount = base
        .checked_mul(rate.rate)
        .ok_or_else(|| ComputationError::InvalidPrerequisite {
            field: BASE_PRICE_FIELD.to_string(),
            reason: format!("{} × {} is out of range", base, rate.rate),
        })?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Ok(FieldValue::Price {
        amount,
        currency: rate.currency.clone(),
    })
}
