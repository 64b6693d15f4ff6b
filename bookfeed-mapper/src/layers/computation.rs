//! Constants for computed strategies
//!
//! Each layer may carry a partial `[computation]` section; the effective
//! settings merge field-by-field with imprint > publisher > global > compiled
//! default.

use crate::types::decimal_from_f64;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Partial `[computation]` section of one layer document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComputationOverrides {
    pub base_currency: Option<String>,
    /// Territory code → currency and exchange rate from the base currency
    pub territories: BTreeMap<String, TerritoryRateConfig>,
    pub publication_offset_days: Option<i64>,
    pub street_date_offset_days: Option<i64>,
    /// Inches per page
    pub page_thickness_in: Option<f64>,
    /// Pounds per square inch of trim per page
    pub paper_weight_lb_per_sq_in: Option<f64>,
    pub asset_path_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerritoryRateConfig {
    pub currency: String,
    pub rate: f64,
}

/// Exchange rate for one territory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerritoryRate {
    pub currency: String,
    pub rate: Decimal,
}

/// Effective computation settings for a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputationSettings {
    pub base_currency: String,
    pub territories: BTreeMap<String, TerritoryRate>,
    pub publication_offset_days: i64,
    pub street_date_offset_days: i64,
    pub page_thickness_in: Decimal,
    pub paper_weight_lb_per_sq_in: Decimal,
    pub asset_path_prefix: String,
}

impl Default for ComputationSettings {
    fn default() -> Self {
        let territories = [
            ("us", "USD", Decimal::ONE),
            ("uk", "GBP", Decimal::new(79, 2)),
            ("eu", "EUR", Decimal::new(92, 2)),
            ("ca", "CAD", Decimal::new(136, 2)),
            ("au", "AUD", Decimal::new(152, 2)),
            ("jp", "JPY", Decimal::new(151, 0)),
        ]
        .into_iter()
        .map(|(code, currency, rate)| {
            (
                code.to_string(),
                TerritoryRate {
                    currency: currency.to_string(),
                    rate,
                },
            )
        })
        .collect();

        Self {
            base_currency: "USD".to_string(),
            territories,
            publication_offset_days: 90,
            street_date_offset_days: 0,
            // 50 lb white offset stock
            page_thickness_in: Decimal::new(2252, 6),
            paper_weight_lb_per_sq_in: Decimal::new(58, 6),
            asset_path_prefix: String::new(),
        }
    }
}

impl ComputationSettings {
    /// Merge layer sections onto the compiled defaults, lowest precedence first
    pub fn merged<'a, I>(sections: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = &'a ComputationOverrides>,
    {
        let mut settings = Self::default();
        for section in sections {
            settings.apply(section)?;
        }
        Ok(settings)
    }

    fn apply(&mut self, section: &ComputationOverrides) -> Result<(), String> {
        if let Some(currency) = &section.base_currency {
            self.base_currency = currency.trim().to_uppercase();
        }
        for (code, config) in &section.territories {
            let rate = positive_decimal(config.rate)
                .ok_or_else(|| format!("territory '{}' has invalid rate {}", code, config.rate))?;
            self.territories.insert(
                code.trim().to_lowercase(),
                TerritoryRate {
                    currency: config.currency.trim().to_uppercase(),
                    rate,
                },
            );
        }
        if let Some(days) = section.publication_offset_days {
            self.publication_offset_days = days;
        }
        if let Some(days) = section.street_date_offset_days {
            self.street_date_offset_days = days;
        }
        if let Some(thickness) = section.page_thickness_in {
            self.page_thickness_in = positive_decimal(thickness)
                .ok_or_else(|| format!("invalid page_thickness_in {}", thickness))?;
        }
        if let Some(weight) = section.paper_weight_lb_per_sq_in {
            self.paper_weight_lb_per_sq_in = positive_decimal(weight)
                .ok_or_else(|| format!("invalid paper_weight_lb_per_sq_in {}", weight))?;
        }
        if let Some(prefix) = &section.asset_path_prefix {
            self.asset_path_prefix = prefix.clone();
        }
        Ok(())
    }

    pub fn territory(&self, code: &str) -> Option<&TerritoryRate> {
        self.territories.get(code)
    }

    /// Schema field name carrying a territory's list price
    pub fn price_field(territory: &str) -> String {
        format!("{}_list_price", territory)
    }
}

fn positive_decimal(value: f64) -> Option<Decimal> {
    decimal_from_f64(value).filter(|d| *d > Decimal::ZERO)
}
