use thiserror::Error;

/// Bookmaker margin multiplier used when de-vigging is switched on.
pub const DEFAULT_JUICE_FACTOR: f64 = 1.045;

#[derive(Debug, Error, PartialEq)]
pub enum OddsError {
    #[error("price {0} has no usable payout (decimal must be > 1.0)")]
    DegeneratePrice(f64),
    #[error("unknown price format '{0}'")]
    UnknownFormat(String),
}

/// A bookmaker price in either of the two formats feeds deliver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OddsPrice {
    American(i32),
    Decimal(f64),
}

impl OddsPrice {
    /// Build from the `(price, price_format)` pair stored in the odds table.
    pub fn from_stored(price: f64, format: &str) -> Result<Self, OddsError> {
        match format.to_lowercase().as_str() {
            "american" | "us" => {
                if !price.is_finite() {
                    return Err(OddsError::DegeneratePrice(price));
                }
                Ok(OddsPrice::American(price.round() as i32))
            }
            "decimal" | "eu" => Ok(OddsPrice::Decimal(price)),
            other => Err(OddsError::UnknownFormat(other.to_string())),
        }
    }

    /// Decimal price, rejecting anything that cannot pay out.
    pub fn decimal(&self) -> Result<f64, OddsError> {
        let decimal = match *self {
            OddsPrice::American(american) => american_to_decimal(american),
            OddsPrice::Decimal(decimal) => decimal,
        };
        if !decimal.is_finite() || decimal <= 1.0 {
            return Err(OddsError::DegeneratePrice(decimal));
        }
        Ok(decimal)
    }
}

/// +150 -> 2.50, -200 -> 1.50
pub fn american_to_decimal(price: i32) -> f64 {
    if price >= 0 {
        1.0 + price as f64 / 100.0
    } else {
        1.0 + 100.0 / (price as f64).abs()
    }
}

/// 2.50 -> +150, 1.50 -> -200
pub fn decimal_to_american(decimal: f64) -> i64 {
    if decimal >= 2.0 {
        ((decimal - 1.0) * 100.0).round() as i64
    } else {
        -(100.0 / (decimal - 1.0)).round() as i64
    }
}

/// Probability embedded in a decimal price, margin included.
///
/// No guard: a decimal of 1.0 or less gives a meaningless result, callers
/// go through [`OddsPrice::decimal`] first.
pub fn implied_probability(decimal: f64) -> f64 {
    1.0 / decimal
}

/// Implied probability with a flat bookmaker margin taken out: `1/d`
/// divided (not multiplied) by `juice_factor`, so 1.045 scales it down.
pub fn devig_implied_probability(decimal: f64, juice_factor: f64) -> f64 {
    implied_probability(decimal) / juice_factor
}
