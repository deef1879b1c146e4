use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

use crate::services::odds::DEFAULT_JUICE_FACTOR;

/// Stake sizing and filtering knobs for the edge calculator.
///
/// Built once from the environment (`.env` is loaded by `main`) and handed
/// to the calculator explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeConfig {
    pub bankroll: f64,
    /// Rows with a fractional edge below this are dropped. `None` keeps all.
    pub min_edge: Option<f64>,
    /// Divide implied probabilities by this to strip bookmaker margin.
    pub juice_factor: Option<f64>,
    pub kelly_cap: f64,
    pub kelly_multiplier: f64,
    pub strict: Option<StrictFilter>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            bankroll: 1000.0,
            min_edge: None,
            juice_factor: None,
            kelly_cap: 0.10,
            kelly_multiplier: 0.25,
            strict: None,
        }
    }
}

/// Tighter variant: shrink toward a coin flip, skip long shots, heavy
/// favourites and near pick'em lines, keep only the best few.
#[derive(Debug, Clone, PartialEq)]
pub struct StrictFilter {
    pub calibration_factor: f64,
    pub min_probability: f64,
    pub max_probability: f64,
    /// Quotes with |American price| at or under this are skipped.
    pub min_american_distance: i64,
    pub max_results: usize,
}

impl Default for StrictFilter {
    fn default() -> Self {
        Self {
            calibration_factor: 0.7,
            min_probability: 0.35,
            max_probability: 0.75,
            min_american_distance: 110,
            max_results: 5,
        }
    }
}

impl EdgeConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let juice_factor = match env::var("JUICE_FACTOR") {
            Ok(raw) if raw.eq_ignore_ascii_case("default") => Some(DEFAULT_JUICE_FACTOR),
            Ok(raw) => Some(parse_var("JUICE_FACTOR", &raw)?),
            Err(_) => None,
        };

        let config = Self {
            bankroll: env_or("BANKROLL", defaults.bankroll)?,
            min_edge: env_opt("MIN_EDGE")?,
            juice_factor,
            kelly_cap: env_or("KELLY_CAP", defaults.kelly_cap)?,
            kelly_multiplier: env_or("KELLY_MULTIPLIER", defaults.kelly_multiplier)?,
            strict: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict.then(StrictFilter::default);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.bankroll.is_finite() || self.bankroll < 0.0 {
            anyhow::bail!("bankroll must be a non-negative amount, got {}", self.bankroll);
        }
        if !(0.0..=1.0).contains(&self.kelly_cap) {
            anyhow::bail!("KELLY_CAP must be within [0, 1], got {}", self.kelly_cap);
        }
        if !(0.0..=1.0).contains(&self.kelly_multiplier) {
            anyhow::bail!("KELLY_MULTIPLIER must be within [0, 1], got {}", self.kelly_multiplier);
        }
        if let Some(juice) = self.juice_factor {
            if juice < 1.0 {
                anyhow::bail!("JUICE_FACTOR must be at least 1.0, got {}", juice);
            }
        }
        Ok(())
    }
}

pub fn database_url() -> String {
    env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/oddsedge.db".to_string())
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => parse_var(key, &raw),
        Err(_) => Ok(default),
    }
}

fn env_opt<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key).ok().map(|raw| parse_var(key, &raw)).transpose()
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("invalid value for {}: '{}'", key, raw))
}
