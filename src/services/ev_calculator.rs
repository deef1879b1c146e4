use anyhow::Result;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::EdgeConfig;
use crate::db::{get_current_quotes, get_predictions, replace_opportunities};
use crate::models::{BestPrice, BettingOpportunity, OddsQuote, Prediction};
use crate::services::odds::{decimal_to_american, devig_implied_probability, implied_probability, OddsPrice};
use crate::teams::canonical_team_name;

pub const MONEYLINE_MARKET: &str = "h2h";

/// Full Kelly fraction for a decimal price.
///
/// Net odds at or below zero, and any non-finite result, give 0.0.
pub fn kelly_fraction(model_probability: f64, decimal_price: f64) -> f64 {
    let net_odds = (decimal_price - 1.0).max(0.0);
    let kelly = (model_probability * (net_odds + 1.0) - 1.0) / net_odds;
    if kelly.is_finite() {
        kelly
    } else {
        0.0
    }
}

/// Highest decimal price per (game, team) across sportsbooks.
///
/// Quotes that do not normalise to a payable price are dropped here, so the
/// side they belong to simply has no price.
pub fn best_prices(quotes: &[OddsQuote]) -> Vec<BestPrice> {
    let mut best: HashMap<(String, String), BestPrice> = HashMap::new();

    for quote in quotes {
        let decimal = match OddsPrice::from_stored(quote.price, &quote.price_format).and_then(|p| p.decimal()) {
            Ok(decimal) => decimal,
            Err(e) => {
                tracing::debug!(
                    "Skipping {} quote for {} in game {}: {}",
                    quote.sportsbook,
                    quote.team,
                    quote.game_id,
                    e
                );
                continue;
            }
        };

        let team = canonical_team_name(&quote.team);
        let key = (quote.game_id.clone(), team.clone());
        let candidate = BestPrice {
            game_id: quote.game_id.clone(),
            team,
            sportsbook: quote.sportsbook.clone(),
            decimal_price: decimal,
        };

        match best.get(&key) {
            Some(existing) if existing.decimal_price >= decimal => {}
            _ => {
                best.insert(key, candidate);
            }
        }
    }

    let mut prices: Vec<BestPrice> = best.into_values().collect();
    prices.sort_by(|a, b| a.game_id.cmp(&b.game_id).then_with(|| a.team.cmp(&b.team)));
    prices
}

pub struct EdgeCalculator {
    config: EdgeConfig,
}

impl EdgeCalculator {
    pub fn new(config: EdgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    pub fn implied_probability(&self, decimal_price: f64) -> f64 {
        match self.config.juice_factor {
            Some(juice) => devig_implied_probability(decimal_price, juice),
            None => implied_probability(decimal_price),
        }
    }

    /// Share of bankroll to stake: Kelly clipped to the cap, then scaled.
    pub fn stake_fraction(&self, model_probability: f64, decimal_price: f64) -> f64 {
        let clipped = kelly_fraction(model_probability, decimal_price).clamp(0.0, self.config.kelly_cap);
        (clipped * self.config.kelly_multiplier).max(0.0)
    }

    pub fn recommended_stake(&self, model_probability: f64, decimal_price: f64) -> f64 {
        (self.config.bankroll * self.stake_fraction(model_probability, decimal_price)).max(0.0)
    }

    /// Score one side of a game against its best price. `None` when the
    /// strict filter rejects it.
    pub fn evaluate_side(&self, model_probability: f64, price: &BestPrice) -> Option<BettingOpportunity> {
        let american = decimal_to_american(price.decimal_price);

        let probability = match &self.config.strict {
            Some(strict) => {
                let shrunk = 0.5 + (model_probability - 0.5) * strict.calibration_factor;
                if shrunk < strict.min_probability || shrunk > strict.max_probability {
                    return None;
                }
                if american.abs() <= strict.min_american_distance {
                    return None;
                }
                shrunk
            }
            None => model_probability,
        };

        let implied = self.implied_probability(price.decimal_price);
        let edge = probability - implied;
        let kelly = kelly_fraction(probability, price.decimal_price).clamp(0.0, self.config.kelly_cap);

        Some(BettingOpportunity {
            id: Uuid::new_v4().to_string(),
            game_id: price.game_id.clone(),
            team: price.team.clone(),
            sportsbook: price.sportsbook.clone(),
            decimal_price: price.decimal_price,
            american_price: american,
            implied_probability: implied,
            model_probability: probability,
            edge,
            edge_pct: edge * 100.0,
            kelly_fraction: kelly,
            recommended_stake: self.recommended_stake(probability, price.decimal_price),
            created_at: Utc::now(),
        })
    }

    /// Join predictions with prices and rank by edge.
    pub fn evaluate(&self, predictions: &[Prediction], prices: &[BestPrice]) -> Vec<BettingOpportunity> {
        let by_side: HashMap<(String, String), &BestPrice> = prices
            .iter()
            .map(|p| ((p.game_id.clone(), p.team.clone()), p))
            .collect();

        let min_edge = match (&self.config.strict, self.config.min_edge) {
            (_, Some(min_edge)) => Some(min_edge),
            (Some(_), None) => Some(0.0),
            (None, None) => None,
        };

        let mut opportunities = Vec::new();
        for prediction in predictions {
            let sides = [
                (&prediction.home_team, prediction.home_win_probability),
                (&prediction.away_team, prediction.away_win_probability),
            ];

            for (team, probability) in sides {
                let key = (prediction.game_id.clone(), canonical_team_name(team));
                let Some(price) = by_side.get(&key) else {
                    tracing::debug!("No price for {} in game {}", key.1, prediction.game_id);
                    continue;
                };

                if let Some(opp) = self.evaluate_side(probability, price) {
                    if min_edge.map_or(true, |min| opp.edge >= min) {
                        opportunities.push(opp);
                    }
                }
            }
        }

        opportunities.sort_by(|a, b| b.edge_pct.total_cmp(&a.edge_pct));

        if let Some(strict) = &self.config.strict {
            opportunities.truncate(strict.max_results);
        }
        opportunities
    }

    /// Recompute the opportunities table from stored predictions and the
    /// current quotes.
    pub async fn find_opportunities(&self, pool: &SqlitePool) -> Result<Vec<BettingOpportunity>> {
        let mut tx = pool.begin().await?;
        let opportunities = self.find_opportunities_in(&mut tx).await?;
        tx.commit().await?;
        Ok(opportunities)
    }

    pub async fn find_opportunities_in(&self, conn: &mut SqliteConnection) -> Result<Vec<BettingOpportunity>> {
        let predictions = get_predictions(&mut *conn).await?;
        let quotes = get_current_quotes(&mut *conn, MONEYLINE_MARKET).await?;
        let prices = best_prices(&quotes);

        let opportunities = self.evaluate(&predictions, &prices);
        replace_opportunities(conn, &opportunities).await?;

        tracing::info!(
            "Found {} opportunities from {} predictions and {} priced sides{}",
            opportunities.len(),
            predictions.len(),
            prices.len(),
            if self.config.strict.is_some() { " (strict)" } else { "" }
        );
        Ok(opportunities)
    }
}
