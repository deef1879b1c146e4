use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub season: String, // "2025-26"
    pub home_team: String,
    pub away_team: String,
    pub scheduled_at: DateTime<Utc>,
    pub home_score: Option<i32>, // Both null until the game is final
    pub away_score: Option<i32>,
}

impl Game {
    /// `None` for unplayed games.
    pub fn home_win(&self) -> Option<bool> {
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) => Some(h > a),
            _ => None,
        }
    }

    /// Scores must be either both present or both absent.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.home_score.is_some() != self.away_score.is_some() {
            anyhow::bail!(
                "game {} has only one final score ({:?}-{:?})",
                self.id,
                self.home_score,
                self.away_score
            );
        }
        Ok(())
    }
}

/// A game joined with both teams' power ratings for its season.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatedGame {
    pub game: Game,
    pub home_rating: Option<f64>,
    pub away_rating: Option<f64>,
}

impl RatedGame {
    /// `None` when either side has no rating.
    pub fn power_diff(&self) -> Option<f64> {
        match (self.home_rating, self.away_rating) {
            (Some(home), Some(away)) => Some(home - away),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsQuote {
    pub game_id: String,
    pub team: String,
    pub sportsbook: String,
    pub market: String, // "h2h"
    pub price: f64,
    pub price_format: String, // "american" or "decimal"
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerRating {
    pub team: String,
    pub season: String,
    pub rating: f64,
    pub games_played: i32,
    pub wins: i32,
    pub losses: i32,
    pub points_for_avg: f64,
    pub points_against_avg: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    pub model_version: String,
    pub intercept: f64,
    pub slope: f64,
    pub training_rows: i64,
    pub iterations: i64,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub game_id: String,
    pub home_team: String,
    pub away_team: String,
    pub power_diff: f64,
    pub home_win_probability: f64,
    pub away_win_probability: f64,
    pub predicted_winner: String,
    pub confidence: f64,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingOpportunity {
    pub id: String,
    pub game_id: String,
    pub team: String,
    pub sportsbook: String,
    pub decimal_price: f64,
    pub american_price: i64,
    pub implied_probability: f64,
    pub model_probability: f64,
    /// Fractional edge (model minus implied).
    pub edge: f64,
    pub edge_pct: f64,
    pub kelly_fraction: f64,
    pub recommended_stake: f64,
    pub created_at: DateTime<Utc>,
}

/// Best currently available price for one side of a game.
#[derive(Debug, Clone, PartialEq)]
pub struct BestPrice {
    pub game_id: String,
    pub team: String,
    pub sportsbook: String,
    pub decimal_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamProfile {
    pub team: String,
    pub rating: Option<PowerRating>,
    pub recent_games: Vec<Game>,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn game(home: Option<i32>, away: Option<i32>) -> Game {
        Game {
            id: "g1".to_string(),
            season: "2025-26".to_string(),
            home_team: "Boston Celtics".to_string(),
            away_team: "New York Knicks".to_string(),
            scheduled_at: Utc.with_ymd_and_hms(2025, 11, 2, 0, 30, 0).unwrap(),
            home_score: home,
            away_score: away,
        }
    }

    #[test]
    fn test_game_score_invariant() {
        assert!(game(None, None).validate().is_ok());
        assert!(game(Some(110), Some(101)).validate().is_ok());
        assert!(game(Some(110), None).validate().is_err());
        assert!(game(None, Some(99)).validate().is_err());
    }

    #[test]
    fn test_home_win() {
        assert_eq!(game(Some(110), Some(101)).home_win(), Some(true));
        assert_eq!(game(Some(90), Some(101)).home_win(), Some(false));
        assert_eq!(game(None, None).home_win(), None);
    }
}
