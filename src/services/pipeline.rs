use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{BettingOpportunity, ModelParameters};
use crate::services::ev_calculator::EdgeCalculator;
use crate::services::predictor::PredictionEngine;
use crate::services::ratings::RatingCalculator;

#[derive(Debug)]
pub struct PipelineReport {
    /// Ratings written, when the rating stage ran.
    pub ratings: Option<usize>,
    pub model: ModelParameters,
    pub predictions: usize,
    pub opportunities: Vec<BettingOpportunity>,
}

/// Rate (optionally), train, predict and price in one pass.
///
/// Every stage writes through the same transaction, committed only after
/// pricing succeeds. Any error rolls all four tables back to the last
/// good run.
pub async fn run(
    pool: &SqlitePool,
    calculator: &EdgeCalculator,
    since: DateTime<Utc>,
    rate: bool,
) -> Result<PipelineReport> {
    let mut tx = pool.begin().await?;

    let ratings = if rate {
        Some(RatingCalculator::rate_all_seasons_in(&mut tx).await?)
    } else {
        None
    };

    let model = PredictionEngine::train_in(&mut tx).await?;
    let predictions = PredictionEngine::generate_predictions_in(&mut tx, since).await?;
    let opportunities = calculator.find_opportunities_in(&mut tx).await?;

    tx.commit().await?;

    tracing::info!(
        "Pipeline finished: {} predictions, {} opportunities",
        predictions.len(),
        opportunities.len()
    );

    Ok(PipelineReport {
        ratings,
        model,
        predictions: predictions.len(),
        opportunities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgeConfig;
    use crate::db::{
        get_model_parameters, get_opportunities, get_power_ratings, get_predictions, insert_game, insert_odds_quote,
        test_pool,
    };
    use crate::models::{Game, OddsQuote, Prediction};
    use chrono::TimeZone;

    fn game(id: &str, day: u32, home: &str, away: &str, scores: Option<(i32, i32)>) -> Game {
        Game {
            id: id.to_string(),
            season: "2025-26".to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            scheduled_at: Utc.with_ymd_and_hms(2025, 11, day, 0, 30, 0).unwrap(),
            home_score: scores.map(|s| s.0),
            away_score: scores.map(|s| s.1),
        }
    }

    async fn seed_history(pool: &SqlitePool) {
        let results = [
            ("g1", 1, "Boston Celtics", "Miami Heat", (118, 101)),
            ("g2", 3, "Miami Heat", "Boston Celtics", (104, 112)),
            ("g3", 5, "Boston Celtics", "Miami Heat", (99, 103)),
            ("g4", 7, "Miami Heat", "Boston Celtics", (110, 107)),
            ("g5", 9, "Boston Celtics", "Miami Heat", (121, 96)),
        ];
        for (id, day, home, away, scores) in results {
            insert_game(pool, &game(id, day, home, away, Some(scores))).await.unwrap();
        }
    }

    async fn price_next_game(pool: &SqlitePool) {
        insert_game(pool, &game("next", 20, "Boston Celtics", "Miami Heat", None)).await.unwrap();

        for (team, price) in [("Boston Celtics", 150.0), ("Miami Heat", 300.0)] {
            insert_odds_quote(
                pool,
                &OddsQuote {
                    game_id: "next".to_string(),
                    team: team.to_string(),
                    sportsbook: "fanduel".to_string(),
                    market: "h2h".to_string(),
                    price,
                    price_format: "american".to_string(),
                    observed_at: Utc.with_ymd_and_hms(2025, 11, 19, 12, 0, 0).unwrap(),
                },
            )
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_full_run_rebuilds_every_table() {
        let pool = test_pool().await;
        seed_history(&pool).await;
        price_next_game(&pool).await;

        let calculator = EdgeCalculator::new(EdgeConfig::default());
        let since = Utc.with_ymd_and_hms(2025, 11, 15, 0, 0, 0).unwrap();
        let report = run(&pool, &calculator, since, true).await.unwrap();

        assert_eq!(report.ratings, Some(2));
        assert_eq!(report.model.training_rows, 5);
        assert_eq!(report.predictions, 1);
        assert_eq!(get_power_ratings(&pool, "2025-26").await.unwrap().len(), 2);
        assert_eq!(get_opportunities(&pool).await.unwrap().len(), report.opportunities.len());

        // A second run replaces rather than appends
        let again = run(&pool, &calculator, since, false).await.unwrap();
        assert_eq!(again.ratings, None);
        assert_eq!(get_opportunities(&pool).await.unwrap().len(), again.opportunities.len());
    }

    #[tokio::test]
    async fn test_failed_pricing_rolls_back_earlier_stages() {
        let pool = test_pool().await;
        seed_history(&pool).await;
        price_next_game(&pool).await;

        let calculator = EdgeCalculator::new(EdgeConfig::default());
        let since = Utc.with_ymd_and_hms(2025, 11, 15, 0, 0, 0).unwrap();
        run(&pool, &calculator, since, true).await.unwrap();

        let ratings_before = get_power_ratings(&pool, "2025-26").await.unwrap();
        let model_before = get_model_parameters(&pool).await.unwrap().unwrap();
        let prediction_ids = |p: Vec<Prediction>| p.into_iter().map(|p| p.id).collect::<Vec<_>>();
        let predictions_before = prediction_ids(get_predictions(&pool).await.unwrap());
        let opportunity_ids = |o: Vec<BettingOpportunity>| o.into_iter().map(|o| o.id).collect::<Vec<_>>();
        let opportunities_before = opportunity_ids(get_opportunities(&pool).await.unwrap());

        // A new result shifts ratings and the fit, then pricing hits a bad row
        insert_game(&pool, &game("g6", 11, "Miami Heat", "Boston Celtics", Some((130, 95))))
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO odds (game_id, team, sportsbook, market, price, price_format, observed_at)
             VALUES ('next', 'Miami Heat', 'fanduel', 'h2h', 280, 'american', 'not-a-date')",
        )
        .execute(&pool)
        .await
        .unwrap();

        assert!(run(&pool, &calculator, since, true).await.is_err());

        let ratings_after = get_power_ratings(&pool, "2025-26").await.unwrap();
        assert_eq!(ratings_after.len(), ratings_before.len());
        for (before, after) in ratings_before.iter().zip(&ratings_after) {
            assert_eq!(before.team, after.team);
            assert_eq!(before.rating, after.rating);
            assert_eq!(before.games_played, after.games_played);
        }
        let model_after = get_model_parameters(&pool).await.unwrap().unwrap();
        assert_eq!(model_after.intercept, model_before.intercept);
        assert_eq!(model_after.training_rows, 5);
        assert_eq!(model_after.trained_at, model_before.trained_at);
        assert_eq!(prediction_ids(get_predictions(&pool).await.unwrap()), predictions_before);
        assert_eq!(opportunity_ids(get_opportunities(&pool).await.unwrap()), opportunities_before);
    }

    #[tokio::test]
    async fn test_run_stops_without_training_data() {
        let pool = test_pool().await;
        let calculator = EdgeCalculator::new(EdgeConfig::default());
        assert!(run(&pool, &calculator, Utc::now(), true).await.is_err());
    }
}
