use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::{
    get_completed_rated_games, get_model_parameters, get_upcoming_rated_games, replace_model_parameters,
    replace_predictions,
};
use crate::models::{ModelParameters, Prediction, RatedGame};
use crate::services::logistic::{LogisticModel, ModelError, TrainingRow};

pub struct PredictionEngine;

impl PredictionEngine {
    /// Turn completed games into training rows.
    ///
    /// A team without a rating contributes a differential of 0.0, same as
    /// at prediction time.
    pub fn training_rows(games: &[RatedGame]) -> Vec<TrainingRow> {
        let mut imputed = 0;
        let rows: Vec<TrainingRow> = games
            .iter()
            .filter_map(|rated| {
                let home_win = rated.game.home_win()?;
                let power_diff = rated.power_diff().unwrap_or_else(|| {
                    imputed += 1;
                    0.0
                });
                Some(TrainingRow { home_win, power_diff })
            })
            .collect();

        if imputed > 0 {
            tracing::warn!(
                "{} of {} training games are missing a power rating, using a differential of 0",
                imputed,
                rows.len()
            );
        }
        rows
    }

    /// Fit on every completed game and replace the stored parameters.
    pub async fn train(pool: &SqlitePool) -> Result<ModelParameters> {
        let mut tx = pool.begin().await?;
        let params = Self::train_in(&mut tx).await?;
        tx.commit().await?;
        Ok(params)
    }

    pub async fn train_in(conn: &mut SqliteConnection) -> Result<ModelParameters> {
        let games = get_completed_rated_games(&mut *conn).await?;
        let rows = Self::training_rows(&games);
        if rows.is_empty() {
            return Err(ModelError::NoTrainingData.into());
        }

        let model = LogisticModel::fit(&rows)?;
        let params = model.to_parameters(rows.len());
        replace_model_parameters(conn, &params).await?;

        tracing::info!(
            "Trained {} on {} games: intercept {:.4}, slope {:.4}",
            params.model_version,
            params.training_rows,
            params.intercept,
            params.slope
        );
        Ok(params)
    }

    pub fn predict_game(model: &LogisticModel, model_version: &str, rated: &RatedGame) -> Prediction {
        let power_diff = rated.power_diff();
        if power_diff.is_none() {
            tracing::warn!(
                "No power rating for {} or {} in {}, predicting as an even matchup",
                rated.game.home_team,
                rated.game.away_team,
                rated.game.season
            );
        }

        let probability = model.predict(power_diff);
        let predicted_winner = if probability.home_is_favorite() {
            &rated.game.home_team
        } else {
            &rated.game.away_team
        };

        Prediction {
            id: Uuid::new_v4().to_string(),
            game_id: rated.game.id.clone(),
            home_team: rated.game.home_team.clone(),
            away_team: rated.game.away_team.clone(),
            power_diff: power_diff.unwrap_or(0.0),
            home_win_probability: probability.home,
            away_win_probability: probability.away,
            predicted_winner: predicted_winner.clone(),
            confidence: probability.confidence(),
            model_version: model_version.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Predict every unplayed game from `since` on with the stored model and
    /// replace the predictions table.
    pub async fn generate_predictions(pool: &SqlitePool, since: DateTime<Utc>) -> Result<Vec<Prediction>> {
        let mut tx = pool.begin().await?;
        let predictions = Self::generate_predictions_in(&mut tx, since).await?;
        tx.commit().await?;
        Ok(predictions)
    }

    pub async fn generate_predictions_in(conn: &mut SqliteConnection, since: DateTime<Utc>) -> Result<Vec<Prediction>> {
        let params = get_model_parameters(&mut *conn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No trained model found. Run `oddsedge train` first"))?;
        let model = LogisticModel::from_parameters(&params);

        let games = get_upcoming_rated_games(&mut *conn, since).await?;
        let predictions: Vec<Prediction> = games
            .iter()
            .map(|rated| Self::predict_game(&model, &params.model_version, rated))
            .collect();

        replace_predictions(conn, &predictions).await?;

        for prediction in &predictions {
            tracing::debug!(
                "Predicted {} vs {}: home {:.1}%, away {:.1}%",
                prediction.home_team,
                prediction.away_team,
                prediction.home_win_probability * 100.0,
                prediction.away_win_probability * 100.0
            );
        }
        tracing::info!("Generated {} predictions", predictions.len());
        Ok(predictions)
    }
}
