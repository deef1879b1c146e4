use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use statrs::statistics::Statistics;

use crate::db::{get_completed_rated_games, get_model_parameters};
use crate::services::logistic::{LogisticModel, ModelError, TrainingRow};
use crate::services::predictor::PredictionEngine;

const CALIBRATION_BUCKETS: usize = 10;
const LOG_LOSS_CLAMP: f64 = 1e-15;

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationBucket {
    pub lower: f64,
    pub upper: f64,
    pub games: usize,
    pub mean_predicted: f64,
    pub observed_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelDiagnostics {
    pub games: usize,
    pub accuracy: f64,
    pub brier_score: f64,
    pub log_loss: f64,
    pub home_win_rate: f64,
    pub calibration: Vec<CalibrationBucket>,
}

impl ModelDiagnostics {
    pub fn evaluate(model: &LogisticModel, rows: &[TrainingRow]) -> Result<Self, ModelError> {
        if rows.is_empty() {
            return Err(ModelError::NoTrainingData);
        }

        let scored: Vec<(f64, f64)> = rows
            .iter()
            .map(|row| {
                let p = model.home_win_probability(row.power_diff);
                (p, if row.home_win { 1.0 } else { 0.0 })
            })
            .collect();

        let correct = scored.iter().filter(|(p, y)| (*p >= 0.5) == (*y == 1.0)).count();
        let brier = scored.iter().map(|(p, y)| (p - y).powi(2)).mean();
        let log_loss = scored
            .iter()
            .map(|(p, y)| {
                let p = p.clamp(LOG_LOSS_CLAMP, 1.0 - LOG_LOSS_CLAMP);
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            .mean();
        let home_win_rate = scored.iter().map(|(_, y)| *y).mean();

        let width = 1.0 / CALIBRATION_BUCKETS as f64;
        let mut calibration = Vec::new();
        for bucket in 0..CALIBRATION_BUCKETS {
            let lower = bucket as f64 * width;
            let upper = lower + width;
            let last = bucket == CALIBRATION_BUCKETS - 1;
            let members: Vec<&(f64, f64)> = scored
                .iter()
                .filter(|(p, _)| *p >= lower && (*p < upper || (last && *p <= 1.0)))
                .collect();
            if members.is_empty() {
                continue;
            }
            calibration.push(CalibrationBucket {
                lower,
                upper,
                games: members.len(),
                mean_predicted: members.iter().map(|(p, _)| *p).mean(),
                observed_rate: members.iter().map(|(_, y)| *y).mean(),
            });
        }

        Ok(Self {
            games: rows.len(),
            accuracy: correct as f64 / rows.len() as f64,
            brier_score: brier,
            log_loss,
            home_win_rate,
            calibration,
        })
    }

    /// Score the stored model against every completed game.
    pub async fn for_stored_model(pool: &SqlitePool) -> Result<Self> {
        let params = get_model_parameters(pool)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No trained model found. Run `oddsedge train` first"))?;
        let model = LogisticModel::from_parameters(&params);
        let rows = PredictionEngine::training_rows(&get_completed_rated_games(pool).await?);
        Ok(Self::evaluate(&model, &rows)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_coin_flip_model_scores() {
        let model = LogisticModel { intercept: 0.0, slope: 0.0, iterations: 0 };
        let rows = vec![
            TrainingRow { home_win: true, power_diff: 3.0 },
            TrainingRow { home_win: false, power_diff: -3.0 },
        ];
        let diag = ModelDiagnostics::evaluate(&model, &rows).unwrap();

        assert_eq!(diag.games, 2);
        assert_relative_eq!(diag.brier_score, 0.25);
        assert_relative_eq!(diag.log_loss, 2f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(diag.home_win_rate, 0.5);
        // p = 0.5 counts as a home pick
        assert_relative_eq!(diag.accuracy, 0.5);
        assert_eq!(diag.calibration.len(), 1);
        assert_eq!(diag.calibration[0].games, 2);
    }

    #[test]
    fn test_sharp_model_beats_coin_flip() {
        let model = LogisticModel { intercept: 0.0, slope: 1.0, iterations: 30 };
        let rows = vec![
            TrainingRow { home_win: true, power_diff: 4.0 },
            TrainingRow { home_win: false, power_diff: -4.0 },
            TrainingRow { home_win: true, power_diff: 2.0 },
        ];
        let diag = ModelDiagnostics::evaluate(&model, &rows).unwrap();
        assert_relative_eq!(diag.accuracy, 1.0);
        assert!(diag.brier_score < 0.25);
        let counted: usize = diag.calibration.iter().map(|b| b.games).sum();
        assert_eq!(counted, 3);
    }

    #[test]
    fn test_empty_rows() {
        let model = LogisticModel { intercept: 0.0, slope: 1.0, iterations: 0 };
        assert!(ModelDiagnostics::evaluate(&model, &[]).is_err());
    }
}
