use chrono::Utc;
use nalgebra::{DMatrix, DVector};
use statrs::function::logistic::logistic;
use thiserror::Error;

use crate::models::ModelParameters;

pub const MODEL_VERSION: &str = "logistic_power_v1";

const MAX_ITERATIONS: usize = 30;
const HESSIAN_EPSILON: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("no completed games with ratings to train on")]
    NoTrainingData,
}

/// One historical game: did the home side win, and by how much did it
/// out-rate the visitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingRow {
    pub home_win: bool,
    pub power_diff: f64,
}

/// P(home win) = sigmoid(intercept + slope * power_diff)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticModel {
    pub intercept: f64,
    pub slope: f64,
    pub iterations: usize,
}

impl LogisticModel {
    pub fn from_parameters(params: &ModelParameters) -> Self {
        Self {
            intercept: params.intercept,
            slope: params.slope,
            iterations: params.iterations as usize,
        }
    }

    /// Fit by Newton-Raphson on the log-likelihood.
    ///
    /// Runs a fixed number of iterations. A singular Hessian ends the loop
    /// and the weights from the last good iteration are kept.
    pub fn fit(rows: &[TrainingRow]) -> Result<Self, ModelError> {
        if rows.is_empty() {
            return Err(ModelError::NoTrainingData);
        }

        let n = rows.len();
        let x = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { rows[i].power_diff });
        let y = DVector::from_fn(n, |i, _| if rows[i].home_win { 1.0 } else { 0.0 });
        let xt = x.transpose();

        let mut w = DVector::<f64>::zeros(2);
        let mut iterations = 0;

        for iteration in 0..MAX_ITERATIONS {
            let p = (&x * &w).map(logistic);
            let weights = p.map(|pi| pi * (1.0 - pi) + HESSIAN_EPSILON);

            // X^T W X without materialising the n x n diagonal
            let weighted_x = DMatrix::from_fn(n, 2, |i, j| x[(i, j)] * weights[i]);
            let hessian = &xt * weighted_x;
            let gradient = &xt * (&p - &y);

            let step = match hessian.lu().solve(&gradient) {
                Some(step) if step.iter().all(|s| s.is_finite()) => step,
                _ => {
                    tracing::warn!(
                        "Newton-Raphson stopped at iteration {}: singular Hessian",
                        iteration
                    );
                    break;
                }
            };

            w -= step;
            iterations = iteration + 1;
        }

        tracing::debug!(
            "Logistic fit on {} rows: b0={:.4}, b1={:.4} after {} iterations",
            n,
            w[0],
            w[1],
            iterations
        );

        Ok(Self {
            intercept: w[0],
            slope: w[1],
            iterations,
        })
    }

    pub fn home_win_probability(&self, power_diff: f64) -> f64 {
        logistic(self.intercept + self.slope * power_diff)
    }

    /// Missing differential is scored as an even matchup.
    pub fn predict(&self, power_diff: Option<f64>) -> WinProbability {
        let home = self.home_win_probability(power_diff.unwrap_or(0.0));
        WinProbability::from_home(home)
    }

    pub fn to_parameters(&self, training_rows: usize) -> ModelParameters {
        ModelParameters {
            model_version: MODEL_VERSION.to_string(),
            intercept: self.intercept,
            slope: self.slope,
            training_rows: training_rows as i64,
            iterations: self.iterations as i64,
            trained_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WinProbability {
    pub home: f64,
    pub away: f64,
}

impl WinProbability {
    pub fn from_home(home: f64) -> Self {
        Self {
            home,
            away: 1.0 - home,
        }
    }

    pub fn home_is_favorite(&self) -> bool {
        self.home >= 0.5
    }

    /// Distance from a coin flip, scaled to [0, 1].
    pub fn confidence(&self) -> f64 {
        ((self.home - 0.5).abs() * 2.0).clamp(0.0, 1.0)
    }
}
