use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::{
    create_pool, get_model_parameters, get_opportunities, get_power_ratings, get_predictions, get_team_profile,
};
use crate::models::{ApiResponse, BettingOpportunity, ModelParameters, PowerRating, Prediction, TeamProfile};
use crate::teams::canonical_team_name;

type ApiResult<T> = Result<Json<ApiResponse<T>>, StatusCode>;

/// Read-only view over the derived tables. Nothing here recomputes; run
/// the CLI stages to refresh what it serves.
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let pool = create_pool().await?;

    let app = create_router().with_state(pool);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("OddsEdge API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router() -> Router<SqlitePool> {
    Router::new()
        .route("/health", get(health_check))
        .route("/model", get(model_handler))
        .route("/predictions", get(predictions_handler))
        .route("/opportunities", get(opportunities_handler))
        .route("/ratings/{season}", get(ratings_handler))
        .route("/teams/{name}", get(team_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

fn internal_error(context: &str, err: anyhow::Error) -> StatusCode {
    tracing::error!("Failed to {}: {}", context, err);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("OddsEdge API is running"))
}

// GET /model
async fn model_handler(State(pool): State<SqlitePool>) -> ApiResult<ModelParameters> {
    match get_model_parameters(&pool).await {
        Ok(Some(params)) => Ok(Json(ApiResponse::success(params))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => Err(internal_error("load model parameters", e)),
    }
}

// GET /predictions
async fn predictions_handler(State(pool): State<SqlitePool>) -> ApiResult<Vec<Prediction>> {
    get_predictions(&pool)
        .await
        .map(|p| Json(ApiResponse::success(p)))
        .map_err(|e| internal_error("load predictions", e))
}

#[derive(Deserialize)]
struct OpportunitiesQuery {
    /// Only rows with edge_pct at or above this.
    min_edge_pct: Option<f64>,
    limit: Option<usize>,
}

// GET /opportunities?min_edge_pct=2&limit=10
async fn opportunities_handler(
    State(pool): State<SqlitePool>,
    Query(params): Query<OpportunitiesQuery>,
) -> ApiResult<Vec<BettingOpportunity>> {
    let opportunities = get_opportunities(&pool)
        .await
        .map_err(|e| internal_error("load opportunities", e))?;

    let limit = params.limit.unwrap_or(50).min(200);
    let filtered: Vec<BettingOpportunity> = opportunities
        .into_iter()
        .filter(|o| params.min_edge_pct.map_or(true, |min| o.edge_pct >= min))
        .take(limit)
        .collect();

    Ok(Json(ApiResponse::success(filtered)))
}

// GET /ratings/{season}
async fn ratings_handler(State(pool): State<SqlitePool>, Path(season): Path<String>) -> ApiResult<Vec<PowerRating>> {
    match get_power_ratings(&pool, &season).await {
        Ok(ratings) if ratings.is_empty() => Err(StatusCode::NOT_FOUND),
        Ok(ratings) => Ok(Json(ApiResponse::success(ratings))),
        Err(e) => Err(internal_error("load power ratings", e)),
    }
}

// GET /teams/{name}, name may be an abbreviation
async fn team_handler(State(pool): State<SqlitePool>, Path(name): Path<String>) -> ApiResult<TeamProfile> {
    let team = canonical_team_name(&name);
    match get_team_profile(&pool, &team, 10).await {
        Ok(profile) if profile.rating.is_none() && profile.recent_games.is_empty() => Err(StatusCode::NOT_FOUND),
        Ok(profile) => Ok(Json(ApiResponse::success(profile))),
        Err(e) => Err(internal_error("load team profile", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_game, replace_opportunities, test_pool};
    use crate::models::Game;
    use chrono::{TimeZone, Utc};

    fn opportunity(id: &str, edge_pct: f64) -> BettingOpportunity {
        BettingOpportunity {
            id: id.to_string(),
            game_id: "g1".to_string(),
            team: "Miami Heat".to_string(),
            sportsbook: "fanduel".to_string(),
            decimal_price: 2.5,
            american_price: 150,
            implied_probability: 0.4,
            model_probability: 0.4 + edge_pct / 100.0,
            edge: edge_pct / 100.0,
            edge_pct,
            kelly_fraction: 0.01,
            recommended_stake: 10.0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_model_is_not_found() {
        let pool = test_pool().await;
        assert_eq!(model_handler(State(pool)).await.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_opportunities_filter_and_limit() {
        let pool = test_pool().await;
        insert_game(
            &pool,
            &Game {
                id: "g1".to_string(),
                season: "2025-26".to_string(),
                home_team: "Boston Celtics".to_string(),
                away_team: "Miami Heat".to_string(),
                scheduled_at: Utc.with_ymd_and_hms(2025, 12, 2, 0, 30, 0).unwrap(),
                home_score: None,
                away_score: None,
            },
        )
        .await
        .unwrap();
        let rows = [opportunity("a", 6.0), opportunity("b", 3.0), opportunity("c", 1.0)];
        replace_opportunities(&mut *pool.acquire().await.unwrap(), &rows).await.unwrap();

        let query = OpportunitiesQuery { min_edge_pct: Some(2.0), limit: None };
        let Json(body) = opportunities_handler(State(pool.clone()), Query(query)).await.unwrap();
        let ids: Vec<String> = body.data.unwrap().into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let query = OpportunitiesQuery { min_edge_pct: None, limit: Some(1) };
        let Json(body) = opportunities_handler(State(pool), Query(query)).await.unwrap();
        assert_eq!(body.data.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_season_and_team() {
        let pool = test_pool().await;
        let err = ratings_handler(State(pool.clone()), Path("1999-00".to_string())).await.unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
        let err = team_handler(State(pool), Path("BOS".to_string())).await.unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }
}
