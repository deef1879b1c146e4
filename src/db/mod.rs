pub mod seed;
pub use seed::seed_data;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqliteExecutor, SqlitePool};
use std::str::FromStr;

use crate::config::database_url;
use crate::models::*;

pub async fn clear_all_data(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for table in [
        "opportunities",
        "predictions",
        "model_parameters",
        "odds",
        "power_ratings",
        "games",
        "odds_fetch_log",
    ] {
        sqlx::query(&format!("DELETE FROM {}", table)).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    tracing::info!("All data cleared");
    Ok(())
}

pub async fn create_pool() -> Result<SqlitePool> {
    let database_url = database_url();

    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(&database_url);

    if let Some(parent) = std::path::Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
    }

    let options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;
    init_database_with_pool(&pool).await?;
    Ok(pool)
}

/// Schema creation is idempotent, every pool runs it on open.
pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS games (
            id TEXT PRIMARY KEY,
            season TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            scheduled_at TEXT NOT NULL,
            home_score INTEGER,
            away_score INTEGER,
            CHECK ((home_score IS NULL) = (away_score IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS odds (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            game_id TEXT NOT NULL,
            team TEXT NOT NULL,
            sportsbook TEXT NOT NULL,
            market TEXT NOT NULL DEFAULT 'h2h',
            price REAL NOT NULL,
            price_format TEXT NOT NULL,
            observed_at TEXT NOT NULL,
            FOREIGN KEY (game_id) REFERENCES games (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS power_ratings (
            team TEXT NOT NULL,
            season TEXT NOT NULL,
            rating REAL NOT NULL,
            games_played INTEGER NOT NULL DEFAULT 0,
            wins INTEGER NOT NULL DEFAULT 0,
            losses INTEGER NOT NULL DEFAULT 0,
            points_for_avg REAL NOT NULL DEFAULT 0,
            points_against_avg REAL NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (team, season)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_parameters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            model_version TEXT NOT NULL,
            intercept REAL NOT NULL,
            slope REAL NOT NULL,
            training_rows INTEGER NOT NULL,
            iterations INTEGER NOT NULL,
            trained_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            id TEXT PRIMARY KEY,
            game_id TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            power_diff REAL NOT NULL,
            home_win_probability REAL NOT NULL,
            away_win_probability REAL NOT NULL,
            predicted_winner TEXT NOT NULL,
            confidence REAL NOT NULL,
            model_version TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (game_id) REFERENCES games (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS opportunities (
            id TEXT PRIMARY KEY,
            game_id TEXT NOT NULL,
            team TEXT NOT NULL,
            sportsbook TEXT NOT NULL,
            decimal_price REAL NOT NULL,
            american_price INTEGER NOT NULL,
            implied_probability REAL NOT NULL,
            model_probability REAL NOT NULL,
            edge REAL NOT NULL,
            edge_pct REAL NOT NULL,
            kelly_fraction REAL NOT NULL,
            recommended_stake REAL NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (game_id) REFERENCES games (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // odds_fetch_log: tracks last successful API call per sport_key to avoid burning quota
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS odds_fetch_log (
            sport_key    TEXT PRIMARY KEY,
            last_fetched TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_games_scheduled ON games(scheduled_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_odds_current ON odds(game_id, team, sportsbook, observed_at)")
        .execute(pool)
        .await?;

    tracing::debug!("Database schema ready");
    Ok(())
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn game_from_row(row: &SqliteRow) -> Result<Game> {
    Ok(Game {
        id: row.get("id"),
        season: row.get("season"),
        home_team: row.get("home_team"),
        away_team: row.get("away_team"),
        scheduled_at: parse_ts(&row.get::<String, _>("scheduled_at"))?,
        home_score: row.get("home_score"),
        away_score: row.get("away_score"),
    })
}

// Game operations

pub async fn insert_game(pool: &SqlitePool, game: &Game) -> Result<()> {
    game.validate()?;
    sqlx::query(
        r#"
        INSERT INTO games (id, season, home_team, away_team, scheduled_at, home_score, away_score)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            season       = excluded.season,
            home_team    = excluded.home_team,
            away_team    = excluded.away_team,
            scheduled_at = excluded.scheduled_at,
            home_score   = excluded.home_score,
            away_score   = excluded.away_score
        "#,
    )
    .bind(&game.id)
    .bind(&game.season)
    .bind(&game.home_team)
    .bind(&game.away_team)
    .bind(game.scheduled_at.to_rfc3339())
    .bind(game.home_score)
    .bind(game.away_score)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_game_by_id(pool: &SqlitePool, game_id: &str) -> Result<Option<Game>> {
    let row = sqlx::query("SELECT * FROM games WHERE id = ?")
        .bind(game_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(game_from_row).transpose()
}

pub async fn get_completed_games<'e, E: SqliteExecutor<'e>>(executor: E, season: Option<&str>) -> Result<Vec<Game>> {
    let query = if season.is_some() {
        "SELECT * FROM games WHERE home_score IS NOT NULL AND season = ? ORDER BY scheduled_at"
    } else {
        "SELECT * FROM games WHERE home_score IS NOT NULL ORDER BY scheduled_at"
    };

    let mut query_builder = sqlx::query(query);
    if let Some(season) = season {
        query_builder = query_builder.bind(season);
    }

    let rows = query_builder.fetch_all(executor).await?;
    rows.iter().map(game_from_row).collect()
}

/// Games within `window` of `at`, played or not.
pub async fn find_games_near(
    pool: &SqlitePool,
    at: DateTime<Utc>,
    window: chrono::Duration,
) -> Result<Vec<Game>> {
    let rows = sqlx::query("SELECT * FROM games WHERE scheduled_at BETWEEN ? AND ?")
        .bind((at - window).to_rfc3339())
        .bind((at + window).to_rfc3339())
        .fetch_all(pool)
        .await?;
    rows.iter().map(game_from_row).collect()
}

pub async fn get_team_recent_games(pool: &SqlitePool, team: &str, limit: i64) -> Result<Vec<Game>> {
    let rows = sqlx::query(
        r#"SELECT * FROM games
           WHERE (home_team = ? OR away_team = ?) AND home_score IS NOT NULL
           ORDER BY scheduled_at DESC LIMIT ?"#,
    )
    .bind(team)
    .bind(team)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(game_from_row).collect()
}

const RATED_GAMES_SELECT: &str = r#"
    SELECT g.*, hr.rating AS home_rating, ar.rating AS away_rating
    FROM games g
    LEFT JOIN power_ratings hr ON hr.team = g.home_team AND hr.season = g.season
    LEFT JOIN power_ratings ar ON ar.team = g.away_team AND ar.season = g.season
"#;

fn rated_game_from_row(row: &SqliteRow) -> Result<RatedGame> {
    Ok(RatedGame {
        game: game_from_row(row)?,
        home_rating: row.get("home_rating"),
        away_rating: row.get("away_rating"),
    })
}

/// Final games joined with both teams' ratings for the game's season.
pub async fn get_completed_rated_games<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Vec<RatedGame>> {
    let query = format!(
        "{} WHERE g.home_score IS NOT NULL AND g.away_score IS NOT NULL ORDER BY g.scheduled_at",
        RATED_GAMES_SELECT
    );
    let rows = sqlx::query(&query).fetch_all(executor).await?;
    rows.iter().map(rated_game_from_row).collect()
}

/// Unplayed games scheduled at or after `since`.
pub async fn get_upcoming_rated_games<'e, E: SqliteExecutor<'e>>(executor: E, since: DateTime<Utc>) -> Result<Vec<RatedGame>> {
    let query = format!(
        "{} WHERE g.home_score IS NULL AND g.scheduled_at >= ? ORDER BY g.scheduled_at",
        RATED_GAMES_SELECT
    );
    let rows = sqlx::query(&query)
        .bind(since.to_rfc3339())
        .fetch_all(executor)
        .await?;
    rows.iter().map(rated_game_from_row).collect()
}

// Odds operations

/// Quotes are append-only, history is kept.
pub async fn insert_odds_quote(pool: &SqlitePool, quote: &OddsQuote) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO odds (game_id, team, sportsbook, market, price, price_format, observed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&quote.game_id)
    .bind(&quote.team)
    .bind(&quote.sportsbook)
    .bind(&quote.market)
    .bind(quote.price)
    .bind(&quote.price_format)
    .bind(quote.observed_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent quote per (game, team, sportsbook) for one market.
pub async fn get_current_quotes<'e, E: SqliteExecutor<'e>>(executor: E, market: &str) -> Result<Vec<OddsQuote>> {
    let rows = sqlx::query(
        r#"
        SELECT game_id, team, sportsbook, market, price, price_format, observed_at
        FROM (
            SELECT *,
                   ROW_NUMBER() OVER (
                       PARTITION BY game_id, team, sportsbook
                       ORDER BY observed_at DESC, id DESC
                   ) AS rn
            FROM odds
            WHERE market = ?
        )
        WHERE rn = 1
        ORDER BY game_id, team, sportsbook
        "#,
    )
    .bind(market)
    .fetch_all(executor)
    .await?;

    let mut quotes = Vec::new();
    for row in rows {
        quotes.push(OddsQuote {
            game_id: row.get("game_id"),
            team: row.get("team"),
            sportsbook: row.get("sportsbook"),
            market: row.get("market"),
            price: row.get("price"),
            price_format: row.get("price_format"),
            observed_at: parse_ts(&row.get::<String, _>("observed_at"))?,
        });
    }
    Ok(quotes)
}

// Power rating operations
//
// The replace_* writers run on the caller's connection and never commit.
// Pass a transaction so a failed rebuild leaves the old rows in place.

fn rating_from_row(row: &SqliteRow) -> Result<PowerRating> {
    Ok(PowerRating {
        team: row.get("team"),
        season: row.get("season"),
        rating: row.get("rating"),
        games_played: row.get("games_played"),
        wins: row.get("wins"),
        losses: row.get("losses"),
        points_for_avg: row.get("points_for_avg"),
        points_against_avg: row.get("points_against_avg"),
        updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
    })
}

/// Drop every rating for `season` and write `ratings`.
pub async fn replace_power_ratings(conn: &mut SqliteConnection, season: &str, ratings: &[PowerRating]) -> Result<()> {
    sqlx::query("DELETE FROM power_ratings WHERE season = ?")
        .bind(season)
        .execute(&mut *conn)
        .await?;

    for rating in ratings {
        sqlx::query(
            r#"
            INSERT INTO power_ratings
            (team, season, rating, games_played, wins, losses, points_for_avg, points_against_avg, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rating.team)
        .bind(&rating.season)
        .bind(rating.rating)
        .bind(rating.games_played)
        .bind(rating.wins)
        .bind(rating.losses)
        .bind(rating.points_for_avg)
        .bind(rating.points_against_avg)
        .bind(rating.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn get_power_ratings<'e, E: SqliteExecutor<'e>>(executor: E, season: &str) -> Result<Vec<PowerRating>> {
    let rows = sqlx::query("SELECT * FROM power_ratings WHERE season = ? ORDER BY rating DESC")
        .bind(season)
        .fetch_all(executor)
        .await?;
    rows.iter().map(rating_from_row).collect()
}

pub async fn get_team_current_rating(pool: &SqlitePool, team: &str) -> Result<Option<PowerRating>> {
    let row = sqlx::query("SELECT * FROM power_ratings WHERE team = ? ORDER BY season DESC LIMIT 1")
        .bind(team)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(rating_from_row).transpose()
}

/// Current rating plus the last `recent` final games of one team.
pub async fn get_team_profile(pool: &SqlitePool, team: &str, recent: i64) -> Result<TeamProfile> {
    Ok(TeamProfile {
        team: team.to_string(),
        rating: get_team_current_rating(pool, team).await?,
        recent_games: get_team_recent_games(pool, team, recent).await?,
    })
}

pub async fn get_seasons<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Vec<String>> {
    let seasons = sqlx::query_scalar("SELECT DISTINCT season FROM games ORDER BY season")
        .fetch_all(executor)
        .await?;
    Ok(seasons)
}

// Model parameter operations

/// The table only ever holds the parameters of the latest fit.
pub async fn replace_model_parameters(conn: &mut SqliteConnection, params: &ModelParameters) -> Result<()> {
    sqlx::query("DELETE FROM model_parameters").execute(&mut *conn).await?;
    sqlx::query(
        r#"
        INSERT INTO model_parameters (model_version, intercept, slope, training_rows, iterations, trained_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&params.model_version)
    .bind(params.intercept)
    .bind(params.slope)
    .bind(params.training_rows)
    .bind(params.iterations)
    .bind(params.trained_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_model_parameters<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Option<ModelParameters>> {
    let row = sqlx::query("SELECT * FROM model_parameters ORDER BY id DESC LIMIT 1")
        .fetch_optional(executor)
        .await?;

    if let Some(row) = row {
        Ok(Some(ModelParameters {
            model_version: row.get("model_version"),
            intercept: row.get("intercept"),
            slope: row.get("slope"),
            training_rows: row.get("training_rows"),
            iterations: row.get("iterations"),
            trained_at: parse_ts(&row.get::<String, _>("trained_at"))?,
        }))
    } else {
        Ok(None)
    }
}

// Prediction operations

pub async fn replace_predictions(conn: &mut SqliteConnection, predictions: &[Prediction]) -> Result<()> {
    sqlx::query("DELETE FROM predictions").execute(&mut *conn).await?;

    for prediction in predictions {
        sqlx::query(
            r#"
            INSERT INTO predictions
            (id, game_id, home_team, away_team, power_diff, home_win_probability, away_win_probability,
             predicted_winner, confidence, model_version, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&prediction.id)
        .bind(&prediction.game_id)
        .bind(&prediction.home_team)
        .bind(&prediction.away_team)
        .bind(prediction.power_diff)
        .bind(prediction.home_win_probability)
        .bind(prediction.away_win_probability)
        .bind(&prediction.predicted_winner)
        .bind(prediction.confidence)
        .bind(&prediction.model_version)
        .bind(prediction.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn get_predictions<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Vec<Prediction>> {
    let rows = sqlx::query(
        r#"SELECT p.* FROM predictions p
           JOIN games g ON g.id = p.game_id
           ORDER BY g.scheduled_at, p.game_id"#,
    )
    .fetch_all(executor)
    .await?;

    let mut predictions = Vec::new();
    for row in rows {
        predictions.push(Prediction {
            id: row.get("id"),
            game_id: row.get("game_id"),
            home_team: row.get("home_team"),
            away_team: row.get("away_team"),
            power_diff: row.get("power_diff"),
            home_win_probability: row.get("home_win_probability"),
            away_win_probability: row.get("away_win_probability"),
            predicted_winner: row.get("predicted_winner"),
            confidence: row.get("confidence"),
            model_version: row.get("model_version"),
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        });
    }
    Ok(predictions)
}

// Opportunity operations

pub async fn replace_opportunities(conn: &mut SqliteConnection, opportunities: &[BettingOpportunity]) -> Result<()> {
    sqlx::query("DELETE FROM opportunities").execute(&mut *conn).await?;

    for opp in opportunities {
        sqlx::query(
            r#"
            INSERT INTO opportunities
            (id, game_id, team, sportsbook, decimal_price, american_price, implied_probability,
             model_probability, edge, edge_pct, kelly_fraction, recommended_stake, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&opp.id)
        .bind(&opp.game_id)
        .bind(&opp.team)
        .bind(&opp.sportsbook)
        .bind(opp.decimal_price)
        .bind(opp.american_price)
        .bind(opp.implied_probability)
        .bind(opp.model_probability)
        .bind(opp.edge)
        .bind(opp.edge_pct)
        .bind(opp.kelly_fraction)
        .bind(opp.recommended_stake)
        .bind(opp.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn get_opportunities<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Vec<BettingOpportunity>> {
    let rows = sqlx::query("SELECT * FROM opportunities ORDER BY edge_pct DESC")
        .fetch_all(executor)
        .await?;

    let mut opportunities = Vec::new();
    for row in rows {
        opportunities.push(BettingOpportunity {
            id: row.get("id"),
            game_id: row.get("game_id"),
            team: row.get("team"),
            sportsbook: row.get("sportsbook"),
            decimal_price: row.get("decimal_price"),
            american_price: row.get("american_price"),
            implied_probability: row.get("implied_probability"),
            model_probability: row.get("model_probability"),
            edge: row.get("edge"),
            edge_pct: row.get("edge_pct"),
            kelly_fraction: row.get("kelly_fraction"),
            recommended_stake: row.get("recommended_stake"),
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        });
    }
    Ok(opportunities)
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    init_database_with_pool(&pool).await.expect("schema");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn game(id: &str, day: u32, scores: Option<(i32, i32)>) -> Game {
        Game {
            id: id.to_string(),
            season: "2025-26".to_string(),
            home_team: "Boston Celtics".to_string(),
            away_team: "New York Knicks".to_string(),
            scheduled_at: Utc.with_ymd_and_hms(2025, 11, day, 0, 30, 0).unwrap(),
            home_score: scores.map(|s| s.0),
            away_score: scores.map(|s| s.1),
        }
    }

    fn quote(game_id: &str, book: &str, price: f64, minutes: i64) -> OddsQuote {
        OddsQuote {
            game_id: game_id.to_string(),
            team: "Boston Celtics".to_string(),
            sportsbook: book.to_string(),
            market: "h2h".to_string(),
            price,
            price_format: "american".to_string(),
            observed_at: Utc.with_ymd_and_hms(2025, 11, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn test_half_scored_game_is_rejected() {
        let pool = test_pool().await;
        let mut bad = game("g1", 1, None);
        bad.home_score = Some(100);
        assert!(insert_game(&pool, &bad).await.is_err());
        assert!(get_game_by_id(&pool, "g1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_current_quote_is_latest_per_book() {
        let pool = test_pool().await;
        insert_game(&pool, &game("g1", 3, None)).await.unwrap();

        insert_odds_quote(&pool, &quote("g1", "fanduel", -150.0, 0)).await.unwrap();
        insert_odds_quote(&pool, &quote("g1", "fanduel", -130.0, 30)).await.unwrap();
        insert_odds_quote(&pool, &quote("g1", "draftkings", -140.0, 10)).await.unwrap();

        let current = get_current_quotes(&pool, "h2h").await.unwrap();
        assert_eq!(current.len(), 2);
        let fanduel = current.iter().find(|q| q.sportsbook == "fanduel").unwrap();
        assert_eq!(fanduel.price, -130.0);
    }

    #[tokio::test]
    async fn test_rated_games_split_completed_and_upcoming() {
        let pool = test_pool().await;
        insert_game(&pool, &game("done", 1, Some((110, 100)))).await.unwrap();
        insert_game(&pool, &game("next", 5, None)).await.unwrap();

        let now = Utc::now();
        replace_power_ratings(
            &mut *pool.acquire().await.unwrap(),
            "2025-26",
            &[PowerRating {
                team: "Boston Celtics".to_string(),
                season: "2025-26".to_string(),
                rating: 6.5,
                games_played: 1,
                wins: 1,
                losses: 0,
                points_for_avg: 110.0,
                points_against_avg: 100.0,
                updated_at: now,
            }],
        )
        .await
        .unwrap();

        let completed = get_completed_rated_games(&pool).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].home_rating, Some(6.5));
        assert_eq!(completed[0].away_rating, None);
        assert_eq!(completed[0].power_diff(), None);

        let since = Utc.with_ymd_and_hms(2025, 11, 2, 0, 0, 0).unwrap();
        let upcoming = get_upcoming_rated_games(&pool, since).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].game.id, "next");
    }

    #[tokio::test]
    async fn test_replace_predictions_drops_previous_rows() {
        let pool = test_pool().await;
        insert_game(&pool, &game("g1", 3, None)).await.unwrap();

        let prediction = |id: &str| Prediction {
            id: id.to_string(),
            game_id: "g1".to_string(),
            home_team: "Boston Celtics".to_string(),
            away_team: "New York Knicks".to_string(),
            power_diff: 0.0,
            home_win_probability: 0.5,
            away_win_probability: 0.5,
            predicted_winner: "Boston Celtics".to_string(),
            confidence: 0.0,
            model_version: "test".to_string(),
            created_at: Utc::now(),
        };

        replace_predictions(&mut *pool.acquire().await.unwrap(), &[prediction("a"), prediction("b")])
            .await
            .unwrap();
        replace_predictions(&mut *pool.acquire().await.unwrap(), &[prediction("c")]).await.unwrap();

        let stored = get_predictions(&pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "c");

        // Uncommitted replaces roll back with the transaction
        let mut tx = pool.begin().await.unwrap();
        replace_predictions(&mut tx, &[prediction("d"), prediction("e")]).await.unwrap();
        assert_eq!(get_predictions(&mut *tx).await.unwrap().len(), 2);
        drop(tx);

        let stored = get_predictions(&pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "c");
    }

    #[tokio::test]
    async fn test_model_parameters_hold_latest_fit_only() {
        let pool = test_pool().await;
        assert!(get_model_parameters(&pool).await.unwrap().is_none());

        for intercept in [0.1, 0.2] {
            replace_model_parameters(
                &mut *pool.acquire().await.unwrap(),
                &ModelParameters {
                    model_version: "test".to_string(),
                    intercept,
                    slope: 0.15,
                    training_rows: 10,
                    iterations: 30,
                    trained_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM model_parameters")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(get_model_parameters(&pool).await.unwrap().unwrap().intercept, 0.2);
    }

    #[tokio::test]
    async fn test_team_profile_lists_final_games_newest_first() {
        let pool = test_pool().await;
        insert_game(&pool, &game("g1", 1, Some((110, 100)))).await.unwrap();
        insert_game(&pool, &game("g2", 4, Some((98, 104)))).await.unwrap();
        insert_game(&pool, &game("g3", 8, None)).await.unwrap();

        let profile = get_team_profile(&pool, "New York Knicks", 5).await.unwrap();
        assert!(profile.rating.is_none());
        let ids: Vec<&str> = profile.recent_games.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["g2", "g1"]);
    }
}
