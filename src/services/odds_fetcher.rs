//! Pulls moneyline odds from The Odds API into the `odds` table.
//!
//! Every bookmaker's price is stored as its own quote, stamped with the
//! bookmaker's last update time, so the edge calculator can pick the best
//! current price per side later. Games the feed knows about but we don't
//! are added to the schedule.
//!
//! ## Credit budget
//! One request per sport per call, skipped when the last successful fetch
//! is less than 12 hours old unless forced.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::db::{find_games_near, insert_game, insert_odds_quote};
use crate::models::{Game, OddsQuote};
use crate::services::ev_calculator::MONEYLINE_MARKET;
use crate::teams::{canonical_team_name, names_match};
use crate::utils::season_for;

pub const NBA_SPORT_KEY: &str = "basketball_nba";
const ODDS_API_BASE: &str = "https://api.the-odds-api.com/v4";
const STALE_AFTER_HOURS: i64 = 12;

// ── Odds API response types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OddsEvent {
    id: String,
    commence_time: DateTime<Utc>,
    home_team: String,
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize)]
struct Bookmaker {
    key: String,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
    markets: Vec<Market>,
}

#[derive(Debug, Deserialize)]
struct Market {
    key: String,
    outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    name: String,
    price: f64,
}

// ── Public entry point ────────────────────────────────────────────────────────

/// Fetch one sport if stale (or `force`). Returns the number of quotes stored.
pub async fn refresh_odds(pool: &SqlitePool, api_key: &str, sport_key: &str, force: bool) -> Result<u32> {
    if !force && !is_stale(pool, sport_key).await? {
        tracing::info!("Odds: {} fetched within the last {}h, skipping", sport_key, STALE_AFTER_HOURS);
        return Ok(0);
    }

    let events = fetch_events(api_key, sport_key).await?;
    let fetched_at = Utc::now();
    let mut stored = 0u32;

    for event in &events {
        let game_id = resolve_game(pool, event).await?;
        for quote in event_quotes(event, &game_id, fetched_at) {
            insert_odds_quote(pool, &quote).await?;
            stored += 1;
        }
    }

    mark_fetched(pool, sport_key).await?;
    tracing::info!("Odds: {} quotes stored from {} {} events", stored, events.len(), sport_key);
    Ok(stored)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

async fn fetch_events(api_key: &str, sport_key: &str) -> Result<Vec<OddsEvent>> {
    let url = format!(
        "{}/sports/{}/odds/?apiKey={}&regions=us&markets={}&oddsFormat=american&dateFormat=iso",
        ODDS_API_BASE, sport_key, api_key, MONEYLINE_MARKET
    );

    let client = reqwest::Client::new();
    let resp = client
        .get(&url)
        .timeout(std::time::Duration::from_secs(20))
        .send()
        .await?;

    let status = resp.status();
    if status == 401 {
        return Err(anyhow::anyhow!("Odds API: invalid API key (401)"));
    }
    if status == 422 {
        return Err(anyhow::anyhow!("Odds API: sport {} not in subscription (422)", sport_key));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!("Odds API HTTP {}: {}", status, body));
    }

    if let Some(remaining) = resp.headers().get("x-requests-remaining") {
        tracing::debug!("Odds API requests remaining: {:?}", remaining);
    }

    Ok(resp.json().await?)
}

/// Returns true if we haven't fetched this sport_key recently.
async fn is_stale(pool: &SqlitePool, sport_key: &str) -> Result<bool> {
    let last: Option<String> = sqlx::query_scalar("SELECT last_fetched FROM odds_fetch_log WHERE sport_key = ?")
        .bind(sport_key)
        .fetch_optional(pool)
        .await?;

    Ok(match last {
        None => true,
        Some(ts) => match DateTime::parse_from_rfc3339(&ts) {
            Ok(fetched) => {
                Utc::now().signed_duration_since(fetched.with_timezone(&Utc)) > Duration::hours(STALE_AFTER_HOURS)
            }
            Err(_) => true,
        },
    })
}

async fn mark_fetched(pool: &SqlitePool, sport_key: &str) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO odds_fetch_log (sport_key, last_fetched) VALUES (?, ?)")
        .bind(sport_key)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
    Ok(())
}

/// Find our game for a feed event by tip-off window and team names, adding
/// it to the schedule when we have none.
async fn resolve_game(pool: &SqlitePool, event: &OddsEvent) -> Result<String> {
    let nearby = find_games_near(pool, event.commence_time, Duration::hours(4)).await?;
    if let Some(game) = nearby
        .iter()
        .find(|g| names_match(&g.home_team, &event.home_team) && names_match(&g.away_team, &event.away_team))
    {
        return Ok(game.id.clone());
    }

    let game = event_game(event);
    tracing::debug!("Odds: scheduling {} vs {} at {}", game.home_team, game.away_team, game.scheduled_at);
    insert_game(pool, &game).await?;
    Ok(game.id)
}

fn event_game(event: &OddsEvent) -> Game {
    Game {
        id: event.id.clone(),
        season: season_for(event.commence_time),
        home_team: canonical_team_name(&event.home_team),
        away_team: canonical_team_name(&event.away_team),
        scheduled_at: event.commence_time,
        home_score: None,
        away_score: None,
    }
}

fn event_quotes(event: &OddsEvent, game_id: &str, fetched_at: DateTime<Utc>) -> Vec<OddsQuote> {
    let mut quotes = Vec::new();
    for bookmaker in &event.bookmakers {
        let Some(market) = bookmaker.markets.iter().find(|m| m.key == MONEYLINE_MARKET) else {
            continue;
        };
        for outcome in &market.outcomes {
            if !outcome.price.is_finite() {
                continue;
            }
            quotes.push(OddsQuote {
                game_id: game_id.to_string(),
                team: canonical_team_name(&outcome.name),
                sportsbook: bookmaker.key.clone(),
                market: MONEYLINE_MARKET.to_string(),
                price: outcome.price,
                price_format: "american".to_string(),
                observed_at: bookmaker.last_update.unwrap_or(fetched_at),
            });
        }
    }
    quotes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_current_quotes, get_game_by_id, test_pool};
    use chrono::TimeZone;

    const SAMPLE: &str = r#"[
        {
            "id": "evt-1",
            "sport_key": "basketball_nba",
            "commence_time": "2025-12-02T00:30:00Z",
            "home_team": "Boston Celtics",
            "away_team": "Miami Heat",
            "bookmakers": [
                {
                    "key": "fanduel",
                    "title": "FanDuel",
                    "last_update": "2025-12-01T18:00:00Z",
                    "markets": [
                        {"key": "h2h", "outcomes": [
                            {"name": "Boston Celtics", "price": -240},
                            {"name": "Miami Heat", "price": 198}
                        ]}
                    ]
                },
                {
                    "key": "draftkings",
                    "title": "DraftKings",
                    "markets": [
                        {"key": "spreads", "outcomes": [
                            {"name": "Boston Celtics", "price": -110}
                        ]}
                    ]
                }
            ]
        }
    ]"#;

    #[test]
    fn test_event_quotes_only_moneyline() {
        let events: Vec<OddsEvent> = serde_json::from_str(SAMPLE).unwrap();
        let fetched_at = Utc.with_ymd_and_hms(2025, 12, 1, 19, 0, 0).unwrap();
        let quotes = event_quotes(&events[0], "g1", fetched_at);

        assert_eq!(quotes.len(), 2);
        assert!(quotes.iter().all(|q| q.sportsbook == "fanduel"));
        assert_eq!(quotes[0].price, -240.0);
        assert_eq!(quotes[0].observed_at, Utc.with_ymd_and_hms(2025, 12, 1, 18, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_resolve_game_matches_existing_or_schedules() {
        let pool = test_pool().await;
        let events: Vec<OddsEvent> = serde_json::from_str(SAMPLE).unwrap();

        // Our schedule has the game under a different id and an abbreviation
        insert_game(
            &pool,
            &Game {
                id: "ours".to_string(),
                season: "2025-26".to_string(),
                home_team: "Boston Celtics".to_string(),
                away_team: "MIA".to_string(),
                scheduled_at: Utc.with_ymd_and_hms(2025, 12, 2, 1, 0, 0).unwrap(),
                home_score: None,
                away_score: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(resolve_game(&pool, &events[0]).await.unwrap(), "ours");

        let mut unknown: Vec<OddsEvent> = serde_json::from_str(SAMPLE).unwrap();
        unknown[0].home_team = "Utah Jazz".to_string();
        let id = resolve_game(&pool, &unknown[0]).await.unwrap();
        assert_eq!(id, "evt-1");
        let scheduled = get_game_by_id(&pool, "evt-1").await.unwrap().unwrap();
        assert_eq!(scheduled.season, "2025-26");
        assert_eq!(scheduled.home_win(), None);

        for quote in event_quotes(&unknown[0], &id, Utc::now()) {
            insert_odds_quote(&pool, &quote).await.unwrap();
        }
        assert_eq!(get_current_quotes(&pool, "h2h").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_log_staleness() {
        let pool = test_pool().await;
        assert!(is_stale(&pool, NBA_SPORT_KEY).await.unwrap());
        mark_fetched(&pool, NBA_SPORT_KEY).await.unwrap();
        assert!(!is_stale(&pool, NBA_SPORT_KEY).await.unwrap());
    }
}
