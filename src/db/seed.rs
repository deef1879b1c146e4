use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::db::{insert_game, insert_odds_quote};
use crate::models::{Game, OddsQuote};
use crate::services::ev_calculator::MONEYLINE_MARKET;
use crate::services::odds::{decimal_to_american, DEFAULT_JUICE_FACTOR};
use crate::utils::season_for;

/// Results start this many days back, five games a day, so the last
/// completed game lands a few days before now.
const RESULTS_LOOKBACK_DAYS: i64 = 40;
const UPCOMING_GAMES: usize = 6;

// (team, strength in points per game over an average side)
const DEMO_TEAMS: [(&str, f64); 10] = [
    ("Oklahoma City Thunder", 9.5),
    ("Boston Celtics", 7.0),
    ("Cleveland Cavaliers", 6.0),
    ("Denver Nuggets", 4.5),
    ("New York Knicks", 3.5),
    ("Los Angeles Lakers", 1.0),
    ("Miami Heat", -0.5),
    ("Chicago Bulls", -3.0),
    ("Charlotte Hornets", -6.5),
    ("Washington Wizards", -9.0),
];

/// Home-court edge in points used for the demo scores and prices.
const HOME_EDGE: f64 = 2.5;

/// Deterministic scatter in [-11, 11] so demo results aren't all chalk.
fn scatter(a: usize, b: usize, round: usize) -> f64 {
    ((a * 37 + b * 11 + round * 17) % 23) as f64 - 11.0
}

fn demo_score(home: usize, away: usize, round: usize) -> (i32, i32) {
    let margin = DEMO_TEAMS[home].1 - DEMO_TEAMS[away].1 + HOME_EDGE + scatter(home, away, round);
    let total = 224 + ((home + away + round) % 9) as i32 * 2;
    let mut margin = margin.round() as i32;
    if margin == 0 {
        margin = 1;
    }
    let home_score = (total + margin) / 2;
    (home_score, home_score - margin)
}

/// Fair home probability from strengths, roughly 13.5 points per logit.
fn fair_home_probability(home: usize, away: usize) -> f64 {
    let diff = DEMO_TEAMS[home].1 - DEMO_TEAMS[away].1 + HOME_EDGE;
    1.0 / (1.0 + (-diff / 13.5).exp())
}

pub async fn seed_data(pool: &SqlitePool) -> Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM games")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        tracing::info!("Database already seeded ({} games found), skipping.", count);
        return Ok(());
    }

    tracing::info!("Seeding database with demo NBA games and odds...");

    // One label for results and upcoming games alike so ratings join
    // even when the window straddles the September cutover.
    let now = Utc::now();
    let season = season_for(now);
    let completed = seed_results(pool, &season, now).await?;
    let upcoming = seed_upcoming(pool, &season, now).await?;

    tracing::info!(
        "Database seeded successfully: {} completed games and {} upcoming games with odds for {}.",
        completed,
        upcoming,
        season
    );
    Ok(())
}

/// Two full round robins (home and away) of final scores.
async fn seed_results(pool: &SqlitePool, season: &str, now: DateTime<Utc>) -> Result<usize> {
    let start = now - Duration::days(RESULTS_LOOKBACK_DAYS);

    let mut seeded = 0;
    for round in 0..2 {
        for home in 0..DEMO_TEAMS.len() {
            for away in 0..DEMO_TEAMS.len() {
                if home == away {
                    continue;
                }
                let scheduled_at = start + Duration::days(seeded as i64 / 5);
                let (home_score, away_score) = demo_score(home, away, round);
                let game = Game {
                    id: format!("demo_{}_{}_{}", round, home, away),
                    season: season.to_string(),
                    home_team: DEMO_TEAMS[home].0.to_string(),
                    away_team: DEMO_TEAMS[away].0.to_string(),
                    scheduled_at,
                    home_score: Some(home_score),
                    away_score: Some(away_score),
                };
                insert_game(pool, &game).await?;
                seeded += 1;
            }
        }
    }
    Ok(seeded)
}

/// Unplayed games over the next few days, each priced by two books. One
/// book quotes American prices and the other decimal, both with margin.
async fn seed_upcoming(pool: &SqlitePool, season: &str, now: DateTime<Utc>) -> Result<usize> {
    for i in 0..UPCOMING_GAMES {
        let home = (i * 3) % DEMO_TEAMS.len();
        let away = (i * 7 + 4) % DEMO_TEAMS.len();
        let away = if away == home { (away + 1) % DEMO_TEAMS.len() } else { away };
        let scheduled_at = now + Duration::hours(20 + 24 * (i as i64 / 2));

        let game = Game {
            id: format!("upcoming_{}", i),
            season: season.to_string(),
            home_team: DEMO_TEAMS[home].0.to_string(),
            away_team: DEMO_TEAMS[away].0.to_string(),
            scheduled_at,
            home_score: None,
            away_score: None,
        };
        insert_game(pool, &game).await?;

        let fair_home = fair_home_probability(home, away);
        // Books shade the sides differently so the best price moves around
        let books = [("fanduel", "american", 0.02), ("draftkings", "decimal", -0.02)];
        for (book, format, shade) in books {
            for (team, fair) in [(home, fair_home + shade), (away, 1.0 - fair_home - shade)] {
                let decimal = 1.0 / (fair.clamp(0.05, 0.95) * DEFAULT_JUICE_FACTOR);
                let price = if format == "american" {
                    decimal_to_american(decimal) as f64
                } else {
                    (decimal * 100.0).round() / 100.0
                };
                insert_odds_quote(
                    pool,
                    &OddsQuote {
                        game_id: game.id.clone(),
                        team: DEMO_TEAMS[team].0.to_string(),
                        sportsbook: book.to_string(),
                        market: MONEYLINE_MARKET.to_string(),
                        price,
                        price_format: format.to_string(),
                        observed_at: now,
                    },
                )
                .await?;
            }
        }
    }
    Ok(UPCOMING_GAMES)
}
