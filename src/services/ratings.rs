use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::db::{get_completed_games, get_seasons, replace_power_ratings};
use crate::models::{Game, PowerRating};
use crate::teams::canonical_team_name;

#[derive(Debug, Default, Clone)]
struct TeamLine {
    games: i32,
    wins: i32,
    losses: i32,
    points_for: i64,
    points_against: i64,
}

pub struct RatingCalculator;

impl RatingCalculator {
    /// Season summaries from final scores. The rating is the average
    /// point margin per game.
    pub fn season_ratings(season: &str, games: &[Game]) -> Vec<PowerRating> {
        let mut lines: BTreeMap<String, TeamLine> = BTreeMap::new();

        for game in games.iter().filter(|g| g.season == season) {
            let (Some(home_score), Some(away_score)) = (game.home_score, game.away_score) else {
                continue;
            };

            for (team, scored, allowed) in [
                (&game.home_team, home_score, away_score),
                (&game.away_team, away_score, home_score),
            ] {
                let line = lines.entry(team.clone()).or_default();
                line.games += 1;
                line.points_for += scored as i64;
                line.points_against += allowed as i64;
                match scored.cmp(&allowed) {
                    std::cmp::Ordering::Greater => line.wins += 1,
                    std::cmp::Ordering::Less => line.losses += 1,
                    std::cmp::Ordering::Equal => {}
                }
            }
        }

        let now = Utc::now();
        let mut ratings: Vec<PowerRating> = lines
            .into_iter()
            .map(|(team, line)| {
                let games = line.games as f64;
                let pf = line.points_for as f64 / games;
                let pa = line.points_against as f64 / games;
                PowerRating {
                    team,
                    season: season.to_string(),
                    rating: pf - pa,
                    games_played: line.games,
                    wins: line.wins,
                    losses: line.losses,
                    points_for_avg: pf,
                    points_against_avg: pa,
                    updated_at: now,
                }
            })
            .collect();

        ratings.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap_or(std::cmp::Ordering::Equal));
        ratings
    }

    /// Rebuild the ratings of one season from its completed games.
    pub async fn rate_season(pool: &SqlitePool, season: &str) -> Result<Vec<PowerRating>> {
        let mut tx = pool.begin().await?;
        let ratings = Self::rate_season_in(&mut tx, season).await?;
        tx.commit().await?;
        Ok(ratings)
    }

    /// Same as [`Self::rate_season`] on an open connection; the caller owns
    /// the transaction.
    pub async fn rate_season_in(conn: &mut SqliteConnection, season: &str) -> Result<Vec<PowerRating>> {
        let games = get_completed_games(&mut *conn, Some(season)).await?;
        let ratings = Self::season_ratings(season, &games);
        replace_power_ratings(conn, season, &ratings).await?;

        tracing::info!(
            "Rated {} teams for {} from {} completed games",
            ratings.len(),
            season,
            games.len()
        );
        Ok(ratings)
    }

    pub async fn rate_all_seasons(pool: &SqlitePool) -> Result<usize> {
        let mut tx = pool.begin().await?;
        let total = Self::rate_all_seasons_in(&mut tx).await?;
        tx.commit().await?;
        Ok(total)
    }

    pub async fn rate_all_seasons_in(conn: &mut SqliteConnection) -> Result<usize> {
        let mut total = 0;
        for season in get_seasons(&mut *conn).await? {
            total += Self::rate_season_in(conn, &season).await?.len();
        }
        Ok(total)
    }
}

/// One row of an externally sourced ratings sheet.
#[derive(Debug, Deserialize)]
struct RatingRecord {
    team: String,
    season: String,
    rating: f64,
    #[serde(default)]
    games_played: Option<i32>,
    #[serde(default)]
    wins: Option<i32>,
    #[serde(default)]
    losses: Option<i32>,
    #[serde(default)]
    points_for_avg: Option<f64>,
    #[serde(default)]
    points_against_avg: Option<f64>,
}

/// Parse a `team,season,rating[,...]` CSV, grouping rows by season.
pub fn read_ratings_csv<R: std::io::Read>(reader: R) -> Result<HashMap<String, Vec<PowerRating>>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let now = Utc::now();
    let mut by_season: HashMap<String, Vec<PowerRating>> = HashMap::new();

    for (line, record) in csv_reader.deserialize::<RatingRecord>().enumerate() {
        // +2: header row and 1-based numbering
        let record = record.with_context(|| format!("ratings CSV row {}", line + 2))?;
        if !record.rating.is_finite() {
            anyhow::bail!("ratings CSV row {}: rating is not a number", line + 2);
        }

        by_season.entry(record.season.clone()).or_default().push(PowerRating {
            team: canonical_team_name(&record.team),
            season: record.season,
            rating: record.rating,
            games_played: record.games_played.unwrap_or(0),
            wins: record.wins.unwrap_or(0),
            losses: record.losses.unwrap_or(0),
            points_for_avg: record.points_for_avg.unwrap_or(0.0),
            points_against_avg: record.points_against_avg.unwrap_or(0.0),
            updated_at: now,
        });
    }

    Ok(by_season)
}

/// Replace the ratings of every season present in the file. All seasons
/// land together or not at all.
pub async fn import_ratings_csv(pool: &SqlitePool, path: &Path) -> Result<usize> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let by_season = read_ratings_csv(file)?;

    let mut tx = pool.begin().await?;
    let mut total = 0;
    for (season, ratings) in &by_season {
        replace_power_ratings(&mut tx, season, ratings).await?;
        tracing::info!("Imported {} ratings for {}", ratings.len(), season);
        total += ratings.len();
    }
    tx.commit().await?;
    Ok(total)
}
