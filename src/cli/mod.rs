use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::config::EdgeConfig;
use crate::db::{
    create_pool, get_game_by_id, get_model_parameters, get_opportunities, get_predictions, get_team_profile,
};
use crate::models::BettingOpportunity;
use crate::services::odds_fetcher::{refresh_odds, NBA_SPORT_KEY};
use crate::services::{
    import_ratings_csv, pipeline, EdgeCalculator, ModelDiagnostics, PredictionEngine, RatingCalculator,
};
use crate::teams::{abbreviation, canonical_team_name};
use crate::utils::{format_american, format_money, format_signed_pct};

pub async fn fetch_odds(force: bool) -> Result<()> {
    let pool = create_pool().await?;
    let api_key = std::env::var("ODDS_API_KEY").context("ODDS_API_KEY must be set to fetch odds")?;

    println!("📥 Fetching NBA moneyline odds...");
    let stored = refresh_odds(&pool, &api_key, NBA_SPORT_KEY, force).await?;

    if stored == 0 {
        println!("⏭️  Odds are fresh, nothing fetched. Use --force to refetch.");
    } else {
        println!("✅ Stored {} quotes", stored);
    }
    Ok(())
}

pub async fn rate(csv: Option<&Path>) -> Result<()> {
    let pool = create_pool().await?;

    let written = match csv {
        Some(path) => {
            println!("📥 Importing power ratings from {}...", path.display());
            import_ratings_csv(&pool, path).await?
        }
        None => {
            println!("📊 Computing power ratings from completed games...");
            RatingCalculator::rate_all_seasons(&pool).await?
        }
    };

    println!("✅ Wrote {} team ratings", written);
    Ok(())
}

pub async fn train() -> Result<()> {
    let pool = create_pool().await?;

    println!("🧠 Training logistic model on completed games...");
    let params = PredictionEngine::train(&pool).await?;

    println!("✅ {} trained on {} games", params.model_version, params.training_rows);
    println!("   Intercept: {:.4}", params.intercept);
    println!("   Slope:     {:.4} per rating point", params.slope);
    println!("   Iterations: {}", params.iterations);
    Ok(())
}

pub async fn predict(since: Option<DateTime<Utc>>) -> Result<()> {
    let pool = create_pool().await?;

    println!("🔮 Generating predictions for upcoming games...");
    let predictions = PredictionEngine::generate_predictions(&pool, since.unwrap_or_else(Utc::now)).await?;

    if predictions.is_empty() {
        println!("📭 No upcoming games found. Try fetching odds first with: oddsedge fetch-odds");
        return Ok(());
    }

    println!("✅ Generated {} predictions!\n", predictions.len());
    for (i, prediction) in predictions.iter().enumerate() {
        let when = get_game_by_id(&pool, &prediction.game_id)
            .await?
            .map(|g| g.scheduled_at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{}. {} vs {} ({}):", i + 1, prediction.home_team, prediction.away_team, when);
        println!(
            "   Home win: {:.1}% | Away win: {:.1}% | Rating diff: {:+.1}",
            prediction.home_win_probability * 100.0,
            prediction.away_win_probability * 100.0,
            prediction.power_diff
        );
        println!("   Pick: {} (confidence {:.1}%)\n", prediction.predicted_winner, prediction.confidence * 100.0);
    }
    Ok(())
}

pub async fn opportunities(config: EdgeConfig) -> Result<()> {
    let pool = create_pool().await?;
    let calculator = EdgeCalculator::new(config);

    println!("🎯 Finding betting opportunities...\n");
    let found = calculator.find_opportunities(&pool).await?;
    print_opportunities(&found, calculator.config());
    Ok(())
}

pub async fn run_pipeline(config: EdgeConfig, rate: bool) -> Result<()> {
    let pool = create_pool().await?;
    let calculator = EdgeCalculator::new(config);

    println!("🚀 Running rate → train → predict → opportunities...");
    let report = pipeline::run(&pool, &calculator, Utc::now(), rate).await?;

    if let Some(ratings) = report.ratings {
        println!("   Ratings: {}", ratings);
    }
    println!(
        "   Model: {} on {} games (b0 {:.4}, b1 {:.4})",
        report.model.model_version, report.model.training_rows, report.model.intercept, report.model.slope
    );
    println!("   Predictions: {}\n", report.predictions);
    print_opportunities(&report.opportunities, calculator.config());
    Ok(())
}

fn print_opportunities(found: &[BettingOpportunity], config: &EdgeConfig) {
    if found.is_empty() {
        println!("📭 No priced opportunities. Predicted sides need a current quote and must pass the edge filters.");
        println!("💡 Make sure predictions exist: oddsedge predict");
        return;
    }

    let mode = if config.strict.is_some() { " (strict)" } else { "" };
    println!("💰 Opportunities{} for a {} bankroll:\n", mode, format_money(config.bankroll));

    for (i, opp) in found.iter().enumerate() {
        println!(
            "{}. {} @ {} ({}, {:.2})",
            i + 1,
            opp.team,
            opp.sportsbook,
            format_american(opp.american_price),
            opp.decimal_price
        );
        println!(
            "   Model {:.1}% vs implied {:.1}% → edge {}",
            opp.model_probability * 100.0,
            opp.implied_probability * 100.0,
            format_signed_pct(opp.edge_pct)
        );
        println!(
            "   Kelly {:.2}% → stake {}\n",
            opp.kelly_fraction * 100.0,
            format_money(opp.recommended_stake)
        );
    }

    let total: f64 = found.iter().map(|o| o.recommended_stake).sum();
    println!("   Total recommended: {}", format_money(total));
}

pub async fn diagnose() -> Result<()> {
    let pool = create_pool().await?;

    println!("🩺 Scoring the stored model on completed games...\n");
    let diag = ModelDiagnostics::for_stored_model(&pool).await?;

    println!("   Games:         {}", diag.games);
    println!("   Accuracy:      {:.1}%", diag.accuracy * 100.0);
    println!("   Brier score:   {:.4}", diag.brier_score);
    println!("   Log loss:      {:.4}", diag.log_loss);
    println!("   Home win rate: {:.1}%", diag.home_win_rate * 100.0);

    println!("\n📈 Calibration:");
    println!("   {:<12} {:>6} {:>10} {:>10}", "bucket", "games", "predicted", "observed");
    for bucket in &diag.calibration {
        println!(
            "   {:<12} {:>6} {:>9.1}% {:>9.1}%",
            format!("{:.1}-{:.1}", bucket.lower, bucket.upper),
            bucket.games,
            bucket.mean_predicted * 100.0,
            bucket.observed_rate * 100.0
        );
    }
    Ok(())
}

pub async fn query_team(team_name: &str) -> Result<()> {
    let pool = create_pool().await?;
    let team = canonical_team_name(team_name);

    match abbreviation(&team) {
        Some(abbr) => println!("🔍 Searching for team: {} ({})", team, abbr),
        None => println!("🔍 Searching for team: {}", team),
    }
    let profile = get_team_profile(&pool, &team, 5).await?;

    match &profile.rating {
        Some(rating) => {
            println!("📊 {} ({}):", profile.team, rating.season);
            println!("   Power rating: {:+.2}", rating.rating);
            println!("   Record: {}-{}", rating.wins, rating.losses);
            println!(
                "   Points: {:.1} for / {:.1} against",
                rating.points_for_avg, rating.points_against_avg
            );
        }
        None => println!("❌ No power rating for '{}'. Run: oddsedge rate", profile.team),
    }

    println!("\n📅 Recent Games:");
    if profile.recent_games.is_empty() {
        println!("   No completed games found");
    }
    for game in &profile.recent_games {
        let at_home = game.home_team == profile.team;
        let (opponent, venue) = if at_home { (&game.away_team, "vs") } else { (&game.home_team, "at") };
        let result = match game.home_win() {
            Some(home_won) if home_won == at_home => "W",
            Some(_) => "L",
            None => "?",
        };
        println!(
            "   {} {} {} ({}-{}) {}",
            game.scheduled_at.format("%m/%d"),
            venue,
            opponent,
            game.home_score.unwrap_or_default(),
            game.away_score.unwrap_or_default(),
            result
        );
    }

    if let Some(params) = get_model_parameters(&pool).await? {
        println!("\n🧠 Model in use: {} (trained {})", params.model_version, params.trained_at.format("%Y-%m-%d"));
    }
    Ok(())
}

/// Write the stored predictions or opportunities table to a CSV file.
pub async fn export(table: &str, path: &Path) -> Result<()> {
    let pool = create_pool().await?;
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;

    let rows = match table {
        "predictions" => {
            let predictions = get_predictions(&pool).await?;
            for prediction in &predictions {
                writer.serialize(prediction)?;
            }
            predictions.len()
        }
        "opportunities" => {
            let opportunities = get_opportunities(&pool).await?;
            for opportunity in &opportunities {
                writer.serialize(opportunity)?;
            }
            opportunities.len()
        }
        other => anyhow::bail!("Unknown table '{}'. Use 'predictions' or 'opportunities'", other),
    };
    writer.flush()?;

    println!("✅ Exported {} {} to {}", rows, table, path.display());
    Ok(())
}
