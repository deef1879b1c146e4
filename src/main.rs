mod api;
mod cli;
mod config;
mod db;
mod models;
mod services;
mod teams;
mod utils;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::EdgeConfig;

#[derive(Parser)]
#[command(name = "oddsedge")]
#[command(about = "NBA moneyline edge finder: power ratings, logistic win model, Kelly staking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Copy)]
struct StakeArgs {
    /// Override BANKROLL from the environment
    #[arg(short, long)]
    bankroll: Option<f64>,
    /// Calibrated probabilities, tighter filters, top 5 only
    #[arg(long)]
    strict: bool,
}

impl StakeArgs {
    fn edge_config(self) -> Result<EdgeConfig> {
        let mut config = EdgeConfig::from_env()?.with_strict(self.strict);
        if let Some(bankroll) = self.bankroll {
            config.bankroll = bankroll;
            config.validate()?;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the read-only API server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Initialize the database
    InitDb {
        /// Load demo games and odds after creating the schema
        #[arg(long)]
        seed: bool,
        /// Delete all rows first
        #[arg(long)]
        reset: bool,
    },
    /// Pull moneyline odds from The Odds API
    FetchOdds {
        #[arg(short, long)]
        force: bool,
    },
    /// Rebuild power ratings from results, or import them from CSV
    Rate {
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Fit the win-probability model on completed games
    Train,
    /// Predict upcoming games with the stored model
    Predict {
        /// Include games scheduled from this RFC3339 time (default: now)
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Price predictions against current odds
    Opportunities {
        #[command(flatten)]
        stake: StakeArgs,
    },
    /// Rate, train, predict and price in one go
    Run {
        #[command(flatten)]
        stake: StakeArgs,
        /// Keep existing ratings instead of recomputing them
        #[arg(long)]
        skip_ratings: bool,
    },
    /// Accuracy, Brier score, log loss and calibration of the stored model
    Diagnose,
    /// Query a team's rating and recent results
    Team {
        #[arg(short, long)]
        name: String,
    },
    /// Export a derived table to CSV
    Export {
        /// predictions | opportunities
        #[arg(short, long)]
        table: String,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            tracing::info!("Starting OddsEdge API server on port {}", port);
            api::serve(port).await?;
        }
        Commands::InitDb { seed, reset } => {
            tracing::info!("Initializing database...");
            let pool = db::create_pool().await?;
            if reset {
                db::clear_all_data(&pool).await?;
            }
            if seed {
                db::seed_data(&pool).await?;
            }
        }
        Commands::FetchOdds { force } => cli::fetch_odds(force).await?,
        Commands::Rate { csv } => cli::rate(csv.as_deref()).await?,
        Commands::Train => cli::train().await?,
        Commands::Predict { since } => cli::predict(since).await?,
        Commands::Opportunities { stake } => cli::opportunities(stake.edge_config()?).await?,
        Commands::Run { stake, skip_ratings } => cli::run_pipeline(stake.edge_config()?, !skip_ratings).await?,
        Commands::Diagnose => cli::diagnose().await?,
        Commands::Team { name } => {
            tracing::info!("Querying team: {}", name);
            cli::query_team(&name).await?;
        }
        Commands::Export { table, output } => cli::export(&table, &output).await?,
    }

    Ok(())
}
