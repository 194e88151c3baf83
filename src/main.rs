use std::path::PathBuf;

use anyhow::Result;
use ratio_tails::{FetchArgs, RatioArgs, ReplicatesArgs, fetch, pipeline};

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    Fetch(FetchArgs),
    Ratio(RatioArgs),
    Replicates(ReplicatesArgs),
}

fn default_data_dir() -> PathBuf {
    std::env::var("RATIO_TAILS_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data"))
}

fn apply_fetch_defaults(args: &mut FetchArgs) {
    if args.out.is_none() {
        args.out = Some(default_data_dir());
    }
    if args.assets.is_none() {
        args.assets = Some(vec!["btc".to_string(), "eth".to_string()]);
    }
    if args.fiat.is_none() {
        args.fiat = Some("usd".to_string());
    }
    if args.years.is_none() {
        args.years = Some(2);
    }
    if args.request_delay_ms.is_none() {
        args.request_delay_ms = Some(1000);
    }
    if args.force.is_none() {
        args.force = Some(false);
    }
}

fn apply_ratio_defaults(args: &mut RatioArgs) {
    if args.data_dir.is_none() {
        args.data_dir = Some(default_data_dir());
    }
    if args.asset_a.is_none() {
        args.asset_a = Some("btc".to_string());
    }
    if args.asset_b.is_none() {
        args.asset_b = Some("eth".to_string());
    }
    if args.years.is_none() {
        args.years = Some(2);
    }
}

fn apply_replicates_defaults(args: &mut ReplicatesArgs) {
    if args.data_dir.is_none() {
        args.data_dir = Some(default_data_dir());
    }
    if args.asset_a.is_none() {
        args.asset_a = Some("btc".to_string());
    }
    if args.asset_b.is_none() {
        args.asset_b = Some("eth".to_string());
    }
    if args.n_replicates.is_none() {
        args.n_replicates = Some(100);
    }
    if args.seed.is_none() {
        args.seed = Some(42);
    }
    if args.lower_band.is_none() {
        args.lower_band = Some(vec![0.0, 5.0]);
    }
    if args.upper_band.is_none() {
        args.upper_band = Some(vec![95.0, 100.0]);
    }
    if args.parallel.is_none() {
        args.parallel = Some(false);
    }
    if args.write_replicates.is_none() {
        args.write_replicates = Some(true);
    }
}

async fn run(command: Option<Command>) -> Result<()> {
    match command {
        Some(Command::Fetch(mut fetch_args)) => {
            apply_fetch_defaults(&mut fetch_args);
            fetch::execute(&fetch_args).await?;
        }
        Some(Command::Ratio(mut ratio_args)) => {
            apply_ratio_defaults(&mut ratio_args);
            pipeline::build_ratio(&ratio_args)?;
        }
        Some(Command::Replicates(mut replicates_args)) => {
            apply_replicates_defaults(&mut replicates_args);
            pipeline::execute(&replicates_args)?;
        }
        None => {
            // Default behavior: BTC/ETH end to end with defaults
            println!("Running with default arguments...");
            println!("1. Fetching daily closes...");
            let mut fetch_args = FetchArgs::default();
            apply_fetch_defaults(&mut fetch_args);
            fetch::execute(&fetch_args).await?;

            println!("2. Building price ratio and daily changes...");
            let mut ratio_args = RatioArgs::default();
            apply_ratio_defaults(&mut ratio_args);
            pipeline::build_ratio(&ratio_args)?;

            println!("3. Generating replicates...");
            let mut replicates_args = ReplicatesArgs::default();
            apply_replicates_defaults(&mut replicates_args);
            pipeline::execute(&replicates_args)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args.command).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
