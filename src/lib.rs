pub mod bootstrap;
pub mod error;
pub mod export;
pub mod fetch;
pub mod ordering;
pub mod percentile;
pub mod pipeline;
pub mod replicates;
pub mod sampler;
pub mod series;
pub mod summary;

pub use error::BootstrapError;

use clap::Parser;
use std::path::PathBuf;

/// Download daily closing prices from CryptoCompare
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about)]
pub struct FetchArgs {
    /// Output directory for closing CSVs
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Asset symbols to download (e.g. btc eth)
    #[arg(long, num_args = 1..)]
    pub assets: Option<Vec<String>>,

    /// Quote currency
    #[arg(long)]
    pub fiat: Option<String>,

    /// Years of history to keep
    #[arg(long)]
    pub years: Option<u32>,

    /// Delay (ms) between assets to avoid bursts
    #[arg(long)]
    pub request_delay_ms: Option<u64>,

    /// Download even when the existing file is up to date
    #[arg(long)]
    pub force: Option<bool>,

    /// Optional lock file path to prevent concurrent runs
    #[arg(long)]
    pub lock_file: Option<PathBuf>,

    /// CryptoCompare API key (or set CRYPTOCOMPARE_API_KEY env)
    #[arg(long)]
    pub api_key: Option<String>,
}

/// Build the price ratio and daily change files for an asset pair.
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about)]
pub struct RatioArgs {
    /// Directory holding the closing CSVs; outputs land here too
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Numerator asset
    #[arg(long)]
    pub asset_a: Option<String>,
    /// Denominator asset
    #[arg(long)]
    pub asset_b: Option<String>,
    /// Years suffix of the closing files
    #[arg(long)]
    pub years: Option<u32>,
}

/// Block-bootstrap the daily ratio changes and report tail percentiles.
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about)]
pub struct ReplicatesArgs {
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    #[arg(long)]
    pub asset_a: Option<String>,
    #[arg(long)]
    pub asset_b: Option<String>,

    /// Number of bootstrap replicates
    #[arg(long)]
    pub n_replicates: Option<usize>,

    /// RNG seed; identical seeds reproduce identical outputs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fixed block size (default: round(sqrt(N)))
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Lower tail band in percent, e.g. `--lower-band 0 5`
    #[arg(long, num_args = 2, allow_negative_numbers = true)]
    pub lower_band: Option<Vec<f64>>,

    /// Upper tail band in percent, e.g. `--upper-band 95 100`
    #[arg(long, num_args = 2, allow_negative_numbers = true)]
    pub upper_band: Option<Vec<f64>>,

    /// Generate replicates in parallel
    #[arg(long)]
    pub parallel: Option<bool>,

    /// Also write the full replicate and ordered-replicate CSVs
    #[arg(long)]
    pub write_replicates: Option<bool>,
}
