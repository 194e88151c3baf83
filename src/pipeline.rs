use anyhow::{Context, Result};
use serde::Serialize;
use statrs::statistics::Statistics;
use std::path::Path;
use tracing::info;

use crate::bootstrap::{BootstrapConfig, BootstrapOutput, run_bootstrap};
use crate::export::{self, DataFiles};
use crate::percentile::{BandExtract, PercentileBand};
use crate::sampler::BlockLayout;
use crate::series::{SourceSeries, load_closing, load_source_series, price_changes, price_ratio};
use crate::summary::{HistoricTails, TailSpread, historic_tails};
use crate::{RatioArgs, ReplicatesArgs};

/// Build `{a}_{b}_price.csv` and `{a}_{b}_price_change.csv` from the two
/// closing files, plus the change-ordered history.
pub fn build_ratio(args: &RatioArgs) -> Result<HistoricTails> {
    let data_dir = args.data_dir.as_ref().context("missing --data-dir")?;
    let a = args.asset_a.as_deref().context("missing --asset-a")?;
    let b = args.asset_b.as_deref().context("missing --asset-b")?;
    let years = args.years.unwrap_or(2);
    let files = DataFiles::new(data_dir, a, b);

    let closes_a = load_closing(&export::closing_file(data_dir, a, years)).context("read asset A")?;
    let closes_b = load_closing(&export::closing_file(data_dir, b, years)).context("read asset B")?;
    info!(
        "calculating {}/{} price ratio ({} and {} closes)",
        files.asset_a(),
        files.asset_b(),
        closes_a.len(),
        closes_b.len()
    );

    let ratio = price_ratio(&closes_a, &closes_b);
    let changes = price_changes(&ratio);
    info!("{} rows after removing day 0", changes.len());
    let series = SourceSeries::new(changes)?;
    let tails = historic_tails(&series)?;

    export::write_ratio(&files, &ratio)?;
    export::write_observations(&files.price_change(), series.observations())?;
    export::write_observations(&files.price_change_ordered(), &tails.ordered)?;

    println!(
        "{}/{} history: {} days, 5th pct {:+.3}%, 95th pct {:+.3}%",
        files.asset_a(),
        files.asset_b(),
        series.len(),
        tails.lower_5th_pct,
        tails.upper_95th_pct
    );
    Ok(tails)
}

#[derive(Debug, Clone, Serialize)]
pub struct BandReport {
    pub lower_pct: f64,
    pub upper_pct: f64,
    pub rows: usize,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pair: String,
    pub observations: usize,
    pub layout: BlockLayout,
    pub n_replicates: usize,
    pub seed: u64,
    pub parallel: bool,
    pub historic_lower_5th_pct: f64,
    pub historic_upper_95th_pct: f64,
    pub lower_band: BandReport,
    pub upper_band: BandReport,
    pub lower_5th_spread: Option<TailSpread>,
    pub upper_95th_spread: Option<TailSpread>,
}

fn band_report(band: &PercentileBand, extract: &BandExtract) -> BandReport {
    let changes: Vec<f64> = extract.rows.iter().map(|o| o.change_pct).collect();
    BandReport {
        lower_pct: band.lower(),
        upper_pct: band.upper(),
        rows: changes.len(),
        median: extract.median,
        min: Statistics::min(changes.iter()),
        max: Statistics::max(changes.iter()),
    }
}

impl RunReport {
    fn new(
        files: &DataFiles,
        config: &BootstrapConfig,
        historic: &HistoricTails,
        out: &BootstrapOutput,
    ) -> Self {
        Self {
            pair: format!("{}_{}", files.asset_a(), files.asset_b()),
            observations: historic.ordered.len(),
            layout: out.layout,
            n_replicates: out.replicates.len(),
            seed: config.seed,
            parallel: config.parallel,
            historic_lower_5th_pct: historic.lower_5th_pct,
            historic_upper_95th_pct: historic.upper_95th_pct,
            lower_band: band_report(&config.lower_band, &out.lower),
            upper_band: band_report(&config.upper_band, &out.upper),
            lower_5th_spread: out.summary.lower_spread(),
            upper_95th_spread: out.summary.upper_spread(),
        }
    }

    pub fn render(&self) -> String {
        let spread = |s: &Option<TailSpread>| match s {
            Some(s) => format!(
                "median {:+.6}%, 2.5th {:+.6}%, 97.5th {:+.6}%",
                s.median, s.p2_5, s.p97_5
            ),
            None => "n/a".to_string(),
        };
        format!(
            "Pair: {}\nObservations: {}\nBlock size: {}\nBlocks per replicate: {}\nReplicates: {}\nSeed: {}\n\
             Historic 5th/95th pct: {:+.6}% / {:+.6}%\n\
             Pooled {}-{} band: {} rows, median {:+.6}%\n\
             Pooled {}-{} band: {} rows, median {:+.6}%\n\
             Replicate 5th pct: {}\nReplicate 95th pct: {}\n",
            self.pair,
            self.observations,
            self.layout.block_size,
            self.layout.block_count,
            self.n_replicates,
            self.seed,
            self.historic_lower_5th_pct,
            self.historic_upper_95th_pct,
            self.lower_band.lower_pct,
            self.lower_band.upper_pct,
            self.lower_band.rows,
            self.lower_band.median,
            self.upper_band.lower_pct,
            self.upper_band.upper_pct,
            self.upper_band.rows,
            self.upper_band.median,
            spread(&self.lower_5th_spread),
            spread(&self.upper_95th_spread),
        )
    }
}

pub fn config_from_args(args: &ReplicatesArgs) -> Result<BootstrapConfig> {
    let lower = args.lower_band.as_deref().unwrap_or(&[0.0, 5.0]);
    let upper = args.upper_band.as_deref().unwrap_or(&[95.0, 100.0]);
    Ok(BootstrapConfig {
        n_replicates: args.n_replicates.context("missing --n-replicates")?,
        seed: args.seed.unwrap_or(42),
        block_size: args.block_size,
        lower_band: band_from(lower)?,
        upper_band: band_from(upper)?,
        parallel: args.parallel.unwrap_or(false),
    })
}

fn band_from(bounds: &[f64]) -> Result<PercentileBand> {
    match bounds {
        [lower, upper] => Ok(PercentileBand::new(*lower, *upper)?),
        other => anyhow::bail!("a band needs exactly two bounds, got {:?}", other),
    }
}

/// Load the change series, resample it and persist every output.
///
/// Nothing is written unless the whole computation succeeds.
pub fn execute(args: &ReplicatesArgs) -> Result<RunReport> {
    let data_dir = args.data_dir.as_ref().context("missing --data-dir")?;
    let a = args.asset_a.as_deref().context("missing --asset-a")?;
    let b = args.asset_b.as_deref().context("missing --asset-b")?;
    let files = DataFiles::new(data_dir, a, b);
    let config = config_from_args(args)?;

    let report = run_for_files(&files, &config, args.write_replicates.unwrap_or(true))?;
    println!("{}", report.render());
    Ok(report)
}

pub fn run_for_files(
    files: &DataFiles,
    config: &BootstrapConfig,
    write_replicates: bool,
) -> Result<RunReport> {
    let series = load_source_series(&files.price_change())?;
    let historic = historic_tails(&series)?;
    let out = run_bootstrap(&series, config)?;
    let report = RunReport::new(files, config, &historic, &out);
    persist(files, &out, &report, write_replicates)?;
    Ok(report)
}

fn persist(
    files: &DataFiles,
    out: &BootstrapOutput,
    report: &RunReport,
    write_replicates: bool,
) -> Result<()> {
    if write_replicates {
        export::write_replicates(files, &out.replicates)?;
        export::write_ordered_replicates(files, &out.ordered)?;
    }
    export::write_band(files, &out.lower)?;
    export::write_band(files, &out.upper)?;
    export::write_summary(files, &out.summary)?;
    export::write_json_atomic(&files.report(), report)?;
    info!("results written to {}", display_dir(files.dir()));
    Ok(())
}

fn display_dir(dir: &Path) -> String {
    dir.canonicalize()
        .unwrap_or_else(|_| dir.to_path_buf())
        .display()
        .to_string()
}
