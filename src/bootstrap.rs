//! End-to-end resampling run: generate → order → extract bands → summarize.
//!
//! Pure computation; reading the source series and writing results is done
//! by the caller (see `pipeline`).

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::ordering::{RankOrderedReplicate, order_all};
use crate::percentile::{BandExtract, PercentileBand, extract};
use crate::replicates::{Replicate, ReplicateGenerator};
use crate::sampler::BlockLayout;
use crate::series::SourceSeries;
use crate::summary::{Summary, summarize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Number of replicates (default 100).
    pub n_replicates: usize,
    /// Master RNG seed.
    pub seed: u64,
    /// Fixed block size; `None` uses `round(sqrt(N))`.
    pub block_size: Option<usize>,
    pub lower_band: PercentileBand,
    pub upper_band: PercentileBand,
    /// Generate replicates on the rayon pool with per-replicate seeds.
    pub parallel: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_replicates: 100,
            seed: 42,
            block_size: None,
            lower_band: PercentileBand::LOWER_TAIL,
            upper_band: PercentileBand::UPPER_TAIL,
            parallel: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapOutput {
    pub layout: BlockLayout,
    pub replicates: Vec<Replicate>,
    pub ordered: Vec<RankOrderedReplicate>,
    pub lower: BandExtract,
    pub upper: BandExtract,
    pub summary: Summary,
}

pub fn run_bootstrap(series: &SourceSeries, config: &BootstrapConfig) -> Result<BootstrapOutput> {
    let generator = ReplicateGenerator::new().with_block_size(config.block_size);
    let layout = generator.layout(series)?;

    let replicates = if config.parallel {
        generator.generate_par(series, config.n_replicates, config.seed)?
    } else {
        let mut rng = StdRng::seed_from_u64(config.seed);
        generator.generate(series, config.n_replicates, &mut rng)?
    };
    info!(
        "generated {} replicates ({} rows each)",
        replicates.len(),
        layout.replicate_len()
    );

    let ordered = order_all(&replicates);
    let lower = extract(&ordered, config.lower_band)?;
    let upper = extract(&ordered, config.upper_band)?;
    info!(
        "pooled medians: {} band = {:.6}, {} band = {:.6}",
        config.lower_band.label(),
        lower.median,
        config.upper_band.label(),
        upper.median
    );
    let summary = summarize(&ordered)?;

    Ok(BootstrapOutput {
        layout,
        replicates,
        ordered,
        lower,
        upper,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BootstrapError;
    use crate::series::Observation;
    use chrono::NaiveDate;

    fn series(n: usize) -> SourceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        SourceSeries::new(
            (0..n)
                .map(|i| Observation {
                    date: start + chrono::Duration::days(i as i64),
                    ratio: 1.0 + i as f64 / 100.0,
                    change_pct: ((i * 37) % 21) as f64 - 10.0,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn minimum_series_and_single_replicate() {
        let config = BootstrapConfig {
            n_replicates: 1,
            ..Default::default()
        };
        let out = run_bootstrap(&series(2), &config).unwrap();
        assert_eq!(out.replicates.len(), 1);
        assert_eq!(out.replicates[0].len(), 2);
        assert_eq!(out.summary.rows.len(), 1);
        assert_eq!(out.lower.rows.len(), 1);
        assert_eq!(out.upper.rows.len(), 1);
    }

    #[test]
    fn same_seed_same_output() {
        let s = series(60);
        for parallel in [false, true] {
            let config = BootstrapConfig {
                n_replicates: 25,
                seed: 7,
                parallel,
                ..Default::default()
            };
            let a = run_bootstrap(&s, &config).unwrap();
            let b = run_bootstrap(&s, &config).unwrap();
            assert_eq!(a.replicates, b.replicates);
            assert_eq!(a.summary, b.summary);
            assert_eq!(a.lower, b.lower);
        }
    }

    #[test]
    fn zero_replicates_rejected() {
        let config = BootstrapConfig {
            n_replicates: 0,
            ..Default::default()
        };
        assert!(matches!(
            run_bootstrap(&series(10), &config),
            Err(BootstrapError::InvalidCount(0))
        ));
    }
}
