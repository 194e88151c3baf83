//! Rank-position percentile bands pooled across replicates, plus the linear
//! interpolation quantile used by the summary.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};
use std::ops::Range;

use crate::error::{BootstrapError, Result};
use crate::ordering::RankOrderedReplicate;
use crate::series::Observation;

/// Percentile band `[lower, upper]`, both in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBand {
    lower: f64,
    upper: f64,
}

impl PercentileBand {
    pub const LOWER_TAIL: Self = Self { lower: 0.0, upper: 5.0 };
    pub const UPPER_TAIL: Self = Self { lower: 95.0, upper: 100.0 };

    /// Requires `0 <= lower < upper <= 100`; NaN bounds are rejected.
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !(0.0 <= lower && lower < upper && upper <= 100.0) {
            return Err(BootstrapError::InvalidRange { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Rank positions selected in a replicate of `n` rows.
    ///
    /// `floor(lower% × n) .. ceil(upper% × n)`, clamped to `n`. When that
    /// slice is empty and `n > 0` a single row at the start position is kept.
    pub fn rank_range(&self, n: usize) -> Range<usize> {
        if n == 0 {
            return 0..0;
        }
        let nf = n as f64;
        let start = ((self.lower * nf / 100.0).floor() as usize).min(n);
        let end = ((self.upper * nf / 100.0).ceil() as usize).min(n);
        if start < end {
            start..end
        } else {
            let start = start.min(n - 1);
            start..start + 1
        }
    }

    /// Label used in file names, e.g. `0_5` or `95_100`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.lower, self.upper)
    }
}

/// Pooled tail rows (chronological) and the median of their changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandExtract {
    pub band: PercentileBand,
    pub rows: Vec<Observation>,
    pub median: f64,
}

/// Select the band from every ordered replicate, pool the rows and take the
/// median of the pooled `change_pct`.
pub fn extract_band(
    ordered: &[RankOrderedReplicate],
    lower_pct: f64,
    upper_pct: f64,
) -> Result<BandExtract> {
    let band = PercentileBand::new(lower_pct, upper_pct)?;
    extract(ordered, band)
}

pub fn extract(ordered: &[RankOrderedReplicate], band: PercentileBand) -> Result<BandExtract> {
    let mut rows: Vec<Observation> = ordered
        .iter()
        .flat_map(|rep| {
            let obs = rep.observations();
            obs[band.rank_range(obs.len())].iter().copied()
        })
        .collect();

    if rows.is_empty() {
        return Err(BootstrapError::EmptySelection {
            lower: band.lower,
            upper: band.upper,
        });
    }

    let median = Data::new(rows.iter().map(|o| o.change_pct).collect::<Vec<_>>()).median();
    rows.sort_by_key(|o| o.date);
    Ok(BandExtract { band, rows, median })
}

/// Linear-interpolation quantile over ascending `sorted` data.
///
/// Uses `rank = p / 100 × (n - 1)` and interpolates between the neighbouring
/// order statistics. Returns `None` for empty input.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        1 => Some(sorted[0]),
        _ => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = rank - lo as f64;
            Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
        }
    }
}

/// Quantile of unsorted data; sorts a copy first.
pub fn quantile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, p)
}
