use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};

use crate::error::{BootstrapError, Result};
use crate::ordering::RankOrderedReplicate;
use crate::percentile::quantile_sorted;
use crate::series::{Observation, SourceSeries};

pub const LOWER_PCT: f64 = 5.0;
pub const UPPER_PCT: f64 = 95.0;

/// Tail percentiles of one replicate's daily changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub replicate_id: usize,
    pub lower_5th_pct: f64,
    pub upper_95th_pct: f64,
}

/// One [`SummaryRow`] per replicate, in replicate order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub rows: Vec<SummaryRow>,
}

impl Summary {
    /// `(replicate_id, lower_5th_pct)` ascending by the lower tail.
    pub fn by_lower(&self) -> Vec<(usize, f64)> {
        let mut out: Vec<(usize, f64)> = self
            .rows
            .iter()
            .map(|r| (r.replicate_id, r.lower_5th_pct))
            .collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    /// `(replicate_id, upper_95th_pct)` ascending by the upper tail.
    pub fn by_upper(&self) -> Vec<(usize, f64)> {
        let mut out: Vec<(usize, f64)> = self
            .rows
            .iter()
            .map(|r| (r.replicate_id, r.upper_95th_pct))
            .collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    pub fn lower_spread(&self) -> Option<TailSpread> {
        TailSpread::of(&self.by_lower().into_iter().map(|(_, v)| v).collect::<Vec<_>>())
    }

    pub fn upper_spread(&self) -> Option<TailSpread> {
        TailSpread::of(&self.by_upper().into_iter().map(|(_, v)| v).collect::<Vec<_>>())
    }
}

pub fn summarize(ordered: &[RankOrderedReplicate]) -> Result<Summary> {
    if ordered.is_empty() {
        return Err(BootstrapError::EmptySeries);
    }
    let rows = ordered
        .iter()
        .map(|rep| {
            let changes = rep.changes();
            match (
                quantile_sorted(&changes, LOWER_PCT),
                quantile_sorted(&changes, UPPER_PCT),
            ) {
                (Some(lower_5th_pct), Some(upper_95th_pct)) => Ok(SummaryRow {
                    replicate_id: rep.replicate_id,
                    lower_5th_pct,
                    upper_95th_pct,
                }),
                _ => Err(BootstrapError::EmptySeries),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Summary { rows })
}

/// How widely a tail estimate varies across replicates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TailSpread {
    pub median: f64,
    pub p2_5: f64,
    pub p97_5: f64,
}

impl TailSpread {
    pub fn of(values: &[f64]) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            p2_5: quantile_sorted(&sorted, 2.5)?,
            p97_5: quantile_sorted(&sorted, 97.5)?,
            median: Data::new(sorted).median(),
        })
    }
}

/// Tail percentiles of the un-resampled source series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricTails {
    pub lower_5th_pct: f64,
    pub upper_95th_pct: f64,
    /// Source observations ascending by change.
    pub ordered: Vec<Observation>,
}

pub fn historic_tails(series: &SourceSeries) -> Result<HistoricTails> {
    let mut ordered = series.observations().to_vec();
    ordered.sort_by(|a, b| a.change_pct.total_cmp(&b.change_pct));
    let changes: Vec<f64> = ordered.iter().map(|o| o.change_pct).collect();
    let lower = quantile_sorted(&changes, LOWER_PCT).ok_or(BootstrapError::EmptySeries)?;
    let upper = quantile_sorted(&changes, UPPER_PCT).ok_or(BootstrapError::EmptySeries)?;
    Ok(HistoricTails {
        lower_5th_pct: lower,
        upper_95th_pct: upper,
        ordered,
    })
}
