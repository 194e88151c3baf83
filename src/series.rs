//! Typed records for price-ratio history and the boundary that turns flat CSV
//! rows into a validated [`SourceSeries`].

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io, path::Path};
use tracing::{debug, info};

use crate::error::BootstrapError;

/// One day of the two-asset ratio together with its change versus the prior day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub ratio: f64,
    pub change_pct: f64,
}

/// Chronologically ordered observations with unique dates.
///
/// Construction validates ordering and values once, so the resampling core
/// never re-checks them. An empty series is representable; the generator
/// rejects it with [`BootstrapError::EmptySeries`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSeries {
    observations: Vec<Observation>,
}

impl SourceSeries {
    pub fn new(observations: Vec<Observation>) -> Result<Self, BootstrapError> {
        for (i, obs) in observations.iter().enumerate() {
            if !(obs.ratio.is_finite() && obs.ratio > 0.0) {
                return Err(BootstrapError::Schema(format!(
                    "row {}: ratio must be positive, got {}",
                    i, obs.ratio
                )));
            }
            if !obs.change_pct.is_finite() {
                return Err(BootstrapError::Schema(format!(
                    "row {}: change_pct is not finite",
                    i
                )));
            }
        }
        if let Some((prev, next)) = observations
            .iter()
            .tuple_windows()
            .find(|(prev, next)| next.date <= prev.date)
        {
            return Err(BootstrapError::Schema(format!(
                "dates must be strictly increasing ({} followed by {})",
                prev.date, next.date
            )));
        }
        Ok(Self { observations })
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }
}

/// Daily closing price for a single asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosingRow {
    pub date: NaiveDate,
    pub close: f64,
}

/// Both closes on a shared date and their ratio (`a / b`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioRow {
    pub date: NaiveDate,
    pub a: f64,
    pub b: f64,
    pub ratio: f64,
}

/// Inner-join two closing series on date and compute `a / b`.
///
/// Dates missing from either side are dropped; the result is sorted by date.
pub fn price_ratio(a: &[ClosingRow], b: &[ClosingRow]) -> Vec<RatioRow> {
    let b_idx: BTreeMap<NaiveDate, f64> = b.iter().map(|r| (r.date, r.close)).collect();
    let joined: BTreeMap<NaiveDate, RatioRow> = a
        .iter()
        .filter_map(|ra| {
            let close_b = *b_idx.get(&ra.date)?;
            Some((
                ra.date,
                RatioRow {
                    date: ra.date,
                    a: ra.close,
                    b: close_b,
                    ratio: ra.close / close_b,
                },
            ))
        })
        .collect();
    joined.into_values().collect()
}

/// Day-over-day percentage change of the ratio. The first day has no prior
/// value and is dropped.
pub fn price_changes(rows: &[RatioRow]) -> Vec<Observation> {
    rows.iter()
        .tuple_windows()
        .map(|(prev, next)| Observation {
            date: next.date,
            ratio: round_to(next.ratio, 12),
            change_pct: round_to((next.ratio / prev.ratio - 1.0) * 100.0, 8),
        })
        .collect()
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (x * scale).round() / scale
}

const SOURCE_COLUMNS: [&str; 3] = ["date", "ratio", "change_pct"];

/// Locate every required column in a header row, failing with the full list
/// of missing names.
fn column_indices<const N: usize>(
    headers: &StringRecord,
    expected: [&str; N],
) -> Result<[usize; N], BootstrapError> {
    let missing: Vec<&str> = expected
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(BootstrapError::Schema(format!(
            "missing expected column(s): {:?}",
            missing
        )));
    }
    let mut out = [0usize; N];
    for (slot, col) in out.iter_mut().zip(expected) {
        // presence checked above
        *slot = headers.iter().position(|h| h == col).unwrap_or_default();
    }
    Ok(out)
}

fn parse_field<T: std::str::FromStr>(
    rec: &StringRecord,
    idx: usize,
    column: &str,
    line: usize,
) -> Result<T, BootstrapError> {
    let raw = rec.get(idx).unwrap_or_default();
    raw.parse::<T>().map_err(|_| {
        BootstrapError::Schema(format!("line {}: cannot parse {} from {:?}", line, column, raw))
    })
}

/// Read `date,ratio,change_pct` rows from any reader into a validated series.
///
/// Extra columns are ignored. Rows with an empty `change_pct` (the first day
/// of a raw export) are skipped.
pub fn read_source_series<R: io::Read>(reader: R) -> Result<SourceSeries> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let [date_i, ratio_i, change_i] = column_indices(&headers, SOURCE_COLUMNS)?;

    let mut observations = Vec::new();
    for (n, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let line = n + 2;
        if rec.get(change_i).unwrap_or_default().is_empty() {
            debug!("skipping line {} without change_pct", line);
            continue;
        }
        let date_raw = rec.get(date_i).unwrap_or_default();
        let date = NaiveDate::parse_from_str(date_raw, "%Y-%m-%d").map_err(|_| {
            BootstrapError::Schema(format!("line {}: bad date {:?}", line, date_raw))
        })?;
        observations.push(Observation {
            date,
            ratio: parse_field(&rec, ratio_i, "ratio", line)?,
            change_pct: parse_field(&rec, change_i, "change_pct", line)?,
        });
    }
    Ok(SourceSeries::new(observations)?)
}

pub fn load_source_series(path: &Path) -> Result<SourceSeries> {
    let file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let series =
        read_source_series(file).with_context(|| format!("load {}", path.display()))?;
    info!("loaded {} observations from {}", series.len(), path.display());
    Ok(series)
}

/// Read a daily closing file. The first column is the date and the second the
/// closing price, whatever its header says.
pub fn read_closing<R: io::Read>(reader: R) -> Result<Vec<ClosingRow>> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    if headers.len() < 2 || &headers[0] != "date" {
        return Err(BootstrapError::Schema(format!(
            "closing file needs `date` followed by a price column, got {:?}",
            headers.iter().collect::<Vec<_>>()
        ))
        .into());
    }
    let price_col = headers[1].to_string();

    let mut rows = Vec::new();
    for (n, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let line = n + 2;
        let date = NaiveDate::parse_from_str(&rec[0], "%Y-%m-%d").map_err(|_| {
            BootstrapError::Schema(format!("line {}: bad date {:?}", line, &rec[0]))
        })?;
        rows.push(ClosingRow {
            date,
            close: parse_field(&rec, 1, &price_col, line)?,
        });
    }
    rows.sort_by_key(|r| r.date);
    Ok(rows)
}

pub fn load_closing(path: &Path) -> Result<Vec<ClosingRow>> {
    let file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_closing(file).with_context(|| format!("load {}", path.display()))
}
