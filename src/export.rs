//! Flat-file persistence. Every file is written to a temp file in the target
//! directory and renamed into place, so a failed run never leaves a partial CSV.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::info;

use crate::ordering::RankOrderedReplicate;
use crate::percentile::{BandExtract, PercentileBand};
use crate::replicates::Replicate;
use crate::series::{ClosingRow, Observation, RatioRow};
use crate::summary::Summary;

/// File names for one asset pair under a data directory. Asset names are
/// lowercased.
#[derive(Debug, Clone)]
pub struct DataFiles {
    dir: PathBuf,
    a: String,
    b: String,
}

impl DataFiles {
    pub fn new(dir: impl Into<PathBuf>, asset_a: &str, asset_b: &str) -> Self {
        Self {
            dir: dir.into(),
            a: asset_a.to_lowercase(),
            b: asset_b.to_lowercase(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pair_file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{}_{}", self.a, self.b, suffix))
    }

    /// Column name for the ratio in replicate outputs, e.g. `btc_eth_price`.
    pub fn price_column(&self) -> String {
        format!("{}_{}_price", self.a, self.b)
    }

    pub fn asset_a(&self) -> &str {
        &self.a
    }

    pub fn asset_b(&self) -> &str {
        &self.b
    }

    pub fn price(&self) -> PathBuf {
        self.pair_file("price.csv")
    }

    pub fn price_change(&self) -> PathBuf {
        self.pair_file("price_change.csv")
    }

    pub fn price_change_ordered(&self) -> PathBuf {
        self.pair_file("price_change_ordered.csv")
    }

    pub fn replicates(&self) -> PathBuf {
        self.pair_file("replicates.csv")
    }

    pub fn replicates_ordered(&self) -> PathBuf {
        self.pair_file("replicates_ordered.csv")
    }

    pub fn band(&self, band: &PercentileBand) -> PathBuf {
        self.pair_file(&format!("{}_replicates_ordered.csv", band.label()))
    }

    pub fn summary(&self) -> PathBuf {
        self.pair_file("summary.csv")
    }

    pub fn lower_ordered(&self) -> PathBuf {
        self.pair_file("lower_ordered.csv")
    }

    pub fn upper_ordered(&self) -> PathBuf {
        self.pair_file("upper_ordered.csv")
    }

    pub fn report(&self) -> PathBuf {
        self.pair_file("report.json")
    }
}

pub fn closing_file(dir: &Path, symbol: &str, years: u32) -> PathBuf {
    dir.join(format!("{}_daily_closing_{}years.csv", symbol.to_lowercase(), years))
}

/// Write a CSV atomically: header plus pre-formatted records.
pub fn write_csv_atomic<I>(path: &Path, header: &[&str], records: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    let mut count = 0usize;
    {
        let mut wtr = WriterBuilder::new().from_writer(tmp.as_file_mut());
        wtr.write_record(header)?;
        for rec in records {
            wtr.write_record(&rec)?;
            count += 1;
        }
        wtr.flush()?;
    }
    tmp.persist(path)
        .with_context(|| format!("persist {}", path.display()))?;
    info!("wrote {} rows to {}", count, path.display());
    Ok(())
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(tmp.as_file(), value)?;
    tmp.persist(path)
        .with_context(|| format!("persist {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

fn fmt_ratio(v: f64) -> String {
    format!("{:.12}", v)
}

fn fmt_pct(v: f64) -> String {
    format!("{:.8}", v)
}

fn observation_record(o: &Observation) -> Vec<String> {
    vec![
        o.date.format("%Y-%m-%d").to_string(),
        fmt_ratio(o.ratio),
        fmt_pct(o.change_pct),
    ]
}

pub fn write_closing(path: &Path, symbol: &str, fiat: &str, rows: &[ClosingRow]) -> Result<()> {
    let price_col = format!(
        "{}_closing_price_{}",
        symbol.to_lowercase(),
        fiat.to_lowercase()
    );
    write_csv_atomic(
        path,
        &["date", price_col.as_str()],
        rows.iter()
            .map(|r| vec![r.date.format("%Y-%m-%d").to_string(), format!("{:.8}", r.close)]),
    )
}

pub fn write_ratio(files: &DataFiles, rows: &[RatioRow]) -> Result<()> {
    write_csv_atomic(
        &files.price(),
        &["date", files.asset_a(), files.asset_b(), "ratio"],
        rows.iter().map(|r| {
            vec![
                r.date.format("%Y-%m-%d").to_string(),
                format!("{:.8}", r.a),
                format!("{:.8}", r.b),
                fmt_ratio(r.ratio),
            ]
        }),
    )
}

/// `date,ratio,change_pct` rows, the shape the source series is read from.
pub fn write_observations(path: &Path, rows: &[Observation]) -> Result<()> {
    write_csv_atomic(
        path,
        &["date", "ratio", "change_pct"],
        rows.iter().map(observation_record),
    )
}

fn write_replicate_rows<'a, I>(files: &DataFiles, path: &Path, reps: I) -> Result<()>
where
    I: IntoIterator<Item = (usize, &'a [Observation])>,
{
    let price_col = files.price_column();
    write_csv_atomic(
        path,
        &["replicate_index", "date", price_col.as_str(), "change_pct"],
        reps.into_iter().flat_map(|(id, obs)| {
            obs.iter().map(move |o| {
                let mut rec = vec![id.to_string()];
                rec.extend(observation_record(o));
                rec
            })
        }),
    )
}

pub fn write_replicates(files: &DataFiles, reps: &[Replicate]) -> Result<()> {
    write_replicate_rows(
        files,
        &files.replicates(),
        reps.iter().map(|r| (r.replicate_id, r.observations.as_slice())),
    )
}

pub fn write_ordered_replicates(files: &DataFiles, reps: &[RankOrderedReplicate]) -> Result<()> {
    write_replicate_rows(
        files,
        &files.replicates_ordered(),
        reps.iter().map(|r| (r.replicate_id, r.observations())),
    )
}

pub fn write_band(files: &DataFiles, extract: &BandExtract) -> Result<()> {
    let price_col = files.price_column();
    write_csv_atomic(
        &files.band(&extract.band),
        &["date", price_col.as_str(), "change_pct"],
        extract.rows.iter().map(observation_record),
    )
}

pub fn write_summary(files: &DataFiles, summary: &Summary) -> Result<()> {
    write_csv_atomic(
        &files.summary(),
        &["replicate_index", "lower_5th_pct", "upper_95th_pct"],
        summary.rows.iter().map(|r| {
            vec![
                r.replicate_id.to_string(),
                fmt_pct(r.lower_5th_pct),
                fmt_pct(r.upper_95th_pct),
            ]
        }),
    )?;
    write_csv_atomic(
        &files.lower_ordered(),
        &["replicate_index", "lower_5th_pct"],
        summary
            .by_lower()
            .into_iter()
            .map(|(id, v)| vec![id.to_string(), fmt_pct(v)]),
    )?;
    write_csv_atomic(
        &files.upper_ordered(),
        &["replicate_index", "upper_95th_pct"],
        summary
            .by_upper()
            .into_iter()
            .map(|(id, v)| vec![id.to_string(), fmt_pct(v)]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SummaryRow;
    use chrono::NaiveDate;

    #[test]
    fn pair_file_names_are_lowercase() {
        let files = DataFiles::new("/data", "BTC", "Eth");
        assert_eq!(files.price_change(), PathBuf::from("/data/btc_eth_price_change.csv"));
        assert_eq!(
            files.band(&PercentileBand::UPPER_TAIL),
            PathBuf::from("/data/btc_eth_95_100_replicates_ordered.csv")
        );
        assert_eq!(files.price_column(), "btc_eth_price");
        assert_eq!(
            closing_file(Path::new("/data"), "SOL", 2),
            PathBuf::from("/data/sol_daily_closing_2years.csv")
        );
    }

    #[test]
    fn summary_files_written() {
        let dir = tempfile::tempdir().unwrap();
        let files = DataFiles::new(dir.path(), "btc", "eth");
        let summary = Summary {
            rows: vec![
                SummaryRow { replicate_id: 0, lower_5th_pct: -1.0, upper_95th_pct: 4.0 },
                SummaryRow { replicate_id: 1, lower_5th_pct: -3.0, upper_95th_pct: 2.0 },
            ],
        };
        write_summary(&files, &summary).unwrap();

        let lower = fs::read_to_string(files.lower_ordered()).unwrap();
        assert_eq!(
            lower,
            "replicate_index,lower_5th_pct\n1,-3.00000000\n0,-1.00000000\n"
        );
        let upper = fs::read_to_string(files.upper_ordered()).unwrap();
        assert!(upper.starts_with("replicate_index,upper_95th_pct\n1,2.00000000\n"));
    }

    #[test]
    fn observations_round_trip_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pair.csv");
        let rows = vec![
            Observation {
                date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                ratio: 18.5,
                change_pct: -1.25,
            },
            Observation {
                date: NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
                ratio: 18.75,
                change_pct: 1.35135135,
            },
        ];
        write_observations(&path, &rows).unwrap();
        let loaded = crate::series::load_source_series(&path).unwrap();
        assert_eq!(loaded.observations(), rows.as_slice());
    }
}
