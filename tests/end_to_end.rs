//! End-to-end runs of the resampling pipeline on synthetic data, including the
//! file outputs.

use chrono::NaiveDate;
use std::fs;

use ratio_tails::BootstrapError;
use ratio_tails::bootstrap::{BootstrapConfig, run_bootstrap};
use ratio_tails::export::{DataFiles, write_observations};
use ratio_tails::ordering::order_all;
use ratio_tails::percentile::extract_band;
use ratio_tails::pipeline::run_for_files;
use ratio_tails::series::{Observation, SourceSeries};

/// 100 days whose changes are distinct integers in -50..=50 (14 is absent).
fn uniform_series() -> Vec<Observation> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    (0..100)
        .map(|i| Observation {
            date: start + chrono::Duration::days(i as i64),
            ratio: 1.0 + i as f64 / 1000.0,
            change_pct: ((i * 37) % 101) as f64 - 50.0,
        })
        .collect()
}

#[test]
fn uniform_scenario_upper_tail_near_theory() {
    let series = SourceSeries::new(uniform_series()).unwrap();
    let config = BootstrapConfig {
        n_replicates: 200,
        seed: 2024,
        ..Default::default()
    };
    let out = run_bootstrap(&series, &config).unwrap();

    assert_eq!(out.layout.block_size, 10);
    assert_eq!(out.layout.block_count, 10);
    assert_eq!(out.replicates.len(), 200);
    assert!(out.replicates.iter().all(|r| r.len() == 100));

    // theoretical 97.5th percentile of U(-50, 50)
    let theory = 47.5;
    assert!(
        (out.upper.median - theory).abs() < 3.5,
        "pooled 95-100 median {} too far from {}",
        out.upper.median,
        theory
    );
    assert!(
        (out.lower.median + theory).abs() < 3.5,
        "pooled 0-5 median {} too far from {}",
        out.lower.median,
        -theory
    );
    // 5 rows per replicate in each tail
    assert_eq!(out.upper.rows.len(), 1000);
    assert_eq!(out.lower.rows.len(), 1000);
    assert_eq!(out.summary.rows.len(), 200);
}

#[test]
fn seeded_runs_write_identical_files() {
    let config = BootstrapConfig {
        n_replicates: 30,
        seed: 11,
        ..Default::default()
    };

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let dir = tempfile::tempdir().unwrap();
        let files = DataFiles::new(dir.path(), "BTC", "ETH");
        write_observations(&files.price_change(), &uniform_series()).unwrap();
        let report = run_for_files(&files, &config, true).unwrap();
        assert_eq!(report.n_replicates, 30);

        let replicates = fs::read(files.replicates()).unwrap();
        let summary = fs::read(files.summary()).unwrap();
        let upper = fs::read(dir.path().join("btc_eth_95_100_replicates_ordered.csv")).unwrap();
        outputs.push((replicates, summary, upper));
        drop(dir);
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn parallel_run_is_reproducible() {
    let series = SourceSeries::new(uniform_series()).unwrap();
    let config = BootstrapConfig {
        n_replicates: 40,
        seed: 5,
        parallel: true,
        ..Default::default()
    };
    let a = run_bootstrap(&series, &config).unwrap();
    let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
    let b = pool.install(|| run_bootstrap(&series, &config).unwrap());
    assert_eq!(a.replicates, b.replicates);
    assert_eq!(a.summary, b.summary);
}

#[test]
fn run_writes_expected_files() {
    let dir = tempfile::tempdir().unwrap();
    let files = DataFiles::new(dir.path(), "sol", "btc");
    write_observations(&files.price_change(), &uniform_series()).unwrap();
    let config = BootstrapConfig {
        n_replicates: 5,
        ..Default::default()
    };
    run_for_files(&files, &config, false).unwrap();

    assert!(!files.replicates().exists());
    for name in [
        "sol_btc_0_5_replicates_ordered.csv",
        "sol_btc_95_100_replicates_ordered.csv",
        "sol_btc_summary.csv",
        "sol_btc_lower_ordered.csv",
        "sol_btc_upper_ordered.csv",
        "sol_btc_report.json",
    ] {
        assert!(dir.path().join(name).exists(), "missing {name}");
    }

    let band = fs::read_to_string(dir.path().join("sol_btc_0_5_replicates_ordered.csv")).unwrap();
    assert!(band.starts_with("date,sol_btc_price,change_pct\n"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(files.report()).unwrap()).unwrap();
    assert_eq!(report["layout"]["block_size"], 10);
    assert_eq!(report["n_replicates"], 5);
}

#[test]
fn failed_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let files = DataFiles::new(dir.path(), "btc", "eth");
    write_observations(&files.price_change(), &uniform_series()).unwrap();
    let config = BootstrapConfig {
        n_replicates: 0,
        ..Default::default()
    };
    let err = run_for_files(&files, &config, true).unwrap_err();
    assert_eq!(
        err.downcast_ref::<BootstrapError>(),
        Some(&BootstrapError::InvalidCount(0))
    );
    let written: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(written.len(), 1);
}

#[test]
fn boundary_cases() {
    let two = SourceSeries::new(uniform_series()[..2].to_vec()).unwrap();
    let config = BootstrapConfig {
        n_replicates: 1,
        ..Default::default()
    };
    let out = run_bootstrap(&two, &config).unwrap();
    assert_eq!(out.replicates[0].len(), 2);

    let ordered = order_all(&out.replicates);
    assert_eq!(
        extract_band(&ordered, 0.0, 0.0).unwrap_err(),
        BootstrapError::InvalidRange { lower: 0.0, upper: 0.0 }
    );
}
