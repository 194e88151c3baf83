use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use csv::ReaderBuilder;
use reqwest::{Client, header};
use serde::Deserialize;
use std::{env, fs, path::Path, time::Duration};
use tokio::time::sleep;
use tracing::{error, info, warn};

use fs2::FileExt; // for file locking
use std::fs::OpenOptions;

use crate::FetchArgs;
use crate::export::{closing_file, write_closing};
use crate::series::ClosingRow;

const HISTODAY_URL: &str = "https://min-api.cryptocompare.com/data/v2/histoday";

/// CryptoCompare envelope: `{"Response": "Success", "Message": .., "Data": {"Data": [..]}}`
#[derive(Debug, Clone, Deserialize)]
pub struct HistoResponse {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Data", default)]
    data: Option<HistoData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoData {
    #[serde(rename = "Data", default)]
    bars: Vec<HistoBar>,
}

/// Daily candle; only the timestamp and close are used.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HistoBar {
    time: i64,
    close: f64,
}

pub async fn execute(args: &FetchArgs) -> Result<()> {
    let out_dir = args.out.as_ref().context("missing --out")?;
    fs::create_dir_all(out_dir).context("create output dir")?;

    // Optional single-instance lock
    let _lock_guard = match args.lock_file.as_ref() {
        Some(lock_path) => Some(acquire_lock(lock_path)?),
        None => None,
    };

    let api_key = args
        .api_key
        .clone()
        .or_else(|| env::var("CRYPTOCOMPARE_API_KEY").ok());
    let client = mk_client(api_key.as_deref())?;

    let assets = args.assets.as_ref().context("missing --assets")?;
    let fiat = args.fiat.as_deref().unwrap_or("usd");
    let years = args.years.unwrap_or(2);
    let delay = args.request_delay_ms.unwrap_or(1000);
    let force = args.force.unwrap_or(false);

    let mut failures = 0usize;
    for (i, symbol) in assets.iter().enumerate() {
        if i > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
        if let Err(e) = update_closing_file(&client, out_dir, symbol, fiat, years, force).await {
            error!("failed {}: {:#}", symbol, e);
            failures += 1;
        }
    }
    if failures > 0 {
        bail!("{} of {} downloads failed", failures, assets.len());
    }

    info!("fetch complete");
    Ok(())
}

/// Acquire an exclusive file lock; keep the file handle alive to hold the lock.
pub fn acquire_lock(lock_path: &Path) -> Result<std::fs::File> {
    fs::create_dir_all(lock_path.parent().unwrap_or(Path::new("."))).ok();
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(lock_path)?;
    file.lock_exclusive()?;
    Ok(file)
}

/// HTTP client; the API key is optional for the public daily endpoint.
pub fn mk_client(api_key: Option<&str>) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    if let Some(key) = api_key {
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Apikey {}", key))?,
        );
    }
    let client = Client::builder()
        .default_headers(headers)
        .user_agent("ratio_tails/0.1 (rust)")
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}

pub fn histoday_url(symbol: &str, fiat: &str) -> Result<reqwest::Url> {
    Ok(reqwest::Url::parse_with_params(
        HISTODAY_URL,
        &[
            ("fsym", symbol.to_uppercase()),
            ("tsym", fiat.to_uppercase()),
            ("allData", "true".into()),
        ],
    )?)
}

/// Core HTTP GET with retry/backoff (+Retry-After)
pub async fn do_get_json<T: for<'de> serde::Deserialize<'de>>(
    client: &Client,
    url: reqwest::Url,
) -> Result<T> {
    let mut attempt = 0usize;
    loop {
        let resp = client.get(url.clone()).send().await?;
        if resp.status().is_success() {
            return Ok(resp.json::<T>().await?);
        }
        let status = resp.status();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        attempt += 1;
        if attempt > 6 {
            let txt = resp.text().await.unwrap_or_default();
            bail!("HTTP {} after retries; body: {}", status, txt);
        }
        let backoff_ms = retry_after
            .map(|s| s * 1000)
            .unwrap_or(300 * attempt as u64);
        warn!("{} -> retrying in {}ms", status, backoff_ms);
        sleep(Duration::from_millis(backoff_ms)).await;
    }
}

/// Turn an API response into daily closes from the last `years` years
/// (plus a 30-day margin), oldest first.
pub fn closing_rows(resp: HistoResponse, years: u32, now: DateTime<Utc>) -> Result<Vec<ClosingRow>> {
    if resp.response != "Success" {
        bail!("API error: {}", resp.message);
    }
    let mut bars = resp.data.unwrap_or_default().bars;
    if bars.is_empty() {
        bail!("no data returned from the API");
    }
    bars.sort_by_key(|b| b.time);

    let cutoff = (now - chrono::Duration::days(i64::from(years) * 365 + 30)).timestamp();
    let mut rows = Vec::with_capacity(bars.len());
    for bar in bars.into_iter().filter(|b| b.time >= cutoff) {
        let date = DateTime::from_timestamp(bar.time, 0)
            .with_context(|| format!("bad timestamp {}", bar.time))?
            .date_naive();
        rows.push(ClosingRow {
            date,
            close: bar.close,
        });
    }
    Ok(rows)
}

pub async fn fetch_daily_closing(
    client: &Client,
    symbol: &str,
    fiat: &str,
    years: u32,
) -> Result<Vec<ClosingRow>> {
    let url = histoday_url(symbol, fiat)?;
    let resp = do_get_json::<HistoResponse>(client, url).await?;
    let rows = closing_rows(resp, years, Utc::now())?;
    if let Some(last) = rows.last() {
        info!(
            "{}: latest close {:.2} {} on {} ({} points over ~{} years)",
            symbol.to_uppercase(),
            last.close,
            fiat.to_uppercase(),
            last.date,
            rows.len(),
            years
        );
    }
    Ok(rows)
}

/// True when the file is missing or its last date is before `today`.
pub fn needs_download(path: &Path, today: NaiveDate) -> Result<bool> {
    match read_last_csv_date(path)? {
        None => Ok(true),
        Some(last) => Ok(last < today),
    }
}

/// Download one asset's closes unless the existing file is already current.
pub async fn update_closing_file(
    client: &Client,
    out_dir: &Path,
    symbol: &str,
    fiat: &str,
    years: u32,
    force: bool,
) -> Result<()> {
    let path = closing_file(out_dir, symbol, years);
    let today = Utc::now().date_naive();
    if !force && !needs_download(&path, today)? {
        info!("{} up-to-date through {}; skipping", symbol, today);
        return Ok(());
    }
    let rows = fetch_daily_closing(client, symbol, fiat, years).await?;
    write_closing(&path, symbol, fiat, &rows)
}

/// Read the last date from a CSV file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn read_last_csv_date(path: &Path) -> Result<Option<NaiveDate>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut rdr = ReaderBuilder::new().from_path(path)?;
    let mut last: Option<NaiveDate> = None;
    for rec in rdr.records() {
        let r = rec?;
        if r.is_empty() {
            continue;
        }
        let d = NaiveDate::parse_from_str(&r[0], "%Y-%m-%d").ok();
        if d.is_some() {
            last = d;
        }
    }
    Ok(last)
}
