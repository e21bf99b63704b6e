//! MarketPulse CLI — fetch today's A-share spot snapshot, compute market
//! breadth statistics, and upsert them into the JSON history.
//!
//! Running with no arguments performs the full pipeline against the default
//! provider chain and `data/market_history.json`. "No data today" (all
//! providers down, or nothing left after cleaning) is reported and exits
//! cleanly without writing; only a failed history write is a hard error.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use marketpulse_core::{
    aggregate, default_providers, fetch_snapshot, market_today, EastMoneyProvider, HistoryStore,
    SinaProvider, SpotProvider, StdoutFetchLog,
};

#[derive(Parser)]
#[command(
    name = "marketpulse",
    about = "MarketPulse — daily A-share market breadth tracker"
)]
struct Cli {
    /// History file path.
    #[arg(long, default_value = "data/market_history.json")]
    data_file: PathBuf,

    /// Pin a single provider instead of the fallback chain: sina, eastmoney.
    #[arg(long)]
    source: Option<String>,

    /// Reference date (YYYY-MM-DD). Defaults to today in Asia/Shanghai.
    #[arg(long)]
    date: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let date = match cli.date.as_deref() {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --date '{s}'"))?,
        None => market_today(),
    };

    let providers = build_providers(cli.source.as_deref())?;
    let log = StdoutFetchLog;

    let snapshot = match fetch_snapshot(&providers, &log) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("No snapshot available, nothing written: {e}");
            return Ok(());
        }
    };

    let point = match aggregate(&snapshot, date) {
        Ok(point) => point,
        Err(e) => {
            eprintln!("Aggregation failed, nothing written: {e}");
            return Ok(());
        }
    };

    print_point(&point);

    let store = HistoryStore::new(&cli.data_file);
    let history = store
        .upsert(point)
        .with_context(|| format!("failed to write history {}", cli.data_file.display()))?;

    println!(
        "History updated: {} record(s) in {}",
        history.len(),
        store.path().display()
    );

    Ok(())
}

fn build_providers(source: Option<&str>) -> Result<Vec<Box<dyn SpotProvider>>> {
    match source {
        None => Ok(default_providers()),
        Some("sina") => Ok(vec![Box::new(SinaProvider::new())]),
        Some("eastmoney") => Ok(vec![Box::new(EastMoneyProvider::new())]),
        Some(other) => bail!("unknown source '{other}'. Valid: sina, eastmoney"),
    }
}

fn print_point(point: &marketpulse_core::MarketStatPoint) {
    println!();
    println!("=== Market Breadth {} ===", point.date);
    println!("Avg turnover:    {:.4}%", point.avg_turnover);
    println!("Median turnover: {:.4}%", point.median_turnover);
    println!("Total amount:    {:.2} 亿元", point.total_amount);
    println!("Up ratio:        {:.2}%", point.up_ratio);
    if let Some(count) = point.stock_count {
        println!("Sample size:     {count}");
    }
    if point.turnover_estimated {
        println!("WARNING: turnover estimated from traded value / float cap");
    }
    println!();
}
