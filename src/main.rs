mod aggregate;
mod calendar;
mod client;
mod error;
mod matrix;
mod rank;
mod resolve;
mod table;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;

use crate::client::{FetchOptions, PriceSource, TefasClient};

#[derive(Parser, Debug)]
#[command(
    name = "tefas-screener",
    about = "Fetches TEFAS fund price history and ranks funds by trailing profit"
)]
struct Cli {
    /// File with one fund code per line
    #[arg(long, default_value = "fund_names.txt")]
    funds: PathBuf,

    /// Number of weekly lookback dates
    #[arg(long, default_value_t = 74)]
    weeks: u32,

    /// Ceiling on simultaneous requests, shared across all funds
    #[arg(long, default_value_t = 5)]
    concurrency: usize,

    /// Attempts per price lookup before it counts as unavailable
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 20)]
    timeout: u64,

    /// Backoff base in seconds, doubled after each failed attempt
    #[arg(long, default_value_t = 1)]
    backoff: u64,

    #[arg(long, default_value = "all_fund_prices.csv")]
    price_out: PathBuf,

    #[arg(long, default_value = "all_fund_profit_percentages.csv")]
    profit_out: PathBuf,

    #[arg(long, default_value = "top_funds.csv")]
    top_out: PathBuf,

    /// Week offsets the ranking step scores on
    #[arg(long, value_delimiter = ',', default_values_t = [2u32, 4, 12, 24, 36])]
    rank_weeks: Vec<u32>,

    /// Funds per week making the ranking's top list
    #[arg(long, default_value_t = 30)]
    top_n: usize,

    /// Minimum top-list appearances for a fund to qualify
    #[arg(long, default_value_t = 3)]
    min_appearances: usize,

    /// Keywords that drop funds from the ranking by display name
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,
}

fn load_fund_codes(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("could not read fund list {}", path.display()))?;
    Ok(raw
        .lines()
        .map(|line| line.trim().to_uppercase())
        .filter(|line| !line.is_empty())
        .collect())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tefas_screener=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // The fund list is the only fatal input; it fails before any network
    // activity and is the one path out with a non-zero exit.
    let funds = load_fund_codes(&cli.funds)?;
    if funds.is_empty() {
        println!("Fund list {} is empty, nothing to do.", cli.funds.display());
        return Ok(());
    }

    println!("\n--- Step 1: Resolving Reference Dates ---");
    let today = chrono::Local::now().date_naive();
    let reference = calendar::reference_date(today);
    let week_dates: Vec<NaiveDate> = calendar::weekly_lookback_dates(reference, cli.weeks).collect();
    println!(
        "Reference date {reference}, {} weekly lookbacks, {} funds",
        week_dates.len(),
        funds.len()
    );

    println!("\n--- Step 2: Fetching Fund Prices ---");
    let opts = FetchOptions {
        concurrency: cli.concurrency,
        retries: cli.retries,
        call_timeout: Duration::from_secs(cli.timeout),
        backoff_base: Duration::from_secs(cli.backoff),
    };
    let expected_total = funds.len() * week_dates.len();
    let source: Arc<dyn PriceSource> = Arc::new(TefasClient::new(opts, expected_total)?);
    let rows = aggregate::collect_rows(source, &funds, reference, Arc::new(week_dates.clone())).await;

    println!("\n--- Step 3: Writing Matrices ---");
    let matrix = matrix::ResultMatrix {
        reference_date: reference,
        week_dates,
        rows,
    };
    match matrix.write(&cli.price_out, &cli.profit_out).await {
        Ok(()) => println!(
            "All prices and profit percentages written to {} and {}",
            cli.price_out.display(),
            cli.profit_out.display()
        ),
        Err(e) => eprintln!("Error writing matrices: {}", e),
    }

    println!("\n--- Step 4: Ranking Funds ---");
    let rank_config = rank::RankConfig {
        weeks: cli.rank_weeks,
        top_n: cli.top_n,
        min_appearances: cli.min_appearances,
        exclude_words: cli.exclude,
    };
    let ranking = rank::rank(&matrix, &rank_config);
    match ranking.write(&cli.top_out).await {
        Ok(()) => println!("Top funds written to {}", cli.top_out.display()),
        Err(e) => eprintln!("Error writing ranking: {}", e),
    }

    println!("\n--- Step 5: Displaying Top Funds ---");
    table::render(&ranking);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fund_codes_are_trimmed_and_uppercased() {
        let dir = std::env::temp_dir().join("tefas-screener-main-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fund_names.txt");
        std::fs::write(&path, " aaa \nBBB\n\n  \nccc\n").unwrap();

        let funds = load_fund_codes(&path).unwrap();
        assert_eq!(funds, vec!["AAA", "BBB", "CCC"]);
    }

    #[test]
    fn missing_fund_list_is_fatal() {
        let missing = Path::new("definitely_not_here/fund_names.txt");
        assert!(load_fund_codes(missing).is_err());
    }
}
