use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::FutureExt;
use futures::future::join_all;
use tokio::task::JoinSet;

use crate::client::PriceSource;
use crate::resolve::resolve_recent_price;

/// One lookback observation for a fund: the price on (or nearest before)
/// the week's reference date and the profit of the current price against it.
#[derive(Debug, Clone)]
pub struct WeeklyObservation {
    pub week: u32,
    pub date: NaiveDate,
    pub price: Option<f64>,
    pub profit_pct: Option<f64>,
}

/// A fund's complete result: built exactly once per run, one observation per
/// lookback week, indexed by week offset regardless of fetch completion
/// order.
#[derive(Debug, Clone)]
pub struct FundRow {
    pub code: String,
    pub name: String,
    pub current_price: Option<f64>,
    pub observations: Vec<WeeklyObservation>,
}

impl FundRow {
    /// All-null row for a fund whose aggregation failed partway through.
    /// The fund keeps its place in the output either way.
    fn degraded(code: &str, week_dates: &[NaiveDate]) -> Self {
        Self {
            code: code.to_string(),
            name: String::new(),
            current_price: None,
            observations: week_dates
                .iter()
                .enumerate()
                .map(|(i, &date)| WeeklyObservation {
                    week: i as u32 + 1,
                    date,
                    price: None,
                    profit_pct: None,
                })
                .collect(),
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Relative change from the week's price to the current price, as a
/// percentage rounded to 3 decimals. `None` when either price is missing or
/// the week's price is exactly zero.
pub(crate) fn profit_percentage(current: Option<f64>, week_price: Option<f64>) -> Option<f64> {
    let current = current?;
    let week_price = week_price?;
    if week_price == 0.0 {
        return None;
    }
    Some(round3((current - week_price) / week_price * 100.0))
}

/// Builds one fund's row: resolves the current price against the reference
/// date, fetches every lookback week concurrently (exact date first, nearest
/// earlier day as fallback), and computes the weekly profits.
pub async fn aggregate_fund(
    source: &dyn PriceSource,
    code: &str,
    reference_date: NaiveDate,
    week_dates: &[NaiveDate],
) -> FundRow {
    let current = resolve_recent_price(source, code, reference_date).await;
    let current_price = current.map(|point| point.price);

    let weekly = join_all(week_dates.iter().map(|&date| async move {
        match source.fetch_price(code, date).await {
            Some(point) => Some(point),
            // Exact date missed (holiday, long weekend, data gap): take the
            // nearest earlier available day instead.
            None => resolve_recent_price(source, code, date).await,
        }
    }))
    .await;

    let mut name = String::new();
    let observations = weekly
        .into_iter()
        .zip(week_dates)
        .enumerate()
        .map(|(i, (point, &date))| {
            if name.is_empty() {
                if let Some(point) = &point {
                    name = point.fund_name.clone();
                }
            }
            let price = point.map(|point| point.price);
            WeeklyObservation {
                week: i as u32 + 1,
                date,
                price,
                profit_pct: profit_percentage(current_price, price),
            }
        })
        .collect();

    FundRow {
        code: code.to_string(),
        name,
        current_price,
        observations,
    }
}

/// Fans out one task per fund and collects the rows as they complete.
/// A panic inside one fund's aggregation degrades that row to all-null
/// fields instead of aborting the run, so the output always carries exactly
/// one row per input fund.
pub async fn collect_rows(
    source: Arc<dyn PriceSource>,
    funds: &[String],
    reference_date: NaiveDate,
    week_dates: Arc<Vec<NaiveDate>>,
) -> Vec<FundRow> {
    let mut tasks = JoinSet::new();
    for code in funds {
        let source = Arc::clone(&source);
        let week_dates = Arc::clone(&week_dates);
        let code = code.clone();
        tasks.spawn(async move {
            let run = AssertUnwindSafe(aggregate_fund(
                source.as_ref(),
                &code,
                reference_date,
                &week_dates,
            ))
            .catch_unwind();
            match run.await {
                Ok(row) => row,
                Err(_) => {
                    tracing::error!(fund = %code, "aggregation failed, emitting an empty row");
                    FundRow::degraded(&code, &week_dates)
                }
            }
        });
    }

    // Completion order, deliberately: nothing downstream assumes the rows
    // come back in submission order.
    let mut rows = Vec::with_capacity(funds.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(row) => rows.push(row),
            Err(err) => tracing::error!(error = %err, "fund task aborted"),
        }
    }
    rows
}
