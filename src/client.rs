use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::error::FetchError;

const HISTORY_URL: &str = "https://www.tefas.gov.tr/api/DB/BindHistoryInfo";
const TEFAS_DATE_FORMAT: &str = "%d.%m.%Y";

/// One normalized price record: the fund's unit price on a given day plus
/// the display name the provider reports alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub price: f64,
    pub fund_name: String,
}

/// Single-day price lookup. `None` means no data exists for that date
/// (non-trading day, fund not yet listed) or retries were exhausted; either
/// way the caller sees an absent value, never an error.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self, fund: &str, date: NaiveDate) -> Option<PricePoint>;
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Ceiling on simultaneous physical requests, shared across all funds
    /// and weeks.
    pub concurrency: usize,
    /// Attempts per logical fetch before giving up.
    pub retries: u32,
    /// Timeout applied to each physical request.
    pub call_timeout: Duration,
    /// Backoff after a failed attempt is `backoff_base * 2^attempt`.
    pub backoff_base: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            retries: 3,
            call_timeout: Duration::from_secs(20),
            backoff_base: Duration::from_secs(1),
        }
    }
}

// --- Provider Response Shape ---

#[derive(Deserialize, Debug)]
struct HistoryResponse {
    #[serde(default)]
    data: Vec<HistoryRecord>,
}

#[derive(Deserialize, Debug)]
struct HistoryRecord {
    #[serde(rename = "FIYAT", default, deserialize_with = "deserialize_f64_lenient")]
    price: Option<f64>,
    #[serde(rename = "FONUNVAN", default)]
    fund_name: String,
}

/// The single-day query returns zero or one records; the first record's
/// price and display name are the result, an empty list means no data.
fn normalize(response: HistoryResponse) -> Option<PricePoint> {
    let record = response.data.into_iter().next()?;
    Some(PricePoint {
        price: record.price?,
        fund_name: record.fund_name,
    })
}

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.trim().is_empty() {
            Ok(None)
        } else {
            v.parse::<f64>().map(Some).map_err(E::custom)
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

// The provider is not consistent about FIYAT: it shows up as a JSON number
// on some dates and a numeric string on others.
fn deserialize_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}

// --- Retry State Machine ---

enum RetryState {
    Attempting(u32),
    BackingOff(u32),
    Exhausted,
}

/// Drives one logical fetch: acquire a permit, run one physical attempt,
/// release the permit, and on failure back off exponentially before the
/// next attempt. Backoff sleeps run outside the permit so a waiting request
/// never blocks a slot. Exhausted retries come back as `None`.
async fn gated_fetch<T, F, Fut>(
    permits: &Semaphore,
    opts: &FetchOptions,
    mut attempt_fn: F,
) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, FetchError>>,
{
    let mut state = RetryState::Attempting(0);
    loop {
        state = match state {
            RetryState::Attempting(attempt) => {
                let outcome = {
                    let Ok(_permit) = permits.acquire().await else {
                        // Pool closed; nothing left to do for this fetch.
                        return None;
                    };
                    attempt_fn(attempt).await
                };
                match outcome {
                    Ok(found) => return found,
                    Err(err) => {
                        tracing::warn!(attempt = attempt + 1, error = %err, "attempt failed");
                        RetryState::BackingOff(attempt)
                    }
                }
            }
            RetryState::BackingOff(attempt) if attempt + 1 < opts.retries => {
                tokio::time::sleep(opts.backoff_base * 2u32.pow(attempt)).await;
                RetryState::Attempting(attempt + 1)
            }
            RetryState::BackingOff(_) => RetryState::Exhausted,
            RetryState::Exhausted => {
                tracing::error!("all retries failed");
                return None;
            }
        };
    }
}

// --- TEFAS Client ---

/// HTTP client for the TEFAS fund-history endpoint. Holds the global permit
/// pool and the run-wide progress counter; safe to share across every fund
/// and week task via `Arc`.
pub struct TefasClient {
    http: Client,
    permits: Arc<Semaphore>,
    opts: FetchOptions,
    resolved: AtomicUsize,
    expected_total: usize,
}

impl TefasClient {
    /// `expected_total` is the number of weekly price points the run is
    /// going to resolve, used only for progress reporting.
    pub fn new(opts: FetchOptions, expected_total: usize) -> Result<Self, FetchError> {
        let http = Client::builder().pool_max_idle_per_host(50).build()?;
        Ok(Self {
            http,
            permits: Arc::new(Semaphore::new(opts.concurrency)),
            opts,
            resolved: AtomicUsize::new(0),
            expected_total,
        })
    }

    async fn request_day(&self, fund: &str, date: NaiveDate) -> Result<Option<PricePoint>, FetchError> {
        let day = date.format(TEFAS_DATE_FORMAT).to_string();
        let form = [
            ("fontip", "YAT"),
            ("sfontur", ""),
            ("fonkod", fund),
            ("fongrup", ""),
            ("bastarih", day.as_str()),
            ("bittarih", day.as_str()),
            ("fonturkod", ""),
            ("fonunvantip", ""),
        ];

        let response = self
            .http
            .post(HISTORY_URL)
            .timeout(self.opts.call_timeout)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        let history: HistoryResponse = serde_json::from_str(&body)?;
        Ok(normalize(history))
    }

    fn count_resolved(&self) {
        if self.expected_total == 0 {
            return;
        }
        let resolved = self.resolved.fetch_add(1, Ordering::Relaxed) + 1;
        if resolved % 100 == 0 || resolved == self.expected_total {
            let progress = (resolved as f64 / self.expected_total as f64) * 100.0;
            tracing::info!("fetched {resolved}/{} prices ({progress:.2}%)", self.expected_total);
        }
    }
}

#[async_trait]
impl PriceSource for TefasClient {
    async fn fetch_price(&self, fund: &str, date: NaiveDate) -> Option<PricePoint> {
        let span = tracing::warn_span!("fetch", fund, %date);
        let found = gated_fetch(&self.permits, &self.opts, |_attempt| self.request_day(fund, date))
            .instrument(span)
            .await;
        if found.is_some() {
            self.count_resolved();
        }
        found
    }
}
