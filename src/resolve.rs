use chrono::{Duration, NaiveDate};

use crate::client::{PricePoint, PriceSource};

/// How many calendar days to probe, starting at the base date itself.
const PROBE_DAYS: i64 = 3;

/// Finds the nearest available price at or before `base`: probes the base
/// date, then one and two days earlier, stopping at the first hit. Covers
/// weekends and short holidays without needing a full trading calendar.
/// Probes run sequentially so a hit on the base date costs a single request.
pub async fn resolve_recent_price<S>(source: &S, fund: &str, base: NaiveDate) -> Option<PricePoint>
where
    S: PriceSource + ?Sized,
{
    for days_back in 0..PROBE_DAYS {
        let probe = base - Duration::days(days_back);
        if let Some(point) = source.fetch_price(fund, probe).await {
            return Some(point);
        }
    }
    None
}
