use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Walks backwards from `date` until it lands on a weekday. Weekdays pass
/// through unchanged; Saturday and Sunday map to the preceding Friday.
pub fn previous_trading_day(mut date: NaiveDate) -> NaiveDate {
    while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        date -= Duration::days(1);
    }
    date
}

/// The trading day treated as "now" for a run: yesterday, to avoid same-day
/// incomplete data, weekend-adjusted.
pub fn reference_date(today: NaiveDate) -> NaiveDate {
    previous_trading_day(today - Duration::days(1))
}

/// Dates `anchor - 1 week` through `anchor - weeks weeks`, in that order.
/// No weekend adjustment here; missing trading days are handled per query by
/// the recent-price fallback.
pub fn weekly_lookback_dates(anchor: NaiveDate, weeks: u32) -> impl Iterator<Item = NaiveDate> + Clone {
    (1..=i64::from(weeks)).map(move |week| anchor - Duration::weeks(week))
}
