use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Result;

use crate::matrix::{ResultMatrix, cell, write_atomic};

/// Knobs for the post-run ranking pass over the profit matrix.
#[derive(Debug, Clone)]
pub struct RankConfig {
    /// Week offsets to rank on.
    pub weeks: Vec<u32>,
    /// How many funds make each week's top list.
    pub top_n: usize,
    /// A fund qualifies when it appears in at least this many top lists.
    pub min_appearances: usize,
    /// Case-insensitive keywords that drop a fund by display name.
    pub exclude_words: Vec<String>,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            weeks: vec![2, 4, 12, 24, 36],
            top_n: 30,
            min_appearances: 3,
            exclude_words: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct RankedFund {
    pub code: String,
    pub name: String,
    /// Number of ranked weeks where this fund made the top list.
    pub appearances: usize,
    /// Profit per ranked week, aligned with `Ranking::weeks`.
    pub profits: Vec<Option<f64>>,
}

impl RankedFund {
    /// Mean profit over the ranked weeks that have a value.
    pub fn mean_profit(&self) -> Option<f64> {
        let known: Vec<f64> = self.profits.iter().flatten().copied().collect();
        if known.is_empty() {
            None
        } else {
            Some(known.iter().sum::<f64>() / known.len() as f64)
        }
    }
}

#[derive(Debug)]
pub struct Ranking {
    /// The week offsets actually ranked (configured ones that exist in the
    /// matrix).
    pub weeks: Vec<u32>,
    /// Qualifying funds, best first.
    pub funds: Vec<RankedFund>,
}

fn name_excluded(name: &str, words: &[String]) -> bool {
    let upper = name.to_uppercase();
    words.iter().any(|word| upper.contains(&word.to_uppercase()))
}

/// The top-N fund codes by profit for one week offset. Funds without a
/// profit at that offset, and funds caught by the keyword exclusion, never
/// make the list.
fn top_for_week<'a>(matrix: &'a ResultMatrix, week: u32, config: &RankConfig) -> HashSet<&'a str> {
    let index = week as usize - 1;
    let mut scored: Vec<(&str, f64)> = matrix
        .rows
        .iter()
        .filter(|row| !name_excluded(&row.name, &config.exclude_words))
        .filter_map(|row| {
            let profit = row.observations.get(index)?.profit_pct?;
            Some((row.code.as_str(), profit))
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(config.top_n);
    scored.into_iter().map(|(code, _)| code).collect()
}

/// Ranks the matrix: takes each configured week's top-N funds, keeps the
/// funds appearing in at least `min_appearances` of those lists, and orders
/// them by appearance count, then mean profit over the ranked weeks.
pub fn rank(matrix: &ResultMatrix, config: &RankConfig) -> Ranking {
    let weeks: Vec<u32> = config
        .weeks
        .iter()
        .copied()
        .filter(|&week| {
            let known = week >= 1 && week as usize <= matrix.week_dates.len();
            if !known {
                tracing::warn!(week, "ranked week outside the matrix, skipping");
            }
            known
        })
        .collect();

    let top_per_week: Vec<HashSet<&str>> = weeks
        .iter()
        .map(|&week| top_for_week(matrix, week, config))
        .collect();

    let mut appearance_counts: HashMap<&str, usize> = HashMap::new();
    for top in &top_per_week {
        for &code in top {
            *appearance_counts.entry(code).or_default() += 1;
        }
    }

    let mut funds: Vec<RankedFund> = matrix
        .rows
        .iter()
        .filter_map(|row| {
            let appearances = *appearance_counts.get(row.code.as_str())?;
            if appearances < config.min_appearances {
                return None;
            }
            let profits = weeks
                .iter()
                .map(|&week| row.observations.get(week as usize - 1).and_then(|obs| obs.profit_pct))
                .collect();
            Some(RankedFund {
                code: row.code.clone(),
                name: row.name.clone(),
                appearances,
                profits,
            })
        })
        .collect();

    // Code as the final key keeps the output stable across runs.
    funds.sort_by(|a, b| {
        b.appearances
            .cmp(&a.appearances)
            .then_with(|| {
                b.mean_profit()
                    .partial_cmp(&a.mean_profit())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.code.cmp(&b.code))
    });

    Ranking { weeks, funds }
}

impl Ranking {
    pub fn to_csv(&self) -> String {
        let mut columns = vec![
            "Fund".to_string(),
            "Full Fund Name".to_string(),
            "Appearances".to_string(),
        ];
        columns.extend(self.weeks.iter().map(|week| format!("{week} Weeks")));
        let mut out = columns.join(",");
        out.push('\n');

        for fund in &self.funds {
            let mut fields = vec![fund.code.clone(), fund.name.clone(), fund.appearances.to_string()];
            fields.extend(fund.profits.iter().map(|&profit| cell(profit)));
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        out
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_csv()).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::aggregate::{FundRow, WeeklyObservation};

    fn matrix_with_profits(rows: Vec<(&str, &str, Vec<Option<f64>>)>) -> ResultMatrix {
        let weeks = rows.first().map_or(0, |(_, _, profits)| profits.len());
        let anchor = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let week_dates: Vec<NaiveDate> =
            crate::calendar::weekly_lookback_dates(anchor, weeks as u32).collect();
        let rows = rows
            .into_iter()
            .map(|(code, name, profits)| FundRow {
                code: code.to_string(),
                name: name.to_string(),
                current_price: Some(1.0),
                observations: profits
                    .into_iter()
                    .zip(&week_dates)
                    .enumerate()
                    .map(|(i, (profit, &date))| WeeklyObservation {
                        week: i as u32 + 1,
                        date,
                        price: Some(1.0),
                        profit_pct: profit,
                    })
                    .collect(),
            })
            .collect();
        ResultMatrix { reference_date: anchor, week_dates, rows }
    }

    fn config(weeks: Vec<u32>, top_n: usize, min_appearances: usize) -> RankConfig {
        RankConfig { weeks, top_n, min_appearances, exclude_words: Vec::new() }
    }

    #[test]
    fn keeps_funds_present_in_enough_weeks() {
        let matrix = matrix_with_profits(vec![
            ("AAA", "AAA FONU", vec![Some(5.0), Some(6.0)]),
            ("BBB", "BBB FONU", vec![Some(4.0), None]),
            ("CCC", "CCC FONU", vec![None, Some(7.0)]),
        ]);
        let ranking = rank(&matrix, &config(vec![1, 2], 2, 2));

        // Only AAA shows up in both weeks' top lists.
        let codes: Vec<&str> = ranking.funds.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["AAA"]);
        assert_eq!(ranking.funds[0].appearances, 2);
    }

    #[test]
    fn top_n_cuts_the_weakest() {
        let matrix = matrix_with_profits(vec![
            ("AAA", "AAA FONU", vec![Some(9.0)]),
            ("BBB", "BBB FONU", vec![Some(5.0)]),
            ("CCC", "CCC FONU", vec![Some(1.0)]),
        ]);
        let ranking = rank(&matrix, &config(vec![1], 2, 1));

        let codes: Vec<&str> = ranking.funds.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["AAA", "BBB"]);
    }

    #[test]
    fn keyword_exclusion_drops_by_display_name() {
        let matrix = matrix_with_profits(vec![
            ("AAA", "AAA TEKNOLOJI FONU", vec![Some(9.0)]),
            ("BBB", "BBB FONU", vec![Some(5.0)]),
        ]);
        let mut config = config(vec![1], 5, 1);
        config.exclude_words = vec!["teknoloji".to_string()];
        let ranking = rank(&matrix, &config);

        let codes: Vec<&str> = ranking.funds.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["BBB"]);
    }

    #[test]
    fn unknown_weeks_are_skipped() {
        let matrix = matrix_with_profits(vec![("AAA", "AAA FONU", vec![Some(5.0)])]);
        let ranking = rank(&matrix, &config(vec![1, 52], 5, 1));
        assert_eq!(ranking.weeks, vec![1]);
        assert_eq!(ranking.funds.len(), 1);
    }

    #[test]
    fn csv_carries_ranked_week_columns() {
        let matrix = matrix_with_profits(vec![
            ("AAA", "AAA FONU", vec![Some(5.0), None]),
        ]);
        let ranking = rank(&matrix, &config(vec![1, 2], 5, 1));
        let csv = ranking.to_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "Fund,Full Fund Name,Appearances,1 Weeks,2 Weeks");
        assert_eq!(lines.next().unwrap(), "AAA,AAA FONU,1,5.000,None");
    }

    #[test]
    fn ordering_is_appearances_then_mean() {
        let matrix = matrix_with_profits(vec![
            ("AAA", "AAA FONU", vec![Some(2.0), Some(2.0)]),
            ("BBB", "BBB FONU", vec![Some(8.0), Some(8.0)]),
            ("CCC", "CCC FONU", vec![Some(8.0), None]),
        ]);
        let ranking = rank(&matrix, &config(vec![1, 2], 3, 1));

        let codes: Vec<&str> = ranking.funds.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["BBB", "AAA", "CCC"]);
    }
}
