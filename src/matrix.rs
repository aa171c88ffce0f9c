use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use tokio::fs;

use crate::aggregate::FundRow;

/// Serialized form of an absent price or profit.
const MISSING: &str = "None";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The run's complete result: the price table and the profit table share
/// this row set and the same 1..N week-offset column schema. Rows sit in
/// completion order.
#[derive(Debug)]
pub struct ResultMatrix {
    pub reference_date: NaiveDate,
    pub week_dates: Vec<NaiveDate>,
    pub rows: Vec<FundRow>,
}

pub(crate) fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| format!("{v:.3}"))
}

impl ResultMatrix {
    fn price_header(&self) -> String {
        let mut columns = vec![
            "Fund".to_string(),
            "Full Fund Name".to_string(),
            format!("Start Date ({})", self.reference_date.format(DATE_FORMAT)),
        ];
        columns.extend(self.week_dates.iter().enumerate().map(|(i, date)| {
            format!("{} Weeks ({})", i + 1, date.format(DATE_FORMAT))
        }));
        columns.join(",")
    }

    fn profit_header(&self) -> String {
        let mut columns = vec!["Fund".to_string(), "Full Fund Name".to_string()];
        columns.extend((1..=self.week_dates.len()).map(|week| format!("{week} Weeks")));
        columns.join(",")
    }

    fn price_line(row: &FundRow) -> String {
        let mut fields = vec![row.code.clone(), row.name.clone(), cell(row.current_price)];
        fields.extend(row.observations.iter().map(|obs| cell(obs.price)));
        fields.join(",")
    }

    fn profit_line(row: &FundRow) -> String {
        let mut fields = vec![row.code.clone(), row.name.clone()];
        fields.extend(row.observations.iter().map(|obs| cell(obs.profit_pct)));
        fields.join(",")
    }

    pub fn price_csv(&self) -> String {
        let mut out = self.price_header();
        out.push('\n');
        for row in &self.rows {
            out.push_str(&Self::price_line(row));
            out.push('\n');
        }
        out
    }

    pub fn profit_csv(&self) -> String {
        let mut out = self.profit_header();
        out.push('\n');
        for row in &self.rows {
            out.push_str(&Self::profit_line(row));
            out.push('\n');
        }
        out
    }

    /// Writes both tables, each in a single shot. A crash mid-run leaves
    /// either complete files or no files, never a truncated table.
    pub async fn write(&self, price_path: &Path, profit_path: &Path) -> Result<()> {
        write_atomic(price_path, &self.price_csv()).await?;
        write_atomic(profit_path, &self.profit_csv()).await?;
        Ok(())
    }
}

/// Write to a sibling .tmp file first, then rename into place, so the
/// destination only ever holds a fully written table.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::WeeklyObservation;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_matrix() -> ResultMatrix {
        let week_dates = vec![date(2023, 12, 29), date(2023, 12, 22)];
        let rows = vec![
            FundRow {
                code: "AAA".into(),
                name: "AAA FONU".into(),
                current_price: Some(10.0),
                observations: vec![
                    WeeklyObservation {
                        week: 1,
                        date: week_dates[0],
                        price: Some(9.0),
                        profit_pct: Some(11.111),
                    },
                    WeeklyObservation {
                        week: 2,
                        date: week_dates[1],
                        price: Some(9.5),
                        profit_pct: Some(5.263),
                    },
                ],
            },
            FundRow {
                code: "BBB".into(),
                name: String::new(),
                current_price: None,
                observations: vec![
                    WeeklyObservation { week: 1, date: week_dates[0], price: None, profit_pct: None },
                    WeeklyObservation { week: 2, date: week_dates[1], price: None, profit_pct: None },
                ],
            },
        ];
        ResultMatrix {
            reference_date: date(2024, 1, 5),
            week_dates,
            rows,
        }
    }

    #[test]
    fn price_table_has_dated_columns() {
        let csv = sample_matrix().price_csv();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Fund,Full Fund Name,Start Date (2024-01-05),1 Weeks (2023-12-29),2 Weeks (2023-12-22)"
        );
        assert_eq!(lines.next().unwrap(), "AAA,AAA FONU,10.000,9.000,9.500");
        assert_eq!(lines.next().unwrap(), "BBB,,None,None,None");
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn profit_table_has_plain_week_columns() {
        let csv = sample_matrix().profit_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "Fund,Full Fund Name,1 Weeks,2 Weeks");
        assert_eq!(lines.next().unwrap(), "AAA,AAA FONU,11.111,5.263");
        assert_eq!(lines.next().unwrap(), "BBB,,None,None");
    }

    #[test]
    fn rendering_is_deterministic() {
        let matrix = sample_matrix();
        assert_eq!(matrix.price_csv(), matrix.price_csv());
        assert_eq!(matrix.profit_csv(), matrix.profit_csv());
    }

    #[tokio::test]
    async fn writes_both_tables() {
        let dir = std::env::temp_dir().join("tefas-screener-matrix-test");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let price_path = dir.join("prices.csv");
        let profit_path = dir.join("profits.csv");

        let matrix = sample_matrix();
        matrix.write(&price_path, &profit_path).await.unwrap();

        let written = tokio::fs::read_to_string(&price_path).await.unwrap();
        assert_eq!(written, matrix.price_csv());
        let written = tokio::fs::read_to_string(&profit_path).await.unwrap();
        assert_eq!(written, matrix.profit_csv());
    }
}
