//! Merge two rate series and render the ratio report.
//!
//! Rows are paired by position, not by date: row `i` of the report holds row
//! `i` of each series. When the series differ in length the shorter side is
//! blank and the ratio is absent for those rows.

pub mod xlsx;

use crate::error::ReportError;
use crate::parser::{RateRecord, RateSeries};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Decimal places of the ratio column.
pub const RATIO_SCALE: u32 = 5;

/// Header of the ratio column.
pub const RATIO_HEADER: &str = "Результат";

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub a: Option<RateRecord>,
    pub b: Option<RateRecord>,
    /// `a.rate / b.rate` rounded to [`RATIO_SCALE`] places, when both exist
    /// and the divisor is non-zero.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub ratio: Option<Decimal>,
}

/// The written spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFile {
    pub path: PathBuf,
    pub row_count: usize,
}

/// `a / b` rounded half-to-even to [`RATIO_SCALE`] places.
pub fn ratio(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_div(b).map(|q| q.round_dp(RATIO_SCALE))
}

/// Pair the two series row by row.
pub fn merge_positional(a: &RateSeries, b: &RateSeries) -> Vec<ReportRow> {
    let len = a.len().max(b.len());
    if a.len() != b.len() {
        warn!(
            a = %a.instrument,
            b = %b.instrument,
            a_rows = a.len(),
            b_rows = b.len(),
            "series lengths differ; trailing rows will have no ratio"
        );
    }

    let mut misaligned = 0usize;
    let rows = (0..len)
        .map(|i| {
            let ra = a.records.get(i).cloned();
            let rb = b.records.get(i).cloned();
            let value = match (&ra, &rb) {
                (Some(x), Some(y)) => {
                    if x.date != y.date {
                        misaligned += 1;
                    }
                    ratio(x.rate, y.rate)
                }
                _ => None,
            };
            ReportRow {
                a: ra,
                b: rb,
                ratio: value,
            }
        })
        .collect();

    if misaligned > 0 {
        warn!(misaligned, "paired rows carry different trade dates");
    }
    rows
}

/// Column headers for a pair of instruments.
pub fn headers(a: &RateSeries, b: &RateSeries) -> Vec<String> {
    let mut headers = Vec::with_capacity(7);
    for code in [&a.instrument.code, &b.instrument.code] {
        headers.push(format!("Дата {code}"));
        headers.push(format!("Курс {code}"));
        headers.push(format!("Время {code}"));
    }
    headers.push(RATIO_HEADER.to_string());
    headers
}

/// Writes the report to a fixed path, replacing any previous file.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    path: PathBuf,
}

impl ReportBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn build(&self, a: &RateSeries, b: &RateSeries) -> Result<ReportFile, ReportError> {
        let rows = merge_positional(a, b);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        xlsx::render(&headers(a, b), &rows, &self.path)?;
        info!(path = %self.path.display(), rows = rows.len(), "report written");
        Ok(ReportFile {
            path: self.path.clone(),
            row_count: rows.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Instrument;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn series(instrument: Instrument, rates: &[&str]) -> RateSeries {
        RateSeries {
            instrument,
            records: rates
                .iter()
                .enumerate()
                .map(|(i, r)| RateRecord {
                    date: format!("{:02}.09.2024", i + 1),
                    rate: dec(r),
                    time: "13:30:00".into(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_ratio_rounds_to_five_places() {
        assert_eq!(ratio(dec("90.12345"), dec("1.2345")), Some(dec("73.00401")));
        assert_eq!(ratio(dec("1"), dec("3")), Some(dec("0.33333")));
        assert_eq!(ratio(dec("2"), dec("3")), Some(dec("0.66667")));
    }

    #[test]
    fn test_ratio_half_to_even() {
        assert_eq!(ratio(dec("0.000025"), dec("1")), Some(dec("0.00002")));
        assert_eq!(ratio(dec("0.000035"), dec("1")), Some(dec("0.00004")));
    }

    #[test]
    fn test_zero_divisor_has_no_ratio() {
        assert_eq!(ratio(dec("90"), Decimal::ZERO), None);
    }

    #[test]
    fn test_equal_length_merge() {
        let a = series(Instrument::usd_rub(), &["90.12345", "91", "92.5"]);
        let b = series(Instrument::jpy_rub(), &["1.2345", "0.625", "0.5"]);
        let rows = merge_positional(&a, &b);
        assert_eq!(rows.len(), 3);
        for (i, row) in rows.iter().enumerate() {
            let expected = (a.records[i].rate / b.records[i].rate).round_dp(5);
            assert_eq!(row.ratio, Some(expected));
            assert_eq!(row.a.as_ref(), Some(&a.records[i]));
            assert_eq!(row.b.as_ref(), Some(&b.records[i]));
        }
        assert_eq!(rows[1].ratio, Some(dec("145.6")));
    }

    #[test]
    fn test_mismatched_lengths_leave_trailing_ratio_empty() {
        let rates_a: Vec<String> = (0..20).map(|i| format!("90.{i}")).collect();
        let rates_b: Vec<String> = (0..18).map(|i| format!("1.{i}")).collect();
        let a = series(
            Instrument::usd_rub(),
            &rates_a.iter().map(String::as_str).collect::<Vec<_>>(),
        );
        let b = series(
            Instrument::jpy_rub(),
            &rates_b.iter().map(String::as_str).collect::<Vec<_>>(),
        );

        let rows = merge_positional(&a, &b);
        assert_eq!(rows.len(), 20);
        assert!(rows[..18].iter().all(|r| r.ratio.is_some()));
        for row in &rows[18..] {
            assert!(row.a.is_some());
            assert!(row.b.is_none());
            assert!(row.ratio.is_none());
        }
    }

    #[test]
    fn test_both_empty() {
        let rows = merge_positional(
            &RateSeries::empty(Instrument::usd_rub()),
            &RateSeries::empty(Instrument::jpy_rub()),
        );
        assert!(rows.is_empty());
    }

    #[test]
    fn test_headers() {
        let a = RateSeries::empty(Instrument::usd_rub());
        let b = RateSeries::empty(Instrument::jpy_rub());
        assert_eq!(
            headers(&a, &b),
            [
                "Дата USD/RUB",
                "Курс USD/RUB",
                "Время USD/RUB",
                "Дата JPY/RUB",
                "Курс JPY/RUB",
                "Время JPY/RUB",
                "Результат",
            ]
        );
    }

    #[test]
    fn test_build_overwrites_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.xlsx");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"stale").unwrap();

        let a = series(Instrument::usd_rub(), &["90", "91"]);
        let b = series(Instrument::jpy_rub(), &["0.6"]);
        let file = ReportBuilder::new(&path).build(&a, &b).unwrap();
        assert_eq!(file.row_count, 2);
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
