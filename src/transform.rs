//! The cleaning transform.
//!
//! Pure mapping from an input table and a `CleaningConfig` to an output table.
//! Rows keep their input order; rows whose price is missing, non-numeric or
//! outside the inclusive bounds are dropped and counted. `last_review` is
//! parsed into a timestamp, or the unknown-date sentinel when it cannot be.
//! Every other column is copied through untouched.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CleaningConfig;
use crate::constants::{LAST_REVIEW_COLUMN, PRICE_COLUMN};
use crate::error::Result;
use crate::table::{Table, Value};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Row-level counts from one transform invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformReport {
    pub rows_in: usize,
    pub rows_kept: usize,
    pub dropped_missing_price: usize,
    pub dropped_invalid_price: usize,
    pub dropped_out_of_range: usize,
    pub unknown_dates: usize,
}

impl TransformReport {
    pub fn rows_dropped(&self) -> usize {
        self.dropped_missing_price + self.dropped_invalid_price + self.dropped_out_of_range
    }
}

enum PriceCheck {
    Missing,
    Invalid,
    Valid(f64),
}

fn check_price(value: &Value) -> PriceCheck {
    match value {
        Value::Missing => PriceCheck::Missing,
        Value::Number(n) if n.is_finite() => PriceCheck::Valid(*n),
        Value::Text(s) if s.trim().is_empty() => PriceCheck::Missing,
        Value::Text(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => PriceCheck::Valid(n),
            _ => PriceCheck::Invalid,
        },
        _ => PriceCheck::Invalid,
    }
}

/// Parse a date-like string into its canonical timestamp.
pub fn parse_review_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn normalize_review(value: &Value) -> Value {
    match value {
        Value::Timestamp(ts) => Value::Timestamp(*ts),
        Value::Text(s) => match parse_review_date(s) {
            Some(ts) => Value::Timestamp(ts),
            None => {
                debug!(value = %s, "unparseable last_review, using unknown-date sentinel");
                Value::UnknownDate
            }
        },
        _ => Value::UnknownDate,
    }
}

/// Apply the price filter and date normalization.
///
/// Fails only when `price` or `last_review` is absent from the header;
/// problems with individual cells never raise.
pub fn clean(input: &Table, config: &CleaningConfig) -> Result<(Table, TransformReport)> {
    let price_idx = input.require_column(PRICE_COLUMN)?;
    let review_idx = input.require_column(LAST_REVIEW_COLUMN)?;

    let mut report = TransformReport { rows_in: input.len(), ..Default::default() };
    let mut output = Table::new(input.columns().to_vec())?;

    for row in input.rows() {
        let price = match check_price(&row[price_idx]) {
            PriceCheck::Missing => {
                report.dropped_missing_price += 1;
                continue;
            }
            PriceCheck::Invalid => {
                report.dropped_invalid_price += 1;
                continue;
            }
            PriceCheck::Valid(p) => p,
        };
        if !config.accepts_price(price) {
            report.dropped_out_of_range += 1;
            continue;
        }

        let mut out = row.clone();
        out[review_idx] = normalize_review(&row[review_idx]);
        if out[review_idx] == Value::UnknownDate {
            report.unknown_dates += 1;
        }
        output.push_row(out)?;
    }

    report.rows_kept = output.len();
    Ok((output, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;

    fn config(min: f64, max: f64) -> CleaningConfig {
        CleaningConfig::new(min, max, "clean_sample.csv", "clean_sample", "cleaned").unwrap()
    }

    fn ts(y: i32, m: u32, d: u32) -> Value {
        Value::Timestamp(NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap())
    }

    #[test]
    fn keeps_in_range_rows_and_parses_dates() {
        let input = Table::from_csv_bytes(b"price,last_review\n50,2019-01-01\n500,2019-02-02\n").unwrap();
        let (out, report) = clean(&input, &config(0.0, 100.0)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.get(0, "price"), Some(&Value::Text("50".into())));
        assert_eq!(out.get(0, "last_review"), Some(&ts(2019, 1, 1)));
        assert_eq!(report.rows_in, 2);
        assert_eq!(report.dropped_out_of_range, 1);
    }

    #[test]
    fn fractional_seconds_are_parsed_not_sentinel() {
        let input = Table::from_csv_bytes(
            b"price,last_review\n50,2019-05-21 13:04:05.250\n60,2019-05-21T13:04:05.5\n",
        )
        .unwrap();
        let (out, report) = clean(&input, &config(0.0, 100.0)).unwrap();
        assert_eq!(report.unknown_dates, 0);
        let rendered: Vec<_> = out.rows().iter().map(|r| r[1].render()).collect();
        assert_eq!(rendered, vec!["2019-05-21 13:04:05.250", "2019-05-21 13:04:05.500"]);
    }

    #[test]
    fn bounds_are_inclusive() {
        let input = Table::from_csv_bytes(b"price,last_review\n10,2019-01-01\n350,2019-01-01\n9.99,2019-01-01\n350.01,2019-01-01\n").unwrap();
        let (out, _) = clean(&input, &config(10.0, 350.0)).unwrap();
        let prices: Vec<_> = out.rows().iter().map(|r| r[0].render()).collect();
        assert_eq!(prices, vec!["10", "350"]);
    }

    #[test]
    fn missing_and_non_numeric_prices_are_dropped_and_counted() {
        let input = Table::from_csv_bytes(b"price,last_review\n,2019-01-01\nabc,2019-01-01\nNaN,2019-01-01\n20,2019-01-01\n").unwrap();
        let (out, report) = clean(&input, &config(0.0, 100.0)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(report.dropped_missing_price, 1);
        assert_eq!(report.dropped_invalid_price, 2);
        assert_eq!(report.rows_dropped(), 3);
        assert_eq!(report.rows_kept, 1);
    }

    #[test]
    fn unparseable_dates_keep_the_row_with_sentinel() {
        let input = Table::from_csv_bytes(b"price,last_review\n20,not a date\n30,\n").unwrap();
        let (out, report) = clean(&input, &config(0.0, 100.0)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(0, "last_review"), Some(&Value::UnknownDate));
        assert_eq!(out.get(1, "last_review"), Some(&Value::UnknownDate));
        assert_eq!(report.unknown_dates, 2);
    }

    #[test]
    fn other_columns_and_order_pass_through() {
        let input = Table::from_csv_bytes(
            b"id,name,price,last_review,neighbourhood\n7,\"Loft, Soho\",80,2019-05-21,Manhattan\n8,Room,5,2019-05-21,Queens\n9,Suite,90,2018-12-31,Brooklyn\n",
        )
        .unwrap();
        let (out, _) = clean(&input, &config(10.0, 100.0)).unwrap();
        assert_eq!(out.columns(), input.columns());
        assert_eq!(out.get(0, "name"), Some(&Value::Text("Loft, Soho".into())));
        assert_eq!(out.get(1, "id"), Some(&Value::Text("9".into())));
        assert_eq!(out.get(1, "neighbourhood"), Some(&Value::Text("Brooklyn".into())));
    }

    #[test]
    fn absent_required_columns_are_schema_errors() {
        let no_price = Table::from_csv_bytes(b"cost,last_review\n1,2019-01-01\n").unwrap();
        assert!(matches!(clean(&no_price, &config(0.0, 1.0)), Err(StepError::Schema(_))));
        let no_review = Table::from_csv_bytes(b"price,reviewed\n1,2019-01-01\n").unwrap();
        assert!(matches!(clean(&no_review, &config(0.0, 1.0)), Err(StepError::Schema(_))));
    }

    #[test]
    fn repeated_invocations_are_identical() {
        let input = Table::from_csv_bytes(b"price,last_review\n50,2019-01-01\nx,?\n75,07/04/2019\n").unwrap();
        let c = config(0.0, 100.0);
        let (a, ra) = clean(&input, &c).unwrap();
        let (b, rb) = clean(&input, &c).unwrap();
        assert_eq!(a.to_csv_bytes().unwrap(), b.to_csv_bytes().unwrap());
        assert_eq!(ra, rb);
    }

    #[test]
    fn accepts_common_date_shapes() {
        let expect = NaiveDate::from_ymd_opt(2019, 7, 4).unwrap();
        for raw in ["2019-07-04", "07/04/2019", "2019/07/04", "2019-07-04 00:00:00", "2019-07-04T00:00:00Z"] {
            assert_eq!(parse_review_date(raw).map(|d| d.date()), Some(expect), "{}", raw);
        }
        assert_eq!(parse_review_date("2019-13-45"), None);
        assert_eq!(parse_review_date("   "), None);
    }
}
