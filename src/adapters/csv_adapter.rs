//! CSV file market data adapter.
//!
//! Reads `<base>/<symbol>.csv` with a header row. The columns `date, open,
//! high, low, close, volume` are required (any order, case-insensitive);
//! every other column is a boolean condition (`true/false`, `1/0`,
//! `yes/no`).

use crate::domain::error::StratlabError;
use crate::domain::price::PriceBar;
use crate::domain::series::{ConditionSeries, ConditionSet};
use crate::ports::data_port::{DataPort, MarketData};
use chrono::NaiveDate;
use std::fs::File;
use std::path::PathBuf;

const REQUIRED: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

fn parse_condition(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

struct Row {
    bar: PriceBar,
    flags: Vec<bool>,
}

struct Layout {
    required: [usize; 6],
    conditions: Vec<(usize, String)>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, StratlabError> {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let mut required = [0usize; 6];
        for (slot, name) in required.iter_mut().zip(REQUIRED) {
            *slot = normalized.iter().position(|h| h == name).ok_or_else(|| {
                StratlabError::schema(format!("missing required column '{}'", name))
            })?;
        }
        let conditions = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !required.contains(i))
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();
        Ok(Self {
            required,
            conditions,
        })
    }

    fn field<'r>(
        &self,
        record: &'r csv::StringRecord,
        column: usize,
        row: usize,
        name: &str,
    ) -> Result<&'r str, StratlabError> {
        match record.get(column).map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(StratlabError::schema(format!(
                "row {}: empty value in column '{}'",
                row, name
            ))),
        }
    }

    fn number(
        &self,
        record: &csv::StringRecord,
        slot: usize,
        row: usize,
    ) -> Result<f64, StratlabError> {
        let name = REQUIRED[slot];
        let raw = self.field(record, self.required[slot], row, name)?;
        raw.parse::<f64>().map_err(|_| {
            StratlabError::schema(format!(
                "row {}: invalid number '{}' in column '{}'",
                row, raw, name
            ))
        })
    }

    fn parse_row(&self, record: &csv::StringRecord, row: usize) -> Result<Row, StratlabError> {
        let raw_date = self.field(record, self.required[0], row, "date")?;
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|_| {
            StratlabError::schema(format!(
                "row {}: invalid date '{}' (expected YYYY-MM-DD)",
                row, raw_date
            ))
        })?;
        let volume = self.number(record, 5, row)?;
        if volume < 0.0 {
            return Err(StratlabError::schema(format!(
                "row {}: negative volume {}",
                row, volume
            )));
        }
        let bar = PriceBar {
            date,
            open: self.number(record, 1, row)?,
            high: self.number(record, 2, row)?,
            low: self.number(record, 3, row)?,
            close: self.number(record, 4, row)?,
            volume,
        };

        let flags = self
            .conditions
            .iter()
            .map(|(column, name)| {
                let raw = self.field(record, *column, row, name)?;
                parse_condition(raw).ok_or_else(|| {
                    StratlabError::schema(format!(
                        "row {}: '{}' in column '{}' is not a boolean",
                        row, raw, name
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Row { bar, flags })
    }
}

impl DataPort for CsvAdapter {
    fn fetch_market_data(&self, symbol: &str) -> Result<MarketData, StratlabError> {
        let path = self.csv_path(symbol);
        let file = File::open(&path).map_err(|e| {
            std::io::Error::new(e.kind(), format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut rdr = csv::Reader::from_reader(file);
        let headers = rdr
            .headers()
            .map_err(|e| StratlabError::schema(format!("CSV header error: {}", e)))?
            .clone();
        let layout = Layout::from_headers(&headers)?;

        let mut rows = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            // header is line 1
            let row = i + 2;
            let record = result
                .map_err(|e| StratlabError::schema(format!("row {}: CSV parse error: {}", row, e)))?;
            rows.push(layout.parse_row(&record, row)?);
        }

        if rows.is_empty() {
            return Err(StratlabError::NoData {
                symbol: symbol.to_string(),
            });
        }
        rows.sort_by_key(|r| r.bar.date);

        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.bar.date).collect();
        let mut conditions = ConditionSet::new();
        for (idx, (_, name)) in layout.conditions.iter().enumerate() {
            let values = rows.iter().map(|r| r.flags[idx]).collect();
            conditions.insert(name.clone(), ConditionSeries::new(dates.clone(), values)?);
        }
        let bars = rows.into_iter().map(|r| r.bar).collect();

        tracing::debug!(
            symbol,
            path = %path.display(),
            conditions = conditions.len(),
            "loaded market data"
        );
        Ok(MarketData { bars, conditions })
    }
}
