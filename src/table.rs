//! In-memory tabular payload.
//!
//! A `Table` is an ordered list of named columns plus an ordered list of rows.
//! Every row has exactly one cell per column; constructors reject anything
//! else, so code that indexes a row by column position never goes out of
//! bounds.

use chrono::{NaiveDateTime, Timelike};
use std::collections::HashSet;

use crate::constants::UNKNOWN_DATE;
use crate::error::{Result, StepError};

/// One typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Number(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    /// A date-like cell whose value could not be determined.
    UnknownDate,
}

impl Value {
    /// The cell as it is written back into a CSV payload.
    pub fn render(&self) -> String {
        match self {
            Value::Missing => String::new(),
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
            Value::Timestamp(ts) => render_timestamp(ts),
            Value::UnknownDate => UNKNOWN_DATE.to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Midnight timestamps render as plain dates. Sub-second parts, when present,
/// render in 3, 6 or 9 digits.
pub fn render_timestamp(ts: &NaiveDateTime) -> String {
    let t = ts.time();
    if t.hour() == 0 && t.minute() == 0 && t.second() == 0 && t.nanosecond() == 0 {
        ts.format("%Y-%m-%d").to_string()
    } else if t.nanosecond() == 0 {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for c in &columns {
            if !seen.insert(c.as_str()) {
                return Err(StepError::Schema(format!("duplicate column '{}'", c)));
            }
        }
        Ok(Self { columns, rows: Vec::new() })
    }

    /// Build a table from column names and rows, checking row widths.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut table = Self::new(columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(StepError::Schema(format!(
                "row {} has {} cells, expected {}",
                self.rows.len() + 1,
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Fail with a schema error unless the named column exists.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| StepError::Schema(format!("required column '{}' is absent", name)))
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Parse a CSV payload with a header row. Cells are kept as raw text;
    /// empty cells become `Value::Missing`.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(bytes);

        let headers = rdr.headers()?.clone();
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(StepError::Schema("payload has no header row".to_string()));
        }
        let columns: Vec<String> = headers.iter().map(str::to_string).collect();
        let mut table = Self::new(columns)?;

        for record in rdr.records() {
            let record = record?;
            let row = record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Value::Missing
                    } else {
                        Value::Text(cell.to_string())
                    }
                })
                .collect();
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Serialize header plus rows in column order. No index column.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(Value::render))?;
        }
        wtr.into_inner()
            .map_err(|e| StepError::Schema(format!("failed to serialize table: {}", e)))
    }
}
