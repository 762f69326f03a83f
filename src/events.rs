//! Event log parsing.
//!
//! Reads a BIDS `*_events.tsv` and turns it into an [`EventTable`]: ordered
//! `(sample, code)` pairs with ignored codes (sync/start triggers) removed.
//! Only the `sample` and `value` columns are used; everything else in the log
//! is carried along untouched in [`EventLog`] and never interpreted.
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

use crate::error::{ErpError, Result};

/// Column holding the sample index of each event.
pub const SAMPLE_COLUMN: &str = "sample";
/// Column holding the integer event code.
pub const CODE_COLUMN: &str = "value";

/// Raw tab-separated event log: header plus string rows.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl EventLog {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .trim(Trim::All)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        let mut record = StringRecord::new();
        while rdr.read_record(&mut record)? {
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ErpError::MissingColumn(name.to_string()))
    }
}

/// One time-locking event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sample: usize,
    pub code: i64,
}

/// Validated events, sorted by sample, ignored codes removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTable {
    records: Vec<EventRecord>,
}

impl EventTable {
    /// Build the table from a parsed log.
    ///
    /// Rows whose code is in `ignore_codes` are dropped; the rest are stably
    /// sorted by sample so equal samples keep log order.
    pub fn build(log: &EventLog, ignore_codes: &[i64]) -> Result<Self> {
        let sample_col = log.column(SAMPLE_COLUMN)?;
        let code_col = log.column(CODE_COLUMN)?;

        let mut records = Vec::with_capacity(log.len());
        for (i, row) in log.rows.iter().enumerate() {
            // Header is line 1, so data rows start at 2.
            let line = i + 2;
            let code = parse_integer(row.get(code_col), line, CODE_COLUMN)?;
            if ignore_codes.contains(&code) {
                continue;
            }
            let sample = parse_integer(row.get(sample_col), line, SAMPLE_COLUMN)?;
            let sample = usize::try_from(sample).map_err(|_| ErpError::MalformedEvent {
                row: line,
                column: SAMPLE_COLUMN.to_string(),
                value: sample.to_string(),
            })?;
            records.push(EventRecord { sample, code });
        }

        if records.is_empty() {
            return Err(ErpError::EmptyEvents);
        }

        records.sort_by_key(|r| r.sample);
        log::info!(
            "Event table: {} of {} rows kept (ignored codes {:?})",
            records.len(),
            log.len(),
            ignore_codes
        );
        Ok(Self { records })
    }

    /// Table from already-validated records (sorted on construction).
    pub fn from_records(mut records: Vec<EventRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(ErpError::EmptyEvents);
        }
        records.sort_by_key(|r| r.sample);
        Ok(Self { records })
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn codes(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.code).collect()
    }

    pub fn count_code(&self, code: i64) -> usize {
        self.records.iter().filter(|r| r.code == code).count()
    }
}

/// Integer cell; integral floats such as `"512.0"` are accepted when they
/// fit in an `i64`.
fn parse_integer(cell: Option<&String>, row: usize, column: &str) -> Result<i64> {
    let malformed = |value: &str| ErpError::MalformedEvent {
        row,
        column: column.to_string(),
        value: value.to_string(),
    };
    let raw = cell.map(String::as_str).unwrap_or("");
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        // `i64::MAX as f64` rounds up to 2^63, so the range stays half-open.
        Ok(v) if v.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&v) => {
            Ok(v as i64)
        }
        _ => Err(malformed(raw)),
    }
}
