//! Database model types.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeSet;

/// A single charging session row from `kpi_sessions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub site: String,
    /// Normalized state code: 0 is success, anything else is a failure.
    pub state_code: i64,
    pub error_type: Option<String>,
    pub moment: Option<String>,
    pub start_time: Option<NaiveDateTime>,
}

impl SessionRecord {
    /// Whether the stored state code marks a failed session.
    pub fn is_raw_failure(&self) -> bool {
        self.state_code != 0
    }
}

/// A session to insert (demo seed, tests).
#[derive(Debug, Clone)]
pub struct NewSession {
    pub site: String,
    pub state: String,
    pub error_type: Option<String>,
    pub moment: Option<String>,
    pub start_time: NaiveDateTime,
}

/// Optional columns present in the source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSet {
    pub error_type: bool,
    pub moment: bool,
}

impl Default for ColumnSet {
    fn default() -> Self {
        Self {
            error_type: true,
            moment: true,
        }
    }
}

/// Rows returned by one fetch, with the columns they were read from.
#[derive(Debug, Clone, Default)]
pub struct SessionBatch {
    pub records: Vec<SessionRecord>,
    pub columns: ColumnSet,
}

impl SessionBatch {
    pub fn new(records: Vec<SessionRecord>) -> Self {
        Self {
            records,
            columns: ColumnSet::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Row selection pushed down to SQL.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub sites: BTreeSet<String>,
    /// Inclusive lower day bound.
    pub date_start: Option<NaiveDate>,
    /// Inclusive upper day bound.
    pub date_end: Option<NaiveDate>,
}

/// Distinct values offered by the dashboard filter widgets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterOptions {
    pub sites: Vec<String>,
    pub error_types: Vec<String>,
    pub moments: Vec<String>,
}

/// Parse a textual state code.
///
/// Non-numeric or blank values count as success (0). Fractional values are
/// truncated toward zero.
pub fn parse_state_code(raw: &str) -> i64 {
    let raw = raw.trim();
    if let Ok(code) = raw.parse::<i64>() {
        return code;
    }
    match raw.parse::<f64>() {
        Ok(f) => truncate_state_code(f),
        Err(_) => 0,
    }
}

/// Convert a floating point state code, mapping non-finite values to 0.
pub fn truncate_state_code(value: f64) -> i64 {
    if value.is_finite() {
        value.trunc() as i64
    } else {
        0
    }
}
