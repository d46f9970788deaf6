//! SQLite session store implementation.

use chrono::{DateTime, Days, NaiveDateTime};
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, Result as SqlResult};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

const TABLE: &str = "kpi_sessions";

const COL_SITE: &str = "Site";
const COL_STATE: &str = "State of charge(0:good, 1:error)";
const COL_ERROR_TYPE: &str = "type_erreur";
const COL_MOMENT: &str = "moment";
const COL_START: &str = "Datetime start";

const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("database connection lock poisoned")]
    LockPoisoned,
}

/// Thread-safe session store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // --- Sessions ---

    /// Fetch the sessions matching the site and day-range filter.
    ///
    /// `date_end` is inclusive: rows are kept while their start time is before
    /// the following midnight. Optional columns missing from the table are
    /// read as NULL and flagged in the returned [`ColumnSet`].
    pub fn fetch_sessions(&self, filter: &SessionFilter) -> Result<SessionBatch, DbError> {
        let conn = self.conn()?;
        let columns = table_columns(&conn)?;

        let mut conditions = vec!["1=1".to_string()];
        let mut values: Vec<String> = Vec::new();

        if let Some(start) = filter.date_start {
            values.push(start.format("%Y-%m-%d").to_string());
            conditions.push(format!("{} >= ?{}", quote(COL_START), values.len()));
        }
        if let Some(end) = filter.date_end {
            if let Some(next_day) = end.checked_add_days(Days::new(1)) {
                values.push(next_day.format("%Y-%m-%d").to_string());
                conditions.push(format!("{} < ?{}", quote(COL_START), values.len()));
            }
        }
        if !filter.sites.is_empty() {
            let placeholders: Vec<String> = filter
                .sites
                .iter()
                .map(|site| {
                    values.push(site.clone());
                    format!("?{}", values.len())
                })
                .collect();
            conditions.push(format!("{} IN ({})", quote(COL_SITE), placeholders.join(",")));
        }

        let sql = format!(
            "SELECT {}, {}, {}, {}, {} FROM {} WHERE {}",
            quote(COL_SITE),
            quote(COL_STATE),
            optional_column(&columns, COL_ERROR_TYPE),
            optional_column(&columns, COL_MOMENT),
            quote(COL_START),
            TABLE,
            conditions.join(" AND "),
        );

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let state_code = match row.get_ref(1)? {
                    ValueRef::Integer(i) => i,
                    ValueRef::Real(f) => truncate_state_code(f),
                    ValueRef::Text(t) => parse_state_code(&String::from_utf8_lossy(t)),
                    ValueRef::Null | ValueRef::Blob(_) => 0,
                };
                Ok(SessionRecord {
                    site: text_value(row.get_ref(0)?).unwrap_or_default(),
                    state_code,
                    error_type: text_value(row.get_ref(2)?),
                    moment: text_value(row.get_ref(3)?),
                    start_time: time_value(row.get_ref(4)?),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        tracing::debug!("Store: fetched {} sessions", records.len());

        Ok(SessionBatch {
            records,
            columns: ColumnSet {
                error_type: columns.contains(COL_ERROR_TYPE),
                moment: columns.contains(COL_MOMENT),
            },
        })
    }

    /// Add sessions in batch.
    pub fn insert_sessions(&self, sessions: &[NewSession]) -> Result<(), DbError> {
        if sessions.is_empty() {
            return Ok(());
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5)",
                TABLE,
                quote(COL_SITE),
                quote(COL_STATE),
                quote(COL_ERROR_TYPE),
                quote(COL_MOMENT),
                quote(COL_START),
            ))?;

            for s in sessions {
                stmt.execute(params![
                    s.site,
                    s.state,
                    s.error_type,
                    s.moment,
                    s.start_time.format(DB_TIME_FORMAT).to_string(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Count all stored sessions.
    pub fn count_sessions(&self) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", TABLE), [], |r| r.get(0))?)
    }

    // --- Filter options ---

    /// Get the distinct values offered by the dashboard filters.
    pub fn filter_options(&self) -> Result<FilterOptions, DbError> {
        Ok(FilterOptions {
            sites: self.distinct_sites()?,
            error_types: self.distinct_error_types()?,
            moments: self.distinct_moments()?,
        })
    }

    pub fn distinct_sites(&self) -> Result<Vec<String>, DbError> {
        self.distinct_values(COL_SITE)
    }

    pub fn distinct_error_types(&self) -> Result<Vec<String>, DbError> {
        self.distinct_values(COL_ERROR_TYPE)
    }

    pub fn distinct_moments(&self) -> Result<Vec<String>, DbError> {
        self.distinct_values(COL_MOMENT)
    }

    fn distinct_values(&self, column: &str) -> Result<Vec<String>, DbError> {
        let conn = self.conn()?;
        if !table_columns(&conn)?.contains(column) {
            return Ok(Vec::new());
        }

        let col = quote(column);
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {col} FROM {TABLE} WHERE {col} IS NOT NULL AND TRIM({col}) <> '' ORDER BY {col}"
        ))?;
        let values = stmt
            .query_map([], |row| Ok(text_value(row.get_ref(0)?)))?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(values.into_iter().flatten().collect())
    }
}

/// Column names of the sessions table.
fn table_columns(conn: &Connection) -> Result<HashSet<String>, DbError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", TABLE))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<SqlResult<HashSet<_>>>()?;
    Ok(names)
}

fn optional_column(columns: &HashSet<String>, name: &str) -> String {
    if columns.contains(name) {
        quote(name)
    } else {
        "NULL".to_string()
    }
}

/// Read a loosely typed column as text. Numbers are formatted, blobs dropped.
fn text_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

/// Read a start time stored as text or as unix seconds.
fn time_value(value: ValueRef<'_>) -> Option<NaiveDateTime> {
    match value {
        ValueRef::Text(t) => parse_db_time(&String::from_utf8_lossy(t)),
        ValueRef::Integer(secs) => DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc()),
        ValueRef::Real(secs) if secs.is_finite() => {
            DateTime::from_timestamp(secs.trunc() as i64, 0).map(|dt| dt.naive_utc())
        }
        _ => None,
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<NaiveDateTime> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];

    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::NamedTempFile;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn session(site: &str, state: &str, start: NaiveDateTime) -> NewSession {
        NewSession {
            site: site.to_string(),
            state: state.to_string(),
            error_type: Some("E1".to_string()),
            moment: Some("morning".to_string()),
            start_time: start,
        }
    }

    fn seeded_store(tmp: &NamedTempFile) -> Store {
        let store = Store::new(tmp.path()).unwrap();
        store
            .insert_sessions(&[
                session("A", "0", at(1, 8)),
                session("A", "1", at(2, 23)),
                session("B", "1", at(3, 0)),
                session("C", "garbage", at(4, 12)),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_fetch_all_sessions() {
        let tmp = NamedTempFile::new().unwrap();
        let store = seeded_store(&tmp);

        let batch = store.fetch_sessions(&SessionFilter::default()).unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.columns, ColumnSet::default());
        assert_eq!(store.count_sessions().unwrap(), 4);

        let c = batch.records.iter().find(|r| r.site == "C").unwrap();
        assert_eq!(c.state_code, 0);
        assert_eq!(c.start_time, Some(at(4, 12)));
    }

    #[test]
    fn test_fetch_date_end_is_inclusive() {
        let tmp = NamedTempFile::new().unwrap();
        let store = seeded_store(&tmp);

        let filter = SessionFilter {
            date_start: NaiveDate::from_ymd_opt(2024, 3, 2),
            date_end: NaiveDate::from_ymd_opt(2024, 3, 2),
            ..Default::default()
        };
        let batch = store.fetch_sessions(&filter).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records[0].site, "A");
        assert_eq!(batch.records[0].state_code, 1);

        // Midnight of the following day is excluded
        let filter = SessionFilter {
            date_end: NaiveDate::from_ymd_opt(2024, 3, 2),
            ..Default::default()
        };
        assert_eq!(store.fetch_sessions(&filter).unwrap().len(), 2);
    }

    #[test]
    fn test_fetch_site_filter() {
        let tmp = NamedTempFile::new().unwrap();
        let store = seeded_store(&tmp);

        let filter = SessionFilter {
            sites: ["B".to_string(), "C".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let batch = store.fetch_sessions(&filter).unwrap();
        let mut sites: Vec<_> = batch.records.iter().map(|r| r.site.as_str()).collect();
        sites.sort();
        assert_eq!(sites, vec!["B", "C"]);

        let filter = SessionFilter {
            sites: ["a".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert!(store.fetch_sessions(&filter).unwrap().is_empty());
    }

    #[test]
    fn test_missing_optional_column() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let conn = Connection::open(tmp.path()).unwrap();
            conn.execute_batch(
                r#"CREATE TABLE kpi_sessions (
                    "Site" TEXT NOT NULL,
                    "State of charge(0:good, 1:error)" INTEGER,
                    "type_erreur" TEXT,
                    "Datetime start" TEXT NOT NULL
                );
                INSERT INTO kpi_sessions VALUES ('A', 1, 'E1', '2024-03-01 10:00:00');"#,
            )
            .unwrap();
        }

        let store = Store::new(tmp.path()).unwrap();
        let batch = store.fetch_sessions(&SessionFilter::default()).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.columns.error_type);
        assert!(!batch.columns.moment);
        assert_eq!(batch.records[0].moment, None);
        assert!(store.distinct_moments().unwrap().is_empty());
    }

    #[test]
    fn test_filter_options() {
        let tmp = NamedTempFile::new().unwrap();
        let store = seeded_store(&tmp);
        store
            .insert_sessions(&[NewSession {
                site: "B".to_string(),
                state: "1".to_string(),
                error_type: Some("  ".to_string()),
                moment: None,
                start_time: at(5, 9),
            }])
            .unwrap();

        let options = store.filter_options().unwrap();
        assert_eq!(options.sites, vec!["A", "B", "C"]);
        assert_eq!(options.error_types, vec!["E1"]);
        assert_eq!(options.moments, vec!["morning"]);
    }

    #[test]
    fn test_loosely_typed_columns_are_tolerated() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let conn = Connection::open(tmp.path()).unwrap();
            conn.execute_batch(
                r#"CREATE TABLE kpi_sessions (
                    "Site",
                    "State of charge(0:good, 1:error)",
                    "type_erreur",
                    "moment",
                    "Datetime start"
                );
                INSERT INTO kpi_sessions VALUES (7, 1, 42, 'night', 1709287200);
                INSERT INTO kpi_sessions VALUES ('B', '1', 'E1', 3.5, X'00FF');
                INSERT INTO kpi_sessions VALUES ('C', 0, NULL, NULL, '2024-03-01 08:00:00');"#,
            )
            .unwrap();
        }

        let store = Store::new(tmp.path()).unwrap();
        let batch = store.fetch_sessions(&SessionFilter::default()).unwrap();
        assert_eq!(batch.len(), 3);

        let first = batch.records.iter().find(|r| r.site == "7").unwrap();
        assert_eq!(first.state_code, 1);
        assert_eq!(first.error_type.as_deref(), Some("42"));
        assert_eq!(first.start_time, Some(at(1, 10)));

        let second = batch.records.iter().find(|r| r.site == "B").unwrap();
        assert_eq!(second.moment.as_deref(), Some("3.5"));
        assert_eq!(second.start_time, None);

        let third = batch.records.iter().find(|r| r.site == "C").unwrap();
        assert_eq!(third.error_type, None);
        assert_eq!(third.start_time, Some(at(1, 8)));

        assert_eq!(store.distinct_error_types().unwrap(), vec!["42", "E1"]);
        assert_eq!(store.distinct_moments().unwrap(), vec!["3.5", "night"]);
    }

    #[test]
    fn test_parse_db_time() {
        assert_eq!(parse_db_time("2024-03-01 08:00:00"), Some(at(1, 8)));
        assert_eq!(parse_db_time("2024-03-01T08:00:00"), Some(at(1, 8)));
        assert_eq!(parse_db_time("2024-03-01 08:00"), Some(at(1, 8)));
        assert!(parse_db_time("yesterday").is_none());
    }
}
