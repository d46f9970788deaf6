//! Request filters and the failure reclassification rule.

use crate::db::{ColumnSet, SessionFilter, SessionRecord};

use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Filters for one aggregation pass.
///
/// `sites` and the date bounds are pushed down to the store. `error_types`
/// and `moments` select which failures stay failures; an empty set keeps
/// every failure for that dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub sites: BTreeSet<String>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub error_types: BTreeSet<String>,
    pub moments: BTreeSet<String>,
}

impl FilterSpec {
    /// The part of the filter applied when fetching rows.
    pub fn session_filter(&self) -> SessionFilter {
        SessionFilter {
            sites: self.sites.clone(),
            date_start: self.date_start,
            date_end: self.date_end,
        }
    }

    /// Drop the filter dimensions whose column is missing from the source.
    pub fn restrict_to(&self, columns: &ColumnSet) -> FilterSpec {
        let mut restricted = self.clone();
        if !columns.error_type {
            restricted.error_types.clear();
        }
        if !columns.moment {
            restricted.moments.clear();
        }
        restricted
    }
}

/// Whether `value` passes a filter set. An empty set matches everything.
pub fn matches(value: Option<&str>, set: &BTreeSet<String>) -> bool {
    set.is_empty() || value.is_some_and(|v| set.contains(v))
}

/// Whether a record is kept as a failure in this view.
///
/// Raw failures that fall outside the active error-type or moment filter are
/// reported as OK.
pub fn counts_as_failure(record: &SessionRecord, filters: &FilterSpec) -> bool {
    record.is_raw_failure()
        && matches(record.error_type.as_deref(), &filters.error_types)
        && matches(record.moment.as_deref(), &filters.moments)
}

/// Ordered moment vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MomentOrder {
    moments: Vec<String>,
}

impl MomentOrder {
    /// Build the vocabulary, trimming entries and dropping blanks and repeats.
    pub fn new<I, S>(moments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for moment in moments {
            let moment = moment.as_ref().trim();
            if !moment.is_empty() && !ordered.iter().any(|m| m == moment) {
                ordered.push(moment.to_string());
            }
        }
        Self { moments: ordered }
    }

    pub fn position(&self, moment: &str) -> Option<usize> {
        self.moments.iter().position(|m| m == moment)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.moments.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.moments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moments.is_empty()
    }
}
