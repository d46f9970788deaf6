//! Error breakdown by site and moment.

use super::aggregate::{percentage, Classified, SiteStats};
use super::filter::MomentOrder;

use serde::Serialize;
use std::collections::HashMap;

/// Site x moment count of kept failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorPivot {
    /// Moment columns: vocabulary moments first, then unknown ones.
    pub moments: Vec<String>,
    pub rows: Vec<PivotRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    pub site: String,
    pub total: usize,
    pub total_ok: usize,
    pub total_nok: usize,
    /// One count per entry of [`ErrorPivot::moments`].
    pub moment_counts: Vec<usize>,
    pub pct_ok: f64,
    pub pct_nok: f64,
}

impl ErrorPivot {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header row, in display order.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![
            "Site".to_string(),
            "Total".to_string(),
            "Total_OK".to_string(),
            "Total_NOK".to_string(),
        ];
        columns.extend(self.moments.iter().cloned());
        columns.push("% OK".to_string());
        columns.push("% NOK".to_string());
        columns
    }
}

/// Share of kept failures for one moment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MomentShare {
    pub moment: String,
    pub count: usize,
    pub percent: f64,
}

/// Build the site x moment pivot of kept failures, joined onto `per_site`.
///
/// Returns an empty pivot when no failure survives the filters. Rows are
/// sorted by the site's total failures, descending. Failures without a
/// moment only show up in `total_nok`.
pub fn pivot_errors(
    classified: &[Classified<'_>],
    per_site: &[SiteStats],
    moment_order: &MomentOrder,
) -> ErrorPivot {
    let mut counts: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
    let mut known = vec![false; moment_order.len()];
    let mut unknown: Vec<&str> = Vec::new();
    let mut failures = 0usize;

    for c in classified.iter().filter(|c| !c.is_ok) {
        failures += 1;
        let Some(moment) = c.record.moment.as_deref() else {
            continue;
        };

        match moment_order.position(moment) {
            Some(i) => known[i] = true,
            None if !unknown.contains(&moment) => unknown.push(moment),
            None => {}
        }

        *counts
            .entry(c.record.site.as_str())
            .or_default()
            .entry(moment)
            .or_default() += 1;
    }

    if failures == 0 {
        return ErrorPivot::default();
    }

    let moments: Vec<String> = moment_order
        .iter()
        .zip(&known)
        .filter(|(_, present)| **present)
        .map(|(m, _)| m.to_string())
        .chain(unknown.into_iter().map(str::to_string))
        .collect();

    let mut rows: Vec<PivotRow> = per_site
        .iter()
        .map(|s| {
            let site_counts = counts.get(s.site.as_str());
            PivotRow {
                site: s.site.clone(),
                total: s.total,
                total_ok: s.ok,
                total_nok: s.nok,
                moment_counts: moments
                    .iter()
                    .map(|m| {
                        site_counts
                            .and_then(|by_moment| by_moment.get(m.as_str()))
                            .copied()
                            .unwrap_or(0)
                    })
                    .collect(),
                pct_ok: percentage(s.ok, s.total, 2),
                pct_nok: percentage(s.nok, s.total, 2),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.total_nok.cmp(&a.total_nok));

    ErrorPivot { moments, rows }
}

/// Distribution of kept failures over the moment vocabulary.
///
/// Percentages are relative to every kept failure, including those with no
/// moment or a moment outside the vocabulary.
pub fn moment_distribution(
    classified: &[Classified<'_>],
    moment_order: &MomentOrder,
) -> Vec<MomentShare> {
    let mut counts = vec![0usize; moment_order.len()];
    let mut failures = 0usize;

    for c in classified.iter().filter(|c| !c.is_ok) {
        failures += 1;
        if let Some(i) = c.record.moment.as_deref().and_then(|m| moment_order.position(m)) {
            counts[i] += 1;
        }
    }

    moment_order
        .iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(moment, count)| MomentShare {
            moment: moment.to_string(),
            count,
            percent: percentage(count, failures, 1),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SessionRecord;
    use crate::sessions::aggregate::{aggregate_by_site, classify};
    use crate::sessions::filter::FilterSpec;

    fn record(site: &str, state_code: i64, moment: Option<&str>) -> SessionRecord {
        SessionRecord {
            site: site.to_string(),
            state_code,
            error_type: Some("E1".to_string()),
            moment: moment.map(str::to_string),
            start_time: None,
        }
    }

    fn order() -> MomentOrder {
        MomentOrder::new(["morning", "afternoon", "evening", "night"])
    }

    fn pivot(records: &[SessionRecord]) -> ErrorPivot {
        let classified = classify(records, &FilterSpec::default());
        let per_site = aggregate_by_site(&classified);
        pivot_errors(&classified, &per_site, &order())
    }

    #[test]
    fn test_pivot_columns_and_rows() {
        let records = vec![
            record("A", 0, None),
            record("A", 1, Some("evening")),
            record("B", 1, Some("dusk")),
            record("B", 1, Some("morning")),
            record("B", 1, Some("evening")),
            record("C", 1, Some("brunch")),
            record("C", 0, Some("dusk")),
            record("D", 0, None),
        ];
        let pivot = pivot(&records);

        assert_eq!(pivot.moments, vec!["morning", "evening", "dusk", "brunch"]);
        assert_eq!(
            pivot.columns(),
            vec![
                "Site", "Total", "Total_OK", "Total_NOK", "morning", "evening", "dusk", "brunch",
                "% OK", "% NOK"
            ]
        );

        let sites: Vec<_> = pivot.rows.iter().map(|r| r.site.as_str()).collect();
        assert_eq!(sites, vec!["B", "A", "C", "D"]);

        let b = &pivot.rows[0];
        assert_eq!((b.total, b.total_ok, b.total_nok), (3, 0, 3));
        assert_eq!(b.moment_counts, vec![1, 1, 1, 0]);
        assert_eq!((b.pct_ok, b.pct_nok), (0.0, 100.0));

        let c = &pivot.rows[2];
        assert_eq!(c.moment_counts, vec![0, 0, 0, 1]);
        assert_eq!((c.pct_ok, c.pct_nok), (50.0, 50.0));

        let d = &pivot.rows[3];
        assert_eq!(d.moment_counts, vec![0, 0, 0, 0]);
        assert_eq!(d.total_nok, 0);
    }

    #[test]
    fn test_pivot_percentages_use_two_decimals() {
        let records = vec![
            record("A", 1, Some("night")),
            record("A", 0, None),
            record("A", 0, None),
        ];
        let pivot = pivot(&records);
        assert_eq!(pivot.rows[0].pct_ok, 66.67);
        assert_eq!(pivot.rows[0].pct_nok, 33.33);
    }

    #[test]
    fn test_pivot_empty_without_failures() {
        let records = vec![record("A", 0, Some("morning")), record("B", 0, None)];
        let pivot = pivot(&records);
        assert!(pivot.is_empty());
        assert!(pivot.moments.is_empty());
    }

    #[test]
    fn test_pivot_counts_failures_without_moment() {
        let records = vec![record("A", 1, None), record("B", 1, Some("night"))];
        let pivot = pivot(&records);
        assert_eq!(pivot.moments, vec!["night"]);
        assert_eq!(pivot.rows.len(), 2);
        let a = pivot.rows.iter().find(|r| r.site == "A").unwrap();
        assert_eq!(a.total_nok, 1);
        assert_eq!(a.moment_counts, vec![0]);
    }

    #[test]
    fn test_moment_distribution() {
        let records = vec![
            record("A", 1, Some("night")),
            record("A", 1, Some("morning")),
            record("B", 1, Some("night")),
            record("B", 0, Some("afternoon")),
        ];
        let classified = classify(&records, &FilterSpec::default());
        let distribution = moment_distribution(&classified, &order());

        let moments: Vec<_> = distribution.iter().map(|d| d.moment.as_str()).collect();
        assert_eq!(moments, vec!["morning", "night"]);
        assert_eq!(distribution[0].count, 1);
        assert_eq!(distribution[0].percent, 33.3);
        assert_eq!(distribution[1].count, 2);
        assert_eq!(distribution[1].percent, 66.7);

        let sum: f64 = distribution.iter().map(|d| d.percent).sum();
        assert!((sum - 100.0).abs() <= 0.1 * distribution.len() as f64);
    }

    #[test]
    fn test_moment_distribution_denominator_includes_unplaced_failures() {
        let records = vec![
            record("A", 1, Some("morning")),
            record("A", 1, Some("dusk")),
            record("A", 1, None),
            record("A", 1, Some("morning")),
        ];
        let classified = classify(&records, &FilterSpec::default());
        let distribution = moment_distribution(&classified, &order());
        assert_eq!(distribution.len(), 1);
        assert_eq!(distribution[0].count, 2);
        assert_eq!(distribution[0].percent, 50.0);
    }

    #[test]
    fn test_moment_distribution_empty() {
        let records = vec![record("A", 0, Some("morning"))];
        let classified = classify(&records, &FilterSpec::default());
        assert!(moment_distribution(&classified, &order()).is_empty());
    }
}
