//! Session classification and OK/NOK rollups.

use super::filter::{counts_as_failure, FilterSpec, MomentOrder};
use super::pivot::{moment_distribution, pivot_errors, ErrorPivot, MomentShare};
use crate::db::{SessionBatch, SessionRecord};

use serde::Serialize;
use std::collections::BTreeMap;

/// A record with its effective classification for the current view.
#[derive(Debug, Clone, Copy)]
pub struct Classified<'a> {
    pub record: &'a SessionRecord,
    pub is_ok: bool,
}

/// Global totals and rates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlobalStats {
    pub total: usize,
    pub ok_count: usize,
    pub nok_count: usize,
    pub success_rate_pct: f64,
    pub failure_rate_pct: f64,
}

/// Totals for one site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteStats {
    pub site: String,
    pub total: usize,
    pub ok: usize,
    pub nok: usize,
    pub success_rate_pct: f64,
}

/// Column used to rank sites in the top-N tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankKey {
    Volume,
    Failures,
}

impl RankKey {
    fn value(self, stats: &SiteStats) -> usize {
        match self {
            RankKey::Volume => stats.total,
            RankKey::Failures => stats.nok,
        }
    }
}

/// Everything the session views render, computed in one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateResult {
    #[serde(flatten)]
    pub global: GlobalStats,
    pub per_site: Vec<SiteStats>,
    pub top_by_volume: Vec<SiteStats>,
    pub top_by_failures: Vec<SiteStats>,
    pub site_moment_pivot: ErrorPivot,
    pub moment_distribution: Vec<MomentShare>,
}

/// Apply the reclassification rule to every record.
pub fn classify<'a>(records: &'a [SessionRecord], filters: &FilterSpec) -> Vec<Classified<'a>> {
    records
        .iter()
        .map(|record| Classified {
            record,
            is_ok: !counts_as_failure(record, filters),
        })
        .collect()
}

pub fn aggregate_global(classified: &[Classified<'_>]) -> GlobalStats {
    let total = classified.len();
    let ok_count = classified.iter().filter(|c| c.is_ok).count();
    let nok_count = total - ok_count;

    GlobalStats {
        total,
        ok_count,
        nok_count,
        success_rate_pct: percentage(ok_count, total, 1),
        failure_rate_pct: percentage(nok_count, total, 1),
    }
}

/// Group by site, ordered by site identifier.
pub fn aggregate_by_site(classified: &[Classified<'_>]) -> Vec<SiteStats> {
    let mut groups: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for c in classified {
        let (total, ok) = groups.entry(c.record.site.as_str()).or_default();
        *total += 1;
        if c.is_ok {
            *ok += 1;
        }
    }

    groups
        .into_iter()
        .map(|(site, (total, ok))| SiteStats {
            site: site.to_string(),
            total,
            ok,
            nok: total - ok,
            success_rate_pct: percentage(ok, total, 1),
        })
        .collect()
}

/// The `n` highest sites for `key`. Ties keep their order in `per_site`.
pub fn top_n(per_site: &[SiteStats], key: RankKey, n: usize) -> Vec<SiteStats> {
    let mut ranked = per_site.to_vec();
    ranked.sort_by(|a, b| key.value(b).cmp(&key.value(a)));
    ranked.truncate(n);
    ranked
}

/// `part / total` as a percentage rounded to `decimals`, 0 when `total` is 0.
pub fn percentage(part: usize, total: usize, decimals: i32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(part as f64 / total as f64 * 100.0, decimals)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Runs the classification and every rollup for one batch.
#[derive(Debug, Clone)]
pub struct Aggregator {
    moment_order: MomentOrder,
    top_n: usize,
}

impl Aggregator {
    pub fn new(moment_order: MomentOrder, top_n: usize) -> Self {
        Self { moment_order, top_n }
    }

    pub fn moment_order(&self) -> &MomentOrder {
        &self.moment_order
    }

    pub fn aggregate(&self, batch: &SessionBatch, filters: &FilterSpec) -> AggregateResult {
        let filters = filters.restrict_to(&batch.columns);
        let classified = classify(&batch.records, &filters);

        let global = aggregate_global(&classified);
        let per_site = aggregate_by_site(&classified);
        let top_by_volume = top_n(&per_site, RankKey::Volume, self.top_n);
        let top_by_failures = top_n(&per_site, RankKey::Failures, self.top_n);
        let site_moment_pivot = pivot_errors(&classified, &per_site, &self.moment_order);
        let moment_distribution = moment_distribution(&classified, &self.moment_order);

        tracing::debug!(
            "Aggregator: {} sessions, {} ok, {} nok across {} sites",
            global.total,
            global.ok_count,
            global.nok_count,
            per_site.len()
        );

        AggregateResult {
            global,
            per_site,
            top_by_volume,
            top_by_failures,
            site_moment_pivot,
            moment_distribution,
        }
    }
}
