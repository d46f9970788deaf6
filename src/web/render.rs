//! HTML fragment rendering for the session views.

use crate::sessions::{AggregateResult, ErrorPivot, GlobalStats, MomentShare, SiteStats};

const STATS_TEMPLATE: &str = include_str!("templates/sessions_stats.html");
const GENERAL_TEMPLATE: &str = include_str!("templates/sessions_general.html");
const ERRORS_TEMPLATE: &str = include_str!("templates/sessions_errors.html");

/// Global KPIs plus the top-N site tables.
pub fn render_stats(result: &AggregateResult) -> String {
    fill_global(STATS_TEMPLATE, &result.global)
        .replace("{{top_volume_rows}}", &site_rows(&result.top_by_volume))
        .replace("{{top_failure_rows}}", &site_rows(&result.top_by_failures))
}

/// Global KPIs, the full per-site recap and the moment distribution.
pub fn render_general(result: &AggregateResult) -> String {
    fill_global(GENERAL_TEMPLATE, &result.global)
        .replace("{{site_rows}}", &site_rows(&result.per_site))
        .replace("{{moment_rows}}", &moment_rows(&result.moment_distribution))
}

/// The site x moment failure pivot.
pub fn render_errors(pivot: &ErrorPivot) -> String {
    let columns = pivot.columns();
    let header: String = if pivot.is_empty() {
        String::new()
    } else {
        columns
            .iter()
            .map(|c| format!("<th>{}</th>", escape_html(c)))
            .collect()
    };

    let rows = if pivot.is_empty() {
        empty_row(1, "No failures for this selection")
    } else {
        pivot
            .rows
            .iter()
            .map(|r| {
                let counts: String = r
                    .moment_counts
                    .iter()
                    .map(|c| format!("<td>{}</td>", c))
                    .collect();
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td>{}<td>{:.2}</td><td>{:.2}</td></tr>",
                    escape_html(&r.site),
                    r.total,
                    r.total_ok,
                    r.total_nok,
                    counts,
                    r.pct_ok,
                    r.pct_nok
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    ERRORS_TEMPLATE
        .replace("{{header}}", &header)
        .replace("{{rows}}", &rows)
}

fn fill_global(template: &str, global: &GlobalStats) -> String {
    template
        .replace("{{total}}", &global.total.to_string())
        .replace("{{ok}}", &global.ok_count.to_string())
        .replace("{{nok}}", &global.nok_count.to_string())
        .replace("{{success_rate}}", &format!("{:.1}", global.success_rate_pct))
        .replace("{{failure_rate}}", &format!("{:.1}", global.failure_rate_pct))
}

fn site_rows(sites: &[SiteStats]) -> String {
    if sites.is_empty() {
        return empty_row(5, "No sessions for this selection");
    }

    sites
        .iter()
        .map(|s| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.1}</td></tr>",
                escape_html(&s.site),
                s.total,
                s.ok,
                s.nok,
                s.success_rate_pct
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn moment_rows(distribution: &[MomentShare]) -> String {
    if distribution.is_empty() {
        return empty_row(3, "No failures for this selection");
    }

    distribution
        .iter()
        .map(|m| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{:.1}</td></tr>",
                escape_html(&m.moment),
                m.count,
                m.percent
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn empty_row(colspan: usize, message: &str) -> String {
    format!("<tr><td colspan=\"{}\" class=\"empty\">{}</td></tr>", colspan, message)
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
