//! HTTP request handlers.

use super::render::{render_errors, render_general, render_stats};
use super::AppState;
use crate::db::DbError;
use crate::sessions::{AggregateResult, FilterSpec};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use chrono::NaiveDate;
use rust_embed::RustEmbed;
use serde::Deserialize;
use std::collections::BTreeSet;
use thiserror::Error;

// ============================================================================
// Templates
// ============================================================================

const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");
const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Assets;

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by the session endpoints.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid {field}: {value:?} (expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, value: String },
    #[error("failed to load sessions: {0}")]
    Store(#[from] DbError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidDate { .. } => StatusCode::BAD_REQUEST,
            ApiError::Store(e) => {
                tracing::error!("Sessions: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

// ============================================================================
// Query parsing
// ============================================================================

/// Query string shared by every session endpoint.
///
/// Lists are comma-separated. Blank values mean "no restriction".
#[derive(Debug, Default, Deserialize)]
pub struct SessionsQuery {
    #[serde(default)]
    pub sites: String,
    #[serde(default, alias = "date_debut")]
    pub date_start: Option<String>,
    #[serde(default, alias = "date_fin")]
    pub date_end: Option<String>,
    #[serde(default)]
    pub error_types: String,
    #[serde(default)]
    pub moments: String,
}

impl SessionsQuery {
    pub fn to_filter(&self) -> Result<FilterSpec, ApiError> {
        Ok(FilterSpec {
            sites: split_list(&self.sites),
            date_start: parse_day("date_start", self.date_start.as_deref())?,
            date_end: parse_day("date_end", self.date_end.as_deref())?,
            error_types: split_list(&self.error_types),
            moments: split_list(&self.moments),
        })
    }
}

fn split_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_day(field: &'static str, raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::InvalidDate {
                field,
                value: value.to_string(),
            }),
    }
}

/// Fetch the batch for a request and aggregate it once.
fn load_sessions(state: &AppState, query: &SessionsQuery) -> Result<AggregateResult, ApiError> {
    let filters = query.to_filter()?;
    let batch = state.store.fetch_sessions(&filters.session_filter())?;
    Ok(state.aggregator.aggregate(&batch, &filters))
}

// ============================================================================
// Dashboard
// ============================================================================

pub async fn handle_dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let options = match state.store.filter_options() {
        Ok(options) => options,
        Err(e) => {
            tracing::error!("Dashboard: Failed to load filter options: {}", e);
            Default::default()
        }
    };
    let moment_order: Vec<&str> = state.aggregator.moment_order().iter().collect();

    let content = DASHBOARD_TEMPLATE
        .replace("{{filter_options_json}}", &script_json(&options))
        .replace("{{moment_order_json}}", &script_json(&moment_order));

    let page = LAYOUT_TEMPLATE
        .replace("{{title}}", "Charging Sessions")
        .replace("{{content}}", &content);

    Html(page)
}

/// JSON safe to inline in a `<script>` element.
fn script_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
}

// ============================================================================
// API: Sessions
// ============================================================================

/// Global KPIs and top-N site tables.
pub async fn handle_sessions_stats(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Html<String>, ApiError> {
    let result = load_sessions(&state, &query)?;
    Ok(Html(render_stats(&result)))
}

/// Global KPIs, per-site recap and moment distribution.
pub async fn handle_sessions_general(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Html<String>, ApiError> {
    let result = load_sessions(&state, &query)?;
    Ok(Html(render_general(&result)))
}

/// Site x moment failure pivot.
pub async fn handle_sessions_errors(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Html<String>, ApiError> {
    let result = load_sessions(&state, &query)?;
    Ok(Html(render_errors(&result.site_moment_pivot)))
}

pub async fn handle_sessions_summary(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<AggregateResult>, ApiError> {
    Ok(Json(load_sessions(&state, &query)?))
}

pub async fn handle_filter_options(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.filter_options() {
        Ok(options) => Json(options).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

// ============================================================================
// Static Assets
// ============================================================================

pub async fn handle_static(Path(path): Path<String>) -> impl IntoResponse {
    serve_asset(&path)
}

pub async fn handle_favicon() -> impl IntoResponse {
    serve_asset("favicon.svg")
}

fn serve_asset(path: &str) -> Response {
    match Assets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                file.data.into_owned(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
