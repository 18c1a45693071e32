// src/routes/statistics.rs
//! Dashboard statistics endpoints.
//!
//! - `GET /api/statistics` returns the full payload: global rollup,
//!   per-campus stats, ranked alerts and trends
//! - `GET /api/statistics/campus/{campus_id}` returns one campus with its own
//!   alert and trend
//!
//! A data-source failure never yields partial statistics: the response body
//! is an empty payload with an `error` field, and the status code comes from
//! the error variant.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::{
    reporting, Alert, CampusId, CampusStats, ComplianceAggregator, Config, DataSourceError,
    StatsPayload, TrendIndicator,
};

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new()
        .route("/api/statistics", get(overview))
        .route("/api/statistics/campus/{campus_id}", get(campus_detail))
}

/// Query parameters selecting which campuses the report covers.
#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    employee_id: Option<i64>,
    /// Defaults to `true` when no `employee_id` is given.
    include_all: Option<bool>,
}

impl StatisticsQuery {
    // ---
    fn include_all(&self) -> bool {
        self.include_all.unwrap_or(self.employee_id.is_none())
    }
}

/// Response body for a single campus.
#[derive(Debug, Serialize)]
struct CampusDetail {
    campus: CampusStats,
    alert: Option<Alert>,
    trend: Option<TrendIndicator>,
}

async fn overview(
    Query(params): Query<StatisticsQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> impl IntoResponse {
    // ---
    info!("GET /api/statistics - {:?}", params);

    match build_payload(&pool, &config, &params).await {
        Ok(payload) => {
            info!(
                "Statistics ready: {} campuses, {} alerts",
                payload.global.total_campuses,
                payload.alerts.len()
            );
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(e) => failure_response(e),
    }
}

async fn campus_detail(
    Path(campus_id): Path<CampusId>,
    Query(params): Query<StatisticsQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> impl IntoResponse {
    // ---
    info!("GET /api/statistics/campus/{} - {:?}", campus_id, params);

    let payload = match build_payload(&pool, &config, &params).await {
        Ok(payload) => payload,
        Err(e) => return failure_response(e),
    };

    let Some(campus) = payload.campuses.get(campus_id).cloned() else {
        debug!("Campus {} not present in report", campus_id);
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("campus {campus_id} not found") })),
        )
            .into_response();
    };

    let aggregator = aggregator_for(&config);
    let detail = CampusDetail {
        alert: aggregator.campus_alert(&campus),
        trend: payload
            .trends
            .into_iter()
            .find(|t| t.campus_id == campus_id),
        campus,
    };
    (StatusCode::OK, Json(detail)).into_response()
}

// ---

fn aggregator_for(config: &Config) -> ComplianceAggregator {
    ComplianceAggregator::new(config.excluded_campus_ids.iter().copied())
}

/// Fetch rows and names, then run the aggregation.
async fn build_payload(
    pool: &PgPool,
    config: &Config,
    params: &StatisticsQuery,
) -> Result<StatsPayload, DataSourceError> {
    // ---
    let aggregator = aggregator_for(config);
    let timeout = config.report_timeout();

    // Step 1: Reporting query
    debug!("Statistics - Step 1");
    let rows =
        reporting::fetch_stat_rows(pool, params.employee_id, params.include_all(), timeout).await?;

    // Step 2: Campus names; failure here only costs display names
    debug!("Statistics - Step 2");
    let mut ids: Vec<CampusId> = Vec::new();
    for row in rows.iter().filter(|r| !aggregator.is_excluded(r.campus_id)) {
        if !ids.contains(&row.campus_id) {
            ids.push(row.campus_id);
        }
    }
    let names = match reporting::resolve_campus_names(pool, &ids, timeout).await {
        Ok(names) => names,
        Err(e) => {
            warn!("Campus name lookup failed, using synthetic names: {}", e);
            HashMap::new()
        }
    };

    // Step 3: Aggregate
    debug!("Statistics - Step 3");
    let mut rng = rand::thread_rng();
    Ok(aggregator.aggregate(&rows, &names, &mut rng))
}

fn failure_response(e: DataSourceError) -> axum::response::Response {
    // ---
    error!("Failed to build statistics: {}", e);
    (e.status_code(), Json(StatsPayload::failed(e.to_string()))).into_response()
}
