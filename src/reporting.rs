//! Postgres binding for the reporting collaborators.
//!
//! Two calls feed the aggregator:
//! - `campus_document_stats(employee_id, include_all)`, a SQL function
//!   created by `schema`, returning one row per (campus, category)
//! - an active-campus name lookup
//!
//! Both are bounded by the configured timeout. Rows are validated as a
//! whole: one bad row fails the call instead of yielding a partial set.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::{DataSourceError, Result};
use crate::models::{CampusId, DocumentCategory, RawStatRow};

// ---

/// Fetch raw per-campus, per-category counts.
///
/// With `include_all` every campus is returned; otherwise only the
/// campuses assigned to `employee_id`.
pub async fn fetch_stat_rows(
    pool: &PgPool,
    employee_id: Option<i64>,
    include_all: bool,
    timeout: Duration,
) -> Result<Vec<RawStatRow>> {
    // ---
    tracing::debug!(
        "Calling campus_document_stats(employee_id={:?}, include_all={})",
        employee_id,
        include_all
    );

    let query = sqlx::query(
        r#"
        SELECT campus_id, tipo_documento, total, pendientes, vigentes, rechazados, caducados
        FROM campus_document_stats($1, $2)
        "#,
    )
    .bind(employee_id)
    .bind(include_all)
    .fetch_all(pool);

    let records = with_timeout(timeout, query).await?;
    let rows = records
        .iter()
        .map(decode_stat_row)
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!("Reporting query returned {} rows", rows.len());
    Ok(rows)
}

/// Resolve display names for active campuses. Inactive or unknown ids are
/// simply absent from the result.
pub async fn resolve_campus_names(
    pool: &PgPool,
    ids: &[CampusId],
    timeout: Duration,
) -> Result<HashMap<CampusId, String>> {
    // ---
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    // Names are read as bytes so legacy encodings cannot fail the decode.
    let query = sqlx::query(
        r#"
        SELECT id, convert_to(name, 'UTF8') AS name_bytes
        FROM campuses
        WHERE active AND id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(pool);

    let records = with_timeout(timeout, query).await?;
    let mut names = HashMap::with_capacity(records.len());
    for row in &records {
        let id: CampusId = row.try_get("id")?;
        let bytes: Vec<u8> = row.try_get("name_bytes")?;
        names.insert(id, sanitize_utf8(&bytes));
    }

    Ok(names)
}

/// Coerce arbitrary bytes into valid UTF-8, replacing invalid sequences.
pub fn sanitize_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    // ---
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(DataSourceError::Timeout(timeout)),
    }
}

fn decode_stat_row(row: &PgRow) -> Result<RawStatRow> {
    // ---
    let campus_id: CampusId = row
        .try_get("campus_id")
        .map_err(|e| DataSourceError::Malformed(format!("campus_id: {e}")))?;
    let tag: String = row
        .try_get("tipo_documento")
        .map_err(|e| DataSourceError::Malformed(format!("tipo_documento: {e}")))?;

    if tag.trim().is_empty() {
        return Err(DataSourceError::Malformed(format!(
            "campus {campus_id} has an empty tipo_documento"
        )));
    }

    // Older report versions do not return `caducados` at all.
    let expired = match row.try_get::<Option<i64>, _>("caducados") {
        Ok(value) => value.unwrap_or(0),
        Err(sqlx::Error::ColumnNotFound(_)) => 0,
        Err(e) => return Err(DataSourceError::Malformed(format!("caducados: {e}"))),
    };

    Ok(RawStatRow {
        campus_id,
        category: DocumentCategory::from_source_tag(&tag),
        total: count_column(row, "total")?,
        pending: count_column(row, "pendientes")?,
        current: count_column(row, "vigentes")?,
        rejected: count_column(row, "rechazados")?,
        expired: non_negative("caducados", expired)?,
    })
}

fn count_column(row: &PgRow, column: &str) -> Result<u64> {
    // ---
    let value: Option<i64> = row
        .try_get(column)
        .map_err(|e| DataSourceError::Malformed(format!("{column}: {e}")))?;
    non_negative(column, value.unwrap_or(0))
}

fn non_negative(column: &str, value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| DataSourceError::Malformed(format!("column '{column}' is negative ({value})")))
}
