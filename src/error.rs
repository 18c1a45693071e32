//! Errors raised while reading from the reporting data source.

use std::time::Duration;

use axum::http::StatusCode;

/// The reporting query or campus lookup could not produce a usable result.
///
/// Any of these aborts the whole aggregation; callers answer with an empty
/// payload rather than a partial one.
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    /// The query or the underlying connection failed.
    #[error("DataSource: query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// The call did not finish within the configured timeout.
    #[error("DataSource: query timed out after {0:?}")]
    Timeout(Duration),

    /// A row was returned but could not be turned into statistics.
    #[error("DataSource: malformed row: {0}")]
    Malformed(String),
}

impl DataSourceError {
    // ---
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Malformed(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Convenience `Result` alias for data-source calls.
pub type Result<T> = std::result::Result<T, DataSourceError>;
