//! Route gateway for the statistics service (EMBP).
//!
//! Each sibling module exports a subrouter; this gateway merges them and
//! attaches the shared `(PgPool, Config)` state so `main.rs` only sees one
//! `Router`.
use axum::Router;
use sqlx::PgPool;

use crate::Config;

mod health;
mod statistics;

// ---

pub fn router(pool: PgPool, config: Config) -> Router {
    // ---
    Router::new()
        .merge(statistics::router())
        .merge(health::router())
        .with_state((pool, config))
}
