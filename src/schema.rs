//! Database schema management for `campus-compliance-stats`.
//!
//! Ensures the document tables and the `campus_document_stats` reporting
//! function exist before serving requests. Applied once on startup from
//! `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates `campuses`, `employee_campuses` and `documents`, plus the
/// reporting function consumed by `reporting::fetch_stat_rows`. Safe to call
/// on every startup; the function is replaced so its definition always
/// matches this binary.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campuses (
            id      BIGSERIAL PRIMARY KEY,
            name    TEXT    NOT NULL,
            active  BOOLEAN NOT NULL DEFAULT TRUE
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Campus assignments used when a request is not `include_all`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS employee_campuses (
            employee_id BIGINT NOT NULL,
            campus_id   BIGINT NOT NULL REFERENCES campuses (id),
            PRIMARY KEY (employee_id, campus_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // estado: pendiente | aprobado | rechazado
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id                BIGSERIAL   PRIMARY KEY,
            campus_id         BIGINT      NOT NULL REFERENCES campuses (id),
            tipo_documento    TEXT        NOT NULL,
            estado            TEXT        NOT NULL DEFAULT 'pendiente',
            fecha_vencimiento DATE,
            uploaded_at       TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_documents_campus_id
            ON documents (campus_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_employee_campuses_employee_id
            ON employee_campuses (employee_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // One row per (campus, category). Approved documents past their expiry
    // date are reported as caducados, not vigentes.
    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION campus_document_stats(
            p_employee_id BIGINT,
            p_include_all BOOLEAN
        )
        RETURNS TABLE (
            campus_id      BIGINT,
            tipo_documento TEXT,
            total          BIGINT,
            pendientes     BIGINT,
            vigentes       BIGINT,
            rechazados     BIGINT,
            caducados      BIGINT
        )
        LANGUAGE sql STABLE
        AS $$
            SELECT
                d.campus_id,
                CASE WHEN upper(d.tipo_documento) = 'FISCAL' THEN 'FISCAL' ELSE 'MEDICINA' END,
                COUNT(*),
                COUNT(*) FILTER (WHERE d.estado = 'pendiente'),
                COUNT(*) FILTER (WHERE d.estado = 'aprobado'
                                   AND (d.fecha_vencimiento IS NULL
                                        OR d.fecha_vencimiento >= CURRENT_DATE)),
                COUNT(*) FILTER (WHERE d.estado = 'rechazado'),
                COUNT(*) FILTER (WHERE d.estado = 'aprobado'
                                   AND d.fecha_vencimiento < CURRENT_DATE)
            FROM documents d
            WHERE p_include_all
               OR d.campus_id IN (
                    SELECT ec.campus_id
                    FROM employee_campuses ec
                    WHERE ec.employee_id = p_employee_id
               )
            GROUP BY 1, 2
            ORDER BY 1, 2
        $$;
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
