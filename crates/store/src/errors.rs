use serde_json::Value;
use sqlx::PgPool;
use tpd_schemas::{ErrorSeverity, ErrorSource};
use tracing::error;

#[derive(Debug, Clone)]
pub struct NewLiveError {
    pub source: ErrorSource,
    pub severity: ErrorSeverity,
    pub message: String,
    pub details_json: Option<Value>,
}

/// Inserts a `live_errors` row in its own connection, never inside the unit
/// of work that failed. Its own failure is only logged, never propagated —
/// a logging failure must not crash a daemon (`spec.md` §7, error handling
/// design).
pub async fn insert(pool: &PgPool, err: &NewLiveError) {
    let result = sqlx::query(
        r#"
        insert into live_errors (source, severity, message, details_json)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(err.source.as_str())
    .bind(err.severity.as_str())
    .bind(&err.message)
    .bind(&err.details_json)
    .execute(pool)
    .await;

    if let Err(e) = result {
        error!(error = %e, source = %err.source, severity = %err.severity, message = %err.message, "failed to persist live_errors row");
    }
}
