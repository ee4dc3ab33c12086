use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Upserts `service_status`, matching `original_source`'s
/// `update_service_heartbeat` pattern (`spec.md` §3, "Heartbeat": "Updated
/// each tick of each daemon").
pub async fn beat(pool: &PgPool, service_name: &str) -> Result<()> {
    sqlx::query(
        r#"
        insert into service_status (service_name, last_heartbeat, status)
        values ($1, now(), 'running')
        on conflict (service_name)
        do update set last_heartbeat = excluded.last_heartbeat, status = excluded.status
        "#,
    )
    .bind(service_name)
    .execute(pool)
    .await
    .context("heartbeat beat failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ServiceStatusRow {
    pub service_name: String,
    pub last_heartbeat: DateTime<Utc>,
    pub status: String,
}

pub async fn get(pool: &PgPool, service_name: &str) -> Result<Option<ServiceStatusRow>> {
    let row = sqlx::query_as::<_, (String, DateTime<Utc>, String)>(
        "select service_name, last_heartbeat, status from service_status where service_name = $1",
    )
    .bind(service_name)
    .fetch_optional(pool)
    .await
    .context("heartbeat get failed")?;

    Ok(row.map(|(service_name, last_heartbeat, status)| ServiceStatusRow {
        service_name,
        last_heartbeat,
        status,
    }))
}
