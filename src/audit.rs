use sqlx::PgPool;

pub struct AuditEntry<'a> {
    pub actor: &'a str,
    pub action: &'a str,
    pub resource: &'a str,
    pub resource_id: Option<i32>,
    pub detail: Option<serde_json::Value>,
    pub ip_addr: Option<&'a str>,
}

/// Best effort: a failed audit write is logged, never surfaced to the caller.
pub async fn write_audit(pool: &PgPool, entry: &AuditEntry<'_>) {
    if let Err(e) = write_audit_inner(pool, entry).await {
        tracing::warn!(
            error = %e,
            action = entry.action,
            resource = entry.resource,
            "failed to write audit log entry"
        );
    }
}

async fn write_audit_inner(pool: &PgPool, entry: &AuditEntry<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_log (actor, action, resource, resource_id, detail, ip_addr)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(entry.actor)
    .bind(entry.action)
    .bind(entry.resource)
    .bind(entry.resource_id)
    .bind(&entry.detail)
    .bind(entry.ip_addr)
    .execute(pool)
    .await?;

    Ok(())
}
