use serde_json::Value;
use sqlx::PgPool;

/// Best-effort audit trail. Failures are logged and swallowed; an audit
/// write must never fail the operation it records.
pub async fn write_audit_log(
    pool: &PgPool,
    user_id: Option<i64>,
    action: &str,
    entity_type: &str,
    entity_id: Option<i64>,
    before: Option<Value>,
    after: Option<Value>,
) {
    let result = sqlx::query(
        "INSERT INTO audit_logs (user_id, action, entity_type, entity_id, before_state, after_state) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(user_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(before)
    .bind(after)
    .execute(pool)
    .await;

    if let Err(error) = result {
        tracing::warn!(action, entity_type, error = %error, "Audit log write failed");
    }
}
