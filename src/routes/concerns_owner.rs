use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::{
    auth::require_owner,
    error::{AppError, AppResult},
    repository::table_service::{create_row, list_rows},
    schemas::{validate_input, ConcernPath, ConcernReplyInput},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/concerns/owner", axum::routing::get(list_owner_concerns))
        .route(
            "/concerns/owner/{concern_id}/resolve",
            axum::routing::post(resolve_concern),
        )
        .route(
            "/concerns/owner/{concern_id}/reopen",
            axum::routing::post(reopen_concern),
        )
        .route(
            "/concerns/owner/{concern_id}/messages",
            axum::routing::get(list_concern_messages),
        )
        .route(
            "/concerns/owner/{concern_id}/reply",
            axum::routing::post(reply_to_concern),
        )
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
struct OwnerConcernRow {
    id: i64,
    tenant_id: i64,
    property_id: i64,
    room_id: i64,
    category: String,
    message: String,
    sender: String,
    status: String,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    property_name: Option<String>,
    room_number: Option<String>,
    tenant_name: Option<String>,
}

/// Concerns addressed to this owner, joined with property/room/tenant
/// display fields, newest first.
async fn list_owner_concerns(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;

    let rows = sqlx::query_as::<_, OwnerConcernRow>(
        "SELECT c.id, c.tenant_id, c.property_id, c.room_id, c.category, c.message, \
                c.sender, c.status, c.resolved_at, c.created_at, \
                p.property_name, r.room_number, \
                u.first_name || ' ' || u.last_name AS tenant_name \
         FROM concerns c \
         LEFT JOIN properties p ON p.id = c.property_id \
         LEFT JOIN rooms r ON r.id = c.room_id \
         LEFT JOIN users u ON u.id = c.tenant_id \
         WHERE c.owner_id = $1 \
         ORDER BY c.created_at DESC \
         LIMIT 500",
    )
    .bind(owner.id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(json!({ "concerns": rows })))
}

/// Concern must exist and belong to the calling owner; the two failure
/// causes are indistinguishable to the caller.
async fn assert_concern_owner(
    state: &AppState,
    concern_id: i64,
    owner_id: i64,
) -> AppResult<()> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT id FROM concerns WHERE id = $1 AND owner_id = $2")
            .bind(concern_id)
            .bind(owner_id)
            .fetch_optional(&state.db_pool)
            .await?;

    found
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound("Concern not found or not authorized.".to_string()))
}

async fn resolve_concern(
    State(state): State<AppState>,
    Path(path): Path<ConcernPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;

    let updated = sqlx::query(
        "UPDATE concerns SET status = 'resolved', resolved_at = now() \
         WHERE id = $1 AND owner_id = $2",
    )
    .bind(path.concern_id)
    .bind(owner.id)
    .execute(&state.db_pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Concern not found or not authorized.".to_string(),
        ));
    }
    Ok(Json(json!({ "success": true })))
}

async fn reopen_concern(
    State(state): State<AppState>,
    Path(path): Path<ConcernPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;

    let updated = sqlx::query(
        "UPDATE concerns SET status = 'open', resolved_at = NULL \
         WHERE id = $1 AND owner_id = $2",
    )
    .bind(path.concern_id)
    .bind(owner.id)
    .execute(&state.db_pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Concern not found or not authorized.".to_string(),
        ));
    }
    Ok(Json(json!({ "success": true })))
}

async fn list_concern_messages(
    State(state): State<AppState>,
    Path(path): Path<ConcernPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let owner = require_owner(&state, &headers)?;
    assert_concern_owner(&state, path.concern_id, owner.id).await?;

    let mut filters = Map::new();
    filters.insert("concern_id".to_string(), json!(path.concern_id));
    let messages = list_rows(
        &state.db_pool,
        "concern_messages",
        Some(&filters),
        500,
        0,
        "created_at",
        true,
    )
    .await?;

    Ok(Json(json!({ "messages": messages })))
}

async fn reply_to_concern(
    State(state): State<AppState>,
    Path(path): Path<ConcernPath>,
    headers: HeaderMap,
    Json(payload): Json<ConcernReplyInput>,
) -> AppResult<impl IntoResponse> {
    let owner = require_owner(&state, &headers)?;
    validate_input(&payload)?;
    assert_concern_owner(&state, path.concern_id, owner.id).await?;

    let mut record = Map::new();
    record.insert("concern_id".to_string(), json!(path.concern_id));
    record.insert("sender".to_string(), Value::String("owner".to_string()));
    record.insert(
        "message".to_string(),
        Value::String(payload.message.trim().to_string()),
    );

    let created = create_row(&state.db_pool, "concern_messages", &record).await?;

    Ok((axum::http::StatusCode::CREATED, Json(json!({ "message": created }))))
}
