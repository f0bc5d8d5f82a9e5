use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::require_tenant,
    error::{AppError, AppResult},
    repository::table_service::{create_row, list_rows},
    schemas::{clamp_limit_in_range, validate_input, ConcernsHistoryQuery, CreateConcernInput},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/concerns", axum::routing::post(submit_concern))
        .route("/concerns/history", axum::routing::get(concern_history))
}

async fn submit_concern(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateConcernInput>,
) -> AppResult<impl IntoResponse> {
    let tenant = require_tenant(&state, &headers)?;
    validate_input(&payload)?;

    let mut record = Map::new();
    record.insert("tenant_id".to_string(), json!(tenant.id));
    record.insert("owner_id".to_string(), json!(payload.owner_id));
    record.insert("property_id".to_string(), json!(payload.property_id));
    record.insert("room_id".to_string(), json!(payload.room_id));
    record.insert("category".to_string(), Value::String(payload.category));
    record.insert("message".to_string(), Value::String(payload.message));
    record.insert("sender".to_string(), Value::String("tenant".to_string()));

    let created = create_row(&state.db_pool, "concerns", &record).await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({
            "message": "Ticket submitted successfully.",
            "concern": created,
        })),
    ))
}

/// Tenant's own concerns, filterable by month, keyword, and sort order.
async fn concern_history(
    State(state): State<AppState>,
    Query(query): Query<ConcernsHistoryQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let tenant = require_tenant(&state, &headers)?;

    let mut filters = Map::new();
    filters.insert("tenant_id".to_string(), json!(tenant.id));

    if let (Some(year), Some(month)) = (query.year, query.month) {
        if !(1..=12).contains(&month) {
            return Err(AppError::BadRequest(
                "month must be between 1 and 12.".to_string(),
            ));
        }
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        filters.insert(
            "created_at__gte".to_string(),
            Value::String(format!("{year}-{month:02}-01T00:00:00+00:00")),
        );
        filters.insert(
            "created_at__lt".to_string(),
            Value::String(format!("{next_year}-{next_month:02}-01T00:00:00+00:00")),
        );
    }

    if let Some(word) = query
        .word
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        filters.insert(
            "message__ilike".to_string(),
            Value::String(format!("%{word}%")),
        );
    }

    let ascending = query.sort.trim().eq_ignore_ascii_case("asc");
    let rows = list_rows(
        &state.db_pool,
        "concerns",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 500),
        0,
        "created_at",
        ascending,
    )
    .await?;

    Ok(Json(json!({ "concerns": rows })))
}
